//! Text preparation: normalization and chunking
//!
//! Architecture:
//! - TextNormalizer turns scraped markup into plain text (idempotent)
//! - Chunker packs paragraphs into bounded, overlapping segments
//! - Chunker::validate reports size and vocabulary problems without blocking

mod chunker;
mod normalizer;

pub use chunker::{ChunkIssue, Chunker, ChunkerConfig};
pub use normalizer::TextNormalizer;
