//! Feedsense - semantic news search with learned personalization
//!
//! Articles are normalized, chunked with context overlap, embedded locally
//! and stored in a filtered vector index. User feedback is turned into
//! preference proposals by a pure learner, and search results are re-ranked
//! against those preferences.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod index;
pub mod learning;
pub mod pipeline;
pub mod ranking;
pub mod storage;
pub mod text;
pub mod types;

pub use error::{FeedsenseError, Result};
