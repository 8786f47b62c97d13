//! Entry points wiring the components together
//!
//! - [`ArticleProcessor`]: normalize, chunk and embed articles, then index them
//! - [`SearchService`]: resolve a [`crate::types::Query`] and search the index

mod processor;
mod search;

pub use processor::{ArticleFailure, ArticleProcessor, BatchIngestReport, IngestSummary, ProcessedArticle};
pub use search::SearchService;
