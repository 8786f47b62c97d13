/// Article ingestion: normalize, chunk, embed, index
use crate::embedding::{EmbeddingGenerator, EmbeddingOutcome, ProcessingMetrics};
use crate::error::Result;
use crate::index::{InsertReport, VectorIndex};
use crate::text::{ChunkIssue, Chunker, TextNormalizer};
use crate::types::{RawArticle, TextChunk};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Chunks of one article with their embeddings
///
/// Chunks whose embedding failed carry an empty vector and are skipped by
/// the index.
#[derive(Debug, Clone)]
pub struct ProcessedArticle {
    pub article_id: String,
    pub chunks: Vec<TextChunk>,
    pub metrics: ProcessingMetrics,
    pub issues: Vec<ChunkIssue>,
}

impl ProcessedArticle {
    pub fn embedded_chunks(&self) -> impl Iterator<Item = &TextChunk> {
        self.chunks.iter().filter(|c| !c.embedding.is_empty())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArticleFailure {
    pub article_id: String,
    pub error: String,
}

/// Result of processing several articles; one failure never aborts the rest
#[derive(Debug, Clone, Default)]
pub struct BatchIngestReport {
    pub processed: Vec<ProcessedArticle>,
    pub failures: Vec<ArticleFailure>,
    pub elapsed_ms: u64,
}

impl BatchIngestReport {
    pub fn chunk_count(&self) -> usize {
        self.processed.iter().map(|p| p.chunks.len()).sum()
    }

    pub fn failed_embeddings(&self) -> usize {
        self.processed.iter().map(|p| p.metrics.failed).sum()
    }
}

/// What [`ArticleProcessor::ingest_into`] did
#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub articles: usize,
    pub failed_articles: Vec<ArticleFailure>,
    pub chunks: usize,
    pub failed_embeddings: usize,
    pub insert: InsertReport,
    pub elapsed_ms: u64,
}

pub struct ArticleProcessor {
    normalizer: TextNormalizer,
    chunker: Chunker,
    generator: Arc<EmbeddingGenerator>,
}

impl ArticleProcessor {
    pub fn new(normalizer: TextNormalizer, chunker: Chunker, generator: Arc<EmbeddingGenerator>) -> Self {
        Self {
            normalizer,
            chunker,
            generator,
        }
    }

    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    /// Turn one article into embedded chunks
    ///
    /// Fails only when the article itself is invalid. Empty content yields
    /// zero chunks; embedding failures are reported per chunk in the metrics.
    pub async fn process(&self, article: &RawArticle) -> Result<ProcessedArticle> {
        article.validate()?;

        let text = self.normalizer.normalize(&article.content);
        let pieces = self.chunker.chunk(&text);

        let issues = self.chunker.validate(&pieces);
        for issue in &issues {
            warn!("Chunk issue in article {}: {:?}", article.id, issue);
        }

        let mut chunks: Vec<TextChunk> = pieces
            .into_iter()
            .enumerate()
            .map(|(idx, content)| TextChunk::from_article(article, idx, content))
            .collect();

        if chunks.is_empty() {
            debug!("Article {} produced no chunks", article.id);
            return Ok(ProcessedArticle {
                article_id: article.id.clone(),
                chunks,
                metrics: ProcessingMetrics::default(),
                issues,
            });
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let output = self.generator.generate(&texts).await;

        for (chunk, outcome) in chunks.iter_mut().zip(output.embeddings) {
            match outcome {
                EmbeddingOutcome::Embedded(vector) => chunk.embedding = vector,
                EmbeddingOutcome::Failed(e) => {
                    warn!("Embedding failed for chunk {}: {}", chunk.id, e);
                }
            }
        }

        debug!(
            "Processed article {}: {} chunks, {} embedded",
            article.id,
            chunks.len(),
            output.metrics.successful
        );

        Ok(ProcessedArticle {
            article_id: article.id.clone(),
            chunks,
            metrics: output.metrics,
            issues,
        })
    }

    /// Process articles one after another, isolating failures
    pub async fn process_batch(&self, articles: &[RawArticle]) -> BatchIngestReport {
        let start = Instant::now();
        let mut report = BatchIngestReport::default();

        for article in articles {
            match self.process(article).await {
                Ok(processed) => report.processed.push(processed),
                Err(e) => {
                    warn!("Skipping article {}: {}", article.id, e);
                    report.failures.push(ArticleFailure {
                        article_id: article.id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        report.elapsed_ms = start.elapsed().as_millis() as u64;
        report
    }

    /// Process articles and insert every successfully embedded chunk
    pub async fn ingest_into(&self, articles: &[RawArticle], index: &VectorIndex) -> Result<IngestSummary> {
        let report = self.process_batch(articles).await;

        let chunks = report.chunk_count();
        let failed_embeddings = report.failed_embeddings();
        let embedded: Vec<TextChunk> = report
            .processed
            .into_iter()
            .flat_map(|p| p.chunks)
            .filter(|c| !c.embedding.is_empty())
            .collect();

        let insert = index.insert(embedded)?;

        info!(
            "Ingested {} articles ({} failed): {} chunks, {} indexed",
            articles.len(),
            report.failures.len(),
            chunks,
            insert.inserted
        );

        Ok(IngestSummary {
            articles: articles.len(),
            failed_articles: report.failures,
            chunks,
            failed_embeddings,
            insert,
            elapsed_ms: report.elapsed_ms,
        })
    }
}
