/// Ingest -> search -> persist -> reload, with the hashing provider so no
/// model download is needed
use chrono::{Duration, Utc};
use feedsense::embedding::{EmbeddingConfig, EmbeddingGenerator, HashingProvider};
use feedsense::index::{IndexConfig, IndexError, VectorIndex};
use feedsense::pipeline::{ArticleProcessor, SearchService};
use feedsense::storage::DataLayout;
use feedsense::text::{Chunker, ChunkerConfig, TextNormalizer};
use feedsense::types::{DateRange, Query, RawArticle, SearchFilters};
use std::sync::Arc;
use tempfile::TempDir;

const DIM: usize = 128;

fn generator() -> Arc<EmbeddingGenerator> {
    let config = EmbeddingConfig {
        model: HashingProvider::MODEL_NAME.to_string(),
        dimension: DIM,
        ..EmbeddingConfig::default()
    };
    Arc::new(EmbeddingGenerator::new(
        Arc::new(HashingProvider::new(DIM).unwrap()),
        config,
    ))
}

fn index_config() -> IndexConfig {
    IndexConfig {
        vector_dim: DIM,
        ..IndexConfig::default()
    }
}

fn article(id: &str, category: &str, source: &str, days_old: i64, content: &str) -> RawArticle {
    RawArticle {
        id: id.to_string(),
        headline: format!("Headline for {}", id),
        content: content.to_string(),
        source: source.to_string(),
        category: category.to_string(),
        published_at: Utc::now() - Duration::days(days_old),
        url: format!("https://news.example/{}", id),
        tags: Vec::new(),
    }
}

fn corpus() -> Vec<RawArticle> {
    vec![
        article(
            "tech-1",
            "technology",
            "Reuters",
            1,
            "<p>Chip makers report a semiconductor shortage as demand for AI accelerators grows.</p>",
        ),
        article(
            "tech-2",
            "technology",
            "AP",
            3,
            "New smartphone chips promise better battery life and faster AI features.",
        ),
        article(
            "biz-1",
            "business",
            "Reuters",
            2,
            "Semiconductor stocks fell after the chip shortage hit quarterly earnings.",
        ),
        article(
            "sport-1",
            "sports",
            "ESPN",
            1,
            "The home team won the championship final in overtime before a record crowd.",
        ),
    ]
}

async fn ingested() -> (ArticleProcessor, Arc<VectorIndex>) {
    let processor = ArticleProcessor::new(
        TextNormalizer::new().unwrap(),
        Chunker::new(ChunkerConfig::default()),
        generator(),
    );
    let index = Arc::new(VectorIndex::new(index_config()));
    let summary = processor.ingest_into(&corpus(), &index).await.unwrap();

    assert_eq!(summary.articles, 4);
    assert!(summary.failed_articles.is_empty());
    assert_eq!(summary.failed_embeddings, 0);
    assert_eq!(summary.insert.inserted, 4);
    (processor, index)
}

#[tokio::test]
async fn test_ingest_and_search() {
    let (_, index) = ingested().await;
    let service = SearchService::new(index.clone(), generator());

    let outcome = service
        .search(
            Query::Text("semiconductor chip shortage".to_string()),
            &SearchFilters::default(),
            3,
        )
        .await
        .unwrap();

    assert!(!outcome.results.is_empty());
    assert!(outcome.results.len() <= 3);
    assert_ne!(outcome.results[0].chunk.article_id, "sport-1");
    for pair in outcome.results.windows(2) {
        assert!(pair[0].relevance_score >= pair[1].relevance_score);
    }
    assert_eq!(outcome.metrics.index_size, 4);
    println!("✓ Top hit: {}", outcome.results[0].chunk.id);
}

#[tokio::test]
async fn test_filters_restrict_results() {
    let (_, index) = ingested().await;
    let service = SearchService::new(index, generator());
    let query = || Query::Text("chip shortage".to_string());

    let filters = SearchFilters::default().with_categories(["Technology"]);
    let outcome = service.search(query(), &filters, 10).await.unwrap();
    assert!(!outcome.results.is_empty());
    assert!(outcome
        .results
        .iter()
        .all(|r| r.chunk.metadata.category == "technology"));
    assert_eq!(outcome.metrics.filters_applied, filters.active());

    let filters = SearchFilters::default().with_sources(["reuters"]);
    let outcome = service.search(query(), &filters, 10).await.unwrap();
    assert!(outcome
        .results
        .iter()
        .all(|r| r.chunk.metadata.source == "Reuters"));

    let recent = SearchFilters::default().with_date_range(DateRange {
        start: Some(Utc::now() - Duration::hours(36)),
        end: None,
    });
    let outcome = service.search(query(), &recent, 10).await.unwrap();
    assert!(outcome
        .results
        .iter()
        .all(|r| r.chunk.article_id == "tech-1" || r.chunk.article_id == "sport-1"));
}

#[tokio::test]
async fn test_reingest_skips_duplicates() {
    let (processor, index) = ingested().await;

    let summary = processor.ingest_into(&corpus(), &index).await.unwrap();
    assert_eq!(summary.insert.inserted, 0);
    assert_eq!(summary.insert.skipped_duplicate, 4);
    assert_eq!(index.len(), 4);
}

#[tokio::test]
async fn test_persist_and_reload() {
    let temp = TempDir::new().unwrap();
    let layout = DataLayout::new(temp.path()).unwrap();
    let (_, index) = ingested().await;

    index.persist(&layout.index_dir()).unwrap();
    let reloaded = Arc::new(VectorIndex::load(&layout.index_dir(), index_config()).unwrap());
    assert_eq!(reloaded.len(), index.len());
    assert_eq!(reloaded.get("tech-1#0"), index.get("tech-1#0"));

    let query = Query::Text("championship overtime".to_string());
    let before = SearchService::new(index, generator())
        .search(query.clone(), &SearchFilters::default(), 2)
        .await
        .unwrap();
    let after = SearchService::new(reloaded, generator())
        .search(query, &SearchFilters::default(), 2)
        .await
        .unwrap();

    let ids = |o: &feedsense::index::SearchOutcome| {
        o.results
            .iter()
            .map(|r| r.chunk.id.clone())
            .collect::<Vec<_>>()
    };
    assert_eq!(ids(&before), ids(&after));
    assert_eq!(before.results[0].chunk.article_id, "sport-1");
}

#[tokio::test]
async fn test_reload_rejects_other_dimension() {
    let temp = TempDir::new().unwrap();
    let layout = DataLayout::new(temp.path()).unwrap();
    let (_, index) = ingested().await;
    index.persist(&layout.index_dir()).unwrap();

    let other = IndexConfig {
        vector_dim: DIM * 2,
        ..IndexConfig::default()
    };
    assert!(VectorIndex::load(&layout.index_dir(), other).is_err());
}

#[test]
fn test_missing_snapshot_is_not_found() {
    let temp = TempDir::new().unwrap();
    let result = VectorIndex::load(&temp.path().join("index"), index_config());
    assert!(matches!(result, Err(IndexError::NotFound(_))));
}
