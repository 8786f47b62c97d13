/// End-to-end search with the real MiniLM model
use chrono::Utc;
use feedsense::embedding::{EmbeddingConfig, EmbeddingGenerator, EmbeddingProvider, FastEmbedProvider};
use feedsense::index::{IndexConfig, VectorIndex};
use feedsense::pipeline::{ArticleProcessor, SearchService};
use feedsense::text::{Chunker, ChunkerConfig, TextNormalizer};
use feedsense::types::{Query, RawArticle, SearchFilters};
use std::sync::Arc;

fn article(id: &str, category: &str, content: &str) -> RawArticle {
    RawArticle {
        id: id.to_string(),
        headline: String::new(),
        content: content.to_string(),
        source: "Wire".to_string(),
        category: category.to_string(),
        published_at: Utc::now(),
        url: String::new(),
        tags: Vec::new(),
    }
}

#[tokio::test]
#[ignore] // Requires model download (~90MB) - run with: cargo test -- --ignored
async fn test_semantic_search_with_minilm() {
    let config = EmbeddingConfig::default();
    let provider = Arc::new(
        FastEmbedProvider::new(&config.model).expect("Failed to initialize embedding provider"),
    );
    assert_eq!(provider.dimension(), 384);
    println!("✓ Embedding provider initialized: {}", provider.model_name());

    let generator = Arc::new(EmbeddingGenerator::new(provider, config));
    let processor = ArticleProcessor::new(
        TextNormalizer::new().unwrap(),
        Chunker::new(ChunkerConfig::default()),
        generator.clone(),
    );
    let index = Arc::new(VectorIndex::new(IndexConfig::default()));

    let articles = vec![
        article(
            "ai",
            "technology",
            "Researchers unveiled a large language model that writes working code from plain descriptions.",
        ),
        article(
            "football",
            "sports",
            "The striker scored twice in the second half to send the club into the cup final.",
        ),
        article(
            "rates",
            "business",
            "The central bank held interest rates steady and signalled cuts later in the year.",
        ),
    ];
    let summary = processor.ingest_into(&articles, &index).await.unwrap();
    assert_eq!(summary.insert.inserted, 3);
    assert_eq!(summary.failed_embeddings, 0);

    let service = SearchService::new(index, generator);
    let cases = [
        ("artificial intelligence programming assistant", "ai"),
        ("soccer match goals", "football"),
        ("monetary policy and inflation", "rates"),
    ];
    for (query, expected) in cases {
        let outcome = service
            .search(Query::Text(query.to_string()), &SearchFilters::default(), 1)
            .await
            .unwrap();
        assert_eq!(outcome.results[0].chunk.article_id, expected, "query: {}", query);
        println!(
            "✓ '{}' -> {} ({:.3})",
            query, expected, outcome.results[0].relevance_score
        );
    }
}
