use feedsense::cli::{Cli, Commands, ConfigAction, PrefsAction};
use feedsense::config::Config;
use feedsense::embedding::{provider_from_config, EmbeddingGenerator};
use feedsense::error::{FeedsenseError, Result};
use feedsense::index::{IndexError, VectorIndex};
use feedsense::learning::{InteractionLearner, InteractionService};
use feedsense::pipeline::{ArticleProcessor, SearchService};
use feedsense::ranking::{into_results, PersonalizationRanker, RankedResult};
use feedsense::storage::DataLayout;
use feedsense::text::{Chunker, TextNormalizer};
use feedsense::types::{
    InteractionAction, Query, RawArticle, SearchFilters, SearchResult, UserInteraction,
    UserPreferences,
};
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Config { action } => cmd_config(cli.config, action)?,
        command => {
            let config = load_config(cli.config)?;
            let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
            rt.block_on(run(config, command))?;
        }
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose {
        "feedsense=debug"
    } else {
        "feedsense=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt().with_env_filter(filter).with_target(false).init();
}

async fn run(config: Config, command: Commands) -> anyhow::Result<()> {
    let layout = DataLayout::new(config.data_dir()?)?;

    match command {
        Commands::Ingest { file } => cmd_ingest(&config, &layout, &file).await?,
        Commands::Search {
            query,
            limit,
            category,
            source,
            min_score,
            user,
            json,
        } => {
            let mut filters = SearchFilters::default()
                .with_categories(category)
                .with_sources(source);
            filters.min_relevance_score = min_score;
            cmd_search(&config, &layout, query, filters, limit, user, json).await?
        }
        Commands::Interact {
            user,
            article,
            action,
            commit,
        } => cmd_interact(&config, &layout, user, article, &action, commit).await?,
        Commands::Prefs { action } => cmd_prefs(&config, &layout, action).await?,
        Commands::Config { .. } => {}
    }
    Ok(())
}

async fn cmd_ingest(config: &Config, layout: &DataLayout, file: &Path) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read articles file: {}", file.display()))?;
    let articles: Vec<RawArticle> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse articles from {}", file.display()))?;

    tracing::info!("Loaded {} articles from {}", articles.len(), file.display());

    let generator = Arc::new(build_generator(config)?);
    let processor = ArticleProcessor::new(
        TextNormalizer::new()?,
        Chunker::new(config.chunking.clone()),
        generator,
    );

    let index = open_index(config, layout)?;
    let summary = processor.ingest_into(&articles, &index).await?;
    index.persist(&layout.index_dir())?;

    println!("✓ Ingested {} articles", summary.articles);
    println!("  Chunks:            {}", summary.chunks);
    println!("  Indexed:           {}", summary.insert.inserted);
    println!("  Duplicates:        {}", summary.insert.skipped_duplicate);
    println!("  Failed embeddings: {}", summary.failed_embeddings);
    println!("  Index size:        {}", index.len());
    for failure in &summary.failed_articles {
        println!("  ✗ {}: {}", failure.article_id, failure.error);
    }

    Ok(())
}

async fn cmd_search(
    config: &Config,
    layout: &DataLayout,
    query: String,
    filters: SearchFilters,
    limit: usize,
    user: Option<String>,
    json: bool,
) -> Result<()> {
    let index = Arc::new(open_index(config, layout)?);
    if index.is_empty() {
        println!("Index is empty. Run 'feedsense ingest <file>' first.");
        return Ok(());
    }

    let service = SearchService::new(index, Arc::new(build_generator(config)?));
    let query = Query::Text(query);

    let results: Vec<SearchResult> = match user {
        Some(user_id) => {
            let store = layout.open_store()?;
            let prefs = store
                .load_preferences(&user_id)?
                .unwrap_or_else(|| UserPreferences::new(user_id.as_str()));
            let ranker = PersonalizationRanker::new(config.ranking.clone());
            let ranked = service
                .search_for_user(query, &filters, limit, &prefs, &ranker)
                .await?;
            if json {
                return print_json(&ranked);
            }
            log_breakdown(&ranked);
            into_results(ranked)
        }
        None => {
            let outcome = service.search(query, &filters, limit).await?;
            tracing::debug!(
                "Search considered {} of {} chunks in {}ms",
                outcome.metrics.candidates_considered,
                outcome.metrics.index_size,
                outcome.metrics.elapsed_ms
            );
            if json {
                return print_json(&outcome.results);
            }
            outcome.results
        }
    };

    if results.is_empty() {
        println!("No results.");
    }
    for (i, result) in results.iter().enumerate() {
        let meta = &result.chunk.metadata;
        println!(
            "{:>2}. [{:.3}] {} ({} / {}, {})",
            i + 1,
            result.relevance_score,
            if meta.headline.is_empty() {
                &result.chunk.article_id
            } else {
                &meta.headline
            },
            meta.category,
            meta.source,
            meta.published_at.format("%Y-%m-%d")
        );
        println!("    {}", preview(&result.chunk.content, 160));
    }

    Ok(())
}

async fn cmd_interact(
    config: &Config,
    layout: &DataLayout,
    user: String,
    article: String,
    action: &str,
    commit: bool,
) -> Result<()> {
    let action = InteractionAction::parse(action)?;
    let service = interaction_service(config, layout)?;

    let event = UserInteraction::new(user, article, action, chrono::Utc::now());
    let outcome = service.ingest(vec![event]).await?;

    println!(
        "Considered {} interactions ({} for unknown articles)",
        outcome.events_considered, outcome.unattributed
    );
    if outcome.changes.is_empty() {
        println!("No preference changes proposed.");
        return Ok(());
    }

    println!("Proposed changes (confidence {:.2}):", outcome.confidence);
    for change in &outcome.changes {
        println!(
            "  {:?} {} (+{} / -{}, {:.2})",
            change.kind, change.label, change.positive, change.negative, change.confidence
        );
    }

    if commit {
        service.commit(&outcome).await?;
        println!("✓ Preferences updated");
    } else {
        println!("Use --commit to apply.");
    }
    Ok(())
}

async fn cmd_prefs(config: &Config, layout: &DataLayout, action: PrefsAction) -> Result<()> {
    let service = interaction_service(config, layout)?;

    match action {
        PrefsAction::Show { user } => {
            let prefs = service.preferences(&user)?;
            print_json(&prefs)?;
        }
        PrefsAction::Set {
            user,
            topics,
            exclude_topics,
            sources,
            exclude_sources,
            tone,
            reading_time,
        } => {
            let mut prefs = service.preferences(&user)?;
            if let Some(topics) = topics {
                prefs.topics = topics.into_iter().collect();
            }
            if let Some(excluded) = exclude_topics {
                prefs.excluded_topics = excluded.into_iter().collect();
            }
            if let Some(sources) = sources {
                prefs.preferred_sources = sources.into_iter().collect();
            }
            if let Some(excluded) = exclude_sources {
                prefs.excluded_sources = excluded.into_iter().collect();
            }
            if tone.is_some() {
                prefs.tone = tone;
            }
            if reading_time.is_some() {
                prefs.reading_time_budget = reading_time;
            }
            prefs.updated_at = chrono::Utc::now();

            service.set_preferences(prefs).await?;
            println!("✓ Preferences saved for {}", user);
        }
    }
    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            let toml = toml::to_string_pretty(&config)?;
            println!("{}", toml);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'feedsense config init' to create one."
        );
    }
    Config::load_or_default(&path)
}

fn build_generator(config: &Config) -> Result<EmbeddingGenerator> {
    let provider = provider_from_config(&config.embedding)?;
    Ok(EmbeddingGenerator::new(provider, config.embedding.clone()))
}

/// Load the persisted index, or start an empty one
fn open_index(config: &Config, layout: &DataLayout) -> Result<VectorIndex> {
    match VectorIndex::load(&layout.index_dir(), config.indexing.clone()) {
        Ok(index) => Ok(index),
        Err(IndexError::NotFound(_)) => Ok(VectorIndex::new(config.indexing.clone())),
        Err(e) => Err(e.into()),
    }
}

fn interaction_service(config: &Config, layout: &DataLayout) -> Result<InteractionService> {
    let store = Arc::new(layout.open_store()?);
    let stats = store.stats()?;
    tracing::debug!(
        "Preference store: {} users, {} interactions",
        stats.user_count,
        stats.interaction_count
    );
    let catalog = Arc::new(open_index(config, layout)?);
    Ok(InteractionService::new(
        InteractionLearner::new(config.learning.clone()),
        store,
        catalog,
    ))
}

fn log_breakdown(ranked: &[RankedResult]) {
    for r in ranked {
        tracing::debug!(
            "{}: relevance {:.3}, topic {:.2}, recency {:.2}, source {:.0}",
            r.result.chunk.id,
            r.breakdown.relevance,
            r.breakdown.topic_match,
            r.breakdown.recency,
            r.breakdown.source
        );
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| FeedsenseError::Json {
        source: e,
        context: "Failed to serialize output".to_string(),
    })?;
    println!("{}", json);
    Ok(())
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}…", cut.trim_end())
}
