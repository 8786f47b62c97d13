//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "feedsense",
    version,
    author = "neur0map",
    about = "Semantic news search with interaction-driven personalization",
    long_about = "Feedsense normalizes and chunks articles, embeds them locally, indexes the vectors \
                  for filtered semantic search, and re-ranks results using preferences learned from \
                  user feedback."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/feedsense/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Chunk, embed and index articles from a JSON file
    Ingest {
        /// JSON array of articles
        file: PathBuf,
    },

    /// Semantic search over indexed articles
    Search {
        /// Search query text
        query: String,

        /// Maximum number of results to return
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Restrict to categories (repeatable)
        #[arg(long)]
        category: Vec<String>,

        /// Restrict to sources (repeatable)
        #[arg(long)]
        source: Vec<String>,

        /// Drop results below this similarity
        #[arg(long)]
        min_score: Option<f32>,

        /// Re-rank results with this user's preferences
        #[arg(short, long)]
        user: Option<String>,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Record user feedback and show the learned preference changes
    Interact {
        #[arg(short, long)]
        user: String,

        #[arg(short, long)]
        article: String,

        /// One of: read_more, hide, like, share
        #[arg(long)]
        action: String,

        /// Persist the proposed preferences
        #[arg(long)]
        commit: bool,
    },

    /// Inspect or edit user preferences
    Prefs {
        #[command(subcommand)]
        action: PrefsAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum PrefsAction {
    /// Show a user's preferences
    Show { user: String },

    /// Replace parts of a user's explicit preferences
    Set {
        user: String,

        /// Followed topics (comma-separated)
        #[arg(long, value_delimiter = ',')]
        topics: Option<Vec<String>>,

        /// Topics never to show (comma-separated)
        #[arg(long, value_delimiter = ',')]
        exclude_topics: Option<Vec<String>>,

        /// Preferred sources (comma-separated)
        #[arg(long, value_delimiter = ',')]
        sources: Option<Vec<String>>,

        /// Sources never to show (comma-separated)
        #[arg(long, value_delimiter = ',')]
        exclude_sources: Option<Vec<String>>,

        #[arg(long)]
        tone: Option<String>,

        /// Reading time budget in minutes
        #[arg(long)]
        reading_time: Option<u32>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
