//! Configuration management for feedsense
//!
//! A single TOML file with one section per component. Component sections
//! reuse the components' own config structs, so a value that parses here is
//! exactly what the component receives. Environment variables of the form
//! `FEEDSENSE_SECTION__KEY` override file values.

use crate::embedding::EmbeddingConfig;
use crate::error::{FeedsenseError, Result};
use crate::index::IndexConfig;
use crate::learning::LearnerConfig;
use crate::ranking::RankingConfig;
use crate::text::ChunkerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

mod validator;

pub use validator::ConfigValidator;

pub const SCHEMA_VERSION: &str = "1.0.0";

const ENV_PREFIX: &str = "FEEDSENSE_";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkerConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub indexing: IndexConfig,
    #[serde(default)]
    pub learning: LearnerConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Holds the index snapshot and the preference database; `~` is expanded
    pub data_dir: PathBuf,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FeedsenseError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| FeedsenseError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Load the file at `path` if it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(FeedsenseError::ConfigNotFound { .. }) => {
                tracing::debug!("No config at {:?}, using defaults", path);
                let mut config = Self::default();
                config.apply_env_overrides();
                ConfigValidator::validate(&config)?;
                Ok(config)
            }
            other => other,
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FeedsenseError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| FeedsenseError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: FEEDSENSE_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix(ENV_PREFIX) {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "STORAGE__DATA_DIR" => self.storage.data_dir = PathBuf::from(value),
            "CHUNKING__MAX_CHUNK_SIZE" => self.chunking.max_chunk_size = parse(path, value)?,
            "CHUNKING__MIN_CHUNK_SIZE" => self.chunking.min_chunk_size = parse(path, value)?,
            "CHUNKING__OVERLAP_SIZE" => self.chunking.overlap_size = parse(path, value)?,
            "CHUNKING__PRESERVE_CONTEXT" => self.chunking.preserve_context = parse(path, value)?,
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "EMBEDDING__DIMENSION" => self.embedding.dimension = parse(path, value)?,
            "EMBEDDING__BATCH_SIZE" => self.embedding.batch_size = parse(path, value)?,
            "EMBEDDING__MAX_CONCURRENT" => self.embedding.max_concurrent = parse(path, value)?,
            "EMBEDDING__MAX_RETRIES" => self.embedding.max_retries = parse(path, value)?,
            "EMBEDDING__TIMEOUT_MS" => self.embedding.timeout_ms = parse(path, value)?,
            "INDEXING__VECTOR_DIM" => self.indexing.vector_dim = parse(path, value)?,
            "INDEXING__EF_SEARCH" => self.indexing.ef_search = parse(path, value)?,
            "INDEXING__MIN_SIMILARITY" => self.indexing.min_similarity = parse(path, value)?,
            "INDEXING__EXACT_SEARCH_THRESHOLD" => {
                self.indexing.exact_search_threshold = parse(path, value)?
            }
            "LEARNING__MIN_POSITIVE_EVENTS" => {
                self.learning.min_positive_events = parse(path, value)?
            }
            "LEARNING__MIN_NEGATIVE_EVENTS" => {
                self.learning.min_negative_events = parse(path, value)?
            }
            "LEARNING__DEMOTE_RATIO" => self.learning.demote_ratio = parse(path, value)?,
            "RANKING__RECENCY_HALF_LIFE_HOURS" => {
                self.ranking.recency_half_life_hours = parse(path, value)?
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Data directory with a leading `~` expanded
    pub fn data_dir(&self) -> Result<PathBuf> {
        let raw = &self.storage.data_dir;
        match raw.strip_prefix("~") {
            Ok(rest) => {
                let home = dirs::home_dir().ok_or_else(|| {
                    FeedsenseError::Config("Cannot determine home directory".to_string())
                })?;
                Ok(home.join(rest))
            }
            Err(_) => Ok(raw.clone()),
        }
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            FeedsenseError::Config("Cannot determine config directory".to_string())
        })?;

        Ok(config_dir.join("feedsense").join("config.toml"))
    }
}

fn parse<T: FromStr>(path: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| FeedsenseError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}'", value),
    })
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: SCHEMA_VERSION.to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("~/.feedsense"),
            },
            chunking: ChunkerConfig::default(),
            embedding: EmbeddingConfig::default(),
            indexing: IndexConfig::default(),
            learning: LearnerConfig::default(),
            ranking: RankingConfig::default(),
        }
    }
}
