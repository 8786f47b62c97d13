//! Core data model shared by the ingestion, search and personalization paths

use crate::error::{FeedsenseError, Result};
use crate::learning::LearningError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Lowercase and trim a category/topic/source label for comparison
pub fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase()
}

/// An already-fetched article handed over by the ingestion collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawArticle {
    pub id: String,
    pub headline: String,
    pub content: String,
    pub source: String,
    pub category: String,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl RawArticle {
    /// Reject articles that cannot be attributed or filtered later
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(FeedsenseError::Validation(
                "Article id cannot be empty".to_string(),
            ));
        }
        if self.source.trim().is_empty() {
            return Err(FeedsenseError::Validation(format!(
                "Article {} has no source",
                self.id
            )));
        }
        if self.category.trim().is_empty() {
            return Err(FeedsenseError::Validation(format!(
                "Article {} has no category",
                self.id
            )));
        }
        Ok(())
    }
}

/// Metadata copied from the parent article onto every chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    pub category: String,
    pub published_at: DateTime<Utc>,
    pub chunk_index: usize,
    pub word_count: usize,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub headline: String,
    #[serde(default)]
    pub url: String,
}

/// A bounded text segment of an article; the unit of embedding and indexing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    pub id: String,
    /// Back-reference to the article, not ownership
    pub article_id: String,
    pub content: String,
    /// Empty until populated by the embedding generator
    #[serde(default)]
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
}

impl TextChunk {
    /// Build the chunk at `chunk_index` of `article`
    pub fn from_article(article: &RawArticle, chunk_index: usize, content: String) -> Self {
        let word_count = content.split_whitespace().count();
        Self {
            id: format!("{}#{}", article.id, chunk_index),
            article_id: article.id.clone(),
            content,
            embedding: Vec::new(),
            metadata: ChunkMetadata {
                source: article.source.clone(),
                category: article.category.clone(),
                published_at: article.published_at,
                chunk_index,
                word_count,
                tags: article.tags.clone(),
                headline: article.headline.clone(),
                url: article.url.clone(),
            },
        }
    }

    /// Category and tags as normalized labels, without duplicates
    pub fn labels(&self) -> BTreeSet<String> {
        std::iter::once(&self.metadata.category)
            .chain(self.metadata.tags.iter())
            .map(|l| normalize_label(l))
            .filter(|l| !l.is_empty())
            .collect()
    }
}

/// Explicit and learned preferences of a single user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    pub user_id: String,
    #[serde(default)]
    pub topics: BTreeSet<String>,
    #[serde(default)]
    pub excluded_topics: BTreeSet<String>,
    #[serde(default)]
    pub preferred_sources: BTreeSet<String>,
    #[serde(default)]
    pub excluded_sources: BTreeSet<String>,
    #[serde(default)]
    pub tone: Option<String>,
    /// Minutes the user is willing to spend per session
    #[serde(default)]
    pub reading_time_budget: Option<u32>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl UserPreferences {
    /// Empty preferences for a user with no history
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            topics: BTreeSet::new(),
            excluded_topics: BTreeSet::new(),
            preferred_sources: BTreeSet::new(),
            excluded_sources: BTreeSet::new(),
            tone: None,
            reading_time_budget: None,
            updated_at: Utc::now(),
        }
    }

    pub fn has_topic(&self, label: &str) -> bool {
        self.topics.contains(&normalize_label(label))
    }

    pub fn excludes_topic(&self, label: &str) -> bool {
        self.excluded_topics.contains(&normalize_label(label))
    }

    pub fn prefers_source(&self, source: &str) -> bool {
        self.preferred_sources.contains(&normalize_label(source))
    }

    pub fn excludes_source(&self, source: &str) -> bool {
        self.excluded_sources.contains(&normalize_label(source))
    }

    /// Lowercase every label so lookups are case-insensitive
    pub fn normalized(mut self) -> Self {
        let norm = |set: BTreeSet<String>| -> BTreeSet<String> {
            set.iter()
                .map(|l| normalize_label(l))
                .filter(|l| !l.is_empty())
                .collect()
        };
        self.topics = norm(self.topics);
        self.excluded_topics = norm(self.excluded_topics);
        self.preferred_sources = norm(self.preferred_sources);
        self.excluded_sources = norm(self.excluded_sources);
        self
    }
}

/// Kind of feedback a user gave on an article
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionAction {
    ReadMore,
    Hide,
    Like,
    Share,
}

impl InteractionAction {
    /// Parse the wire representation (`read_more`, `hide`, `like`, `share`)
    pub fn parse(value: &str) -> std::result::Result<Self, LearningError> {
        match value.trim() {
            "read_more" => Ok(Self::ReadMore),
            "hide" => Ok(Self::Hide),
            "like" => Ok(Self::Like),
            "share" => Ok(Self::Share),
            other => Err(LearningError::UnknownAction(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadMore => "read_more",
            Self::Hide => "hide",
            Self::Like => "like",
            Self::Share => "share",
        }
    }

    pub fn is_positive(&self) -> bool {
        !matches!(self, Self::Hide)
    }
}

impl fmt::Display for InteractionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only user feedback event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserInteraction {
    pub user_id: String,
    pub article_id: String,
    pub action: InteractionAction,
    pub timestamp: DateTime<Utc>,
}

impl UserInteraction {
    pub fn new(
        user_id: impl Into<String>,
        article_id: impl Into<String>,
        action: InteractionAction,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            article_id: article_id.into(),
            action,
            timestamp,
        }
    }

    pub fn validate(&self) -> std::result::Result<(), LearningError> {
        if self.user_id.trim().is_empty() {
            return Err(LearningError::MissingField {
                field: "user_id",
                article_id: self.article_id.clone(),
            });
        }
        if self.article_id.trim().is_empty() {
            return Err(LearningError::MissingField {
                field: "article_id",
                article_id: String::new(),
            });
        }
        Ok(())
    }
}

/// Inclusive publish-date window; either bound may be open
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| *ts >= s) && self.end.map_or(true, |e| *ts <= e)
    }
}

/// Post-filters applied to nearest-neighbor candidates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub date_range: Option<DateRange>,
    #[serde(default)]
    pub min_relevance_score: Option<f32>,
}

impl SearchFilters {
    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources = sources.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    pub fn with_min_relevance(mut self, score: f32) -> Self {
        self.min_relevance_score = Some(score);
        self
    }

    /// Names of the filters that are active, for diagnostics
    pub fn active(&self) -> Vec<String> {
        let mut applied = Vec::new();
        if !self.categories.is_empty() {
            applied.push("category".to_string());
        }
        if !self.sources.is_empty() {
            applied.push("source".to_string());
        }
        if self.date_range.is_some() {
            applied.push("date_range".to_string());
        }
        if self.min_relevance_score.is_some() {
            applied.push("min_relevance_score".to_string());
        }
        applied
    }

    /// Whether a scored chunk passes every active filter
    pub fn matches(&self, chunk: &TextChunk, score: f32) -> bool {
        if !self.categories.is_empty() {
            let category = normalize_label(&chunk.metadata.category);
            if !self.categories.iter().any(|c| normalize_label(c) == category) {
                return false;
            }
        }
        if !self.sources.is_empty() {
            let source = normalize_label(&chunk.metadata.source);
            if !self.sources.iter().any(|s| normalize_label(s) == source) {
                return false;
            }
        }
        if let Some(range) = &self.date_range {
            if !range.contains(&chunk.metadata.published_at) {
                return false;
            }
        }
        if let Some(min) = self.min_relevance_score {
            if score < min {
                return false;
            }
        }
        true
    }
}

/// A chunk with its relevance to the query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk: TextChunk,
    pub relevance_score: f32,
}

/// Search input: free text to embed, or an already-computed vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Query {
    Text(String),
    Vector(Vec<f32>),
}
