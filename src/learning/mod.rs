//! Interaction-driven preference learning
//!
//! [`InteractionLearner::learn`] is a pure function from the current
//! preferences and an interaction history to a proposed preference set. It
//! performs no I/O; committing the proposal is the caller's job (see
//! [`InteractionService`]).

mod service;

pub use service::InteractionService;

use crate::index::VectorIndex;
use crate::types::{normalize_label, UserInteraction, UserPreferences};
use ahash::AHashSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LearningError {
    #[error("Unknown interaction action: {0}")]
    UnknownAction(String),

    #[error("Interaction is missing {field} (article: {article_id})")]
    MissingField {
        field: &'static str,
        article_id: String,
    },

    #[error("Interaction for user {actual} in history of user {expected}")]
    ForeignUser { expected: String, actual: String },

    #[error("Interaction batch mixes users: {0:?}")]
    MixedUsers(Vec<String>),

    #[error("Interaction batch is empty")]
    EmptyBatch,
}

/// Thresholds for promoting and demoting labels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnerConfig {
    /// Positive events needed before a label is promoted
    pub min_positive_events: usize,
    /// Negative events needed before a label is excluded
    pub min_negative_events: usize,
    /// Negatives must reach this multiple of positives to exclude
    pub demote_ratio: f64,
    pub max_topics: usize,
    pub max_sources: usize,
    /// Event count at which confidence reaches ~63% of dominance
    pub confidence_scale: f64,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            min_positive_events: 3,
            min_negative_events: 3,
            demote_ratio: 2.0,
            max_topics: 20,
            max_sources: 20,
            confidence_scale: 5.0,
        }
    }
}

/// What the learner needs to know about an article
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleContext {
    pub category: String,
    pub source: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Lookup from article id to its labels
pub trait ArticleCatalog: Send + Sync {
    fn article_context(&self, article_id: &str) -> Option<ArticleContext>;
}

impl ArticleCatalog for VectorIndex {
    fn article_context(&self, article_id: &str) -> Option<ArticleContext> {
        self.article_chunk(article_id).map(|chunk| ArticleContext {
            category: chunk.metadata.category,
            source: chunk.metadata.source,
            tags: chunk.metadata.tags,
        })
    }
}

impl ArticleCatalog for HashMap<String, ArticleContext> {
    fn article_context(&self, article_id: &str) -> Option<ArticleContext> {
        self.get(article_id).cloned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    AddTopic,
    ExcludeTopic,
    /// Removed to respect `max_topics`
    DropTopic,
    AddSource,
    ExcludeSource,
    /// Removed to respect `max_sources`
    DropSource,
}

/// One proposed edit to a preference set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferenceChange {
    pub kind: ChangeKind,
    pub label: String,
    pub positive: usize,
    pub negative: usize,
    pub confidence: f64,
}

/// Result of a learning pass; nothing is persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningOutcome {
    pub proposed: UserPreferences,
    pub changes: Vec<PreferenceChange>,
    /// Highest confidence among the changes, 0.0 without changes
    pub confidence: f64,
    /// Distinct events after duplicate removal
    pub events_considered: usize,
    /// Events whose article the catalog does not know
    pub unattributed: usize,
}

impl LearningOutcome {
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Tally {
    positive: usize,
    negative: usize,
}

impl Tally {
    fn record(&mut self, positive: bool) {
        if positive {
            self.positive += 1;
        } else {
            self.negative += 1;
        }
    }

    fn total(&self) -> usize {
        self.positive + self.negative
    }

    fn net(&self) -> i64 {
        self.positive as i64 - self.negative as i64
    }
}

/// Which preference sets a label family maps onto
#[derive(Clone, Copy)]
enum Family {
    Topic,
    Source,
}

impl Family {
    fn kinds(self) -> (ChangeKind, ChangeKind, ChangeKind) {
        match self {
            Family::Topic => (ChangeKind::AddTopic, ChangeKind::ExcludeTopic, ChangeKind::DropTopic),
            Family::Source => (
                ChangeKind::AddSource,
                ChangeKind::ExcludeSource,
                ChangeKind::DropSource,
            ),
        }
    }
}

/// Proposes preference updates from interaction history
#[derive(Debug, Clone, Default)]
pub struct InteractionLearner {
    config: LearnerConfig,
}

impl InteractionLearner {
    pub fn new(config: LearnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LearnerConfig {
        &self.config
    }

    /// Derive a preference proposal from `history`
    ///
    /// Every event must be well-formed and belong to `current.user_id`;
    /// otherwise the whole history is rejected. Exact duplicate events are
    /// counted once.
    ///
    /// # Arguments
    /// * `current` - Preferences the proposal starts from
    /// * `history` - Ordered interaction history of the user
    /// * `catalog` - Resolves article ids to category and source
    pub fn learn<C>(
        &self,
        current: &UserPreferences,
        history: &[UserInteraction],
        catalog: &C,
    ) -> Result<LearningOutcome, LearningError>
    where
        C: ArticleCatalog + ?Sized,
    {
        for event in history {
            event.validate()?;
            if event.user_id != current.user_id {
                return Err(LearningError::ForeignUser {
                    expected: current.user_id.clone(),
                    actual: event.user_id.clone(),
                });
            }
        }

        let mut seen: AHashSet<&UserInteraction> = AHashSet::with_capacity(history.len());
        let mut topic_tallies: BTreeMap<String, Tally> = BTreeMap::new();
        let mut sources: BTreeMap<String, Tally> = BTreeMap::new();
        let mut unattributed = 0;
        let mut latest: Option<DateTime<Utc>> = None;

        for event in history {
            if !seen.insert(event) {
                continue;
            }
            latest = latest.max(Some(event.timestamp));

            let Some(context) = catalog.article_context(&event.article_id) else {
                unattributed += 1;
                continue;
            };

            let positive = event.action.is_positive();
            // Tags count as topics, the same labels the ranker matches on
            let labels: BTreeSet<String> = std::iter::once(&context.category)
                .chain(context.tags.iter())
                .map(|l| normalize_label(l))
                .filter(|l| !l.is_empty())
                .collect();
            for label in labels {
                topic_tallies.entry(label).or_default().record(positive);
            }
            let source = normalize_label(&context.source);
            if !source.is_empty() {
                sources.entry(source).or_default().record(positive);
            }
        }

        let mut proposed = current.clone().normalized();
        let mut changes = Vec::new();

        {
            let UserPreferences {
                topics,
                excluded_topics,
                ..
            } = &mut proposed;
            self.apply(Family::Topic, &topic_tallies, topics, excluded_topics, &mut changes);
            self.bound(Family::Topic, &topic_tallies, topics, self.config.max_topics, &mut changes);
        }
        {
            let UserPreferences {
                preferred_sources,
                excluded_sources,
                ..
            } = &mut proposed;
            self.apply(Family::Source, &sources, preferred_sources, excluded_sources, &mut changes);
            self.bound(
                Family::Source,
                &sources,
                preferred_sources,
                self.config.max_sources,
                &mut changes,
            );
        }

        if !changes.is_empty() {
            if let Some(ts) = latest {
                proposed.updated_at = ts;
            }
        }

        let confidence = changes.iter().map(|c| c.confidence).fold(0.0, f64::max);

        debug!(
            "Learned {} changes for user {} from {} events ({} unattributed)",
            changes.len(),
            current.user_id,
            seen.len(),
            unattributed
        );

        Ok(LearningOutcome {
            proposed,
            changes,
            confidence,
            events_considered: seen.len(),
            unattributed,
        })
    }

    /// Promote and demote labels in sorted order
    fn apply(
        &self,
        family: Family,
        tallies: &BTreeMap<String, Tally>,
        preferred: &mut BTreeSet<String>,
        excluded: &mut BTreeSet<String>,
        changes: &mut Vec<PreferenceChange>,
    ) {
        let (add, exclude, _) = family.kinds();

        for (label, tally) in tallies {
            if self.promotes(tally) {
                let removed = excluded.remove(label);
                let added = preferred.insert(label.clone());
                if added || removed {
                    changes.push(self.change(add, label, tally));
                }
            } else if self.demotes(tally) {
                let removed = preferred.remove(label);
                let added = excluded.insert(label.clone());
                if added || removed {
                    changes.push(self.change(exclude, label, tally));
                }
            }
        }
    }

    /// Drop the lowest-net labels until `set` fits `cap`
    ///
    /// Labels without history in this pass count as net zero; ties go by name.
    fn bound(
        &self,
        family: Family,
        tallies: &BTreeMap<String, Tally>,
        set: &mut BTreeSet<String>,
        cap: usize,
        changes: &mut Vec<PreferenceChange>,
    ) {
        if set.len() <= cap {
            return;
        }
        let (add, _, drop) = family.kinds();

        let mut ranked: Vec<(i64, String)> = set
            .iter()
            .map(|label| (tallies.get(label).map_or(0, Tally::net), label.clone()))
            .collect();
        ranked.sort();

        let excess = set.len() - cap;
        for (_, label) in ranked.into_iter().take(excess) {
            set.remove(&label);
            // A label added in this pass and dropped again is no change at all
            let before = changes.len();
            changes.retain(|c| !(c.kind == add && c.label == label));
            if changes.len() == before {
                let tally = tallies.get(&label).copied().unwrap_or_default();
                changes.push(self.change(drop, &label, &tally));
            }
        }
    }

    fn promotes(&self, tally: &Tally) -> bool {
        tally.positive >= self.config.min_positive_events
            && (tally.negative as f64) < self.config.demote_ratio * tally.positive as f64
    }

    fn demotes(&self, tally: &Tally) -> bool {
        tally.negative >= self.config.min_negative_events
            && tally.negative as f64 >= self.config.demote_ratio * tally.positive as f64
    }

    fn change(&self, kind: ChangeKind, label: &str, tally: &Tally) -> PreferenceChange {
        PreferenceChange {
            kind,
            label: label.to_string(),
            positive: tally.positive,
            negative: tally.negative,
            confidence: self.confidence(tally),
        }
    }

    /// `dominance * (1 - exp(-n / scale))`
    fn confidence(&self, tally: &Tally) -> f64 {
        let n = tally.total();
        if n == 0 {
            return 0.0;
        }
        let dominance = tally.positive.max(tally.negative) as f64 / n as f64;
        let scale = self.config.confidence_scale.max(f64::EPSILON);
        dominance * (1.0 - (-(n as f64) / scale).exp())
    }
}
