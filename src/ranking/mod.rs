//! Personalized re-ranking of search candidates
//!
//! Composite score = w_r * relevance + w_t * topic_match + w_c * recency
//! + w_s * source_preference. Candidates from excluded sources or topics are
//! removed before scoring.

use crate::types::{SearchResult, UserPreferences};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Weight of each ranking signal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankingWeights {
    pub relevance: f64,
    pub topic_match: f64,
    pub recency: f64,
    pub source: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            relevance: 0.4,
            topic_match: 0.3,
            recency: 0.2,
            source: 0.1,
        }
    }
}

impl RankingWeights {
    pub fn sum(&self) -> f64 {
        self.relevance + self.topic_match + self.recency + self.source
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingConfig {
    /// Age at which the recency signal halves
    pub recency_half_life_hours: f64,
    pub weights: RankingWeights,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            recency_half_life_hours: 48.0,
            weights: RankingWeights::default(),
        }
    }
}

/// Per-signal values behind a composite score
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub relevance: f64,
    pub topic_match: f64,
    pub recency: f64,
    pub source: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedResult {
    pub result: SearchResult,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

pub struct PersonalizationRanker {
    config: RankingConfig,
}

impl PersonalizationRanker {
    pub fn new(config: RankingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    /// Rank candidates for a user as of now
    pub fn rank(&self, candidates: Vec<SearchResult>, prefs: &UserPreferences) -> Vec<RankedResult> {
        self.rank_at(candidates, prefs, Utc::now())
    }

    /// Rank candidates for a user as of `now`
    ///
    /// Sorted by composite score descending; ties go to the more recently
    /// published chunk, then to the smaller chunk id.
    pub fn rank_at(
        &self,
        candidates: Vec<SearchResult>,
        prefs: &UserPreferences,
        now: DateTime<Utc>,
    ) -> Vec<RankedResult> {
        let total = candidates.len();
        let weights = self.config.weights;
        // Callers may hand in preferences that were never normalized
        let prefs = &prefs.clone().normalized();

        let mut ranked: Vec<RankedResult> = candidates
            .into_iter()
            .filter(|c| !self.is_excluded(c, prefs))
            .map(|result| {
                let breakdown = ScoreBreakdown {
                    relevance: result.relevance_score as f64,
                    topic_match: topic_match(&result, prefs),
                    recency: self.recency(&result, now),
                    source: if prefs.prefers_source(&result.chunk.metadata.source) {
                        1.0
                    } else {
                        0.0
                    },
                };
                let score = weights.relevance * breakdown.relevance
                    + weights.topic_match * breakdown.topic_match
                    + weights.recency * breakdown.recency
                    + weights.source * breakdown.source;
                RankedResult {
                    result,
                    score,
                    breakdown,
                }
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    b.result
                        .chunk
                        .metadata
                        .published_at
                        .cmp(&a.result.chunk.metadata.published_at)
                })
                .then_with(|| a.result.chunk.id.cmp(&b.result.chunk.id))
        });

        debug!(
            "Ranked {} candidates for user {} ({} excluded)",
            ranked.len(),
            prefs.user_id,
            total - ranked.len()
        );
        ranked
    }

    fn is_excluded(&self, candidate: &SearchResult, prefs: &UserPreferences) -> bool {
        prefs.excludes_source(&candidate.chunk.metadata.source)
            || prefs.excludes_topic(&candidate.chunk.metadata.category)
    }

    /// `0.5^(age / half_life)`, 1.0 for articles dated in the future
    fn recency(&self, candidate: &SearchResult, now: DateTime<Utc>) -> f64 {
        let age_ms = (now - candidate.chunk.metadata.published_at).num_milliseconds();
        if age_ms <= 0 {
            return 1.0;
        }
        let half_life = self.config.recency_half_life_hours;
        if half_life <= 0.0 {
            return 0.0;
        }
        let age_hours = age_ms as f64 / 3_600_000.0;
        0.5f64.powf(age_hours / half_life)
    }
}

impl Default for PersonalizationRanker {
    fn default() -> Self {
        Self::new(RankingConfig::default())
    }
}

/// Share of the candidate's labels (category and tags) the user follows
fn topic_match(candidate: &SearchResult, prefs: &UserPreferences) -> f64 {
    let labels = candidate.chunk.labels();
    if labels.is_empty() {
        return 0.0;
    }
    let matched = labels.iter().filter(|l| prefs.topics.contains(*l)).count();
    matched as f64 / labels.len() as f64
}

/// Drop the breakdown and carry the composite score as relevance
pub fn into_results(ranked: Vec<RankedResult>) -> Vec<SearchResult> {
    ranked
        .into_iter()
        .map(|r| SearchResult {
            relevance_score: r.score as f32,
            chunk: r.result.chunk,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RawArticle, TextChunk};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 10, 12, 0, 0).unwrap()
    }

    fn candidate(id: &str, category: &str, source: &str, age_hours: i64, relevance: f32) -> SearchResult {
        let article = RawArticle {
            id: id.to_string(),
            headline: String::new(),
            content: String::new(),
            source: source.to_string(),
            category: category.to_string(),
            published_at: now() - Duration::hours(age_hours),
            url: String::new(),
            tags: Vec::new(),
        };
        SearchResult {
            chunk: TextChunk::from_article(&article, 0, format!("{} body", id)),
            relevance_score: relevance,
        }
    }

    fn ids(ranked: &[RankedResult]) -> Vec<String> {
        ranked.iter().map(|r| r.result.chunk.article_id.clone()).collect()
    }

    #[test]
    fn test_cold_start_uses_relevance_and_recency_only() {
        let ranker = PersonalizationRanker::default();
        let prefs = UserPreferences::new("new-user");
        let candidates = vec![
            candidate("old-relevant", "science", "Nature", 24 * 10, 0.95),
            candidate("fresh", "science", "AP", 1, 0.7),
            candidate("weak", "sports", "ESPN", 2, 0.2),
        ];

        let ranked = ranker.rank_at(candidates, &prefs, now());

        for r in &ranked {
            assert_eq!(r.breakdown.topic_match, 0.0);
            assert_eq!(r.breakdown.source, 0.0);
            let expected = 0.4 * r.breakdown.relevance + 0.2 * r.breakdown.recency;
            assert!((r.score - expected).abs() < 1e-9);
        }
        assert_eq!(ids(&ranked), vec!["fresh", "old-relevant", "weak"]);
    }

    #[test]
    fn test_excluded_sources_and_topics_never_returned() {
        let ranker = PersonalizationRanker::default();
        let mut prefs = UserPreferences::new("u1");
        prefs.excluded_sources.insert("tabloid daily".to_string());
        prefs.excluded_topics.insert("politics".to_string());

        let candidates = vec![
            candidate("a", "science", "Tabloid Daily", 1, 0.99),
            candidate("b", "Politics", "Reuters", 1, 0.98),
            candidate("c", "science", "Reuters", 1, 0.5),
        ];

        let ranked = ranker.rank_at(candidates, &prefs, now());
        assert_eq!(ids(&ranked), vec!["c"]);
    }

    #[test]
    fn test_mixed_case_preferences() {
        let ranker = PersonalizationRanker::default();
        let mut prefs = UserPreferences::new("u1");
        prefs.excluded_sources.insert("TabloidDaily".to_string());
        prefs.excluded_topics.insert("Politics".to_string());
        prefs.topics.insert("Science".to_string());
        prefs.preferred_sources.insert("Nature".to_string());

        let candidates = vec![
            candidate("gossip", "science", "TabloidDaily", 1, 0.99),
            candidate("vote", "politics", "Reuters", 1, 0.98),
            candidate("paper", "SCIENCE", "nature", 1, 0.5),
        ];

        let ranked = ranker.rank_at(candidates, &prefs, now());
        assert_eq!(ids(&ranked), vec!["paper"]);
        assert_eq!(ranked[0].breakdown.topic_match, 1.0);
        assert_eq!(ranked[0].breakdown.source, 1.0);
    }

    #[test]
    fn test_preferences_lift_matching_candidates() {
        let ranker = PersonalizationRanker::default();
        let mut prefs = UserPreferences::new("u1");
        prefs.topics.insert("sports".to_string());
        prefs.preferred_sources.insert("espn".to_string());

        let candidates = vec![
            candidate("generic", "business", "AP", 5, 0.8),
            candidate("liked", "Sports", "ESPN", 5, 0.6),
        ];

        let ranked = ranker.rank_at(candidates, &prefs, now());
        assert_eq!(ids(&ranked), vec!["liked", "generic"]);
        assert_eq!(ranked[0].breakdown.topic_match, 1.0);
        assert_eq!(ranked[0].breakdown.source, 1.0);
    }

    #[test]
    fn test_recency_half_life() {
        let ranker = PersonalizationRanker::default();
        let prefs = UserPreferences::new("u1");
        let ranked = ranker.rank_at(
            vec![
                candidate("two-days", "x", "y", 48, 0.5),
                candidate("future", "x", "y", -3, 0.5),
            ],
            &prefs,
            now(),
        );
        assert_eq!(ranked[0].breakdown.recency, 1.0);
        assert!((ranked[1].breakdown.recency - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_ties_prefer_recent_then_id() {
        let config = RankingConfig {
            weights: RankingWeights {
                relevance: 1.0,
                topic_match: 0.0,
                recency: 0.0,
                source: 0.0,
            },
            ..RankingConfig::default()
        };
        let ranker = PersonalizationRanker::new(config);
        let prefs = UserPreferences::new("u1");
        let ranked = ranker.rank_at(
            vec![
                candidate("b", "x", "y", 10, 0.5),
                candidate("older", "x", "y", 20, 0.5),
                candidate("a", "x", "y", 10, 0.5),
            ],
            &prefs,
            now(),
        );
        assert_eq!(ids(&ranked), vec!["a", "b", "older"]);
    }

    #[test]
    fn test_into_results_carries_composite_score() {
        let ranker = PersonalizationRanker::default();
        let prefs = UserPreferences::new("u1");
        let ranked = ranker.rank_at(vec![candidate("a", "x", "y", 0, 1.0)], &prefs, now());
        let score = ranked[0].score;
        let results = into_results(ranked);
        assert!((results[0].relevance_score as f64 - score).abs() < 1e-6);
    }
}
