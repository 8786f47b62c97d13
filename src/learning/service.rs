/// Interaction ingestion: validate, append, learn, and commit on request
use super::{ArticleCatalog, InteractionLearner, LearningError, LearningOutcome};
use crate::error::Result;
use crate::storage::PreferenceStore;
use crate::types::{UserInteraction, UserPreferences};
use ahash::AHashMap;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

/// Entry point for user feedback
///
/// Updates for the same user are serialized through a per-user lock;
/// different users proceed in parallel.
pub struct InteractionService {
    learner: InteractionLearner,
    store: Arc<PreferenceStore>,
    catalog: Arc<dyn ArticleCatalog>,
    /// Key: user_id, Value: lock guarding that user's preference updates
    user_locks: Mutex<AHashMap<String, Arc<AsyncMutex<()>>>>,
}

impl InteractionService {
    pub fn new(
        learner: InteractionLearner,
        store: Arc<PreferenceStore>,
        catalog: Arc<dyn ArticleCatalog>,
    ) -> Self {
        Self {
            learner,
            store,
            catalog,
            user_locks: Mutex::new(AHashMap::new()),
        }
    }

    /// Record a batch of one user's events and propose new preferences
    ///
    /// The batch is rejected as a whole when empty, malformed, or spanning
    /// several users; nothing is stored in that case. Redelivered events are
    /// ignored by the store. The proposal is not committed.
    pub async fn ingest(&self, events: Vec<UserInteraction>) -> Result<LearningOutcome> {
        if events.is_empty() {
            return Err(LearningError::EmptyBatch.into());
        }
        for event in &events {
            event.validate()?;
        }

        let users: BTreeSet<&str> = events.iter().map(|e| e.user_id.as_str()).collect();
        if users.len() > 1 {
            return Err(
                LearningError::MixedUsers(users.into_iter().map(String::from).collect()).into(),
            );
        }
        let user_id = events[0].user_id.clone();

        let outcome = self
            .with_user_lock(&user_id, || {
                let appended = self.store.append_interactions(&events)?;
                debug!(
                    "Appended {} of {} interactions for user {}",
                    appended,
                    events.len(),
                    user_id
                );

                let current = self.preferences(&user_id)?;
                let history = self.store.interactions_for(&user_id)?;
                Ok(self.learner.learn(&current, &history, self.catalog.as_ref())?)
            })
            .await?;

        info!(
            "Proposed {} preference changes for user {} (confidence {:.2})",
            outcome.changes.len(),
            user_id,
            outcome.confidence
        );
        Ok(outcome)
    }

    /// Persist a proposal returned by [`InteractionService::ingest`]
    pub async fn commit(&self, outcome: &LearningOutcome) -> Result<()> {
        let user_id = &outcome.proposed.user_id;
        self.with_user_lock(user_id, || self.store.save_preferences(&outcome.proposed))
            .await?;
        info!("Committed preferences for user {}", user_id);
        Ok(())
    }

    /// Stored preferences, or empty ones for an unknown user
    pub fn preferences(&self, user_id: &str) -> Result<UserPreferences> {
        Ok(self
            .store
            .load_preferences(user_id)?
            .unwrap_or_else(|| UserPreferences::new(user_id)))
    }

    /// Replace a user's explicit preferences
    pub async fn set_preferences(&self, prefs: UserPreferences) -> Result<()> {
        let prefs = prefs.normalized();
        self.with_user_lock(&prefs.user_id, || self.store.save_preferences(&prefs))
            .await
    }

    /// Run `work` while holding the user's lock, then forget the lock if no
    /// other task is waiting on it
    async fn with_user_lock<T>(&self, user_id: &str, work: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock = self.user_lock(user_id);
        let result = {
            let _guard = lock.lock().await;
            work()
        };
        drop(lock);

        let mut locks = self.user_locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks
            .get(user_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(user_id);
        }
        result
    }

    fn user_lock(&self, user_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.user_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}
