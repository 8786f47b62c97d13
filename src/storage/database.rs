//! SQLite persistence for user preferences and the interaction log
//!
//! Interactions are append-only; the UNIQUE constraint plus
//! `INSERT OR IGNORE` makes redelivered events harmless.

use crate::error::{FeedsenseError, Result};
use crate::types::{InteractionAction, UserInteraction, UserPreferences};
use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::path::Path;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Preference and interaction store with migration support
pub struct PreferenceStore {
    pool: DbPool,
}

impl PreferenceStore {
    /// Open (or create) the store at `db_path`
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FeedsenseError::Io {
                source: e,
                context: format!("Failed to create database directory: {:?}", parent),
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA foreign_keys = ON;
                PRAGMA busy_timeout = 5000;
                ",
            )
        });

        let pool = Pool::builder()
            .max_size(8)
            .build(manager)
            .map_err(|e| FeedsenseError::Config(format!("Failed to create connection pool: {}", e)))?;

        let store = Self { pool };
        store.migrate()?;
        Ok(store)
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| FeedsenseError::Config(format!("Failed to get connection: {}", e)))
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying migration {}", version);
                conn.execute_batch(migration)?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    /// Append interactions; returns how many were new
    pub fn append_interactions(&self, events: &[UserInteraction]) -> Result<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO interactions (user_id, article_id, action, timestamp)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for event in events {
                inserted += stmt.execute(params![
                    event.user_id,
                    event.article_id,
                    event.action.as_str(),
                    event.timestamp.timestamp_micros(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Full history of a user in delivery order
    pub fn interactions_for(&self, user_id: &str) -> Result<Vec<UserInteraction>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT user_id, article_id, action, timestamp
             FROM interactions WHERE user_id = ?1 ORDER BY timestamp, id",
        )?;

        let rows = stmt.query_map(params![user_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut history = Vec::new();
        for row in rows {
            let (user_id, article_id, action, micros) = row?;
            let action = InteractionAction::parse(&action)?;
            let timestamp = DateTime::<Utc>::from_timestamp_micros(micros).ok_or_else(|| {
                FeedsenseError::Processing(format!("Invalid stored timestamp: {}", micros))
            })?;
            history.push(UserInteraction {
                user_id,
                article_id,
                action,
                timestamp,
            });
        }
        Ok(history)
    }

    /// Stored preferences, if the user has any
    pub fn load_preferences(&self, user_id: &str) -> Result<Option<UserPreferences>> {
        let conn = self.get_conn()?;
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM preferences WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;

        data.map(|json| {
            serde_json::from_str::<UserPreferences>(&json)
                .map(UserPreferences::normalized)
                .map_err(|e| FeedsenseError::Json {
                    source: e,
                    context: format!("Failed to decode preferences of {}", user_id),
                })
        })
        .transpose()
    }

    /// Insert or replace a user's preferences
    pub fn save_preferences(&self, prefs: &UserPreferences) -> Result<()> {
        let json = serde_json::to_string(prefs).map_err(|e| FeedsenseError::Json {
            source: e,
            context: format!("Failed to encode preferences of {}", prefs.user_id),
        })?;

        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO preferences (user_id, data, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
            params![prefs.user_id, json, prefs.updated_at.timestamp_micros()],
        )?;
        Ok(())
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.get_conn()?;

        let user_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM preferences", [], |row| row.get(0))?;
        let interaction_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM interactions", [], |row| row.get(0))?;

        Ok(StoreStats {
            user_count: user_count as usize,
            interaction_count: interaction_count as usize,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub user_count: usize,
    pub interaction_count: usize,
}

/// Database migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: Initial schema
    r#"
    CREATE TABLE preferences (
        user_id TEXT PRIMARY KEY,
        data TEXT NOT NULL,       -- JSON-encoded UserPreferences
        updated_at INTEGER NOT NULL
    );

    CREATE TABLE interactions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT NOT NULL,
        article_id TEXT NOT NULL,
        action TEXT NOT NULL,
        timestamp INTEGER NOT NULL,  -- microseconds since epoch
        UNIQUE (user_id, article_id, action, timestamp)
    );

    CREATE INDEX idx_interactions_user ON interactions(user_id, timestamp);
    "#,
];
