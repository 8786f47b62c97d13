//! Storage layer for feedsense
//!
//! Lays out the data directory and owns the SQLite preference store. The
//! vector index snapshot lives under `index/`; its format belongs to
//! [`crate::index`].

pub mod database;

use crate::error::{FeedsenseError, Result};
use std::path::{Path, PathBuf};

pub use database::{DbPool, PreferenceStore, StoreStats};

/// Resolved locations inside the data directory
#[derive(Debug, Clone)]
pub struct DataLayout {
    base_path: PathBuf,
}

impl DataLayout {
    /// Create the directory tree under `base_path`
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path).map_err(|e| FeedsenseError::Io {
            source: e,
            context: format!("Failed to create data directory: {}", base_path.display()),
        })?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Directory of the persisted vector index
    pub fn index_dir(&self) -> PathBuf {
        self.base_path.join("index")
    }

    /// SQLite file holding preferences and interactions
    pub fn database_path(&self) -> PathBuf {
        self.base_path.join("feedsense.db")
    }

    pub fn open_store(&self) -> Result<PreferenceStore> {
        PreferenceStore::new(&self.database_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_creation() {
        let temp_dir = TempDir::new().unwrap();
        let layout = DataLayout::new(temp_dir.path().join("data")).unwrap();

        assert!(layout.base_path().exists());
        assert!(layout.index_dir().starts_with(layout.base_path()));

        let _store = layout.open_store().unwrap();
        assert!(layout.database_path().exists());
    }
}
