//! On-disk snapshot of a vector index
//!
//! A snapshot directory holds `index.json` (the manifest) and
//! `chunks.json.zst` (the zstd-compressed chunk payload). The manifest
//! carries the BLAKE3 hash of the compressed payload, so a torn or edited
//! payload is detected before it is decoded.

use super::IndexError;
use crate::embedding::validate_embedding;
use crate::types::TextChunk;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

pub const INDEX_FORMAT_VERSION: u32 = 1;

const MANIFEST_FILE: &str = "index.json";
const PAYLOAD_FILE: &str = "chunks.json.zst";
const COMPRESSION_LEVEL: i32 = 3;

/// Describes the payload next to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub version: u32,
    pub dimension: usize,
    pub count: usize,
    /// BLAKE3 hex digest of the compressed payload
    pub checksum: String,
    pub created_at: DateTime<Utc>,
}

impl IndexManifest {
    /// Read only the manifest of a snapshot
    pub fn read(dir: &Path) -> Result<Self, IndexError> {
        let path = dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Err(IndexError::NotFound(dir.to_path_buf()));
        }
        let raw = fs::read(&path).map_err(|e| IndexError::Io {
            source: e,
            context: format!("Failed to read index manifest: {}", path.display()),
        })?;
        serde_json::from_slice(&raw)
            .map_err(|e| IndexError::Corrupted(format!("Invalid manifest: {}", e)))
    }
}

pub(super) fn write_snapshot(
    dir: &Path,
    dimension: usize,
    chunks: &[TextChunk],
) -> Result<(), IndexError> {
    fs::create_dir_all(dir).map_err(|e| IndexError::Io {
        source: e,
        context: format!("Failed to create index directory: {}", dir.display()),
    })?;

    let json = serde_json::to_vec(chunks)
        .map_err(|e| IndexError::SerializationError(e.to_string()))?;
    let payload = zstd::encode_all(&json[..], COMPRESSION_LEVEL).map_err(|e| IndexError::Io {
        source: e,
        context: "Failed to compress index payload".to_string(),
    })?;

    let manifest = IndexManifest {
        version: INDEX_FORMAT_VERSION,
        dimension,
        count: chunks.len(),
        checksum: blake3::hash(&payload).to_hex().to_string(),
        created_at: Utc::now(),
    };
    let manifest_json = serde_json::to_vec_pretty(&manifest)
        .map_err(|e| IndexError::SerializationError(e.to_string()))?;

    // Payload first: a manifest never points at a payload that isn't there
    write_atomic(&dir.join(PAYLOAD_FILE), &payload)?;
    write_atomic(&dir.join(MANIFEST_FILE), &manifest_json)?;
    Ok(())
}

pub(super) fn read_snapshot(dir: &Path, dimension: usize) -> Result<Vec<TextChunk>, IndexError> {
    let manifest = IndexManifest::read(dir)?;

    if manifest.version != INDEX_FORMAT_VERSION {
        return Err(IndexError::Corrupted(format!(
            "Unsupported index format version {} (expected {})",
            manifest.version, INDEX_FORMAT_VERSION
        )));
    }
    if manifest.dimension != dimension {
        return Err(IndexError::DimensionMismatch {
            expected: dimension,
            actual: manifest.dimension,
        });
    }

    let payload_path = dir.join(PAYLOAD_FILE);
    if !payload_path.exists() {
        return Err(IndexError::Corrupted(format!(
            "Missing payload: {}",
            payload_path.display()
        )));
    }
    let payload = fs::read(&payload_path).map_err(|e| IndexError::Io {
        source: e,
        context: format!("Failed to read index payload: {}", payload_path.display()),
    })?;

    let checksum = blake3::hash(&payload).to_hex().to_string();
    if checksum != manifest.checksum {
        return Err(IndexError::Corrupted("Payload checksum mismatch".to_string()));
    }

    let json = zstd::decode_all(&payload[..])
        .map_err(|e| IndexError::Corrupted(format!("Failed to decompress payload: {}", e)))?;
    let chunks: Vec<TextChunk> = serde_json::from_slice(&json)
        .map_err(|e| IndexError::Corrupted(format!("Invalid payload: {}", e)))?;

    if chunks.len() != manifest.count {
        return Err(IndexError::Corrupted(format!(
            "Manifest lists {} chunks, payload has {}",
            manifest.count,
            chunks.len()
        )));
    }
    for chunk in &chunks {
        validate_embedding(&chunk.embedding, dimension).map_err(|e| {
            IndexError::Corrupted(format!("Chunk {} has an invalid embedding: {}", chunk.id, e))
        })?;
    }

    Ok(chunks)
}

/// Write to a sibling temp file, fsync, then rename over the target
fn write_atomic(path: &Path, data: &[u8]) -> Result<(), IndexError> {
    let temp_path = path.with_extension("tmp");

    let mut file = fs::File::create(&temp_path).map_err(|e| IndexError::Io {
        source: e,
        context: format!("Failed to create temp file: {}", temp_path.display()),
    })?;
    file.write_all(data).map_err(|e| IndexError::Io {
        source: e,
        context: format!("Failed to write temp file: {}", temp_path.display()),
    })?;
    file.sync_all().map_err(|e| IndexError::Io {
        source: e,
        context: format!("Failed to sync temp file: {}", temp_path.display()),
    })?;
    drop(file);

    fs::rename(&temp_path, path).map_err(|e| IndexError::Io {
        source: e,
        context: format!(
            "Failed to rename {} -> {}",
            temp_path.display(),
            path.display()
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RawArticle;
    use tempfile::TempDir;

    fn chunks() -> Vec<TextChunk> {
        let article = RawArticle {
            id: "a1".to_string(),
            headline: "Rates".to_string(),
            content: String::new(),
            source: "Reuters".to_string(),
            category: "business".to_string(),
            published_at: Utc::now(),
            url: String::new(),
            tags: vec!["economy".to_string()],
        };
        (0..3)
            .map(|i| {
                let mut chunk = TextChunk::from_article(&article, i, format!("chunk {}", i));
                chunk.embedding = vec![1.0, i as f32, 0.5];
                chunk
            })
            .collect()
    }

    #[test]
    fn test_snapshot_roundtrip_preserves_metadata() {
        let temp = TempDir::new().unwrap();
        write_snapshot(temp.path(), 3, &chunks()).unwrap();

        let manifest = IndexManifest::read(temp.path()).unwrap();
        assert_eq!(manifest.version, INDEX_FORMAT_VERSION);
        assert_eq!(manifest.count, 3);

        let loaded = read_snapshot(temp.path(), 3).unwrap();
        assert_eq!(loaded, chunks());
        assert!(!temp.path().join("index.tmp").exists());
    }

    #[test]
    fn test_tampered_payload_detected() {
        let temp = TempDir::new().unwrap();
        write_snapshot(temp.path(), 3, &chunks()).unwrap();

        let payload_path = temp.path().join(PAYLOAD_FILE);
        let mut payload = fs::read(&payload_path).unwrap();
        let last = payload.len() - 1;
        payload[last] ^= 0xff;
        fs::write(&payload_path, payload).unwrap();

        assert!(matches!(
            read_snapshot(temp.path(), 3),
            Err(IndexError::Corrupted(_))
        ));
    }

    #[test]
    fn test_unknown_version_rejected() {
        let temp = TempDir::new().unwrap();
        write_snapshot(temp.path(), 3, &chunks()).unwrap();

        let mut manifest = IndexManifest::read(temp.path()).unwrap();
        manifest.version = 99;
        fs::write(
            temp.path().join(MANIFEST_FILE),
            serde_json::to_vec(&manifest).unwrap(),
        )
        .unwrap();

        assert!(matches!(
            read_snapshot(temp.path(), 3),
            Err(IndexError::Corrupted(_))
        ));
    }
}
