//! Snapshot files: the whole store as one JSON document.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{Result, StoreError};
use crate::store::Store;
use crate::tables::Tables;

/// Current snapshot layout version.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub format_version: u32,
    pub saved_at: DateTime<Utc>,
    pub tables: Tables,
}

/// Save the store to `path`.
///
/// Uses atomic write (uniquely named temp file + rename) so a crash never
/// leaves a half-written snapshot behind. Saves of one store are serialized
/// and each copies the tables only once it holds the save lock, so the file
/// left behind is always the newest copy.
pub fn save_snapshot(store: &Store, path: &Path) -> Result<()> {
    let _saving = store.save_guard();
    let snapshot = Snapshot {
        format_version: SNAPSHOT_FORMAT_VERSION,
        saved_at: Utc::now(),
        tables: store.tables(),
    };
    let bytes = serde_json::to_vec(&snapshot).map_err(|e| StoreError::Serialization {
        source: Box::new(e),
    })?;

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| StoreError::Io {
        operation: "create directory",
        path: parent.to_path_buf(),
        source: e,
    })?;

    let mut file = NamedTempFile::new_in(parent).map_err(|e| StoreError::Io {
        operation: "create",
        path: parent.to_path_buf(),
        source: e,
    })?;
    let temp_path = file.path().to_path_buf();
    file.write_all(&bytes).map_err(|e| StoreError::Io {
        operation: "write",
        path: temp_path.clone(),
        source: e,
    })?;
    file.as_file().sync_all().map_err(|e| StoreError::Io {
        operation: "sync",
        path: temp_path.clone(),
        source: e,
    })?;

    file.persist(path).map_err(|e| StoreError::AtomicWriteFailed {
        temp_path,
        target_path: path.to_path_buf(),
        source: e.error,
    })?;

    tracing::info!(documents = snapshot.tables.documents.len(), "saved snapshot to {}", path.display());
    Ok(())
}

/// Load a store from a snapshot written by [`save_snapshot`].
pub fn load_snapshot(path: &Path) -> Result<Store> {
    let bytes = fs::read(path).map_err(|e| StoreError::Io {
        operation: "read",
        path: path.to_path_buf(),
        source: e,
    })?;
    let snapshot: Snapshot =
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Deserialization {
            source: Box::new(e),
        })?;
    if snapshot.format_version > SNAPSHOT_FORMAT_VERSION {
        return Err(StoreError::InvalidSnapshot {
            path: path.to_path_buf(),
            reason: format!(
                "format version {} is newer than supported version {SNAPSHOT_FORMAT_VERSION}",
                snapshot.format_version
            ),
        });
    }

    tracing::info!(
        documents = snapshot.tables.documents.len(),
        saved_at = %snapshot.saved_at,
        "loaded snapshot from {}",
        path.display()
    );
    Ok(Store::from_tables(snapshot.tables))
}

/// Load `path` when it exists, otherwise start empty.
pub fn open_or_create(path: &Path) -> Result<Store> {
    if path.exists() {
        load_snapshot(path)
    } else {
        tracing::debug!("no snapshot at {}, starting empty", path.display());
        Ok(Store::new())
    }
}

/// Save a snapshot on the blocking thread pool.
pub async fn save_snapshot_async(store: Arc<Store>, path: PathBuf) -> Result<()> {
    tokio::task::spawn_blocking(move || save_snapshot(&store, &path))
        .await
        .map_err(|e| StoreError::Serialization {
            source: Box::new(e),
        })?
}

/// Load a snapshot on the blocking thread pool.
pub async fn load_snapshot_async(path: PathBuf) -> Result<Store> {
    tokio::task::spawn_blocking(move || load_snapshot(&path))
        .await
        .map_err(|e| StoreError::Deserialization {
            source: Box::new(e),
        })?
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn empty_store_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");
        save_snapshot(&Store::new(), &path).unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());

        let loaded = load_snapshot(&path).unwrap();
        assert!(loaded.sets().is_empty());
    }

    #[test]
    fn newer_format_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        let snapshot = Snapshot {
            format_version: SNAPSHOT_FORMAT_VERSION + 1,
            saved_at: Utc::now(),
            tables: Tables::default(),
        };
        fs::write(&path, serde_json::to_vec(&snapshot).unwrap()).unwrap();
        assert!(matches!(
            load_snapshot(&path),
            Err(StoreError::InvalidSnapshot { .. })
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempdir().unwrap();
        let err = load_snapshot(&dir.path().join("absent.json")).err().unwrap();
        assert!(matches!(err, StoreError::Io { operation: "read", .. }));
        assert!(open_or_create(&dir.path().join("absent.json")).is_ok());
    }
}
