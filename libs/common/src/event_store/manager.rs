//! JSON snapshots of the in-memory event store.
//!
//! Handles loading and saving every stored event to/from a JSON file.
//! Writes go to a temporary file first and are renamed into place, so a
//! crash mid-write never leaves a truncated snapshot behind.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::memory::MemoryEventStore;
use super::types::{IndexedEvent, INDEXER_VERSION};

/// Environment variable name for snapshot path configuration
pub const SNAPSHOT_PATH_ENV_VAR: &str = "EVENT_STORE_SNAPSHOT_PATH";

/// Errors that can occur during snapshot operations
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("failed to read snapshot '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write snapshot '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to rename '{from}' to '{to}': {source}")]
    Rename {
        from: String,
        to: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse snapshot: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[source] serde_json::Error),
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotFile {
    indexer_version: String,
    events: Vec<IndexedEvent>,
}

/// Loads and saves event store snapshots.
#[derive(Debug, Clone)]
pub struct SnapshotManager {
    path: PathBuf,
}

impl SnapshotManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every persisted event. A missing file yields an empty list.
    pub fn load(&self) -> Result<Vec<IndexedEvent>, SnapshotError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&self.path).map_err(|source| SnapshotError::Read {
            path: self.display(),
            source,
        })?;

        let file: SnapshotFile = serde_json::from_str(&contents).map_err(SnapshotError::Parse)?;
        if file.indexer_version != INDEXER_VERSION {
            tracing::info!(
                snapshot_version = %file.indexer_version,
                current_version = INDEXER_VERSION,
                "Loading snapshot written by a different indexer version"
            );
        }
        Ok(file.events)
    }

    /// Load the snapshot into a fresh [`MemoryEventStore`].
    pub fn load_store(&self) -> Result<MemoryEventStore, SnapshotError> {
        Ok(MemoryEventStore::from_events(self.load()?))
    }

    /// Persist the full contents of `store` atomically.
    pub fn save_store(&self, store: &MemoryEventStore) -> Result<usize, SnapshotError> {
        let events = store.snapshot();
        let count = events.len();
        self.save(events)?;
        Ok(count)
    }

    /// Write-to-temp-then-rename save.
    pub fn save(&self, events: Vec<IndexedEvent>) -> Result<(), SnapshotError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|source| SnapshotError::Write {
                    path: self.display(),
                    source,
                })?;
            }
        }

        let file = SnapshotFile {
            indexer_version: INDEXER_VERSION.to_string(),
            events,
        };
        let json = serde_json::to_string(&file).map_err(SnapshotError::Serialize)?;

        let temp_path = PathBuf::from(format!("{}.tmp", self.display()));
        let write_err = |source| SnapshotError::Write {
            path: temp_path.display().to_string(),
            source,
        };

        let mut out = fs::File::create(&temp_path).map_err(write_err)?;
        out.write_all(json.as_bytes()).map_err(write_err)?;
        out.sync_all().map_err(write_err)?;

        fs::rename(&temp_path, &self.path).map_err(|source| SnapshotError::Rename {
            from: temp_path.display().to_string(),
            to: self.display(),
            source,
        })?;

        Ok(())
    }

    fn display(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::ContractName;
    use crate::event_store::store::EventStore;
    use crate::event_store::types::fixtures::event;
    use std::sync::atomic::{AtomicU64, Ordering};

    // Counter for unique test file paths
    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn unique_temp_path() -> PathBuf {
        let counter = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!(
            "event_store_snapshot_{}_{}.json",
            std::process::id(),
            counter
        ))
    }

    fn cleanup(path: &Path) {
        let _ = fs::remove_file(path);
        let _ = fs::remove_file(format!("{}.tmp", path.display()));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let path = unique_temp_path();
        cleanup(&path);

        let manager = SnapshotManager::new(&path);
        assert!(manager.load().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_and_load_store() {
        let path = unique_temp_path();
        cleanup(&path);
        let manager = SnapshotManager::new(&path);

        let store = MemoryEventStore::new();
        store
            .insert_many(vec![
                event(ContractName::Token, "Transfer", "0xa", 0, 10),
                event(ContractName::Staking, "Staked", "0xb", 2, 12),
            ])
            .await
            .unwrap();

        assert_eq!(manager.save_store(&store).unwrap(), 2);
        assert!(!PathBuf::from(format!("{}.tmp", path.display())).exists());

        let loaded = manager.load_store().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(
            loaded.last_indexed_block(ContractName::Staking, 137).await.unwrap(),
            Some(12)
        );

        cleanup(&path);
    }

    #[test]
    fn test_corrupt_snapshot_is_an_error() {
        let path = unique_temp_path();
        fs::write(&path, "{not json").unwrap();

        let err = SnapshotManager::new(&path).load().unwrap_err();
        assert!(matches!(err, SnapshotError::Parse(_)));

        cleanup(&path);
    }
}
