//! Persistent per-asset version counters.
//!
//! Counters live in a small JSON document next to the assets. Every mutation
//! rewrites the document (temp file + rename) while holding the index lock, so
//! the file on disk always reflects the latest in-memory state.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::warn;

use crate::error::{Result, StoreError};

pub(crate) const INDEX_FILE_NAME: &str = ".versions.json";

pub(crate) struct VersionIndex {
    path: PathBuf,
    versions: Mutex<BTreeMap<String, u64>>,
}

impl VersionIndex {
    /// Load the index from `root`, starting empty if it is missing or unreadable.
    pub(crate) async fn load(root: &Path) -> Self {
        let path = root.join(INDEX_FILE_NAME);
        let versions = match tokio::fs::read(&path).await {
            Ok(raw) => serde_json::from_slice(&raw).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Ignoring corrupt version index");
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read version index");
                BTreeMap::new()
            }
        };

        Self {
            path,
            versions: Mutex::new(versions),
        }
    }

    pub(crate) async fn get(&self, name: &str) -> u64 {
        self.versions.lock().await.get(name).copied().unwrap_or(0)
    }

    /// Increment the counter for `name` and return the new value.
    pub(crate) async fn bump(&self, name: &str) -> Result<u64> {
        let mut versions = self.versions.lock().await;
        let entry = versions.entry(name.to_string()).or_insert(0);
        *entry = entry.saturating_add(1);
        let version = *entry;
        self.persist(&versions).await?;
        Ok(version)
    }

    /// Forget the counter for `name`, which reads back as version 0.
    pub(crate) async fn reset(&self, name: &str) -> Result<()> {
        let mut versions = self.versions.lock().await;
        if versions.remove(name).is_some() {
            self.persist(&versions).await?;
        }
        Ok(())
    }

    async fn persist(&self, versions: &BTreeMap<String, u64>) -> Result<()> {
        let raw = serde_json::to_vec_pretty(versions)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, raw)
            .await
            .map_err(|e| StoreError::io_path("writing", &tmp, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::io_path("replacing", &self.path, e))
    }
}
