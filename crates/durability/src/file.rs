//! Directory-backed persistence adapter
//!
//! One JSON file per storage key under a base directory. Writes go through
//! a temporary file followed by an atomic rename, so a crash mid-save
//! leaves the previous snapshot intact.

use crate::adapter::PersistenceAdapter;
use crate::envelope::SnapshotEnvelope;
use async_trait::async_trait;
use basalt_core::{StoreError, StoreResult};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Adapter storing envelopes as JSON files in a directory.
#[derive(Debug)]
pub struct DirectoryAdapter {
    base: PathBuf,
}

impl DirectoryAdapter {
    /// Open (creating if needed) a directory-backed adapter.
    pub fn open(base: impl AsRef<Path>) -> StoreResult<Self> {
        let base = base.as_ref().to_path_buf();
        std::fs::create_dir_all(&base)?;
        Ok(Self { base })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.base.join(format!("{}.json", sanitize(key)))
    }
}

/// Storage keys contain `:`; keep file names portable.
fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait]
impl PersistenceAdapter for DirectoryAdapter {
    async fn save(&self, key: &str, envelope: SnapshotEnvelope) -> StoreResult<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(&envelope)?;

        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(key, path = %path.display(), "snapshot saved");
        Ok(())
    }

    async fn load(&self, key: &str) -> StoreResult<Option<SnapshotEnvelope>> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let envelope = serde_json::from_slice(&bytes).map_err(|e| {
            StoreError::persistence_with_source(format!("corrupt snapshot at {}", path.display()), e)
        })?;
        Ok(Some(envelope))
    }
}
