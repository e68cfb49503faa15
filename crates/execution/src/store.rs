//! JSON file persistence of managed positions.

use chrono::{DateTime, Utc};
use clmm_keeper_domain::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Current on-disk format version.
pub const STORE_VERSION: u32 = 1;

/// Errors from the position store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("position store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("position store is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("unsupported position store version {found}, expected {expected}", expected = STORE_VERSION)]
    Version { found: u32 },
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredPositions {
    version: u32,
    saved_at: DateTime<Utc>,
    positions: Vec<ManagedPosition>,
}

/// Persists the managed position table so a restart picks up where it left off,
/// pending deposits included.
#[derive(Debug, Clone)]
pub struct PositionStore {
    path: PathBuf,
}

impl PositionStore {
    /// Creates a store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads stored positions. A missing file yields an empty table.
    pub async fn load(&self) -> Result<Vec<ManagedPosition>, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No position store yet");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let stored: StoredPositions = serde_json::from_str(&content)?;
        if stored.version != STORE_VERSION {
            return Err(StoreError::Version {
                found: stored.version,
            });
        }

        info!(
            path = %self.path.display(),
            positions = stored.positions.len(),
            saved_at = %stored.saved_at,
            "Loaded position store"
        );
        Ok(stored.positions)
    }

    /// Writes the table to a temporary file and renames it over the store.
    pub async fn save(
        &self,
        positions: &[ManagedPosition],
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let stored = StoredPositions {
            version: STORE_VERSION,
            saved_at: now,
            positions: positions.to_vec(),
        };
        let content = serde_json::to_string_pretty(&stored)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), positions = positions.len(), "Saved position store");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position(pool: &str) -> ManagedPosition {
        ManagedPosition::opened(
            PoolId::new(pool),
            PositionId::new(format!("{pool}-pos")),
            TickRange::new(90, 110),
            100,
            TokenAmounts::new(dec!(1), dec!(100)),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = PositionStore::new(dir.path().join("positions.json"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_and_load_keeps_pending_deposit() {
        let dir = tempfile::tempdir().unwrap();
        let store = PositionStore::new(dir.path().join("state").join("positions.json"));

        let mut pending = position("a");
        pending.pending_deposit = Some(PendingDeposit {
            target_range: TickRange::new(110, 130),
            center: 120,
            amounts: TokenAmounts::new(dec!(1), dec!(100)),
            since: Utc::now(),
        });
        let positions = vec![pending, position("b")];

        store.save(&positions, Utc::now()).await.unwrap();
        let loaded = store.load().await.unwrap();

        assert_eq!(loaded, positions);
        assert!(loaded[0].has_pending_deposit());
    }

    #[tokio::test]
    async fn test_rejects_unknown_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("positions.json");
        tokio::fs::write(
            &path,
            r#"{"version": 99, "saved_at": "2024-01-01T00:00:00Z", "positions": []}"#,
        )
        .await
        .unwrap();

        let err = PositionStore::new(path).load().await.unwrap_err();
        assert!(matches!(err, StoreError::Version { found: 99 }));
    }
}
