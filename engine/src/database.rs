//! Explicit storage handle.
//!
//! [`Database::open`] builds both in-memory stores, seeding them from a JSON
//! snapshot when one is configured and present. [`Database::shutdown`] writes
//! the snapshot back. Nothing here is global: callers pass the handle (or the
//! stores it hands out) to whoever needs it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cropmart_common::crop::Crop;
use cropmart_common::interest::Interest;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::locks::{CropLocks, StaleCrops};
use crate::store::memory::{MemoryCropStore, MemoryInterestStore};

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("failed to read snapshot {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write snapshot {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("snapshot {path} is not valid: {source}")]
    Format {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// JSON snapshot loaded on open and written on shutdown. `None` keeps
    /// everything in memory only.
    pub snapshot_path: Option<PathBuf>,
}

/// On-disk form of both stores.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub crops: Vec<Crop>,
    #[serde(default)]
    pub interests: Vec<Interest>,
}

#[derive(Debug)]
pub struct Database {
    config: DatabaseConfig,
    crops: MemoryCropStore,
    interests: MemoryInterestStore,
    locks: Arc<CropLocks>,
    stale: Arc<StaleCrops>,
}

impl Database {
    pub fn in_memory() -> Self {
        Self::from_snapshot(DatabaseConfig::default(), Snapshot::default())
    }

    pub fn from_snapshot(config: DatabaseConfig, snapshot: Snapshot) -> Self {
        Self {
            config,
            crops: MemoryCropStore::from_crops(snapshot.crops),
            interests: MemoryInterestStore::from_interests(snapshot.interests),
            locks: Arc::default(),
            stale: Arc::default(),
        }
    }

    pub async fn open(config: DatabaseConfig) -> Result<Self, DatabaseError> {
        let snapshot = match &config.snapshot_path {
            Some(path) => load_snapshot(path).await?,
            None => Snapshot::default(),
        };
        info!(
            crops = snapshot.crops.len(),
            interests = snapshot.interests.len(),
            path = ?config.snapshot_path,
            "database opened"
        );
        Ok(Self::from_snapshot(config, snapshot))
    }

    pub fn crops(&self) -> &MemoryCropStore {
        &self.crops
    }

    pub fn interests(&self) -> &MemoryInterestStore {
        &self.interests
    }

    /// An engine over this database's stores. Every engine handed out here
    /// shares one crop lock table and one stale queue.
    pub fn engine(&self, config: EngineConfig) -> Engine<MemoryCropStore, MemoryInterestStore> {
        Engine::with_coordination(
            self.crops.clone(),
            self.interests.clone(),
            config,
            Arc::clone(&self.locks),
            Arc::clone(&self.stale),
        )
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            crops: self.crops.snapshot(),
            interests: self.interests.snapshot(),
        }
    }

    /// Write the current contents to the configured snapshot path, if any.
    pub async fn save(&self) -> Result<(), DatabaseError> {
        let Some(path) = &self.config.snapshot_path else {
            return Ok(());
        };
        save_snapshot(path, &self.snapshot()).await?;
        info!(path = %path.display(), "snapshot saved");
        Ok(())
    }

    pub async fn shutdown(self) -> Result<(), DatabaseError> {
        self.save().await?;
        info!("database shut down");
        Ok(())
    }
}

async fn load_snapshot(path: &Path) -> Result<Snapshot, DatabaseError> {
    let data = match tokio::fs::read_to_string(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Snapshot::default()),
        Err(source) => {
            return Err(DatabaseError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_str(&data).map_err(|source| DatabaseError::Format {
        path: path.to_path_buf(),
        source,
    })
}

async fn save_snapshot(path: &Path, snapshot: &Snapshot) -> Result<(), DatabaseError> {
    let write_err = |source| DatabaseError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    let data = serde_json::to_string_pretty(snapshot).map_err(|source| DatabaseError::Format {
        path: path.to_path_buf(),
        source,
    })?;
    // Write beside the target and rename so a crash never leaves half a file.
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, data).await.map_err(write_err)?;
    tokio::fs::rename(&tmp, path).await.map_err(write_err)
}
