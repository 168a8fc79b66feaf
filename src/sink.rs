//! Persistence collaborators
//!
//! The engine hands every throttled snapshot that carries a match code to a
//! [`PersistenceSink`]. Delivery is at-least-once, so a sink must treat a
//! repeated write of the same snapshot as a no-op overwrite.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use crate::types::{MatchCode, MatchState};
use crate::{Result, SyncError};

/// Record written for a match, keyed by its code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct LiveUpdate {
    /// `[home, away]`, only when both are known.
    pub score: Option<[u16; 2]>,
    /// Game clock in seconds.
    pub chrono: Option<u32>,
    /// Unix seconds at which the record was built.
    pub timestamp: u64,
}

impl LiveUpdate {
    /// Build the record for `state`, stamped with the current time.
    pub fn from_state(state: &MatchState) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Self {
            score: state.score().map(|(home, away)| [home, away]),
            chrono: state.chrono_seconds,
            timestamp,
        }
    }
}

/// Destination for persisted snapshots.
#[async_trait::async_trait]
pub trait PersistenceSink: Send + Sync + 'static {
    /// Store `update` under `match_code`, replacing any previous record.
    async fn write(&self, match_code: &MatchCode, update: &LiveUpdate) -> Result<()>;
}

/// Sink that only logs what would be written.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait::async_trait]
impl PersistenceSink for TracingSink {
    async fn write(&self, match_code: &MatchCode, update: &LiveUpdate) -> Result<()> {
        info!(
            match_code = %match_code,
            score = ?update.score,
            chrono = ?update.chrono,
            "Live update"
        );
        Ok(())
    }
}

/// Sink writing one YAML document per match into a directory.
#[derive(Debug, Clone)]
pub struct YamlFileSink {
    dir: PathBuf,
}

impl YamlFileSink {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    /// File holding the record of `match_code`.
    pub fn path_for(&self, match_code: &MatchCode) -> PathBuf {
        self.dir.join(format!("{}.yaml", match_code))
    }
}

#[async_trait::async_trait]
impl PersistenceSink for YamlFileSink {
    async fn write(&self, match_code: &MatchCode, update: &LiveUpdate) -> Result<()> {
        let yaml = serde_yaml_ng::to_string(update).map_err(|e| {
            SyncError::persistence(match_code.as_str(), "serialization failed", Some(Box::new(e)))
        })?;
        let path = self.path_for(match_code);
        tokio::fs::write(&path, yaml).await.map_err(|e| {
            SyncError::persistence(
                match_code.as_str(),
                format!("cannot write {}", path.display()),
                Some(Box::new(e)),
            )
        })?;
        debug!("Wrote live update to {}", path.display());
        Ok(())
    }
}
