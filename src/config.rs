//! Runtime configuration
//!
//! Loaded from YAML; every field has a default, so an empty document is a
//! valid configuration. Durations are given in milliseconds.
//!
//! ```rust
//! use scorebridge::SyncConfig;
//!
//! let config = SyncConfig::from_yaml_str("console:\n  port: 4002\n").unwrap();
//! assert_eq!(config.console.port, 4002);
//! assert_eq!(config.console.interface_prefix, "eth");
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::{Result, SyncError};

/// Fixed console port of the scoreboard's network output.
pub const CONSOLE_PORT: u16 = 4001;

/// Complete configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    pub console: ConsoleConfig,
    pub vision: VisionConfig,
    pub engine: EngineConfig,
}

/// Scoreboard console source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConsoleConfig {
    /// TCP port the listener binds.
    pub port: u16,
    /// Case-insensitive name prefix of the wired interface to listen on.
    pub interface_prefix: String,
    pub discovery_retry_ms: u64,
    pub session_retry_ms: u64,
    pub processing_retry_ms: u64,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            port: CONSOLE_PORT,
            interface_prefix: "eth".to_string(),
            discovery_retry_ms: 10_000,
            session_retry_ms: 10_000,
            processing_retry_ms: 5_000,
        }
    }
}

impl ConsoleConfig {
    pub fn discovery_retry(&self) -> Duration {
        Duration::from_millis(self.discovery_retry_ms)
    }

    pub fn session_retry(&self) -> Duration {
        Duration::from_millis(self.session_retry_ms)
    }

    pub fn processing_retry(&self) -> Duration {
        Duration::from_millis(self.processing_retry_ms)
    }
}

/// Score sheet vision source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VisionConfig {
    /// Score sheet log file; resolved from `%PUBLIC%` when absent.
    pub log_file: Option<PathBuf>,
    pub log_poll_ms: u64,
    pub log_retry_ms: u64,
    pub capture_retry_ms: u64,
    pub processing_retry_ms: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            log_file: None,
            log_poll_ms: 1_000,
            log_retry_ms: 10_000,
            capture_retry_ms: 5_000,
            processing_retry_ms: 5_000,
        }
    }
}

impl VisionConfig {
    pub fn log_poll(&self) -> Duration {
        Duration::from_millis(self.log_poll_ms)
    }

    pub fn log_retry(&self) -> Duration {
        Duration::from_millis(self.log_retry_ms)
    }

    pub fn capture_retry(&self) -> Duration {
        Duration::from_millis(self.capture_retry_ms)
    }

    pub fn processing_retry(&self) -> Duration {
        Duration::from_millis(self.processing_retry_ms)
    }

    /// The configured log file, or the score sheet's default location.
    pub fn resolve_log_file(&self) -> Option<PathBuf> {
        self.log_file.clone().or_else(|| {
            std::env::var_os("PUBLIC").map(|public| {
                Path::new(&public)
                    .join("Documents")
                    .join("SaisieFeuilleGesthand")
                    .join("LogFeuille.log")
            })
        })
    }
}

/// Reconciliation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Minimum spacing of persisted snapshots.
    pub persist_window_ms: u64,
    /// Minimum spacing of the throttled broadcast feed.
    pub broadcast_window_ms: u64,
    /// Delay before restarting a failed merge chain.
    pub restart_delay_ms: u64,
    /// Capacity of the source update channel.
    pub channel_capacity: usize,
    /// Ignore console 0/0 score resets once a match is established.
    pub anti_reset_guard: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            persist_window_ms: 15_000,
            broadcast_window_ms: 200,
            restart_delay_ms: 5_000,
            channel_capacity: 64,
            anti_reset_guard: true,
        }
    }
}

impl EngineConfig {
    pub fn persist_window(&self) -> Duration {
        Duration::from_millis(self.persist_window_ms)
    }

    pub fn broadcast_window(&self) -> Duration {
        Duration::from_millis(self.broadcast_window_ms)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}

impl SyncConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: SyncConfig = if yaml.trim().is_empty() {
            SyncConfig::default()
        } else {
            serde_yaml_ng::from_str(yaml).map_err(|e| SyncError::config(e.to_string()))?
        };
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading configuration from {}", path.display());
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| SyncError::file_error(path.to_path_buf(), e))?;
        Self::from_yaml_str(&yaml)
    }

    /// Reject values that would make a retry loop spin or a channel unusable.
    pub fn validate(&self) -> Result<()> {
        let delays = [
            ("console.discovery_retry_ms", self.console.discovery_retry_ms),
            ("console.session_retry_ms", self.console.session_retry_ms),
            ("console.processing_retry_ms", self.console.processing_retry_ms),
            ("vision.log_poll_ms", self.vision.log_poll_ms),
            ("vision.log_retry_ms", self.vision.log_retry_ms),
            ("vision.capture_retry_ms", self.vision.capture_retry_ms),
            ("vision.processing_retry_ms", self.vision.processing_retry_ms),
            ("engine.persist_window_ms", self.engine.persist_window_ms),
            ("engine.broadcast_window_ms", self.engine.broadcast_window_ms),
            ("engine.restart_delay_ms", self.engine.restart_delay_ms),
        ];
        if let Some((name, _)) = delays.iter().find(|(_, ms)| *ms == 0) {
            return Err(SyncError::config(format!("{name} must be greater than zero")));
        }
        if self.console.interface_prefix.trim().is_empty() {
            return Err(SyncError::config("console.interface_prefix must not be empty"));
        }
        if self.engine.channel_capacity == 0 {
            return Err(SyncError::config("engine.channel_capacity must be greater than zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_yields_defaults() {
        let config = SyncConfig::from_yaml_str("").unwrap();
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.console.port, CONSOLE_PORT);
        assert_eq!(config.engine.persist_window(), Duration::from_secs(15));
        assert_eq!(config.console.session_retry(), Duration::from_secs(10));
        assert!(config.engine.anti_reset_guard);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let yaml = "engine:\n  persist_window_ms: 30000\n  anti_reset_guard: false\n\
                    vision:\n  log_file: /tmp/LogFeuille.log\n";
        let config = SyncConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.engine.persist_window(), Duration::from_secs(30));
        assert!(!config.engine.anti_reset_guard);
        assert_eq!(config.engine.restart_delay(), Duration::from_secs(5));
        assert_eq!(config.vision.resolve_log_file(), Some(PathBuf::from("/tmp/LogFeuille.log")));
    }

    #[test]
    fn zero_durations_are_rejected() {
        let err = SyncConfig::from_yaml_str("console:\n  session_retry_ms: 0\n").unwrap_err();
        assert!(matches!(err, SyncError::Config { .. }));
        assert!(err.to_string().contains("console.session_retry_ms"));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = SyncConfig::from_yaml_str("console:\n  prot: 4001\n").unwrap_err();
        assert!(matches!(err, SyncError::Config { .. }));
    }

    #[test]
    fn blank_interface_prefix_is_rejected() {
        assert!(SyncConfig::from_yaml_str("console:\n  interface_prefix: ' '\n").is_err());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "console:\n  port: 5001\n  interface_prefix: en").unwrap();
        let config = SyncConfig::load(file.path()).unwrap();
        assert_eq!(config.console.port, 5001);
        assert_eq!(config.console.interface_prefix, "en");

        let missing = SyncConfig::load("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(missing, SyncError::File { .. }));
    }
}
