//! Per-source connectivity state

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;
use tracing::info;

/// Health of one acquisition source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum ConnectivityState {
    /// Prerequisite unavailable (no active match, no qualifying interface).
    #[default]
    Off,
    /// Resource acquired, waiting for a peer.
    Ready,
    /// Data is flowing.
    Connected,
    /// Last operation failed, retry scheduled.
    Error,
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectivityState::Off => "off",
            ConnectivityState::Ready => "ready",
            ConnectivityState::Connected => "connected",
            ConnectivityState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Owner side of a source's connectivity signal.
///
/// Only the owning source holds the tracker; everybody else observes through
/// [`ConnectivityTracker::subscribe`].
#[derive(Debug)]
pub struct ConnectivityTracker {
    source: &'static str,
    tx: watch::Sender<ConnectivityState>,
}

impl ConnectivityTracker {
    /// Create a tracker starting in [`ConnectivityState::Off`].
    pub fn new(source: &'static str) -> Self {
        let (tx, _) = watch::channel(ConnectivityState::Off);
        Self { source, tx }
    }

    /// Move to `next`, notifying observers only on an actual change.
    pub fn set(&self, next: ConnectivityState) {
        let source = self.source;
        self.tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            info!(source, from = %current, to = %next, "Connectivity changed");
            *current = next;
            true
        });
    }

    /// Current state.
    pub fn current(&self) -> ConnectivityState {
        *self.tx.borrow()
    }

    /// Observe state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_off_and_tracks_transitions() {
        let tracker = ConnectivityTracker::new("test");
        let rx = tracker.subscribe();
        assert_eq!(tracker.current(), ConnectivityState::Off);

        tracker.set(ConnectivityState::Ready);
        tracker.set(ConnectivityState::Connected);
        assert_eq!(*rx.borrow(), ConnectivityState::Connected);
    }

    #[test]
    fn repeated_state_does_not_notify() {
        let tracker = ConnectivityTracker::new("test");
        let mut rx = tracker.subscribe();
        tracker.set(ConnectivityState::Error);
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        tracker.set(ConnectivityState::Error);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn serializes_lowercase() {
        let yaml = serde_yaml_ng::to_string(&ConnectivityState::Connected).unwrap();
        assert_eq!(yaml.trim(), "connected");
        assert_eq!(ConnectivityState::Error.to_string(), "error");
    }
}
