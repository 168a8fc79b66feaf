//! Shared collaborators of a running bridge

use std::fmt;
use std::sync::Arc;

use crate::broadcast::BroadcastHub;
use crate::config::SyncConfig;
use crate::sink::PersistenceSink;

/// Configuration and outbound collaborators, passed explicitly to the engine.
#[derive(Clone)]
pub struct SyncContext {
    pub config: SyncConfig,
    pub persistence: Arc<dyn PersistenceSink>,
    pub broadcast: BroadcastHub,
}

impl SyncContext {
    pub fn new(config: SyncConfig, persistence: Arc<dyn PersistenceSink>) -> Self {
        Self { config, persistence, broadcast: BroadcastHub::new() }
    }

    /// Use an existing hub, e.g. one a UI already subscribed to.
    pub fn with_broadcast(mut self, broadcast: BroadcastHub) -> Self {
        self.broadcast = broadcast;
        self
    }
}

impl fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncContext")
            .field("config", &self.config)
            .field("broadcast", &self.broadcast)
            .finish_non_exhaustive()
    }
}
