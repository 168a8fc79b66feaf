//! Live handball match state from two unreliable sources.
//!
//! scorebridge reconciles a vision source (text recognition on the score
//! sheet application) and a hardware scoreboard console (binary protocol over
//! TCP) into one consistent live [`MatchState`], and forwards it to local
//! displays and a persistence sink.
//!
//! # Features
//!
//! - **Self-healing sources**: discovery, transport and processing failures
//!   are retried independently; connectivity is observable per source
//! - **Console protocol**: stateless decoder for clock and score frames
//! - **Reconciliation**: field-wise merge with an anti-reset guard, duplicate
//!   suppression and leading+trailing throttling of persisted snapshots
//! - **Bounded recognition**: at most one recognition pass in flight, newest
//!   capture wins
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use scorebridge::{ScoreBridge, SyncConfig, YamlFileSink};
//! # use scorebridge::source::{CaptureSource, Recognizer};
//! # use std::sync::Arc;
//! # async fn run(
//! #     capture: Arc<dyn CaptureSource>,
//! #     recognizer: Arc<dyn Recognizer>,
//! # ) -> scorebridge::Result<()> {
//! let config = SyncConfig::load("scorebridge.yaml")?;
//! let sink = Arc::new(YamlFileSink::new("live"));
//! let bridge = ScoreBridge::from_config(config, sink, capture, recognizer)?;
//!
//! let mut updates = Box::pin(bridge.updates());
//! while let Some(state) = updates.next().await {
//!     println!("{:?} - {:?}", state.score(), state.chrono_seconds);
//! }
//! bridge.shutdown().await;
//! # Ok(())
//! # }
//! ```

use futures::Stream;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub mod broadcast;
pub mod config;
pub mod context;
pub mod engine;
mod error;
pub mod protocol;
pub mod sink;
pub mod source;
pub mod stream;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

pub use broadcast::BroadcastHub;
pub use config::{CONSOLE_PORT, ConsoleConfig, EngineConfig, SyncConfig, VisionConfig};
pub use context::SyncContext;
pub use engine::ReconciliationEngine;
pub use error::*;
pub use sink::{LiveUpdate, PersistenceSink, TracingSink, YamlFileSink};
pub use source::{
    AcquisitionSource, ConsoleSource, SourceDriver, SourceEvent, SourceHandle, SourceKind,
    VisionSignal, VisionSource,
};
pub use types::*;

use source::{CaptureSource, Recognizer};

/// A running bridge: both sources and the reconciliation engine.
///
/// Dropping the bridge cancels every task; [`ScoreBridge::shutdown`] also
/// waits until all transports are closed.
pub struct ScoreBridge {
    context: Arc<SyncContext>,
    vision: watch::Receiver<ConnectivityState>,
    console: watch::Receiver<ConnectivityState>,
    console_addr: watch::Receiver<Option<SocketAddr>>,
    sources: Vec<SourceHandle>,
    engine: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl ScoreBridge {
    /// Spawn `vision`, `console` and the engine.
    pub fn start(context: SyncContext, vision: VisionSource, console: ConsoleSource) -> Self {
        let context = Arc::new(context);
        let (events, rx) = mpsc::channel(context.config.engine.channel_capacity.max(1));
        let console_addr = console.listen_addr();

        let vision = SourceDriver::spawn(vision, events.clone());
        let console = SourceDriver::spawn(console, events);

        let cancel = CancellationToken::new();
        let engine = ReconciliationEngine::new(Arc::clone(&context), rx);
        let engine = tokio::spawn(engine.run(cancel.clone()));
        info!("Score bridge started");

        Self {
            context,
            vision: vision.connectivity(),
            console: console.connectivity(),
            console_addr,
            sources: vec![vision, console],
            engine: Some(engine),
            cancel,
        }
    }

    /// Validate `config` and start with the log-file locator and the wired
    /// interface listener.
    pub fn from_config(
        config: SyncConfig,
        persistence: Arc<dyn PersistenceSink>,
        capture: Arc<dyn CaptureSource>,
        recognizer: Arc<dyn Recognizer>,
    ) -> Result<Self> {
        config.validate()?;
        let vision = VisionSource::with_log_file(config.vision.clone(), capture, recognizer);
        let console = ConsoleSource::new(config.console.clone());
        Ok(Self::start(SyncContext::new(config, persistence), vision, console))
    }

    pub fn context(&self) -> &SyncContext {
        &self.context
    }

    /// Every combined state, starting with the current one.
    pub fn updates(&self) -> impl Stream<Item = Arc<MatchState>> + 'static {
        self.context.broadcast.updates()
    }

    /// Combined states throttled for on-screen overlays.
    pub fn overlay_updates(&self) -> impl Stream<Item = Arc<MatchState>> + 'static {
        let window = self.context.config.engine.broadcast_window();
        self.context.broadcast.throttled_updates(window)
    }

    /// Latest combined state.
    pub fn latest(&self) -> Option<Arc<MatchState>> {
        self.context.broadcast.latest()
    }

    pub fn vision_connectivity(&self) -> watch::Receiver<ConnectivityState> {
        self.vision.clone()
    }

    pub fn console_connectivity(&self) -> watch::Receiver<ConnectivityState> {
        self.console.clone()
    }

    /// Address the console listener is bound to, `None` while not listening.
    pub fn console_listen_addr(&self) -> watch::Receiver<Option<SocketAddr>> {
        self.console_addr.clone()
    }

    /// Stop the sources, then the engine.
    pub async fn shutdown(mut self) {
        info!("Shutting down score bridge");
        for source in std::mem::take(&mut self.sources) {
            source.shutdown().await;
        }
        self.cancel.cancel();
        let Some(engine) = self.engine.take() else {
            return;
        };
        if let Err(e) = engine.await {
            warn!("Reconciliation engine ended abnormally: {}", e);
        }
    }
}

impl Drop for ScoreBridge {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
