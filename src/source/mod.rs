//! Acquisition sources
//!
//! A source owns one transport and turns what it observes into partial
//! [`MatchState`] updates for the engine. Every source recovers on its own,
//! in up to three nested layers:
//!
//! 1. resource discovery (network interface, score sheet log file)
//! 2. transport session (TCP connection, capture pipeline)
//! 3. update processing (decoding, recognition)
//!
//! Each layer has its own fixed retry delay, and a failure restarts only the
//! layer it happened in. Health is exposed per source as a
//! [`ConnectivityState`] watch channel.
//!
//! Sources are spawned with [`SourceDriver::spawn`], which hands back a
//! [`SourceHandle`] owning the task and its cancellation token.

use std::fmt;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::types::{ConnectivityState, MatchState};

pub mod console;
pub mod discovery;
pub mod locator;
pub mod recognition;
pub mod vision;

pub use console::ConsoleSource;
pub use discovery::{FixedAddress, InterfaceDiscovery, WiredInterface};
pub use locator::{LogFileLocator, MatchCodeLocator};
pub use recognition::{CaptureField, Recognizer, parse_clock, parse_score};
pub use vision::{CaptureSample, CaptureSource, FieldImage, VisionSource};

/// Which physical source produced an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Vision,
    Console,
}

impl SourceKind {
    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::Vision => "vision",
            SourceKind::Console => "console",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the vision source currently reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisionSignal {
    /// No active match: the combined state must reset.
    NoMatch,
    /// Accumulated state of the active match.
    Update(MatchState),
}

/// Message from a source to the engine.
///
/// Each message carries the source's full accumulated state, not a delta, so
/// the engine only has to remember the latest message per source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    Vision(VisionSignal),
    Console(MatchState),
}

impl SourceEvent {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceEvent::Vision(_) => SourceKind::Vision,
            SourceEvent::Console(_) => SourceKind::Console,
        }
    }
}

/// A self-healing producer of match updates.
///
/// `run` is expected to loop until `cancel` fires, recovering from every
/// failure internally. It returns early only when the engine side of
/// `events` is gone.
#[async_trait::async_trait]
pub trait AcquisitionSource: Send + 'static {
    fn kind(&self) -> SourceKind;

    /// Observe this source's connectivity.
    fn connectivity(&self) -> watch::Receiver<ConnectivityState>;

    /// Acquire, decode and forward updates until cancelled.
    async fn run(&mut self, events: mpsc::Sender<SourceEvent>, cancel: CancellationToken);
}

/// Spawns sources onto the runtime.
pub struct SourceDriver;

impl SourceDriver {
    /// Spawn `source`, forwarding its updates into `events`.
    pub fn spawn<S>(mut source: S, events: mpsc::Sender<SourceEvent>) -> SourceHandle
    where
        S: AcquisitionSource,
    {
        let kind = source.kind();
        let connectivity = source.connectivity();
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            info!(source = %kind, "Source task started");
            source.run(events, token).await;
            info!(source = %kind, "Source task stopped");
        });

        SourceHandle { kind, connectivity, cancel, task: Some(task) }
    }
}

/// Owner of a running source task.
///
/// Dropping the handle cancels the task; [`SourceHandle::shutdown`]
/// additionally waits until its transport is closed.
pub struct SourceHandle {
    kind: SourceKind,
    connectivity: watch::Receiver<ConnectivityState>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SourceHandle {
    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Observe the source's connectivity.
    pub fn connectivity(&self) -> watch::Receiver<ConnectivityState> {
        self.connectivity.clone()
    }

    /// Token cancelling this source.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel the source and wait for its task to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        let Some(task) = self.task.take() else {
            return;
        };
        if let Err(e) = task.await {
            warn!(source = %self.kind, "Source task ended abnormally: {}", e);
        }
    }
}

impl Drop for SourceHandle {
    fn drop(&mut self) {
        if !self.cancel.is_cancelled() {
            debug!(source = %self.kind, "Source handle dropped, cancelling");
            self.cancel.cancel();
        }
    }
}

/// Sleep for a retry `delay` unless cancelled first.
///
/// Returns `false` when cancellation won.
pub(crate) async fn wait_or_cancel(cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

/// Forward `event` to the engine.
///
/// Returns `false` when the engine is gone and the source should stop.
pub(crate) async fn forward(events: &mpsc::Sender<SourceEvent>, event: SourceEvent) -> bool {
    let kind = event.kind();
    if events.send(event).await.is_err() {
        info!(source = %kind, "Engine closed, stopping source");
        return false;
    }
    true
}
