//! Scoreboard console source
//!
//! Listens on the wired interface for the console's TCP push stream and
//! decodes every received chunk as one frame. The listener is closed while a
//! connection is being served and re-bound once the session ends, so exactly
//! one connection is handled at a time.

use futures::StreamExt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio_util::codec::{BytesCodec, FramedRead};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::discovery::{InterfaceDiscovery, WiredInterface};
use super::{AcquisitionSource, SourceEvent, SourceKind, forward, wait_or_cancel};
use crate::config::ConsoleConfig;
use crate::error::panic_message;
use crate::protocol::{DecodedMessage, decode_frame};
use crate::types::{ConnectivityState, ConnectivityTracker, MatchState};
use crate::{Result, SyncError};

type FrameDecoder = fn(&[u8]) -> DecodedMessage;

/// How a transport session ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// Peer closed the connection.
    Closed,
    Cancelled,
    EngineClosed,
}

/// Hardware scoreboard console over TCP.
pub struct ConsoleSource {
    config: ConsoleConfig,
    discovery: Arc<dyn InterfaceDiscovery>,
    decode: FrameDecoder,
    tracker: ConnectivityTracker,
    listen_tx: watch::Sender<Option<SocketAddr>>,
    state: MatchState,
}

impl ConsoleSource {
    /// Console source listening on the configured wired interface.
    pub fn new(config: ConsoleConfig) -> Self {
        let discovery = Arc::new(WiredInterface::new(config.interface_prefix.clone()));
        Self::with_discovery(config, discovery)
    }

    /// Console source with a custom address discovery.
    pub fn with_discovery(config: ConsoleConfig, discovery: Arc<dyn InterfaceDiscovery>) -> Self {
        let (listen_tx, _) = watch::channel(None);
        Self {
            config,
            discovery,
            decode: decode_frame,
            tracker: ConnectivityTracker::new("console"),
            listen_tx,
            state: MatchState::default(),
        }
    }

    #[cfg(test)]
    fn with_decoder(mut self, decode: FrameDecoder) -> Self {
        self.decode = decode;
        self
    }

    /// Address the listener is currently bound to, `None` between sessions.
    pub fn listen_addr(&self) -> watch::Receiver<Option<SocketAddr>> {
        self.listen_tx.subscribe()
    }

    /// Serve one connection on `ip`, from bind to close.
    async fn serve(
        &mut self,
        ip: IpAddr,
        events: &mpsc::Sender<SourceEvent>,
        cancel: &CancellationToken,
    ) -> Result<SessionEnd> {
        let port = self.config.port;
        let listener = TcpListener::bind((ip, port))
            .await
            .map_err(|e| SyncError::transport(format!("bind {ip}:{port}"), e))?;
        let local = listener.local_addr().map_err(|e| SyncError::transport("listener address", e))?;
        self.listen_tx.send_replace(Some(local));
        self.tracker.set(ConnectivityState::Ready);
        info!(%local, "Console listener bound");

        let (socket, peer) = tokio::select! {
            _ = cancel.cancelled() => return Ok(SessionEnd::Cancelled),
            accepted = listener.accept() => {
                accepted.map_err(|e| SyncError::transport(format!("accept on {local}"), e))?
            }
        };
        drop(listener);
        self.listen_tx.send_replace(None);
        self.tracker.set(ConnectivityState::Connected);
        info!(%peer, "Console connected");

        let mut frames = FramedRead::new(socket, BytesCodec::new());
        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return Ok(SessionEnd::Cancelled),
                chunk = frames.next() => chunk,
            };
            let frame = match chunk {
                None => return Ok(SessionEnd::Closed),
                Some(Err(e)) => return Err(SyncError::transport(format!("read from {peer}"), e)),
                Some(Ok(frame)) => frame,
            };
            trace!(len = frame.len(), "Console frame received");

            match self.process(&frame) {
                Ok(Some(state)) => {
                    if !forward(events, SourceEvent::Console(state)).await {
                        return Ok(SessionEnd::EngineClosed);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    // Processing restarts; the connection is kept
                    error!("Console processing failed: {}", e);
                    if !wait_or_cancel(cancel, self.config.processing_retry()).await {
                        return Ok(SessionEnd::Cancelled);
                    }
                    info!("Console processing restarted");
                }
            }
        }
    }

    /// Decode one frame into the accumulator.
    ///
    /// Returns the accumulated state when it changed.
    fn process(&mut self, frame: &[u8]) -> Result<Option<MatchState>> {
        let decode = self.decode;
        let message = std::panic::catch_unwind(|| decode(frame)).map_err(|payload| {
            SyncError::processing(format!("frame decoder panicked: {}", panic_message(&*payload)))
        })?;
        let Some(update) = message.into_update() else {
            return Ok(None);
        };

        let before = self.state.clone();
        self.state.merge_from(&update);
        if self.state == before {
            trace!("Console update unchanged");
            return Ok(None);
        }
        debug!(?update, "Console update");
        Ok(Some(self.state.clone()))
    }
}

#[async_trait::async_trait]
impl AcquisitionSource for ConsoleSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Console
    }

    fn connectivity(&self) -> watch::Receiver<ConnectivityState> {
        self.tracker.subscribe()
    }

    async fn run(&mut self, events: mpsc::Sender<SourceEvent>, cancel: CancellationToken) {
        info!(port = self.config.port, "Console source started");

        while !cancel.is_cancelled() {
            let ip = match self.discovery.discover() {
                Ok(ip) => ip,
                Err(e) => {
                    debug!("Console discovery failed: {}", e);
                    self.tracker.set(ConnectivityState::Off);
                    if !wait_or_cancel(&cancel, self.config.discovery_retry()).await {
                        break;
                    }
                    continue;
                }
            };

            match self.serve(ip, &events, &cancel).await {
                Ok(SessionEnd::Cancelled) | Ok(SessionEnd::EngineClosed) => break,
                Ok(SessionEnd::Closed) => info!("Console connection closed"),
                Err(e) => warn!("Console session failed: {}", e),
            }

            self.listen_tx.send_replace(None);
            self.tracker.set(ConnectivityState::Error);
            if !wait_or_cancel(&cancel, self.config.session_retry()).await {
                break;
            }
        }

        self.listen_tx.send_replace(None);
        self.tracker.set(ConnectivityState::Off);
        info!("Console source stopped");
    }
}
