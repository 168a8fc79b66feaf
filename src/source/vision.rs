//! Score sheet vision source
//!
//! Follows the active match code through a [`MatchCodeLocator`], and for each
//! active match runs a capture session that recognizes the clock and score
//! fields of the score sheet window.
//!
//! Recovery layers:
//!
//! 1. match code lookup: a missing log file turns the source `off`, any other
//!    watch failure marks it `error`; both retry after `log_retry`
//! 2. capture session: reopened after `capture_retry` when the capture ends
//!    or fails, without losing the session's accumulated state
//! 3. recognition: a failure (including a panic) restarts only the sample
//!    processing after `processing_retry`, the capture stays open
//!
//! A change of match code stops the running session before the next one is
//! opened. "No active match" is reported as [`VisionSignal::NoMatch`].

use futures::stream::{BoxStream, Fuse};
use futures::{FutureExt, Stream, StreamExt, ready};
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::locator::{LogFileLocator, MatchCodeLocator};
use super::recognition::{CaptureField, Recognizer, parse_clock, parse_score};
use super::{AcquisitionSource, SourceEvent, SourceKind, VisionSignal, forward, wait_or_cancel};
use crate::config::VisionConfig;
use crate::error::panic_message;
use crate::stream::ExhaustLatestExt;
use crate::types::{ConnectivityState, ConnectivityTracker, MatchCode, MatchState};
use crate::{Result, SyncError};

/// Encoded image of one captured field.
pub type FieldImage = bytes::Bytes;

/// One capture of the score sheet window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureSample {
    pub chrono: Option<FieldImage>,
    pub home_score: Option<FieldImage>,
    pub away_score: Option<FieldImage>,
    /// Read from the window directly, not recognized.
    pub chrono_started: Option<bool>,
}

/// Opens capture pipelines on the score sheet window.
#[async_trait::async_trait]
pub trait CaptureSource: Send + Sync + 'static {
    /// Start capturing for `match_code`.
    ///
    /// The stream ends when the window closes. An `Err` item is a transport
    /// failure and ends the session. A `Discovery` error from `open` means
    /// the window does not exist.
    async fn open(
        &self,
        match_code: &MatchCode,
    ) -> Result<BoxStream<'static, Result<CaptureSample>>>;
}

struct Shared {
    config: VisionConfig,
    locator: Arc<dyn MatchCodeLocator>,
    capture: Arc<dyn CaptureSource>,
    recognizer: Arc<dyn Recognizer>,
    tracker: ConnectivityTracker,
}

/// Vision (OCR) acquisition source.
pub struct VisionSource {
    shared: Arc<Shared>,
}

struct CaptureSession {
    match_code: MatchCode,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

#[derive(Debug)]
enum SessionEnd {
    /// Capture stream ended.
    Closed,
    Failed(SyncError),
    Cancelled,
    EngineClosed,
}

impl VisionSource {
    pub fn new(
        config: VisionConfig,
        locator: Arc<dyn MatchCodeLocator>,
        capture: Arc<dyn CaptureSource>,
        recognizer: Arc<dyn Recognizer>,
    ) -> Self {
        let shared = Shared {
            config,
            locator,
            capture,
            recognizer,
            tracker: ConnectivityTracker::new("vision"),
        };
        Self { shared: Arc::new(shared) }
    }

    /// Vision source following the score sheet log file.
    pub fn with_log_file(
        config: VisionConfig,
        capture: Arc<dyn CaptureSource>,
        recognizer: Arc<dyn Recognizer>,
    ) -> Self {
        let locator = Arc::new(LogFileLocator::from_config(&config));
        Self::new(config, locator, capture, recognizer)
    }

    /// Layer 1: follow the match code until the watch fails.
    ///
    /// Returns `Ok(())` when cancelled or the engine is gone.
    async fn follow_match_code(
        &self,
        events: &mpsc::Sender<SourceEvent>,
        cancel: &CancellationToken,
        session: &mut Option<CaptureSession>,
    ) -> Result<()> {
        let changes = self.shared.locator.watch().await?;
        let locator = Arc::clone(&self.shared.locator);
        let mut codes = changes.exhaust_map_latest(move |tick: Result<()>| {
            let locator = Arc::clone(&locator);
            async move {
                match tick {
                    Ok(()) => locator.locate().await,
                    Err(e) => Err(e),
                }
            }
        });

        let mut current: Option<Option<MatchCode>> = None;
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                next = codes.next() => next,
            };
            let code = match next {
                Some(Ok(code)) => code,
                Some(Err(e)) => return Err(e),
                None => return Err(SyncError::discovery("score sheet log", "watch ended")),
            };
            if current.as_ref() == Some(&code) {
                continue;
            }
            current = Some(code.clone());

            stop_session(session).await;
            match code {
                None => {
                    info!("No active match");
                    self.shared.tracker.set(ConnectivityState::Off);
                    if !forward(events, SourceEvent::Vision(VisionSignal::NoMatch)).await {
                        return Ok(());
                    }
                }
                Some(code) => {
                    info!(match_code = %code, "Active match");
                    let shared = Arc::clone(&self.shared);
                    let token = cancel.child_token();
                    let task = tokio::spawn(capture_session(
                        shared,
                        code.clone(),
                        events.clone(),
                        token.clone(),
                    ));
                    *session = Some(CaptureSession { match_code: code, cancel: token, task });
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl AcquisitionSource for VisionSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Vision
    }

    fn connectivity(&self) -> watch::Receiver<ConnectivityState> {
        self.shared.tracker.subscribe()
    }

    async fn run(&mut self, events: mpsc::Sender<SourceEvent>, cancel: CancellationToken) {
        info!("Vision source started");
        let mut session = None;

        while !cancel.is_cancelled() && !events.is_closed() {
            let outcome = self.follow_match_code(&events, &cancel, &mut session).await;
            stop_session(&mut session).await;
            let Err(e) = outcome else {
                break;
            };

            if matches!(e, SyncError::Discovery { .. }) {
                debug!("Match code lookup unavailable: {}", e);
                self.shared.tracker.set(ConnectivityState::Off);
            } else {
                warn!("Match code watch failed: {}", e);
                self.shared.tracker.set(ConnectivityState::Error);
            }
            if !wait_or_cancel(&cancel, self.shared.config.log_retry()).await {
                break;
            }
        }

        stop_session(&mut session).await;
        self.shared.tracker.set(ConnectivityState::Off);
        info!("Vision source stopped");
    }
}

/// Cancel the running session and wait until its capture is closed.
async fn stop_session(session: &mut Option<CaptureSession>) {
    let Some(session) = session.take() else {
        return;
    };
    session.cancel.cancel();
    if let Err(e) = session.task.await {
        warn!(match_code = %session.match_code, "Capture session ended abnormally: {}", e);
    }
    debug!(match_code = %session.match_code, "Capture session stopped");
}

/// Layer 2: keep a capture open for `match_code` until cancelled.
async fn capture_session(
    shared: Arc<Shared>,
    match_code: MatchCode,
    events: mpsc::Sender<SourceEvent>,
    cancel: CancellationToken,
) {
    let mut state = MatchState::for_match(match_code.clone());
    if !forward(&events, SourceEvent::Vision(VisionSignal::Update(state.clone()))).await {
        return;
    }
    let retry = shared.config.capture_retry();

    while !cancel.is_cancelled() {
        shared.tracker.set(ConnectivityState::Ready);
        let opened = tokio::select! {
            _ = cancel.cancelled() => return,
            opened = shared.capture.open(&match_code) => opened,
        };
        match opened {
            Ok(samples) => {
                shared.tracker.set(ConnectivityState::Connected);
                info!(match_code = %match_code, "Capture opened");
                match process_samples(&shared, samples, &mut state, &events, &cancel).await {
                    SessionEnd::Cancelled | SessionEnd::EngineClosed => return,
                    SessionEnd::Closed => {
                        info!(match_code = %match_code, "Capture closed, reopening");
                        shared.tracker.set(ConnectivityState::Ready);
                    }
                    SessionEnd::Failed(e) => {
                        warn!(match_code = %match_code, "Capture failed: {}", e);
                        shared.tracker.set(ConnectivityState::Error);
                    }
                }
            }
            Err(e @ SyncError::Discovery { .. }) => {
                debug!("Score sheet window not found: {}", e);
                shared.tracker.set(ConnectivityState::Off);
            }
            Err(e) => {
                warn!(match_code = %match_code, "Cannot open capture: {}", e);
                shared.tracker.set(ConnectivityState::Error);
            }
        }
        if !wait_or_cancel(&cancel, retry).await {
            return;
        }
    }
}

/// Samples of one opened capture, up to its first transport failure.
///
/// Fused, so it can be polled again by each restart of the processing layer
/// after the capture has ended. The failure is kept until the session ends.
struct SampleFeed {
    samples: Fuse<BoxStream<'static, Result<CaptureSample>>>,
    failure: Option<SyncError>,
}

impl SampleFeed {
    fn new(samples: BoxStream<'static, Result<CaptureSample>>) -> Self {
        Self { samples: samples.fuse(), failure: None }
    }

    /// How the capture ended once the feed is exhausted.
    fn end(&mut self) -> SessionEnd {
        match self.failure.take() {
            Some(e) => SessionEnd::Failed(e),
            None => SessionEnd::Closed,
        }
    }
}

impl Stream for SampleFeed {
    type Item = CaptureSample;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<CaptureSample>> {
        if self.failure.is_some() {
            return Poll::Ready(None);
        }
        match ready!(self.samples.poll_next_unpin(cx)) {
            Some(Ok(sample)) => Poll::Ready(Some(sample)),
            Some(Err(e)) => {
                self.failure = Some(e);
                Poll::Ready(None)
            }
            None => Poll::Ready(None),
        }
    }
}

/// Layer 3: recognize samples into `state`, restarting on processing failures.
async fn process_samples(
    shared: &Shared,
    samples: BoxStream<'static, Result<CaptureSample>>,
    state: &mut MatchState,
    events: &mpsc::Sender<SourceEvent>,
    cancel: &CancellationToken,
) -> SessionEnd {
    let mut feed = SampleFeed::new(samples);
    loop {
        let recognizer = Arc::clone(&shared.recognizer);
        let mut updates = feed.by_ref().exhaust_map_latest(move |sample: CaptureSample| {
            let recognizer = Arc::clone(&recognizer);
            AssertUnwindSafe(recognize_sample(recognizer, sample))
                .catch_unwind()
                .map(|outcome| {
                    outcome.map_err(|payload| {
                        SyncError::processing(format!(
                            "recognition panicked: {}",
                            panic_message(&*payload)
                        ))
                    })
                })
        });

        let failure = loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return SessionEnd::Cancelled,
                next = updates.next() => next,
            };
            match next {
                None => break None,
                Some(Ok(update)) => {
                    let before = state.clone();
                    state.merge_from(&update);
                    if *state == before {
                        continue;
                    }
                    debug!(?update, "Vision update");
                    let event = SourceEvent::Vision(VisionSignal::Update(state.clone()));
                    if !forward(events, event).await {
                        return SessionEnd::EngineClosed;
                    }
                }
                Some(Err(e)) => break Some(e),
            }
        };
        drop(updates);

        let Some(failure) = failure else {
            return feed.end();
        };
        error!("Vision processing failed: {}", failure);
        if !wait_or_cancel(cancel, shared.config.processing_retry()).await {
            return SessionEnd::Cancelled;
        }
        info!("Vision processing restarted");
    }
}

/// Recognize every field of `sample` concurrently.
async fn recognize_sample(recognizer: Arc<dyn Recognizer>, sample: CaptureSample) -> MatchState {
    let (chrono, home, away) = futures::join!(
        read_field(&*recognizer, CaptureField::Chrono, sample.chrono.as_ref()),
        read_field(&*recognizer, CaptureField::HomeScore, sample.home_score.as_ref()),
        read_field(&*recognizer, CaptureField::AwayScore, sample.away_score.as_ref()),
    );
    MatchState {
        chrono_seconds: parse_field(CaptureField::Chrono, chrono, parse_clock),
        home_score: parse_field(CaptureField::HomeScore, home, parse_score),
        away_score: parse_field(CaptureField::AwayScore, away, parse_score),
        chrono_started: sample.chrono_started,
        ..MatchState::default()
    }
}

async fn read_field(
    recognizer: &dyn Recognizer,
    field: CaptureField,
    image: Option<&FieldImage>,
) -> Option<String> {
    let image = image?;
    match recognizer.recognize(field, image).await {
        Ok(text) => text,
        Err(e) => {
            warn!(%field, "Recognition failed: {}", e);
            None
        }
    }
}

fn parse_field<T>(
    field: CaptureField,
    text: Option<String>,
    parse: fn(&str) -> Option<T>,
) -> Option<T> {
    let text = text?;
    let value = parse(&text);
    if value.is_none() {
        warn!(%field, text = text.trim(), "Unrecognized data");
    }
    value
}
