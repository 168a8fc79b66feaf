//! Reconciliation engine
//!
//! Consumes the update messages of both sources and produces the combined
//! match state:
//!
//! ```text
//! events ─▶ Reconciler (merge, anti-reset guard, dedup) ─┬▶ BroadcastHub
//!                                                        └▶ throttle ─▶ PersistenceSink
//! ```
//!
//! The chain runs inside a restart loop: a panic anywhere in it is logged,
//! the engine waits `restart_delay` and starts over with an empty state.
//! Persistence writes run on their own tasks, so a slow or failing sink never
//! holds up merging.

use futures::{FutureExt, StreamExt, future, stream};
use std::panic::AssertUnwindSafe;
use std::pin::pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::context::SyncContext;
use crate::error::panic_message;
use crate::sink::LiveUpdate;
use crate::source::{SourceEvent, wait_or_cancel};
use crate::stream::ThrottleExt;
use crate::types::MatchState;

pub mod merge;

pub use merge::{NoResetGuard, Reconciler, ResetGuard, ZeroScoreGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChainEnd {
    Cancelled,
    SourcesClosed,
}

/// Merges source updates into the combined state and forwards it.
pub struct ReconciliationEngine {
    context: Arc<SyncContext>,
    events: mpsc::Receiver<SourceEvent>,
    guard: Arc<dyn ResetGuard>,
}

impl ReconciliationEngine {
    /// Engine reading `events`, with the reset guard chosen by configuration.
    pub fn new(context: Arc<SyncContext>, events: mpsc::Receiver<SourceEvent>) -> Self {
        let guard: Arc<dyn ResetGuard> = if context.config.engine.anti_reset_guard {
            Arc::new(ZeroScoreGuard)
        } else {
            Arc::new(NoResetGuard)
        };
        Self { context, events, guard }
    }

    /// Replace the reset guard.
    pub fn with_guard(mut self, guard: Arc<dyn ResetGuard>) -> Self {
        self.guard = guard;
        self
    }

    /// Run until cancelled or until every source has gone away.
    pub async fn run(mut self, cancel: CancellationToken) {
        let delay = self.context.config.engine.restart_delay();
        info!(guard = ?self.guard, "Reconciliation engine started");
        let mut restarts = 0u32;

        loop {
            let outcome = AssertUnwindSafe(self.run_chain(&cancel)).catch_unwind().await;
            match outcome {
                Ok(ChainEnd::Cancelled) => break,
                Ok(ChainEnd::SourcesClosed) => {
                    info!("All sources closed");
                    break;
                }
                Err(payload) => {
                    restarts += 1;
                    error!(
                        restarts,
                        "Reconciliation failed: {}, restarting in {:?}",
                        panic_message(&*payload),
                        delay
                    );
                    if !wait_or_cancel(&cancel, delay).await {
                        break;
                    }
                }
            }
        }
        info!("Reconciliation engine stopped");
    }

    async fn run_chain(&mut self, cancel: &CancellationToken) -> ChainEnd {
        let context = Arc::clone(&self.context);
        let broadcast = context.broadcast.clone();
        let mut reconciler = Reconciler::new(Arc::clone(&self.guard));
        let events = &mut self.events;

        let combined = stream::poll_fn(move |cx| events.poll_recv(cx))
            .filter_map(move |event| future::ready(reconciler.apply(event)))
            .inspect(move |state| {
                debug!(?state, "Combined state");
                broadcast.publish(state.clone());
            })
            .throttle(context.config.engine.persist_window());
        let mut combined = pin!(combined);

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return ChainEnd::Cancelled,
                next = combined.next() => next,
            };
            match next {
                Some(state) => persist(&context, state),
                None => return ChainEnd::SourcesClosed,
            }
        }
    }
}

/// Hand a snapshot to the persistence sink without waiting for it.
fn persist(context: &SyncContext, state: MatchState) {
    let Some(match_code) = state.match_code.clone() else {
        debug!("No match code, snapshot not persisted");
        return;
    };
    let update = LiveUpdate::from_state(&state);
    let sink = Arc::clone(&context.persistence);
    tokio::spawn(async move {
        match sink.write(&match_code, &update).await {
            Ok(()) => debug!(%match_code, ?update, "Snapshot persisted"),
            Err(e) => warn!(%match_code, "Failed to persist snapshot: {}", e),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::source::VisionSignal;
    use crate::test_utils::MemorySink;
    use crate::types::MatchCode;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn context(sink: Arc<MemorySink>) -> Arc<SyncContext> {
        Arc::new(SyncContext::new(SyncConfig::default(), sink))
    }

    fn vision(chrono: u32) -> SourceEvent {
        let mut state = MatchState::for_match(MatchCode::parse("FABCDEG").unwrap());
        state.chrono_seconds = Some(chrono);
        SourceEvent::Vision(VisionSignal::Update(state))
    }

    #[tokio::test(start_paused = true)]
    async fn bursts_persist_first_and_last_state() {
        let sink = MemorySink::new();
        let context = context(Arc::clone(&sink));
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let engine = ReconciliationEngine::new(Arc::clone(&context), rx);
        let engine = tokio::spawn(engine.run(cancel.clone()));

        for chrono in 0..100 {
            tx.send(vision(chrono)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tokio::time::sleep(Duration::from_secs(30)).await;

        let writes = sink.writes();
        assert_eq!(writes.len(), 2, "writes: {writes:?}");
        assert_eq!(writes[0].1.chrono, Some(0));
        assert_eq!(writes[1].1.chrono, Some(99));
        assert_eq!(context.broadcast.latest().unwrap().chrono_seconds, Some(99));

        cancel.cancel();
        engine.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn states_without_match_code_are_broadcast_only() {
        let sink = MemorySink::new();
        let context = context(Arc::clone(&sink));
        let (tx, rx) = mpsc::channel(8);
        let engine = ReconciliationEngine::new(Arc::clone(&context), rx);
        let engine = tokio::spawn(engine.run(CancellationToken::new()));

        let console =
            MatchState { home_score: Some(2), away_score: Some(2), ..MatchState::default() };
        tx.send(SourceEvent::Console(console)).await.unwrap();
        drop(tx);
        engine.await.unwrap();

        assert!(sink.writes().is_empty());
        assert_eq!(context.broadcast.latest().unwrap().score(), Some((2, 2)));
    }

    #[tokio::test(start_paused = true)]
    async fn failing_sink_does_not_stop_the_engine() {
        let sink = MemorySink::new();
        sink.set_failing(true);
        let context = context(Arc::clone(&sink));
        let (tx, rx) = mpsc::channel(8);
        let engine = ReconciliationEngine::new(Arc::clone(&context), rx);
        let engine = tokio::spawn(engine.run(CancellationToken::new()));

        tx.send(vision(10)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        sink.set_failing(false);
        tokio::time::sleep(Duration::from_secs(20)).await;
        tx.send(vision(20)).await.unwrap();
        drop(tx);
        engine.await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let writes = sink.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].1.chrono, Some(20));
    }

    #[derive(Debug)]
    struct ExplodingGuard {
        armed: AtomicBool,
    }

    impl ResetGuard for ExplodingGuard {
        fn suppress_scores(&self, previous: &MatchState, update: &MatchState) -> bool {
            if self.armed.swap(false, Ordering::SeqCst) {
                panic!("guard exploded");
            }
            ZeroScoreGuard.suppress_scores(previous, update)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_chain_is_restarted_with_fresh_state() {
        let sink = MemorySink::new();
        let context = context(Arc::clone(&sink));
        let (tx, rx) = mpsc::channel(8);
        let guard = Arc::new(ExplodingGuard { armed: AtomicBool::new(false) });
        let engine = ReconciliationEngine::new(Arc::clone(&context), rx)
            .with_guard(Arc::clone(&guard) as Arc<dyn ResetGuard>);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(engine.run(cancel.clone()));

        let established = MatchState {
            home_score: Some(5),
            away_score: Some(3),
            chrono_seconds: Some(120),
            ..MatchState::default()
        };
        tx.send(SourceEvent::Console(established)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(context.broadcast.latest().unwrap().score(), Some((5, 3)));

        guard.armed.store(true, Ordering::SeqCst);
        tx.send(SourceEvent::Console(MatchState::default())).await.unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;

        // Fresh accumulator: the zero scores now apply
        let reset =
            MatchState { home_score: Some(0), away_score: Some(0), ..MatchState::default() };
        tx.send(SourceEvent::Console(reset)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let latest = context.broadcast.latest().unwrap();
        assert_eq!(latest.score(), Some((0, 0)));
        assert_eq!(latest.chrono_seconds, None);
        assert!(!task.is_finished());

        cancel.cancel();
        task.await.unwrap();
    }
}
