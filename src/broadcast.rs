//! Live snapshot feed for local displays

use futures::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::stream::ThrottleExt;
use crate::types::MatchState;

/// Latest-value broadcast of merged match states.
///
/// New subscribers immediately receive the current snapshot; slow subscribers
/// skip intermediate ones and only see the newest.
#[derive(Debug, Clone)]
pub struct BroadcastHub {
    tx: Arc<watch::Sender<Option<Arc<MatchState>>>>,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastHub {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Replace the current snapshot.
    pub fn publish(&self, state: MatchState) {
        self.tx.send_replace(Some(Arc::new(state)));
    }

    /// Current snapshot, if any was published.
    pub fn latest(&self) -> Option<Arc<MatchState>> {
        self.tx.borrow().clone()
    }

    /// Raw watch receiver, for callers that want `changed()`/`wait_for()`.
    pub fn receiver(&self) -> watch::Receiver<Option<Arc<MatchState>>> {
        self.tx.subscribe()
    }

    /// Every snapshot, starting with the current one.
    pub fn updates(&self) -> impl Stream<Item = Arc<MatchState>> + 'static {
        WatchStream::new(self.tx.subscribe()).filter_map(|opt| async move { opt })
    }

    /// Snapshots rate-limited with leading and trailing delivery.
    pub fn throttled_updates(
        &self,
        window: Duration,
    ) -> impl Stream<Item = Arc<MatchState>> + 'static {
        self.updates().throttle(window)
    }
}
