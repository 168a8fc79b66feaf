//! Bounded-concurrency mapping: one call in flight, newest input wins

use futures::{Stream, ready};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::trace;

/// Extension trait adding [`exhaust_map_latest`](ExhaustLatestExt::exhaust_map_latest)
/// to any Stream.
pub trait ExhaustLatestExt: Stream {
    /// Map each input through the async `project`, never running two calls at once.
    ///
    /// While a call is in flight only the most recent input is retained; any
    /// input superseded before dispatch is discarded and never processed. When
    /// the call completes the retained input (if any) is dispatched at once.
    ///
    /// Results are yielded in completion order, one per call actually made.
    /// The first `Err` is yielded and then the stream ends; there is no retry
    /// here, that belongs to whoever composes this stream.
    fn exhaust_map_latest<F, Fut, T, E>(self, project: F) -> ExhaustMapLatest<Self, F, Fut>
    where
        Self: Sized,
        F: FnMut(Self::Item) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        ExhaustMapLatest::new(self, project)
    }
}

impl<S: Stream> ExhaustLatestExt for S {}

pin_project! {
    /// Stream for [`ExhaustLatestExt::exhaust_map_latest`].
    #[must_use = "streams do nothing unless polled"]
    pub struct ExhaustMapLatest<S: Stream, F, Fut> {
        #[pin]
        stream: S,
        project: F,
        in_flight: Option<Pin<Box<Fut>>>,
        latest: Option<S::Item>,
        input_done: bool,
        failed: bool,
    }
}

impl<S: Stream, F, Fut> ExhaustMapLatest<S, F, Fut> {
    /// Wrap `stream`, mapping inputs through `project`.
    pub fn new(stream: S, project: F) -> Self {
        Self { stream, project, in_flight: None, latest: None, input_done: false, failed: false }
    }
}

impl<S, F, Fut, T, E> Stream for ExhaustMapLatest<S, F, Fut>
where
    S: Stream,
    F: FnMut(S::Item) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    type Item = Result<T, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        if *this.failed {
            return Poll::Ready(None);
        }

        // Drain every ready input; while busy only the newest survives
        while !*this.input_done {
            match this.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(item)) => {
                    if this.in_flight.is_none() {
                        *this.in_flight = Some(Box::pin((this.project)(item)));
                    } else if this.latest.replace(item).is_some() {
                        trace!("Superseded pending input discarded");
                    }
                }
                Poll::Ready(None) => *this.input_done = true,
                Poll::Pending => break,
            }
        }

        let Some(call) = this.in_flight.as_mut() else {
            return if *this.input_done { Poll::Ready(None) } else { Poll::Pending };
        };

        let output = ready!(call.as_mut().poll(cx));
        *this.in_flight = None;
        if output.is_err() {
            *this.failed = true;
            *this.latest = None;
        } else if let Some(item) = this.latest.take() {
            *this.in_flight = Some(Box::pin((this.project)(item)));
        }
        Poll::Ready(Some(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::convert::Infallible;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    fn recording(
        calls: &Arc<Mutex<Vec<char>>>,
        work: Duration,
    ) -> impl FnMut(char) -> Pin<Box<dyn Future<Output = Result<char, Infallible>> + Send>> {
        let calls = Arc::clone(calls);
        move |input| {
            calls.lock().unwrap().push(input);
            Box::pin(async move {
                tokio::time::sleep(work).await;
                Ok(input)
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn inputs_arriving_mid_call_keep_only_the_latest() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            tx.send('a').unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            tx.send('b').unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            tx.send('c').unwrap();
        });

        let outputs: Vec<_> = UnboundedReceiverStream::new(rx)
            .exhaust_map_latest(recording(&calls, Duration::from_millis(100)))
            .collect()
            .await;

        assert_eq!(outputs, vec![Ok('a'), Ok('c')]);
        assert_eq!(*calls.lock().unwrap(), vec!['a', 'c']);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_combinator_dispatches_immediately() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::unbounded_channel();
        let mut outputs = Box::pin(
            UnboundedReceiverStream::new(rx)
                .exhaust_map_latest(recording(&calls, Duration::from_millis(5))),
        );

        for input in ['x', 'y', 'z'] {
            tx.send(input).unwrap();
            assert_eq!(outputs.next().await, Some(Ok(input)));
            // Each call finishes before the next input, so none is skipped
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        drop(tx);
        assert_eq!(outputs.next().await, None);
        assert_eq!(*calls.lock().unwrap(), vec!['x', 'y', 'z']);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_before_first_poll_runs_first_and_last() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let inputs = futures::stream::iter(['a', 'b', 'c', 'd']);
        let outputs: Vec<_> = inputs
            .exhaust_map_latest(recording(&calls, Duration::from_millis(1)))
            .collect()
            .await;
        assert_eq!(outputs, vec![Ok('a'), Ok('d')]);
        assert_eq!(*calls.lock().unwrap(), vec!['a', 'd']);
    }

    #[tokio::test]
    async fn failure_ends_the_stream() {
        let inputs = futures::stream::iter([1u32, 2, 3]);
        let mut outputs = Box::pin(inputs.exhaust_map_latest(|n| async move {
            if n == 1 { Err(format!("failed on {n}")) } else { Ok(n) }
        }));

        assert_eq!(outputs.next().await, Some(Err("failed on 1".to_string())));
        assert_eq!(outputs.next().await, None);
        assert_eq!(outputs.next().await, None);
    }

    #[tokio::test]
    async fn empty_input_completes() {
        let outputs: Vec<Result<u8, Infallible>> = futures::stream::empty::<u8>()
            .exhaust_map_latest(|n| async move { Ok(n) })
            .collect()
            .await;
        assert!(outputs.is_empty());
    }
}
