//! Stream throttling utilities

use futures::Stream;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Sleep, sleep};

/// Extension trait to add throttling to any Stream
pub trait ThrottleExt: Stream {
    /// Throttle the stream to emit at most once per window.
    ///
    /// Leading and trailing delivery: the first item after a quiet period is
    /// emitted immediately and opens a window. Items arriving inside the window
    /// are coalesced, "latest wins", and the survivor is emitted when the window
    /// closes, which opens the next window. When the input ends, a pending
    /// item is flushed right away.
    fn throttle(self, window: Duration) -> Throttle<Self>
    where
        Self: Sized,
    {
        Throttle::new(self, window)
    }
}

impl<T: Stream> ThrottleExt for T {}

pin_project! {
    /// A stream combinator that throttles emission rate
    #[must_use = "streams do nothing unless polled"]
    pub struct Throttle<S: Stream> {
        #[pin]
        stream: S,
        window: Duration,
        timer: Option<Pin<Box<Sleep>>>,
        trailing: Option<S::Item>,
        input_done: bool,
    }
}

impl<S: Stream> Throttle<S> {
    /// Create a new throttled stream
    pub fn new(stream: S, window: Duration) -> Self {
        Self { stream, window, timer: None, trailing: None, input_done: false }
    }
}

impl<S: Stream> Stream for Throttle<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        while !*this.input_done {
            match this.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(item)) => {
                    if this.timer.is_none() {
                        // Leading edge: quiet period over, emit and open a window
                        *this.timer = Some(Box::pin(sleep(*this.window)));
                        return Poll::Ready(Some(item));
                    }
                    *this.trailing = Some(item);
                }
                Poll::Ready(None) => *this.input_done = true,
                Poll::Pending => break,
            }
        }

        if *this.input_done {
            // Flush the coalesced item instead of waiting out the window
            *this.timer = None;
            return Poll::Ready(this.trailing.take());
        }

        let Some(timer) = this.timer.as_mut() else {
            return Poll::Pending;
        };
        if timer.as_mut().poll(cx).is_pending() {
            return Poll::Pending;
        }

        // Trailing edge
        match this.trailing.take() {
            Some(item) => {
                *this.timer = Some(Box::pin(sleep(*this.window)));
                Poll::Ready(Some(item))
            }
            None => {
                *this.timer = None;
                Poll::Pending
            }
        }
    }
}
