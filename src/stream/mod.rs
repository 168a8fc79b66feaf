//! Stream combinators used between sources, engine and sinks.
//!
//! - [`ExhaustLatestExt`] keeps slow per-sample work (recognition, log parsing)
//!   from building a backlog: one call in flight, newest input wins.
//! - [`ThrottleExt`] rate-limits snapshot delivery with leading and trailing
//!   emission, so bursts are coalesced without losing the final value.

mod exhaust;
mod throttle;

pub use exhaust::{ExhaustLatestExt, ExhaustMapLatest};
pub use throttle::{Throttle, ThrottleExt};
