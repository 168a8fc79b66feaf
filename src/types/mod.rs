//! Core types for live match representation.
//!
//! - [`MatchState`] is the partially-populated record both sources contribute to
//! - [`MatchCode`] identifies the active match on the score sheet
//! - [`ConnectivityState`] is the externally observable health of a source, owned
//!   through a [`ConnectivityTracker`]
//!
//! ## Usage Example
//!
//! ```rust
//! use scorebridge::types::{MatchCode, MatchState};
//!
//! let mut state = MatchState::for_match(MatchCode::parse("FABCDEG").unwrap());
//! let update = MatchState { home_score: Some(5), away_score: Some(3), ..Default::default() };
//! state.merge_from(&update);
//! assert_eq!(state.score(), Some((5, 3)));
//! ```

mod connectivity;
mod match_code;
mod match_state;

pub use connectivity::{ConnectivityState, ConnectivityTracker};
pub use match_code::MatchCode;
pub use match_state::MatchState;
