//! Merge policy between the vision and console sources

use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::source::{SourceEvent, VisionSignal};
use crate::types::MatchState;

/// Decides when a console score update is a glitch to ignore.
pub trait ResetGuard: Send + Sync + fmt::Debug + 'static {
    /// Whether the scores in `update` must not overwrite those of `previous`.
    fn suppress_scores(&self, previous: &MatchState, update: &MatchState) -> bool;
}

/// Ignores console 0/0 scores once a match has both scores and a clock.
///
/// Consoles briefly report 0/0 when they are power cycled or change mode;
/// non-score fields of the same update still apply.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZeroScoreGuard;

impl ResetGuard for ZeroScoreGuard {
    fn suppress_scores(&self, previous: &MatchState, update: &MatchState) -> bool {
        previous.has_score_and_clock() && update.reports_zero_score()
    }
}

/// Accepts every console score.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoResetGuard;

impl ResetGuard for NoResetGuard {
    fn suppress_scores(&self, _previous: &MatchState, _update: &MatchState) -> bool {
        false
    }
}

/// Combined state of both sources.
///
/// Keeps the latest message of each source and recomputes the combined state
/// whenever either changes. A source that never reported contributes nothing.
#[derive(Debug)]
pub struct Reconciler {
    guard: Arc<dyn ResetGuard>,
    state: MatchState,
    vision: Option<VisionSignal>,
    console: Option<MatchState>,
    last_emitted: Option<MatchState>,
}

impl Reconciler {
    pub fn new(guard: Arc<dyn ResetGuard>) -> Self {
        Self {
            guard,
            state: MatchState::default(),
            vision: None,
            console: None,
            last_emitted: None,
        }
    }

    /// Current combined state.
    pub fn state(&self) -> &MatchState {
        &self.state
    }

    /// Record `event` and recompute.
    ///
    /// Returns the combined state unless it equals the previously returned one.
    pub fn apply(&mut self, event: SourceEvent) -> Option<MatchState> {
        match event {
            SourceEvent::Vision(signal) => self.vision = Some(signal),
            SourceEvent::Console(state) => self.console = Some(state),
        }
        self.state = self.recompute();

        if self.last_emitted.as_ref() == Some(&self.state) {
            trace!("Combined state unchanged");
            return None;
        }
        self.last_emitted = Some(self.state.clone());
        Some(self.state.clone())
    }

    fn recompute(&self) -> MatchState {
        let vision = match &self.vision {
            Some(VisionSignal::NoMatch) => return MatchState::default(),
            Some(VisionSignal::Update(vision)) => Some(vision),
            None => None,
        };

        let mut next = self.state.clone();
        if let Some(vision) = vision {
            next.merge_from(vision);
        }
        if let Some(console) = &self.console {
            if self.guard.suppress_scores(&self.state, console) {
                debug!("Ignoring console score reset");
                next.merge_non_score_from(console);
            } else {
                next.merge_from(console);
            }
        }
        next
    }
}
