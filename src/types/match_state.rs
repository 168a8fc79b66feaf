//! Accumulated live match record

use serde::{Deserialize, Serialize};

use super::MatchCode;

/// Partially-populated live state of a handball match.
///
/// Every field is optional: a source only fills what it can observe. Merging
/// never clears a field, it only replaces it with a newer concrete value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct MatchState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_code: Option<MatchCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_score: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub away_score: Option<u16>,
    /// Game clock in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chrono_seconds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chrono_started: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<u8>,
}

impl MatchState {
    /// Empty state seeded with a match code.
    pub fn for_match(code: MatchCode) -> Self {
        Self { match_code: Some(code), ..Self::default() }
    }

    /// True when no field is populated.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Home and away score, when both are known.
    pub fn score(&self) -> Option<(u16, u16)> {
        Some((self.home_score?, self.away_score?))
    }

    /// Overwrite every field that `update` populates.
    pub fn merge_from(&mut self, update: &MatchState) {
        let MatchState { home_score, away_score, .. } = update;
        overwrite(&mut self.home_score, home_score);
        overwrite(&mut self.away_score, away_score);
        self.merge_non_score_from(update);
    }

    /// Overwrite every populated field of `update` except the two scores.
    pub fn merge_non_score_from(&mut self, update: &MatchState) {
        let MatchState {
            match_code,
            home_score: _,
            away_score: _,
            chrono_seconds,
            chrono_started,
            period,
        } = update;
        overwrite(&mut self.match_code, match_code);
        overwrite(&mut self.chrono_seconds, chrono_seconds);
        overwrite(&mut self.chrono_started, chrono_started);
        overwrite(&mut self.period, period);
    }

    /// Scores and clock are all known.
    pub fn has_score_and_clock(&self) -> bool {
        self.home_score.is_some() && self.away_score.is_some() && self.chrono_seconds.is_some()
    }

    /// Both scores are reported and equal to zero.
    pub fn reports_zero_score(&self) -> bool {
        self.home_score == Some(0) && self.away_score == Some(0)
    }
}

fn overwrite<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
    if let Some(value) = value {
        *target = Some(value.clone());
    }
}
