//! Frame decoding into typed console messages

use std::ops::Range;
use tracing::{trace, warn};

use crate::types::MatchState;
use crate::{Result, SyncError};

// Link-layer framing: SOH / address / STX / CTRL ... ETX / LRC
pub const FRAME_PREFIX_LEN: usize = 4;
pub const FRAME_SUFFIX_LEN: usize = 2;

// Message 01: game clock
const CLOCK_TAG: &[u8] = b"01";
const CLOCK_STATUS_INDEX: usize = 2;
const CLOCK_SUBTYPE_INDEX: usize = 3;
const CLOCK_SUBTYPE: u8 = b'4';
const CLOCK_MINUTES: Range<usize> = 4..6;
const CLOCK_SECONDS: Range<usize> = 6..8;
const CLOCK_PERIOD_INDEX: usize = 10;

// Clock status byte flags
const STATUS_SECONDARY_CLOCK: u8 = 0x01;
const STATUS_CLOCK_STOPPED: u8 = 0x02;

// Message 02: scores
const SCORE_TAG: &[u8] = b"024";
const SCORE_HOME: Range<usize> = 3..6;
const SCORE_AWAY: Range<usize> = 6..9;

/// A decoded console message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedMessage {
    /// Primary game clock.
    Clock { chrono_seconds: u32, chrono_started: bool, period: Option<u8> },
    /// Home and away scores.
    Score { home_score: u16, away_score: u16 },
    /// Unknown message, secondary clock, or dropped frame.
    Ignored,
}

impl DecodedMessage {
    /// The partial match update carried by this message.
    pub fn into_update(self) -> Option<MatchState> {
        match self {
            DecodedMessage::Clock { chrono_seconds, chrono_started, period } => Some(MatchState {
                chrono_seconds: Some(chrono_seconds),
                chrono_started: Some(chrono_started),
                period,
                ..MatchState::default()
            }),
            DecodedMessage::Score { home_score, away_score } => Some(MatchState {
                home_score: Some(home_score),
                away_score: Some(away_score),
                ..MatchState::default()
            }),
            DecodedMessage::Ignored => None,
        }
    }
}

/// Decode one frame, dropping malformed ones with a warning.
///
/// Malformed frames never mutate state: they come back as
/// [`DecodedMessage::Ignored`].
pub fn decode_frame(frame: &[u8]) -> DecodedMessage {
    match try_decode_frame(frame) {
        Ok(message) => message,
        Err(e) => {
            warn!("Dropping console frame: {}", e);
            DecodedMessage::Ignored
        }
    }
}

/// Decode one frame, reporting malformed content as [`SyncError::Protocol`].
pub fn try_decode_frame(frame: &[u8]) -> Result<DecodedMessage> {
    if frame.len() < FRAME_PREFIX_LEN + FRAME_SUFFIX_LEN {
        return Err(SyncError::protocol(
            "frame",
            format!("{} bytes is shorter than the link framing", frame.len()),
        ));
    }
    let body = &frame[FRAME_PREFIX_LEN..frame.len() - FRAME_SUFFIX_LEN];
    trace!("Console frame body: {:?}", String::from_utf8_lossy(body));

    if body.starts_with(CLOCK_TAG) && body.get(CLOCK_SUBTYPE_INDEX) == Some(&CLOCK_SUBTYPE) {
        decode_clock(body)
    } else if body.starts_with(SCORE_TAG) {
        decode_score(body)
    } else {
        Ok(DecodedMessage::Ignored)
    }
}

fn decode_clock(body: &[u8]) -> Result<DecodedMessage> {
    let status = body[CLOCK_STATUS_INDEX];
    if status & STATUS_SECONDARY_CLOCK != 0 {
        trace!("Ignoring secondary clock message (status {:#04x})", status);
        return Ok(DecodedMessage::Ignored);
    }
    let chrono_started = status & STATUS_CLOCK_STOPPED == 0;

    let minutes = body.get(CLOCK_MINUTES).and_then(two_digits);
    let seconds = body.get(CLOCK_SECONDS).and_then(two_digits);
    let (Some(minutes), Some(seconds)) = (minutes, seconds) else {
        return Err(SyncError::protocol(
            "clock message",
            format!("invalid clock digits in {:?}", String::from_utf8_lossy(body)),
        ));
    };

    let period = body.get(CLOCK_PERIOD_INDEX).copied().and_then(digit);

    Ok(DecodedMessage::Clock { chrono_seconds: minutes * 60 + seconds, chrono_started, period })
}

fn decode_score(body: &[u8]) -> Result<DecodedMessage> {
    let home = body.get(SCORE_HOME).and_then(padded_number);
    let away = body.get(SCORE_AWAY).and_then(padded_number);
    match (home, away) {
        (Some(home_score), Some(away_score)) => {
            Ok(DecodedMessage::Score { home_score, away_score })
        }
        _ => Err(SyncError::protocol(
            "score message",
            format!("invalid score digits in {:?}", String::from_utf8_lossy(body)),
        )),
    }
}

/// One display digit; a blank position counts as zero.
fn digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b' ' => Some(0),
        _ => None,
    }
}

fn two_digits(bytes: &[u8]) -> Option<u32> {
    Some(u32::from(digit(bytes[0])?) * 10 + u32::from(digit(bytes[1])?))
}

/// A space-padded decimal field; an all-blank field counts as zero.
fn padded_number(bytes: &[u8]) -> Option<u16> {
    let text = std::str::from_utf8(bytes).ok()?.trim_matches(' ');
    if text.is_empty() {
        return Some(0);
    }
    if !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}
