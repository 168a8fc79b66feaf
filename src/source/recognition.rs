//! Text recognition of captured score sheet fields

use std::fmt;

use super::vision::FieldImage;
use crate::Result;

/// Region of the score sheet window that is captured and recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureField {
    Chrono,
    HomeScore,
    AwayScore,
}

impl CaptureField {
    pub fn name(&self) -> &'static str {
        match self {
            CaptureField::Chrono => "chrono",
            CaptureField::HomeScore => "home score",
            CaptureField::AwayScore => "away score",
        }
    }

    /// Characters a recognizer should restrict itself to for this field.
    pub fn charset(&self) -> &'static str {
        match self {
            CaptureField::Chrono => "0123456789:-",
            CaptureField::HomeScore | CaptureField::AwayScore => "0123456789",
        }
    }
}

impl fmt::Display for CaptureField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Turns a captured field image into text.
///
/// `Ok(None)` means nothing legible was found. Implementations wrap an OCR
/// engine; they may be slow, which is why the vision source never runs more
/// than one recognition pass at a time.
#[async_trait::async_trait]
pub trait Recognizer: Send + Sync + 'static {
    async fn recognize(&self, field: CaptureField, image: &FieldImage) -> Result<Option<String>>;
}

/// Parse a recognized clock (`MM:SS`) into total seconds.
pub fn parse_clock(text: &str) -> Option<u32> {
    let (minutes, seconds) = text.trim().split_once(':')?;
    let minutes: u32 = digits(minutes)?;
    let seconds: u32 = digits(seconds)?;
    minutes.checked_mul(60)?.checked_add(seconds)
}

/// Parse a recognized score.
pub fn parse_score(text: &str) -> Option<u16> {
    digits(text.trim())
}

fn digits<T: std::str::FromStr>(text: &str) -> Option<T> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_text_to_seconds() {
        assert_eq!(parse_clock("12:34"), Some(754));
        assert_eq!(parse_clock(" 0:05\n"), Some(5));
        assert_eq!(parse_clock("60:00"), Some(3600));
    }

    #[test]
    fn malformed_clock_text() {
        for text in ["", "12", "12:", ":34", "1a:00", "-1:00", "12:34:56", "12 :34"] {
            assert_eq!(parse_clock(text), None, "{text:?}");
        }
    }

    #[test]
    fn score_text() {
        assert_eq!(parse_score("7"), Some(7));
        assert_eq!(parse_score(" 31 "), Some(31));
        assert_eq!(parse_score(""), None);
        assert_eq!(parse_score("3-1"), None);
        assert_eq!(parse_score("+3"), None);
        assert_eq!(parse_score("99999999"), None);
    }

    #[test]
    fn field_charsets() {
        assert!(CaptureField::Chrono.charset().contains(':'));
        assert!(!CaptureField::HomeScore.charset().contains(':'));
        assert_eq!(CaptureField::AwayScore.to_string(), "away score");
    }
}
