//! Match code identifier

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Result, SyncError};

/// Seven-letter uppercase code identifying a match on the score sheet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct MatchCode(String);

impl MatchCode {
    /// Number of letters in a match code.
    pub const LEN: usize = 7;

    /// Parse a match code, rejecting anything but exactly seven `A-Z` letters.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.len() == Self::LEN && text.bytes().all(|b| b.is_ascii_uppercase()) {
            Ok(Self(text.to_string()))
        } else {
            Err(SyncError::recognition(
                "match code",
                format!("'{}' is not {} uppercase letters", text, Self::LEN),
            ))
        }
    }

    /// Get the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for MatchCode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for MatchCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for MatchCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        MatchCode::parse(&raw).map_err(serde::de::Error::custom)
    }
}
