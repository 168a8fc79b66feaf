//! Error types for match-state acquisition and reconciliation.
//!
//! Every failure the library can observe maps to one [`SyncError`] variant. The
//! variant decides how the owning layer recovers, so callers rarely need more
//! than [`SyncError::is_retryable`] and a log line.
//!
//! ## Error Categories
//!
//! - **Discovery**: no qualifying network interface or log file was found
//! - **Transport**: socket, capture pipeline or file-watch failures
//! - **Protocol**: a console frame could not be decoded
//! - **Recognition**: a recognizer could not read a field
//! - **Processing**: unexpected failure while turning samples into updates
//! - **Persistence**: the persistence collaborator rejected a snapshot
//! - **Config**: invalid or unreadable configuration
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use scorebridge::SyncError;
//!
//! let error = SyncError::discovery("network interface", "no wired interface found");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for scorebridge operations.
pub type Result<T, E = SyncError> = std::result::Result<T, E>;

/// Main error type for acquisition and reconciliation.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SyncError {
    #[error("{resource} unavailable: {reason}")]
    Discovery { resource: String, reason: String },

    #[error("Transport failure in {context}")]
    Transport {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Protocol error in {context}: {details}")]
    Protocol { context: String, details: String },

    #[error("Recognition of {field} failed: {details}")]
    Recognition { field: String, details: String },

    #[error("Update processing failed: {reason}")]
    Processing { reason: String },

    #[error("Persistence of match {match_code} failed: {reason}")]
    Persistence {
        match_code: String,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Invalid configuration: {details}")]
    Config { details: String },

    #[error("File error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SyncError {
    /// Returns whether the failing layer should schedule a retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Discovery { .. } => true,
            SyncError::Transport { .. } => true,
            SyncError::Processing { .. } => true,
            SyncError::Persistence { .. } => true,
            SyncError::File { .. } => true,
            SyncError::Protocol { .. } => false,
            SyncError::Recognition { .. } => false,
            SyncError::Config { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            SyncError::Discovery { .. } => vec![
                "Plug the scoreboard console into a wired network interface",
                "Check the interface name prefix in the configuration",
                "Open the score sheet application so its log file exists",
            ],
            SyncError::Transport { .. } => vec![
                "Check the network cable between console and host",
                "Make sure no other process listens on the console port",
                "Wait for the automatic reconnection",
            ],
            SyncError::Protocol { .. } => vec![
                "Check the console is configured for the handball output protocol",
                "Inspect the raw frame in debug logs",
            ],
            SyncError::Recognition { .. } => vec![
                "Keep the score sheet window visible and unobstructed",
                "Check the window is not scaled or partially off-screen",
            ],
            SyncError::Processing { .. } => vec![
                "Inspect error logs for the failing recognition step",
                "Wait for the processing layer to restart",
            ],
            SyncError::Persistence { .. } => vec![
                "Check network connectivity to the persistence backend",
                "Verify the output directory is writable",
            ],
            SyncError::Config { .. } => vec![
                "Check the configuration file against the documented fields",
                "Remove unknown or zero-valued durations",
            ],
            SyncError::File { .. } => vec![
                "Check file exists and is readable",
                "Check file permissions",
            ],
        }
    }

    /// Helper constructor for discovery errors.
    pub fn discovery(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        SyncError::Discovery { resource: resource.into(), reason: reason.into() }
    }

    /// Helper constructor for transport errors.
    pub fn transport(context: impl Into<String>, source: std::io::Error) -> Self {
        SyncError::Transport { context: context.into(), source }
    }

    /// Helper constructor for protocol errors.
    pub fn protocol(context: impl Into<String>, details: impl Into<String>) -> Self {
        SyncError::Protocol { context: context.into(), details: details.into() }
    }

    /// Helper constructor for recognition errors.
    pub fn recognition(field: impl Into<String>, details: impl Into<String>) -> Self {
        SyncError::Recognition { field: field.into(), details: details.into() }
    }

    /// Helper constructor for processing errors.
    pub fn processing(reason: impl Into<String>) -> Self {
        SyncError::Processing { reason: reason.into() }
    }

    /// Helper constructor for persistence errors with source.
    pub fn persistence(
        match_code: impl Into<String>,
        reason: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        SyncError::Persistence { match_code: match_code.into(), reason: reason.into(), source }
    }

    /// Helper constructor for configuration errors.
    pub fn config(details: impl Into<String>) -> Self {
        SyncError::Config { details: details.into() }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        SyncError::File { path, source }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Transport { context: "<unknown>".to_string(), source: err }
    }
}

/// Render a caught panic payload for logging.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
          #[test]
          fn error_messages_carry_their_context(
            resource in "[a-z ]{1,20}",
            reason in ".*",
            context in "[a-z ]{1,20}",
            details in ".*",
            code in "[A-Z]{7}"
          ) {
            let discovery = SyncError::discovery(resource.clone(), reason.clone());
            prop_assert!(discovery.to_string().contains(&resource));
            prop_assert!(discovery.to_string().contains(&reason));

            let protocol = SyncError::protocol(context.clone(), details.clone());
            prop_assert!(protocol.to_string().contains(&context));
            prop_assert!(protocol.to_string().contains(&details));

            let persistence = SyncError::persistence(code.clone(), "rejected", None);
            prop_assert!(persistence.to_string().contains(&code));
          }

          #[test]
          fn io_errors_convert_to_transport(reason in ".*") {
            let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, reason.clone());
            let converted: SyncError = io_err.into();
            match converted {
              SyncError::Transport { source, .. } => {
                prop_assert_eq!(source.to_string(), reason);
              }
              _ => prop_assert!(false, "Expected Transport error from io::Error conversion"),
            }
          }
        }
    }

    #[test]
    fn retry_classification_matches_recovery_layers() {
        assert!(SyncError::discovery("log file", "missing").is_retryable());
        assert!(SyncError::processing("panic").is_retryable());
        assert!(
            SyncError::transport("accept", std::io::Error::other("reset")).is_retryable()
        );
        assert!(!SyncError::protocol("clock", "bad digits").is_retryable());
        assert!(!SyncError::recognition("chrono", "unreadable").is_retryable());
        assert!(!SyncError::config("zero window").is_retryable());
    }

    #[test]
    fn every_variant_has_suggestions() {
        let errors = [
            SyncError::discovery("interface", "none"),
            SyncError::transport("read", std::io::Error::other("eof")),
            SyncError::protocol("score", "bad"),
            SyncError::recognition("home score", "noise"),
            SyncError::processing("panic"),
            SyncError::persistence("ABCDEFG", "offline", None),
            SyncError::config("bad"),
            SyncError::file_error(PathBuf::from("/tmp/x"), std::io::Error::other("denied")),
        ];
        for error in &errors {
            let suggestions = error.recovery_suggestions();
            assert!(!suggestions.is_empty(), "{error} has no suggestions");
            assert!(suggestions.iter().all(|s| s.len() > 5));
        }
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<SyncError>();

        let error = SyncError::transport("bind", std::io::Error::other("in use"));
        let source = std::error::Error::source(&error).expect("transport keeps its source");
        assert_eq!(source.to_string(), "in use");
    }

    #[test]
    fn panic_payloads_render() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn std::any::Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
