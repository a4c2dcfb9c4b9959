//! Error types for the scanwarden library.
//!
//! Adapter and extraction failures are normally folded into a failed
//! [`ScanResult`](crate::core::ScanResult) by the dispatcher; these types are
//! what the lower layers return before that happens, and what reaches the
//! caller for request-level faults (invalid input, review store faults).

use std::time::Duration;
use thiserror::Error;

/// The main error type for scan operations.
#[derive(Debug, Error)]
pub enum ScanError {
    /// A path or identifier failed validation before any process was started.
    #[error("invalid input '{value}': {reason}")]
    InvalidInput {
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The external tool did not finish in time.
    #[error("scan timed out after {elapsed:?} on engine '{engine}'")]
    Timeout {
        /// Name of the engine that timed out.
        engine: String,
        /// How long the operation ran before timing out.
        elapsed: Duration,
    },

    /// The scanning engine could not be started or reached.
    #[error("engine '{engine}' is unavailable: {reason}")]
    EngineUnavailable {
        /// Name of the engine that is unavailable.
        engine: String,
        /// Human-readable reason for unavailability.
        reason: String,
    },

    /// An archive could not be unpacked.
    #[error("archive invalid: {0}")]
    Extraction(#[from] ExtractionError),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal error occurred.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },
}

impl ScanError {
    /// Returns `true` if this error was raised by input validation.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput { .. })
    }

    /// Returns `true` if this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns the engine name if this error is associated with one.
    pub fn engine(&self) -> Option<&str> {
        match self {
            Self::Timeout { engine, .. } | Self::EngineUnavailable { engine, .. } => Some(engine),
            _ => None,
        }
    }

    /// Creates an `InvalidInput` error.
    pub fn invalid_input(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `Timeout` error.
    pub fn timeout(engine: impl Into<String>, elapsed: Duration) -> Self {
        Self::Timeout {
            engine: engine.into(),
            elapsed,
        }
    }

    /// Creates an `EngineUnavailable` error.
    pub fn engine_unavailable(engine: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EngineUnavailable {
            engine: engine.into(),
            reason: reason.into(),
        }
    }

    /// Creates an `Internal` error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a `Configuration` error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

/// Error type for archive extraction.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The file is not an archive format we unpack.
    #[error("'{path}' is not a supported archive")]
    NotAnArchive {
        /// Path that was inspected.
        path: String,
    },

    /// The archive is truncated or otherwise unreadable.
    #[error("corrupt archive: {reason}")]
    Corrupt {
        /// Description from the decoder.
        reason: String,
    },

    /// An entry would escape the destination directory.
    #[error("unsafe archive entry '{name}'")]
    UnsafeEntry {
        /// Entry name as stored in the archive.
        name: String,
    },

    /// An I/O error occurred while unpacking.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error type for review queue operations.
#[derive(Debug, Error)]
pub enum ReviewError {
    /// Reading or writing the persisted collection failed.
    #[error("review store fault: {reason}")]
    StoreFault {
        /// Reason for the failure.
        reason: String,
    },

    /// A positional reference does not point into the current collection.
    #[error("index {index} is out of range for {len} review entries")]
    IndexOutOfRange {
        /// The requested position.
        index: usize,
        /// Length of the collection at the time of the call.
        len: usize,
    },

    /// No entry carries the requested id.
    #[error("review entry not found: {id}")]
    NotFound {
        /// The id that was not found.
        id: String,
    },
}

impl ReviewError {
    /// Creates a `StoreFault` error.
    pub fn store_fault(reason: impl Into<String>) -> Self {
        Self::StoreFault {
            reason: reason.into(),
        }
    }

    /// Returns `true` if the caller referenced an entry that does not exist.
    pub fn is_stale_reference(&self) -> bool {
        matches!(self, Self::IndexOutOfRange { .. } | Self::NotFound { .. })
    }
}

/// A specialized `Result` type for review queue operations.
pub type ReviewResult<T> = Result<T, ReviewError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_error_engine() {
        let err = ScanError::engine_unavailable("clamav", "clamscan not found");
        assert_eq!(err.engine(), Some("clamav"));

        let err = ScanError::invalid_input("../etc", "contains '..'");
        assert_eq!(err.engine(), None);
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_extraction_error_display() {
        let err = ScanError::from(ExtractionError::Corrupt {
            reason: "unexpected EOF".into(),
        });
        assert_eq!(err.to_string(), "archive invalid: corrupt archive: unexpected EOF");
    }

    #[test]
    fn test_review_error_classification() {
        let err = ReviewError::IndexOutOfRange { index: 3, len: 2 };
        assert!(err.is_stale_reference());
        assert!(err.to_string().contains("index 3"));
        assert!(!ReviewError::store_fault("disk full").is_stale_reference());
    }
}
