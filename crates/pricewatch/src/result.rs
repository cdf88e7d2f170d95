//! Result and error types for Pricewatch.

use thiserror::Error;

use crate::inject::AttemptRecord;

/// Result type for Pricewatch operations
pub type PriceWatchResult<T> = Result<T, PriceWatchError>;

/// Errors that can occur while driving a comparison page
#[derive(Debug, Error)]
pub enum PriceWatchError {
    /// No element matched the query before the locate timeout
    #[error("No element matching {descriptor} appeared within {timeout_ms}ms{}", last_error_suffix(.last_error))]
    ElementNotFound {
        /// Query that was searched for
        descriptor: String,
        /// Timeout in milliseconds
        timeout_ms: u64,
        /// Last collaborator error seen while polling, if any
        last_error: Option<String>,
    },

    /// Every injection strategy was tried and none stuck
    #[error("Could not set value on {descriptor}: {}", summarize_attempts(.attempts))]
    ValueInjectionFailed {
        /// Control that was written to
        descriptor: String,
        /// One record per attempted strategy, in order
        attempts: Vec<AttemptRecord>,
    },

    /// Submit control stayed disabled past the enablement timeout
    #[error("Submit control {descriptor} was not enabled within {timeout_ms}ms")]
    SubmissionNotReady {
        /// Submit control that was found
        descriptor: String,
        /// Timeout in milliseconds
        timeout_ms: u64,
    },

    /// Result indicator never rendered
    #[error("Result indicator {descriptor} did not appear within {timeout_ms}ms{}", last_error_suffix(.last_error))]
    ResultsNotReady {
        /// Indicator query
        descriptor: String,
        /// Timeout in milliseconds
        timeout_ms: u64,
        /// Last collaborator error seen while polling, if any
        last_error: Option<String>,
    },

    /// Navigation error
    #[error("Navigation to {url} failed: {message}")]
    NavigationFailed {
        /// URL that failed
        url: String,
        /// Error message
        message: String,
    },

    /// Snapshot could not be taken or written. Logged, never fatal.
    #[error("Diagnostic capture for stage {stage} failed: {message}")]
    DiagnosticCaptureFailed {
        /// Stage the snapshot was tagged with
        stage: String,
        /// Error message
        message: String,
    },

    /// Browsing collaborator error
    #[error("Browser driver error: {message}")]
    Driver {
        /// Error message
        message: String,
    },

    /// Invalid run configuration
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl PriceWatchError {
    /// Create a driver error
    #[must_use]
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver {
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether this error ends the current run
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::DiagnosticCaptureFailed { .. })
    }
}

#[allow(clippy::ref_option)]
fn last_error_suffix(last_error: &Option<String>) -> String {
    last_error
        .as_deref()
        .map_or_else(String::new, |e| format!(" (last error: {e})"))
}

fn summarize_attempts(attempts: &[AttemptRecord]) -> String {
    if attempts.is_empty() {
        return "no strategies configured".to_string();
    }
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::inject::InjectionStrategy;

    #[test]
    fn test_element_not_found_message() {
        let err = PriceWatchError::ElementNotFound {
            descriptor: "input[placeholder~post]".to_string(),
            timeout_ms: 250,
            last_error: None,
        };
        let msg = err.to_string();
        assert!(msg.contains("input[placeholder~post]"));
        assert!(msg.contains("250ms"));
        assert!(!msg.contains("last error"));
    }

    #[test]
    fn test_element_not_found_includes_last_error() {
        let err = PriceWatchError::ElementNotFound {
            descriptor: "button".to_string(),
            timeout_ms: 10,
            last_error: Some("context destroyed".to_string()),
        };
        assert!(err.to_string().contains("last error: context destroyed"));
    }

    #[test]
    fn test_value_injection_failed_lists_attempts() {
        let err = PriceWatchError::ValueInjectionFailed {
            descriptor: "input".to_string(),
            attempts: vec![
                AttemptRecord::mismatch(InjectionStrategy::DirectFill, String::new()),
                AttemptRecord::errored(InjectionStrategy::Keyboard, "detached"),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("direct-fill"));
        assert!(msg.contains("keyboard"));
        assert!(msg.contains("detached"));
    }

    #[test]
    fn test_value_injection_failed_without_strategies() {
        let err = PriceWatchError::ValueInjectionFailed {
            descriptor: "input".to_string(),
            attempts: vec![],
        };
        assert!(err.to_string().contains("no strategies configured"));
    }

    #[test]
    fn test_diagnostic_capture_is_not_fatal() {
        let err = PriceWatchError::DiagnosticCaptureFailed {
            stage: "submit".to_string(),
            message: "disk full".to_string(),
        };
        assert!(!err.is_fatal());
        assert!(PriceWatchError::driver("boom").is_fatal());
    }

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: PriceWatchError = io_err.into();
        assert!(err.to_string().contains("I/O"));
    }
}
