//! Error types shared across txnflow crates

use thiserror::Error;

/// Result type alias for txnflow common operations
pub type Result<T> = std::result::Result<T, TxnError>;

/// Whether re-invoking the failed unit of work can succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient condition (connectivity, timeouts). The caller may retry.
    Retryable,
    /// The unit of work is rejected as-is.
    NonRetryable,
}

/// Errors that can tell the caller whether a retry makes sense.
pub trait Classify {
    fn class(&self) -> ErrorClass;

    fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Retryable
    }
}

/// Common error type for configuration and value parsing
#[derive(Error, Debug)]
pub enum TxnError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl TxnError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

impl Classify for TxnError {
    fn class(&self) -> ErrorClass {
        match self {
            TxnError::Io(_) => ErrorClass::Retryable,
            TxnError::Config(_) | TxnError::Parse(_) => ErrorClass::NonRetryable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_are_not_retryable() {
        let err = TxnError::config("INGEST_BATCH_SIZE must be positive");
        assert_eq!(err.class(), ErrorClass::NonRetryable);
        assert!(!err.is_retryable());
        assert_eq!(
            err.to_string(),
            "Configuration error: INGEST_BATCH_SIZE must be positive"
        );
    }

    #[test]
    fn test_io_errors_are_retryable() {
        let err = TxnError::from(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "read timed out",
        ));
        assert!(err.is_retryable());
    }
}
