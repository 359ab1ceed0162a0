//! Core error types for depdag.

use std::fmt;

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Invalid encoding
    InvalidEncoding {
        /// Decoder message
        message: String,
    },

    /// Malformed identity
    InvalidId {
        /// What was wrong with it
        reason: String,
    },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEncoding { message } => write!(f, "Invalid encoding: {}", message),
            Self::InvalidId { reason } => write!(f, "Invalid ID: {}", reason),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidEncoding {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::InvalidId {
            reason: "empty function name".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid ID: empty function name");
    }

    #[test]
    fn test_from_serde_json() {
        let parse: Result<u64, _> = serde_json::from_str("not json");
        let err: CoreError = parse.unwrap_err().into();
        assert!(matches!(err, CoreError::InvalidEncoding { .. }));
        assert!(err.to_string().starts_with("Invalid encoding"));
    }
}
