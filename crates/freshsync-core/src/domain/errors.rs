//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! including validation failures, invalid state transitions, and
//! endpoint key errors.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid endpoint path format or content
    #[error("Invalid endpoint path: {0}")]
    InvalidPath(String),

    /// Invalid endpoint key format
    #[error("Invalid endpoint key: {0}")]
    InvalidEndpointKey(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DomainError::InvalidPath("bad path".to_string());
        assert_eq!(err.to_string(), "Invalid endpoint path: bad path");

        let err = DomainError::InvalidState {
            from: "Ready".to_string(),
            to: "DoneSuccess".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid state transition from Ready to DoneSuccess"
        );
    }

    #[test]
    fn test_error_equality() {
        let err1 = DomainError::InvalidId("x".to_string());
        let err2 = DomainError::InvalidId("x".to_string());
        let err3 = DomainError::InvalidId("y".to_string());

        assert_eq!(err1, err2);
        assert_ne!(err1, err3);
    }
}
