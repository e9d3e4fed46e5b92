//! Domain error types
//!
//! Errors raised when constructing or validating domain values.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Record identifier is empty or malformed
    #[error("Invalid record ID: {0}")]
    InvalidId(String),

    /// Collection name is empty or contains reserved characters
    #[error("Invalid collection name: {0}")]
    InvalidCollection(String),

    /// Unknown outbox operation type
    #[error("Invalid operation type: {0}")]
    InvalidOpType(String),

    /// Listing query parameters out of range
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
