//! Service error taxonomy as observed by a client.
//!
//! The remote service reports failures as a `__type`-tagged JSON body. Only
//! the kinds the convenience layer branches on get their own variant; the
//! rest collapse into `Other` with the original code preserved.

use std::fmt;

/// Well-known error kinds returned by the service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ServiceErrorKind {
    /// The named table (or item resource) does not exist.
    ResourceNotFound,
    /// The table is being created or deleted.
    ResourceInUse,
    /// A condition expression evaluated to false.
    ConditionalCheckFailed,
    /// A transactional request was canceled; none of its operations applied.
    TransactionCanceled,
    /// A transactional request conflicted with a concurrent one.
    TransactionConflict,
    /// The request rate exceeded the table's provisioned throughput.
    ProvisionedThroughputExceeded,
    /// The request failed input validation.
    Validation,
    /// The request body could not be (de)serialized.
    Serialization,
    /// The service failed internally.
    InternalServerError,
    /// Any other error code, preserved verbatim.
    Other(String),
}

impl ServiceErrorKind {
    /// Parse the short error code (the fragment after `#` in `__type`).
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code {
            "ResourceNotFoundException" => Self::ResourceNotFound,
            "ResourceInUseException" => Self::ResourceInUse,
            "ConditionalCheckFailedException" => Self::ConditionalCheckFailed,
            "TransactionCanceledException" => Self::TransactionCanceled,
            "TransactionConflictException" => Self::TransactionConflict,
            "ProvisionedThroughputExceededException" => Self::ProvisionedThroughputExceeded,
            "ValidationException" => Self::Validation,
            "SerializationException" => Self::Serialization,
            "InternalServerError" => Self::InternalServerError,
            other => Self::Other(other.to_owned()),
        }
    }

    /// The short error code string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::ResourceNotFound => "ResourceNotFoundException",
            Self::ResourceInUse => "ResourceInUseException",
            Self::ConditionalCheckFailed => "ConditionalCheckFailedException",
            Self::TransactionCanceled => "TransactionCanceledException",
            Self::TransactionConflict => "TransactionConflictException",
            Self::ProvisionedThroughputExceeded => "ProvisionedThroughputExceededException",
            Self::Validation => "ValidationException",
            Self::Serialization => "SerializationException",
            Self::InternalServerError => "InternalServerError",
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error reported by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ServiceError {
    /// The classified error kind.
    pub kind: ServiceErrorKind,
    /// The human-readable message from the service.
    pub message: String,
}

impl ServiceError {
    /// Create an error of the given kind.
    #[must_use]
    pub fn new(kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The service's "requested resource not found" error for a table.
    #[must_use]
    pub fn not_found(table: &str) -> Self {
        Self::new(
            ServiceErrorKind::ResourceNotFound,
            format!("Requested resource not found: {table}"),
        )
    }

    /// Returns `true` if the service reported a missing resource.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind == ServiceErrorKind::ResourceNotFound
    }

    /// Returns `true` if the service reported a failed condition check.
    #[must_use]
    pub fn is_conditional_check_failed(&self) -> bool {
        self.kind == ServiceErrorKind::ConditionalCheckFailed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_classify_known_codes() {
        assert_eq!(
            ServiceErrorKind::from_code("ResourceNotFoundException"),
            ServiceErrorKind::ResourceNotFound
        );
        assert_eq!(
            ServiceErrorKind::from_code("TransactionCanceledException"),
            ServiceErrorKind::TransactionCanceled
        );
    }

    #[test]
    fn test_should_preserve_unknown_codes() {
        let kind = ServiceErrorKind::from_code("RequestLimitExceeded");
        assert_eq!(kind.as_str(), "RequestLimitExceeded");
    }

    #[test]
    fn test_should_detect_not_found() {
        assert!(ServiceError::not_found("users").is_not_found());
        let other = ServiceError::new(ServiceErrorKind::Validation, "bad input");
        assert!(!other.is_not_found());
    }
}
