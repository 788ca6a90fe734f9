//! Error taxonomy for the coordination layer.

use dynaverse_model::ServiceError;

use crate::record::MarshalError;

/// Which request family a caller-side cap applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Batched put/delete requests (cap 25).
    BatchWrite,
    /// Batched get requests (cap 100).
    BatchGet,
    /// Transactional write items (cap 25).
    TransactWrite,
    /// Transactional get items (cap 100).
    TransactGet,
}

impl RequestKind {
    /// The human-readable family name used in error messages.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BatchWrite => "batch write",
            Self::BatchGet => "batch get",
            Self::TransactWrite => "transactional write",
            Self::TransactGet => "transactional get",
        }
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by the coordination layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A single-item read found nothing. Distinct from transport failures
    /// so callers can branch without string-matching.
    #[error("record not found in {table}")]
    NotFound {
        /// The table the lookup targeted.
        table: String,
    },

    /// The remote service failed. Never retried at this layer; only
    /// partial results (unprocessed items/keys) are.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// A batch group still had an unprocessed residual after the attempt
    /// budget was spent.
    #[error("max retry exceeded for {table} after {attempts} attempts")]
    RetryExhausted {
        /// The first table still carrying unprocessed entries.
        table: String,
        /// The number of submissions made.
        attempts: u32,
    },

    /// A single request exceeded the provider's hard item cap. Caught
    /// caller-side; never sent to the remote service.
    #[error("{kind} size is within {max} items, got {actual}")]
    TooManyItems {
        /// The request family the cap belongs to.
        kind: RequestKind,
        /// The cap.
        max: usize,
        /// The offending count.
        actual: usize,
    },

    /// A resolver failed while building a descriptor; the enclosing
    /// batch/transaction build aborts before any remote call.
    #[error("failed to build operation: {0}")]
    Construction(String),

    /// A record could not be converted to or from its item form.
    #[error(transparent)]
    Marshal(#[from] MarshalError),

    /// The continuation-key cursor could not be decoded.
    #[error("invalid continuation key: {0}")]
    InvalidCursor(String),

    /// `run` was called on a scope with no active ambient transaction.
    #[error("transaction not began")]
    TransactionNotBegan,

    /// Cancellation was observed between retry attempts.
    #[error("operation cancelled")]
    Cancelled,

    /// A fan-out worker task failed to join.
    #[error("worker task failed: {0}")]
    Join(String),
}

impl Error {
    /// Returns `true` for the distinguished not-found condition, whether
    /// raised locally (empty read) or reported by the service.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Service(e) => e.is_not_found(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dynaverse_model::ServiceErrorKind;

    #[test]
    fn test_should_detect_local_and_service_not_found() {
        let local = Error::NotFound {
            table: "users".to_owned(),
        };
        assert!(local.is_not_found());

        let service = Error::Service(ServiceError::not_found("users"));
        assert!(service.is_not_found());

        let other = Error::Service(ServiceError::new(ServiceErrorKind::Validation, "bad"));
        assert!(!other.is_not_found());
    }

    #[test]
    fn test_should_format_cap_violation() {
        let err = Error::TooManyItems {
            kind: RequestKind::BatchWrite,
            max: 25,
            actual: 30,
        };
        assert_eq!(err.to_string(), "batch write size is within 25 items, got 30");
    }
}
