//! Fulfillment error types.

use blood_store::StoreError;
use common::{BloodType, RequestId};
use thiserror::Error;

/// Errors that can occur while fulfilling a request.
///
/// Every variant is raised before the transaction commits, so a failed
/// fulfillment never leaves partial writes behind.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    /// The request does not exist.
    #[error("Request not found")]
    NotFound(RequestId),

    /// The request is no longer `Pending`.
    #[error("Request already fulfilled")]
    AlreadyFulfilled(RequestId),

    /// Not enough stock for the requested blood type.
    #[error("Insufficient stock")]
    InsufficientStock {
        blood_type: BloodType,
        available: u32,
        requested: u32,
    },

    /// The allocation override is not a positive unit count.
    #[error("{0}")]
    InvalidInput(String),

    /// The store could not complete the transaction.
    #[error("Storage failure: {0}")]
    StorageFailure(#[from] StoreError),
}

impl FulfillmentError {
    /// Returns true if retrying with the same arguments may succeed.
    ///
    /// Business rejections are deterministic; only storage failures such as
    /// lock timeouts or lost connections are transient.
    pub fn is_retriable(&self) -> bool {
        matches!(self, FulfillmentError::StorageFailure(_))
    }

    /// Returns a stable label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            FulfillmentError::NotFound(_) => "not_found",
            FulfillmentError::AlreadyFulfilled(_) => "already_fulfilled",
            FulfillmentError::InsufficientStock { .. } => "insufficient_stock",
            FulfillmentError::InvalidInput(_) => "invalid_input",
            FulfillmentError::StorageFailure(_) => "storage_failure",
        }
    }
}

/// Convenience type alias for fulfillment results.
pub type Result<T> = std::result::Result<T, FulfillmentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_storage_failures_are_retriable() {
        let timeout = StoreError::LockTimeout { waited_ms: 10 };
        assert!(FulfillmentError::StorageFailure(timeout).is_retriable());
        assert!(!FulfillmentError::NotFound(RequestId::new(1)).is_retriable());
        assert!(!FulfillmentError::AlreadyFulfilled(RequestId::new(1)).is_retriable());
        assert!(
            !FulfillmentError::InsufficientStock {
                blood_type: BloodType::OPositive,
                available: 1,
                requested: 2,
            }
            .is_retriable()
        );
    }

    #[test]
    fn messages_match_api_contract() {
        assert_eq!(
            FulfillmentError::NotFound(RequestId::new(9)).to_string(),
            "Request not found"
        );
        assert_eq!(
            FulfillmentError::AlreadyFulfilled(RequestId::new(9)).to_string(),
            "Request already fulfilled"
        );
        assert_eq!(
            FulfillmentError::InsufficientStock {
                blood_type: BloodType::AbNegative,
                available: 0,
                requested: 1,
            }
            .to_string(),
            "Insufficient stock"
        );
    }
}
