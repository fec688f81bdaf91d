use std::io;
use thiserror::Error;

use crate::model::QuotaType;

/// Failures surfaced by the ledger and its stores.
///
/// Every failure maps to exactly one of these kinds. `InsufficientBalance` is
/// an expected outcome of usage simulation and never leaves partial state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Eligible buckets of the requested category cannot absorb the amount
    #[error("Insufficient balance for account '{account_id}': requested {requested} bytes of {category}, available {available} bytes")]
    InsufficientBalance {
        account_id: String,
        category: QuotaType,
        requested: u64,
        available: u64,
    },

    /// The durable store could not be read or written
    #[error("Storage unavailable during {operation}: {details}")]
    StorageUnavailable {
        operation: String,
        details: String,
    },

    /// Malformed topping input, rejected before anything is persisted
    #[error("Invalid bucket: {details}")]
    InvalidBucket {
        details: String,
    },
}

impl LedgerError {
    pub fn invalid_bucket(details: impl Into<String>) -> Self {
        LedgerError::InvalidBucket {
            details: details.into(),
        }
    }

    pub fn is_insufficient_balance(&self) -> bool {
        matches!(self, LedgerError::InsufficientBalance { .. })
    }
}

impl From<io::Error> for LedgerError {
    fn from(err: io::Error) -> Self {
        io_to_storage_error("unknown", err)
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::StorageUnavailable {
            operation: "serialization".to_string(),
            details: err.to_string(),
        }
    }
}

/// Maps an IO error to a `StorageUnavailable` tagged with the failing operation
pub fn io_to_storage_error(operation: &str, error: io::Error) -> LedgerError {
    LedgerError::StorageUnavailable {
        operation: operation.to_string(),
        details: error.to_string(),
    }
}

/// Standard result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
