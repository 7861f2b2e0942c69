//! Ledger error model.

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type used across the ledger.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger-level error.
///
/// Every mutating error path guarantees the store is left in its
/// pre-operation state; a failed operation never reports partial effect.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// A required field was missing or malformed; the operation was not attempted.
    #[error("validation failed: {0}")]
    Validation(String),

    /// No storage record exists at the given key.
    #[error("record not found")]
    NotFound,

    /// Requested quantity exceeds what the record holds.
    #[error("insufficient quantity: {available} available")]
    InsufficientQuantity { available: Decimal },

    /// Transfer source and target are the same cell.
    #[error("source and target cell are the same")]
    SameLocation,

    /// A concurrent update was detected; the caller may retry.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The store could not be reached or the transaction failed.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn insufficient(available: Decimal) -> Self {
        Self::InsufficientQuantity { available }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    /// Whether retrying the same operation can reasonably succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
