//! # Error Types
//!
//! All errors use `thiserror` for derive-based `Display` and `Error`
//! implementations. Lifecycle errors live next to their state machines in
//! `rsm-state`; this module carries what every crate shares.

use thiserror::Error;

/// Top-level error type for the revenue stamp service.
#[derive(Error, Debug)]
pub enum RsmError {
    /// Input failed domain validation.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Arithmetic on an amount overflowed `i64` minor units.
    #[error("amount overflow: {0}")]
    AmountOverflow(String),
}

/// Validation failure on a domain primitive.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Tax identification number (NIF) is malformed.
    #[error("invalid tax identification number {value:?}: {reason}")]
    InvalidTaxId {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A monetary amount could not be parsed or is out of range.
    #[error("invalid amount {0:?}")]
    InvalidAmount(String),

    /// A quantity is outside the permitted range.
    #[error("quantity {value} out of range {min}..={max}")]
    QuantityOutOfRange {
        /// Supplied quantity.
        value: i64,
        /// Inclusive lower bound.
        min: i64,
        /// Inclusive upper bound.
        max: i64,
    },

    /// A timestamp string was not RFC 3339 UTC.
    #[error("invalid timestamp {value:?}: {reason}")]
    InvalidTimestamp {
        /// The rejected input.
        value: String,
        /// Parser message.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_wraps_into_rsm_error() {
        let err: RsmError = ValidationError::InvalidAmount("abc".into()).into();
        assert!(matches!(err, RsmError::Validation(_)));
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn quantity_out_of_range_message() {
        let err = ValidationError::QuantityOutOfRange {
            value: 0,
            min: 1,
            max: 100,
        };
        assert_eq!(err.to_string(), "quantity 0 out of range 1..=100");
    }
}
