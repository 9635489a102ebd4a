//! # Settlement Error -- The Business Error Kind
//!
//! A single tagged error for every validation or business-rule rejection
//! in the settlement core. Each variant knows its HTTP-style status code
//! and a stable machine-readable code.
//!
//! Returning one of these from inside a unit of work aborts it. No retry
//! is implied: the same input will be rejected again.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::money::Rate;
use crate::payment::PaymentStatus;

/// Business-rule rejection raised by the settlement core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SettlementError {
    /// Input failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A referenced record does not exist.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Record kind ("package", "agency", ...).
        kind: &'static str,
        /// Identifier as presented by the caller.
        id: String,
    },

    /// A branch rate would exceed its agency's rate.
    #[error("branch commission rate {branch_rate} exceeds agency rate {agency_rate}")]
    RateCapViolation {
        /// Offending (or existing) branch rate.
        branch_rate: Rate,
        /// Agency rate acting as the cap.
        agency_rate: Rate,
    },

    /// A debit would drive the balance negative.
    #[error("insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds {
        /// Balance read inside the unit of work.
        balance: Decimal,
        /// Amount the debit needed.
        required: Decimal,
    },

    /// The sale has already been refunded.
    #[error("sale {0} is already refunded")]
    AlreadyRefunded(String),

    /// The sale's validity period is over.
    #[error("contract ended on {0}; refund no longer possible")]
    ContractExpired(chrono::NaiveDate),

    /// Payment status graph forbids the transition.
    #[error("invalid payment transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status.
        from: PaymentStatus,
        /// Attempted status.
        to: PaymentStatus,
    },

    /// Callback authenticity hash did not match.
    #[error("callback hash mismatch")]
    InvalidSignature,
}

impl SettlementError {
    /// HTTP status code conveyed with this rejection.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::RateCapViolation { .. } | Self::ContractExpired(_) => 422,
            Self::NotFound { .. } => 404,
            Self::InsufficientFunds { .. }
            | Self::AlreadyRefunded(_)
            | Self::InvalidTransition { .. } => 409,
            Self::InvalidSignature => 400,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::RateCapViolation { .. } => "RATE_CAP_VIOLATION",
            Self::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Self::AlreadyRefunded(_) => "ALREADY_REFUNDED",
            Self::ContractExpired(_) => "CONTRACT_EXPIRED",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::InvalidSignature => "INVALID_SIGNATURE",
        }
    }

    /// Shorthand for a [`SettlementError::NotFound`].
    pub fn not_found(kind: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn status_codes() {
        assert_eq!(SettlementError::Validation("x".into()).status_code(), 422);
        assert_eq!(SettlementError::not_found("package", "p1").status_code(), 404);
        assert_eq!(SettlementError::InvalidSignature.status_code(), 400);
        assert_eq!(
            SettlementError::InsufficientFunds {
                balance: dec!(500),
                required: dec!(600)
            }
            .status_code(),
            409
        );
    }

    #[test]
    fn not_found_message_names_kind() {
        let err = SettlementError::not_found("package", "abc");
        assert_eq!(err.to_string(), "package abc not found");
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn insufficient_funds_message_carries_amounts() {
        let err = SettlementError::InsufficientFunds {
            balance: dec!(500.00),
            required: dec!(600.00),
        };
        let msg = err.to_string();
        assert!(msg.contains("500.00"));
        assert!(msg.contains("600.00"));
    }
}
