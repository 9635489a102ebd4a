//! # Payment Record and Status Machine
//!
//! ```text
//! PENDING ──▶ COMPLETED ──▶ REFUNDED
//!    │
//!    └──────▶ FAILED
//! ```
//!
//! `PENDING → {COMPLETED, FAILED}` happens exactly once (first writer wins).
//! `COMPLETED → REFUNDED` is reachable only from the refund flow. Every
//! other pair is rejected with [`SettlementError::InvalidTransition`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::SettlementError;
use crate::identity::{AgencyId, PaymentId, SaleId};

/// How the customer pays for the sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    /// External card gateway, settled asynchronously by callback.
    Gateway,
    /// Debited from the selling agency's balance inside the sale transaction.
    Balance,
}

impl PaymentMethod {
    /// Persisted string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gateway => "GATEWAY",
            Self::Balance => "BALANCE",
        }
    }

    /// Parse the persisted string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "GATEWAY" => Some(Self::Gateway),
            "BALANCE" => Some(Self::Balance),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    /// Persisted string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Refunded => "REFUNDED",
        }
    }

    /// Parse the persisted string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            "REFUNDED" => Some(Self::Refunded),
            _ => None,
        }
    }

    /// Whether the status graph allows `self → to`.
    pub fn can_transition_to(&self, to: PaymentStatus) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Completed)
                | (Self::Pending, Self::Failed)
                | (Self::Completed, Self::Refunded)
        )
    }

    /// Whether the gateway settlement decision has already been made.
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payment row. Created together with its sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub sale_id: SaleId,
    pub agency_id: Option<AgencyId>,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub failure_reason: Option<String>,
    /// Opaque provider payload recorded at settlement.
    #[serde(default)]
    pub provider_detail: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Build a new payment in the given initial status.
    pub fn new(
        sale_id: SaleId,
        agency_id: Option<AgencyId>,
        amount: Decimal,
        method: PaymentMethod,
        status: PaymentStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PaymentId::new(),
            sale_id,
            agency_id,
            amount,
            method,
            status,
            transaction_id: None,
            failure_reason: None,
            provider_detail: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `to`, enforcing the status graph.
    pub fn transition(&mut self, to: PaymentStatus, now: DateTime<Utc>) -> Result<(), SettlementError> {
        if !self.status.can_transition_to(to) {
            return Err(SettlementError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }
}
