//! Inbound callback payload.
//!
//! The gateway POSTs these as a form (and, in test mode, may GET with the
//! same fields as query parameters). Only `merchant_oid`, `status`,
//! `total_amount` and `hash` are signed.

use serde::{Deserialize, Serialize};

use crate::signature::Signer;

/// Body the gateway requires on every correctly signed callback.
pub const CALLBACK_ACK: &str = "OK";

/// Status value that marks a settled payment. Anything else is a failure.
pub const STATUS_SUCCESS: &str = "success";

/// Fields of a gateway callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackPayload {
    pub merchant_oid: String,
    pub status: String,
    /// Settled amount in minor units, as a decimal string.
    pub total_amount: String,
    pub hash: String,
    #[serde(default)]
    pub failed_reason_code: Option<String>,
    #[serde(default)]
    pub failed_reason_msg: Option<String>,
    #[serde(default)]
    pub test_mode: Option<String>,
    #[serde(default)]
    pub payment_type: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub payment_amount: Option<String>,
}

impl CallbackPayload {
    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }

    /// Hash check over the signed fields.
    pub fn verify(&self, signer: &Signer) -> bool {
        signer.verify_callback(&self.merchant_oid, &self.status, &self.total_amount, &self.hash)
    }

    /// Provider reason for a failed payment, `code: message` when both exist.
    pub fn failure_reason(&self) -> String {
        match (self.failed_reason_code.as_deref(), self.failed_reason_msg.as_deref()) {
            (Some(code), Some(msg)) => format!("{code}: {msg}"),
            (Some(code), None) => code.to_string(),
            (None, Some(msg)) => msg.to_string(),
            (None, None) => format!("gateway status {}", self.status),
        }
    }

    /// Unsigned metadata kept on the payment row for audit.
    pub fn provider_detail(&self) -> serde_json::Value {
        serde_json::json!({
            "status": self.status,
            "total_amount": self.total_amount,
            "payment_type": self.payment_type,
            "currency": self.currency,
            "payment_amount": self.payment_amount,
            "test_mode": self.test_mode,
            "failed_reason_code": self.failed_reason_code,
            "failed_reason_msg": self.failed_reason_msg,
        })
    }
}
