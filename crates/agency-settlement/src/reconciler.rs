//! # Callback Reconciler
//!
//! Finalizes GATEWAY payments from the gateway's webhook.
//!
//! 1. The hash is checked before anything else; a mismatch is rejected
//!    and no unit of work is opened.
//! 2. The sanitized order id is mapped back to the sale.
//! 3. Inside one unit of work the payment row is read (and locked where
//!    the engine supports it). A COMPLETED or FAILED payment is left alone:
//!    repeated or late deliveries are successful no-ops.
//! 4. A PENDING payment becomes COMPLETED on `success` (amount taken from
//!    the callback) or FAILED otherwise, with the provider's reason.
//!
//! The ledger is never touched here; commission was credited at sale time.
//! Once the hash passes the caller must acknowledge with
//! [`agency_gateway::CALLBACK_ACK`] whatever the outcome.

use agency_core::{from_minor_units, Payment, PaymentMethod, PaymentStatus, SaleId, SettlementError};
use agency_gateway::{order_id, CallbackPayload, Signer};
use agency_store::{StoreHandle, UnitOfWork};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::{finish, ServiceError};

/// What a verified callback did.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackOutcome {
    /// PENDING → COMPLETED.
    Completed { sale_id: SaleId, amount: Decimal },
    /// PENDING → FAILED.
    Failed { sale_id: SaleId, reason: String },
    /// Payment was already terminal; nothing changed.
    AlreadySettled { sale_id: SaleId, status: PaymentStatus },
    /// The order id does not map to any payment.
    UnknownOrder { merchant_oid: String },
}

#[derive(Debug, Clone)]
pub struct CallbackReconciler {
    store: StoreHandle,
    signer: Signer,
}

impl CallbackReconciler {
    pub fn new(store: StoreHandle, signer: Signer) -> Self {
        Self { store, signer }
    }

    pub async fn reconcile(
        &self,
        payload: &CallbackPayload,
        now: DateTime<Utc>,
    ) -> Result<CallbackOutcome, ServiceError> {
        if !payload.verify(&self.signer) {
            tracing::warn!(merchant_oid = %payload.merchant_oid, "callback hash mismatch");
            return Err(SettlementError::InvalidSignature.into());
        }

        let Some(sale_id) = order_id::sale_id_from(&payload.merchant_oid) else {
            tracing::warn!(merchant_oid = %payload.merchant_oid, "callback for unrecognized order id");
            return Ok(CallbackOutcome::UnknownOrder {
                merchant_oid: payload.merchant_oid.clone(),
            });
        };

        let mut uow = self.store.begin().await?;
        let result = settle_in(uow.as_mut(), sale_id, payload, now).await;
        let outcome = finish(uow, result).await?;

        match &outcome {
            CallbackOutcome::Completed { amount, .. } => {
                tracing::info!(sale_id = %sale_id, amount = %amount, "payment completed");
            }
            CallbackOutcome::Failed { reason, .. } => {
                tracing::info!(sale_id = %sale_id, reason = %reason, "payment failed");
            }
            CallbackOutcome::AlreadySettled { status, .. } => {
                tracing::info!(sale_id = %sale_id, status = %status, "duplicate callback ignored");
            }
            CallbackOutcome::UnknownOrder { merchant_oid } => {
                tracing::warn!(sale_id = %sale_id, merchant_oid = %merchant_oid, "callback for sale without payment");
            }
        }
        Ok(outcome)
    }
}

fn settled_amount(payment: &Payment, payload: &CallbackPayload) -> Decimal {
    match from_minor_units(&payload.total_amount) {
        Ok(amount) => amount,
        Err(e) => {
            tracing::warn!(
                payment_id = %payment.id,
                total_amount = %payload.total_amount,
                error = %e,
                "unparseable callback amount, keeping recorded amount"
            );
            payment.amount
        }
    }
}

async fn settle_in(
    uow: &mut dyn UnitOfWork,
    sale_id: SaleId,
    payload: &CallbackPayload,
    now: DateTime<Utc>,
) -> Result<CallbackOutcome, ServiceError> {
    let Some(mut payment) = uow.payment_for_sale(sale_id).await? else {
        return Ok(CallbackOutcome::UnknownOrder {
            merchant_oid: payload.merchant_oid.clone(),
        });
    };

    if payment.status.is_settled() || payment.method != PaymentMethod::Gateway {
        return Ok(CallbackOutcome::AlreadySettled {
            sale_id,
            status: payment.status,
        });
    }

    payment.provider_detail = payload.provider_detail();
    let outcome = if payload.is_success() {
        let amount = settled_amount(&payment, payload);
        payment.transition(PaymentStatus::Completed, now)?;
        payment.amount = amount;
        payment.failure_reason = None;
        CallbackOutcome::Completed { sale_id, amount }
    } else {
        let reason = payload.failure_reason();
        payment.transition(PaymentStatus::Failed, now)?;
        payment.failure_reason = Some(reason.clone());
        CallbackOutcome::Failed { sale_id, reason }
    };
    uow.update_payment(&payment).await?;
    Ok(outcome)
}
