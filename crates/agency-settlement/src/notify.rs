//! Post-commit sale notification.
//!
//! Runs after the sale's unit of work has committed. A failing notifier is
//! logged and otherwise ignored; it can never undo or fail a sale.

use async_trait::async_trait;

use crate::coordinator::CompletedSale;

/// Notification delivery failure.
#[derive(Debug, thiserror::Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Outbound channel told about every completed sale (SMS, e-mail, ...).
#[async_trait]
pub trait SaleNotifier: Send + Sync + std::fmt::Debug {
    async fn sale_completed(&self, sale: &CompletedSale) -> Result<(), NotifyError>;
}

/// Default notifier: a structured log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl SaleNotifier for TracingNotifier {
    async fn sale_completed(&self, sale: &CompletedSale) -> Result<(), NotifyError> {
        tracing::info!(
            sale_id = %sale.sale.id,
            policy_number = %sale.sale.policy_number,
            customer_id = %sale.customer.id,
            plate = %sale.vehicle.plate,
            "sale completed notification"
        );
        Ok(())
    }
}
