//! Service-level error and unit-of-work completion.

use agency_core::SettlementError;
use agency_gateway::GatewayError;
use agency_store::{StoreError, UnitOfWork};
use thiserror::Error;

/// Everything a settlement operation can fail with.
///
/// - `Rejected`: business rule or validation. Not retryable.
/// - `Upstream`: gateway unreachable or refusing. Retryable; nothing was mutated.
/// - `Storage`: engine failure. The unit of work was rolled back.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Rejected(#[from] SettlementError),

    #[error("payment gateway unavailable: {0}")]
    Upstream(#[from] GatewayError),

    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}

impl ServiceError {
    /// The business error, if this is one.
    pub fn as_rejection(&self) -> Option<&SettlementError> {
        match self {
            Self::Rejected(e) => Some(e),
            _ => None,
        }
    }
}

/// Commit on `Ok`, roll back on `Err`.
///
/// A failed rollback is logged; the original error still wins.
pub(crate) async fn finish<T>(
    uow: Box<dyn UnitOfWork>,
    result: Result<T, ServiceError>,
) -> Result<T, ServiceError> {
    match result {
        Ok(value) => {
            uow.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = uow.rollback().await {
                tracing::error!(error = %rollback_err, "rollback failed after: {err}");
            }
            Err(err)
        }
    }
}
