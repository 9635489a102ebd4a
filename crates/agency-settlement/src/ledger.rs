//! # Balance Ledger
//!
//! Credits and debits against agency and branch balances. Both run inside
//! the caller's unit of work, next to the event that caused them, so a
//! sale, payment or refund is never committed without its ledger effect.
//!
//! A debit reads the balance through the same unit of work (locking the
//! row on engines that lock) before writing it back, so two concurrent
//! debits cannot both pass the check.

use agency_core::{ensure_storable, round_money, AgencyId, BranchId, SettlementError};
use agency_store::UnitOfWork;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::ServiceError;

/// A balance-bearing account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerAccount {
    Agency(AgencyId),
    Branch(BranchId),
}

impl std::fmt::Display for LedgerAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Agency(id) => id.fmt(f),
            Self::Branch(id) => id.fmt(f),
        }
    }
}

fn check_amount(amount: Decimal) -> Result<Decimal, SettlementError> {
    if amount < Decimal::ZERO {
        return Err(SettlementError::Validation(format!(
            "ledger amount must not be negative, got {amount}"
        )));
    }
    Ok(round_money(amount))
}

/// Read the account, apply `op` to its balance, write it back.
async fn adjust(
    uow: &mut dyn UnitOfWork,
    account: LedgerAccount,
    now: DateTime<Utc>,
    op: impl FnOnce(Decimal) -> Result<Option<Decimal>, SettlementError>,
) -> Result<Decimal, ServiceError> {
    match account {
        LedgerAccount::Agency(id) => {
            let mut agency = uow
                .agency(id)
                .await?
                .ok_or_else(|| SettlementError::not_found("agency", id))?;
            let Some(updated) = op(agency.balance)? else {
                return Ok(agency.balance);
            };
            agency.balance = updated;
            agency.updated_at = now;
            uow.update_agency(&agency).await?;
            Ok(updated)
        }
        LedgerAccount::Branch(id) => {
            let mut branch = uow
                .branch(id)
                .await?
                .ok_or_else(|| SettlementError::not_found("branch", id))?;
            let Some(updated) = op(branch.balance)? else {
                return Ok(branch.balance);
            };
            branch.balance = updated;
            branch.updated_at = now;
            uow.update_branch(&branch).await?;
            Ok(updated)
        }
    }
}

/// Add `amount` to the account. Zero is a no-op. Returns the new balance.
pub async fn credit(
    uow: &mut dyn UnitOfWork,
    account: LedgerAccount,
    amount: Decimal,
    now: DateTime<Utc>,
) -> Result<Decimal, ServiceError> {
    let amount = check_amount(amount)?;
    let balance = adjust(uow, account, now, |balance| {
        if amount.is_zero() {
            return Ok(None);
        }
        let updated = balance
            .checked_add(amount)
            .ok_or_else(|| SettlementError::Validation(format!("balance overflow crediting {amount}")))?;
        ensure_storable("balance", updated).map(Some)
    })
    .await?;
    if !amount.is_zero() {
        tracing::info!(account = %account, amount = %amount, balance = %balance, "ledger credit");
    }
    Ok(balance)
}

/// Subtract `amount` from the account, refusing to go below zero.
/// Returns the new balance.
pub async fn debit(
    uow: &mut dyn UnitOfWork,
    account: LedgerAccount,
    amount: Decimal,
    now: DateTime<Utc>,
) -> Result<Decimal, ServiceError> {
    let amount = check_amount(amount)?;
    let balance = adjust(uow, account, now, |balance| {
        if balance < amount {
            tracing::warn!(account = %account, balance = %balance, required = %amount, "debit refused");
            return Err(SettlementError::InsufficientFunds {
                balance,
                required: amount,
            });
        }
        Ok(Some(balance - amount))
    })
    .await?;
    tracing::info!(account = %account, amount = %amount, balance = %balance, "ledger debit");
    Ok(balance)
}
