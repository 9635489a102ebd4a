//! # Prorated Refunds
//!
//! ```text
//! net_price      = gross_price / 1.20
//! contract_days  = end_date - start_date            (days, at least 1)
//! daily_rate     = net_price / contract_days
//! used_days      = today - start_date               (clamped to 0..=contract_days)
//! remaining_days = contract_days - used_days
//! refund_amount  = daily_rate * remaining_days      (rounded to cents)
//! ```
//!
//! Applying a refund marks the sale, credits the agency for BALANCE
//! payments and moves the payment to REFUNDED. Branch balances are not
//! adjusted and GATEWAY refunds never touch the ledger.

use agency_core::{
    round_money, Payment, PaymentMethod, PaymentStatus, Sale, SaleId, SettlementError,
};
use agency_store::{StoreHandle, UnitOfWork};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::{finish, ServiceError};
use crate::ledger::{self, LedgerAccount};

/// Gross prices include 20% VAT.
const VAT_DIVISOR: Decimal = dec!(1.20);

/// Breakdown of a prorated refund.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundQuote {
    pub sale_id: SaleId,
    pub gross_price: Decimal,
    pub net_price: Decimal,
    pub contract_days: i64,
    pub daily_rate: Decimal,
    pub used_days: i64,
    pub remaining_days: i64,
    pub refund_amount: Decimal,
}

/// Proration for a sale's price and validity period as of `today`.
pub fn prorate(sale: &Sale, today: NaiveDate) -> RefundQuote {
    let contract_days = (sale.end_date - sale.start_date).num_days().max(1);
    let used_days = (today - sale.start_date).num_days().clamp(0, contract_days);
    let remaining_days = contract_days - used_days;

    let net_price = sale.price / VAT_DIVISOR;
    let daily_rate = net_price / Decimal::from(contract_days);
    let refund_amount = round_money(daily_rate * Decimal::from(remaining_days));

    RefundQuote {
        sale_id: sale.id,
        gross_price: sale.price,
        net_price: round_money(net_price),
        contract_days,
        daily_rate: round_money(daily_rate),
        used_days,
        remaining_days,
        refund_amount,
    }
}

fn check_refundable(sale: &Sale, today: NaiveDate) -> Result<(), SettlementError> {
    if sale.is_refunded {
        return Err(SettlementError::AlreadyRefunded(sale.id.to_string()));
    }
    if today > sale.end_date {
        return Err(SettlementError::ContractExpired(sale.end_date));
    }
    Ok(())
}

/// Who asked for a refund and why.
#[derive(Debug, Clone)]
pub struct RefundCommand {
    pub sale_id: SaleId,
    pub reason: String,
    pub actor: String,
}

/// Result of an applied refund.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedRefund {
    pub sale: Sale,
    pub payment: Option<Payment>,
    pub quote: RefundQuote,
}

#[derive(Debug, Clone)]
pub struct RefundService {
    store: StoreHandle,
}

impl RefundService {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    /// Compute the refund without changing anything.
    pub async fn quote_refund(&self, sale_id: SaleId, today: NaiveDate) -> Result<RefundQuote, ServiceError> {
        let mut uow = self.store.begin().await?;
        let result = quote_in(uow.as_mut(), sale_id, today).await;
        finish(uow, result).await
    }

    /// Refund the sale as of `today`.
    pub async fn apply_refund(
        &self,
        cmd: RefundCommand,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<AppliedRefund, ServiceError> {
        if cmd.reason.trim().is_empty() {
            return Err(SettlementError::Validation("refund reason must not be empty".into()).into());
        }
        let mut uow = self.store.begin().await?;
        let result = apply_in(uow.as_mut(), &cmd, today, now).await;
        let applied = finish(uow, result).await?;
        tracing::info!(
            sale_id = %cmd.sale_id,
            amount = %applied.quote.refund_amount,
            remaining_days = applied.quote.remaining_days,
            actor = %cmd.actor,
            "refund applied"
        );
        Ok(applied)
    }
}

async fn load_sale(uow: &mut dyn UnitOfWork, sale_id: SaleId) -> Result<Sale, ServiceError> {
    uow.sale(sale_id)
        .await?
        .ok_or_else(|| SettlementError::not_found("sale", sale_id).into())
}

async fn quote_in(uow: &mut dyn UnitOfWork, sale_id: SaleId, today: NaiveDate) -> Result<RefundQuote, ServiceError> {
    let sale = load_sale(uow, sale_id).await?;
    check_refundable(&sale, today)?;
    Ok(prorate(&sale, today))
}

async fn apply_in(
    uow: &mut dyn UnitOfWork,
    cmd: &RefundCommand,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<AppliedRefund, ServiceError> {
    let mut sale = load_sale(uow, cmd.sale_id).await?;
    check_refundable(&sale, today)?;
    let quote = prorate(&sale, today);

    sale.is_refunded = true;
    sale.refunded_at = Some(now);
    sale.refund_amount = Some(quote.refund_amount);
    sale.refund_reason = Some(cmd.reason.trim().to_string());
    sale.refunded_by = Some(cmd.actor.clone());
    uow.update_sale(&sale).await?;

    let mut payment = uow.payment_for_sale(sale.id).await?;
    if let Some(p) = payment.as_mut() {
        if p.method == PaymentMethod::Balance {
            let agency_id = sale.agency_id.ok_or_else(|| {
                SettlementError::Validation("balance payment without an agency".into())
            })?;
            ledger::credit(uow, LedgerAccount::Agency(agency_id), quote.refund_amount, now).await?;
        }
        if p.status == PaymentStatus::Completed {
            p.transition(PaymentStatus::Refunded, now)?;
            uow.update_payment(p).await?;
        } else {
            tracing::warn!(
                sale_id = %sale.id,
                payment_id = %p.id,
                status = %p.status,
                "refunded sale has an unsettled payment; status left unchanged"
            );
        }
    }

    Ok(AppliedRefund { sale, payment, quote })
}

#[cfg(test)]
mod tests {
    use super::*;
    use agency_core::{CustomerId, PackageId, VehicleId};

    fn sale(price: Decimal, start: NaiveDate, end: NaiveDate) -> Sale {
        Sale {
            id: SaleId::new(),
            customer_id: CustomerId::new(),
            vehicle_id: VehicleId::new(),
            agency_id: None,
            branch_id: None,
            package_id: PackageId::new(),
            price,
            commission: dec!(0),
            branch_commission: None,
            agency_commission: None,
            start_date: start,
            end_date: end,
            policy_number: "202601010000000001".into(),
            is_refunded: false,
            refunded_at: None,
            refund_amount: None,
            refund_reason: None,
            refunded_by: None,
            created_at: Utc::now(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn full_year_refunded_on_start_date() {
        let s = sale(dec!(1200), date(2025, 1, 1), date(2026, 1, 1));
        let q = prorate(&s, date(2025, 1, 1));
        assert_eq!(q.contract_days, 365);
        assert_eq!(q.net_price, dec!(1000.00));
        assert_eq!(q.remaining_days, 365);
        assert_eq!(q.refund_amount, dec!(1000.00));
    }

    #[test]
    fn nothing_refunded_on_end_date() {
        let s = sale(dec!(1200), date(2025, 1, 1), date(2026, 1, 1));
        let q = prorate(&s, date(2026, 1, 1));
        assert_eq!(q.remaining_days, 0);
        assert_eq!(q.refund_amount, dec!(0.00));
    }

    #[test]
    fn half_way_refunds_about_half() {
        let s = sale(dec!(1200), date(2025, 1, 1), date(2025, 1, 11));
        let q = prorate(&s, date(2025, 1, 6));
        assert_eq!(q.used_days, 5);
        assert_eq!(q.remaining_days, 5);
        assert_eq!(q.refund_amount, dec!(500.00));
    }

    #[test]
    fn before_start_counts_as_unused() {
        let s = sale(dec!(120), date(2025, 3, 1), date(2025, 3, 11));
        let q = prorate(&s, date(2025, 2, 1));
        assert_eq!(q.used_days, 0);
        assert_eq!(q.refund_amount, dec!(100.00));
    }

    #[test]
    fn refundability_rules() {
        let mut s = sale(dec!(1200), date(2025, 1, 1), date(2025, 12, 31));
        assert!(check_refundable(&s, date(2025, 12, 31)).is_ok());
        assert_eq!(
            check_refundable(&s, date(2026, 1, 1)),
            Err(SettlementError::ContractExpired(date(2025, 12, 31)))
        );
        s.is_refunded = true;
        assert!(matches!(
            check_refundable(&s, date(2025, 6, 1)),
            Err(SettlementError::AlreadyRefunded(_))
        ));
    }
}
