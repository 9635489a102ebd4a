//! # Commission Split
//!
//! Divides a sale's commission between a branch and its parent agency.
//! Pure; rates are read by the caller and frozen into the sale.
//!
//! | Branch | Agency | branch share | agency share |
//! |--------|--------|--------------|--------------|
//! | Rb | Ra (Rb ≤ Ra) | P·Rb/100 | P·(Ra−Rb)/100 |
//! | none | Ra | none | P·Ra/100 |
//! | none | none | none | P·20/100 |
//!
//! Each share is rounded to two decimals and the total is their sum, so
//! `commission == branch + agency` holds exactly on the stored values.

use agency_core::{ensure_storable, percent_of, round_money, Rate, SettlementError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Result of a commission split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionSplit {
    pub total: Decimal,
    pub branch: Option<Decimal>,
    pub agency: Option<Decimal>,
}

/// Compute the split for price `price`.
///
/// A branch rate without an agency rate is rejected: a branch always
/// belongs to an agency.
pub fn split_commission(
    price: Decimal,
    branch_rate: Option<Rate>,
    agency_rate: Option<Rate>,
) -> Result<CommissionSplit, SettlementError> {
    if price <= Decimal::ZERO {
        return Err(SettlementError::Validation(format!(
            "price must be positive, got {price}"
        )));
    }
    ensure_storable("price", price)?;

    match (branch_rate, agency_rate) {
        (Some(rb), Some(ra)) => {
            if rb > ra {
                return Err(SettlementError::RateCapViolation {
                    branch_rate: rb,
                    agency_rate: ra,
                });
            }
            let branch = round_money(rb.of(price)?);
            let agency = round_money(percent_of(price, ra.percent() - rb.percent())?);
            Ok(CommissionSplit {
                total: branch + agency,
                branch: Some(branch),
                agency: Some(agency),
            })
        }
        (Some(_), None) => Err(SettlementError::Validation(
            "branch commission requires an agency rate".into(),
        )),
        (None, Some(ra)) => agency_only(price, ra),
        (None, None) => agency_only(price, Rate::SYSTEM_DEFAULT),
    }
}

fn agency_only(price: Decimal, rate: Rate) -> Result<CommissionSplit, SettlementError> {
    let agency = round_money(rate.of(price)?);
    Ok(CommissionSplit {
        total: agency,
        branch: None,
        agency: Some(agency),
    })
}
