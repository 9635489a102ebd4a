//! # Money and Commission Rates
//!
//! Amounts are `Decimal` and persisted at exactly two decimal places.
//! The payment gateway speaks in minor units (kuruş/cents) carried as
//! decimal strings, so conversion in both directions lives here.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::SettlementError;

/// Number of decimal places every persisted amount carries.
pub const MONEY_SCALE: u32 = 2;

const MINOR_PER_MAJOR: Decimal = dec!(100);

/// Largest amount a persisted `NUMERIC(14, 2)` column holds.
pub const MAX_AMOUNT: Decimal = dec!(999_999_999_999.99);

/// Reject an amount the money columns cannot store.
pub fn ensure_storable(field: &str, amount: Decimal) -> Result<Decimal, SettlementError> {
    if amount > MAX_AMOUNT {
        return Err(SettlementError::Validation(format!(
            "{field} {amount} exceeds the maximum of {MAX_AMOUNT}"
        )));
    }
    Ok(amount)
}

/// Round an amount to the persisted two-decimal scale (half away from zero).
pub fn round_money(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(MONEY_SCALE);
    rounded
}

/// Convert a major-unit amount into integer minor units (`12.34` → `1234`).
pub fn to_minor_units(amount: Decimal) -> Result<i64, SettlementError> {
    round_money(amount)
        .checked_mul(MINOR_PER_MAJOR)
        .and_then(|minor| minor.to_i64())
        .ok_or_else(|| SettlementError::Validation(format!("amount {amount} out of range")))
}

/// Parse a minor-unit decimal string into a major-unit amount (`"1234"` → `12.34`).
pub fn from_minor_units(raw: &str) -> Result<Decimal, SettlementError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err(SettlementError::Validation(format!(
            "minor-unit amount must be a non-negative integer, got {raw:?}"
        )));
    }
    let minor: Decimal = trimmed
        .parse()
        .map_err(|_| SettlementError::Validation(format!("minor-unit amount out of range: {raw}")))?;
    Ok(round_money(minor / MINOR_PER_MAJOR))
}

/// `amount * percent / 100`, rejecting products `Decimal` cannot hold.
pub fn percent_of(amount: Decimal, percent: Decimal) -> Result<Decimal, SettlementError> {
    amount
        .checked_mul(percent)
        .map(|product| product / dec!(100))
        .ok_or_else(|| SettlementError::Validation(format!("amount {amount} out of range")))
}

/// Commission rate in percent, validated to `0 ..= 100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Rate(Decimal);

impl Rate {
    /// Zero percent.
    pub const ZERO: Rate = Rate(Decimal::ZERO);

    /// Rate applied to sales with neither agency nor branch.
    pub const SYSTEM_DEFAULT: Rate = Rate(dec!(20));

    /// Construct a rate, rejecting values outside `0 ..= 100`.
    pub fn new(percent: Decimal) -> Result<Self, SettlementError> {
        if percent < Decimal::ZERO || percent > dec!(100) {
            return Err(SettlementError::Validation(format!(
                "commission rate must be between 0 and 100, got {percent}"
            )));
        }
        Ok(Self(percent))
    }

    /// The rate as a percentage.
    pub fn percent(&self) -> Decimal {
        self.0
    }

    /// Apply this rate to an amount without rounding.
    pub fn of(&self, amount: Decimal) -> Result<Decimal, SettlementError> {
        percent_of(amount, self.0)
    }
}

impl TryFrom<Decimal> for Rate {
    type Error = SettlementError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Rate> for Decimal {
    fn from(rate: Rate) -> Self {
        rate.0
    }
}

impl std::fmt::Display for Rate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0.normalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_money_half_away_from_zero() {
        assert_eq!(round_money(dec!(1.005)), dec!(1.01));
        assert_eq!(round_money(dec!(1.004)), dec!(1.00));
        assert_eq!(round_money(dec!(150)).to_string(), "150.00");
    }

    #[test]
    fn minor_unit_conversion() {
        assert_eq!(to_minor_units(dec!(12.34)).unwrap(), 1234);
        assert_eq!(to_minor_units(dec!(1000)).unwrap(), 100_000);
        assert_eq!(from_minor_units("1234").unwrap(), dec!(12.34));
        assert_eq!(from_minor_units("100000").unwrap().to_string(), "1000.00");
    }

    #[test]
    fn minor_units_reject_garbage() {
        assert!(from_minor_units("").is_err());
        assert!(from_minor_units("12.5").is_err());
        assert!(from_minor_units("-100").is_err());
        assert!(from_minor_units("abc").is_err());
    }

    #[test]
    fn oversized_amounts_are_errors() {
        let rate = Rate::new(dec!(25)).unwrap();
        assert!(rate.of(Decimal::MAX).is_err());
        assert!(to_minor_units(Decimal::MAX).is_err());
        assert!(ensure_storable("price", MAX_AMOUNT).is_ok());
        assert!(ensure_storable("price", MAX_AMOUNT + dec!(0.01)).is_err());
    }

    #[test]
    fn rate_bounds() {
        assert!(Rate::new(dec!(0)).is_ok());
        assert!(Rate::new(dec!(100)).is_ok());
        assert!(Rate::new(dec!(-0.01)).is_err());
        assert!(Rate::new(dec!(100.01)).is_err());
    }

    #[test]
    fn rate_applies_percentage() {
        let rate = Rate::new(dec!(15)).unwrap();
        assert_eq!(rate.of(dec!(1000)).unwrap(), dec!(150));
        assert_eq!(rate.to_string(), "15%");
    }

    #[test]
    fn rate_deserialization_validates() {
        let ok: Rate = serde_json::from_str("25").unwrap();
        assert_eq!(ok.percent(), dec!(25));
        assert!(serde_json::from_str::<Rate>("101").is_err());
    }
}
