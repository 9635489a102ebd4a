//! # Domain Records
//!
//! Plain data for the entities the settlement core touches. Storage
//! engines persist these verbatim; business rules live in
//! `agency-settlement`.
//!
//! A `None` agency on a sale or vehicle marks a system (direct) record.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::identity::{AgencyId, BranchId, CustomerId, PackageId, SaleId, VehicleId};
use crate::money::Rate;
use crate::plate::Plate;

/// Top-level tenant. `balance` never goes below zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agency {
    pub id: AgencyId,
    pub name: String,
    pub commission_rate: Rate,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Sub-unit of an agency. `commission_rate <= agency.commission_rate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub id: BranchId,
    pub agency_id: AgencyId,
    pub name: String,
    pub commission_rate: Rate,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub agency_id: Option<AgencyId>,
    pub full_name: String,
    pub national_id: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Vehicle keyed by its normalized plate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    pub plate: Plate,
    pub customer_id: CustomerId,
    pub agency_id: Option<AgencyId>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub model_year: Option<i32>,
    pub chassis_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Sellable product with a list price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub id: PackageId,
    pub name: String,
    pub price: Decimal,
    pub created_at: DateTime<Utc>,
}

/// A sale. Commission fields are frozen at creation; the refund fields are
/// the only post-creation mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    pub id: SaleId,
    pub customer_id: CustomerId,
    pub vehicle_id: VehicleId,
    pub agency_id: Option<AgencyId>,
    pub branch_id: Option<BranchId>,
    pub package_id: PackageId,
    pub price: Decimal,
    pub commission: Decimal,
    pub branch_commission: Option<Decimal>,
    pub agency_commission: Option<Decimal>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub policy_number: String,
    pub is_refunded: bool,
    pub refunded_at: Option<DateTime<Utc>>,
    pub refund_amount: Option<Decimal>,
    pub refund_reason: Option<String>,
    pub refunded_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Sale {
    /// `commission == branch_commission + agency_commission`, absent shares as zero.
    pub fn commission_is_consistent(&self) -> bool {
        let branch = self.branch_commission.unwrap_or(Decimal::ZERO);
        let agency = self.agency_commission.unwrap_or(Decimal::ZERO);
        self.commission == branch + agency
    }
}
