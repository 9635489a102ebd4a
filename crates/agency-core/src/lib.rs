//! # agency-core -- Foundational Types for the Agency Sales Backend
//!
//! The leaf of the workspace dependency graph. Defines the type-system
//! primitives every other crate builds on:
//!
//! 1. **Identifier newtypes.** `AgencyId`, `BranchId`, `SaleId`, `PaymentId`,
//!    `CustomerId`, `VehicleId`, `PackageId`. You cannot pass a `BranchId`
//!    where an `AgencyId` is expected.
//!
//! 2. **Money and rates.** Amounts are `rust_decimal::Decimal` persisted at
//!    two decimal places. Commission rates are the validated [`Rate`] newtype
//!    (0–100 inclusive).
//!
//! 3. **Domain records.** Agency, Branch, Customer, Vehicle, Package, Sale and
//!    Payment as plain data. Optional foreign keys are `Option<_>`, never
//!    sentinel values.
//!
//! 4. **Payment state machine.** `PENDING → {COMPLETED, FAILED}`,
//!    `COMPLETED → REFUNDED`. Every other transition is rejected.
//!
//! 5. **One business error kind.** [`SettlementError`] carries a status code
//!    and message and aborts whatever unit of work is open.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `agency-*` crates.
//! - No I/O.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod error;
pub mod identity;
pub mod money;
pub mod payment;
pub mod plate;
pub mod policy;
pub mod records;

pub use error::SettlementError;
pub use identity::{AgencyId, BranchId, CustomerId, PackageId, PaymentId, SaleId, VehicleId};
pub use money::{
    ensure_storable, from_minor_units, percent_of, round_money, to_minor_units, Rate, MAX_AMOUNT,
};
pub use payment::{Payment, PaymentMethod, PaymentStatus};
pub use plate::Plate;
pub use policy::generate_policy_number;
pub use records::{Agency, Branch, Customer, Package, Sale, Vehicle};
