//! # Repository Ports
//!
//! [`SettlementStore`] opens units of work; [`UnitOfWork`] exposes
//! find/insert/update per entity. Reads performed through a unit of work
//! lock the row until commit or rollback on engines with row locks, so a
//! read-check-write sequence inside one unit of work is race-free.

use agency_core::{
    Agency, AgencyId, Branch, BranchId, Customer, CustomerId, Package, PackageId, Payment, Plate,
    Rate, Sale, SaleId, Vehicle, VehicleId,
};
use async_trait::async_trait;

use crate::error::StoreError;

/// Shared handle to a storage engine.
pub type StoreHandle = std::sync::Arc<dyn SettlementStore>;

/// A storage engine capable of opening transactional units of work.
#[async_trait]
pub trait SettlementStore: Send + Sync + std::fmt::Debug {
    /// Open a new unit of work.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;

    /// Engine name for logs and readiness output.
    fn engine(&self) -> &'static str;
}

/// A transaction context. All-or-nothing: effects become visible only on
/// [`commit`](UnitOfWork::commit).
#[async_trait]
pub trait UnitOfWork: Send {
    // -- customers ---------------------------------------------------------
    async fn customer(&mut self, id: CustomerId) -> Result<Option<Customer>, StoreError>;
    async fn insert_customer(&mut self, customer: &Customer) -> Result<(), StoreError>;
    async fn update_customer(&mut self, customer: &Customer) -> Result<(), StoreError>;

    // -- vehicles ----------------------------------------------------------
    async fn vehicle(&mut self, id: VehicleId) -> Result<Option<Vehicle>, StoreError>;
    async fn vehicle_by_plate(&mut self, plate: &Plate) -> Result<Option<Vehicle>, StoreError>;
    async fn insert_vehicle(&mut self, vehicle: &Vehicle) -> Result<(), StoreError>;
    async fn update_vehicle(&mut self, vehicle: &Vehicle) -> Result<(), StoreError>;

    // -- packages ----------------------------------------------------------
    async fn package(&mut self, id: PackageId) -> Result<Option<Package>, StoreError>;
    async fn insert_package(&mut self, package: &Package) -> Result<(), StoreError>;

    // -- agencies ----------------------------------------------------------
    async fn agency(&mut self, id: AgencyId) -> Result<Option<Agency>, StoreError>;
    async fn insert_agency(&mut self, agency: &Agency) -> Result<(), StoreError>;
    async fn update_agency(&mut self, agency: &Agency) -> Result<(), StoreError>;

    // -- branches ----------------------------------------------------------
    async fn branch(&mut self, id: BranchId) -> Result<Option<Branch>, StoreError>;
    async fn insert_branch(&mut self, branch: &Branch) -> Result<(), StoreError>;
    async fn update_branch(&mut self, branch: &Branch) -> Result<(), StoreError>;
    /// Highest commission rate among the agency's branches, if it has any.
    async fn max_branch_rate(&mut self, agency_id: AgencyId) -> Result<Option<Rate>, StoreError>;

    // -- sales -------------------------------------------------------------
    async fn sale(&mut self, id: SaleId) -> Result<Option<Sale>, StoreError>;
    async fn insert_sale(&mut self, sale: &Sale) -> Result<(), StoreError>;
    async fn update_sale(&mut self, sale: &Sale) -> Result<(), StoreError>;

    // -- payments ----------------------------------------------------------
    /// The sale's first payment row.
    async fn payment_for_sale(&mut self, sale_id: SaleId) -> Result<Option<Payment>, StoreError>;
    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), StoreError>;
    async fn update_payment(&mut self, payment: &Payment) -> Result<(), StoreError>;

    // -- completion --------------------------------------------------------
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
