//! # In-Memory Engine
//!
//! Tables live behind one `tokio::sync::Mutex`. Opening a unit of work
//! takes the lock for its whole lifetime and works on a private copy of
//! the tables; commit swaps the copy in, drop or rollback throws it away.
//! Units of work are therefore fully serialized, which is stronger than
//! the read-committed + row-lock behavior of the PostgreSQL engine.
//!
//! The owned guard is `Send`, so a unit of work may be held across
//! `.await` points inside Axum handlers.

use std::collections::HashMap;
use std::sync::Arc;

use agency_core::{
    Agency, AgencyId, Branch, BranchId, Customer, CustomerId, Package, PackageId, Payment,
    PaymentId, Plate, Rate, Sale, SaleId, Vehicle, VehicleId,
};
use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::StoreError;
use crate::ports::{SettlementStore, UnitOfWork};

/// Committed state of the in-memory engine.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub customers: HashMap<CustomerId, Customer>,
    pub vehicles: HashMap<VehicleId, Vehicle>,
    pub packages: HashMap<PackageId, Package>,
    pub agencies: HashMap<AgencyId, Agency>,
    pub branches: HashMap<BranchId, Branch>,
    pub sales: HashMap<SaleId, Sale>,
    pub payments: HashMap<PaymentId, Payment>,
}

/// Thread-safe, cloneable in-memory engine. Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the committed tables. Waits for any open unit of work.
    pub async fn snapshot(&self) -> Tables {
        self.tables.lock().await.clone()
    }
}

#[async_trait]
impl SettlementStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryUnitOfWork { guard, working }))
    }

    fn engine(&self) -> &'static str {
        "memory"
    }
}

/// Unit of work over a private copy of the tables.
pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

fn insert_unique<K, V>(
    map: &mut HashMap<K, V>,
    key: K,
    value: V,
    kind: &'static str,
) -> Result<(), StoreError>
where
    K: std::hash::Hash + Eq + std::fmt::Display,
{
    if map.contains_key(&key) {
        return Err(StoreError::Duplicate {
            kind,
            key: key.to_string(),
        });
    }
    map.insert(key, value);
    Ok(())
}

fn replace_existing<K, V>(
    map: &mut HashMap<K, V>,
    key: K,
    value: V,
    kind: &'static str,
) -> Result<(), StoreError>
where
    K: std::hash::Hash + Eq + std::fmt::Display,
{
    match map.get_mut(&key) {
        Some(slot) => {
            *slot = value;
            Ok(())
        }
        None => Err(StoreError::missing(kind, key)),
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn customer(&mut self, id: CustomerId) -> Result<Option<Customer>, StoreError> {
        Ok(self.working.customers.get(&id).cloned())
    }

    async fn insert_customer(&mut self, customer: &Customer) -> Result<(), StoreError> {
        insert_unique(&mut self.working.customers, customer.id, customer.clone(), "customer")
    }

    async fn update_customer(&mut self, customer: &Customer) -> Result<(), StoreError> {
        replace_existing(&mut self.working.customers, customer.id, customer.clone(), "customer")
    }

    async fn vehicle(&mut self, id: VehicleId) -> Result<Option<Vehicle>, StoreError> {
        Ok(self.working.vehicles.get(&id).cloned())
    }

    async fn vehicle_by_plate(&mut self, plate: &Plate) -> Result<Option<Vehicle>, StoreError> {
        Ok(self
            .working
            .vehicles
            .values()
            .find(|v| &v.plate == plate)
            .cloned())
    }

    async fn insert_vehicle(&mut self, vehicle: &Vehicle) -> Result<(), StoreError> {
        if self.working.vehicles.values().any(|v| v.plate == vehicle.plate) {
            return Err(StoreError::Duplicate {
                kind: "vehicle plate",
                key: vehicle.plate.to_string(),
            });
        }
        insert_unique(&mut self.working.vehicles, vehicle.id, vehicle.clone(), "vehicle")
    }

    async fn update_vehicle(&mut self, vehicle: &Vehicle) -> Result<(), StoreError> {
        replace_existing(&mut self.working.vehicles, vehicle.id, vehicle.clone(), "vehicle")
    }

    async fn package(&mut self, id: PackageId) -> Result<Option<Package>, StoreError> {
        Ok(self.working.packages.get(&id).cloned())
    }

    async fn insert_package(&mut self, package: &Package) -> Result<(), StoreError> {
        insert_unique(&mut self.working.packages, package.id, package.clone(), "package")
    }

    async fn agency(&mut self, id: AgencyId) -> Result<Option<Agency>, StoreError> {
        Ok(self.working.agencies.get(&id).cloned())
    }

    async fn insert_agency(&mut self, agency: &Agency) -> Result<(), StoreError> {
        insert_unique(&mut self.working.agencies, agency.id, agency.clone(), "agency")
    }

    async fn update_agency(&mut self, agency: &Agency) -> Result<(), StoreError> {
        replace_existing(&mut self.working.agencies, agency.id, agency.clone(), "agency")
    }

    async fn branch(&mut self, id: BranchId) -> Result<Option<Branch>, StoreError> {
        Ok(self.working.branches.get(&id).cloned())
    }

    async fn insert_branch(&mut self, branch: &Branch) -> Result<(), StoreError> {
        insert_unique(&mut self.working.branches, branch.id, branch.clone(), "branch")
    }

    async fn update_branch(&mut self, branch: &Branch) -> Result<(), StoreError> {
        replace_existing(&mut self.working.branches, branch.id, branch.clone(), "branch")
    }

    async fn max_branch_rate(&mut self, agency_id: AgencyId) -> Result<Option<Rate>, StoreError> {
        Ok(self
            .working
            .branches
            .values()
            .filter(|b| b.agency_id == agency_id)
            .map(|b| b.commission_rate)
            .max())
    }

    async fn sale(&mut self, id: SaleId) -> Result<Option<Sale>, StoreError> {
        Ok(self.working.sales.get(&id).cloned())
    }

    async fn insert_sale(&mut self, sale: &Sale) -> Result<(), StoreError> {
        insert_unique(&mut self.working.sales, sale.id, sale.clone(), "sale")
    }

    async fn update_sale(&mut self, sale: &Sale) -> Result<(), StoreError> {
        replace_existing(&mut self.working.sales, sale.id, sale.clone(), "sale")
    }

    async fn payment_for_sale(&mut self, sale_id: SaleId) -> Result<Option<Payment>, StoreError> {
        Ok(self
            .working
            .payments
            .values()
            .filter(|p| p.sale_id == sale_id)
            .min_by_key(|p| p.created_at)
            .cloned())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), StoreError> {
        insert_unique(&mut self.working.payments, payment.id, payment.clone(), "payment")
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<(), StoreError> {
        replace_existing(&mut self.working.payments, payment.id, payment.clone(), "payment")
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryUnitOfWork { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
