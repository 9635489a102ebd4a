//! # Tenancy Administration
//!
//! Agencies, branches and packages, plus agency balance deposits.
//!
//! The rate cap `branch.commission_rate <= agency.commission_rate` is
//! enforced on every write of either side:
//!
//! - creating or re-rating a branch checks against the agency's rate;
//! - re-rating an agency checks against the highest rate among its
//!   branches (read with row locks on engines that have them).

use agency_core::{
    ensure_storable, round_money, Agency, AgencyId, Branch, BranchId, Package, PackageId, Rate, SettlementError,
};
use agency_store::{StoreHandle, UnitOfWork};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::{finish, ServiceError};
use crate::ledger::{self, LedgerAccount};

/// Input for [`TenancyService::create_agency`].
#[derive(Debug, Clone)]
pub struct NewAgency {
    pub name: String,
    pub commission_rate: Rate,
    pub opening_balance: Decimal,
}

/// Input for [`TenancyService::create_branch`].
#[derive(Debug, Clone)]
pub struct NewBranch {
    pub agency_id: AgencyId,
    pub name: String,
    pub commission_rate: Rate,
}

fn require_name(name: &str, kind: &str) -> Result<String, SettlementError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(SettlementError::Validation(format!("{kind} name must not be empty")));
    }
    Ok(trimmed.to_string())
}

/// Tenant and catalogue administration.
#[derive(Debug, Clone)]
pub struct TenancyService {
    store: StoreHandle,
}

impl TenancyService {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    pub async fn create_agency(&self, input: NewAgency, now: DateTime<Utc>) -> Result<Agency, ServiceError> {
        let name = require_name(&input.name, "agency")?;
        if input.opening_balance < Decimal::ZERO {
            return Err(SettlementError::Validation("opening balance must not be negative".into()).into());
        }
        ensure_storable("opening balance", input.opening_balance)?;
        let agency = Agency {
            id: AgencyId::new(),
            name,
            commission_rate: input.commission_rate,
            balance: round_money(input.opening_balance),
            created_at: now,
            updated_at: now,
        };

        let mut uow = self.store.begin().await?;
        let result = uow.insert_agency(&agency).await.map_err(ServiceError::from);
        finish(uow, result).await?;

        tracing::info!(agency_id = %agency.id, rate = %agency.commission_rate, "agency created");
        Ok(agency)
    }

    pub async fn update_agency_rate(
        &self,
        id: AgencyId,
        rate: Rate,
        now: DateTime<Utc>,
    ) -> Result<Agency, ServiceError> {
        let mut uow = self.store.begin().await?;
        let result = rerate_agency(uow.as_mut(), id, rate, now).await;
        let agency = finish(uow, result).await?;
        tracing::info!(agency_id = %id, rate = %rate, "agency rate updated");
        Ok(agency)
    }

    pub async fn create_branch(&self, input: NewBranch, now: DateTime<Utc>) -> Result<Branch, ServiceError> {
        let name = require_name(&input.name, "branch")?;
        let mut uow = self.store.begin().await?;
        let result = insert_branch(uow.as_mut(), input, name, now).await;
        let branch = finish(uow, result).await?;
        tracing::info!(branch_id = %branch.id, agency_id = %branch.agency_id, rate = %branch.commission_rate, "branch created");
        Ok(branch)
    }

    pub async fn update_branch_rate(
        &self,
        id: BranchId,
        rate: Rate,
        now: DateTime<Utc>,
    ) -> Result<Branch, ServiceError> {
        let mut uow = self.store.begin().await?;
        let result = rerate_branch(uow.as_mut(), id, rate, now).await;
        let branch = finish(uow, result).await?;
        tracing::info!(branch_id = %id, rate = %rate, "branch rate updated");
        Ok(branch)
    }

    pub async fn create_package(
        &self,
        name: &str,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Package, ServiceError> {
        let name = require_name(name, "package")?;
        if price <= Decimal::ZERO {
            return Err(SettlementError::Validation(format!("package price must be positive, got {price}")).into());
        }
        ensure_storable("package price", price)?;
        let package = Package {
            id: PackageId::new(),
            name,
            price: round_money(price),
            created_at: now,
        };
        let mut uow = self.store.begin().await?;
        let result = uow.insert_package(&package).await.map_err(ServiceError::from);
        finish(uow, result).await?;
        Ok(package)
    }

    /// Operator top-up of an agency balance.
    pub async fn deposit(
        &self,
        id: AgencyId,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Agency, ServiceError> {
        if amount <= Decimal::ZERO {
            return Err(SettlementError::Validation(format!("deposit must be positive, got {amount}")).into());
        }
        ensure_storable("deposit", amount)?;
        let mut uow = self.store.begin().await?;
        let result = deposit_into(uow.as_mut(), id, amount, now).await;
        let agency = finish(uow, result).await?;
        tracing::info!(agency_id = %id, amount = %amount, balance = %agency.balance, "agency deposit");
        Ok(agency)
    }

    pub async fn agency(&self, id: AgencyId) -> Result<Agency, ServiceError> {
        let mut uow = self.store.begin().await?;
        let result = uow
            .agency(id)
            .await
            .map_err(ServiceError::from)
            .and_then(|found| found.ok_or_else(|| SettlementError::not_found("agency", id).into()));
        finish(uow, result).await
    }

    pub async fn branch(&self, id: BranchId) -> Result<Branch, ServiceError> {
        let mut uow = self.store.begin().await?;
        let result = uow
            .branch(id)
            .await
            .map_err(ServiceError::from)
            .and_then(|found| found.ok_or_else(|| SettlementError::not_found("branch", id).into()));
        finish(uow, result).await
    }
}

async fn rerate_agency(
    uow: &mut dyn UnitOfWork,
    id: AgencyId,
    rate: Rate,
    now: DateTime<Utc>,
) -> Result<Agency, ServiceError> {
    let mut agency = uow
        .agency(id)
        .await?
        .ok_or_else(|| SettlementError::not_found("agency", id))?;
    if let Some(highest) = uow.max_branch_rate(id).await? {
        if highest > rate {
            return Err(SettlementError::RateCapViolation {
                branch_rate: highest,
                agency_rate: rate,
            }
            .into());
        }
    }
    agency.commission_rate = rate;
    agency.updated_at = now;
    uow.update_agency(&agency).await?;
    Ok(agency)
}

async fn insert_branch(
    uow: &mut dyn UnitOfWork,
    input: NewBranch,
    name: String,
    now: DateTime<Utc>,
) -> Result<Branch, ServiceError> {
    let agency = uow
        .agency(input.agency_id)
        .await?
        .ok_or_else(|| SettlementError::not_found("agency", input.agency_id))?;
    if input.commission_rate > agency.commission_rate {
        return Err(SettlementError::RateCapViolation {
            branch_rate: input.commission_rate,
            agency_rate: agency.commission_rate,
        }
        .into());
    }
    let branch = Branch {
        id: BranchId::new(),
        agency_id: agency.id,
        name,
        commission_rate: input.commission_rate,
        balance: Decimal::ZERO,
        created_at: now,
        updated_at: now,
    };
    uow.insert_branch(&branch).await?;
    Ok(branch)
}

async fn rerate_branch(
    uow: &mut dyn UnitOfWork,
    id: BranchId,
    rate: Rate,
    now: DateTime<Utc>,
) -> Result<Branch, ServiceError> {
    let mut branch = uow
        .branch(id)
        .await?
        .ok_or_else(|| SettlementError::not_found("branch", id))?;
    let agency = uow
        .agency(branch.agency_id)
        .await?
        .ok_or_else(|| SettlementError::not_found("agency", branch.agency_id))?;
    if rate > agency.commission_rate {
        return Err(SettlementError::RateCapViolation {
            branch_rate: rate,
            agency_rate: agency.commission_rate,
        }
        .into());
    }
    branch.commission_rate = rate;
    branch.updated_at = now;
    uow.update_branch(&branch).await?;
    Ok(branch)
}

async fn deposit_into(
    uow: &mut dyn UnitOfWork,
    id: AgencyId,
    amount: Decimal,
    now: DateTime<Utc>,
) -> Result<Agency, ServiceError> {
    ledger::credit(uow, LedgerAccount::Agency(id), amount, now).await?;
    uow.agency(id)
        .await?
        .ok_or_else(|| SettlementError::not_found("agency", id).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agency_store::MemoryStore;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn service() -> TenancyService {
        TenancyService::new(Arc::new(MemoryStore::new()))
    }

    fn rate(p: Decimal) -> Rate {
        Rate::new(p).unwrap()
    }

    #[tokio::test]
    async fn blank_names_rejected() {
        let err = service()
            .create_agency(
                NewAgency {
                    name: "  ".into(),
                    commission_rate: rate(dec!(10)),
                    opening_balance: dec!(0),
                },
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err.as_rejection(), Some(SettlementError::Validation(_))));
    }

    #[tokio::test]
    async fn package_price_must_be_positive() {
        let err = service().create_package("Trafik", dec!(0), Utc::now()).await.unwrap_err();
        assert!(matches!(err.as_rejection(), Some(SettlementError::Validation(_))));
    }

    #[tokio::test]
    async fn deposit_credits_balance() {
        let svc = service();
        let agency = svc
            .create_agency(
                NewAgency {
                    name: "Maltepe".into(),
                    commission_rate: rate(dec!(10)),
                    opening_balance: dec!(25),
                },
                Utc::now(),
            )
            .await
            .unwrap();
        let updated = svc.deposit(agency.id, dec!(75.50), Utc::now()).await.unwrap();
        assert_eq!(updated.balance, dec!(100.50));
        assert!(svc.deposit(agency.id, dec!(-1), Utc::now()).await.is_err());
    }
}
