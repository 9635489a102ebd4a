//! # Sale Coordinator
//!
//! Completes a sale as one unit of work:
//!
//! 1. resolve the selling branch/agency and their current rates;
//! 2. upsert the customer (by supplied id);
//! 3. upsert the vehicle (by normalized plate);
//! 4. split the commission and create the sale with a fresh policy number;
//! 5. BALANCE only: debit the agency for the full price, checked against
//!    the balance as it stood before this sale;
//! 6. credit the branch and agency shares;
//! 7. create the payment: BALANCE completes immediately, GATEWAY stays
//!    PENDING for the callback.
//!
//! Any failure rolls everything back. The notifier runs only after commit.

use std::sync::Arc;

use agency_core::{
    ensure_storable, generate_policy_number, round_money, Agency, AgencyId, Branch, BranchId,
    Customer, CustomerId, PackageId, Payment, PaymentMethod, PaymentStatus, Plate, Sale, SaleId,
    SettlementError, Vehicle, VehicleId,
};
use agency_gateway::order_id;
use agency_store::{StoreHandle, UnitOfWork};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::commission::split_commission;
use crate::error::{finish, ServiceError};
use crate::ledger::{self, LedgerAccount};
use crate::notify::SaleNotifier;

/// Customer part of a sale request. With `id` set, an existing customer is
/// matched and any supplied field overwrites the stored one; otherwise a
/// new customer is created and `full_name` is required.
#[derive(Debug, Clone, Default)]
pub struct CustomerInput {
    pub id: Option<CustomerId>,
    pub full_name: Option<String>,
    pub national_id: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Vehicle part of a sale request, keyed by plate.
#[derive(Debug, Clone, Default)]
pub struct VehicleInput {
    pub plate: String,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub model_year: Option<i32>,
    pub chassis_number: Option<String>,
}

/// Sale terms. `price` defaults to the package list price.
#[derive(Debug, Clone)]
pub struct SaleInput {
    pub package_id: PackageId,
    pub price: Option<Decimal>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct CompleteSaleRequest {
    pub customer: CustomerInput,
    pub vehicle: VehicleInput,
    pub sale: SaleInput,
    pub payment_method: PaymentMethod,
    pub agency_id: Option<AgencyId>,
    pub branch_id: Option<BranchId>,
}

/// A sale with everything created or touched alongside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedSale {
    pub sale: Sale,
    pub payment: Option<Payment>,
    pub customer: Customer,
    pub vehicle: Vehicle,
}

impl CompleteSaleRequest {
    fn validate(&self) -> Result<(), SettlementError> {
        if self.sale.start_date >= self.sale.end_date {
            return Err(SettlementError::Validation(format!(
                "start_date {} must be before end_date {}",
                self.sale.start_date, self.sale.end_date
            )));
        }
        if let Some(price) = self.sale.price {
            if price <= Decimal::ZERO {
                return Err(SettlementError::Validation(format!("price must be positive, got {price}")));
            }
            ensure_storable("price", price)?;
        }
        if self.payment_method == PaymentMethod::Balance
            && self.agency_id.is_none()
            && self.branch_id.is_none()
        {
            return Err(SettlementError::Validation(
                "balance payment requires an agency".into(),
            ));
        }
        Ok(())
    }
}

/// Orchestrates sale completion.
#[derive(Debug, Clone)]
pub struct SaleCoordinator {
    store: StoreHandle,
    notifier: Arc<dyn SaleNotifier>,
}

impl SaleCoordinator {
    pub fn new(store: StoreHandle, notifier: Arc<dyn SaleNotifier>) -> Self {
        Self { store, notifier }
    }

    /// Create the sale and all of its side effects atomically.
    pub async fn complete_sale(
        &self,
        req: CompleteSaleRequest,
        now: DateTime<Utc>,
    ) -> Result<CompletedSale, ServiceError> {
        req.validate()?;

        let mut uow = self.store.begin().await?;
        let result = complete_in(uow.as_mut(), &req, now).await;
        let completed = finish(uow, result).await?;

        tracing::info!(
            sale_id = %completed.sale.id,
            policy_number = %completed.sale.policy_number,
            price = %completed.sale.price,
            commission = %completed.sale.commission,
            method = %req.payment_method,
            "sale completed"
        );

        let notifier = Arc::clone(&self.notifier);
        let snapshot = completed.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.sale_completed(&snapshot).await {
                tracing::warn!(sale_id = %snapshot.sale.id, error = %e, "sale notification failed");
            }
        });

        Ok(completed)
    }

    /// Load a sale with its payment, customer and vehicle.
    pub async fn sale(&self, id: SaleId) -> Result<CompletedSale, ServiceError> {
        let mut uow = self.store.begin().await?;
        let result = load_in(uow.as_mut(), id).await;
        finish(uow, result).await
    }
}

async fn load_in(uow: &mut dyn UnitOfWork, id: SaleId) -> Result<CompletedSale, ServiceError> {
    let sale = uow
        .sale(id)
        .await?
        .ok_or_else(|| SettlementError::not_found("sale", id))?;
    let payment = uow.payment_for_sale(id).await?;
    let customer = uow
        .customer(sale.customer_id)
        .await?
        .ok_or_else(|| SettlementError::not_found("customer", sale.customer_id))?;
    let vehicle = uow
        .vehicle(sale.vehicle_id)
        .await?
        .ok_or_else(|| SettlementError::not_found("vehicle", sale.vehicle_id))?;
    Ok(CompletedSale {
        sale,
        payment,
        customer,
        vehicle,
    })
}

/// Selling unit resolved from the request.
struct Seller {
    agency: Option<Agency>,
    branch: Option<Branch>,
}

async fn resolve_seller(
    uow: &mut dyn UnitOfWork,
    agency_id: Option<AgencyId>,
    branch_id: Option<BranchId>,
) -> Result<Seller, ServiceError> {
    let branch = match branch_id {
        Some(id) => Some(
            uow.branch(id)
                .await?
                .ok_or_else(|| SettlementError::not_found("branch", id))?,
        ),
        None => None,
    };

    let agency_id = match (&branch, agency_id) {
        (Some(b), Some(explicit)) if b.agency_id != explicit => {
            return Err(SettlementError::Validation(format!(
                "branch {} belongs to {}, not {}",
                b.id, b.agency_id, explicit
            ))
            .into());
        }
        (Some(b), _) => Some(b.agency_id),
        (None, explicit) => explicit,
    };

    let agency = match agency_id {
        Some(id) => Some(
            uow.agency(id)
                .await?
                .ok_or_else(|| SettlementError::not_found("agency", id))?,
        ),
        None => None,
    };

    Ok(Seller { agency, branch })
}

fn overwrite(slot: &mut Option<String>, value: &Option<String>) {
    if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        *slot = Some(v.to_string());
    }
}

fn cleaned(value: &Option<String>) -> Option<String> {
    let mut out = None;
    overwrite(&mut out, value);
    out
}

async fn upsert_customer(
    uow: &mut dyn UnitOfWork,
    input: &CustomerInput,
    agency_id: Option<AgencyId>,
    now: DateTime<Utc>,
) -> Result<Customer, ServiceError> {
    if let Some(id) = input.id {
        if let Some(mut existing) = uow.customer(id).await? {
            if let Some(name) = cleaned(&input.full_name) {
                existing.full_name = name;
            }
            overwrite(&mut existing.national_id, &input.national_id);
            overwrite(&mut existing.email, &input.email);
            overwrite(&mut existing.phone, &input.phone);
            overwrite(&mut existing.address, &input.address);
            existing.updated_at = now;
            uow.update_customer(&existing).await?;
            return Ok(existing);
        }
    }

    let full_name = cleaned(&input.full_name).ok_or_else(|| {
        SettlementError::Validation("customer full_name is required for a new customer".into())
    })?;
    let customer = Customer {
        id: input.id.unwrap_or_default(),
        agency_id,
        full_name,
        national_id: cleaned(&input.national_id),
        email: cleaned(&input.email),
        phone: cleaned(&input.phone),
        address: cleaned(&input.address),
        created_at: now,
        updated_at: now,
    };
    uow.insert_customer(&customer).await?;
    tracing::debug!(customer_id = %customer.id, "customer created");
    Ok(customer)
}

async fn upsert_vehicle(
    uow: &mut dyn UnitOfWork,
    input: &VehicleInput,
    customer_id: CustomerId,
    agency_id: Option<AgencyId>,
    now: DateTime<Utc>,
) -> Result<Vehicle, ServiceError> {
    let plate = Plate::parse(&input.plate)?;

    if let Some(mut existing) = uow.vehicle_by_plate(&plate).await? {
        existing.customer_id = customer_id;
        overwrite(&mut existing.brand, &input.brand);
        overwrite(&mut existing.model, &input.model);
        overwrite(&mut existing.chassis_number, &input.chassis_number);
        if input.model_year.is_some() {
            existing.model_year = input.model_year;
        }
        existing.updated_at = now;
        uow.update_vehicle(&existing).await?;
        return Ok(existing);
    }

    let vehicle = Vehicle {
        id: VehicleId::new(),
        plate,
        customer_id,
        agency_id,
        brand: cleaned(&input.brand),
        model: cleaned(&input.model),
        model_year: input.model_year,
        chassis_number: cleaned(&input.chassis_number),
        created_at: now,
        updated_at: now,
    };
    uow.insert_vehicle(&vehicle).await?;
    tracing::debug!(vehicle_id = %vehicle.id, plate = %vehicle.plate, "vehicle created");
    Ok(vehicle)
}

async fn complete_in(
    uow: &mut dyn UnitOfWork,
    req: &CompleteSaleRequest,
    now: DateTime<Utc>,
) -> Result<CompletedSale, ServiceError> {
    let seller = resolve_seller(uow, req.agency_id, req.branch_id).await?;
    let agency_id = seller.agency.as_ref().map(|a| a.id);
    if req.payment_method == PaymentMethod::Balance && agency_id.is_none() {
        return Err(SettlementError::Validation("balance payment requires an agency".into()).into());
    }

    let customer = upsert_customer(uow, &req.customer, agency_id, now).await?;
    let vehicle = upsert_vehicle(uow, &req.vehicle, customer.id, agency_id, now).await?;

    let package = uow
        .package(req.sale.package_id)
        .await?
        .ok_or_else(|| SettlementError::not_found("package", req.sale.package_id))?;
    let price = round_money(req.sale.price.unwrap_or(package.price));

    let split = split_commission(
        price,
        seller.branch.as_ref().map(|b| b.commission_rate),
        seller.agency.as_ref().map(|a| a.commission_rate),
    )?;

    let sale = Sale {
        id: SaleId::new(),
        customer_id: customer.id,
        vehicle_id: vehicle.id,
        agency_id,
        branch_id: seller.branch.as_ref().map(|b| b.id),
        package_id: package.id,
        price,
        commission: split.total,
        branch_commission: split.branch,
        agency_commission: split.agency,
        start_date: req.sale.start_date,
        end_date: req.sale.end_date,
        policy_number: generate_policy_number(now),
        is_refunded: false,
        refunded_at: None,
        refund_amount: None,
        refund_reason: None,
        refunded_by: None,
        created_at: now,
    };
    uow.insert_sale(&sale).await?;

    let payment = match req.payment_method {
        PaymentMethod::Balance => {
            let agency = agency_id
                .ok_or_else(|| SettlementError::Validation("balance payment requires an agency".into()))?;
            // Before the credits: this sale's commission must not fund its own payment.
            ledger::debit(uow, LedgerAccount::Agency(agency), price, now).await?;
            Payment::new(sale.id, agency_id, price, PaymentMethod::Balance, PaymentStatus::Completed, now)
        }
        PaymentMethod::Gateway => {
            let mut p = Payment::new(sale.id, agency_id, price, PaymentMethod::Gateway, PaymentStatus::Pending, now);
            p.transaction_id = Some(order_id::for_sale(sale.id));
            p
        }
    };

    if let (Some(branch), Some(share)) = (&seller.branch, split.branch) {
        if share > Decimal::ZERO {
            ledger::credit(uow, LedgerAccount::Branch(branch.id), share, now).await?;
        }
    }
    if let (Some(agency), Some(share)) = (&seller.agency, split.agency) {
        if share > Decimal::ZERO {
            ledger::credit(uow, LedgerAccount::Agency(agency.id), share, now).await?;
        }
    }

    uow.insert_payment(&payment).await?;

    Ok(CompletedSale {
        sale,
        payment: Some(payment),
        customer,
        vehicle,
    })
}
