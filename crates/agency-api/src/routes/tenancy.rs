//! # Tenancy Administration API
//!
//! Agencies, branches, packages, commission rates and balance deposits.
//! Admin only.

use agency_core::{ensure_storable, Agency, AgencyId, Branch, BranchId, Package, Rate};
use agency_settlement::{NewAgency, NewBranch};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{require_role, CallerIdentity, CallerRole};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, require_text, Validate};
use crate::state::AppState;

const MAX_NAME_LEN: usize = 255;

fn rate(value: Decimal) -> Result<Rate, String> {
    Rate::new(value).map_err(|e| e.to_string())
}

fn storable(field: &str, value: Decimal) -> Result<(), String> {
    ensure_storable(field, value).map(|_| ()).map_err(|e| e.to_string())
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateAgencyRequest {
    pub name: String,
    /// Percent, 0 to 100.
    #[schema(value_type = String, example = "25")]
    pub commission_rate: Decimal,
    #[serde(default)]
    #[schema(value_type = String, example = "0")]
    pub opening_balance: Decimal,
}

impl Validate for CreateAgencyRequest {
    fn validate(&self) -> Result<(), String> {
        require_text("name", &self.name, MAX_NAME_LEN)?;
        rate(self.commission_rate)?;
        if self.opening_balance < Decimal::ZERO {
            return Err("opening_balance must not be negative".into());
        }
        storable("opening_balance", self.opening_balance)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateRateRequest {
    #[schema(value_type = String, example = "15")]
    pub commission_rate: Decimal,
}

impl Validate for UpdateRateRequest {
    fn validate(&self) -> Result<(), String> {
        rate(self.commission_rate).map(|_| ())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DepositRequest {
    #[schema(value_type = String, example = "1000.00")]
    pub amount: Decimal,
    /// Free-text reference logged with the deposit.
    #[serde(default)]
    pub reference: Option<String>,
}

impl Validate for DepositRequest {
    fn validate(&self) -> Result<(), String> {
        if self.amount <= Decimal::ZERO {
            return Err("amount must be positive".into());
        }
        storable("amount", self.amount)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateBranchRequest {
    pub agency_id: Uuid,
    pub name: String,
    #[schema(value_type = String, example = "10")]
    pub commission_rate: Decimal,
}

impl Validate for CreateBranchRequest {
    fn validate(&self) -> Result<(), String> {
        require_text("name", &self.name, MAX_NAME_LEN)?;
        rate(self.commission_rate).map(|_| ())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePackageRequest {
    pub name: String,
    #[schema(value_type = String, example = "1200.00")]
    pub price: Decimal,
}

impl Validate for CreatePackageRequest {
    fn validate(&self) -> Result<(), String> {
        require_text("name", &self.name, MAX_NAME_LEN)?;
        if self.price <= Decimal::ZERO {
            return Err("price must be positive".into());
        }
        storable("price", self.price)
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AgencyResponse {
    pub id: Uuid,
    pub name: String,
    #[schema(value_type = String)]
    pub commission_rate: Decimal,
    #[schema(value_type = String)]
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Agency> for AgencyResponse {
    fn from(a: Agency) -> Self {
        Self {
            id: *a.id.as_uuid(),
            name: a.name,
            commission_rate: a.commission_rate.percent(),
            balance: a.balance,
            created_at: a.created_at,
            updated_at: a.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BranchResponse {
    pub id: Uuid,
    pub agency_id: Uuid,
    pub name: String,
    #[schema(value_type = String)]
    pub commission_rate: Decimal,
    #[schema(value_type = String)]
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Branch> for BranchResponse {
    fn from(b: Branch) -> Self {
        Self {
            id: *b.id.as_uuid(),
            agency_id: *b.agency_id.as_uuid(),
            name: b.name,
            commission_rate: b.commission_rate.percent(),
            balance: b.balance,
            created_at: b.created_at,
            updated_at: b.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PackageResponse {
    pub id: Uuid,
    pub name: String,
    #[schema(value_type = String)]
    pub price: Decimal,
    pub created_at: DateTime<Utc>,
}

impl From<Package> for PackageResponse {
    fn from(p: Package) -> Self {
        Self {
            id: *p.id.as_uuid(),
            name: p.name,
            price: p.price,
            created_at: p.created_at,
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/agencies", post(create_agency))
        .route("/v1/agencies/:id", get(get_agency))
        .route("/v1/agencies/:id/commission-rate", put(update_agency_rate))
        .route("/v1/agencies/:id/deposits", post(deposit))
        .route("/v1/branches", post(create_branch))
        .route("/v1/branches/:id", get(get_branch))
        .route("/v1/branches/:id/commission-rate", put(update_branch_rate))
        .route("/v1/packages", post(create_package))
}

/// POST /v1/agencies: Create an agency.
#[utoipa::path(
    post,
    path = "/v1/agencies",
    request_body = CreateAgencyRequest,
    responses(
        (status = 201, description = "Agency created", body = AgencyResponse),
        (status = 422, description = "Invalid input", body = crate::error::ErrorBody),
    ),
    tag = "tenancy"
)]
async fn create_agency(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CreateAgencyRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AgencyResponse>), AppError> {
    require_role(&caller, CallerRole::Admin)?;
    let req = extract_validated_json(body)?;
    let agency = state
        .tenancy
        .create_agency(
            NewAgency {
                name: req.name,
                commission_rate: Rate::new(req.commission_rate)?,
                opening_balance: req.opening_balance,
            },
            Utc::now(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(agency.into())))
}

/// GET /v1/agencies/:id: Read an agency with its balance.
#[utoipa::path(
    get,
    path = "/v1/agencies/{id}",
    params(("id" = Uuid, Path, description = "Agency ID")),
    responses(
        (status = 200, description = "Agency found", body = AgencyResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "tenancy"
)]
async fn get_agency(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<AgencyResponse>, AppError> {
    require_role(&caller, CallerRole::Admin)?;
    let agency = state.tenancy.agency(AgencyId::from_uuid(id)).await?;
    Ok(Json(agency.into()))
}

/// PUT /v1/agencies/:id/commission-rate: Change an agency rate.
///
/// Rejected while any branch of the agency has a higher rate.
#[utoipa::path(
    put,
    path = "/v1/agencies/{id}/commission-rate",
    params(("id" = Uuid, Path, description = "Agency ID")),
    request_body = UpdateRateRequest,
    responses(
        (status = 200, description = "Rate updated", body = AgencyResponse),
        (status = 422, description = "Rate cap violation", body = crate::error::ErrorBody),
    ),
    tag = "tenancy"
)]
async fn update_agency_rate(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateRateRequest>, JsonRejection>,
) -> Result<Json<AgencyResponse>, AppError> {
    require_role(&caller, CallerRole::Admin)?;
    let req = extract_validated_json(body)?;
    let agency = state
        .tenancy
        .update_agency_rate(AgencyId::from_uuid(id), Rate::new(req.commission_rate)?, Utc::now())
        .await?;
    Ok(Json(agency.into()))
}

/// POST /v1/agencies/:id/deposits: Credit an agency balance.
#[utoipa::path(
    post,
    path = "/v1/agencies/{id}/deposits",
    params(("id" = Uuid, Path, description = "Agency ID")),
    request_body = DepositRequest,
    responses(
        (status = 200, description = "Balance credited", body = AgencyResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "tenancy"
)]
async fn deposit(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<DepositRequest>, JsonRejection>,
) -> Result<Json<AgencyResponse>, AppError> {
    require_role(&caller, CallerRole::Admin)?;
    let req = extract_validated_json(body)?;
    let agency = state
        .tenancy
        .deposit(AgencyId::from_uuid(id), req.amount, Utc::now())
        .await?;
    tracing::info!(
        agency_id = %id,
        actor = %caller.actor,
        reference = req.reference.as_deref().unwrap_or(""),
        "deposit recorded"
    );
    Ok(Json(agency.into()))
}

/// POST /v1/branches: Create a branch under an agency.
#[utoipa::path(
    post,
    path = "/v1/branches",
    request_body = CreateBranchRequest,
    responses(
        (status = 201, description = "Branch created", body = BranchResponse),
        (status = 422, description = "Rate cap violation", body = crate::error::ErrorBody),
    ),
    tag = "tenancy"
)]
async fn create_branch(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CreateBranchRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BranchResponse>), AppError> {
    require_role(&caller, CallerRole::Admin)?;
    let req = extract_validated_json(body)?;
    let branch = state
        .tenancy
        .create_branch(
            NewBranch {
                agency_id: AgencyId::from_uuid(req.agency_id),
                name: req.name,
                commission_rate: Rate::new(req.commission_rate)?,
            },
            Utc::now(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(branch.into())))
}

/// GET /v1/branches/:id: Read a branch with its balance.
#[utoipa::path(
    get,
    path = "/v1/branches/{id}",
    params(("id" = Uuid, Path, description = "Branch ID")),
    responses(
        (status = 200, description = "Branch found", body = BranchResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "tenancy"
)]
async fn get_branch(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<BranchResponse>, AppError> {
    require_role(&caller, CallerRole::Admin)?;
    let branch = state.tenancy.branch(BranchId::from_uuid(id)).await?;
    Ok(Json(branch.into()))
}

/// PUT /v1/branches/:id/commission-rate: Change a branch rate.
#[utoipa::path(
    put,
    path = "/v1/branches/{id}/commission-rate",
    params(("id" = Uuid, Path, description = "Branch ID")),
    request_body = UpdateRateRequest,
    responses(
        (status = 200, description = "Rate updated", body = BranchResponse),
        (status = 422, description = "Rate cap violation", body = crate::error::ErrorBody),
    ),
    tag = "tenancy"
)]
async fn update_branch_rate(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateRateRequest>, JsonRejection>,
) -> Result<Json<BranchResponse>, AppError> {
    require_role(&caller, CallerRole::Admin)?;
    let req = extract_validated_json(body)?;
    let branch = state
        .tenancy
        .update_branch_rate(BranchId::from_uuid(id), Rate::new(req.commission_rate)?, Utc::now())
        .await?;
    Ok(Json(branch.into()))
}

/// POST /v1/packages: Create a sellable package.
#[utoipa::path(
    post,
    path = "/v1/packages",
    request_body = CreatePackageRequest,
    responses(
        (status = 201, description = "Package created", body = PackageResponse),
    ),
    tag = "tenancy"
)]
async fn create_package(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CreatePackageRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PackageResponse>), AppError> {
    require_role(&caller, CallerRole::Admin)?;
    let req = extract_validated_json(body)?;
    let package = state
        .tenancy
        .create_package(&req.name, req.price, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(package.into())))
}
