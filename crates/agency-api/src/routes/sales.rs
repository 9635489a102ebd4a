//! # Sales API
//!
//! Sale completion, sale lookup, payment token issuance and refunds.
//! Commission figures are stripped from responses for staff callers.

use agency_core::{
    ensure_storable, AgencyId, BranchId, Customer, CustomerId, PackageId, Payment, PaymentMethod,
    SaleId, Vehicle,
};
use agency_settlement::{
    AppliedRefund, CompleteSaleRequest, CompletedSale, CustomerInput, RefundCommand, RefundQuote,
    SaleInput, VehicleInput,
};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{require_role, CallerIdentity, CallerRole};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, require_text, Validate};
use crate::state::AppState;

/// Used when neither forwarding header names the client.
const FALLBACK_CLIENT_IP: &str = "127.0.0.1";

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CustomerBody {
    /// Existing customer to match. Omit to create one.
    pub id: Option<Uuid>,
    pub full_name: Option<String>,
    pub national_id: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VehicleBody {
    pub plate: String,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub model_year: Option<i32>,
    pub chassis_number: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSaleRequest {
    #[serde(default)]
    pub customer: CustomerBody,
    pub vehicle: VehicleBody,
    pub package_id: Uuid,
    /// Defaults to the package list price.
    #[schema(value_type = Option<String>, example = "1200.00")]
    pub price: Option<Decimal>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// `GATEWAY` or `BALANCE`.
    #[schema(value_type = String, example = "GATEWAY")]
    pub payment_method: PaymentMethod,
    pub agency_id: Option<Uuid>,
    pub branch_id: Option<Uuid>,
}

impl Validate for CreateSaleRequest {
    fn validate(&self) -> Result<(), String> {
        require_text("vehicle.plate", &self.vehicle.plate, 16)?;
        if self.customer.id.is_none() {
            require_text(
                "customer.full_name",
                self.customer.full_name.as_deref().unwrap_or(""),
                255,
            )?;
        }
        if let Some(price) = self.price {
            if price <= Decimal::ZERO {
                return Err("price must be positive".into());
            }
            ensure_storable("price", price).map_err(|e| e.to_string())?;
        }
        if let Some(year) = self.vehicle.model_year {
            if !(1900..=2100).contains(&year) {
                return Err(format!("vehicle.model_year {year} is out of range"));
            }
        }
        Ok(())
    }
}

impl From<CreateSaleRequest> for CompleteSaleRequest {
    fn from(req: CreateSaleRequest) -> Self {
        Self {
            customer: CustomerInput {
                id: req.customer.id.map(CustomerId::from_uuid),
                full_name: req.customer.full_name,
                national_id: req.customer.national_id,
                email: req.customer.email,
                phone: req.customer.phone,
                address: req.customer.address,
            },
            vehicle: VehicleInput {
                plate: req.vehicle.plate,
                brand: req.vehicle.brand,
                model: req.vehicle.model,
                model_year: req.vehicle.model_year,
                chassis_number: req.vehicle.chassis_number,
            },
            sale: SaleInput {
                package_id: PackageId::from_uuid(req.package_id),
                price: req.price,
                start_date: req.start_date,
                end_date: req.end_date,
            },
            payment_method: req.payment_method,
            agency_id: req.agency_id.map(AgencyId::from_uuid),
            branch_id: req.branch_id.map(BranchId::from_uuid),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PaymentResponse {
    pub id: Uuid,
    #[schema(value_type = String)]
    pub amount: Decimal,
    #[schema(value_type = String, example = "GATEWAY")]
    pub method: String,
    #[schema(value_type = String, example = "PENDING")]
    pub status: String,
    pub transaction_id: Option<String>,
    pub failure_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<Payment> for PaymentResponse {
    fn from(p: Payment) -> Self {
        Self {
            id: *p.id.as_uuid(),
            amount: p.amount,
            method: p.method.to_string(),
            status: p.status.to_string(),
            transaction_id: p.transaction_id,
            failure_reason: p.failure_reason,
            updated_at: p.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CustomerSummary {
    pub id: Uuid,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl From<Customer> for CustomerSummary {
    fn from(c: Customer) -> Self {
        Self {
            id: *c.id.as_uuid(),
            full_name: c.full_name,
            email: c.email,
            phone: c.phone,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VehicleSummary {
    pub id: Uuid,
    pub plate: String,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub model_year: Option<i32>,
}

impl From<Vehicle> for VehicleSummary {
    fn from(v: Vehicle) -> Self {
        Self {
            id: *v.id.as_uuid(),
            plate: v.plate.as_str().to_string(),
            brand: v.brand,
            model: v.model,
            model_year: v.model_year,
        }
    }
}

/// A sale as returned to callers. Commission fields are absent for staff.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SaleResponse {
    pub id: Uuid,
    pub policy_number: String,
    pub agency_id: Option<Uuid>,
    pub branch_id: Option<Uuid>,
    pub package_id: Uuid,
    #[schema(value_type = String)]
    pub price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub commission: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub branch_commission: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub agency_commission: Option<Decimal>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub is_refunded: bool,
    pub refunded_at: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>)]
    pub refund_amount: Option<Decimal>,
    pub refund_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub payment: Option<PaymentResponse>,
    pub customer: CustomerSummary,
    pub vehicle: VehicleSummary,
}

impl SaleResponse {
    fn for_caller(done: CompletedSale, caller: &CallerIdentity) -> Self {
        let s = done.sale;
        let (commission, branch_commission, agency_commission) = if caller.sees_commission() {
            (Some(s.commission), s.branch_commission, s.agency_commission)
        } else {
            (None, None, None)
        };
        Self {
            id: *s.id.as_uuid(),
            policy_number: s.policy_number,
            agency_id: s.agency_id.map(|id| *id.as_uuid()),
            branch_id: s.branch_id.map(|id| *id.as_uuid()),
            package_id: *s.package_id.as_uuid(),
            price: s.price,
            commission,
            branch_commission,
            agency_commission,
            start_date: s.start_date,
            end_date: s.end_date,
            is_refunded: s.is_refunded,
            refunded_at: s.refunded_at,
            refund_amount: s.refund_amount,
            refund_reason: s.refund_reason,
            created_at: s.created_at,
            payment: done.payment.map(Into::into),
            customer: done.customer.into(),
            vehicle: done.vehicle.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PaymentTokenResponse {
    pub token: String,
    /// Order id the gateway will echo back in its callback.
    pub merchant_oid: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RefundQuoteResponse {
    pub sale_id: Uuid,
    #[schema(value_type = String)]
    pub gross_price: Decimal,
    #[schema(value_type = String)]
    pub net_price: Decimal,
    pub contract_days: i64,
    #[schema(value_type = String)]
    pub daily_rate: Decimal,
    pub used_days: i64,
    pub remaining_days: i64,
    #[schema(value_type = String)]
    pub refund_amount: Decimal,
}

impl From<RefundQuote> for RefundQuoteResponse {
    fn from(q: RefundQuote) -> Self {
        Self {
            sale_id: *q.sale_id.as_uuid(),
            gross_price: q.gross_price,
            net_price: q.net_price,
            contract_days: q.contract_days,
            daily_rate: q.daily_rate,
            used_days: q.used_days,
            remaining_days: q.remaining_days,
            refund_amount: q.refund_amount,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefundRequest {
    pub reason: String,
}

impl Validate for RefundRequest {
    fn validate(&self) -> Result<(), String> {
        require_text("reason", &self.reason, 1000)
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RefundResponse {
    pub quote: RefundQuoteResponse,
    pub refunded_at: Option<DateTime<Utc>>,
    pub refunded_by: Option<String>,
    pub payment: Option<PaymentResponse>,
}

impl From<AppliedRefund> for RefundResponse {
    fn from(r: AppliedRefund) -> Self {
        Self {
            quote: r.quote.into(),
            refunded_at: r.sale.refunded_at,
            refunded_by: r.sale.refunded_by,
            payment: r.payment.map(Into::into),
        }
    }
}

/// First address in `X-Forwarded-For`, then `X-Real-IP`.
fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .unwrap_or(FALLBACK_CLIENT_IP)
        .to_string()
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/sales", post(create_sale))
        .route("/v1/sales/:id", get(get_sale))
        .route("/v1/sales/:id/payment-token", post(request_payment_token))
        .route("/v1/sales/:id/refund-quote", get(refund_quote))
        .route("/v1/sales/:id/refund", post(apply_refund))
}

/// POST /v1/sales: Complete a sale atomically.
///
/// Creates or updates the customer and vehicle, freezes the commission
/// split, credits the seller balances and records the payment.
#[utoipa::path(
    post,
    path = "/v1/sales",
    request_body = CreateSaleRequest,
    responses(
        (status = 201, description = "Sale completed", body = SaleResponse),
        (status = 404, description = "Package, agency or branch not found", body = crate::error::ErrorBody),
        (status = 409, description = "Insufficient agency balance", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid input", body = crate::error::ErrorBody),
    ),
    tag = "sales"
)]
async fn create_sale(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CreateSaleRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SaleResponse>), AppError> {
    require_role(&caller, CallerRole::Staff)?;
    let req = extract_validated_json(body)?;
    let done = state.sales.complete_sale(req.into(), Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(SaleResponse::for_caller(done, &caller))))
}

/// GET /v1/sales/:id: Read a sale with its payment.
#[utoipa::path(
    get,
    path = "/v1/sales/{id}",
    params(("id" = Uuid, Path, description = "Sale ID")),
    responses(
        (status = 200, description = "Sale found", body = SaleResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "sales"
)]
async fn get_sale(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<SaleResponse>, AppError> {
    let done = state.sales.sale(SaleId::from_uuid(id)).await?;
    Ok(Json(SaleResponse::for_caller(done, &caller)))
}

/// POST /v1/sales/:id/payment-token: Obtain a gateway payment token.
#[utoipa::path(
    post,
    path = "/v1/sales/{id}/payment-token",
    params(("id" = Uuid, Path, description = "Sale ID")),
    responses(
        (status = 200, description = "Token issued", body = PaymentTokenResponse),
        (status = 422, description = "Sale has no pending gateway payment", body = crate::error::ErrorBody),
        (status = 502, description = "Gateway refused", body = crate::error::ErrorBody),
        (status = 503, description = "Gateway unavailable or not configured", body = crate::error::ErrorBody),
    ),
    tag = "sales"
)]
async fn request_payment_token(
    State(state): State<AppState>,
    caller: CallerIdentity,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<PaymentTokenResponse>, AppError> {
    require_role(&caller, CallerRole::Staff)?;
    let issuer = state
        .tokens
        .as_ref()
        .ok_or_else(|| AppError::service_unavailable("payment gateway is not configured"))?;
    let token = issuer
        .request_payment_token(SaleId::from_uuid(id), &client_ip(&headers))
        .await?;
    Ok(Json(PaymentTokenResponse {
        token: token.token,
        merchant_oid: token.merchant_oid,
    }))
}

/// GET /v1/sales/:id/refund-quote: Prorated refund as of today.
#[utoipa::path(
    get,
    path = "/v1/sales/{id}/refund-quote",
    params(("id" = Uuid, Path, description = "Sale ID")),
    responses(
        (status = 200, description = "Refund quote", body = RefundQuoteResponse),
        (status = 409, description = "Already refunded", body = crate::error::ErrorBody),
        (status = 422, description = "Contract expired", body = crate::error::ErrorBody),
    ),
    tag = "sales"
)]
async fn refund_quote(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<RefundQuoteResponse>, AppError> {
    require_role(&caller, CallerRole::Staff)?;
    let quote = state
        .refunds
        .quote_refund(SaleId::from_uuid(id), Utc::now().date_naive())
        .await?;
    Ok(Json(quote.into()))
}

/// POST /v1/sales/:id/refund: Refund a sale as of today.
#[utoipa::path(
    post,
    path = "/v1/sales/{id}/refund",
    params(("id" = Uuid, Path, description = "Sale ID")),
    request_body = RefundRequest,
    responses(
        (status = 200, description = "Refund applied", body = RefundResponse),
        (status = 403, description = "Manager role required", body = crate::error::ErrorBody),
        (status = 409, description = "Already refunded", body = crate::error::ErrorBody),
    ),
    tag = "sales"
)]
async fn apply_refund(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<RefundRequest>, JsonRejection>,
) -> Result<Json<RefundResponse>, AppError> {
    require_role(&caller, CallerRole::Manager)?;
    let req = extract_validated_json(body)?;
    let now = Utc::now();
    let applied = state
        .refunds
        .apply_refund(
            RefundCommand {
                sale_id: SaleId::from_uuid(id),
                reason: req.reason,
                actor: caller.actor.clone(),
            },
            now.date_naive(),
            now,
        )
        .await?;
    Ok(Json(applied.into()))
}
