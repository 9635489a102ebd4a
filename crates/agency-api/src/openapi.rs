//! # OpenAPI Specification Assembly
//!
//! Collects the utoipa-documented routes into one document served at
//! `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Agency Sales API",
        version = "0.1.0",
        description = "Multi-tenant agency/branch sales: commission split, balance ledger, gateway payments and prorated refunds."
    ),
    paths(
        // Tenancy
        crate::routes::tenancy::create_agency,
        crate::routes::tenancy::get_agency,
        crate::routes::tenancy::update_agency_rate,
        crate::routes::tenancy::deposit,
        crate::routes::tenancy::create_branch,
        crate::routes::tenancy::get_branch,
        crate::routes::tenancy::update_branch_rate,
        crate::routes::tenancy::create_package,
        // Sales
        crate::routes::sales::create_sale,
        crate::routes::sales::get_sale,
        crate::routes::sales::request_payment_token,
        crate::routes::sales::refund_quote,
        crate::routes::sales::apply_refund,
        // Payments
        crate::routes::payments::callback_form,
        crate::routes::payments::callback_query,
    ),
    components(schemas(
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        crate::auth::CallerRole,
        crate::routes::tenancy::CreateAgencyRequest,
        crate::routes::tenancy::UpdateRateRequest,
        crate::routes::tenancy::DepositRequest,
        crate::routes::tenancy::CreateBranchRequest,
        crate::routes::tenancy::CreatePackageRequest,
        crate::routes::tenancy::AgencyResponse,
        crate::routes::tenancy::BranchResponse,
        crate::routes::tenancy::PackageResponse,
        crate::routes::sales::CustomerBody,
        crate::routes::sales::VehicleBody,
        crate::routes::sales::CreateSaleRequest,
        crate::routes::sales::SaleResponse,
        crate::routes::sales::PaymentResponse,
        crate::routes::sales::CustomerSummary,
        crate::routes::sales::VehicleSummary,
        crate::routes::sales::PaymentTokenResponse,
        crate::routes::sales::RefundQuoteResponse,
        crate::routes::sales::RefundRequest,
        crate::routes::sales::RefundResponse,
    )),
    tags(
        (name = "tenancy", description = "Agencies, branches, packages and balances"),
        (name = "sales", description = "Sale completion, payment tokens and refunds"),
        (name = "payments", description = "Payment gateway callbacks"),
    )
)]
pub struct ApiDoc;

pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();
        for expected in [
            "/v1/agencies",
            "/v1/agencies/{id}",
            "/v1/agencies/{id}/commission-rate",
            "/v1/agencies/{id}/deposits",
            "/v1/branches",
            "/v1/branches/{id}/commission-rate",
            "/v1/packages",
            "/v1/sales",
            "/v1/sales/{id}",
            "/v1/sales/{id}/payment-token",
            "/v1/sales/{id}/refund-quote",
            "/v1/sales/{id}/refund",
            "/v1/payments/callback",
        ] {
            assert!(paths.contains(&expected), "missing {expected}");
        }
    }
}
