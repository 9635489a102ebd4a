//! # Integration Tests for agency-api
//!
//! Drives the full router over the in-memory engine: tenancy admin, sale
//! completion, role-based redaction, gateway callbacks, refunds and the
//! error envelope.

use std::sync::Arc;

use agency_api::auth::SecretToken;
use agency_api::middleware::metrics::ApiMetrics;
use agency_api::state::{AppConfig, AppState};
use agency_gateway::{GatewayClient, GatewayConfig, Signer};
use agency_store::MemoryStore;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{Days, Utc};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

const SECRET: &str = "test-secret";
const KEY: &str = "merchant-key";
const SALT: &str = "merchant-salt";
const ADMIN: &str = "admin:root:test-secret";
const MANAGER: &str = "manager:mert:test-secret";
const STAFF: &str = "staff:ayse:test-secret";

/// Auth enabled, gateway configured against an address nothing listens on.
fn gateway_state() -> AppState {
    let config = AppConfig {
        port: 8080,
        auth_token: Some(SecretToken::new(SECRET)),
    };
    let gateway_config = GatewayConfig::local_mock("http://127.0.0.1:9", KEY, SALT).unwrap();
    let gateway = GatewayClient::new(gateway_config).unwrap();
    AppState::with_store(config, Arc::new(MemoryStore::new()), Some(gateway))
}

fn test_app() -> Router {
    agency_api::app(gateway_state()).unwrap()
}

/// Auth disabled, no gateway.
fn bare_app() -> Router {
    agency_api::app(AppState::new()).unwrap()
}

async fn body_string(response: axum::http::Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(t) = token {
        builder = builder.header("authorization", format!("Bearer {t}"));
    }
    let request = match body {
        Some(v) => builder
            .header("content-type", "application/json")
            .body(Body::from(v.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let text = body_string(response).await;
    let value = serde_json::from_str(&text).unwrap_or(Value::String(text));
    (status, value)
}

fn form_encode(fields: &[(&str, &str)]) -> String {
    fields
        .iter()
        .map(|(k, v)| {
            let v = v.replace('%', "%25").replace('+', "%2B").replace('/', "%2F").replace('=', "%3D");
            format!("{k}={v}")
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn signed_fields(merchant_oid: &str, status: &str, total: &str) -> String {
    let hash = Signer::new(KEY, SALT).callback_hash(merchant_oid, status, total).unwrap();
    form_encode(&[
        ("merchant_oid", merchant_oid),
        ("status", status),
        ("total_amount", total),
        ("hash", &hash),
    ])
}

async fn post_callback(app: &Router, form: String) -> (StatusCode, String) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/payments/callback")
                .header("content-type", "application/x-www-form-urlencoded")
                .body(Body::from(form))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    (status, body_string(response).await)
}

fn sale_dates() -> (String, String) {
    let today = Utc::now().date_naive();
    let end = today.checked_add_days(Days::new(365)).unwrap();
    (today.to_string(), end.to_string())
}

struct Seeded {
    agency_id: String,
    branch_id: String,
    package_id: String,
}

async fn seed(app: &Router, agency_balance: &str) -> Seeded {
    let (status, agency) = send(
        app,
        "POST",
        "/v1/agencies",
        Some(ADMIN),
        Some(json!({"name": "Kadikoy Sigorta", "commission_rate": "25", "opening_balance": agency_balance})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{agency}");
    let agency_id = agency["id"].as_str().unwrap().to_string();

    let (status, branch) = send(
        app,
        "POST",
        "/v1/branches",
        Some(ADMIN),
        Some(json!({"agency_id": agency_id, "name": "Moda", "commission_rate": "15"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{branch}");

    let (status, package) = send(
        app,
        "POST",
        "/v1/packages",
        Some(ADMIN),
        Some(json!({"name": "Kasko Plus", "price": "1200.00"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{package}");

    Seeded {
        agency_id,
        branch_id: branch["id"].as_str().unwrap().to_string(),
        package_id: package["id"].as_str().unwrap().to_string(),
    }
}

fn sale_body(seeded: &Seeded, method: &str, plate: &str) -> Value {
    let (start, end) = sale_dates();
    json!({
        "customer": {"full_name": "Ayse Yilmaz", "email": "ayse@example.com"},
        "vehicle": {"plate": plate, "brand": "Fiat", "model": "Egea", "model_year": 2021},
        "package_id": seeded.package_id,
        "start_date": start,
        "end_date": end,
        "payment_method": method,
        "branch_id": seeded.branch_id,
    })
}

fn decimal(v: &Value) -> rust_decimal::Decimal {
    v.as_str().unwrap().parse().unwrap()
}

// -- Health & docs ------------------------------------------------------------

#[tokio::test]
async fn health_checks_need_no_token() {
    let app = test_app();
    for (uri, expected) in [("/health/liveness", "ok"), ("/health/readiness", "ready")] {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, expected);
    }
}

#[tokio::test]
async fn openapi_document_served() {
    let (status, doc) = send(&bare_app(), "GET", "/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/v1/sales"].is_object());
    assert!(doc["paths"]["/v1/payments/callback"].is_object());
}

#[tokio::test]
async fn api_requires_token_when_configured() {
    let (status, body) = send(&test_app(), "GET", "/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

// -- Tenancy ------------------------------------------------------------------

#[tokio::test]
async fn branch_rate_cap_enforced_over_http() {
    let app = test_app();
    let seeded = seed(&app, "0").await;

    let (status, body) = send(
        &app,
        "POST",
        "/v1/branches",
        Some(ADMIN),
        Some(json!({"agency_id": seeded.agency_id, "name": "Bostanci", "commission_rate": "30"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "RATE_CAP_VIOLATION");

    let (status, body) = send(
        &app,
        "PUT",
        &format!("/v1/agencies/{}/commission-rate", seeded.agency_id),
        Some(ADMIN),
        Some(json!({"commission_rate": "10"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "RATE_CAP_VIOLATION");

    let (status, body) = send(
        &app,
        "PUT",
        &format!("/v1/branches/{}/commission-rate", seeded.branch_id),
        Some(ADMIN),
        Some(json!({"commission_rate": "20"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&body["commission_rate"]), rust_decimal_macros::dec!(20));
}

#[tokio::test]
async fn out_of_range_rate_is_validation_error() {
    let (status, body) = send(
        &bare_app(),
        "POST",
        "/v1/agencies",
        None,
        Some(json!({"name": "X", "commission_rate": "101"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn deposit_credits_agency() {
    let app = test_app();
    let seeded = seed(&app, "100").await;
    let (status, body) = send(
        &app,
        "POST",
        &format!("/v1/agencies/{}/deposits", seeded.agency_id),
        Some(ADMIN),
        Some(json!({"amount": "250.50", "reference": "EFT-42"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&body["balance"]), rust_decimal_macros::dec!(350.50));
}

#[tokio::test]
async fn staff_cannot_administer_tenancy() {
    let (status, body) = send(
        &test_app(),
        "POST",
        "/v1/packages",
        Some(STAFF),
        Some(json!({"name": "Kasko", "price": "10"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");
}

// -- Sales --------------------------------------------------------------------

#[tokio::test]
async fn gateway_sale_settles_once_via_callback() {
    let app = test_app();
    let seeded = seed(&app, "0").await;

    let (status, sale) = send(&app, "POST", "/v1/sales", Some(ADMIN), Some(sale_body(&seeded, "GATEWAY", "34 ABC 123"))).await;
    assert_eq!(status, StatusCode::CREATED, "{sale}");
    assert_eq!(decimal(&sale["branch_commission"]), rust_decimal_macros::dec!(180));
    assert_eq!(decimal(&sale["agency_commission"]), rust_decimal_macros::dec!(120));
    assert_eq!(sale["payment"]["status"], "PENDING");
    assert_eq!(sale["vehicle"]["plate"], "34ABC123");
    let sale_id = sale["id"].as_str().unwrap().to_string();
    let oid = sale["payment"]["transaction_id"].as_str().unwrap().to_string();
    assert_eq!(oid, sale_id.replace('-', ""));

    let (_, agency_before) = send(&app, "GET", &format!("/v1/agencies/{}", seeded.agency_id), Some(ADMIN), None).await;

    for _ in 0..2 {
        let (status, body) = post_callback(&app, signed_fields(&oid, "success", "120000")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
    }

    let (status, loaded) = send(&app, "GET", &format!("/v1/sales/{sale_id}"), Some(ADMIN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(loaded["payment"]["status"], "COMPLETED");

    let (_, agency_after) = send(&app, "GET", &format!("/v1/agencies/{}", seeded.agency_id), Some(ADMIN), None).await;
    assert_eq!(agency_before["balance"], agency_after["balance"]);
}

#[tokio::test]
async fn callback_via_query_string_is_accepted() {
    let app = test_app();
    let seeded = seed(&app, "0").await;
    let (_, sale) = send(&app, "POST", "/v1/sales", Some(ADMIN), Some(sale_body(&seeded, "GATEWAY", "06 QRY 06"))).await;
    let oid = sale["payment"]["transaction_id"].as_str().unwrap().to_string();

    let mut fields = signed_fields(&oid, "failed", "120000");
    fields.push_str("&failed_reason_code=6&failed_reason_msg=card%20declined");
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/v1/payments/callback?{fields}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "OK");

    let (_, loaded) = send(&app, "GET", &format!("/v1/sales/{}", sale["id"].as_str().unwrap()), Some(ADMIN), None).await;
    assert_eq!(loaded["payment"]["status"], "FAILED");
    assert_eq!(loaded["payment"]["failure_reason"], "6: card declined");
}

#[tokio::test]
async fn tampered_callback_rejected_and_ignored() {
    let app = test_app();
    let seeded = seed(&app, "0").await;
    let (_, sale) = send(&app, "POST", "/v1/sales", Some(ADMIN), Some(sale_body(&seeded, "GATEWAY", "35 TMP 35"))).await;
    let oid = sale["payment"]["transaction_id"].as_str().unwrap().to_string();

    let form = form_encode(&[
        ("merchant_oid", &oid),
        ("status", "success"),
        ("total_amount", "120000"),
        ("hash", "bm90LWEtcmVhbC1oYXNo"),
    ]);
    let (status, body) = post_callback(&app, form).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("INVALID_SIGNATURE"));

    let (_, loaded) = send(&app, "GET", &format!("/v1/sales/{}", sale["id"].as_str().unwrap()), Some(ADMIN), None).await;
    assert_eq!(loaded["payment"]["status"], "PENDING");
}

#[tokio::test]
async fn callback_for_unknown_order_is_acknowledged() {
    let (status, body) = post_callback(&test_app(), signed_fields("deadbeefdeadbeefdeadbeefdeadbeef", "success", "100")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");
}

#[tokio::test]
async fn gateway_endpoints_unavailable_without_configuration() {
    let app = bare_app();
    let (status, _) = post_callback(&app, signed_fields("abc", "success", "100")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/v1/sales/{}/payment-token", uuid::Uuid::new_v4()),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn insufficient_balance_leaves_nothing_behind() {
    let app = test_app();
    let seeded = seed(&app, "500").await;
    let mut body = sale_body(&seeded, "BALANCE", "16 BRS 16");
    body["price"] = json!("2000.00");

    let (status, err) = send(&app, "POST", "/v1/sales", Some(ADMIN), Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["error"]["code"], "INSUFFICIENT_FUNDS");

    let (_, agency) = send(&app, "GET", &format!("/v1/agencies/{}", seeded.agency_id), Some(ADMIN), None).await;
    assert_eq!(decimal(&agency["balance"]), rust_decimal_macros::dec!(500));
    let (_, branch) = send(&app, "GET", &format!("/v1/branches/{}", seeded.branch_id), Some(ADMIN), None).await;
    assert_eq!(decimal(&branch["balance"]), rust_decimal_macros::dec!(0));
}

#[tokio::test]
async fn balance_check_ignores_the_sales_own_commission() {
    let app = test_app();
    // 1100 + 120 agency share would cover 1200, the balance alone does not.
    let seeded = seed(&app, "1100").await;
    let body = sale_body(&seeded, "BALANCE", "16 BRS 17");

    let (status, err) = send(&app, "POST", "/v1/sales", Some(ADMIN), Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["error"]["code"], "INSUFFICIENT_FUNDS");

    let (_, agency) = send(&app, "GET", &format!("/v1/agencies/{}", seeded.agency_id), Some(ADMIN), None).await;
    assert_eq!(decimal(&agency["balance"]), rust_decimal_macros::dec!(1100));
}

#[tokio::test]
async fn oversized_price_is_rejected_not_fatal() {
    let app = test_app();
    let seeded = seed(&app, "0").await;
    let mut body = sale_body(&seeded, "GATEWAY", "16 BRS 18");
    body["price"] = json!("79228162514264337593543950335");

    let (status, err) = send(&app, "POST", "/v1/sales", Some(ADMIN), Some(body)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(err["error"]["code"], "VALIDATION_ERROR");

    let (status, _) = send(
        &app,
        "POST",
        "/v1/packages",
        Some(ADMIN),
        Some(json!({"name": "Gold", "price": "1000000000000"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn staff_sees_no_commission() {
    let app = test_app();
    let seeded = seed(&app, "0").await;
    let (status, sale) = send(&app, "POST", "/v1/sales", Some(STAFF), Some(sale_body(&seeded, "GATEWAY", "07 STF 07"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(sale.get("commission").is_none());
    assert!(sale.get("branch_commission").is_none());
    assert!(sale.get("agency_commission").is_none());

    let (_, as_manager) = send(&app, "GET", &format!("/v1/sales/{}", sale["id"].as_str().unwrap()), Some(MANAGER), None).await;
    assert_eq!(decimal(&as_manager["commission"]), rust_decimal_macros::dec!(300));
}

#[tokio::test]
async fn malformed_requests_are_bad_requests() {
    let app = bare_app();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/sales")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "GET", "/v1/sales/not-a-uuid", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, "GET", &format!("/v1/sales/{}", uuid::Uuid::new_v4()), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

// -- Refunds ------------------------------------------------------------------

#[tokio::test]
async fn balance_refund_flow() {
    let app = test_app();
    let seeded = seed(&app, "5000").await;
    let (status, sale) = send(&app, "POST", "/v1/sales", Some(ADMIN), Some(sale_body(&seeded, "BALANCE", "34 RFD 34"))).await;
    assert_eq!(status, StatusCode::CREATED, "{sale}");
    assert_eq!(sale["payment"]["status"], "COMPLETED");
    let sale_id = sale["id"].as_str().unwrap().to_string();

    let (status, quote) = send(&app, "GET", &format!("/v1/sales/{sale_id}/refund-quote"), Some(STAFF), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&quote["net_price"]), rust_decimal_macros::dec!(1000));
    assert_eq!(quote["remaining_days"], 365);

    let (status, _) = send(
        &app,
        "POST",
        &format!("/v1/sales/{sale_id}/refund"),
        Some(STAFF),
        Some(json!({"reason": "customer request"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, before) = send(&app, "GET", &format!("/v1/agencies/{}", seeded.agency_id), Some(ADMIN), None).await;
    let (status, refund) = send(
        &app,
        "POST",
        &format!("/v1/sales/{sale_id}/refund"),
        Some(MANAGER),
        Some(json!({"reason": "customer request"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{refund}");
    assert_eq!(refund["refunded_by"], "mert");
    assert_eq!(refund["payment"]["status"], "REFUNDED");
    let amount = decimal(&refund["quote"]["refund_amount"]);
    assert_eq!(amount, rust_decimal_macros::dec!(1000));

    let (_, after) = send(&app, "GET", &format!("/v1/agencies/{}", seeded.agency_id), Some(ADMIN), None).await;
    assert_eq!(decimal(&after["balance"]), decimal(&before["balance"]) + amount);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/v1/sales/{sale_id}/refund"),
        Some(MANAGER),
        Some(json!({"reason": "again"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "ALREADY_REFUNDED");
}

#[tokio::test]
async fn refund_requires_reason() {
    let app = test_app();
    let seeded = seed(&app, "0").await;
    let (_, sale) = send(&app, "POST", "/v1/sales", Some(ADMIN), Some(sale_body(&seeded, "GATEWAY", "34 RSN 34"))).await;
    let (status, body) = send(
        &app,
        "POST",
        &format!("/v1/sales/{}/refund", sale["id"].as_str().unwrap()),
        Some(MANAGER),
        Some(json!({"reason": "  "})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

// -- Metrics ------------------------------------------------------------------

#[tokio::test]
async fn metrics_count_requests_and_errors() {
    let metrics = ApiMetrics::new().unwrap();
    let app = agency_api::app_with_metrics(AppState::new(), metrics.clone());
    send(&app, "GET", "/openapi.json", None, None).await;
    send(&app, "GET", &format!("/v1/agencies/{}", uuid::Uuid::new_v4()), None, None).await;
    assert_eq!(metrics.requests(), 2);
    assert_eq!(metrics.errors(), 1);
}

#[tokio::test]
async fn callback_outcomes_are_scraped_without_a_token() {
    let metrics = ApiMetrics::new().unwrap();
    let app = agency_api::app_with_metrics(gateway_state(), metrics.clone());
    let seeded = seed(&app, "0").await;
    let (_, sale) = send(&app, "POST", "/v1/sales", Some(ADMIN), Some(sale_body(&seeded, "GATEWAY", "41 MTR 41"))).await;
    let oid = sale["payment"]["transaction_id"].as_str().unwrap().to_string();

    post_callback(&app, signed_fields(&oid, "success", "120000")).await;
    post_callback(&app, signed_fields(&oid, "success", "120000")).await;
    let tampered = form_encode(&[
        ("merchant_oid", oid.as_str()),
        ("status", "success"),
        ("total_amount", "120000"),
        ("hash", "AAAA"),
    ]);
    let (status, _) = post_callback(&app, tampered).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(metrics.callbacks("completed"), 1);
    assert_eq!(metrics.callbacks("duplicate"), 1);
    assert_eq!(metrics.callbacks("rejected"), 1);

    send(&app, "GET", &format!("/v1/agencies/{}", seeded.agency_id), Some(ADMIN), None).await;
    let response = app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = body_string(response).await;
    assert!(text.contains("agency_gateway_callbacks_total{outcome=\"duplicate\"} 1"), "{text}");
    assert!(text.contains("path=\"/v1/agencies/{id}\""), "{text}");
}
