//! End-to-end tests of the payment flow over HTTP.
//!
//! Admin setup, checkout, signed processor events and the resulting
//! transfers, all driven through the router against in-memory SQLite.
//!
//! This test requires the `sqlite` feature flag.

#![cfg(all(feature = "sqlite", not(feature = "postgres")))]

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use splits_hex::{
    ServiceConfig, SplitService,
    inbound::{HttpServer, SIGNATURE_HEADER},
    outbound::DryRunProcessor,
};
use splits_repo::{
    HmacSignatureVerifier, Repo,
    security::{hash_api_key, signature_header},
};
use tower::ServiceExt;

const ADMIN_KEY: &str = "admin-test-key";
const WEBHOOK_SECRET: &str = "whsec_test";

async fn create_app() -> Router {
    let repo = Repo::new("sqlite::memory:").await.unwrap();
    let service = SplitService::new(
        repo,
        DryRunProcessor::new("http://localhost:3000"),
        HmacSignatureVerifier::new(WEBHOOK_SECRET),
        ServiceConfig::default(),
    );
    HttpServer::new(service, Some(hash_api_key(ADMIN_KEY))).router()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn admin_post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("Content-Type", "application/json")
        .header("Authorization", format!("Bearer {}", ADMIN_KEY))
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn decimal(value: &Value) -> Decimal {
    value.as_str().unwrap().parse().unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn signed_event(body: &Value) -> Request<Body> {
    let payload = body.to_string();
    let header = signature_header(
        payload.as_bytes(),
        chrono::Utc::now().timestamp(),
        WEBHOOK_SECRET,
    );
    Request::builder()
        .method(Method::POST)
        .uri("/api/webhook")
        .header("Content-Type", "application/json")
        .header(SIGNATURE_HEADER, header)
        .body(Body::from(payload))
        .unwrap()
}

fn event(id: &str, event_type: &str, object_id: &str, payment_id: &str) -> Value {
    json!({
        "id": id,
        "type": event_type,
        "created": 1_700_000_000,
        "data": {
            "object": {
                "id": object_id,
                "metadata": { "payment_id": payment_id }
            }
        }
    })
}

async fn create_recipient(app: &Router, name: &str, role: &str, account: Option<&str>) -> String {
    let (status, json) = send(
        app,
        admin_post(
            "/api/admin/recipients",
            json!({
                "name": name,
                "email": format!("{}@example.com", name.to_lowercase()),
                "role": role,
                "payout_account_id": account,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", json);
    json["id"].as_str().unwrap().to_string()
}

/// Installs the wellness kit catalog and returns the product id.
async fn seed_catalog(app: &Router) -> String {
    let company = create_recipient(app, "Company", "COMPANY", None).await;
    let brand = create_recipient(app, "Brand", "BRAND_PARTNER", Some("acct_brand")).await;
    let provider =
        create_recipient(app, "Provider", "WELLNESS_PROVIDER", Some("acct_provider")).await;
    let affiliate = create_recipient(app, "Affiliate", "AFFILIATE", Some("acct_affiliate")).await;

    let (status, product) = send(
        app,
        admin_post(
            "/api/admin/products",
            json!({
                "name": "Wellness Kit",
                "description": "Starter kit",
                "retail_price": "299.99",
                "creator_id": brand,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", product);
    let product_id = product["id"].as_str().unwrap().to_string();

    let rules = [
        json!({"recipient_id": brand, "name": "Wholesale", "rule_type": "WHOLESALE", "amount": "180.00", "priority": 1}),
        json!({"recipient_id": provider, "name": "Provider commission", "rule_type": "COMMISSION", "percentage": "0.15", "priority": 2}),
        json!({"recipient_id": affiliate, "name": "Affiliate commission", "rule_type": "COMMISSION", "percentage": "0.05", "priority": 3}),
        json!({"recipient_id": company, "name": "Platform fee", "rule_type": "FEE", "percentage": "0.10", "priority": 4}),
    ];
    for rule in rules {
        let (status, json) = send(
            app,
            admin_post(&format!("/api/admin/products/{}/rules", product_id), rule),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{}", json);
    }

    product_id
}

async fn start_checkout(app: &Router, product_id: &str) -> Value {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/checkout-session")
        .header("Content-Type", "application/json")
        .body(Body::from(
            json!({"product_id": product_id, "customer_id": "customer-42", "quantity": 1})
                .to_string(),
        ))
        .unwrap();
    let (status, json) = send(app, request).await;
    assert_eq!(status, StatusCode::CREATED, "{}", json);
    json
}

#[tokio::test]
async fn test_signed_events_complete_payment_and_split_it() {
    let app = create_app().await;
    let product_id = seed_catalog(&app).await;

    let checkout = start_checkout(&app, &product_id).await;
    let payment_id = checkout["payment_id"].as_str().unwrap();
    assert_eq!(decimal(&checkout["amount"]), dec!(299.99));
    assert_eq!(checkout["split"]["transfers"].as_array().unwrap().len(), 4);

    let (status, ack) = send(
        &app,
        signed_event(&event(
            "evt_1",
            "checkout.session.completed",
            "cs_1",
            payment_id,
        )),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack, json!({"received": true}));

    let (status, _) = send(
        &app,
        signed_event(&event("evt_2", "payment_intent.succeeded", "pi_1", payment_id)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, payment) = send(&app, get(&format!("/api/payments/{}", payment_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payment["status"], "COMPLETED");
    assert_eq!(payment["transfers_completed"], true);

    let (_, summary) = send(
        &app,
        get(&format!("/api/payments/{}/transfers", payment_id)),
    )
    .await;
    assert_eq!(summary["completed"], 4);
    assert_eq!(summary["failed"], 0);
    assert_eq!(decimal(&summary["total"]), dec!(269.997));
}

#[tokio::test]
async fn test_redelivered_event_is_acknowledged_once() {
    let app = create_app().await;
    let product_id = seed_catalog(&app).await;
    let checkout = start_checkout(&app, &product_id).await;
    let payment_id = checkout["payment_id"].as_str().unwrap();

    let confirmed = event("evt_pi", "payment_intent.succeeded", "pi_1", payment_id);
    for _ in 0..3 {
        let (status, ack) = send(&app, signed_event(&confirmed)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["received"], true);
    }

    let (_, summary) = send(
        &app,
        get(&format!("/api/payments/{}/transfers", payment_id)),
    )
    .await;
    assert_eq!(summary["transfers"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_unsigned_or_forged_events_are_rejected() {
    let app = create_app().await;
    let product_id = seed_catalog(&app).await;
    let checkout = start_checkout(&app, &product_id).await;
    let payment_id = checkout["payment_id"].as_str().unwrap();
    let body = event("evt_1", "payment_intent.succeeded", "pi_1", payment_id).to_string();

    let unsigned = Request::builder()
        .method(Method::POST)
        .uri("/api/webhook")
        .body(Body::from(body.clone()))
        .unwrap();
    let (status, json) = send(&app, unsigned).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], 400);

    let forged = Request::builder()
        .method(Method::POST)
        .uri("/api/webhook")
        .header(
            SIGNATURE_HEADER,
            signature_header(body.as_bytes(), chrono::Utc::now().timestamp(), "whsec_other"),
        )
        .body(Body::from(body))
        .unwrap();
    let (status, _) = send(&app, forged).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, payment) = send(&app, get(&format!("/api/payments/{}", payment_id))).await;
    assert_eq!(payment["status"], "PENDING");
}

#[tokio::test]
async fn test_signed_malformed_body_is_rejected() {
    let app = create_app().await;
    let payload = "{not json";
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/webhook")
        .header(
            SIGNATURE_HEADER,
            signature_header(payload.as_bytes(), chrono::Utc::now().timestamp(), WEBHOOK_SECRET),
        )
        .body(Body::from(payload))
        .unwrap();

    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_routes_require_key() {
    let app = create_app().await;

    let (status, json) = send(&app, get("/api/admin/recipients")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], 401);

    let wrong = Request::builder()
        .uri("/api/admin/recipients")
        .header("Authorization", "Bearer not-the-key")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, wrong).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let right = Request::builder()
        .uri("/api/admin/recipients")
        .header("Authorization", format!("Bearer {}", ADMIN_KEY))
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(&app, right).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_operator_can_rerun_completed_pass() {
    let app = create_app().await;
    let product_id = seed_catalog(&app).await;
    let checkout = start_checkout(&app, &product_id).await;
    let payment_id = checkout["payment_id"].as_str().unwrap();
    let execute_uri = format!("/api/admin/payments/{}/transfers/execute", payment_id);

    // Not paid yet
    let (status, _) = send(&app, admin_post(&execute_uri, json!({}))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    send(
        &app,
        signed_event(&event("evt_pi", "payment_intent.succeeded", "pi_1", payment_id)),
    )
    .await;

    let (status, summary) = send(&app, admin_post(&execute_uri, json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["transfers"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_checkout_for_unknown_product_is_404() {
    let app = create_app().await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/checkout-session")
        .header("Content-Type", "application/json")
        .body(Body::from(
            json!({
                "product_id": "00000000-0000-0000-0000-000000000000",
                "customer_id": "customer-42"
            })
            .to_string(),
        ))
        .unwrap();

    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], 404);
}

#[tokio::test]
async fn test_health_sets_security_headers_and_request_id() {
    let app = create_app().await;

    let response = app.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert!(headers.contains_key("x-request-id"));
}
