//! Integration tests for rate limiting middleware.
//!
//! These tests verify the HTTP-level behavior of rate limiting,
//! including 429 responses, exempt routes and counters shared between
//! instances through the database.
//!
//! This test requires the `sqlite` feature flag.

#![cfg(all(feature = "sqlite", not(feature = "postgres")))]

use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header::RETRY_AFTER},
};
use http_body_util::BodyExt;
use splits_hex::{
    ServiceConfig, SplitService,
    inbound::{HttpServer, RateLimitState},
    outbound::DryRunProcessor,
};
use splits_repo::{HmacSignatureVerifier, Repo, SharedRateLimitStore};
use tower::ServiceExt;

async fn create_repo() -> Repo {
    // Use in-memory SQLite for tests
    Repo::new("sqlite::memory:").await.unwrap()
}

fn create_app(repo: Repo, rate_limit: RateLimitState) -> Router {
    let service = SplitService::new(
        repo,
        DryRunProcessor::new("http://localhost:3000"),
        HmacSignatureVerifier::new("whsec_test"),
        ServiceConfig::default(),
    );
    HttpServer::new(service, None)
        .with_rate_limit(rate_limit)
        .router()
}

/// Helper to create a server whose API routes allow `api_max` requests per minute.
async fn create_limited_app(api_max: u32) -> Router {
    create_app(
        create_repo().await,
        RateLimitState::in_memory(Duration::from_secs(60), 1000, api_max),
    )
}

fn products_request(client_ip: &str) -> Request<Body> {
    Request::builder()
        .uri("/api/products")
        .header("X-Forwarded-For", client_ip)
        .body(Body::empty())
        .unwrap()
}

fn health_request() -> Request<Body> {
    Request::builder()
        .uri("/health")
        .header("X-Forwarded-For", "10.0.0.1")
        .body(Body::empty())
        .unwrap()
}

fn unsigned_event_request() -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/webhook")
        .header("X-Forwarded-For", "10.0.0.1")
        .body(Body::from("{}"))
        .unwrap()
}

#[tokio::test]
async fn test_requests_over_budget_get_429() {
    let app = create_limited_app(3).await;

    for i in 0..3 {
        let response = app.clone().oneshot(products_request("10.0.0.1")).await.unwrap();
        assert_eq!(
            response.status(),
            StatusCode::OK,
            "request {} should succeed",
            i + 1
        );
    }

    let response = app.clone().oneshot(products_request("10.0.0.1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let retry_after: u64 = response.headers()[RETRY_AFTER]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after >= 1);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["code"], 429);
    assert!(json["error"].as_str().unwrap().contains("Too many requests"));
}

#[tokio::test]
async fn test_each_client_has_its_own_budget() {
    let app = create_limited_app(2).await;

    for _ in 0..2 {
        let response = app.clone().oneshot(products_request("10.0.0.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = app.clone().oneshot(products_request("10.0.0.1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let response = app.clone().oneshot(products_request("10.0.0.2")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_health_and_event_intake_are_never_limited() {
    let app = create_limited_app(1).await;

    for _ in 0..5 {
        let response = app.clone().oneshot(health_request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Rejected for the missing signature, never for the rate limit
        let response = app.clone().oneshot(unsigned_event_request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn test_rejected_requests_keep_security_headers() {
    let app = create_limited_app(1).await;

    app.clone().oneshot(products_request("10.0.0.1")).await.unwrap();
    let response = app.clone().oneshot(products_request("10.0.0.1")).await.unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_shared_store_counts_across_instances() {
    let repo = create_repo().await;
    let shared = |repo: Repo| RateLimitState {
        store: Arc::new(SharedRateLimitStore::new(repo, Duration::from_secs(3600))),
        max_requests: 1000,
        api_max_requests: 3,
    };
    let first = create_app(repo.clone(), shared(repo.clone()));
    let second = create_app(repo.clone(), shared(repo));

    for app in [&first, &second, &first] {
        let response = app.clone().oneshot(products_request("10.0.0.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = second.clone().oneshot(products_request("10.0.0.1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(RETRY_AFTER));
}
