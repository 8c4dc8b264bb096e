//! # Splits Client SDK
//!
//! A typed Rust client for the payment split API.
//!
//! Public routes need no credentials. Admin routes (`/api/admin/...`) need
//! the admin key set with [`SplitsClient::with_admin_key`].
//! [`SplitsClient::send_event`] signs a processor event with the webhook
//! secret, for exercising a local deployment without the real processor.

use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use serde::{Serialize, de::DeserializeOwned};
use sha2::Sha256;

use splits_types::{
    CheckoutResponse, CreateCheckoutRequest, CreateProductRequest, CreateRecipientRequest,
    CreateTransferRuleRequest, EventAck, HealthResponse, Payment, PaymentId, Product, ProductId,
    Recipient, RuleAssignment, SetRuleActiveRequest, SplitPlan, TransferRule, TransferRuleId,
    TransferSummary, domain::event::SIGNATURE_HEADER,
};

type HmacSha256 = Hmac<Sha256>;

/// Error type for client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// HTTP status of an API error, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Splits API client.
pub struct SplitsClient {
    base_url: String,
    admin_key: Option<String>,
    http: Client,
}

impl SplitsClient {
    /// Creates a new client.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            admin_key: None,
            http: Client::new(),
        }
    }

    /// Sets the admin API key sent as a Bearer token.
    pub fn with_admin_key(mut self, admin_key: impl Into<String>) -> Self {
        self.admin_key = Some(admin_key.into());
        self
    }

    /// Returns the health report; a degraded service answers 503 with the
    /// same body, so that is returned too.
    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        let resp = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Public routes
    // ─────────────────────────────────────────────────────────────────────────────

    /// Starts a hosted checkout for `quantity` units of a product.
    pub async fn create_checkout_session(
        &self,
        product_id: ProductId,
        customer_id: &str,
        quantity: i32,
    ) -> Result<CheckoutResponse, ClientError> {
        let req = CreateCheckoutRequest {
            product_id,
            customer_id: customer_id.to_string(),
            quantity,
        };
        self.send(Method::POST, "/api/checkout-session", Some(&req))
            .await
    }

    pub async fn list_products(&self) -> Result<Vec<Product>, ClientError> {
        self.get("/api/products").await
    }

    pub async fn get_product(&self, id: ProductId) -> Result<Product, ClientError> {
        self.get(&format!("/api/products/{}", id)).await
    }

    /// Shows how a purchase of `quantity` units would be divided.
    pub async fn preview_split(
        &self,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<SplitPlan, ClientError> {
        self.get(&format!(
            "/api/products/{}/split-preview?quantity={}",
            product_id, quantity
        ))
        .await
    }

    pub async fn get_payment(&self, id: PaymentId) -> Result<Payment, ClientError> {
        self.get(&format!("/api/payments/{}", id)).await
    }

    pub async fn get_transfer_summary(
        &self,
        payment_id: PaymentId,
    ) -> Result<TransferSummary, ClientError> {
        self.get(&format!("/api/payments/{}/transfers", payment_id))
            .await
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Admin routes
    // ─────────────────────────────────────────────────────────────────────────────

    pub async fn create_recipient(
        &self,
        req: &CreateRecipientRequest,
    ) -> Result<Recipient, ClientError> {
        self.send(Method::POST, "/api/admin/recipients", Some(req))
            .await
    }

    pub async fn list_recipients(&self) -> Result<Vec<Recipient>, ClientError> {
        self.get("/api/admin/recipients").await
    }

    pub async fn create_product(&self, req: &CreateProductRequest) -> Result<Product, ClientError> {
        self.send(Method::POST, "/api/admin/products", Some(req))
            .await
    }

    pub async fn create_rule(
        &self,
        product_id: ProductId,
        req: &CreateTransferRuleRequest,
    ) -> Result<TransferRule, ClientError> {
        self.send(
            Method::POST,
            &format!("/api/admin/products/{}/rules", product_id),
            Some(req),
        )
        .await
    }

    /// A product's rules in priority order, with recipient details.
    pub async fn list_rules(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<RuleAssignment>, ClientError> {
        self.get(&format!("/api/admin/products/{}/rules", product_id))
            .await
    }

    pub async fn set_rule_active(
        &self,
        rule_id: TransferRuleId,
        is_active: bool,
    ) -> Result<TransferRule, ClientError> {
        self.send(
            Method::PATCH,
            &format!("/api/admin/rules/{}", rule_id),
            Some(&SetRuleActiveRequest { is_active }),
        )
        .await
    }

    /// Most recent payments first.
    pub async fn list_payments(&self, limit: i64) -> Result<Vec<Payment>, ClientError> {
        self.get(&format!("/api/admin/payments?limit={}", limit))
            .await
    }

    /// Runs or resumes the transfer pass of a completed payment.
    pub async fn execute_transfers(
        &self,
        payment_id: PaymentId,
    ) -> Result<TransferSummary, ClientError> {
        self.send::<_, ()>(
            Method::POST,
            &format!("/api/admin/payments/{}/transfers/execute", payment_id),
            None,
        )
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Processor events
    // ─────────────────────────────────────────────────────────────────────────────

    /// Posts `payload` to the event intake, signed with `webhook_secret` as
    /// the processor would sign it.
    pub async fn send_event(
        &self,
        payload: &str,
        webhook_secret: &str,
    ) -> Result<EventAck, ClientError> {
        let timestamp = chrono::Utc::now().timestamp();
        let resp = self
            .http
            .post(format!("{}/api/webhook", self.base_url))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(
                SIGNATURE_HEADER,
                signature_header(payload, timestamp, webhook_secret),
            )
            .body(payload.to_string())
            .send()
            .await?;
        self.handle_response(resp).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.send::<_, ()>(Method::GET, path, None).await
    }

    async fn send<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ClientError> {
        let mut req = self
            .http
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(body) = body {
            req = req.json(body);
        }
        if let Some(key) = &self.admin_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await?;
        self.handle_response(resp).await
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = resp.status();
        if status.is_success() {
            let body = resp.text().await?;
            Ok(serde_json::from_str(&body)?)
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(ClientError::Api {
                status: status.as_u16(),
                message: error_message(body),
            })
        }
    }
}

/// `t=<unix>,v1=<hex hmac-sha256 of "<t>.<payload>">`
fn signature_header(payload: &str, timestamp: i64, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(format!("{}.{}", timestamp, payload).as_bytes());
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

/// The `error` field of a structured error body, else the raw body.
fn error_message(body: String) -> String {
    serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
        .unwrap_or(body)
}
