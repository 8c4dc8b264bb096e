//! HTTP request handlers.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use splits_types::{
    AppError, CreateCheckoutRequest, CreateProductRequest, CreateRecipientRequest,
    CreateTransferRuleRequest, EventAck, HealthResponse, PaymentId, PaymentProcessor, ProductId,
    SetRuleActiveRequest, SplitPreviewQuery, SplitRepository, TransferRuleId,
};

use crate::SplitService;

pub use splits_types::domain::event::SIGNATURE_HEADER;

/// Application state shared across handlers.
pub struct AppState<R: SplitRepository, P: PaymentProcessor> {
    pub service: SplitService<R, P>,
    /// SHA-256 hex of the admin API key; admin routes are closed when unset
    pub admin_key_hash: Option<String>,
}

/// Wrapper to implement IntoResponse for AppError (orphan rule workaround).
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            AppError::StoreUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %message, "request failed");
        }

        let body = serde_json::json!({
            "error": message,
            "code": status.as_u16()
        });

        (status, Json(body)).into_response()
    }
}

fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid {} ID", what)).into())
}

type Shared<R, P> = State<Arc<AppState<R, P>>>;

// ─────────────────────────────────────────────────────────────────────────────
// Public
// ─────────────────────────────────────────────────────────────────────────────

/// Health check endpoint; 503 when the data store cannot be reached.
pub async fn health<R: SplitRepository, P: PaymentProcessor>(
    State(state): Shared<R, P>,
) -> impl IntoResponse {
    match state.service.health().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok".into(),
                database: "ok".into(),
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded".into(),
                    database: "unavailable".into(),
                }),
            )
        }
    }
}

#[tracing::instrument(skip(state), fields(product_id = %req.product_id))]
pub async fn create_checkout_session<R: SplitRepository, P: PaymentProcessor>(
    State(state): Shared<R, P>,
    Json(req): Json<CreateCheckoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let checkout = state.service.create_checkout_session(req).await?;
    Ok((StatusCode::CREATED, Json(checkout)))
}

#[tracing::instrument(skip(state))]
pub async fn list_products<R: SplitRepository, P: PaymentProcessor>(
    State(state): Shared<R, P>,
) -> Result<impl IntoResponse, ApiError> {
    let products = state.service.list_products().await?;
    Ok(Json(products))
}

#[tracing::instrument(skip(state), fields(product_id = %id))]
pub async fn get_product<R: SplitRepository, P: PaymentProcessor>(
    State(state): Shared<R, P>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let product_id: ProductId = parse_id(&id, "product")?;
    let product = state.service.get_product(product_id).await?;
    Ok(Json(product))
}

#[tracing::instrument(skip(state), fields(product_id = %id))]
pub async fn preview_split<R: SplitRepository, P: PaymentProcessor>(
    State(state): Shared<R, P>,
    Path(id): Path<String>,
    Query(query): Query<SplitPreviewQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let product_id: ProductId = parse_id(&id, "product")?;
    let plan = state
        .service
        .preview_split(product_id, query.quantity)
        .await?;
    Ok(Json(plan))
}

#[tracing::instrument(skip(state), fields(payment_id = %id))]
pub async fn get_payment<R: SplitRepository, P: PaymentProcessor>(
    State(state): Shared<R, P>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let payment_id: PaymentId = parse_id(&id, "payment")?;
    let payment = state.service.get_payment(payment_id).await?;
    Ok(Json(payment))
}

#[tracing::instrument(skip(state), fields(payment_id = %id))]
pub async fn get_transfer_summary<R: SplitRepository, P: PaymentProcessor>(
    State(state): Shared<R, P>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let payment_id: PaymentId = parse_id(&id, "payment")?;
    let summary = state.service.get_transfer_summary(payment_id).await?;
    Ok(Json(summary))
}

/// Processor event intake.
///
/// The raw body is needed for signature verification, so it is taken as
/// bytes and parsed only after the signature checks out.
#[tracing::instrument(skip_all)]
pub async fn receive_event<R: SplitRepository, P: PaymentProcessor>(
    State(state): Shared<R, P>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let outcome = state.service.ingest_event(&body, signature).await?;
    tracing::debug!(?outcome, "event acknowledged");
    Ok(Json(EventAck::received()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Admin
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip(state), fields(email = %req.email))]
pub async fn create_recipient<R: SplitRepository, P: PaymentProcessor>(
    State(state): Shared<R, P>,
    Json(req): Json<CreateRecipientRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let recipient = state.service.create_recipient(req).await?;
    Ok((StatusCode::CREATED, Json(recipient)))
}

#[tracing::instrument(skip(state))]
pub async fn list_recipients<R: SplitRepository, P: PaymentProcessor>(
    State(state): Shared<R, P>,
) -> Result<impl IntoResponse, ApiError> {
    let recipients = state.service.list_recipients().await?;
    Ok(Json(recipients))
}

#[tracing::instrument(skip(state), fields(name = %req.name))]
pub async fn create_product<R: SplitRepository, P: PaymentProcessor>(
    State(state): Shared<R, P>,
    Json(req): Json<CreateProductRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let product = state.service.create_product(req).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

#[tracing::instrument(skip(state, req), fields(product_id = %id))]
pub async fn create_rule<R: SplitRepository, P: PaymentProcessor>(
    State(state): Shared<R, P>,
    Path(id): Path<String>,
    Json(req): Json<CreateTransferRuleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let product_id: ProductId = parse_id(&id, "product")?;
    let rule = state.service.create_rule(product_id, req).await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

#[tracing::instrument(skip(state), fields(product_id = %id))]
pub async fn list_rules<R: SplitRepository, P: PaymentProcessor>(
    State(state): Shared<R, P>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let product_id: ProductId = parse_id(&id, "product")?;
    let rules = state.service.list_rules(product_id).await?;
    Ok(Json(rules))
}

#[tracing::instrument(skip(state), fields(rule_id = %id, is_active = req.is_active))]
pub async fn set_rule_active<R: SplitRepository, P: PaymentProcessor>(
    State(state): Shared<R, P>,
    Path(id): Path<String>,
    Json(req): Json<SetRuleActiveRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let rule_id: TransferRuleId = parse_id(&id, "transfer rule")?;
    let rule = state.service.set_rule_active(rule_id, req.is_active).await?;
    Ok(Json(rule))
}

#[derive(Debug, Deserialize)]
pub struct ListPaymentsQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

#[tracing::instrument(skip(state))]
pub async fn list_payments<R: SplitRepository, P: PaymentProcessor>(
    State(state): Shared<R, P>,
    Query(query): Query<ListPaymentsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let payments = state.service.list_payments(query.limit).await?;
    Ok(Json(payments))
}

/// Operator trigger that resumes the transfer pass of a COMPLETED payment.
#[tracing::instrument(skip(state), fields(payment_id = %id))]
pub async fn execute_transfers<R: SplitRepository, P: PaymentProcessor>(
    State(state): Shared<R, P>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let payment_id: PaymentId = parse_id(&id, "payment")?;
    let summary = state.service.run_transfer_pass(payment_id).await?;
    Ok(Json(summary))
}
