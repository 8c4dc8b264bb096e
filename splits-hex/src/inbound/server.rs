//! HTTP Server configuration and startup.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router,
    http::{HeaderValue, header},
    middleware,
    routing::{get, patch, post},
};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use splits_types::{PaymentProcessor, SplitRepository};

use super::auth::admin_auth_middleware;
use super::handlers::{self, AppState};
use super::rate_limit::{RateLimitState, rate_limit_middleware};
use crate::SplitService;
use crate::openapi::ApiDoc;

/// HTTP Server for the Splits API.
pub struct HttpServer<R: SplitRepository, P: PaymentProcessor> {
    state: Arc<AppState<R, P>>,
    rate_limit: Arc<RateLimitState>,
}

impl<R: SplitRepository, P: PaymentProcessor> HttpServer<R, P> {
    /// Creates a server with in-process rate limits (1000 requests, 200 for
    /// `/api/*`, per 15 minutes).
    ///
    /// `admin_key_hash` is the SHA-256 hex of the admin API key; without it
    /// the admin API refuses every request.
    pub fn new(service: SplitService<R, P>, admin_key_hash: Option<String>) -> Self {
        Self {
            state: Arc::new(AppState {
                service,
                admin_key_hash,
            }),
            rate_limit: Arc::new(RateLimitState::in_memory(
                Duration::from_secs(900),
                1000,
                200,
            )),
        }
    }

    /// Replaces the rate-limit budgets and counter store.
    pub fn with_rate_limit(mut self, rate_limit: RateLimitState) -> Self {
        self.rate_limit = Arc::new(rate_limit);
        self
    }

    /// Builds the Axum router with all routes.
    pub fn router(&self) -> Router {
        // Build HTTP metrics layer (uses globally set MeterProvider)
        let metrics = axum_otel_metrics::HttpMetricsLayerBuilder::new().build();

        let admin = Router::new()
            .route(
                "/recipients",
                post(handlers::create_recipient::<R, P>).get(handlers::list_recipients::<R, P>),
            )
            .route("/products", post(handlers::create_product::<R, P>))
            .route(
                "/products/{id}/rules",
                post(handlers::create_rule::<R, P>).get(handlers::list_rules::<R, P>),
            )
            .route("/rules/{id}", patch(handlers::set_rule_active::<R, P>))
            .route("/payments", get(handlers::list_payments::<R, P>))
            .route(
                "/payments/{id}/transfers/execute",
                post(handlers::execute_transfers::<R, P>),
            )
            .route_layer(middleware::from_fn_with_state(
                self.state.clone(),
                admin_auth_middleware::<R, P>,
            ));

        Router::new()
            .route("/health", get(handlers::health::<R, P>))
            .route(
                "/api/checkout-session",
                post(handlers::create_checkout_session::<R, P>),
            )
            .route("/api/products", get(handlers::list_products::<R, P>))
            .route("/api/products/{id}", get(handlers::get_product::<R, P>))
            .route(
                "/api/products/{id}/split-preview",
                get(handlers::preview_split::<R, P>),
            )
            .route("/api/payments/{id}", get(handlers::get_payment::<R, P>))
            .route(
                "/api/payments/{id}/transfers",
                get(handlers::get_transfer_summary::<R, P>),
            )
            .route("/api/webhook", post(handlers::receive_event::<R, P>))
            .nest("/api/admin", admin)
            .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
            .layer(metrics)
            .layer(middleware::from_fn_with_state(
                self.rate_limit.clone(),
                rate_limit_middleware,
            ))
            .layer(SetResponseHeaderLayer::if_not_present(
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            ))
            .layer(SetResponseHeaderLayer::if_not_present(
                header::X_FRAME_OPTIONS,
                HeaderValue::from_static("DENY"),
            ))
            .layer(SetResponseHeaderLayer::if_not_present(
                header::REFERRER_POLICY,
                HeaderValue::from_static("strict-origin-when-cross-origin"),
            ))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .with_state(self.state.clone())
    }

    /// Runs the server on the given address with graceful shutdown.
    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Server listening on {}", listener.local_addr()?);

        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown...");
}
