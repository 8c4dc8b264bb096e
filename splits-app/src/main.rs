//! # Splits Application
//!
//! Binary that wires together all the components:
//! - Load configuration from environment
//! - Initialize the repository adapter
//! - Pick the processor adapter (live or dry-run)
//! - Create the split service
//! - Start the HTTP server

mod config;

use std::sync::Arc;

use opentelemetry::global;
use opentelemetry_sdk::{propagation::TraceContextPropagator, trace as sdktrace};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use splits_hex::{
    SplitService,
    inbound::{HttpServer, RateLimitState},
    outbound::{DryRunProcessor, HttpPaymentProcessor, ProcessorConfig},
};
use splits_repo::{
    HmacSignatureVerifier, Repo, SharedRateLimitStore, build_repo, security::hash_api_key,
};
use splits_types::PaymentProcessor;

use config::{Config, ProcessorMode};

fn init_tracer() -> anyhow::Result<(sdktrace::Tracer, sdktrace::SdkTracerProvider)> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    // Use gRPC exporter with batch processing (non-blocking)
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .build()?;

    let provider = sdktrace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .build();

    global::set_tracer_provider(provider.clone());

    use opentelemetry::trace::TracerProvider as _;
    Ok((provider.tracer("splits-service"), provider))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize OpenTelemetry tracing
    let (otel_tracer, otel_provider) = init_tracer()?;
    let telemetry = tracing_opentelemetry::layer().with_tracer(otel_tracer);

    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,splits_app=debug,splits_hex=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry)
        .init();

    // Load configuration
    let config = Config::from_env()?;

    tracing::info!(
        port = config.port,
        env = ?config.app_env,
        currency = %config.service.currency,
        "Starting splits server"
    );

    // Build repository (handles connection and migration)
    let repo = build_repo(&config.database_url).await?;

    match &config.processor {
        ProcessorMode::Live {
            api_url,
            secret_key,
        } => {
            let processor = HttpPaymentProcessor::new(ProcessorConfig {
                api_url: api_url.clone(),
                secret_key: secret_key.clone(),
                timeout: config.processor_timeout,
            })?;
            tracing::info!(api_url = %api_url, "Using live payment processor");
            serve(&config, repo, processor).await?;
        }
        ProcessorMode::DryRun => {
            tracing::warn!("PROCESSOR_MODE=dry-run: no money will move");
            let processor = DryRunProcessor::new(config.service.app_url.clone());
            serve(&config, repo, processor).await?;
        }
    }

    // Ensure traces are flushed before exit
    let _ = otel_provider.shutdown();
    Ok(())
}

/// Creates the service around `processor` and runs the HTTP server until shutdown.
async fn serve<P: PaymentProcessor>(
    config: &Config,
    repo: Repo,
    processor: P,
) -> anyhow::Result<()> {
    let rate_limit = if config.rate_limit.shared {
        tracing::info!("Rate limit counters shared through the database");
        RateLimitState {
            store: Arc::new(SharedRateLimitStore::new(
                repo.clone(),
                config.rate_limit.window,
            )),
            max_requests: config.rate_limit.max_requests,
            api_max_requests: config.rate_limit.api_max_requests,
        }
    } else {
        RateLimitState::in_memory(
            config.rate_limit.window,
            config.rate_limit.max_requests,
            config.rate_limit.api_max_requests,
        )
    };

    let admin_key_hash = config.admin_api_key.as_deref().map(hash_api_key);
    if admin_key_hash.is_none() {
        tracing::warn!("ADMIN_API_KEY not set, admin API is disabled");
    }

    let service = SplitService::new(
        repo,
        processor,
        HmacSignatureVerifier::new(config.webhook_secret.clone()),
        config.service.clone(),
    );

    let server = HttpServer::new(service, admin_key_hash).with_rate_limit(rate_limit);
    let addr = format!("0.0.0.0:{}", config.port);

    server.run(&addr).await
}
