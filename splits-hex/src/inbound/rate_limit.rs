//! Rate limiting middleware using Governor.
//!
//! Requests are counted per `client-ip:path`. API routes get a tighter
//! budget than the rest; processor event intake and `/health` are exempt.

use std::{net::SocketAddr, num::NonZeroU32, sync::Arc, time::Duration};

use axum::{
    Json,
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderValue, Request, StatusCode, header::RETRY_AFTER},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use governor::{
    Quota, RateLimiter,
    clock::{Clock, DefaultClock},
    state::{InMemoryState, NotKeyed},
};
use serde_json::json;

use splits_types::{RateLimitStore, RepoError};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// In-process counter store; limits are per instance.
pub struct InMemoryRateLimitStore {
    /// Per-key rate limiters
    limiters: DashMap<String, Arc<DirectLimiter>>,
    window: Duration,
    clock: DefaultClock,
}

impl InMemoryRateLimitStore {
    pub fn new(window: Duration) -> Self {
        Self {
            limiters: DashMap::new(),
            window,
            clock: DefaultClock::default(),
        }
    }

    /// `max_requests` per window, all of which may arrive in one burst.
    fn quota(&self, max_requests: u32) -> Quota {
        let burst = NonZeroU32::new(max_requests).unwrap_or(NonZeroU32::MIN);
        Quota::with_period(self.window / burst.get())
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst)
    }
}

#[async_trait::async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn hit(&self, key: &str, max_requests: u32) -> Result<Option<u64>, RepoError> {
        let limiter = self
            .limiters
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(RateLimiter::direct(self.quota(max_requests))))
            .clone();

        match limiter.check() {
            Ok(()) => Ok(None),
            Err(not_until) => {
                let wait = not_until.wait_time_from(self.clock.now());
                Ok(Some(wait.as_secs().max(1)))
            }
        }
    }
}

/// Middleware state: the counter store and the per-class budgets.
pub struct RateLimitState {
    pub store: Arc<dyn RateLimitStore>,
    pub max_requests: u32,
    pub api_max_requests: u32,
}

impl RateLimitState {
    pub fn in_memory(window: Duration, max_requests: u32, api_max_requests: u32) -> Self {
        Self {
            store: Arc::new(InMemoryRateLimitStore::new(window)),
            max_requests,
            api_max_requests,
        }
    }
}

fn is_exempt(path: &str) -> bool {
    matches!(path, "/health" | "/api/webhook")
}

/// First hop of `X-Forwarded-For`, else the peer address.
fn client_ip(request: &Request<Body>) -> String {
    if let Some(forwarded) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return forwarded.to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Rate limiting middleware.
pub async fn rate_limit_middleware(
    State(limits): State<Arc<RateLimitState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if is_exempt(&path) {
        return next.run(request).await;
    }

    let max_requests = if path.starts_with("/api/") {
        limits.api_max_requests
    } else {
        limits.max_requests
    };
    let key = format!("{}:{}", client_ip(&request), path);

    match limits.store.hit(&key, max_requests).await {
        Ok(None) => next.run(request).await,
        Ok(Some(retry_after)) => {
            tracing::info!(key = %key, retry_after, "rate limit exceeded");
            too_many_requests(retry_after)
        }
        Err(e) => {
            // Counting is best effort; an unreachable store must not take the API down.
            tracing::warn!(error = %e, "rate limit store unavailable, allowing request");
            next.run(request).await
        }
    }
}

fn too_many_requests(retry_after: u64) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({
            "error": "Too many requests. Please try again later.",
            "code": 429
        })),
    )
        .into_response();
    response
        .headers_mut()
        .insert(RETRY_AFTER, HeaderValue::from(retry_after));
    response
}
