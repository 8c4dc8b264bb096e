//! HTTP Inbound Adapter
//!
//! Axum-based HTTP server that drives the application layer.

mod auth;
pub mod handlers;
mod rate_limit;
mod server;

pub use handlers::SIGNATURE_HEADER;
pub use rate_limit::{InMemoryRateLimitStore, RateLimitState};
pub use server::HttpServer;
