//! # Splits Hex
//!
//! Application service layer plus the HTTP adapters of the payment split service.
//!
//! ## Architecture
//!
//! - `service` - catalog, checkout and queries
//! - `executor` / `state_machine` / `ingestor` - the payment flow driven by processor events
//! - `inbound/` - HTTP adapter (Axum server)
//! - `outbound/` - HTTP adapter towards the payment processor
//!
//! The service is generic over `R: SplitRepository` and `P: PaymentProcessor`,
//! allowing different repository and processor implementations to be injected.

mod executor;
mod ingestor;
mod state_machine;

pub mod inbound;
pub mod openapi;
pub mod outbound;
pub mod service;


pub use ingestor::IngestOutcome;
pub use service::{ServiceConfig, SplitService, TransferLimits};
pub use state_machine::TransitionOutcome;
