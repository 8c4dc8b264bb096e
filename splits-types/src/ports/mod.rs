//! Port traits (interfaces for adapters).
//!
//! These are the contracts that adapters must implement.
//! The application layer depends on these traits, not concrete implementations.

mod processor;
mod rate_limit;
mod repository;
mod verifier;

pub use processor::{
    CheckoutSession, CheckoutSessionRequest, PaymentProcessor, PayoutRequest, ProcessorError,
};
pub use rate_limit::RateLimitStore;
pub use repository::{EventRecord, SplitRepository};
pub use verifier::SignatureVerifier;
