//! Payment processor port.
//!
//! The processor is the external service that charges customers and moves
//! money to recipients' payout accounts.

use std::collections::BTreeMap;

use crate::domain::Currency;

/// One money-movement call.
#[derive(Debug, Clone)]
pub struct PayoutRequest {
    /// Integer minor units (cents)
    pub amount_minor: i64,
    pub currency: Currency,
    /// Recipient payout account at the processor
    pub destination: String,
    /// Makes retries of the same leg safe; the Transfer id is used
    pub idempotency_key: String,
    pub metadata: BTreeMap<String, String>,
}

/// Request for a hosted checkout page.
#[derive(Debug, Clone)]
pub struct CheckoutSessionRequest {
    pub product_name: String,
    pub description: String,
    /// Unit price in minor units
    pub unit_amount_minor: i64,
    pub quantity: i32,
    pub currency: Currency,
    pub success_url: String,
    pub cancel_url: String,
    /// Copied onto both the session and its payment intent
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// Errors reported by the processor adapter.
///
/// The message is stored verbatim on failed transfers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessorError {
    /// The processor answered and refused the request.
    #[error("{0}")]
    Rejected(String),

    /// The processor could not be reached or timed out.
    #[error("Processor unavailable: {0}")]
    Unavailable(String),
}

#[async_trait::async_trait]
pub trait PaymentProcessor: Send + Sync + 'static {
    /// Moves money to a payout account, returning the processor transfer id.
    async fn create_transfer(&self, req: PayoutRequest) -> Result<String, ProcessorError>;

    /// Creates a hosted checkout session.
    async fn create_checkout_session(
        &self,
        req: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ProcessorError>;
}
