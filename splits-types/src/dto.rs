//! Data Transfer Objects (DTOs) for requests and responses.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{
    Currency, PaymentId, ProductId, RecipientId, RecipientRole, SplitPlan, TransferType,
};

// ─────────────────────────────────────────────────────────────────────────────
// Checkout DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to start a hosted checkout for a product.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateCheckoutRequest {
    pub product_id: ProductId,
    /// Caller-supplied customer reference
    #[schema(example = "customer-42")]
    pub customer_id: String,
    #[serde(default = "default_quantity")]
    #[schema(example = 1, minimum = 1, maximum = 100)]
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

/// Response after a checkout session was created.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CheckoutResponse {
    pub payment_id: PaymentId,
    /// Processor checkout session id
    #[schema(example = "cs_test_123")]
    pub session_id: String,
    /// Hosted checkout page the customer is redirected to
    pub url: String,
    #[schema(value_type = String, example = "299.99")]
    pub amount: Decimal,
    pub currency: Currency,
    /// How the payment will be divided once confirmed
    pub split: SplitPlan,
}

// ─────────────────────────────────────────────────────────────────────────────
// Catalog DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to register a recipient.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateRecipientRequest {
    #[schema(example = "Brand Partner Co")]
    pub name: String,
    #[schema(example = "brand@example.com")]
    pub email: String,
    pub role: RecipientRole,
    /// Processor payout account, omitted for recipients paid internally
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = "acct_brand_partner")]
    pub payout_account_id: Option<String>,
}

/// Request to create a product.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateProductRequest {
    #[schema(example = "Wellness Kit")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[schema(value_type = String, example = "299.99")]
    pub retail_price: Decimal,
    pub creator_id: RecipientId,
}

/// Request to attach a transfer rule to a product.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateTransferRuleRequest {
    pub recipient_id: RecipientId,
    #[schema(example = "Wellness provider commission")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub rule_type: TransferType,
    /// Fixed amount in major units; honored for WHOLESALE rules only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, example = "180.00")]
    pub amount: Option<Decimal>,
    /// Fraction of the payment amount in [0, 1]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, example = "0.15")]
    pub percentage: Option<Decimal>,
    #[serde(default)]
    pub priority: i32,
}

/// Request to activate or deactivate a rule.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SetRuleActiveRequest {
    pub is_active: bool,
}

/// Query parameters of the split preview.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SplitPreviewQuery {
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Webhook & Health DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Acknowledgement returned to the processor for every authentic event.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EventAck {
    pub received: bool,
}

impl EventAck {
    pub fn received() -> Self {
        Self { received: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
    #[schema(example = "ok")]
    pub database: String,
}
