//! OpenAPI specification and documentation.

#![allow(dead_code)] // Path functions are only used by utoipa for documentation generation

use splits_types::domain::{
    Currency, Payment, PaymentId, PaymentStatus, Product, ProductId, Recipient, RecipientId,
    RecipientRole, SplitPlan, Transfer, TransferCalculation, TransferId, TransferRule,
    TransferRuleId, TransferStatus, TransferSummary, TransferType,
};
use splits_types::dto::{
    CheckoutResponse, CreateCheckoutRequest, CreateProductRequest, CreateRecipientRequest,
    CreateTransferRuleRequest, EventAck, HealthResponse, SetRuleActiveRequest,
};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
};

// Dummy functions to generate path documentation
// These are not the actual handlers, just for OpenAPI path generation

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service and database are reachable", body = HealthResponse),
        (status = 503, description = "Database unavailable", body = HealthResponse)
    )
)]
async fn health() {}

/// Start a hosted checkout for a product
#[utoipa::path(
    post,
    path = "/api/checkout-session",
    tag = "checkout",
    request_body = CreateCheckoutRequest,
    responses(
        (status = 201, description = "Payment created and checkout session opened", body = CheckoutResponse),
        (status = 400, description = "Invalid request or inactive product"),
        (status = 404, description = "Product not found"),
        (status = 502, description = "Processor refused the checkout session")
    )
)]
async fn create_checkout_session() {}

/// List products
#[utoipa::path(
    get,
    path = "/api/products",
    tag = "catalog",
    responses(
        (status = 200, description = "All products", body = Vec<Product>)
    )
)]
async fn list_products() {}

/// Get product by ID
#[utoipa::path(
    get,
    path = "/api/products/{id}",
    tag = "catalog",
    params(
        ("id" = String, Path, description = "Product ID (UUID)")
    ),
    responses(
        (status = 200, description = "Product found", body = Product),
        (status = 404, description = "Product not found")
    )
)]
async fn get_product() {}

/// Preview how a purchase would be divided
#[utoipa::path(
    get,
    path = "/api/products/{id}/split-preview",
    tag = "catalog",
    params(
        ("id" = String, Path, description = "Product ID (UUID)"),
        ("quantity" = Option<i32>, Query, description = "Units purchased, default 1")
    ),
    responses(
        (status = 200, description = "Calculated split", body = SplitPlan),
        (status = 404, description = "Product not found")
    )
)]
async fn preview_split() {}

/// Get payment by ID
#[utoipa::path(
    get,
    path = "/api/payments/{id}",
    tag = "payments",
    params(
        ("id" = String, Path, description = "Payment ID (UUID)")
    ),
    responses(
        (status = 200, description = "Payment found", body = Payment),
        (status = 404, description = "Payment not found")
    )
)]
async fn get_payment() {}

/// Transfers of a payment with totals per status
#[utoipa::path(
    get,
    path = "/api/payments/{id}/transfers",
    tag = "payments",
    params(
        ("id" = String, Path, description = "Payment ID (UUID)")
    ),
    responses(
        (status = 200, description = "Transfer summary", body = TransferSummary),
        (status = 404, description = "Payment not found")
    )
)]
async fn get_transfer_summary() {}

/// Processor event intake
///
/// Requires a `Processor-Signature: t=<unix>,v1=<hex>` header computed over the raw body.
#[utoipa::path(
    post,
    path = "/api/webhook",
    tag = "events",
    request_body(content = inline(serde_json::Value), description = "Processor event envelope"),
    responses(
        (status = 200, description = "Event authentic and acknowledged", body = EventAck),
        (status = 400, description = "Missing or invalid signature, or malformed body"),
        (status = 503, description = "Event could not be recorded; the processor should redeliver")
    )
)]
async fn receive_event() {}

/// Register a recipient
#[utoipa::path(
    post,
    path = "/api/admin/recipients",
    tag = "admin",
    request_body = CreateRecipientRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Recipient created", body = Recipient),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "Email already registered")
    )
)]
async fn create_recipient() {}

/// List recipients
#[utoipa::path(
    get,
    path = "/api/admin/recipients",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "All recipients", body = Vec<Recipient>),
        (status = 401, description = "Unauthorized")
    )
)]
async fn list_recipients() {}

/// Create a product
#[utoipa::path(
    post,
    path = "/api/admin/products",
    tag = "admin",
    request_body = CreateProductRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Product created", body = Product),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Creator not found")
    )
)]
async fn create_product() {}

/// Attach a transfer rule to a product
#[utoipa::path(
    post,
    path = "/api/admin/products/{id}/rules",
    tag = "admin",
    request_body = CreateTransferRuleRequest,
    security(("bearer_auth" = [])),
    params(
        ("id" = String, Path, description = "Product ID (UUID)")
    ),
    responses(
        (status = 201, description = "Rule created", body = TransferRule),
        (status = 400, description = "Invalid rule or too many active rules"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Product or recipient not found")
    )
)]
async fn create_rule() {}

/// List a product's transfer rules
#[utoipa::path(
    get,
    path = "/api/admin/products/{id}/rules",
    tag = "admin",
    security(("bearer_auth" = [])),
    params(
        ("id" = String, Path, description = "Product ID (UUID)")
    ),
    responses(
        (status = 200, description = "Rules in priority order", body = inline(Vec<serde_json::Value>)),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Product not found")
    )
)]
async fn list_rules() {}

/// Activate or deactivate a transfer rule
#[utoipa::path(
    patch,
    path = "/api/admin/rules/{id}",
    tag = "admin",
    request_body = SetRuleActiveRequest,
    security(("bearer_auth" = [])),
    params(
        ("id" = String, Path, description = "Transfer rule ID (UUID)")
    ),
    responses(
        (status = 200, description = "Rule updated", body = TransferRule),
        (status = 400, description = "Too many active rules"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Rule not found")
    )
)]
async fn set_rule_active() {}

/// List recent payments
#[utoipa::path(
    get,
    path = "/api/admin/payments",
    tag = "admin",
    security(("bearer_auth" = [])),
    params(
        ("limit" = Option<i64>, Query, description = "Maximum payments returned, default 50")
    ),
    responses(
        (status = 200, description = "Payments, newest first", body = Vec<Payment>),
        (status = 401, description = "Unauthorized")
    )
)]
async fn list_payments() {}

/// Run or resume the transfer pass of a completed payment
#[utoipa::path(
    post,
    path = "/api/admin/payments/{id}/transfers/execute",
    tag = "admin",
    security(("bearer_auth" = [])),
    params(
        ("id" = String, Path, description = "Payment ID (UUID)")
    ),
    responses(
        (status = 200, description = "Transfer summary after the pass", body = TransferSummary),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Payment not found"),
        (status = 409, description = "Payment is not COMPLETED")
    )
)]
async fn execute_transfers() {}

/// OpenAPI documentation for the Splits API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Payment Split Service API",
        version = "1.0.0",
        description = "Divides marketplace payments between recipients according to per-product transfer rules and executes the resulting transfers.\n\n## Authentication\n\nAdmin endpoints require the admin API key as a Bearer token:\n\n```\nAuthorization: Bearer <ADMIN_API_KEY>\n```\n\nProcessor events are authenticated by their `Processor-Signature` header instead.",
        license(name = "MIT"),
    ),
    paths(
        health,
        create_checkout_session,
        list_products,
        get_product,
        preview_split,
        get_payment,
        get_transfer_summary,
        receive_event,
        create_recipient,
        list_recipients,
        create_product,
        create_rule,
        list_rules,
        set_rule_active,
        list_payments,
        execute_transfers,
    ),
    components(
        schemas(
            CreateCheckoutRequest,
            CheckoutResponse,
            CreateRecipientRequest,
            CreateProductRequest,
            CreateTransferRuleRequest,
            SetRuleActiveRequest,
            EventAck,
            HealthResponse,
            Recipient,
            RecipientRole,
            Product,
            TransferRule,
            TransferType,
            Payment,
            PaymentStatus,
            Transfer,
            TransferStatus,
            TransferSummary,
            TransferCalculation,
            SplitPlan,
            Currency,
            PaymentId,
            ProductId,
            RecipientId,
            TransferId,
            TransferRuleId,
        )
    ),

    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "checkout", description = "Checkout initiation"),
        (name = "catalog", description = "Products and split previews"),
        (name = "payments", description = "Payment and transfer status"),
        (name = "events", description = "Processor event intake"),
        (name = "admin", description = "Catalog management and transfer operations"),
    )
)]
pub struct ApiDoc;

/// Security scheme modifier for Bearer token authentication.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/health",
            "/api/checkout-session",
            "/api/webhook",
            "/api/admin/payments/{id}/transfers/execute",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }
    }
}
