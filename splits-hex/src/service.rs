//! Split Application Service
//!
//! Orchestrates domain operations through the repository and processor ports.
//! Contains NO infrastructure logic - pure business orchestration.
//!
//! The service is split across files by concern:
//! - this file: configuration, catalog, checkout and queries
//! - `executor.rs`: the transfer pass
//! - `state_machine.rs`: payment transitions
//! - `ingestor.rs`: inbound processor events

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use splits_types::{
    AppError, CheckoutResponse, CheckoutSessionRequest, CreateCheckoutRequest,
    CreateProductRequest, CreateRecipientRequest, CreateTransferRuleRequest, Currency,
    DomainError, Payment, PaymentId, PaymentProcessor, Product, ProductId, Recipient,
    RecipientId, RuleAssignment, SignatureVerifier, SplitPlan, SplitRepository, TransferRule,
    TransferRuleId, TransferSummary, calculate_transfers, to_minor_units,
};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Bounds applied to legs that move money externally.
#[derive(Debug, Clone)]
pub struct TransferLimits {
    pub min_amount: Decimal,
    pub max_amount: Decimal,
    /// Cap on active rules per product, and so on legs per payment
    pub max_transfers_per_payment: usize,
}

impl Default for TransferLimits {
    fn default() -> Self {
        Self {
            min_amount: dec!(0.50),
            max_amount: dec!(10000.00),
            max_transfers_per_payment: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub currency: Currency,
    /// Public base URL used for checkout redirects
    pub app_url: String,
    pub limits: TransferLimits,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            currency: Currency::USD,
            app_url: "http://localhost:3000".to_string(),
            limits: TransferLimits::default(),
        }
    }
}

const MAX_CUSTOMER_ID_LEN: usize = 100;
const MAX_QUANTITY: i32 = 100;

// ─────────────────────────────────────────────────────────────────────────────
// Service
// ─────────────────────────────────────────────────────────────────────────────

/// Application service for payment splitting.
///
/// Generic over `R: SplitRepository` and `P: PaymentProcessor` - adapters are
/// injected at compile time, so tests run against in-memory mocks.
pub struct SplitService<R: SplitRepository, P: PaymentProcessor> {
    pub(crate) repo: R,
    pub(crate) processor: P,
    pub(crate) verifier: Box<dyn SignatureVerifier>,
    pub(crate) config: ServiceConfig,
}

impl<R: SplitRepository, P: PaymentProcessor> SplitService<R, P> {
    pub fn new(
        repo: R,
        processor: P,
        verifier: impl SignatureVerifier,
        config: ServiceConfig,
    ) -> Self {
        Self {
            repo,
            processor,
            verifier: Box::new(verifier),
            config,
        }
    }

    /// Returns a reference to the underlying repository.
    pub fn repo(&self) -> &R {
        &self.repo
    }

    /// Returns a reference to the processor adapter.
    pub fn processor(&self) -> &P {
        &self.processor
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Catalog Operations
    // ─────────────────────────────────────────────────────────────────────────────

    #[tracing::instrument(skip(self, req), fields(email = %req.email, role = %req.role))]
    pub async fn create_recipient(
        &self,
        req: CreateRecipientRequest,
    ) -> Result<Recipient, AppError> {
        let recipient = Recipient::new(req.name, req.email, req.role, req.payout_account_id)?;
        let recipient = self.repo.create_recipient(recipient).await?;
        tracing::info!(recipient_id = %recipient.id, "recipient created");
        Ok(recipient)
    }

    pub async fn get_recipient(&self, id: RecipientId) -> Result<Recipient, AppError> {
        self.repo
            .get_recipient(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Recipient {}", id)))
    }

    pub async fn list_recipients(&self) -> Result<Vec<Recipient>, AppError> {
        self.repo.list_recipients().await.map_err(Into::into)
    }

    #[tracing::instrument(skip(self, req), fields(name = %req.name))]
    pub async fn create_product(&self, req: CreateProductRequest) -> Result<Product, AppError> {
        let creator = self.get_recipient(req.creator_id).await?;
        let product = Product::new(req.name, req.description, req.retail_price, creator.id)?;
        let product = self.repo.create_product(product).await?;
        tracing::info!(product_id = %product.id, price = %product.retail_price, "product created");
        Ok(product)
    }

    pub async fn get_product(&self, id: ProductId) -> Result<Product, AppError> {
        self.repo
            .get_product(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Product {}", id)))
    }

    pub async fn list_products(&self) -> Result<Vec<Product>, AppError> {
        self.repo.list_products().await.map_err(Into::into)
    }

    /// Attaches a new active rule to a product.
    #[tracing::instrument(skip(self, req), fields(product_id = %product_id, rule_type = %req.rule_type))]
    pub async fn create_rule(
        &self,
        product_id: ProductId,
        req: CreateTransferRuleRequest,
    ) -> Result<TransferRule, AppError> {
        let product = self.get_product(product_id).await?;
        let recipient = self.get_recipient(req.recipient_id).await?;

        let rule = TransferRule::new(
            product.id,
            recipient.id,
            req.name,
            req.description,
            req.rule_type,
            req.amount,
            req.percentage,
            req.priority,
        )?;

        let rule = self
            .repo
            .create_rule(rule, self.max_active_rules())
            .await?;
        tracing::info!(rule_id = %rule.id, priority = rule.priority, "transfer rule created");
        Ok(rule)
    }

    /// All rules of a product, active or not, in priority order.
    pub async fn list_rules(&self, product_id: ProductId) -> Result<Vec<RuleAssignment>, AppError> {
        let product = self.get_product(product_id).await?;
        self.repo
            .list_rules_for_product(product.id)
            .await
            .map_err(Into::into)
    }

    /// Activates or deactivates a rule; rules are otherwise immutable.
    #[tracing::instrument(skip(self), fields(rule_id = %id))]
    pub async fn set_rule_active(
        &self,
        id: TransferRuleId,
        is_active: bool,
    ) -> Result<TransferRule, AppError> {
        let rule = self
            .repo
            .get_rule(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Transfer rule {}", id)))?;

        if rule.is_active == is_active {
            return Ok(rule);
        }

        let rule = self
            .repo
            .set_rule_active(id, is_active, self.max_active_rules())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Transfer rule {}", id)))?;
        tracing::info!(is_active, "transfer rule toggled");
        Ok(rule)
    }

    /// Active rules a product may carry, one transfer each per payment.
    fn max_active_rules(&self) -> i64 {
        self.config.limits.max_transfers_per_payment as i64
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Checkout & Queries
    // ─────────────────────────────────────────────────────────────────────────────

    /// Creates a PENDING payment and a hosted checkout session for it.
    ///
    /// If the processor refuses the session the payment is left PENDING and
    /// abandoned; the caller gets an upstream error.
    #[tracing::instrument(skip(self, req), fields(product_id = %req.product_id, quantity = req.quantity))]
    pub async fn create_checkout_session(
        &self,
        req: CreateCheckoutRequest,
    ) -> Result<CheckoutResponse, AppError> {
        let customer_len = req.customer_id.trim().chars().count();
        if customer_len == 0 || customer_len > MAX_CUSTOMER_ID_LEN {
            return Err(AppError::BadRequest(format!(
                "customer_id must be between 1 and {} characters",
                MAX_CUSTOMER_ID_LEN
            )));
        }
        if !(1..=MAX_QUANTITY).contains(&req.quantity) {
            return Err(AppError::BadRequest(format!(
                "quantity must be between 1 and {}",
                MAX_QUANTITY
            )));
        }

        let product = self.get_product(req.product_id).await?;
        if !product.is_active {
            return Err(AppError::BadRequest(format!(
                "Product {} is not available",
                product.id
            )));
        }

        let payment = Payment::new(
            product.id,
            req.customer_id,
            req.quantity,
            product.retail_price,
            self.config.currency,
        )?;
        let unit_amount_minor = to_minor_units(product.retail_price)?;
        let payment = self.repo.create_payment(payment).await?;

        let rules = self.repo.list_rules_for_product(product.id).await?;
        let split = calculate_transfers(&payment, &rules);

        let metadata = BTreeMap::from([
            ("payment_id".to_string(), payment.id.to_string()),
            ("product_id".to_string(), product.id.to_string()),
            ("customer_id".to_string(), payment.customer_id.clone()),
        ]);

        let session = self
            .processor
            .create_checkout_session(CheckoutSessionRequest {
                product_name: product.name.clone(),
                description: product.description.clone(),
                unit_amount_minor,
                quantity: payment.quantity,
                currency: payment.currency,
                success_url: format!(
                    "{}/success?session_id={{CHECKOUT_SESSION_ID}}",
                    self.config.app_url
                ),
                cancel_url: format!("{}/products/{}", self.config.app_url, product.id),
                metadata,
            })
            .await
            .map_err(|e| {
                tracing::warn!(payment_id = %payment.id, error = %e, "checkout session creation failed; payment left pending");
                AppError::Upstream(e.to_string())
            })?;

        tracing::info!(payment_id = %payment.id, session_id = %session.id, amount = %payment.amount, "checkout session created");

        Ok(CheckoutResponse {
            payment_id: payment.id,
            session_id: session.id,
            url: session.url,
            amount: payment.amount,
            currency: payment.currency,
            split,
        })
    }

    /// Shows how a hypothetical purchase would be divided. Nothing is stored.
    pub async fn preview_split(
        &self,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<SplitPlan, AppError> {
        let product = self.get_product(product_id).await?;
        let payment = Payment::new(
            product.id,
            "preview".to_string(),
            quantity,
            product.retail_price,
            self.config.currency,
        )?;
        let rules = self.repo.list_rules_for_product(product.id).await?;
        Ok(calculate_transfers(&payment, &rules))
    }

    pub async fn get_payment(&self, id: PaymentId) -> Result<Payment, AppError> {
        self.repo
            .get_payment(id)
            .await?
            .ok_or_else(|| DomainError::PaymentNotFound(id).into())
    }

    pub async fn list_payments(&self, limit: i64) -> Result<Vec<Payment>, AppError> {
        self.repo
            .list_payments(limit.clamp(1, 500))
            .await
            .map_err(Into::into)
    }

    /// Aggregate view of a payment's transfers. Observability only.
    pub async fn get_transfer_summary(
        &self,
        payment_id: PaymentId,
    ) -> Result<TransferSummary, AppError> {
        let payment = self.get_payment(payment_id).await?;
        let transfers = self.repo.list_transfers_for_payment(payment.id).await?;
        Ok(TransferSummary::from_transfers(payment.id, transfers))
    }

    /// Probes the data store.
    pub async fn health(&self) -> Result<(), AppError> {
        self.repo.ping().await.map_err(Into::into)
    }
}
