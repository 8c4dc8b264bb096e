//! Repository port trait.
//!
//! This is the primary port in our hexagonal architecture.
//! Adapters (Postgres, SQLite, in-memory mocks) implement this trait.

use crate::domain::{
    EventStatus, Payment, PaymentId, PaymentStatus, PaymentWithRules, Product, ProductId,
    ReceivedEvent, Recipient, RecipientId, RuleAssignment, Transfer, TransferRule, TransferRuleId,
};
use crate::error::RepoError;

/// Outcome of recording an inbound event in the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventRecord {
    /// First delivery of this event id.
    Inserted,
    /// The event id was already logged with the given status.
    Duplicate(EventStatus),
}

/// Storage port for the catalog, payments, transfers and the inbound event log.
///
/// Payment status changes go through [`SplitRepository::transition_payment`],
/// a compare-and-set on the stored status, so concurrent deliveries of the
/// same event cannot both win a transition.
#[async_trait::async_trait]
pub trait SplitRepository: Send + Sync + 'static {
    // ─────────────────────────────────────────────────────────────────────────────
    // Catalog Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Stores a new recipient. A duplicate email is a conflict.
    async fn create_recipient(&self, recipient: Recipient) -> Result<Recipient, RepoError>;

    async fn get_recipient(&self, id: RecipientId) -> Result<Option<Recipient>, RepoError>;

    async fn list_recipients(&self) -> Result<Vec<Recipient>, RepoError>;

    async fn create_product(&self, product: Product) -> Result<Product, RepoError>;

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepoError>;

    async fn list_products(&self) -> Result<Vec<Product>, RepoError>;

    /// Stores an active rule unless its product already has `max_active`
    /// active rules ([`RepoError::LimitReached`]). The count and the insert
    /// are one atomic step.
    async fn create_rule(
        &self,
        rule: TransferRule,
        max_active: i64,
    ) -> Result<TransferRule, RepoError>;

    async fn get_rule(&self, id: TransferRuleId) -> Result<Option<TransferRule>, RepoError>;

    /// Flips `is_active`, the only mutation a rule ever sees.
    ///
    /// Activation is refused with [`RepoError::LimitReached`] when the
    /// product already has `max_active` active rules, checked atomically with
    /// the update.
    async fn set_rule_active(
        &self,
        id: TransferRuleId,
        is_active: bool,
        max_active: i64,
    ) -> Result<Option<TransferRule>, RepoError>;

    /// All rules of a product, active or not, joined with recipient data and
    /// ordered by priority.
    async fn list_rules_for_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<RuleAssignment>, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Payment Operations
    // ─────────────────────────────────────────────────────────────────────────────

    async fn create_payment(&self, payment: Payment) -> Result<Payment, RepoError>;

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>, RepoError>;

    async fn list_payments(&self, limit: i64) -> Result<Vec<Payment>, RepoError>;

    /// Loads a payment with its product's rules in one consistent read.
    async fn get_payment_with_rules(
        &self,
        id: PaymentId,
    ) -> Result<Option<PaymentWithRules>, RepoError>;

    /// Persists `payment` only if the stored status is still `expected`.
    ///
    /// Returns `false` when another writer moved the payment first.
    async fn transition_payment(
        &self,
        payment: &Payment,
        expected: PaymentStatus,
    ) -> Result<bool, RepoError>;

    /// Latches `transfers_completed`; never reset afterwards.
    async fn mark_transfers_completed(&self, id: PaymentId) -> Result<(), RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Transfer Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Stores the PENDING transfers of one pass, all or none. A transfer
    /// already recorded for the same payment and rule is a conflict.
    async fn create_transfers(&self, transfers: &[Transfer]) -> Result<(), RepoError>;

    /// Writes the terminal outcome of a PENDING transfer.
    async fn update_transfer(&self, transfer: &Transfer) -> Result<(), RepoError>;

    async fn list_transfers_for_payment(
        &self,
        payment_id: PaymentId,
    ) -> Result<Vec<Transfer>, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Inbound Event Log
    // ─────────────────────────────────────────────────────────────────────────────

    /// Logs an event by its processor id unless it was seen before.
    async fn record_event(&self, event: &ReceivedEvent) -> Result<EventRecord, RepoError>;

    /// Moves a logged event to `status`. Entering PROCESSING counts an attempt.
    async fn update_event_status(
        &self,
        id: &str,
        status: EventStatus,
        last_error: Option<String>,
    ) -> Result<(), RepoError>;

    /// Cheap connectivity probe for health checks.
    async fn ping(&self) -> Result<(), RepoError>;
}
