//! Payment domain model and its lifecycle state machine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::catalog::ProductId;
use super::money::Currency;
use crate::error::DomainError;

define_id!(
    /// Unique identifier for a Payment.
    PaymentId
);

/// Lifecycle of a payment.
///
/// ```text
/// PENDING ──► PROCESSING ──► COMPLETED
///    │             │             │
///    └─────────────┴──► FAILED ◄─┘ (aborted transfer pass only)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl PaymentStatus {
    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Completed, Failed)
        )
    }
}

impl AsRef<str> for PaymentStatus {
    fn as_ref(&self) -> &str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(DomainError::ValidationError(format!(
                "Unknown payment status: {}",
                other
            ))),
        }
    }
}

/// One checkout attempt.
///
/// Created PENDING when checkout begins and only mutated afterwards by
/// processor events. Never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Payment {
    pub id: PaymentId,
    pub product_id: ProductId,
    pub customer_id: String,
    pub quantity: i32,
    /// Total charged, captured at creation
    #[schema(value_type = String, example = "299.99")]
    pub amount: Decimal,
    pub currency: Currency,
    pub status: PaymentStatus,
    /// Latched once every calculated transfer has been attempted
    pub transfers_completed: bool,
    pub checkout_session_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Payment {
    /// Creates a new PENDING payment for `quantity` units at `unit_price`.
    pub fn new(
        product_id: ProductId,
        customer_id: String,
        quantity: i32,
        unit_price: Decimal,
        currency: Currency,
    ) -> Result<Self, DomainError> {
        if quantity < 1 {
            return Err(DomainError::ValidationError(
                "Quantity must be at least 1".into(),
            ));
        }
        let amount = unit_price
            .checked_mul(Decimal::from(quantity))
            .ok_or_else(|| DomainError::AmountOverflow(unit_price.to_string()))?;
        if amount.is_sign_negative() {
            return Err(DomainError::NegativeAmount);
        }

        let now = Utc::now();
        Ok(Self {
            id: PaymentId::new(),
            product_id,
            customer_id,
            quantity,
            amount,
            currency,
            status: PaymentStatus::Pending,
            transfers_completed: false,
            checkout_session_id: None,
            payment_intent_id: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        })
    }

    fn transition(&mut self, next: PaymentStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// PENDING → PROCESSING, recording the checkout session reference.
    pub fn begin_processing(&mut self, session_id: Option<String>) -> Result<(), DomainError> {
        self.transition(PaymentStatus::Processing)?;
        if session_id.is_some() {
            self.checkout_session_id = session_id;
        }
        Ok(())
    }

    /// PROCESSING → COMPLETED, recording the payment intent and completion time.
    pub fn complete(&mut self, payment_intent_id: String) -> Result<(), DomainError> {
        self.transition(PaymentStatus::Completed)?;
        self.payment_intent_id = Some(payment_intent_id);
        self.completed_at = Some(self.updated_at);
        Ok(())
    }

    /// Moves the payment to the sticky FAILED state.
    pub fn fail(&mut self) -> Result<(), DomainError> {
        self.transition(PaymentStatus::Failed)
    }

    /// Whether the payment reached a state no event can leave.
    pub fn is_terminal(&self) -> bool {
        self.status == PaymentStatus::Failed
    }
}
