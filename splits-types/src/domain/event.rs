//! Inbound processor events.
//!
//! The processor delivers JSON envelopes at least once. Only a closed set of
//! event types drives the payment state machine; every other type is
//! acknowledged and ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::payment::PaymentId;
use crate::error::DomainError;

pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";
pub const PAYMENT_INTENT_SUCCEEDED: &str = "payment_intent.succeeded";
pub const PAYMENT_INTENT_FAILED: &str = "payment_intent.payment_failed";

/// Header carrying `t=<unix>,v1=<hex>` on processor events.
pub const SIGNATURE_HEADER: &str = "Processor-Signature";

/// Raw event envelope as delivered by the processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Processor-assigned event id, stable across redeliveries
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    /// Unix timestamp at which the processor created the event
    #[serde(default)]
    pub created: i64,
    /// Only recognized event types are required to carry `data.object`
    #[serde(default)]
    pub data: EventData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventData {
    #[serde(default)]
    pub object: serde_json::Value,
}

/// Recognized processor events, plus a catch-all for everything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessorEvent {
    /// The customer finished the hosted checkout.
    CheckoutSessionCompleted {
        session_id: String,
        payment_id: PaymentId,
    },
    /// The processor confirmed the funds.
    PaymentSucceeded {
        payment_intent_id: String,
        payment_id: PaymentId,
    },
    /// The processor reported the charge failed.
    PaymentFailed {
        payment_intent_id: String,
        payment_id: PaymentId,
    },
    Unrecognized {
        event_type: String,
    },
}

impl ProcessorEvent {
    /// Maps an envelope onto a recognized event.
    ///
    /// Recognized types must carry the object id and a `payment_id` in the
    /// object's metadata; otherwise the event cannot be routed to a payment.
    pub fn from_envelope(envelope: &EventEnvelope) -> Result<Self, DomainError> {
        let event_type = envelope.event_type.as_str();
        if !matches!(
            event_type,
            CHECKOUT_SESSION_COMPLETED | PAYMENT_INTENT_SUCCEEDED | PAYMENT_INTENT_FAILED
        ) {
            return Ok(Self::Unrecognized {
                event_type: envelope.event_type.clone(),
            });
        }

        let object = &envelope.data.object;
        let object_id = object
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| DomainError::MalformedEvent(format!("{} has no object id", event_type)))?
            .to_string();

        let payment_id = object
            .get("metadata")
            .and_then(|m| m.get("payment_id"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                DomainError::MalformedEvent(format!(
                    "{} {} is missing payment_id metadata",
                    event_type, object_id
                ))
            })?
            .parse::<PaymentId>()
            .map_err(|e| DomainError::MalformedEvent(format!("invalid payment_id: {}", e)))?;

        Ok(match event_type {
            CHECKOUT_SESSION_COMPLETED => Self::CheckoutSessionCompleted {
                session_id: object_id,
                payment_id,
            },
            PAYMENT_INTENT_SUCCEEDED => Self::PaymentSucceeded {
                payment_intent_id: object_id,
                payment_id,
            },
            _ => Self::PaymentFailed {
                payment_intent_id: object_id,
                payment_id,
            },
        })
    }

    /// The payment this event is about, if it is a recognized one.
    pub fn payment_id(&self) -> Option<PaymentId> {
        match self {
            Self::CheckoutSessionCompleted { payment_id, .. }
            | Self::PaymentSucceeded { payment_id, .. }
            | Self::PaymentFailed { payment_id, .. } => Some(*payment_id),
            Self::Unrecognized { .. } => None,
        }
    }
}

/// Processing status of a received event in the inbound event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EventStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl AsRef<str> for EventStatus {
    fn as_ref(&self) -> &str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

impl std::str::FromStr for EventStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(DomainError::ValidationError(format!(
                "Unknown event status: {}",
                other
            ))),
        }
    }
}

/// Entry of the inbound event log, keyed by the processor event id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceivedEvent {
    pub id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: EventStatus,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub attempts: i32,
    pub last_error: Option<String>,
}

impl ReceivedEvent {
    pub fn new(envelope: &EventEnvelope, payload: serde_json::Value) -> Self {
        Self {
            id: envelope.id.clone(),
            event_type: envelope.event_type.clone(),
            payload,
            status: EventStatus::Pending,
            received_at: Utc::now(),
            processed_at: None,
            attempts: 0,
            last_error: None,
        }
    }
}
