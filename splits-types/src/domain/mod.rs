//! Domain models for the payment split service.

#[macro_use]
mod ids;

pub mod catalog;
pub mod event;
pub mod money;
pub mod payment;
pub mod split;
pub mod transfer;

pub use catalog::{
    Product, ProductId, Recipient, RecipientId, RecipientRole, TransferRule, TransferRuleId,
    TransferType,
};
pub use event::{EventData, EventEnvelope, EventStatus, ProcessorEvent, ReceivedEvent};
pub use money::{Currency, from_minor_units, to_minor_units};
pub use payment::{Payment, PaymentId, PaymentStatus};
pub use split::{
    PaymentWithRules, RuleAssignment, SplitPlan, TransferCalculation, calculate_transfers,
};
pub use transfer::{Transfer, TransferId, TransferStatus, TransferSummary};
