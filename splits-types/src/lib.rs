//! # Splits Types
//!
//! Domain types and port traits for the payment split service.
//! This crate has ZERO external IO dependencies - only data structures,
//! business rules, and trait definitions.
//!
//! ## Architecture
//!
//! This crate represents the **innermost core** of the hexagonal architecture:
//! - `domain/` - Pure domain types (Money, Payment, TransferRule, Transfer) and the split calculator
//! - `ports/` - Trait definitions that adapters must implement
//! - `dto/` - Data Transfer Objects for API boundaries
//! - `error/` - Domain and application error types

pub mod domain;
pub mod dto;
pub mod error;
pub mod ports;

// Re-export commonly used types
pub use domain::{
    Currency, EventEnvelope, EventStatus, Payment, PaymentId, PaymentStatus, PaymentWithRules,
    ProcessorEvent, Product, ProductId, ReceivedEvent, Recipient, RecipientId, RecipientRole,
    RuleAssignment, SplitPlan, Transfer, TransferCalculation, TransferId, TransferRule,
    TransferRuleId, TransferStatus, TransferSummary, TransferType, calculate_transfers,
    from_minor_units, to_minor_units,
};
pub use dto::*;
pub use error::{AppError, DomainError, RepoError};
pub use ports::{
    CheckoutSession, CheckoutSessionRequest, EventRecord, PaymentProcessor, PayoutRequest,
    ProcessorError, RateLimitStore, SignatureVerifier, SplitRepository,
};
