//! HTTP Outbound Adapter
//!
//! Implementations of the payment processor port.

mod processor;

pub use processor::{DryRunProcessor, HttpPaymentProcessor, ProcessorConfig};
