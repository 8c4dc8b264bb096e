//! Transfer domain model: the audited outcome of applying one rule to one payment.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::catalog::{RecipientId, TransferRuleId, TransferType};
use super::money::Currency;
use super::payment::PaymentId;
use super::split::TransferCalculation;
use crate::error::DomainError;

define_id!(
    /// Unique identifier for a Transfer.
    TransferId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

impl TransferStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl AsRef<str> for TransferStatus {
    fn as_ref(&self) -> &str {
        match self {
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

impl std::str::FromStr for TransferStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(DomainError::ValidationError(format!(
                "Unknown transfer status: {}",
                other
            ))),
        }
    }
}

/// A realized money movement (or attribution) to one recipient.
///
/// Created PENDING; terminal once COMPLETED or FAILED, after which the row
/// is an immutable audit record.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Transfer {
    pub id: TransferId,
    pub payment_id: PaymentId,
    pub transfer_rule_id: TransferRuleId,
    pub recipient_id: RecipientId,
    pub rule_type: TransferType,
    /// Full-precision calculated amount in major units
    #[schema(value_type = String, example = "44.9985")]
    pub amount: Decimal,
    pub currency: Currency,
    pub status: TransferStatus,
    /// Processor transfer id, present only if money actually moved
    pub external_transfer_id: Option<String>,
    /// Present only on FAILED
    pub error_message: Option<String>,
    pub note: Option<String>,
    pub calculated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
}

impl Transfer {
    /// Creates a PENDING transfer from a split calculation.
    pub fn pending(payment_id: PaymentId, currency: Currency, calc: &TransferCalculation) -> Self {
        Self {
            id: TransferId::new(),
            payment_id,
            transfer_rule_id: calc.transfer_rule_id,
            recipient_id: calc.recipient_id,
            rule_type: calc.rule_type,
            amount: calc.amount,
            currency,
            status: TransferStatus::Pending,
            external_transfer_id: None,
            error_message: None,
            note: None,
            calculated_at: Utc::now(),
            completed_at: None,
            failed_at: None,
        }
    }

    /// Marks the transfer COMPLETED after the processor moved the money.
    pub fn complete(&mut self, external_transfer_id: String) {
        self.status = TransferStatus::Completed;
        self.external_transfer_id = Some(external_transfer_id);
        self.completed_at = Some(Utc::now());
    }

    /// Marks the transfer COMPLETED without any external movement.
    pub fn complete_without_movement(&mut self, note: impl Into<String>) {
        self.status = TransferStatus::Completed;
        self.note = Some(note.into());
        self.completed_at = Some(Utc::now());
    }

    /// Marks the transfer FAILED, keeping the error message verbatim.
    pub fn fail(&mut self, error_message: impl Into<String>) {
        self.status = TransferStatus::Failed;
        self.error_message = Some(error_message.into());
        self.failed_at = Some(Utc::now());
    }
}

/// Aggregate view over the transfers of one payment. Observability only.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransferSummary {
    pub payment_id: PaymentId,
    #[schema(value_type = String, example = "269.997")]
    pub total: Decimal,
    pub completed: usize,
    pub failed: usize,
    pub pending: usize,
    pub transfers: Vec<Transfer>,
}

impl TransferSummary {
    pub fn from_transfers(payment_id: PaymentId, transfers: Vec<Transfer>) -> Self {
        let count = |status: TransferStatus| transfers.iter().filter(|t| t.status == status).count();

        Self {
            payment_id,
            total: transfers.iter().map(|t| t.amount).sum(),
            completed: count(TransferStatus::Completed),
            failed: count(TransferStatus::Failed),
            pending: count(TransferStatus::Pending),
            transfers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn calc(amount: Decimal) -> TransferCalculation {
        TransferCalculation {
            recipient_id: RecipientId::new(),
            recipient_name: "Brand".into(),
            amount,
            rule_type: TransferType::Wholesale,
            transfer_rule_id: TransferRuleId::new(),
            payout_account_id: Some("acct_1".into()),
        }
    }

    #[test]
    fn test_transfer_lifecycle() {
        let mut transfer = Transfer::pending(PaymentId::new(), Currency::USD, &calc(dec!(180)));
        assert_eq!(transfer.status, TransferStatus::Pending);
        assert!(!transfer.status.is_terminal());

        transfer.complete("tr_123".into());
        assert_eq!(transfer.status, TransferStatus::Completed);
        assert_eq!(transfer.external_transfer_id.as_deref(), Some("tr_123"));
        assert!(transfer.completed_at.is_some());
        assert!(transfer.error_message.is_none());
    }

    #[test]
    fn test_failed_transfer_keeps_message() {
        let mut transfer = Transfer::pending(PaymentId::new(), Currency::USD, &calc(dec!(1)));
        transfer.fail("Insufficient platform balance");
        assert_eq!(transfer.status, TransferStatus::Failed);
        assert_eq!(
            transfer.error_message.as_deref(),
            Some("Insufficient platform balance")
        );
        assert!(transfer.failed_at.is_some());
        assert!(transfer.external_transfer_id.is_none());
    }

    #[test]
    fn test_summary_counts() {
        let payment_id = PaymentId::new();
        let mut a = Transfer::pending(payment_id, Currency::USD, &calc(dec!(180)));
        a.complete("tr_a".into());
        let mut b = Transfer::pending(payment_id, Currency::USD, &calc(dec!(44.9985)));
        b.fail("declined");
        let c = Transfer::pending(payment_id, Currency::USD, &calc(dec!(14.9995)));

        let summary = TransferSummary::from_transfers(payment_id, vec![a, b, c]);
        assert_eq!(summary.total, dec!(239.998));
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.pending, 1);
    }
}
