//! Shared database row types with feature-gated column types.
//!
//! PostgreSQL stores ids as `UUID`, timestamps as `TIMESTAMPTZ` and money as
//! `NUMERIC`. SQLite stores all three as `TEXT` and they are parsed here.

use sqlx::FromRow;

use splits_types::{
    Currency, Payment, PaymentId, PaymentStatus, Product, ProductId, Recipient, RecipientId,
    RecipientRole, RepoError, RuleAssignment, Transfer, TransferId, TransferRule, TransferRuleId,
    TransferStatus, TransferType,
};

pub use columns::{Amount, Id, Timestamp};

// ─────────────────────────────────────────────────────────────────────────────
// Feature-gated column types
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(feature = "postgres")]
mod columns {
    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;
    use splits_types::RepoError;
    use uuid::Uuid;

    pub type Id = Uuid;
    pub type Timestamp = DateTime<Utc>;
    pub type Amount = Decimal;

    pub fn id(v: Id) -> Result<Uuid, RepoError> {
        Ok(v)
    }

    pub fn timestamp(v: Timestamp) -> Result<DateTime<Utc>, RepoError> {
        Ok(v)
    }

    pub fn amount(v: Amount) -> Result<Decimal, RepoError> {
        Ok(v)
    }
}

#[cfg(not(feature = "postgres"))]
mod columns {
    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;
    use splits_types::RepoError;
    use std::str::FromStr;
    use uuid::Uuid;

    pub type Id = String;
    pub type Timestamp = String;
    pub type Amount = String;

    pub fn id(v: Id) -> Result<Uuid, RepoError> {
        Uuid::parse_str(&v).map_err(|e| RepoError::Database(e.to_string()))
    }

    pub fn timestamp(v: Timestamp) -> Result<DateTime<Utc>, RepoError> {
        DateTime::parse_from_rfc3339(&v)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| RepoError::Database(e.to_string()))
    }

    pub fn amount(v: Amount) -> Result<Decimal, RepoError> {
        Decimal::from_str(&v).map_err(|e| RepoError::Database(e.to_string()))
    }
}

use columns::{amount, id, timestamp};

fn optional<T, U>(
    value: Option<T>,
    convert: fn(T) -> Result<U, RepoError>,
) -> Result<Option<U>, RepoError> {
    value.map(convert).transpose()
}

/// Parses a stored enum label, reporting corrupt rows as database errors.
fn label<T>(s: &str) -> Result<T, RepoError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    s.parse::<T>()
        .map_err(|e| RepoError::Database(e.to_string()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Database row structs (derive FromRow for automatic mapping)
// ─────────────────────────────────────────────────────────────────────────────

/// Recipient row from database.
#[derive(FromRow)]
pub struct DbRecipient {
    pub id: Id,
    pub name: String,
    pub email: String,
    pub role: String,
    pub payout_account_id: Option<String>,
    pub created_at: Timestamp,
}

/// Product row from database.
#[derive(FromRow)]
pub struct DbProduct {
    pub id: Id,
    pub name: String,
    pub description: String,
    pub retail_price: Amount,
    pub creator_id: Id,
    pub is_active: bool,
    pub created_at: Timestamp,
}

/// Transfer rule row from database.
#[derive(FromRow)]
pub struct DbTransferRule {
    pub id: Id,
    pub product_id: Id,
    pub recipient_id: Id,
    pub name: String,
    pub description: Option<String>,
    pub rule_type: String,
    pub amount: Option<Amount>,
    pub percentage: Option<Amount>,
    pub priority: i32,
    pub is_active: bool,
    pub created_at: Timestamp,
}

/// Transfer rule joined with its recipient.
#[derive(FromRow)]
pub struct DbRuleAssignment {
    #[sqlx(flatten)]
    pub rule: DbTransferRule,
    pub recipient_name: String,
    pub payout_account_id: Option<String>,
}

/// Payment row from database.
#[derive(FromRow)]
pub struct DbPayment {
    pub id: Id,
    pub product_id: Id,
    pub customer_id: String,
    pub quantity: i32,
    pub amount: Amount,
    pub currency: String,
    pub status: String,
    pub transfers_completed: bool,
    pub checkout_session_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

/// Transfer row from database.
#[derive(FromRow)]
pub struct DbTransfer {
    pub id: Id,
    pub payment_id: Id,
    pub transfer_rule_id: Id,
    pub recipient_id: Id,
    pub rule_type: String,
    pub amount: Amount,
    pub currency: String,
    pub status: String,
    pub external_transfer_id: Option<String>,
    pub error_message: Option<String>,
    pub note: Option<String>,
    pub calculated_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub failed_at: Option<Timestamp>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Domain conversion
// ─────────────────────────────────────────────────────────────────────────────

impl DbRecipient {
    pub fn into_domain(self) -> Result<Recipient, RepoError> {
        Ok(Recipient {
            id: RecipientId::from_uuid(id(self.id)?),
            name: self.name,
            email: self.email,
            role: label::<RecipientRole>(&self.role)?,
            payout_account_id: self.payout_account_id,
            created_at: timestamp(self.created_at)?,
        })
    }
}

impl DbProduct {
    pub fn into_domain(self) -> Result<Product, RepoError> {
        Ok(Product {
            id: ProductId::from_uuid(id(self.id)?),
            name: self.name,
            description: self.description,
            retail_price: amount(self.retail_price)?,
            creator_id: RecipientId::from_uuid(id(self.creator_id)?),
            is_active: self.is_active,
            created_at: timestamp(self.created_at)?,
        })
    }
}

impl DbTransferRule {
    pub fn into_domain(self) -> Result<TransferRule, RepoError> {
        Ok(TransferRule {
            id: TransferRuleId::from_uuid(id(self.id)?),
            product_id: ProductId::from_uuid(id(self.product_id)?),
            recipient_id: RecipientId::from_uuid(id(self.recipient_id)?),
            name: self.name,
            description: self.description,
            rule_type: label::<TransferType>(&self.rule_type)?,
            amount: optional(self.amount, amount)?,
            percentage: optional(self.percentage, amount)?,
            priority: self.priority,
            is_active: self.is_active,
            created_at: timestamp(self.created_at)?,
        })
    }
}

impl DbRuleAssignment {
    pub fn into_domain(self) -> Result<RuleAssignment, RepoError> {
        Ok(RuleAssignment {
            rule: self.rule.into_domain()?,
            recipient_name: self.recipient_name,
            payout_account_id: self.payout_account_id,
        })
    }
}

impl DbPayment {
    pub fn into_domain(self) -> Result<Payment, RepoError> {
        Ok(Payment {
            id: PaymentId::from_uuid(id(self.id)?),
            product_id: ProductId::from_uuid(id(self.product_id)?),
            customer_id: self.customer_id,
            quantity: self.quantity,
            amount: amount(self.amount)?,
            currency: label::<Currency>(&self.currency)?,
            status: label::<PaymentStatus>(&self.status)?,
            transfers_completed: self.transfers_completed,
            checkout_session_id: self.checkout_session_id,
            payment_intent_id: self.payment_intent_id,
            created_at: timestamp(self.created_at)?,
            updated_at: timestamp(self.updated_at)?,
            completed_at: optional(self.completed_at, timestamp)?,
        })
    }
}

impl DbTransfer {
    pub fn into_domain(self) -> Result<Transfer, RepoError> {
        Ok(Transfer {
            id: TransferId::from_uuid(id(self.id)?),
            payment_id: PaymentId::from_uuid(id(self.payment_id)?),
            transfer_rule_id: TransferRuleId::from_uuid(id(self.transfer_rule_id)?),
            recipient_id: RecipientId::from_uuid(id(self.recipient_id)?),
            rule_type: label::<TransferType>(&self.rule_type)?,
            amount: amount(self.amount)?,
            currency: label::<Currency>(&self.currency)?,
            status: label::<TransferStatus>(&self.status)?,
            external_transfer_id: self.external_transfer_id,
            error_message: self.error_message,
            note: self.note,
            calculated_at: timestamp(self.calculated_at)?,
            completed_at: optional(self.completed_at, timestamp)?,
            failed_at: optional(self.failed_at, timestamp)?,
        })
    }
}
