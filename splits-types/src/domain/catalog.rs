//! Catalog models: recipients, products and the transfer rules that divide
//! a product's revenue.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::DomainError;

define_id!(
    /// Unique identifier for a Recipient.
    RecipientId
);
define_id!(
    /// Unique identifier for a Product.
    ProductId
);
define_id!(
    /// Unique identifier for a TransferRule.
    TransferRuleId
);

/// The part a recipient plays in the marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecipientRole {
    /// The platform operator itself
    Company,
    /// Supplier paid the wholesale amount
    BrandPartner,
    /// Commission earner who referred the sale
    WellnessProvider,
    Affiliate,
    Customer,
}

impl AsRef<str> for RecipientRole {
    fn as_ref(&self) -> &str {
        match self {
            Self::Company => "COMPANY",
            Self::BrandPartner => "BRAND_PARTNER",
            Self::WellnessProvider => "WELLNESS_PROVIDER",
            Self::Affiliate => "AFFILIATE",
            Self::Customer => "CUSTOMER",
        }
    }
}

impl std::fmt::Display for RecipientRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

impl std::str::FromStr for RecipientRole {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "COMPANY" => Ok(Self::Company),
            "BRAND_PARTNER" => Ok(Self::BrandPartner),
            "WELLNESS_PROVIDER" => Ok(Self::WellnessProvider),
            "AFFILIATE" => Ok(Self::Affiliate),
            "CUSTOMER" => Ok(Self::Customer),
            other => Err(DomainError::ValidationError(format!(
                "Unknown recipient role: {}",
                other
            ))),
        }
    }
}

/// A party entitled to a portion of a payment.
///
/// A recipient without a payout account still receives Transfer records,
/// but no money is moved externally (e.g. the platform's retained revenue).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Recipient {
    pub id: RecipientId,
    pub name: String,
    pub email: String,
    pub role: RecipientRole,
    /// External payout-account identifier at the processor
    pub payout_account_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Recipient {
    /// Creates a new recipient.
    ///
    /// # Validation
    /// - Name cannot be empty
    /// - Email must look like an address
    pub fn new(
        name: String,
        email: String,
        role: RecipientRole,
        payout_account_id: Option<String>,
    ) -> Result<Self, DomainError> {
        if name.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "Recipient name cannot be empty".into(),
            ));
        }
        if !email.contains('@') {
            return Err(DomainError::ValidationError(format!(
                "Invalid recipient email: {}",
                email
            )));
        }

        Ok(Self {
            id: RecipientId::new(),
            name,
            email,
            role,
            payout_account_id: payout_account_id.filter(|acct| !acct.trim().is_empty()),
            created_at: Utc::now(),
        })
    }
}

/// A sellable item.
///
/// The retail price is captured into each Payment when checkout begins and
/// is never re-read for that payment afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    /// Amount charged to the customer per unit
    #[schema(value_type = String, example = "299.99")]
    pub retail_price: Decimal,
    pub creator_id: RecipientId,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// Creates a new active product.
    pub fn new(
        name: String,
        description: String,
        retail_price: Decimal,
        creator_id: RecipientId,
    ) -> Result<Self, DomainError> {
        if name.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "Product name cannot be empty".into(),
            ));
        }
        if retail_price <= Decimal::ZERO {
            return Err(DomainError::ValidationError(
                "Retail price must be positive".into(),
            ));
        }

        Ok(Self {
            id: ProductId::new(),
            name,
            description,
            retail_price,
            creator_id,
            is_active: true,
            created_at: Utc::now(),
        })
    }
}

/// Kind of revenue share a rule describes. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferType {
    /// Fixed supplier amount; the only type whose `amount` is honored
    Wholesale,
    Commission,
    Fee,
    Bonus,
    Referral,
    Custom,
}

impl AsRef<str> for TransferType {
    fn as_ref(&self) -> &str {
        match self {
            Self::Wholesale => "WHOLESALE",
            Self::Commission => "COMMISSION",
            Self::Fee => "FEE",
            Self::Bonus => "BONUS",
            Self::Referral => "REFERRAL",
            Self::Custom => "CUSTOM",
        }
    }
}

impl std::fmt::Display for TransferType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

impl std::str::FromStr for TransferType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WHOLESALE" => Ok(Self::Wholesale),
            "COMMISSION" => Ok(Self::Commission),
            "FEE" => Ok(Self::Fee),
            "BONUS" => Ok(Self::Bonus),
            "REFERRAL" => Ok(Self::Referral),
            "CUSTOM" => Ok(Self::Custom),
            other => Err(DomainError::ValidationError(format!(
                "Unknown transfer type: {}",
                other
            ))),
        }
    }
}

/// How much of a product's payments flows to one recipient.
///
/// Rules are never edited once created; only `is_active` may change.
/// Historical splits are reproduced from Transfer rows, not from rules.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransferRule {
    pub id: TransferRuleId,
    pub product_id: ProductId,
    pub recipient_id: RecipientId,
    pub name: String,
    pub description: Option<String>,
    pub rule_type: TransferType,
    /// Fixed amount in major units
    #[schema(value_type = Option<String>, example = "180.00")]
    pub amount: Option<Decimal>,
    /// Fraction of the payment amount in [0, 1]
    #[schema(value_type = Option<String>, example = "0.15")]
    pub percentage: Option<Decimal>,
    /// Ascending: lower values are applied first
    pub priority: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl TransferRule {
    /// Creates a new active rule.
    ///
    /// # Validation
    /// - Name is 1..=200 characters, description at most 500
    /// - `amount` is positive when present
    /// - `percentage` is within [0, 1] when present
    /// - At least one of `amount` / `percentage` is present
    /// - `priority` is not negative
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        product_id: ProductId,
        recipient_id: RecipientId,
        name: String,
        description: Option<String>,
        rule_type: TransferType,
        amount: Option<Decimal>,
        percentage: Option<Decimal>,
        priority: i32,
    ) -> Result<Self, DomainError> {
        let name_len = name.trim().chars().count();
        if name_len == 0 || name_len > 200 {
            return Err(DomainError::ValidationError(
                "Rule name must be between 1 and 200 characters".into(),
            ));
        }
        if description.as_ref().is_some_and(|d| d.chars().count() > 500) {
            return Err(DomainError::ValidationError(
                "Rule description cannot exceed 500 characters".into(),
            ));
        }
        if let Some(amount) = amount
            && amount <= Decimal::ZERO
        {
            return Err(DomainError::ValidationError(
                "Rule amount must be positive".into(),
            ));
        }
        if let Some(pct) = percentage
            && (pct < Decimal::ZERO || pct > Decimal::ONE)
        {
            return Err(DomainError::InvalidPercentage(pct.to_string()));
        }
        if amount.is_none() && percentage.is_none() {
            return Err(DomainError::ValidationError(
                "Rule needs either an amount or a percentage".into(),
            ));
        }
        if priority < 0 {
            return Err(DomainError::ValidationError(
                "Rule priority cannot be negative".into(),
            ));
        }

        Ok(Self {
            id: TransferRuleId::new(),
            product_id,
            recipient_id,
            name,
            description,
            rule_type,
            amount,
            percentage,
            priority,
            is_active: true,
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn rule(
        amount: Option<Decimal>,
        percentage: Option<Decimal>,
    ) -> Result<TransferRule, DomainError> {
        TransferRule::new(
            ProductId::new(),
            RecipientId::new(),
            "Commission".to_string(),
            None,
            TransferType::Commission,
            amount,
            percentage,
            1,
        )
    }

    #[test]
    fn test_rule_requires_amount_or_percentage() {
        assert!(matches!(
            rule(None, None),
            Err(DomainError::ValidationError(_))
        ));
        assert!(rule(None, Some(dec!(0.15))).is_ok());
        assert!(rule(Some(dec!(10)), None).is_ok());
    }

    #[test]
    fn test_rule_percentage_bounds() {
        assert!(matches!(
            rule(None, Some(dec!(1.5))),
            Err(DomainError::InvalidPercentage(_))
        ));
        assert!(rule(None, Some(dec!(0))).is_ok());
        assert!(rule(None, Some(dec!(1))).is_ok());
    }

    #[test]
    fn test_rule_amount_must_be_positive() {
        assert!(rule(Some(dec!(0)), None).is_err());
    }

    #[test]
    fn test_product_requires_positive_price() {
        let result = Product::new(
            "Wellness".into(),
            String::new(),
            dec!(0),
            RecipientId::new(),
        );
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[test]
    fn test_recipient_blank_payout_account_is_dropped() {
        let recipient = Recipient::new(
            "Company".into(),
            "company@example.com".into(),
            RecipientRole::Company,
            Some("  ".into()),
        )
        .unwrap();
        assert!(recipient.payout_account_id.is_none());
    }

    #[test]
    fn test_transfer_type_round_trips_through_str() {
        for ty in [
            TransferType::Wholesale,
            TransferType::Commission,
            TransferType::Fee,
            TransferType::Bonus,
            TransferType::Referral,
            TransferType::Custom,
        ] {
            assert_eq!(ty.to_string().parse::<TransferType>().unwrap(), ty);
        }
    }
}
