//! Sample marketplace catalog: four partners, one product and the rules that
//! divide its price between them.
//!
//! Seeding is safe to repeat. Recipients are matched by email and the product
//! by name and creator; rules are only attached to a freshly created product.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use splits_client::SplitsClient;
use splits_types::{
    CreateProductRequest, CreateRecipientRequest, CreateTransferRuleRequest, Product, Recipient,
    RecipientRole, TransferType,
};

pub struct SampleRecipient {
    pub name: &'static str,
    pub email: &'static str,
    pub role: RecipientRole,
    pub payout_account_id: Option<&'static str>,
}

pub struct SampleRule {
    /// Email of the recipient the rule pays
    pub recipient: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub rule_type: TransferType,
    pub amount: Option<Decimal>,
    pub percentage: Option<Decimal>,
    pub priority: i32,
}

pub const PRODUCT_NAME: &str = "Premium Wellness Package";
const PRODUCT_DESCRIPTION: &str = "Complete wellness solution with supplements and consultation";
const PRODUCT_PRICE: Decimal = dec!(299.99);
const PRODUCT_CREATOR: &str = "brand@example.com";

pub fn sample_recipients() -> Vec<SampleRecipient> {
    vec![
        SampleRecipient {
            name: "Company Admin",
            email: "company@example.com",
            role: RecipientRole::Company,
            payout_account_id: None,
        },
        SampleRecipient {
            name: "Brand Partner",
            email: "brand@example.com",
            role: RecipientRole::BrandPartner,
            payout_account_id: Some("acct_brand_partner"),
        },
        SampleRecipient {
            name: "Wellness Provider",
            email: "wellness@example.com",
            role: RecipientRole::WellnessProvider,
            payout_account_id: Some("acct_wellness_provider"),
        },
        SampleRecipient {
            name: "Affiliate Partner",
            email: "affiliate@example.com",
            role: RecipientRole::Affiliate,
            payout_account_id: Some("acct_affiliate"),
        },
        SampleRecipient {
            name: "Test Customer",
            email: "customer@example.com",
            role: RecipientRole::Customer,
            payout_account_id: None,
        },
    ]
}

pub fn sample_rules() -> Vec<SampleRule> {
    vec![
        SampleRule {
            recipient: "brand@example.com",
            name: "Brand Partner Wholesale",
            description: "Fixed wholesale amount to brand partner",
            rule_type: TransferType::Wholesale,
            amount: Some(dec!(180.00)),
            percentage: None,
            priority: 1,
        },
        SampleRule {
            recipient: "wellness@example.com",
            name: "Wellness Provider Commission",
            description: "15% commission to wellness provider",
            rule_type: TransferType::Commission,
            amount: None,
            percentage: Some(dec!(0.15)),
            priority: 2,
        },
        SampleRule {
            recipient: "affiliate@example.com",
            name: "Affiliate Commission",
            description: "5% commission to affiliate partner",
            rule_type: TransferType::Commission,
            amount: None,
            percentage: Some(dec!(0.05)),
            priority: 3,
        },
        SampleRule {
            recipient: "company@example.com",
            name: "Platform Fee",
            description: "10% platform fee for company",
            rule_type: TransferType::Fee,
            amount: None,
            percentage: Some(dec!(0.10)),
            priority: 4,
        },
    ]
}

/// Installs the sample catalog and returns its product.
pub async fn run(client: &SplitsClient) -> Result<Product> {
    let mut recipients: Vec<Recipient> = client.list_recipients().await?;

    for sample in sample_recipients() {
        if recipients.iter().any(|r| r.email == sample.email) {
            println!("= recipient {} already present", sample.email);
            continue;
        }
        let created = client
            .create_recipient(&CreateRecipientRequest {
                name: sample.name.to_string(),
                email: sample.email.to_string(),
                role: sample.role,
                payout_account_id: sample.payout_account_id.map(String::from),
            })
            .await
            .with_context(|| format!("creating recipient {}", sample.email))?;
        println!("+ recipient {} ({})", created.email, created.id);
        recipients.push(created);
    }

    let recipient_id = |email: &str| {
        recipients
            .iter()
            .find(|r| r.email == email)
            .map(|r| r.id)
            .with_context(|| format!("recipient {} missing after seeding", email))
    };

    let creator_id = recipient_id(PRODUCT_CREATOR)?;
    if let Some(existing) = client
        .list_products()
        .await?
        .into_iter()
        .find(|p| p.name == PRODUCT_NAME && p.creator_id == creator_id)
    {
        println!("= product {} already present ({})", existing.name, existing.id);
        return Ok(existing);
    }

    let product = client
        .create_product(&CreateProductRequest {
            name: PRODUCT_NAME.to_string(),
            description: PRODUCT_DESCRIPTION.to_string(),
            retail_price: PRODUCT_PRICE,
            creator_id,
        })
        .await
        .context("creating sample product")?;
    println!("+ product {} ({})", product.name, product.id);

    for rule in sample_rules() {
        let created = client
            .create_rule(
                product.id,
                &CreateTransferRuleRequest {
                    recipient_id: recipient_id(rule.recipient)?,
                    name: rule.name.to_string(),
                    description: Some(rule.description.to_string()),
                    rule_type: rule.rule_type,
                    amount: rule.amount,
                    percentage: rule.percentage,
                    priority: rule.priority,
                },
            )
            .await
            .with_context(|| format!("creating rule {}", rule.name))?;
        println!("+ rule {} (priority {})", created.name, created.priority);
    }

    Ok(product)
}
