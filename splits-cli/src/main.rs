//! Splits CLI
//!
//! Command-line interface for the payment split API.

mod seed;

use std::str::FromStr;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;

use splits_client::SplitsClient;
use splits_types::{
    CreateProductRequest, CreateRecipientRequest, CreateTransferRuleRequest, PaymentId, ProductId,
    RecipientId, RecipientRole, TransferRuleId, TransferType,
    domain::event::{CHECKOUT_SESSION_COMPLETED, PAYMENT_INTENT_FAILED, PAYMENT_INTENT_SUCCEEDED},
};

#[derive(Parser)]
#[command(name = "splits")]
#[command(author, version, about = "Payment split API CLI client", long_about = None)]
struct Cli {
    /// Base URL of the Splits API
    #[arg(long, env = "SPLITS_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    /// Admin API key for `/api/admin` routes
    #[arg(long, env = "ADMIN_API_KEY")]
    admin_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recipient operations (admin)
    Recipient {
        #[command(subcommand)]
        action: RecipientCommands,
    },
    /// Product and split preview operations
    Product {
        #[command(subcommand)]
        action: ProductCommands,
    },
    /// Transfer rule operations (admin)
    Rule {
        #[command(subcommand)]
        action: RuleCommands,
    },
    /// Start a hosted checkout for a product
    Checkout {
        #[arg(long)]
        product: String,
        #[arg(long)]
        customer: String,
        #[arg(long, default_value_t = 1)]
        quantity: i32,
    },
    /// Payment and transfer operations
    Payment {
        #[command(subcommand)]
        action: PaymentCommands,
    },
    /// Send a signed processor event to the local intake
    Event {
        /// Event to simulate
        #[arg(value_parser = [
            CHECKOUT_SESSION_COMPLETED,
            PAYMENT_INTENT_SUCCEEDED,
            PAYMENT_INTENT_FAILED,
        ])]
        event_type: String,
        /// Payment ID (UUID) carried in the event metadata
        #[arg(long)]
        payment: String,
        /// Event id; redeliver by reusing one
        #[arg(long)]
        id: Option<String>,
        #[arg(long, env = "PROCESSOR_WEBHOOK_SECRET", hide_env_values = true)]
        secret: String,
    },
    /// Install the sample wellness marketplace catalog
    Seed,
    /// Check API health
    Health,
}

#[derive(Subcommand)]
enum RecipientCommands {
    /// Register a recipient
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        /// COMPANY, BRAND_PARTNER, WELLNESS_PROVIDER, AFFILIATE or CUSTOMER
        #[arg(long)]
        role: RecipientRole,
        /// Processor payout account; omit for recipients paid internally
        #[arg(long)]
        payout_account: Option<String>,
    },
    /// List all recipients
    List,
}

#[derive(Subcommand)]
enum ProductCommands {
    /// Create a product (admin)
    Create {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Retail price in major units, e.g. 299.99
        #[arg(long)]
        price: Decimal,
        /// Creator recipient ID (UUID)
        #[arg(long)]
        creator: String,
    },
    /// List all products
    List,
    /// Get product details
    Get {
        /// Product ID (UUID)
        id: String,
    },
    /// Show how a purchase would be divided
    Preview {
        /// Product ID (UUID)
        id: String,
        #[arg(long, default_value_t = 1)]
        quantity: i32,
    },
    /// List a product's transfer rules (admin)
    Rules {
        /// Product ID (UUID)
        id: String,
    },
}

#[derive(Subcommand)]
enum RuleCommands {
    /// Attach a transfer rule to a product
    Create {
        #[arg(long)]
        product: String,
        #[arg(long)]
        recipient: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        /// WHOLESALE, COMMISSION, FEE, BONUS, REFERRAL or CUSTOM
        #[arg(long = "type")]
        rule_type: TransferType,
        /// Fixed amount, honored for WHOLESALE rules
        #[arg(long)]
        amount: Option<Decimal>,
        /// Fraction of the payment, e.g. 0.15
        #[arg(long)]
        percentage: Option<Decimal>,
        #[arg(long, default_value_t = 0)]
        priority: i32,
    },
    /// Activate a rule
    Enable { id: String },
    /// Deactivate a rule
    Disable { id: String },
}

#[derive(Subcommand)]
enum PaymentCommands {
    /// Get payment details
    Get { id: String },
    /// List recent payments (admin)
    List {
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    /// Show a payment's transfers
    Transfers { id: String },
    /// Run or resume the transfer pass of a completed payment (admin)
    Execute { id: String },
}

fn parse_id<T: FromStr>(s: &str, what: &str) -> Result<T> {
    s.parse()
        .map_err(|_| anyhow::anyhow!("Invalid {} ID: {}", what, s))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Envelope shaped like the processor's, pointing at `payment_id`.
fn event_payload(event_id: &str, event_type: &str, payment_id: PaymentId) -> serde_json::Value {
    let object_id = if event_type == CHECKOUT_SESSION_COMPLETED {
        format!("cs_cli_{}", payment_id.as_uuid().simple())
    } else {
        format!("pi_cli_{}", payment_id.as_uuid().simple())
    };
    json!({
        "id": event_id,
        "type": event_type,
        "created": chrono::Utc::now().timestamp(),
        "data": {
            "object": {
                "id": object_id,
                "metadata": { "payment_id": payment_id.to_string() }
            }
        }
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut client = SplitsClient::new(&cli.api_url);
    if let Some(key) = cli.admin_key {
        client = client.with_admin_key(key);
    }

    match cli.command {
        Commands::Health => {
            let health = client.health().await?;
            if health.status == "ok" {
                println!("✓ API is healthy");
            } else {
                println!("✗ API is {} (database: {})", health.status, health.database);
                std::process::exit(1);
            }
        }

        Commands::Recipient { action } => match action {
            RecipientCommands::Create {
                name,
                email,
                role,
                payout_account,
            } => {
                let recipient = client
                    .create_recipient(&CreateRecipientRequest {
                        name,
                        email,
                        role,
                        payout_account_id: payout_account,
                    })
                    .await?;
                print_json(&recipient)?;
            }
            RecipientCommands::List => print_json(&client.list_recipients().await?)?,
        },

        Commands::Product { action } => match action {
            ProductCommands::Create {
                name,
                description,
                price,
                creator,
            } => {
                let creator_id: RecipientId = parse_id(&creator, "recipient")?;
                let product = client
                    .create_product(&CreateProductRequest {
                        name,
                        description,
                        retail_price: price,
                        creator_id,
                    })
                    .await?;
                print_json(&product)?;
            }
            ProductCommands::List => print_json(&client.list_products().await?)?,
            ProductCommands::Get { id } => {
                let product_id: ProductId = parse_id(&id, "product")?;
                print_json(&client.get_product(product_id).await?)?;
            }
            ProductCommands::Preview { id, quantity } => {
                let product_id: ProductId = parse_id(&id, "product")?;
                print_json(&client.preview_split(product_id, quantity).await?)?;
            }
            ProductCommands::Rules { id } => {
                let product_id: ProductId = parse_id(&id, "product")?;
                print_json(&client.list_rules(product_id).await?)?;
            }
        },

        Commands::Rule { action } => match action {
            RuleCommands::Create {
                product,
                recipient,
                name,
                description,
                rule_type,
                amount,
                percentage,
                priority,
            } => {
                let product_id: ProductId = parse_id(&product, "product")?;
                let recipient_id: RecipientId = parse_id(&recipient, "recipient")?;
                let rule = client
                    .create_rule(
                        product_id,
                        &CreateTransferRuleRequest {
                            recipient_id,
                            name,
                            description,
                            rule_type,
                            amount,
                            percentage,
                            priority,
                        },
                    )
                    .await?;
                print_json(&rule)?;
            }
            RuleCommands::Enable { id } => {
                let rule_id: TransferRuleId = parse_id(&id, "rule")?;
                print_json(&client.set_rule_active(rule_id, true).await?)?;
            }
            RuleCommands::Disable { id } => {
                let rule_id: TransferRuleId = parse_id(&id, "rule")?;
                print_json(&client.set_rule_active(rule_id, false).await?)?;
            }
        },

        Commands::Checkout {
            product,
            customer,
            quantity,
        } => {
            let product_id: ProductId = parse_id(&product, "product")?;
            let checkout = client
                .create_checkout_session(product_id, &customer, quantity)
                .await?;
            print_json(&checkout)?;
        }

        Commands::Payment { action } => match action {
            PaymentCommands::Get { id } => {
                let payment_id: PaymentId = parse_id(&id, "payment")?;
                print_json(&client.get_payment(payment_id).await?)?;
            }
            PaymentCommands::List { limit } => print_json(&client.list_payments(limit).await?)?,
            PaymentCommands::Transfers { id } => {
                let payment_id: PaymentId = parse_id(&id, "payment")?;
                print_json(&client.get_transfer_summary(payment_id).await?)?;
            }
            PaymentCommands::Execute { id } => {
                let payment_id: PaymentId = parse_id(&id, "payment")?;
                print_json(&client.execute_transfers(payment_id).await?)?;
            }
        },

        Commands::Event {
            event_type,
            payment,
            id,
            secret,
        } => {
            let payment_id: PaymentId = parse_id(&payment, "payment")?;
            let event_id =
                id.unwrap_or_else(|| format!("evt_cli_{}", uuid::Uuid::new_v4().simple()));
            let payload = event_payload(&event_id, &event_type, payment_id).to_string();
            let ack = client.send_event(&payload, &secret).await?;
            println!("✓ {} {} acknowledged: {}", event_type, event_id, ack.received);
        }

        Commands::Seed => {
            let product = seed::run(&client).await?;
            println!("✓ Sample catalog ready: {} ({})", product.name, product.id);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_event_payload_carries_payment_id() {
        let payment_id = PaymentId::new();
        let payload = event_payload("evt_1", PAYMENT_INTENT_SUCCEEDED, payment_id);

        assert_eq!(payload["type"], PAYMENT_INTENT_SUCCEEDED);
        assert_eq!(
            payload["data"]["object"]["metadata"]["payment_id"],
            payment_id.to_string()
        );
        assert!(
            payload["data"]["object"]["id"]
                .as_str()
                .unwrap()
                .starts_with("pi_")
        );
    }

    #[test]
    fn test_rule_create_parses_decimals_and_type() {
        let cli = Cli::try_parse_from([
            "splits",
            "rule",
            "create",
            "--product",
            "00000000-0000-0000-0000-000000000001",
            "--recipient",
            "00000000-0000-0000-0000-000000000002",
            "--name",
            "Affiliate Commission",
            "--type",
            "COMMISSION",
            "--percentage",
            "0.05",
            "--priority",
            "3",
        ])
        .unwrap();

        match cli.command {
            Commands::Rule {
                action:
                    RuleCommands::Create {
                        rule_type,
                        percentage,
                        amount,
                        ..
                    },
            } => {
                assert_eq!(rule_type, TransferType::Commission);
                assert_eq!(percentage, Some(Decimal::new(5, 2)));
                assert_eq!(amount, None);
            }
            _ => panic!("expected rule create"),
        }
    }
}
