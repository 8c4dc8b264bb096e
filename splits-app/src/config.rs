//! Configuration loading from environment.

use std::{env, fmt::Display, str::FromStr, time::Duration};

use anyhow::{Context, bail};
use rust_decimal::Decimal;

use splits_hex::{ServiceConfig, TransferLimits};
use splits_types::Currency;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
    Test,
}

impl FromStr for AppEnv {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" => Ok(Self::Development),
            "production" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => bail!("APP_ENV must be development, production or test, got {other:?}"),
        }
    }
}

/// How payouts and checkout sessions reach the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessorMode {
    Live { api_url: String, secret_key: String },
    /// Nothing leaves the process; opted into with `PROCESSOR_MODE=dry-run`.
    DryRun,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: u32,
    pub api_max_requests: u32,
    /// Count in the database so every instance shares one budget
    pub shared: bool,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub app_env: AppEnv,
    pub processor: ProcessorMode,
    pub processor_timeout: Duration,
    pub webhook_secret: String,
    pub admin_api_key: Option<String>,
    pub rate_limit: RateLimitConfig,
    pub service: ServiceConfig,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, validating every value.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        let port = parse_or(&get, "PORT", 3000)?;
        let database_url =
            get("DATABASE_URL").context("DATABASE_URL environment variable is required")?;
        let app_env = match get("APP_ENV") {
            Some(v) => v.parse()?,
            None => AppEnv::Development,
        };

        let processor = match get("PROCESSOR_MODE").as_deref().unwrap_or("live") {
            "dry-run" => ProcessorMode::DryRun,
            "live" => {
                let secret_key = get("PROCESSOR_SECRET_KEY")
                    .context("PROCESSOR_SECRET_KEY is required unless PROCESSOR_MODE=dry-run")?;
                if !secret_key.starts_with("sk_") {
                    bail!("PROCESSOR_SECRET_KEY must start with sk_");
                }
                let api_url = get("PROCESSOR_API_URL")
                    .context("PROCESSOR_API_URL is required unless PROCESSOR_MODE=dry-run")?;
                ProcessorMode::Live {
                    api_url,
                    secret_key,
                }
            }
            other => bail!("PROCESSOR_MODE must be live or dry-run, got {other:?}"),
        };

        let webhook_secret = get("PROCESSOR_WEBHOOK_SECRET")
            .context("PROCESSOR_WEBHOOK_SECRET environment variable is required")?;
        if !webhook_secret.starts_with("whsec_") {
            bail!("PROCESSOR_WEBHOOK_SECRET must start with whsec_");
        }

        let (default_max, default_api_max) = match app_env {
            AppEnv::Production => (100, 20),
            _ => (1000, 200),
        };
        let rate_limit = RateLimitConfig {
            window: Duration::from_secs(parse_or(&get, "RATE_LIMIT_WINDOW_SECS", 900)?),
            max_requests: parse_or(&get, "RATE_LIMIT_MAX_REQUESTS", default_max)?,
            api_max_requests: parse_or(&get, "RATE_LIMIT_API_MAX_REQUESTS", default_api_max)?,
            shared: parse_or(&get, "RATE_LIMIT_SHARED", false)?,
        };

        let defaults = TransferLimits::default();
        let limits = TransferLimits {
            min_amount: parse_or(&get, "TRANSFER_MIN_AMOUNT", defaults.min_amount)?,
            max_amount: parse_or(&get, "TRANSFER_MAX_AMOUNT", defaults.max_amount)?,
            max_transfers_per_payment: parse_or(
                &get,
                "MAX_TRANSFERS_PER_PAYMENT",
                defaults.max_transfers_per_payment,
            )?,
        };
        if limits.min_amount <= Decimal::ZERO || limits.min_amount > limits.max_amount {
            bail!("TRANSFER_MIN_AMOUNT must be positive and not above TRANSFER_MAX_AMOUNT");
        }

        let service = ServiceConfig {
            currency: parse_or(&get, "CURRENCY", Currency::USD)?,
            app_url: get("APP_URL").unwrap_or_else(|| format!("http://localhost:{port}")),
            limits,
        };

        Ok(Self {
            port,
            database_url,
            app_env,
            processor,
            processor_timeout: Duration::from_secs(parse_or(&get, "PROCESSOR_TIMEOUT_SECS", 30)?),
            webhook_secret,
            admin_api_key: get("ADMIN_API_KEY"),
            rate_limit,
            service,
        })
    }
}

fn parse_or<T>(get: impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {key}={raw:?}: {e}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rust_decimal_macros::dec;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    const BASE: [(&str, &str); 4] = [
        ("DATABASE_URL", "sqlite::memory:"),
        ("PROCESSOR_SECRET_KEY", "sk_test_123"),
        ("PROCESSOR_API_URL", "https://processor.test"),
        ("PROCESSOR_WEBHOOK_SECRET", "whsec_abc"),
    ];

    #[test]
    fn test_defaults() {
        let config = load(&BASE).unwrap();

        assert_eq!(config.port, 3000);
        assert_eq!(config.app_env, AppEnv::Development);
        assert_eq!(config.rate_limit.max_requests, 1000);
        assert_eq!(config.rate_limit.api_max_requests, 200);
        assert_eq!(config.rate_limit.window, Duration::from_secs(900));
        assert!(!config.rate_limit.shared);
        assert_eq!(config.service.currency, Currency::USD);
        assert_eq!(config.service.limits.min_amount, dec!(0.50));
        assert!(config.admin_api_key.is_none());
        assert!(matches!(config.processor, ProcessorMode::Live { .. }));
    }

    #[test]
    fn test_production_tightens_rate_limits() {
        let mut vars = BASE.to_vec();
        vars.push(("APP_ENV", "production"));
        let config = load(&vars).unwrap();

        assert_eq!(config.rate_limit.max_requests, 100);
        assert_eq!(config.rate_limit.api_max_requests, 20);
    }

    #[test]
    fn test_secret_prefixes_are_enforced() {
        let mut vars = BASE.to_vec();
        vars[1] = ("PROCESSOR_SECRET_KEY", "pk_test_123");
        assert!(load(&vars).is_err());

        let mut vars = BASE.to_vec();
        vars[3] = ("PROCESSOR_WEBHOOK_SECRET", "secret");
        assert!(load(&vars).is_err());
    }

    #[test]
    fn test_dry_run_needs_no_processor_credentials() {
        let config = load(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("PROCESSOR_WEBHOOK_SECRET", "whsec_abc"),
            ("PROCESSOR_MODE", "dry-run"),
        ])
        .unwrap();

        assert_eq!(config.processor, ProcessorMode::DryRun);
    }

    #[test]
    fn test_missing_database_url_fails() {
        let err = load(&BASE[1..]).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn test_invalid_numbers_are_reported() {
        let mut vars = BASE.to_vec();
        vars.push(("TRANSFER_MAX_AMOUNT", "lots"));
        let err = load(&vars).unwrap_err();
        assert!(err.to_string().contains("TRANSFER_MAX_AMOUNT"));
    }
}
