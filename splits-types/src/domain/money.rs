//! Decimal money helpers and the processor's minor-unit conversion.
//!
//! Amounts inside the service are [`Decimal`] values in major units (dollars,
//! euros, ...). They are kept at full precision everywhere and only rounded at
//! the processor boundary, where the money-movement call expects integer
//! minor units.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

use crate::error::DomainError;

const MINOR_UNITS_PER_MAJOR: i64 = 100;

/// Currencies supported by the split service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    USD,
    EUR,
    GBP,
    INR,
}

impl Currency {
    /// Returns the number of decimal places for this currency.
    pub fn decimal_places(&self) -> u32 {
        match self {
            Currency::USD | Currency::EUR | Currency::GBP | Currency::INR => 2,
        }
    }

    /// Returns the currency symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::USD => "$",
            Currency::EUR => "€",
            Currency::GBP => "£",
            Currency::INR => "₹",
        }
    }

    /// Lowercase ISO code, as the processor API expects it.
    pub fn processor_code(&self) -> String {
        self.to_string().to_lowercase()
    }

    /// Formats an amount for logs and CLI output, e.g. `$44.9985`.
    pub fn format(&self, amount: Decimal) -> String {
        format!("{}{}", self.symbol(), amount.normalize())
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::str::FromStr for Currency {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "USD" => Ok(Currency::USD),
            "EUR" => Ok(Currency::EUR),
            "GBP" => Ok(Currency::GBP),
            "INR" => Ok(Currency::INR),
            other => Err(DomainError::ValidationError(format!(
                "Unsupported currency: {}",
                other
            ))),
        }
    }
}

/// Converts a major-unit amount to integer minor units: `round(amount * 100)`.
///
/// Midpoints round away from zero, so `0.125` becomes `13`.
pub fn to_minor_units(amount: Decimal) -> Result<i64, DomainError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(DomainError::NegativeAmount);
    }

    amount
        .checked_mul(Decimal::from(MINOR_UNITS_PER_MAJOR))
        .map(|scaled| scaled.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|rounded| rounded.to_i64())
        .ok_or_else(|| DomainError::AmountOverflow(amount.to_string()))
}

/// Converts integer minor units back to a major-unit amount: `minor / 100`.
pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_to_minor_units_rounds_half_away_from_zero() {
        assert_eq!(to_minor_units(dec!(44.9985)).unwrap(), 4500);
        assert_eq!(to_minor_units(dec!(14.9995)).unwrap(), 1500);
        assert_eq!(to_minor_units(dec!(29.999)).unwrap(), 3000);
        assert_eq!(to_minor_units(dec!(0.125)).unwrap(), 13);
        assert_eq!(to_minor_units(dec!(180.00)).unwrap(), 18000);
    }

    #[test]
    fn test_to_minor_units_rejects_negative() {
        let result = to_minor_units(dec!(-1.00));
        assert!(matches!(result, Err(DomainError::NegativeAmount)));
    }

    #[test]
    fn test_from_minor_units() {
        assert_eq!(from_minor_units(29999), dec!(299.99));
        assert_eq!(from_minor_units(5), dec!(0.05));
    }

    #[test]
    fn test_currency_parsing() {
        assert_eq!("usd".parse::<Currency>().unwrap(), Currency::USD);
        assert!("JPY".parse::<Currency>().is_err());
        assert_eq!(Currency::EUR.processor_code(), "eur");
    }

    #[test]
    fn test_currency_format() {
        assert_eq!(Currency::USD.format(dec!(44.9985)), "$44.9985");
        assert_eq!(Currency::USD.format(dec!(180.00)), "$180");
    }
}
