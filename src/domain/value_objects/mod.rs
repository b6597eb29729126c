//! Value Objects for Payments

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::PaymentError;

/// Currency value object: the closed set the ledger accepts
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Khr,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self { Self::Usd => "USD", Self::Khr => "KHR" }
    }

    /// ISO 4217 numeric code, as embedded in the QR descriptor
    pub fn numeric_code(&self) -> &'static str {
        match self { Self::Usd => "840", Self::Khr => "116" }
    }
}

impl FromStr for Currency {
    type Err = PaymentError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "USD" => Ok(Self::Usd),
            "KHR" => Ok(Self::Khr),
            other => Err(PaymentError::UnsupportedCurrency(other.to_string())),
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.code()) }
}

/// Money value object: a strictly positive, currency-scoped amount
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money { amount: Decimal, currency: Currency }

impl Money {
    pub fn new(amount: Decimal, currency: Currency) -> crate::Result<Self> {
        if amount <= Decimal::ZERO { return Err(PaymentError::InvalidAmount); }
        Ok(Self { amount, currency })
    }
    pub fn usd(amount: Decimal) -> crate::Result<Self> { Self::new(amount, Currency::Usd) }
    pub fn amount(&self) -> Decimal { self.amount }
    pub fn currency(&self) -> Currency { self.currency }

    /// Amount in minor units (hundredths), as the QR descriptor carries it
    pub fn minor_units(&self) -> i64 {
        (self.amount * Decimal::from(100)).round().to_i64().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_parse() {
        assert_eq!("usd".parse::<Currency>().unwrap(), Currency::Usd);
        assert_eq!("KHR".parse::<Currency>().unwrap(), Currency::Khr);
        assert!(matches!("EUR".parse::<Currency>(), Err(PaymentError::UnsupportedCurrency(_))));
    }

    #[test]
    fn test_money_rejects_non_positive() {
        assert!(matches!(Money::usd(Decimal::ZERO), Err(PaymentError::InvalidAmount)));
        assert!(matches!(Money::usd(Decimal::new(-5, 0)), Err(PaymentError::InvalidAmount)));
    }

    #[test]
    fn test_money_minor_units() {
        let m = Money::usd(Decimal::new(2550, 2)).unwrap(); // 25.50
        assert_eq!(m.minor_units(), 2550);
    }
}
