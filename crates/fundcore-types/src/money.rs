//! Money types
//!
//! Gateway-facing amounts are carried in minor units (i64) as the gateway
//! reports them; internal wallet balances and investment totals use
//! `rust_decimal::Decimal`. `Money::to_decimal` is the single conversion
//! point between the two.

use crate::{FundcoreError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported currency
///
/// The platform operates in a single currency; the enum exists so that a
/// mismatched gateway notification is rejected instead of silently mixed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Sar,
    Usd,
}

impl Currency {
    /// ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Sar => "SAR",
            Self::Usd => "USD",
        }
    }

    /// Number of minor units per major unit (both supported currencies use 2)
    pub fn minor_decimals(&self) -> u32 {
        2
    }

    /// Parse an ISO code (case-insensitive)
    pub fn from_code(code: &str) -> Result<Self> {
        match code.to_ascii_uppercase().as_str() {
            "SAR" => Ok(Self::Sar),
            "USD" => Ok(Self::Usd),
            other => Err(FundcoreError::InvalidInput {
                field: "currency".to_string(),
                reason: format!("unsupported currency code {other}"),
            }),
        }
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self::Sar
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// An amount in minor units with its currency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    /// Raw value in minor units (e.g. halalas, cents)
    pub minor: i64,
    /// The currency
    pub currency: Currency,
}

impl Money {
    /// Create a new amount from minor units
    pub fn new(minor: i64, currency: Currency) -> Self {
        Self { minor, currency }
    }

    /// Create a zero amount
    pub fn zero(currency: Currency) -> Self {
        Self { minor: 0, currency }
    }

    /// Check if the amount is zero
    pub fn is_zero(&self) -> bool {
        self.minor == 0
    }

    /// Check if the amount is strictly positive
    pub fn is_positive(&self) -> bool {
        self.minor > 0
    }

    /// Checked addition (currencies must match)
    pub fn checked_add(self, other: Self) -> Result<Self> {
        if self.currency != other.currency {
            return Err(FundcoreError::CurrencyMismatch {
                expected: self.currency.code().to_string(),
                actual: other.currency.code().to_string(),
            });
        }
        let minor = self
            .minor
            .checked_add(other.minor)
            .ok_or(FundcoreError::AmountOverflow)?;
        Ok(Self { minor, ..self })
    }

    /// Convert to the internal decimal representation (major units)
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.minor, self.currency.minor_decimals())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.to_decimal(), self.currency)
    }
}
