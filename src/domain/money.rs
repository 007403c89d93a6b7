use crate::error::TransferError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurrencyKind {
    Crypto,
    Fiat,
}

/// A currency identifier, tagged with whether it is an on-chain asset or
/// a fiat denomination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Currency {
    pub code: String,
    pub kind: CurrencyKind,
}

impl Currency {
    pub fn crypto(code: &str) -> Self {
        Self {
            code: code.to_string(),
            kind: CurrencyKind::Crypto,
        }
    }

    pub fn fiat(code: &str) -> Self {
        Self {
            code: code.to_string(),
            kind: CurrencyKind::Fiat,
        }
    }

    pub fn is_fiat(&self) -> bool {
        self.kind == CurrencyKind::Fiat
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)
    }
}

/// A monetary magnitude tagged with its currency.
///
/// Arithmetic across different currencies is invalid: the checked
/// operations return an error, and `PartialOrd` yields no ordering for
/// mismatched currencies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Money {
    pub currency: Currency,
    pub value: Decimal,
}

impl Money {
    pub fn new(currency: Currency, value: Decimal) -> Self {
        Self { currency, value }
    }

    pub fn zero(currency: Currency) -> Self {
        Self::new(currency, Decimal::ZERO)
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.value > Decimal::ZERO
    }

    fn ensure_same_currency(&self, other: &Money) -> Result<(), TransferError> {
        if self.currency == other.currency {
            Ok(())
        } else {
            Err(TransferError::CurrencyMismatch {
                expected: self.currency.clone(),
                actual: other.currency.clone(),
            })
        }
    }

    pub fn checked_add(&self, other: &Money) -> Result<Money, TransferError> {
        self.ensure_same_currency(other)?;
        Ok(Money::new(self.currency.clone(), self.value + other.value))
    }

    pub fn checked_sub(&self, other: &Money) -> Result<Money, TransferError> {
        self.ensure_same_currency(other)?;
        Ok(Money::new(self.currency.clone(), self.value - other.value))
    }

    /// Subtraction floored at zero, for deriving spendable balances.
    pub fn saturating_sub(&self, other: &Money) -> Result<Money, TransferError> {
        self.ensure_same_currency(other)?;
        let value = (self.value - other.value).max(Decimal::ZERO);
        Ok(Money::new(self.currency.clone(), value))
    }
}

impl PartialOrd for Money {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.currency != other.currency {
            return None;
        }
        self.value.partial_cmp(&other.value)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.currency)
    }
}

/// A conversion rate between two currencies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub from: Currency,
    pub to: Currency,
    pub rate: Decimal,
}

impl ExchangeRate {
    pub fn new(from: Currency, to: Currency, rate: Decimal) -> Self {
        Self { from, to, rate }
    }

    pub fn convert(&self, amount: &Money) -> Result<Money, TransferError> {
        if amount.currency != self.from {
            return Err(TransferError::CurrencyMismatch {
                expected: self.from.clone(),
                actual: amount.currency.clone(),
            });
        }
        Ok(Money::new(self.to.clone(), amount.value * self.rate))
    }
}
