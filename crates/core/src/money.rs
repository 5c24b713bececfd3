//! Monetary value objects.
//!
//! Amounts are `rust_decimal::Decimal` values held at a fixed scale of two
//! decimal places. Every constructor and every operation that can introduce
//! extra digits rounds half-up (midpoint away from zero), so two amounts that
//! print the same always compare equal.

use core::fmt;
use core::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Number of decimal places kept for currency amounts.
pub const DECIMAL_PLACES: u32 = 2;

fn round_currency(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(DECIMAL_PLACES);
    rounded
}

/// A non-negative currency amount, rounded to two decimal places.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl Money {
    pub fn zero() -> Self {
        Self(round_currency(Decimal::ZERO))
    }

    /// Build an amount, rejecting negative values.
    pub fn new(amount: Decimal) -> DomainResult<Self> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(DomainError::invalid_input(format!(
                "amount must not be negative (got {amount})"
            )));
        }
        if amount.is_zero() {
            return Ok(Self::zero());
        }
        Ok(Self(round_currency(amount)))
    }

    /// Amount from a count of cents.
    pub fn from_cents(cents: u64) -> Self {
        Self(round_currency(Decimal::from(cents) / Decimal::ONE_HUNDRED))
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_add(self, other: Money) -> DomainResult<Money> {
        self.0
            .checked_add(other.0)
            .map(|v| Self(round_currency(v)))
            .ok_or_else(|| DomainError::invalid_input("amount overflow"))
    }

    /// Subtract, failing with `InvalidInput` if the result would be negative.
    pub fn checked_sub(self, other: Money) -> DomainResult<Money> {
        if other.0 > self.0 {
            return Err(DomainError::invalid_input(format!(
                "cannot subtract {other} from {self}"
            )));
        }
        Ok(Self(round_currency(self.0 - other.0)))
    }

    /// Amount multiplied by a quantity (line total).
    pub fn times(self, quantity: u32) -> DomainResult<Money> {
        self.0
            .checked_mul(Decimal::from(quantity))
            .map(|v| Self(round_currency(v)))
            .ok_or_else(|| DomainError::invalid_input("amount overflow"))
    }

    /// `self × rate / 100`, rounded half-up.
    pub fn percent(self, rate: TaxRate) -> DomainResult<Money> {
        self.0
            .checked_mul(rate.0)
            .map(|v| Self(round_currency(v / Decimal::ONE_HUNDRED)))
            .ok_or_else(|| DomainError::invalid_input("amount overflow"))
    }
}

impl TryFrom<Decimal> for Money {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Money::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl FromStr for Money {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let d = Decimal::from_str(s.trim())
            .map_err(|e| DomainError::invalid_input(format!("invalid amount '{s}': {e}")))?;
        Money::new(d)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl core::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| Money(round_currency(acc.0 + m.0)))
    }
}

/// A tax rate expressed as a percentage in `[0, 100]`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct TaxRate(Decimal);

impl TaxRate {
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn new(percent: Decimal) -> DomainResult<Self> {
        if percent < Decimal::ZERO || percent > Decimal::ONE_HUNDRED {
            return Err(DomainError::invalid_input(format!(
                "tax rate must be within [0, 100] (got {percent})"
            )));
        }
        Ok(Self(percent.normalize()))
    }

    pub fn percent(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for TaxRate {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        TaxRate::new(value)
    }
}

impl From<TaxRate> for Decimal {
    fn from(value: TaxRate) -> Self {
        value.0
    }
}

impl fmt::Display for TaxRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}
