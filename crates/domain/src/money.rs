//! Fixed-point money.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// A single-currency amount with two decimal places.
///
/// Never floating point. Values are rounded to two places on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Number of decimal places carried by every amount.
    pub const SCALE: u32 = 2;

    /// Creates a money amount, rejecting negative values.
    pub fn new(amount: Decimal) -> Result<Self, DomainError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(DomainError::Validation(format!(
                "amount must not be negative: {amount}"
            )));
        }
        let mut amount = amount.round_dp(Self::SCALE);
        amount.rescale(Self::SCALE);
        Ok(Self(amount))
    }

    /// Creates an amount from minor units (e.g. 50000 = 500.00).
    pub fn from_minor_units(minor: i64) -> Self {
        Self(Decimal::new(minor, Self::SCALE))
    }

    /// Returns zero.
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Returns the amount as a decimal.
    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// Returns the amount in minor units, or None if it does not fit.
    pub fn to_minor_units(&self) -> Option<i64> {
        (self.0 * Decimal::from(100)).trunc().to_i64()
    }

    /// Returns true if the amount is strictly positive.
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rejects_negative_amounts() {
        assert!(Money::new(dec!(-1.00)).is_err());
        assert!(Money::new(dec!(0)).is_ok());
    }

    #[test]
    fn rounds_to_two_places() {
        let money = Money::new(dec!(10.005)).unwrap();
        assert_eq!(money.amount().scale(), 2);
        assert_eq!(Money::new(dec!(500)).unwrap().amount().scale(), 2);
    }

    #[test]
    fn minor_units_conversion() {
        let money = Money::from_minor_units(50_000);
        assert_eq!(money.amount(), dec!(500.00));
        assert_eq!(money.to_minor_units(), Some(50_000));
        assert_eq!(money, Money::new(dec!(500)).unwrap());
    }

    #[test]
    fn display_has_two_places() {
        assert_eq!(Money::from_minor_units(1234).to_string(), "12.34");
        assert_eq!(Money::new(dec!(500)).unwrap().to_string(), "500.00");
    }

    #[test]
    fn serializes_as_decimal_string() {
        let money = Money::from_minor_units(999);
        let json = serde_json::to_string(&money).unwrap();
        assert_eq!(json, "\"9.99\"");
        let back: Money = serde_json::from_str(&json).unwrap();
        assert_eq!(back, money);
    }
}
