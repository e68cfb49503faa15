use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;

/// Amounts of the two pooled assets, in UI units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenAmounts {
    pub token_a: Decimal,
    pub token_b: Decimal,
}

impl TokenAmounts {
    pub const ZERO: Self = Self {
        token_a: Decimal::ZERO,
        token_b: Decimal::ZERO,
    };

    pub fn new(token_a: Decimal, token_b: Decimal) -> Self {
        Self { token_a, token_b }
    }

    pub fn is_zero(&self) -> bool {
        self.token_a.is_zero() && self.token_b.is_zero()
    }

    /// True when at least one side holds a positive balance.
    pub fn any_positive(&self) -> bool {
        self.token_a > Decimal::ZERO || self.token_b > Decimal::ZERO
    }

    /// Values both sides in the common unit.
    pub fn value(&self, prices: &AssetPrices) -> Decimal {
        self.token_a * prices.token_a + self.token_b * prices.token_b
    }
}

impl Add for TokenAmounts {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            token_a: self.token_a + rhs.token_a,
            token_b: self.token_b + rhs.token_b,
        }
    }
}

impl fmt::Display for TokenAmounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.token_a, self.token_b)
    }
}

/// Unit prices of a pool's assets and its incentive reward, in the portfolio's common unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetPrices {
    pub token_a: Decimal,
    pub token_b: Decimal,
    pub reward: Decimal,
}

impl AssetPrices {
    pub fn new(token_a: Decimal, token_b: Decimal, reward: Decimal) -> Self {
        Self {
            token_a,
            token_b,
            reward,
        }
    }

    /// Prices every asset at one unit, handy when amounts are already expressed in the common unit.
    pub fn unit() -> Self {
        Self::new(Decimal::ONE, Decimal::ONE, Decimal::ONE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_value_uses_both_prices() {
        let amounts = TokenAmounts::new(dec!(2), dec!(50));
        let prices = AssetPrices::new(dec!(150), dec!(1), dec!(0.5));
        assert_eq!(amounts.value(&prices), dec!(350));
    }

    #[test]
    fn test_zero_and_add() {
        assert!(TokenAmounts::ZERO.is_zero());
        let sum = TokenAmounts::new(dec!(1), dec!(0)) + TokenAmounts::new(dec!(0.5), dec!(3));
        assert_eq!(sum, TokenAmounts::new(dec!(1.5), dec!(3)));
        assert!(sum.any_positive());
    }
}
