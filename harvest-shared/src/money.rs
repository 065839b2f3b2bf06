use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::ModelError;

/// Currency places carried by every amount.
const MONEY_DP: u32 = 2;
/// Places shown for display percentages.
const PERCENT_DP: u32 = 1;

/// Fixed-point currency amount with exactly two decimal places.
///
/// Serialized as a decimal string (`"425.75"`) so figures survive JSON round
/// trips without floating-point drift. Sums go through [`Money::checked_add`]
/// or [`Money::checked_sum`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(Decimal);

impl Default for Money {
    fn default() -> Self {
        Money::ZERO
    }
}

impl Money {
    pub const ZERO: Money = Money(Decimal::from_parts(0, 0, 0, false, MONEY_DP));

    /// Rounds half away from zero to two places; `None` if the value cannot
    /// carry two places.
    fn rounded(value: Decimal) -> Option<Money> {
        let mut value = value.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero);
        value.rescale(MONEY_DP);
        (value.scale() == MONEY_DP).then_some(Money(value))
    }

    pub fn amount(self) -> Decimal {
        self.0
    }

    pub fn is_negative(self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).and_then(Money::rounded)
    }

    /// Sum of `amounts`, `None` on overflow.
    pub fn checked_sum<I: IntoIterator<Item = Money>>(amounts: I) -> Option<Money> {
        amounts
            .into_iter()
            .try_fold(Money::ZERO, |total, amount| total.checked_add(amount))
    }

    /// Unit price times quantity, `None` on overflow.
    pub fn checked_times(self, quantity: u32) -> Option<Money> {
        self.0
            .checked_mul(Decimal::from(quantity))
            .and_then(Money::rounded)
    }

    /// Divides by `count`, rounding half away from zero. Zero count yields zero.
    pub fn div_rounded(self, count: u64) -> Money {
        self.0
            .checked_div(Decimal::from(count))
            .and_then(Money::rounded)
            .unwrap_or(Money::ZERO)
    }

    /// Share of `total` this amount represents, rounded to one decimal place.
    pub fn share_of(self, total: Money) -> Option<Percent> {
        if total.0.is_zero() {
            return Some(Percent::ZERO);
        }
        let mut share = self
            .0
            .checked_mul(Decimal::ONE_HUNDRED)?
            .checked_div(total.0)?
            .round_dp_with_strategy(PERCENT_DP, RoundingStrategy::MidpointAwayFromZero);
        share.rescale(PERCENT_DP);
        Some(Percent(share))
    }
}

impl TryFrom<Decimal> for Money {
    type Error = ModelError;

    /// Accepts values with at most two significant decimal places.
    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        if value.normalize().scale() > MONEY_DP {
            return Err(ModelError::InvalidAmount(value.to_string()));
        }
        Money::rounded(value).ok_or_else(|| ModelError::InvalidAmount(value.to_string()))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for Money {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim()).map_err(|_| ModelError::InvalidAmount(s.to_string()))?;
        Money::try_from(value)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = <Decimal as Deserialize>::deserialize(deserializer)?;
        Money::try_from(value).map_err(de::Error::custom)
    }
}

/// Percentage rounded to one decimal place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Percent(Decimal);

impl Default for Percent {
    fn default() -> Self {
        Percent::ZERO
    }
}

impl Percent {
    pub const ZERO: Percent = Percent(Decimal::from_parts(0, 0, 0, false, PERCENT_DP));

    pub fn as_f64(self) -> f64 {
        self.0.to_f64().unwrap_or_default()
    }
}

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Serialize for Percent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}
