//! Type-safe price representation using decimal arithmetic.
//!
//! The backend serializes prices as decimal strings (`"500.00"`), while some
//! payloads and hand-written fixtures carry plain JSON numbers. [`Price`]
//! accepts both and always serializes back as a decimal string, so no
//! floating point ever touches a money amount.

use core::fmt;
use core::iter::Sum;
use core::ops::Add;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A non-negative money amount in the store currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// A zero amount.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Create a price from minor units (e.g. kopecks or cents).
    #[must_use]
    pub fn from_minor(minor: i64) -> Self {
        Self(Decimal::new(minor, 2))
    }

    /// Get the underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Price of `quantity` units at this unit price.
    #[must_use]
    pub fn times(self, quantity: u32) -> Self {
        Self(self.0 * Decimal::from(quantity))
    }

    /// Format for display with the given currency (e.g. `"1 500.00 ₽"`).
    #[must_use]
    pub fn display(&self, currency: CurrencyCode) -> String {
        let rounded = self.0.round_dp(2);
        let formatted = format!("{rounded:.2}");
        let (whole, fraction) = formatted.split_once('.').unwrap_or((&formatted, "00"));
        let grouped = group_thousands(whole);
        match currency {
            CurrencyCode::RUB => format!("{grouped}.{fraction} {}", currency.symbol()),
            CurrencyCode::USD | CurrencyCode::EUR => {
                format!("{}{grouped}.{fraction}", currency.symbol())
            }
        }
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl From<Decimal> for Price {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

/// Insert a thin space between groups of three digits.
fn group_thousands(whole: &str) -> String {
    let (sign, digits) = whole
        .strip_prefix('-')
        .map_or(("", whole), |rest| ("-", rest));
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(' ');
        }
        out.push(ch);
    }
    format!("{sign}{out}")
}

/// ISO 4217 currency codes the storefront can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    RUB,
    USD,
    EUR,
}

impl CurrencyCode {
    /// Currency symbol used when rendering prices.
    #[must_use]
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::RUB => "₽",
            Self::USD => "$",
            Self::EUR => "€",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_from_string_and_number() {
        let from_str: Price = serde_json::from_str("\"500.00\"").unwrap();
        let from_num: Price = serde_json::from_str("500").unwrap();
        assert_eq!(from_str, from_num);
        assert_eq!(from_str, Price::from_minor(50_000));
    }

    #[test]
    fn test_times_and_sum() {
        let unit = Price::from_minor(1_250);
        assert_eq!(unit.times(3), Price::from_minor(3_750));

        let total: Price = [Price::from_minor(100), Price::from_minor(250)]
            .into_iter()
            .sum();
        assert_eq!(total, Price::from_minor(350));

        let empty: Price = core::iter::empty().sum();
        assert_eq!(empty, Price::ZERO);
    }

    #[test]
    fn test_display_rub() {
        assert_eq!(
            Price::from_minor(150_000).display(CurrencyCode::RUB),
            "1 500.00 ₽"
        );
        assert_eq!(Price::from_minor(99).display(CurrencyCode::RUB), "0.99 ₽");
    }

    #[test]
    fn test_display_usd() {
        assert_eq!(
            Price::from_minor(123_456_789).display(CurrencyCode::USD),
            "$1 234 567.89"
        );
    }

    #[test]
    fn test_plain_display() {
        assert_eq!(Price::from_minor(500).to_string(), "5.00");
    }
}
