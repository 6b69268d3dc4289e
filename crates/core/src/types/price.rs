//! Type-safe price representation using decimal arithmetic.
//!
//! The shop sells in Brazilian reais only, so a price is a bare decimal
//! amount displayed as `R$ 12,34`.

use core::fmt;
use core::iter::Sum;
use core::ops::{Add, Mul};
use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A price in Brazilian reais.
///
/// Serialized as a decimal string; deserializes from either a JSON number
/// (the cart and favorites endpoints) or a numeric string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// A zero price, used when the catalog has no price for a book.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a price from a decimal amount.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Create a price from an amount in centavos.
    #[must_use]
    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, 2))
    }

    /// The decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Leniently parse a price string from the catalog.
    ///
    /// Strips currency symbols and anything else that is not a digit or a
    /// decimal separator (`"$12.99"` and `"R$ 12,99"` both parse). Returns
    /// `None` when nothing numeric remains or the amount is negative.
    #[must_use]
    pub fn parse_lenient(input: &str) -> Option<Self> {
        let cleaned: String = input
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
            .collect();

        // A comma is the decimal separator only when no dot is present
        let normalized = if cleaned.contains('.') {
            cleaned.replace(',', "")
        } else {
            cleaned.replace(',', ".")
        };

        if normalized.is_empty() {
            return None;
        }

        Decimal::from_str(&normalized)
            .ok()
            .filter(|d| !d.is_sign_negative())
            .map(Self)
    }

    /// Format an optional catalog price, falling back to "Indisponível".
    #[must_use]
    pub fn display_or_unavailable(price: Option<Self>) -> String {
        price.map_or_else(|| "Indisponível".to_string(), |p| p.to_string())
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let amount = format!("{:.2}", self.0.round_dp(2));
        write!(f, "R$ {}", amount.replace('.', ","))
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Mul<u32> for Price {
    type Output = Self;

    fn mul(self, quantity: u32) -> Self::Output {
        Self(self.0.saturating_mul(Decimal::from(quantity)))
    }
}

impl Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl From<Decimal> for Price {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display_uses_comma_separator() {
        assert_eq!(Price::from_cents(1234).to_string(), "R$ 12,34");
        assert_eq!(Price::from_cents(500).to_string(), "R$ 5,00");
        assert_eq!(Price::ZERO.to_string(), "R$ 0,00");
    }

    #[test]
    fn test_parse_lenient_strips_symbols() {
        assert_eq!(Price::parse_lenient("$12.34"), Some(Price::from_cents(1234)));
        assert_eq!(Price::parse_lenient("R$ 12,34"), Some(Price::from_cents(1234)));
        assert_eq!(Price::parse_lenient("1,299.90"), Some(Price::from_cents(129_990)));
    }

    #[test]
    fn test_parse_lenient_rejects_non_numeric() {
        assert_eq!(Price::parse_lenient(""), None);
        assert_eq!(Price::parse_lenient("grátis"), None);
        assert_eq!(Price::parse_lenient("1.2.3"), None);
    }

    #[test]
    fn test_display_or_unavailable() {
        assert_eq!(Price::display_or_unavailable(None), "Indisponível");
        assert_eq!(
            Price::display_or_unavailable(Some(Price::from_cents(990))),
            "R$ 9,90"
        );
    }

    #[test]
    fn test_deserializes_from_number_and_string() {
        let from_number: Price = serde_json::from_str("29.9").unwrap();
        let from_string: Price = serde_json::from_str("\"29.90\"").unwrap();
        assert_eq!(from_number, Price::from_cents(2990));
        assert_eq!(from_string, Price::from_cents(2990));
    }

    #[test]
    fn test_arithmetic() {
        let total: Price = [Price::from_cents(1000) * 2, Price::from_cents(550)]
            .into_iter()
            .sum();
        assert_eq!(total, Price::from_cents(2550));
    }

    #[test]
    fn test_arithmetic_saturates() {
        let huge = Price::from(Decimal::MAX);
        assert_eq!(huge * u32::MAX, huge);
        assert_eq!(huge + Price::from_cents(100), huge);
    }
}
