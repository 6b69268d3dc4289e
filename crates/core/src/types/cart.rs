//! Cart line items, shared by the guest (local) and server carts.

use serde::{Deserialize, Serialize};

use super::id::BookId;
use super::price::Price;

/// One line of a cart.
///
/// The same shape is stored under the guest cart key and returned by every
/// `/cart` endpoint, so a guest cart can be replayed against the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLineItem {
    /// Book ID; unique within a cart.
    pub id: BookId,
    pub title: String,
    #[serde(default)]
    pub image: Option<String>,
    /// Unit price. The server resolves it for authenticated carts.
    #[serde(default)]
    pub price: Price,
    /// Always at least one; a line that would reach zero is removed instead.
    pub quantity: u32,
}

impl CartLineItem {
    /// Price of the whole line.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.price * self.quantity
    }
}

/// What a product page knows when the shopper presses "add to cart".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCartItem {
    pub id: BookId,
    pub title: String,
    pub image: Option<String>,
    /// `None` when the catalog price could not be resolved.
    pub price: Option<Price>,
}

impl NewCartItem {
    /// A fresh line with quantity one; unresolved prices become zero.
    #[must_use]
    pub fn into_line(self) -> CartLineItem {
        CartLineItem {
            id: self.id,
            title: self.title,
            image: self.image,
            price: self.price.unwrap_or(Price::ZERO),
            quantity: 1,
        }
    }
}

/// Sum of all line totals.
#[must_use]
pub fn cart_total(items: &[CartLineItem]) -> Price {
    items.iter().map(CartLineItem::line_total).sum()
}

/// Number of books in the cart (sum of quantities), saturating at
/// `u32::MAX`.
#[must_use]
pub fn cart_item_count(items: &[CartLineItem]) -> u32 {
    items
        .iter()
        .map(|item| item.quantity)
        .fold(0, u32::saturating_add)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn line(id: i32, cents: i64, quantity: u32) -> CartLineItem {
        CartLineItem {
            id: BookId::new(id),
            title: format!("Livro {id}"),
            image: None,
            price: Price::from_cents(cents),
            quantity,
        }
    }

    #[test]
    fn test_totals() {
        let items = vec![line(1, 1000, 2), line(2, 2550, 1)];
        assert_eq!(cart_total(&items), Price::from_cents(4550));
        assert_eq!(cart_item_count(&items), 3);
        assert_eq!(cart_total(&[]), Price::ZERO);
    }

    #[test]
    fn test_huge_quantities_saturate() {
        let items = vec![line(1, 100, u32::MAX / 2 + 1), line(2, 100, u32::MAX / 2 + 1)];
        assert_eq!(cart_item_count(&items), u32::MAX);
        assert!(cart_total(&items) > Price::ZERO);
    }

    #[test]
    fn test_new_item_defaults_price_to_zero() {
        let item = NewCartItem {
            id: BookId::new(9),
            title: "Sem preço".to_string(),
            image: None,
            price: None,
        };
        let line = item.into_line();
        assert_eq!(line.price, Price::ZERO);
        assert_eq!(line.quantity, 1);
    }

    #[test]
    fn test_deserializes_server_line() {
        let json = r#"{"id":3,"title":"Capitães da Areia","image":null,"price":39.9,"quantity":2}"#;
        let item: CartLineItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.line_total(), Price::from_cents(7980));
    }
}
