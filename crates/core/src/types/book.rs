//! Catalog types returned by the books, reviews, genres and favorites endpoints.

use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::cart::NewCartItem;
use super::id::{BookId, GenreId, ReviewId};
use super::price::Price;

/// A catalog row as listed by `GET /books` and `GET /favorites`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    #[serde(default)]
    pub authors: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub categories: Option<String>,
    /// Raw price as sent by the backend (`"$12.99"`, `12.99` or `null`).
    #[serde(default, deserialize_with = "string_or_number")]
    pub price: Option<String>,
    #[serde(default)]
    pub average_score: Option<f64>,
    #[serde(default)]
    pub reviews_count: Option<u32>,
    /// Present only when the request carried a credential.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
}

impl Book {
    /// The parsed price, if the catalog has a usable one.
    #[must_use]
    pub fn price(&self) -> Option<Price> {
        self.price.as_deref().and_then(Price::parse_lenient)
    }

    /// Authors as a clean list.
    #[must_use]
    pub fn author_list(&self) -> Vec<String> {
        clean_list(self.authors.as_deref())
    }

    /// Categories as a clean list.
    #[must_use]
    pub fn category_list(&self) -> Vec<String> {
        clean_list(self.categories.as_deref())
    }

    /// What "add to cart" sends for this book.
    #[must_use]
    pub fn cart_item(&self) -> NewCartItem {
        NewCartItem {
            id: self.id,
            title: self.title.clone(),
            image: self.image.clone(),
            price: self.price(),
        }
    }
}

/// `GET /favorites` returns catalog rows whose `is_favorite` is always true.
pub type FavoriteBook = Book;

/// Full record from `GET /books/:id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookDetails {
    #[serde(flatten)]
    pub book: Book,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "previewLink")]
    pub preview_link: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default, rename = "publishedDate")]
    pub published_date: Option<String>,
    #[serde(default, rename = "infoLink")]
    pub info_link: Option<String>,
}

/// A reader review from `GET /books/:id/reviews`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    #[serde(default, rename = "profileName")]
    pub profile_name: Option<String>,
    #[serde(default)]
    pub review_score: Option<f64>,
    /// Unix timestamp in seconds.
    #[serde(default)]
    pub review_time: Option<i64>,
    #[serde(default)]
    pub review_summary: Option<String>,
    #[serde(default)]
    pub review_text: Option<String>,
}

impl Review {
    /// When the review was written.
    #[must_use]
    pub fn reviewed_at(&self) -> Option<DateTime<Utc>> {
        self.review_time
            .filter(|&secs| secs > 0)
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }
}

/// A literary genre offered at registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Genre {
    pub id: GenreId,
    pub name: String,
}

/// Pagination block of a book listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default, alias = "totalItems")]
    pub total: Option<u32>,
    #[serde(default)]
    pub total_pages: Option<u32>,
}

/// A page of `GET /books`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookPage {
    #[serde(default)]
    pub data: Vec<Book>,
    #[serde(default)]
    pub pagination: Pagination,
}

/// Average score rounded to the nearest half star, out of five.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StarRating {
    score: Option<f64>,
}

impl StarRating {
    /// Maximum number of stars.
    pub const MAX_STARS: u8 = 5;

    /// Wrap an optional average score.
    #[must_use]
    pub fn new(score: Option<f64>) -> Self {
        Self {
            score: score.filter(|s| s.is_finite()),
        }
    }

    /// `(full, half, empty)` star counts.
    #[must_use]
    pub fn stars(&self) -> Option<(u8, bool, u8)> {
        let score = self.score?;
        let rounded = (score.clamp(0.0, f64::from(Self::MAX_STARS)) * 2.0).round() / 2.0;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // clamped to 0..=5
        let full = rounded.floor() as u8;
        let half = rounded.fract() > 0.0;
        let empty = Self::MAX_STARS - full - u8::from(half);
        Some((full, half, empty))
    }
}

impl fmt::Display for StarRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.stars(), self.score) {
            (Some((full, half, empty)), Some(score)) => write!(
                f,
                "{}{}{} ({score:.1})",
                "★".repeat(usize::from(full)),
                if half { "½" } else { "" },
                "☆".repeat(usize::from(empty)),
            ),
            _ => f.write_str("Sem nota"),
        }
    }
}

/// Split a list-like catalog string (`"['Ana', 'Bia']"`) into clean entries.
#[must_use]
pub fn clean_list(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw else {
        return Vec::new();
    };

    raw.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(|item| item.replace(['\'', '"'], "").trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_list() {
        assert_eq!(
            clean_list(Some("['Machado de Assis', \"Clarice Lispector\"]")),
            vec!["Machado de Assis", "Clarice Lispector"]
        );
        assert_eq!(clean_list(Some("Jorge Amado")), vec!["Jorge Amado"]);
        assert!(clean_list(Some("[]")).is_empty());
        assert!(clean_list(None).is_empty());
    }

    #[test]
    fn test_book_price_accepts_string_or_number() {
        let from_string: Book =
            serde_json::from_str(r#"{"id":1,"title":"Dom Casmurro","price":"$12.50"}"#).unwrap();
        assert_eq!(from_string.price(), Some(Price::from_cents(1250)));

        let from_number: Book =
            serde_json::from_str(r#"{"id":2,"title":"Iracema","price":9.9}"#).unwrap();
        assert_eq!(from_number.price(), Some(Price::from_cents(990)));

        let missing: Book = serde_json::from_str(r#"{"id":3,"title":"Sem preço"}"#).unwrap();
        assert_eq!(missing.price(), None);
    }

    #[test]
    fn test_cart_item_carries_parsed_price() {
        let book: Book =
            serde_json::from_str(r#"{"id":4,"title":"O Cortiço","price":"R$ 30,00"}"#).unwrap();
        let item = book.cart_item();
        assert_eq!(item.id, BookId::new(4));
        assert_eq!(item.price, Some(Price::from_cents(3000)));

        let unpriced: Book =
            serde_json::from_str(r#"{"id":5,"title":"Sem preço","price":"n/d"}"#).unwrap();
        assert_eq!(unpriced.cart_item().price, None);
    }

    #[test]
    fn test_book_details_flattens_book() {
        let details: BookDetails = serde_json::from_str(
            r#"{"id":7,"title":"Vidas Secas","publisher":"Record","previewLink":"http://x"}"#,
        )
        .unwrap();
        assert_eq!(details.book.id, BookId::new(7));
        assert_eq!(details.publisher.as_deref(), Some("Record"));
        assert_eq!(details.preview_link.as_deref(), Some("http://x"));
    }

    #[test]
    fn test_star_rating() {
        assert_eq!(StarRating::new(Some(3.6)).stars(), Some((3, true, 1)));
        assert_eq!(StarRating::new(Some(4.8)).stars(), Some((5, false, 0)));
        assert_eq!(StarRating::new(Some(3.6)).to_string(), "★★★½☆ (3.6)");
        assert_eq!(StarRating::new(None).to_string(), "Sem nota");
        assert_eq!(StarRating::new(Some(f64::NAN)).to_string(), "Sem nota");
    }

    #[test]
    fn test_review_time() {
        let review = Review {
            id: ReviewId::new(1),
            profile_name: None,
            review_score: Some(5.0),
            review_time: Some(0),
            review_summary: None,
            review_text: None,
        };
        assert!(review.reviewed_at().is_none());

        let dated = Review {
            review_time: Some(1_000_000_000),
            ..review
        };
        assert_eq!(dated.reviewed_at().unwrap().timestamp(), 1_000_000_000);
    }

    #[test]
    fn test_book_page_defaults() {
        let page: BookPage = serde_json::from_str(r#"{"data":[]}"#).unwrap();
        assert!(page.data.is_empty());
        assert_eq!(page.pagination, Pagination::default());
    }
}
