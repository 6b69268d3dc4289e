//! Request and response bodies that exist only on the wire.

use serde::{Deserialize, Serialize};

use apagina_core::{BookId, FieldError, Review};

/// `POST /auth/login` body.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest<'a> {
    pub login_identifier: &'a str,
    pub password: &'a str,
}

/// `POST /auth/login` response. The token is optional so a 2xx without one
/// is reported as a failed login rather than a parse error.
#[derive(Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub token: Option<String>,
}

/// `POST /cart` body. The backend adds `quantity` to any existing line.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest {
    pub book_id: BookId,
    pub quantity: u32,
}

/// `PUT /cart/:bookId` body.
#[derive(Debug, Serialize)]
pub struct UpdateQuantityRequest {
    pub quantity: u32,
}

/// `GET /books/:id/reviews` response.
#[derive(Deserialize)]
pub struct ReviewsResponse {
    #[serde(default)]
    pub data: Vec<Review>,
}

/// Error bodies the backend is known to send:
/// `{ errors: [...] }`, `{ error: "..." }`, `{ error: { message } }` or
/// `{ message }`.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub errors: Option<Vec<FieldError>>,
    #[serde(default)]
    pub error: Option<ErrorDetail>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ErrorDetail {
    Text(String),
    Object { message: String },
}

impl ErrorBody {
    /// Flatten whatever shape arrived into a list of field errors.
    pub fn into_field_errors(self) -> Vec<FieldError> {
        if let Some(errors) = self.errors
            && !errors.is_empty()
        {
            return errors;
        }

        let message = match self.error {
            Some(ErrorDetail::Text(text) | ErrorDetail::Object { message: text }) => Some(text),
            None => self.message,
        };

        message
            .filter(|m| !m.trim().is_empty())
            .map(FieldError::general)
            .into_iter()
            .collect()
    }
}
