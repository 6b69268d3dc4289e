//! Account types: the signed-in user and the registration payload.

use core::fmt;

use serde::{Deserialize, Serialize};

use super::email::Email;
use super::id::{BookId, GenreId, UserId};

/// The user identity carried inside a bearer credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Backend user ID.
    pub id: UserId,
    /// Display name chosen at registration.
    pub username: String,
}

/// A single validation message, either produced locally or returned by the
/// backend (`{ "msg": "...", "path": "email" }`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Human-readable message, shown verbatim.
    pub msg: String,
    /// Form field the message refers to, when known.
    #[serde(default, alias = "path", alias = "param", skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl FieldError {
    /// A message not tied to a specific field.
    #[must_use]
    pub fn general(msg: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            field: None,
        }
    }

    /// A message for a specific form field.
    #[must_use]
    pub fn for_field(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            field: Some(field.into()),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{field}: {}", self.msg),
            None => f.write_str(&self.msg),
        }
    }
}

/// Payload for `POST /auth/register`.
///
/// `Debug` is implemented manually so the password never reaches logs.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub email: Email,
    pub password: String,
    pub favorite_book_ids: Vec<BookId>,
    pub favorite_genre_ids: Vec<GenreId>,
}

impl fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("favorite_book_ids", &self.favorite_book_ids)
            .field("favorite_genre_ids", &self.favorite_genre_ids)
            .finish()
    }
}

/// Outcome of a registration attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterResult {
    /// The account was created. The user still has to log in.
    Success,
    /// The form (or the backend) rejected the input.
    ValidationFailure(Vec<FieldError>),
    /// Anything else: transport failure, unexpected status.
    UnknownFailure(String),
}

impl RegisterResult {
    /// Whether the account was created.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Messages to display for a failed attempt (empty on success).
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        match self {
            Self::Success => Vec::new(),
            Self::ValidationFailure(errors) => errors.iter().map(|e| e.msg.clone()).collect(),
            Self::UnknownFailure(message) => vec![message.clone()],
        }
    }
}
