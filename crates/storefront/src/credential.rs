//! Bearer credential decoding.
//!
//! The backend issues a JWT whose payload carries the user identity and an
//! expiry timestamp. The client never verifies the signature (it has no key);
//! it only reads the payload to learn who is signed in and until when.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

use apagina_core::User;

/// Errors that make a stored or received credential unusable.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The token does not have three dot-separated segments.
    #[error("credential is not a three-part token")]
    Malformed,

    /// The payload segment is not valid base64url.
    #[error("credential payload is not base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The payload is not the expected JSON claims.
    #[error("credential payload is not valid claims: {0}")]
    Claims(#[from] serde_json::Error),

    /// The expiry timestamp is out of range.
    #[error("credential expiry is out of range")]
    InvalidExpiry,

    /// The credential has expired.
    #[error("credential expired at {0}")]
    Expired(DateTime<Utc>),
}

#[derive(Debug, Deserialize)]
struct Claims {
    user: User,
    #[serde(default)]
    iat: Option<i64>,
    exp: i64,
}

/// A decoded credential: the raw token plus what its payload says.
#[derive(Debug, Clone)]
pub struct Credential {
    token: SecretString,
    user: User,
    issued_at: Option<DateTime<Utc>>,
    expires_at: DateTime<Utc>,
}

impl Credential {
    /// Decode a token without checking expiry.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is not a JWT or its payload lacks a user
    /// or an expiry.
    pub fn decode(token: &str) -> Result<Self, CredentialError> {
        let mut segments = token.trim().split('.');
        let (Some(_header), Some(payload), Some(_signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(CredentialError::Malformed);
        };

        let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
        let claims: Claims = serde_json::from_slice(&bytes)?;

        let expires_at =
            DateTime::from_timestamp(claims.exp, 0).ok_or(CredentialError::InvalidExpiry)?;
        let issued_at = claims.iat.and_then(|iat| DateTime::from_timestamp(iat, 0));

        Ok(Self {
            token: SecretString::from(token.trim().to_string()),
            user: claims.user,
            issued_at,
            expires_at,
        })
    }

    /// Decode a token and reject it if it has expired at `now`.
    ///
    /// # Errors
    ///
    /// Returns any decoding error, or `CredentialError::Expired`.
    pub fn decode_valid_at(token: &str, now: DateTime<Utc>) -> Result<Self, CredentialError> {
        let credential = Self::decode(token)?;
        if credential.is_expired_at(now) {
            return Err(CredentialError::Expired(credential.expires_at));
        }
        Ok(credential)
    }

    /// Whether the credential is no longer valid at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// The user the credential was issued to.
    #[must_use]
    pub const fn user(&self) -> &User {
        &self.user
    }

    /// When the credential was issued, if the payload says.
    #[must_use]
    pub const fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.issued_at
    }

    /// When the credential stops being valid.
    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// The raw bearer token.
    #[must_use]
    pub const fn token(&self) -> &SecretString {
        &self.token
    }

    /// The raw bearer token as a string slice, for persistence.
    #[must_use]
    pub fn expose_token(&self) -> &str {
        self.token.expose_secret()
    }
}

/// Build an unsigned token carrying `user` and `exp`. Tests only.
#[cfg(test)]
pub(crate) fn unsigned_token(user: &User, exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        serde_json::json!({ "user": user, "iat": exp - 3600, "exp": exp }).to_string(),
    );
    format!("{header}.{payload}.sig")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;

    use apagina_core::UserId;

    use super::*;

    fn leitor() -> User {
        User {
            id: UserId::new(7),
            username: "leitor".to_string(),
        }
    }

    #[test]
    fn test_decode_reads_user_and_expiry() {
        let exp = Utc::now().timestamp() + 3600;
        let credential = Credential::decode(&unsigned_token(&leitor(), exp)).unwrap();

        assert_eq!(credential.user(), &leitor());
        assert_eq!(credential.expires_at().timestamp(), exp);
        assert_eq!(credential.issued_at().unwrap().timestamp(), exp - 3600);
        assert!(!credential.is_expired_at(Utc::now()));
    }

    #[test]
    fn test_expired_token_rejected() {
        let exp = (Utc::now() - Duration::minutes(1)).timestamp();
        let token = unsigned_token(&leitor(), exp);

        assert!(Credential::decode(&token).is_ok());
        assert!(matches!(
            Credential::decode_valid_at(&token, Utc::now()),
            Err(CredentialError::Expired(_))
        ));
    }

    #[test]
    fn test_malformed_tokens() {
        assert!(matches!(
            Credential::decode("not-a-token"),
            Err(CredentialError::Malformed)
        ));
        assert!(matches!(
            Credential::decode("a.b.c.d"),
            Err(CredentialError::Malformed)
        ));
        assert!(matches!(
            Credential::decode("a.!!!.c"),
            Err(CredentialError::Base64(_))
        ));

        let no_exp = URL_SAFE_NO_PAD.encode(r#"{"user":{"id":1,"username":"x"}}"#);
        assert!(matches!(
            Credential::decode(&format!("h.{no_exp}.s")),
            Err(CredentialError::Claims(_))
        ));
    }

    #[test]
    fn test_padded_payload_accepted() {
        let exp = Utc::now().timestamp() + 60;
        let payload = base64::engine::general_purpose::URL_SAFE.encode(
            serde_json::json!({ "user": leitor(), "exp": exp }).to_string(),
        );
        assert!(Credential::decode(&format!("h.{payload}.s")).is_ok());
    }

    #[test]
    fn test_debug_redacts_token() {
        let token = unsigned_token(&leitor(), Utc::now().timestamp() + 60);
        let credential = Credential::decode(&token).unwrap();
        assert!(!format!("{credential:?}").contains(&token));
    }
}
