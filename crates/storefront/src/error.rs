//! Unified error handling with Sentry integration.
//!
//! Holders never return errors across their public API; they keep a
//! shopper-facing message instead. `ClientError` is the one error type that
//! does escape, from session construction, and `report` is the single place
//! backend failures are forwarded to Sentry.

use thiserror::Error;

use crate::api::ApiError;
use crate::config::ConfigError;
use crate::storage::StorageError;

/// Errors raised while wiring a storefront session together.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The HTTP client could not be built.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Durable storage failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type alias for `ClientError`.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Log a failed backend call and capture the unexpected ones to Sentry.
///
/// Rejections the shopper can act on (validation, auth, not found, rate
/// limit) are logged only. Transport, parse and server errors are captured.
pub fn report(action: &str, error: &ApiError) {
    let unexpected = match error {
        ApiError::Http(_) | ApiError::InvalidUrl(_) | ApiError::Parse(_) => true,
        ApiError::Rejected { status, .. } => *status >= 500,
        ApiError::Unauthorized(_) | ApiError::NotFound(_) | ApiError::RateLimited(_) => false,
    };

    if unexpected {
        let event_id = sentry::capture_error(error);
        tracing::error!(
            action = action,
            error = %error,
            sentry_event_id = %event_id,
            "Backend call failed"
        );
    } else {
        tracing::warn!(action = action, error = %error, "Backend call rejected");
    }
}

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, username: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            username: username.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for shopper actions.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added book", Some(&[("book_id", "123")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_display() {
        let err = ClientError::Config(ConfigError::InvalidEnvVar(
            "APAGINA_API_URL".to_string(),
            "relative URL without a base".to_string(),
        ));
        assert_eq!(
            err.to_string(),
            "Configuration error: Invalid environment variable APAGINA_API_URL: relative URL without a base"
        );
    }

    #[test]
    fn test_report_without_sentry_client_is_harmless() {
        report("load_cart", &ApiError::NotFound(String::new()));
        report(
            "load_cart",
            &ApiError::Rejected {
                status: 502,
                errors: vec![],
            },
        );
    }
}
