//! Unified error handling with Sentry integration.
//!
//! Provides a unified `ClientError` type returned by every manager
//! operation, plus helpers that attach user context and breadcrumbs to
//! Sentry events.

use thiserror::Error;

use crate::api::{ApiError, ErrorKind};
use crate::config::ConfigError;
use crate::storage::StorageError;

/// Client-level error type.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Backend request failed.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Local storage operation failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration could not be loaded.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// The operation requires a signed-in user.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Checkout was attempted with an empty cart.
    #[error("Cart is empty")]
    EmptyCart,

    /// Required checkout fields are missing.
    #[error("Missing required fields: {}", .0.join(", "))]
    InvalidForm(Vec<&'static str>),
}

impl ClientError {
    /// Classify backend failures; local failures have no kind.
    #[must_use]
    pub const fn api_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Api(err) => Some(err.kind()),
            _ => None,
        }
    }

    /// A message safe to show to the user.
    ///
    /// Backend validation messages are passed through; everything else maps
    /// to a fixed message that does not expose internals.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Api(err) => match err.kind() {
                ErrorKind::Auth => "Session expired, please sign in again".to_string(),
                ErrorKind::NotFound => "Not found".to_string(),
                ErrorKind::Validation => {
                    if let Some(detail) = err.detail() {
                        return detail.to_string();
                    }
                    let fields = err.field_errors();
                    if fields.is_empty() {
                        "The request was rejected".to_string()
                    } else {
                        fields
                            .iter()
                            .map(|(field, messages)| format!("{field}: {}", messages.join(" ")))
                            .collect::<Vec<_>>()
                            .join("; ")
                    }
                }
                ErrorKind::Transient => "Service unavailable, please try again later".to_string(),
            },
            Self::Storage(_) | Self::Config(_) | Self::HttpClient(_) => {
                "Internal error".to_string()
            }
            Self::NotAuthenticated => "Please sign in to continue".to_string(),
            Self::EmptyCart => "Your cart is empty".to_string(),
            Self::InvalidForm(fields) => format!("Please fill in: {}", fields.join(", ")),
        }
    }
}

/// Result type alias for `ClientError`.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.filter(|e| !e.is_empty()).map(String::from),
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

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added item", Some(&[("product_id", "42")]));
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
