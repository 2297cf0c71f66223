//! Marketplace REST API client.
//!
//! # Architecture
//!
//! - One [`ApiClient`] per application, cheaply cloneable via `Arc`
//! - JSON in, JSON out; `204 No Content` and empty bodies decode to `None`
//! - Every non-2xx response becomes [`ApiError::Status`] carrying the status
//!   and the parsed body (`{}` when the body is not JSON)
//! - The client never mutates session or cart state. A `401` on a request
//!   that carried a bearer token is published as a token rejection and the
//!   session manager decides what to do with it.
//! - Catalog reads are cached via `moka` (5 minute TTL by default)
//!
//! # Example
//!
//! ```rust,ignore
//! use cornermarket_storefront::api::ApiClient;
//!
//! let api = ApiClient::new(&config)?;
//! let cart = api.get_cart().await?;
//! let page = api.list_products(&ProductQuery::default()).await?;
//! ```

mod account;
mod auth;
mod cache;
mod cart;
mod catalog;
mod favorites;
mod seller;
pub mod types;

pub use types::*;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use moka::future::Cache;
use reqwest::Method;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{RwLock, watch};
use tracing::{debug, warn};

use crate::config::ClientConfig;

use cache::CacheValue;

/// Backend paths, relative to the base URL.
pub mod paths {
    pub const LOGIN: &str = "/api/auth/login/";
    pub const REGISTER: &str = "/api/auth/register/";
    pub const CURRENT_USER: &str = "/api/auth/user/";
    pub const REFRESH: &str = "/api/auth/refresh/";
    pub const BECOME_SELLER: &str = "/api/auth/become-seller/";
    pub const PROFILE: &str = "/api/users/profile/";
    pub const PRODUCTS: &str = "/api/products/";
    pub const CATEGORIES: &str = "/api/categories/";
    pub const REVIEWS: &str = "/api/reviews/";
    pub const CART: &str = "/api/cart/";
    pub const FAVORITES: &str = "/api/favorites/";
    pub const FAVORITES_TOGGLE: &str = "/api/favorites/toggle/";
    pub const ORDERS: &str = "/api/orders/";
    pub const SELLER_PRODUCTS: &str = "/api/sellers/products/";
    pub const SELLER_ORDERS: &str = "/api/sellers/orders/";
    pub const SELLER_ANALYTICS: &str = "/api/sellers/analytics/";

    /// `{collection}{id}/`
    #[must_use]
    pub fn item(collection: &str, id: impl std::fmt::Display) -> String {
        format!("{collection}{id}/")
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Errors returned by the REST API client.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("API error ({status}): {body}")]
    Status { status: u16, body: Value },

    /// JSON encoding or decoding failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Coarse classification of an [`ApiError`] for callers and views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 401: the session is no longer valid.
    Auth,
    /// 404: the resource does not exist.
    NotFound,
    /// Any other 4xx, usually with field-level messages.
    Validation,
    /// Network failure, 5xx or an undecodable response.
    Transient,
}

impl ApiError {
    /// HTTP status, if the backend responded.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(_) | Self::Parse(_) => None,
        }
    }

    /// Classify the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Status { status: 401, .. } => ErrorKind::Auth,
            Self::Status { status: 404, .. } => ErrorKind::NotFound,
            Self::Status { status, .. } if *status >= 400 && *status < 500 => {
                ErrorKind::Validation
            }
            Self::Status { .. } | Self::Http(_) | Self::Parse(_) => ErrorKind::Transient,
        }
    }

    /// The `detail` message of a DRF error body.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Status { body, .. } => body.get("detail").and_then(Value::as_str),
            Self::Http(_) | Self::Parse(_) => None,
        }
    }

    /// Field-level messages of a DRF validation body, keyed by field name.
    ///
    /// `non_field_errors` is kept under its own key; `detail` is excluded.
    #[must_use]
    pub fn field_errors(&self) -> BTreeMap<String, Vec<String>> {
        let Self::Status { body, .. } = self else {
            return BTreeMap::new();
        };
        let Some(object) = body.as_object() else {
            return BTreeMap::new();
        };

        object
            .iter()
            .filter(|(key, _)| key.as_str() != "detail")
            .filter_map(|(key, value)| {
                let messages: Vec<String> = match value {
                    Value::String(s) => vec![s.clone()],
                    Value::Array(items) => items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(String::from)
                        .collect(),
                    _ => Vec::new(),
                };
                (!messages.is_empty()).then(|| (key.clone(), messages))
            })
            .collect()
    }
}

// =============================================================================
// ApiClient
// =============================================================================

/// Whether a request should carry the bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Auth {
    Bearer,
    Anonymous,
}

struct BearerToken {
    value: SecretString,
    epoch: u64,
}

/// Client for the marketplace REST API.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    client: reqwest::Client,
    base_url: String,
    token: RwLock<Option<BearerToken>>,
    epoch: AtomicU64,
    rejections: watch::Sender<Option<u64>>,
    cache: Cache<String, CacheValue>,
}

impl ApiClient {
    /// Create a new API client.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(config.catalog_cache_ttl)
            .build();

        let (rejections, _) = watch::channel(None);

        Ok(Self {
            inner: Arc::new(ApiClientInner {
                client,
                base_url: config.api_url.trim_end_matches('/').to_string(),
                token: RwLock::new(None),
                epoch: AtomicU64::new(0),
                rejections,
                cache,
            }),
        })
    }

    /// The base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    // =========================================================================
    // Token Management
    // =========================================================================

    /// Attach `token` to subsequent requests. Returns the new token epoch.
    pub async fn set_token(&self, token: SecretString) -> u64 {
        let mut guard = self.inner.token.write().await;
        let epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        *guard = Some(BearerToken {
            value: token,
            epoch,
        });
        epoch
    }

    /// Stop sending a bearer token.
    pub async fn clear_token(&self) {
        let mut guard = self.inner.token.write().await;
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        *guard = None;
    }

    /// Check if a bearer token is set.
    pub async fn has_token(&self) -> bool {
        self.inner.token.read().await.is_some()
    }

    /// Epoch of the current token, `None` when anonymous.
    pub async fn token_epoch(&self) -> Option<u64> {
        self.inner.token.read().await.as_ref().map(|t| t.epoch)
    }

    /// Receive the epoch of every token the backend rejected with `401`.
    #[must_use]
    pub fn subscribe_rejections(&self) -> watch::Receiver<Option<u64>> {
        self.inner.rejections.subscribe()
    }

    // =========================================================================
    // Request Execution
    // =========================================================================

    /// Send a request and decode the response body.
    ///
    /// `Ok(None)` means the backend answered with no content.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Status`] for non-2xx responses, [`ApiError::Http`]
    /// on transport failure and [`ApiError::Parse`] for undecodable bodies.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Option<T>, ApiError> {
        self.execute(method, path, body, Auth::Bearer).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        auth: Auth,
    ) -> Result<Option<T>, ApiError> {
        let url = format!("{}{path}", self.inner.base_url);

        let mut request = self
            .inner
            .client
            .request(method.clone(), &url)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json");

        let mut sent_epoch = None;
        if auth == Auth::Bearer
            && let Some(token) = self.inner.token.read().await.as_ref()
        {
            request = request.bearer_auth(token.value.expose_secret());
            sent_epoch = Some(token.epoch);
        }

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let body = serde_json::from_str(&text)
                .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
            debug!(
                method = %method,
                path = %path,
                status = status.as_u16(),
                "API returned non-success status"
            );

            if status == reqwest::StatusCode::UNAUTHORIZED
                && let Some(epoch) = sent_epoch
            {
                warn!(path = %path, "Bearer token rejected");
                self.inner.rejections.send_replace(Some(epoch));
            }

            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        if status == reqwest::StatusCode::NO_CONTENT || text.trim().is_empty() {
            return Ok(None);
        }

        match serde_json::from_str(&text) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    path = %path,
                    body = %text.chars().take(500).collect::<String>(),
                    "Failed to parse API response"
                );
                Err(ApiError::Parse(e))
            }
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        required(self.execute(Method::GET, path, None, Auth::Bearer).await?)
    }

    async fn send_json<T, B>(
        &self,
        method: Method,
        path: &str,
        body: &B,
        auth: Auth,
    ) -> Result<Option<T>, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = serde_json::to_value(body)?;
        self.execute(method, path, Some(&body), auth).await
    }

    async fn post<T, B>(&self, path: &str, body: &B) -> Result<Option<T>, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send_json(Method::POST, path, body, Auth::Bearer).await
    }

    async fn patch<T, B>(&self, path: &str, body: &B) -> Result<Option<T>, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send_json(Method::PATCH, path, body, Auth::Bearer).await
    }

    async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, ApiError> {
        self.execute(Method::DELETE, path, None, Auth::Bearer).await
    }

    // =========================================================================
    // Cache Management
    // =========================================================================

    /// Invalidate all cached catalog data.
    pub async fn invalidate_catalog(&self) {
        self.inner.cache.invalidate_all();
        self.inner.cache.run_pending_tasks().await;
    }
}

/// Decode a body the caller cannot do without.
///
/// An empty response is decoded from `null`, so `Option<T>` targets become
/// `None` and everything else becomes a parse error.
fn required<T: DeserializeOwned>(value: Option<T>) -> Result<T, ApiError> {
    match value {
        Some(value) => Ok(value),
        None => Ok(serde_json::from_value(Value::Null)?),
    }
}

/// Append `pairs` as a query string.
fn with_query(path: &str, pairs: &[(&str, String)]) -> String {
    if pairs.is_empty() {
        return path.to_string();
    }
    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs.iter().map(|(k, v)| (*k, v.as_str())))
        .finish();
    format!("{path}?{query}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn status(status: u16, body: Value) -> ApiError {
        ApiError::Status { status, body }
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(status(401, json!({})).kind(), ErrorKind::Auth);
        assert_eq!(status(404, json!({})).kind(), ErrorKind::NotFound);
        assert_eq!(status(400, json!({})).kind(), ErrorKind::Validation);
        assert_eq!(status(403, json!({})).kind(), ErrorKind::Validation);
        assert_eq!(status(502, json!({})).kind(), ErrorKind::Transient);

        let parse = serde_json::from_str::<Value>("{").unwrap_err();
        assert_eq!(ApiError::Parse(parse).kind(), ErrorKind::Transient);
    }

    #[test]
    fn test_detail_and_field_errors() {
        let err = status(
            400,
            json!({
                "detail": "Корзина пуста.",
                "contact_phone": ["Укажите номер телефона."],
                "non_field_errors": "Bad input",
                "count": 3
            }),
        );
        assert_eq!(err.detail(), Some("Корзина пуста."));
        let fields = err.field_errors();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields["contact_phone"], vec!["Укажите номер телефона."]);
        assert_eq!(fields["non_field_errors"], vec!["Bad input"]);
    }

    #[test]
    fn test_field_errors_non_object_body() {
        assert!(status(400, json!(["oops"])).field_errors().is_empty());
        assert!(status(500, json!({})).detail().is_none());
    }

    #[test]
    fn test_with_query_encodes() {
        assert_eq!(with_query(paths::PRODUCTS, &[]), "/api/products/");
        assert_eq!(
            with_query(
                paths::PRODUCTS,
                &[("search", "green tea".to_string()), ("page", "2".to_string())]
            ),
            "/api/products/?search=green+tea&page=2"
        );
    }

    #[test]
    fn test_required_empty_body() {
        let none: Option<User> = required(None::<Option<User>>).unwrap();
        assert!(none.is_none());
        assert!(matches!(required::<User>(None), Err(ApiError::Parse(_))));
    }

    #[test]
    fn test_item_path() {
        assert_eq!(paths::item(paths::CART, 7), "/api/cart/7/");
    }

    #[tokio::test]
    async fn test_token_epochs_increase() {
        let config = ClientConfig::for_api_url("http://127.0.0.1:9").unwrap();
        let api = ApiClient::new(&config).unwrap();
        assert_eq!(api.token_epoch().await, None);

        let first = api.set_token(SecretString::from("a".to_owned())).await;
        let second = api.set_token(SecretString::from("b".to_owned())).await;
        assert!(second > first);
        assert_eq!(api.token_epoch().await, Some(second));

        api.clear_token().await;
        assert!(!api.has_token().await);
        assert_eq!(api.base_url(), "http://127.0.0.1:9");
    }
}
