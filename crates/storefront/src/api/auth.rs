//! Authentication endpoints.

use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::instrument;

use cornermarket_core::{Email, UserRole};

use super::types::{RefreshedToken, TokenPair, User};
use super::{ApiClient, ApiError, Auth, paths, required};

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    username: &'a str,
    email: &'a str,
    password: &'a str,
    role: UserRole,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

impl ApiClient {
    /// Exchange credentials for a token pair. The email is the username.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials are rejected or the request fails.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn login(&self, email: &Email, password: &SecretString) -> Result<TokenPair, ApiError> {
        let body = LoginRequest {
            username: email.as_username(),
            password: password.expose_secret(),
        };
        required(
            self.send_json(Method::POST, paths::LOGIN, &body, Auth::Anonymous)
                .await?,
        )
    }

    /// Create an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the registration.
    #[instrument(skip(self, password), fields(email = %email, role = %role))]
    pub async fn register(
        &self,
        email: &Email,
        password: &SecretString,
        role: UserRole,
    ) -> Result<User, ApiError> {
        let body = RegisterRequest {
            username: email.as_username(),
            email: email.as_str(),
            password: password.expose_secret(),
            role,
        };
        required(
            self.send_json(Method::POST, paths::REGISTER, &body, Auth::Anonymous)
                .await?,
        )
    }

    /// Fetch the account the current token belongs to.
    ///
    /// # Errors
    ///
    /// Returns an error if no valid token is set or the request fails.
    #[instrument(skip(self))]
    pub async fn current_user(&self) -> Result<User, ApiError> {
        self.get(paths::CURRENT_USER).await
    }

    /// Get a new access token for `refresh`.
    ///
    /// # Errors
    ///
    /// Returns an error if the refresh token is rejected.
    #[instrument(skip_all)]
    pub async fn refresh_token(&self, refresh: &SecretString) -> Result<RefreshedToken, ApiError> {
        let body = RefreshRequest {
            refresh: refresh.expose_secret(),
        };
        required(
            self.send_json(Method::POST, paths::REFRESH, &body, Auth::Anonymous)
                .await?,
        )
    }

    /// Upgrade the current account to a seller.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn become_seller(&self) -> Result<User, ApiError> {
        required(self.post(paths::BECOME_SELLER, &serde_json::json!({})).await?)
    }
}
