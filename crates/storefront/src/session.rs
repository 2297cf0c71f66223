//! Authentication session.
//!
//! The session owns the access/refresh token pair and the signed-in user.
//! Tokens are persisted under [`keys::ACCESS_TOKEN`] and
//! [`keys::REFRESH_TOKEN`] and attached to the shared [`ApiClient`].
//!
//! # State machine
//!
//! ```text
//! Anonymous --login/initialize--> Authenticating --user fetched--> Authenticated
//!     ^                                |                                |
//!     +----------- fetch failed -------+<------- logout / 401 ----------+
//! ```
//!
//! Every transition bumps a generation counter. A user fetch only applies
//! its result if the generation is unchanged when it completes, so a newer
//! login or a logout always wins over a stale fetch.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, instrument, warn};

use cornermarket_core::{Email, UserRole};

use crate::api::{ApiClient, User};
use crate::error::{ClientError, clear_sentry_user, set_sentry_user};
use crate::storage::{Storage, keys};

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthStatus {
    #[default]
    Anonymous,
    Authenticating,
    Authenticated,
}

impl std::fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Anonymous => "anonymous",
            Self::Authenticating => "authenticating",
            Self::Authenticated => "authenticated",
        })
    }
}

/// What observers see of the session. Tokens are never exposed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionSnapshot {
    pub status: AuthStatus,
    pub user: Option<User>,
}

impl SessionSnapshot {
    /// Whether a user is signed in.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.status == AuthStatus::Authenticated
    }
}

#[derive(Default)]
struct SessionState {
    refresh: Option<SecretString>,
    user: Option<User>,
    status: AuthStatus,
    generation: u64,
    token_epoch: Option<u64>,
}

impl SessionState {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status,
            user: self.user.clone(),
        }
    }
}

/// Owns the authentication session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    api: ApiClient,
    storage: Arc<dyn Storage>,
    state: Mutex<SessionState>,
    tx: watch::Sender<SessionSnapshot>,
}

impl SessionManager {
    /// Create an anonymous session.
    #[must_use]
    pub fn new(api: ApiClient, storage: Arc<dyn Storage>) -> Self {
        let (tx, _) = watch::channel(SessionSnapshot::default());
        Self {
            inner: Arc::new(SessionInner {
                api,
                storage,
                state: Mutex::new(SessionState::default()),
                tx,
            }),
        }
    }

    /// Current status and user.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.tx.borrow().clone()
    }

    /// Observe session changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.tx.subscribe()
    }

    /// Whether a user is signed in.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.tx.borrow().is_authenticated()
    }

    /// Restore the session from persisted tokens.
    ///
    /// Unreadable storage counts as no tokens. If the stored access token no
    /// longer yields a user, the persisted tokens are removed.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> SessionSnapshot {
        let access = self.read_token(keys::ACCESS_TOKEN);
        let refresh = self.read_token(keys::REFRESH_TOKEN);

        let Some(access) = access else {
            debug!("No persisted session");
            return self.snapshot();
        };

        if let Err(e) = self.authenticate(access, refresh, false).await {
            info!(error = %e, "Persisted session rejected");
        }
        self.snapshot()
    }

    /// Save a token pair and load the user it belongs to.
    ///
    /// Returns `Ok(Some(user))` once authenticated, and `Ok(None)` if a newer
    /// login or a logout superseded this one while the user was loading.
    ///
    /// # Errors
    ///
    /// Returns the user fetch error. The session is cleared in that case.
    #[instrument(skip_all)]
    pub async fn login(
        &self,
        access: SecretString,
        refresh: SecretString,
    ) -> Result<Option<User>, ClientError> {
        self.authenticate(access, Some(refresh), true).await
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials are rejected or the user cannot
    /// be loaded.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn sign_in(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<Option<User>, ClientError> {
        let pair = self.inner.api.login(email, password).await?;
        self.login(SecretString::from(pair.access), SecretString::from(pair.refresh))
            .await
    }

    /// Create an account and sign in to it.
    ///
    /// # Errors
    ///
    /// Returns an error if registration or the following sign-in fails.
    #[instrument(skip(self, password), fields(email = %email, role = %role))]
    pub async fn register(
        &self,
        email: &Email,
        password: &SecretString,
        role: UserRole,
    ) -> Result<Option<User>, ClientError> {
        let user = self.inner.api.register(email, password, role).await?;
        info!(user_id = %user.id, "Account created");
        self.sign_in(email, password).await
    }

    /// Sign out and forget the persisted tokens.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        let mut state = self.inner.state.lock().await;
        self.clear_locked(&mut state).await;
        info!("Signed out");
    }

    /// Clear the session if `epoch` is still the active token.
    ///
    /// Returns whether the session was cleared.
    #[instrument(skip(self))]
    pub async fn on_token_rejected(&self, epoch: u64) -> bool {
        let mut state = self.inner.state.lock().await;
        if state.token_epoch != Some(epoch) {
            debug!("Ignoring rejection of a replaced token");
            return false;
        }
        self.clear_locked(&mut state).await;
        warn!("Session cleared after the backend rejected the token");
        true
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// The user stays signed in. Returns `Ok(false)` if the session changed
    /// while the refresh was in flight.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotAuthenticated`] without a refresh token, or
    /// the backend error if the refresh token is rejected.
    #[instrument(skip(self))]
    pub async fn refresh_access(&self) -> Result<bool, ClientError> {
        let (refresh, generation) = {
            let state = self.inner.state.lock().await;
            let refresh = state
                .refresh
                .as_ref()
                .map(|r| SecretString::from(r.expose_secret().to_owned()))
                .ok_or(ClientError::NotAuthenticated)?;
            (refresh, state.generation)
        };

        let refreshed = self.inner.api.refresh_token(&refresh).await?;

        let mut state = self.inner.state.lock().await;
        if state.generation != generation {
            debug!("Discarding token refresh superseded by a newer session change");
            return Ok(false);
        }

        let access = SecretString::from(refreshed.access);
        self.write_token(keys::ACCESS_TOKEN, &access);
        state.token_epoch = Some(self.inner.api.set_token(access).await);
        if let Some(rotated) = refreshed.refresh {
            let rotated = SecretString::from(rotated);
            self.write_token(keys::REFRESH_TOKEN, &rotated);
            state.refresh = Some(rotated);
        }
        info!("Access token refreshed");
        Ok(true)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn authenticate(
        &self,
        access: SecretString,
        refresh: Option<SecretString>,
        persist: bool,
    ) -> Result<Option<User>, ClientError> {
        let generation = {
            let mut state = self.inner.state.lock().await;
            if persist {
                self.write_token(keys::ACCESS_TOKEN, &access);
                match &refresh {
                    Some(refresh) => self.write_token(keys::REFRESH_TOKEN, refresh),
                    None => self.remove_token(keys::REFRESH_TOKEN),
                }
            }
            let epoch = self.inner.api.set_token(access).await;

            state.generation += 1;
            state.refresh = refresh;
            state.user = None;
            state.status = AuthStatus::Authenticating;
            state.token_epoch = Some(epoch);
            self.publish(&state);
            state.generation
        };

        let fetched = self.inner.api.current_user().await;

        let mut state = self.inner.state.lock().await;
        if state.generation != generation {
            debug!("Discarding user fetch superseded by a newer session change");
            return Ok(None);
        }

        match fetched {
            Ok(user) => {
                set_sentry_user(&user.id, Some(&user.email));
                info!(user_id = %user.id, "Signed in");
                state.user = Some(user.clone());
                state.status = AuthStatus::Authenticated;
                self.publish(&state);
                Ok(Some(user))
            }
            Err(e) => {
                self.clear_locked(&mut state).await;
                Err(e.into())
            }
        }
    }

    async fn clear_locked(&self, state: &mut SessionState) {
        self.remove_token(keys::ACCESS_TOKEN);
        self.remove_token(keys::REFRESH_TOKEN);
        self.inner.api.clear_token().await;

        let generation = state.generation + 1;
        *state = SessionState {
            generation,
            ..SessionState::default()
        };
        clear_sentry_user();
        self.publish(state);
    }

    fn publish(&self, state: &SessionState) {
        self.inner.tx.send_replace(state.snapshot());
    }

    fn read_token(&self, key: &str) -> Option<SecretString> {
        match self.inner.storage.get(key) {
            Ok(value) => value
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from),
            Err(e) => {
                warn!(key, error = %e, "Failed to read persisted token");
                None
            }
        }
    }

    fn write_token(&self, key: &str, token: &SecretString) {
        if let Err(e) = self.inner.storage.set(key, token.expose_secret()) {
            warn!(key, error = %e, "Failed to persist token");
        }
    }

    fn remove_token(&self, key: &str) {
        if let Err(e) = self.inner.storage.remove(key) {
            warn!(key, error = %e, "Failed to remove persisted token");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::storage::MemoryStorage;

    fn manager(storage: Arc<dyn Storage>) -> SessionManager {
        // Nothing listens on port 9; requests fail fast.
        let config = ClientConfig::for_api_url("http://127.0.0.1:9").unwrap();
        SessionManager::new(ApiClient::new(&config).unwrap(), storage)
    }

    #[tokio::test]
    async fn test_initialize_without_tokens_is_anonymous() {
        let session = manager(Arc::new(MemoryStorage::new()));
        let snapshot = session.initialize().await;
        assert_eq!(snapshot.status, AuthStatus::Anonymous);
        assert!(snapshot.user.is_none());
    }

    #[tokio::test]
    async fn test_initialize_with_unavailable_storage() {
        let session = manager(Arc::new(MemoryStorage::unavailable()));
        assert_eq!(session.initialize().await.status, AuthStatus::Anonymous);
    }

    #[tokio::test]
    async fn test_failed_fetch_clears_tokens() {
        let storage = Arc::new(MemoryStorage::new());
        let session = manager(storage.clone());

        let result = session
            .login(SecretString::from("access".to_owned()), SecretString::from("refresh".to_owned()))
            .await;
        assert!(result.is_err());
        assert_eq!(session.snapshot(), SessionSnapshot::default());
        assert_eq!(storage.get(keys::ACCESS_TOKEN).unwrap(), None);
        assert_eq!(storage.get(keys::REFRESH_TOKEN).unwrap(), None);
    }

    #[tokio::test]
    async fn test_logout_publishes_anonymous() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(keys::ACCESS_TOKEN, "stale").unwrap();
        let session = manager(storage.clone());
        let mut rx = session.subscribe();

        session.logout().await;
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().status, AuthStatus::Anonymous);
        assert_eq!(storage.get(keys::ACCESS_TOKEN).unwrap(), None);
    }

    #[tokio::test]
    async fn test_rejection_of_unknown_epoch_is_ignored() {
        let session = manager(Arc::new(MemoryStorage::new()));
        assert!(!session.on_token_rejected(42).await);
    }
}
