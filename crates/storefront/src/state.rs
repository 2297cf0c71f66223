//! Application context.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use tracing::{debug, info};

use cornermarket_core::UserId;

use crate::api::ApiClient;
use crate::cart::CartSynchronizer;
use crate::checkout::CheckoutFlow;
use crate::config::ClientConfig;
use crate::draft::{DraftPersistor, DraftStore};
use crate::error::ClientError;
use crate::favorites::FavoritesSynchronizer;
use crate::session::{AuthStatus, SessionManager, SessionSnapshot};
use crate::storage::Storage;
use crate::theme::ThemeStore;

/// Everything the client needs, created once at the application root.
///
/// This struct is cheaply cloneable via `Arc`. Call [`AppState::init`]
/// after construction and [`AppState::dispose`] on shutdown.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ClientConfig,
    api: ApiClient,
    storage: Arc<dyn Storage>,
    session: SessionManager,
    cart: CartSynchronizer,
    favorites: FavoritesSynchronizer,
    theme: ThemeStore,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Client configuration
    /// * `storage` - Where tokens, theme and drafts are persisted
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: ClientConfig, storage: Arc<dyn Storage>) -> Result<Self, ClientError> {
        let api = ApiClient::new(&config).map_err(ClientError::HttpClient)?;
        let session = SessionManager::new(api.clone(), Arc::clone(&storage));
        let cart = CartSynchronizer::new(api.clone());
        let favorites = FavoritesSynchronizer::new(api.clone(), session.subscribe());
        let theme = ThemeStore::new(Arc::clone(&storage));

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                api,
                storage,
                session,
                cart,
                favorites,
                theme,
                tasks: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Get a reference to the client configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Get a reference to the backend client.
    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    /// Get a reference to the session manager.
    #[must_use]
    pub fn session(&self) -> &SessionManager {
        &self.inner.session
    }

    /// Get a reference to the cart synchronizer.
    #[must_use]
    pub fn cart(&self) -> &CartSynchronizer {
        &self.inner.cart
    }

    /// Get a reference to the favorites synchronizer.
    #[must_use]
    pub fn favorites(&self) -> &FavoritesSynchronizer {
        &self.inner.favorites
    }

    /// Get a reference to the theme preference store.
    #[must_use]
    pub fn theme(&self) -> &ThemeStore {
        &self.inner.theme
    }

    /// Restore the session, load cart and favorites, and start reacting to
    /// session changes and token rejections.
    ///
    /// Must be called within a Tokio runtime. Calling it again restarts the
    /// observers.
    pub async fn init(&self) -> SessionSnapshot {
        self.dispose();

        let snapshot = self.inner.session.initialize().await;
        tokio::join!(self.inner.cart.load(), self.inner.favorites.load());

        let handles = vec![self.spawn_session_observer(), self.spawn_rejection_observer()];
        *self.tasks() = handles;

        info!(status = %snapshot.status, "Client initialized");
        snapshot
    }

    /// Stop the observer tasks.
    pub fn dispose(&self) {
        for handle in self.tasks().drain(..) {
            handle.abort();
        }
    }

    /// Create a checkout flow bound to this context.
    ///
    /// Must be called within a Tokio runtime.
    #[must_use]
    pub fn checkout(&self) -> CheckoutFlow {
        let draft = &self.inner.config.draft;
        let persistor = DraftPersistor::new(
            DraftStore::new(Arc::clone(&self.inner.storage)),
            draft.debounce,
        );
        CheckoutFlow::new(
            self.inner.api.clone(),
            self.inner.session.clone(),
            self.inner.cart.clone(),
            persistor,
            draft.prompt_duration,
        )
    }

    fn tasks(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.inner.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reload cart and favorites whenever the session settles on a new
    /// status or a different user.
    fn spawn_session_observer(&self) -> JoinHandle<()> {
        let mut rx = self.inner.session.subscribe();
        let cart = self.inner.cart.clone();
        let favorites = self.inner.favorites.clone();

        tokio::spawn(async move {
            let mut settled = settled_key(&rx.borrow_and_update());
            while rx.changed().await.is_ok() {
                let key = settled_key(&rx.borrow_and_update());
                if key.0 == AuthStatus::Authenticating || key == settled {
                    continue;
                }
                settled = key;
                debug!(status = %key.0, "Session changed, reloading cart and favorites");
                tokio::join!(cart.load(), favorites.load());
            }
        })
    }

    fn spawn_rejection_observer(&self) -> JoinHandle<()> {
        let mut rx = self.inner.api.subscribe_rejections();
        let session = self.inner.session.clone();

        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let epoch = *rx.borrow_and_update();
                if let Some(epoch) = epoch {
                    session.on_token_rejected(epoch).await;
                }
            }
        })
    }
}

/// Status plus signed-in user; a change in either means different data.
fn settled_key(snapshot: &SessionSnapshot) -> (AuthStatus, Option<UserId>) {
    (snapshot.status, snapshot.user.as_ref().map(|user| user.id))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::checkout::CheckoutEntry;
    use crate::storage::MemoryStorage;
    use crate::theme::Theme;

    fn state() -> AppState {
        let config = ClientConfig::for_api_url("http://127.0.0.1:9").unwrap();
        AppState::new(config, Arc::new(MemoryStorage::new())).unwrap()
    }

    #[tokio::test]
    async fn test_init_without_tokens_is_anonymous() {
        let state = state();
        let snapshot = state.init().await;
        assert_eq!(snapshot.status, AuthStatus::Anonymous);
        assert!(state.cart().state().is_empty());
        assert!(state.favorites().state().is_empty());
        state.dispose();
        assert!(state.tasks().is_empty());
    }

    #[tokio::test]
    async fn test_checkout_with_empty_cart_goes_to_catalog() {
        let state = state();
        let mut flow = state.checkout();
        assert_eq!(flow.open(), CheckoutEntry::Catalog);
    }

    #[test]
    fn test_theme_shares_storage() {
        let state = state();
        state.theme().set(Theme::Dark);
        assert_eq!(ThemeStore::new(Arc::clone(&state.inner.storage)).load(), Theme::Dark);
    }
}
