//! Cart synchronization.
//!
//! The backend owns the cart. Every successful mutation answers with the
//! whole cart and the local state adopts it wholesale; quantities are never
//! merged locally. Loads fail open: a cart that cannot be fetched is shown
//! as empty instead of blocking browsing.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::watch;
use tracing::{instrument, warn};

use cornermarket_core::{LineItemId, Price, ProductId};

use crate::api::{ApiClient, Cart, CartItem};
use crate::error::{ClientError, add_breadcrumb};

/// Read-only view of the cart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartState {
    /// Lines in display order.
    pub items: Vec<CartItem>,
    /// A mutation is in flight.
    pub busy: bool,
}

impl CartState {
    /// Total number of units.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.quantity)).sum()
    }

    /// Sum of quantity times unit price over all lines.
    #[must_use]
    pub fn total(&self) -> Price {
        self.items.iter().map(CartItem::line_total).sum()
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The line holding `product_id`, if any.
    #[must_use]
    pub fn line_for(&self, product_id: ProductId) -> Option<&CartItem> {
        self.items.iter().find(|item| item.product.id == product_id)
    }
}

/// Keeps the local cart in step with the backend.
#[derive(Clone)]
pub struct CartSynchronizer {
    inner: Arc<CartInner>,
}

struct CartInner {
    api: ApiClient,
    tx: watch::Sender<CartState>,
    in_flight: AtomicUsize,
}

/// Holds the busy flag while a mutation is in flight.
struct BusyGuard<'a> {
    inner: &'a CartInner,
}

impl<'a> BusyGuard<'a> {
    fn acquire(inner: &'a CartInner) -> Self {
        if inner.in_flight.fetch_add(1, Ordering::SeqCst) == 0 {
            inner.tx.send_modify(|state| state.busy = true);
        }
        Self { inner }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        if self.inner.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.tx.send_modify(|state| state.busy = false);
        }
    }
}

impl CartSynchronizer {
    /// Create an empty cart.
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        let (tx, _) = watch::channel(CartState::default());
        Self {
            inner: Arc::new(CartInner {
                api,
                tx,
                in_flight: AtomicUsize::new(0),
            }),
        }
    }

    /// Current cart.
    #[must_use]
    pub fn state(&self) -> CartState {
        self.inner.tx.borrow().clone()
    }

    /// Observe cart changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartState> {
        self.inner.tx.subscribe()
    }

    /// Fetch the cart and replace local lines. Failures leave an empty cart.
    #[instrument(skip(self))]
    pub async fn load(&self) -> CartState {
        match self.inner.api.get_cart().await {
            Ok(cart) => self.adopt(cart),
            Err(e) => {
                warn!(error = %e, "Failed to load cart, showing it empty");
                self.inner.tx.send_modify(|state| state.items.clear());
            }
        }
        self.state()
    }

    /// Add `quantity` units of a product. Zero is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the backend error; local state is left unchanged.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn add_item(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartState, ClientError> {
        if quantity == 0 {
            return Ok(self.state());
        }

        let _busy = BusyGuard::acquire(&self.inner);
        let (product, units) = (product_id.to_string(), quantity.to_string());
        add_breadcrumb(
            "cart",
            "Add item",
            Some(&[("product_id", product.as_str()), ("quantity", units.as_str())]),
        );

        match self.inner.api.add_to_cart(product_id, quantity).await? {
            Some(cart) => self.adopt(cart),
            None => {
                self.load().await;
            }
        }
        Ok(self.state())
    }

    /// Set a line's quantity. Zero or less is sent as-is and the backend
    /// removes the line.
    ///
    /// # Errors
    ///
    /// Returns the backend error; local state is left unchanged.
    #[instrument(skip(self), fields(line_id = %line_id))]
    pub async fn update_item(
        &self,
        line_id: LineItemId,
        quantity: i64,
    ) -> Result<CartState, ClientError> {
        let _busy = BusyGuard::acquire(&self.inner);
        let (line, units) = (line_id.to_string(), quantity.to_string());
        add_breadcrumb(
            "cart",
            "Update item",
            Some(&[("line_id", line.as_str()), ("quantity", units.as_str())]),
        );

        match self.inner.api.update_cart_item(line_id, quantity).await? {
            Some(cart) => self.adopt(cart),
            None => {
                self.load().await;
            }
        }
        Ok(self.state())
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns the backend error; local state is left unchanged.
    #[instrument(skip(self), fields(line_id = %line_id))]
    pub async fn remove_item(&self, line_id: LineItemId) -> Result<CartState, ClientError> {
        let _busy = BusyGuard::acquire(&self.inner);
        let line = line_id.to_string();
        add_breadcrumb("cart", "Remove item", Some(&[("line_id", line.as_str())]));

        match self.inner.api.remove_cart_item(line_id).await? {
            Some(cart) => self.adopt(cart),
            None => self
                .inner
                .tx
                .send_modify(|state| state.items.retain(|item| item.id != line_id)),
        }
        Ok(self.state())
    }

    /// Drop all local lines without a request.
    pub fn clear_local(&self) {
        self.inner.tx.send_modify(|state| state.items.clear());
    }

    fn adopt(&self, cart: Cart) {
        let items: Vec<CartItem> = cart
            .items
            .into_iter()
            .filter(|item| item.quantity > 0)
            .collect();
        self.inner.tx.send_modify(|state| state.items = items);
    }
}
