//! Checkout draft persistence.
//!
//! An in-progress checkout (form, step and cart lines) is saved under
//! [`keys::CHECKOUT_DRAFT`] so a restart does not lose it. Storage problems
//! never block checkout: unreadable or undecodable records count as "no
//! draft" and failed writes are logged and dropped.
//!
//! Writes are debounced by [`DraftPersistor`]: every change schedules a
//! snapshot and only the latest one is written once changes stop arriving.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use cornermarket_core::DeliveryMethod;

use crate::api::{CartItem, NewOrder};
use crate::storage::{Storage, keys};

// =============================================================================
// Draft types
// =============================================================================

/// Contact and delivery fields of the checkout form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckoutForm {
    pub full_name: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub delivery_method: DeliveryMethod,
    pub comment: String,
}

impl CheckoutForm {
    /// Names of required fields that are blank.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("full_name", &self.full_name),
            ("phone", &self.phone),
            ("address", &self.address),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    /// The order payload for this form.
    #[must_use]
    pub fn to_order(&self) -> NewOrder {
        NewOrder {
            contact_name: self.full_name.trim().to_string(),
            contact_phone: self.phone.trim().to_string(),
            delivery_method: self.delivery_method,
            delivery_address: self.address.trim().to_string(),
        }
    }
}

/// Checkout wizard step, always within `1..=3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct CheckoutStep(u8);

impl CheckoutStep {
    pub const FIRST: Self = Self(1);
    pub const LAST: Self = Self(3);

    /// Clamp `step` into range.
    #[must_use]
    pub fn clamped(step: i64) -> Self {
        // Clamped to 1..=3, so the cast cannot truncate.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Self(step.clamp(1, 3) as u8)
    }

    /// The step number.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// The following step, staying on the last one.
    #[must_use]
    pub fn next(self) -> Self {
        Self::clamped(i64::from(self.0) + 1)
    }

    /// The preceding step, staying on the first one.
    #[must_use]
    pub fn prev(self) -> Self {
        Self::clamped(i64::from(self.0) - 1)
    }
}

impl Default for CheckoutStep {
    fn default() -> Self {
        Self::FIRST
    }
}

impl TryFrom<u8> for CheckoutStep {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (1..=3).contains(&value) {
            Ok(Self(value))
        } else {
            Err(format!("checkout step must be 1..=3, got {value}"))
        }
    }
}

impl From<CheckoutStep> for u8 {
    fn from(step: CheckoutStep) -> Self {
        step.0
    }
}

/// A saved, unfinished checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutDraft {
    pub form: CheckoutForm,
    pub step: CheckoutStep,
    pub items: Vec<CartItem>,
    pub updated_at: DateTime<Utc>,
}

impl CheckoutDraft {
    /// Snapshot taken now.
    #[must_use]
    pub fn now(form: CheckoutForm, step: CheckoutStep, items: Vec<CartItem>) -> Self {
        Self {
            form,
            step,
            items,
            updated_at: Utc::now(),
        }
    }
}

// =============================================================================
// DraftStore
// =============================================================================

/// Fail-open access to the persisted draft.
#[derive(Clone)]
pub struct DraftStore {
    storage: Arc<dyn Storage>,
}

impl DraftStore {
    /// Store drafts in `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// The persisted draft, or `None` if there is none or it cannot be read.
    #[must_use]
    pub fn load(&self) -> Option<CheckoutDraft> {
        let raw = match self.storage.get(keys::CHECKOUT_DRAFT) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(error = %e, "Failed to read checkout draft");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(draft) => Some(draft),
            Err(e) => {
                warn!(error = %e, "Ignoring undecodable checkout draft");
                None
            }
        }
    }

    /// Overwrite the persisted draft. Returns whether it was written.
    pub fn save(&self, draft: &CheckoutDraft) -> bool {
        let result = serde_json::to_string(draft)
            .map_err(crate::storage::StorageError::from)
            .and_then(|raw| self.storage.set(keys::CHECKOUT_DRAFT, &raw));
        match result {
            Ok(()) => {
                debug!(step = draft.step.get(), items = draft.items.len(), "Checkout draft saved");
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to save checkout draft");
                false
            }
        }
    }

    /// Remove the persisted draft. Returns whether storage confirmed it.
    pub fn delete(&self) -> bool {
        match self.storage.remove(keys::CHECKOUT_DRAFT) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to delete checkout draft");
                false
            }
        }
    }
}

// =============================================================================
// DraftPersistor
// =============================================================================

/// Debounced draft writer.
///
/// Owns a background task; dropping the persistor stops it without writing
/// the pending snapshot. Call [`DraftPersistor::flush`] first to keep it.
pub struct DraftPersistor {
    inner: Arc<PersistorInner>,
    task: JoinHandle<()>,
}

struct PersistorInner {
    store: DraftStore,
    pending: Mutex<Option<CheckoutDraft>>,
    notify: Notify,
}

impl PersistorInner {
    /// Write the pending snapshot, if any. The lock is held across the write
    /// so a concurrent discard cannot be overtaken by a stale snapshot.
    fn write_pending(&self) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.take().is_some_and(|draft| self.store.save(&draft))
    }
}

impl DraftPersistor {
    /// Start a persistor writing to `store` after `debounce` of quiet.
    ///
    /// Must be called within a Tokio runtime.
    #[must_use]
    pub fn new(store: DraftStore, debounce: Duration) -> Self {
        let inner = Arc::new(PersistorInner {
            store,
            pending: Mutex::new(None),
            notify: Notify::new(),
        });

        let worker = Arc::clone(&inner);
        let task = tokio::spawn(async move {
            loop {
                worker.notify.notified().await;
                // Restart the quiet period on every new snapshot
                loop {
                    tokio::select! {
                        () = worker.notify.notified() => {}
                        () = tokio::time::sleep(debounce) => break,
                    }
                }
                worker.write_pending();
            }
        });

        Self { inner, task }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &DraftStore {
        &self.inner.store
    }

    /// Replace the pending snapshot and restart the quiet period.
    pub fn schedule(&self, draft: CheckoutDraft) {
        *self
            .inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(draft);
        self.inner.notify.notify_one();
    }

    /// Whether a snapshot is waiting to be written.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Write the pending snapshot now. Returns whether anything was written.
    pub fn flush(&self) -> bool {
        self.inner.write_pending()
    }

    /// Drop the pending snapshot without writing it.
    pub fn cancel(&self) {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Drop the pending snapshot and delete the persisted draft.
    pub fn discard(&self) -> bool {
        let mut pending = self
            .inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        pending.take();
        self.inner.store.delete()
    }
}

impl Drop for DraftPersistor {
    fn drop(&mut self) {
        self.task.abort();
    }
}
