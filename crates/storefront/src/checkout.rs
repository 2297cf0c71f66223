//! Checkout flow.
//!
//! Opening checkout decides between the catalog (nothing to check out) and
//! the form, offering a saved draft for recovery when one exists. While the
//! flow is open every form edit, step change and cart change schedules a
//! draft snapshot. Cart changes are not snapshotted while the recovery
//! prompt is still open, so the offered draft is not clobbered before the
//! user decides.
//!
//! Restoring a draft replaces the live cart with the drafted lines one
//! request at a time. Each request is recorded in a [`RestoreReport`] and a
//! failing line never stops the rest.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use cornermarket_core::{LineItemId, ProductId};

use crate::api::{ApiClient, Order};
use crate::cart::CartSynchronizer;
use crate::draft::{CheckoutDraft, CheckoutForm, CheckoutStep, DraftPersistor};
use crate::error::{ClientError, add_breadcrumb};
use crate::prompt::{PromptState, RecoveryPrompt};
use crate::session::SessionManager;

/// Where opening checkout leads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutEntry {
    /// Nothing to check out; show the catalog instead.
    Catalog,
    /// Show the form. `draft` is offered for recovery when present.
    Form { draft: Option<CheckoutDraft> },
}

/// One request made while restoring a draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreAction {
    /// Remove a line of the live cart.
    RemoveCurrent {
        line_id: LineItemId,
        product_id: ProductId,
    },
    /// Re-add a drafted line.
    AddDrafted { product_id: ProductId, quantity: u32 },
}

/// Outcome of one restore request.
#[derive(Debug)]
pub struct RestoreOutcome {
    pub action: RestoreAction,
    pub result: Result<(), ClientError>,
}

/// Per-request outcomes of a restore.
#[derive(Debug, Default)]
pub struct RestoreReport {
    pub outcomes: Vec<RestoreOutcome>,
}

impl RestoreReport {
    /// Whether every request succeeded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    /// Requests that failed.
    pub fn failures(&self) -> impl Iterator<Item = &RestoreOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    /// Number of requests that succeeded.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    fn record(&mut self, action: RestoreAction, result: Result<(), ClientError>) {
        if let Err(e) = &result {
            warn!(?action, error = %e, "Draft restore step failed");
        }
        self.outcomes.push(RestoreOutcome { action, result });
    }
}

#[derive(Default)]
struct FlowState {
    form: CheckoutForm,
    step: CheckoutStep,
    prompt: Option<RecoveryPrompt>,
    completed: bool,
}

impl FlowState {
    fn prompt_open(&mut self, now: Instant) -> bool {
        self.prompt
            .as_mut()
            .is_some_and(|prompt| prompt.poll(now).is_open())
    }
}

/// An open checkout.
///
/// Must be created within a Tokio runtime. Dropping the flow stops its
/// background tasks; call [`CheckoutFlow::unload`] first to keep a pending
/// snapshot.
pub struct CheckoutFlow {
    api: ApiClient,
    session: SessionManager,
    cart: CartSynchronizer,
    persistor: Arc<DraftPersistor>,
    prompt_duration: Duration,
    state: Arc<Mutex<FlowState>>,
    watcher: Option<JoinHandle<()>>,
}

impl CheckoutFlow {
    /// Create a closed flow.
    #[must_use]
    pub fn new(
        api: ApiClient,
        session: SessionManager,
        cart: CartSynchronizer,
        persistor: DraftPersistor,
        prompt_duration: Duration,
    ) -> Self {
        Self {
            api,
            session,
            cart,
            persistor: Arc::new(persistor),
            prompt_duration,
            state: Arc::new(Mutex::new(FlowState::default())),
            watcher: None,
        }
    }

    /// Decide where checkout leads and start watching the cart.
    ///
    /// An empty cart always leads to the catalog. A saved draft stays on
    /// disk in that case and can still be applied with
    /// [`CheckoutFlow::restore`].
    #[instrument(skip(self))]
    pub fn open(&mut self) -> CheckoutEntry {
        if self.cart.state().is_empty() {
            info!("Cart is empty, redirecting to catalog");
            return CheckoutEntry::Catalog;
        }
        let draft = self.persistor.store().load();

        {
            let mut state = self.lock();
            state.completed = false;
            state.prompt = draft
                .clone()
                .map(|d| RecoveryPrompt::show(d, self.prompt_duration, Instant::now()));
        }
        self.start_watcher();

        CheckoutEntry::Form { draft }
    }

    // =========================================================================
    // Form
    // =========================================================================

    /// The persisted draft, whether or not it was offered on open.
    #[must_use]
    pub fn saved_draft(&self) -> Option<CheckoutDraft> {
        self.persistor.store().load()
    }

    /// Current form values.
    #[must_use]
    pub fn form(&self) -> CheckoutForm {
        self.lock().form.clone()
    }

    /// Current step.
    #[must_use]
    pub fn step(&self) -> CheckoutStep {
        self.lock().step
    }

    /// Replace the form.
    pub fn set_form(&self, form: CheckoutForm) {
        self.edit(|state| state.form = form);
    }

    /// Edit the form in place.
    pub fn update_form(&self, f: impl FnOnce(&mut CheckoutForm)) {
        self.edit(|state| f(&mut state.form));
    }

    /// Advance one step, staying on the last.
    pub fn next_step(&self) -> CheckoutStep {
        self.edit(|state| state.step = state.step.next());
        self.step()
    }

    /// Go back one step, staying on the first.
    pub fn prev_step(&self) -> CheckoutStep {
        self.edit(|state| state.step = state.step.prev());
        self.step()
    }

    /// Jump to `step`, clamped into range.
    pub fn go_to_step(&self, step: i64) -> CheckoutStep {
        self.edit(|state| state.step = CheckoutStep::clamped(step));
        self.step()
    }

    // =========================================================================
    // Recovery prompt
    // =========================================================================

    /// State of the recovery prompt, `None` if none was shown.
    #[must_use]
    pub fn prompt_state(&self) -> Option<PromptState> {
        self.lock()
            .prompt
            .as_mut()
            .map(|prompt| prompt.poll(Instant::now()))
    }

    /// When the prompt will expire, if it is counting down.
    #[must_use]
    pub fn prompt_deadline(&self) -> Option<Instant> {
        self.lock().prompt.as_ref().and_then(RecoveryPrompt::deadline)
    }

    /// Pause or resume the prompt countdown.
    pub fn hover_prompt(&self, hovering: bool) -> Option<PromptState> {
        let now = Instant::now();
        self.lock().prompt.as_mut().map(|prompt| {
            if hovering {
                prompt.hover_start(now)
            } else {
                prompt.hover_end(now)
            }
        })
    }

    /// Close the prompt and keep the persisted draft.
    pub fn dismiss_prompt(&self) -> Option<PromptState> {
        self.lock().prompt.as_mut().map(RecoveryPrompt::dismiss)
    }

    /// Replace the live cart with the drafted lines and restore form and
    /// step.
    ///
    /// Uses the draft offered on open, or the persisted one. Returns an
    /// empty report when there is no draft.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> RestoreReport {
        let offered = self.lock().prompt.as_ref().map(|p| p.draft().clone());
        let Some(draft) = offered.or_else(|| self.persistor.store().load()) else {
            return RestoreReport::default();
        };

        add_breadcrumb("checkout", "Restore draft", None);
        let mut report = RestoreReport::default();

        for line in self.cart.state().items {
            let action = RestoreAction::RemoveCurrent {
                line_id: line.id,
                product_id: line.product.id,
            };
            let result = self.cart.remove_item(line.id).await.map(|_| ());
            report.record(action, result);
        }

        for line in &draft.items {
            let action = RestoreAction::AddDrafted {
                product_id: line.product.id,
                quantity: line.quantity,
            };
            let result = self
                .cart
                .add_item(line.product.id, line.quantity)
                .await
                .map(|_| ());
            report.record(action, result);
        }

        {
            let mut state = self.lock();
            state.form = draft.form;
            state.step = draft.step;
            if let Some(prompt) = state.prompt.as_mut() {
                prompt.mark_restored();
            }
        }
        self.schedule_snapshot();

        info!(
            succeeded = report.succeeded(),
            failed = report.failures().count(),
            "Draft restored"
        );
        report
    }

    /// Delete the persisted draft. Cart and form are untouched.
    #[instrument(skip(self))]
    pub fn discard(&self) -> bool {
        add_breadcrumb("checkout", "Discard draft", None);
        if let Some(prompt) = self.lock().prompt.as_mut() {
            prompt.mark_discarded();
        }
        self.persistor.discard()
    }

    // =========================================================================
    // Submission
    // =========================================================================

    /// Place the order.
    ///
    /// On success the draft is deleted, the cart reloaded and the flow
    /// closed.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotAuthenticated`] for anonymous sessions,
    /// [`ClientError::InvalidForm`] when required fields are blank,
    /// [`ClientError::EmptyCart`] for an empty cart, or the backend error.
    #[instrument(skip(self))]
    pub async fn submit(&mut self) -> Result<Order, ClientError> {
        if !self.session.is_authenticated() {
            return Err(ClientError::NotAuthenticated);
        }

        let form = self.form();
        let missing = form.missing_fields();
        if !missing.is_empty() {
            return Err(ClientError::InvalidForm(missing));
        }
        if self.cart.state().is_empty() {
            return Err(ClientError::EmptyCart);
        }

        add_breadcrumb(
            "checkout",
            "Submit order",
            Some(&[("delivery_method", form.delivery_method.as_str())]),
        );
        let order = self.api.create_order(&form.to_order()).await?;

        self.stop_watcher();
        {
            let mut state = self.lock();
            state.completed = true;
            state.form = CheckoutForm::default();
            state.step = CheckoutStep::FIRST;
            state.prompt = None;
        }
        self.persistor.discard();
        self.cart.load().await;

        info!(order_id = %order.id, total = %order.total_price, "Order placed");
        Ok(order)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Write the pending snapshot now.
    pub fn unload(&self) -> bool {
        self.persistor.flush()
    }

    /// Write the pending snapshot and stop watching the cart.
    pub fn close(&mut self) {
        self.unload();
        self.stop_watcher();
    }

    fn lock(&self) -> MutexGuard<'_, FlowState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn edit(&self, f: impl FnOnce(&mut FlowState)) {
        f(&mut self.lock());
        self.schedule_snapshot();
    }

    fn schedule_snapshot(&self) {
        let draft = {
            let state = self.lock();
            if state.completed {
                return;
            }
            CheckoutDraft::now(state.form.clone(), state.step, self.cart.state().items)
        };
        self.persistor.schedule(draft);
    }

    fn start_watcher(&mut self) {
        if self.watcher.is_some() {
            return;
        }

        let mut rx = self.cart.subscribe();
        let state = Arc::clone(&self.state);
        let persistor = Arc::clone(&self.persistor);

        self.watcher = Some(tokio::spawn(async move {
            let mut last = rx.borrow_and_update().items.clone();
            while rx.changed().await.is_ok() {
                let items = rx.borrow_and_update().items.clone();
                if items == last {
                    continue;
                }
                last.clone_from(&items);

                let draft = {
                    let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                    if state.completed || state.prompt_open(Instant::now()) {
                        continue;
                    }
                    CheckoutDraft::now(state.form.clone(), state.step, items)
                };
                persistor.schedule(draft);
            }
        }));
    }

    fn stop_watcher(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

impl Drop for CheckoutFlow {
    fn drop(&mut self) {
        self.stop_watcher();
    }
}
