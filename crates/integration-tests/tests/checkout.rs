//! Integration tests for the checkout flow and draft persistence.

#![allow(clippy::unwrap_used)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use cornermarket_core::{Email, ProductId};
use cornermarket_integration_tests::{BUYER_EMAIL, FakeBackend, PASSWORD, client};
use cornermarket_storefront::checkout::{CheckoutEntry, RestoreAction};
use cornermarket_storefront::draft::{CheckoutDraft, CheckoutForm, CheckoutStep, DraftStore};
use cornermarket_storefront::prompt::PromptState;
use cornermarket_storefront::storage::FileStorage;
use cornermarket_storefront::{AppState, ClientError};
use rust_decimal::Decimal;
use secrecy::SecretString;

const MUG: ProductId = ProductId::new(42);
const TOWEL: ProductId = ProductId::new(7);
const BOARD: ProductId = ProductId::new(13);

fn drafts(dir: &Path) -> DraftStore {
    DraftStore::new(Arc::new(FileStorage::open(dir).unwrap()))
}

fn fill_required(form: &mut CheckoutForm) {
    form.full_name = "Anna K".to_string();
    form.phone = "+100200".to_string();
    form.address = "Main st 1".to_string();
}

async fn sign_in(state: &AppState) {
    let email = Email::parse(BUYER_EMAIL).unwrap();
    state
        .session()
        .sign_in(&email, &SecretString::from(PASSWORD.to_owned()))
        .await
        .unwrap();
    // Let the session observer finish its reload
    tokio::time::sleep(Duration::from_millis(100)).await;
}

async fn with_short_prompt(backend: &FakeBackend, dir: &Path) -> AppState {
    let mut config = backend.config(dir);
    config.draft.prompt_duration = Duration::from_millis(100);
    let state = AppState::new(config, Arc::new(FileStorage::open(dir).unwrap())).unwrap();
    state.init().await;
    state
}

// ============================================================================
// Entry
// ============================================================================

#[tokio::test]
async fn test_cart_without_draft_opens_form() {
    let backend = FakeBackend::start().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let state = client(&backend, dir.path()).await;
    state.cart().add_item(MUG, 1).await.unwrap();

    let mut flow = state.checkout();
    assert_eq!(flow.open(), CheckoutEntry::Form { draft: None });
    assert_eq!(flow.prompt_state(), None);
}

#[tokio::test]
async fn test_empty_cart_goes_to_catalog_even_with_draft() {
    let backend = FakeBackend::start().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let state = client(&backend, dir.path()).await;
    let mut form = CheckoutForm::default();
    fill_required(&mut form);
    drafts(dir.path()).save(&CheckoutDraft::now(form, CheckoutStep::LAST, Vec::new()));

    let mut flow = state.checkout();
    assert_eq!(flow.open(), CheckoutEntry::Catalog);
    assert_eq!(flow.prompt_state(), None);
    assert!(drafts(dir.path()).load().is_some());
}

#[tokio::test]
async fn test_draft_with_items_offers_recovery_prompt() {
    let backend = FakeBackend::start().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let state = client(&backend, dir.path()).await;
    let draft = CheckoutDraft::now(CheckoutForm::default(), CheckoutStep::LAST, Vec::new());
    drafts(dir.path()).save(&draft);
    state.cart().add_item(MUG, 1).await.unwrap();

    let mut flow = state.checkout();
    assert_eq!(flow.open(), CheckoutEntry::Form { draft: Some(draft) });
    assert_eq!(flow.prompt_state(), Some(PromptState::Visible));
    assert_eq!(flow.hover_prompt(true), Some(PromptState::Paused));
    assert_eq!(flow.dismiss_prompt(), Some(PromptState::Dismissed));
    assert!(drafts(dir.path()).load().is_some());
}

#[tokio::test]
async fn test_cart_changes_are_snapshotted() {
    let backend = FakeBackend::start().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let state = client(&backend, dir.path()).await;
    state.cart().add_item(MUG, 1).await.unwrap();

    let mut flow = state.checkout();
    flow.open();
    state.cart().add_item(TOWEL, 2).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let draft = drafts(dir.path()).load().unwrap();
    assert_eq!(draft.items.len(), 2);
    assert_eq!(draft.step, CheckoutStep::FIRST);
}

// ============================================================================
// Submission
// ============================================================================

#[tokio::test]
async fn test_submit_places_order_and_deletes_draft() {
    let backend = FakeBackend::start().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let state = client(&backend, dir.path()).await;
    sign_in(&state).await;
    state.cart().add_item(MUG, 2).await.unwrap();

    let mut flow = state.checkout();
    flow.open();
    flow.update_form(fill_required);
    assert!(flow.unload());
    assert!(drafts(dir.path()).load().is_some());

    let order = flow.submit().await.unwrap();

    assert_eq!(order.total_price.amount(), Decimal::new(2500, 2));
    assert_eq!(order.contact_name, "Anna K");
    assert_eq!(backend.order_count(), 1);
    assert!(state.cart().state().is_empty());
    assert!(drafts(dir.path()).load().is_none());

    // Nothing resurrects the draft after the debounce
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(drafts(dir.path()).load().is_none());
}

#[tokio::test]
async fn test_submit_reports_missing_fields() {
    let backend = FakeBackend::start().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let state = client(&backend, dir.path()).await;
    sign_in(&state).await;
    state.cart().add_item(MUG, 1).await.unwrap();

    let mut flow = state.checkout();
    flow.open();
    flow.update_form(|form| form.full_name = "Anna K".to_string());

    let err = flow.submit().await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidForm(ref f) if f == &["phone", "address"]));
    assert_eq!(backend.order_count(), 0);
}

#[tokio::test]
async fn test_submit_requires_items_and_session() {
    let backend = FakeBackend::start().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let state = client(&backend, dir.path()).await;

    let mut flow = state.checkout();
    flow.update_form(fill_required);
    assert!(matches!(
        flow.submit().await,
        Err(ClientError::NotAuthenticated)
    ));

    sign_in(&state).await;
    assert!(matches!(flow.submit().await, Err(ClientError::EmptyCart)));
}

// ============================================================================
// Recovery
// ============================================================================

#[tokio::test]
async fn test_prompt_expiry_keeps_draft_and_discard_deletes_it() {
    let backend = FakeBackend::start().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let state = with_short_prompt(&backend, dir.path()).await;
    let mut form = CheckoutForm::default();
    fill_required(&mut form);
    drafts(dir.path()).save(&CheckoutDraft::now(form, CheckoutStep::LAST, Vec::new()));
    state.cart().add_item(MUG, 1).await.unwrap();

    let mut flow = state.checkout();
    assert!(matches!(
        flow.open(),
        CheckoutEntry::Form { draft: Some(_) }
    ));
    assert_eq!(flow.prompt_state(), Some(PromptState::Visible));

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(flow.prompt_state(), Some(PromptState::Expired));
    assert!(drafts(dir.path()).load().is_some());

    assert!(flow.discard());
    assert!(drafts(dir.path()).load().is_none());
}

#[tokio::test]
async fn test_open_prompt_holds_back_cart_snapshots() {
    let backend = FakeBackend::start().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let state = client(&backend, dir.path()).await;
    drafts(dir.path()).save(&CheckoutDraft::now(
        CheckoutForm::default(),
        CheckoutStep::FIRST,
        Vec::new(),
    ));

    state.cart().add_item(MUG, 1).await.unwrap();

    let mut flow = state.checkout();
    flow.open();
    state.cart().add_item(TOWEL, 1).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(drafts(dir.path()).load().unwrap().items.is_empty());
}

#[tokio::test]
async fn test_restore_continues_past_failures() {
    let backend = FakeBackend::start().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let state = client(&backend, dir.path()).await;

    // Leave a draft with a mug and two towels
    state.cart().add_item(MUG, 1).await.unwrap();
    state.cart().add_item(TOWEL, 2).await.unwrap();
    {
        let mut flow = state.checkout();
        flow.open();
        flow.update_form(|form| form.full_name = "Anna K".to_string());
        flow.go_to_step(2);
        flow.close();
    }

    // Replace the cart with a board
    for line in state.cart().state().items {
        state.cart().remove_item(line.id).await.unwrap();
    }
    state.cart().add_item(BOARD, 1).await.unwrap();
    backend.fail_adds_for(7);

    let mut flow = state.checkout();
    let CheckoutEntry::Form { draft: Some(draft) } = flow.open() else {
        panic!("expected a draft");
    };
    assert_eq!(draft.items.len(), 2);

    let report = flow.restore().await;

    let actions: Vec<_> = report.outcomes.iter().map(|o| o.action).collect();
    assert_eq!(actions.len(), 3);
    assert!(matches!(
        actions[0],
        RestoreAction::RemoveCurrent { product_id, .. } if product_id == BOARD
    ));
    assert_eq!(
        actions[1..],
        [
            RestoreAction::AddDrafted {
                product_id: MUG,
                quantity: 1
            },
            RestoreAction::AddDrafted {
                product_id: TOWEL,
                quantity: 2
            },
        ]
    );
    assert!(!report.is_complete());
    assert_eq!(report.succeeded(), 2);
    let failed: Vec<_> = report.failures().map(|o| o.action).collect();
    assert_eq!(
        failed,
        vec![RestoreAction::AddDrafted {
            product_id: TOWEL,
            quantity: 2
        }]
    );

    let cart = state.cart().state();
    assert!(cart.line_for(MUG).is_some());
    assert!(cart.line_for(BOARD).is_none());
    assert_eq!(flow.form().full_name, "Anna K");
    assert_eq!(flow.step().get(), 2);
    assert_eq!(flow.prompt_state(), Some(PromptState::Restored));
}
