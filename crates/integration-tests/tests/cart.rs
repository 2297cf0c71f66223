//! Integration tests for cart synchronization.

#![allow(clippy::unwrap_used)]

use cornermarket_core::{Email, Price, ProductId};
use cornermarket_integration_tests::{BUYER_EMAIL, FakeBackend, PASSWORD, client, wait_for};
use cornermarket_storefront::ClientError;
use cornermarket_storefront::cart::CartState;
use cornermarket_storefront::checkout::CheckoutEntry;
use rust_decimal::Decimal;
use secrecy::SecretString;

const MUG: ProductId = ProductId::new(42);
const TOWEL: ProductId = ProductId::new(7);

fn assert_totals_consistent(cart: &CartState) {
    let count: u64 = cart.items.iter().map(|l| u64::from(l.quantity)).sum();
    let total: Price = cart.items.iter().map(|l| l.line_total()).sum();
    assert_eq!(cart.count(), count);
    assert_eq!(cart.total(), total);
}

#[tokio::test]
async fn test_empty_cart() {
    let backend = FakeBackend::start().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let state = client(&backend, dir.path()).await;

    let cart = state.cart().state();
    assert!(cart.is_empty());
    assert_eq!(cart.count(), 0);
    assert_eq!(cart.total(), Price::ZERO);
    assert!(!cart.busy);

    let mut flow = state.checkout();
    assert_eq!(flow.open(), CheckoutEntry::Catalog);
}

#[tokio::test]
async fn test_repeated_adds_aggregate_on_server() {
    let backend = FakeBackend::start().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let state = client(&backend, dir.path()).await;

    state.cart().add_item(MUG, 1).await.unwrap();
    let cart = state.cart().add_item(MUG, 1).await.unwrap();

    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 2);
    assert_eq!(cart.total().amount(), Decimal::new(2500, 2));
    assert_totals_consistent(&cart);
    assert_eq!(backend.cart_lines(0), vec![(42, 2)]);
}

#[tokio::test]
async fn test_totals_follow_every_change() {
    let backend = FakeBackend::start().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let state = client(&backend, dir.path()).await;

    state.cart().add_item(MUG, 3).await.unwrap();
    let cart = state.cart().add_item(TOWEL, 2).await.unwrap();
    assert_eq!(cart.count(), 5);
    assert_eq!(cart.total().amount(), Decimal::new(5350, 2));
    assert_totals_consistent(&cart);

    let line = cart.line_for(MUG).unwrap().id;
    let cart = state.cart().update_item(line, 1).await.unwrap();
    assert_eq!(cart.count(), 3);
    assert_totals_consistent(&cart);
}

#[tokio::test]
async fn test_zero_or_negative_quantity_removes_line() {
    let backend = FakeBackend::start().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let state = client(&backend, dir.path()).await;

    state.cart().add_item(MUG, 1).await.unwrap();
    let cart = state.cart().add_item(TOWEL, 1).await.unwrap();

    let mug = cart.line_for(MUG).unwrap().id;
    let cart = state.cart().update_item(mug, 0).await.unwrap();
    assert!(cart.line_for(MUG).is_none());

    let towel = cart.line_for(TOWEL).unwrap().id;
    let cart = state.cart().update_item(towel, -1).await.unwrap();
    assert!(cart.line_for(TOWEL).is_none());
    assert!(cart.is_empty());
}

#[tokio::test]
async fn test_remove_with_empty_response() {
    let backend = FakeBackend::start().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let state = client(&backend, dir.path()).await;

    let cart = state.cart().add_item(MUG, 2).await.unwrap();
    let line = cart.items[0].id;

    let cart = state.cart().remove_item(line).await.unwrap();
    assert!(cart.is_empty());
    assert!(backend.cart_lines(0).is_empty());
}

#[tokio::test]
async fn test_failed_add_leaves_cart_unchanged() {
    let backend = FakeBackend::start().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let state = client(&backend, dir.path()).await;
    backend.fail_adds_for(7);

    let before = state.cart().add_item(MUG, 1).await.unwrap();
    let err = state.cart().add_item(TOWEL, 1).await.unwrap_err();

    assert!(matches!(err, ClientError::Api(_)));
    let after = state.cart().state();
    assert_eq!(after.items, before.items);
    assert!(!after.busy);
}

#[tokio::test]
async fn test_sign_in_reloads_cart() {
    let backend = FakeBackend::start().await.unwrap();
    backend.seed_cart(Some(BUYER_EMAIL), 13, 1);
    let dir = tempfile::tempdir().unwrap();
    let state = client(&backend, dir.path()).await;
    assert!(state.cart().state().is_empty());

    let email = Email::parse(BUYER_EMAIL).unwrap();
    state
        .session()
        .sign_in(&email, &SecretString::from(PASSWORD.to_owned()))
        .await
        .unwrap();

    let mut rx = state.cart().subscribe();
    assert!(wait_for(&mut rx, |cart| cart.line_for(ProductId::new(13)).is_some()).await);

    state.session().logout().await;
    assert!(wait_for(&mut rx, CartState::is_empty).await);
}
