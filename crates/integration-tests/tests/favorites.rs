//! Integration tests for favorites synchronization.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use cornermarket_core::{Email, ProductId};
use cornermarket_integration_tests::{BUYER_EMAIL, FakeBackend, PASSWORD, client, wait_for};
use cornermarket_storefront::favorites::FavoriteSet;
use cornermarket_storefront::{AppState, ClientError};
use secrecy::SecretString;

const MUG: ProductId = ProductId::new(42);

async fn signed_in(backend: &FakeBackend, dir: &std::path::Path) -> AppState {
    let state = client(backend, dir).await;
    let email = Email::parse(BUYER_EMAIL).unwrap();
    state
        .session()
        .sign_in(&email, &SecretString::from(PASSWORD.to_owned()))
        .await
        .unwrap();
    // Let the session observer finish its reload
    tokio::time::sleep(Duration::from_millis(100)).await;
    state
}

#[tokio::test]
async fn test_toggle_follows_server_membership() {
    let backend = FakeBackend::start().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let state = signed_in(&backend, dir.path()).await;

    assert!(state.favorites().toggle(MUG).await.unwrap());
    assert!(state.favorites().is_favorite(MUG));
    assert_eq!(backend.favorite_products(1), vec![42]);

    assert!(!state.favorites().toggle(MUG).await.unwrap());
    assert!(!state.favorites().is_favorite(MUG));
    assert!(backend.favorite_products(1).is_empty());
}

#[tokio::test]
async fn test_set_matches_records_after_load() {
    let backend = FakeBackend::start().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let state = signed_in(&backend, dir.path()).await;

    state.favorites().toggle(MUG).await.unwrap();
    state.favorites().toggle(ProductId::new(13)).await.unwrap();

    let set = state.favorites().load().await;
    assert_eq!(set.len(), 2);
    for record in set.records() {
        assert!(set.contains(record.product.id));
    }
}

#[tokio::test]
async fn test_anonymous_toggle_is_rejected_locally() {
    let backend = FakeBackend::start().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let state = client(&backend, dir.path()).await;

    let err = state.favorites().toggle(MUG).await.unwrap_err();
    assert!(matches!(err, ClientError::NotAuthenticated));
    assert!(state.favorites().state().is_empty());
}

#[tokio::test]
async fn test_sign_out_empties_favorites() {
    let backend = FakeBackend::start().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let state = signed_in(&backend, dir.path()).await;
    state.favorites().toggle(MUG).await.unwrap();

    state.session().logout().await;

    let mut rx = state.favorites().subscribe();
    assert!(wait_for(&mut rx, FavoriteSet::is_empty).await);
    assert!(!state.favorites().is_favorite(MUG));
    // Server side is untouched
    assert_eq!(backend.favorite_products(1), vec![42]);
}
