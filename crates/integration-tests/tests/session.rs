//! Integration tests for session lifecycle against the fake backend.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use cornermarket_core::{Email, ProductId, UserRole};
use cornermarket_integration_tests::{
    BUYER_EMAIL, FakeBackend, PASSWORD, SELLER_EMAIL, client, wait_for,
};
use cornermarket_storefront::session::AuthStatus;
use cornermarket_storefront::storage::{FileStorage, Storage, keys};
use secrecy::SecretString;

fn password() -> SecretString {
    SecretString::from(PASSWORD.to_owned())
}

fn stored(dir: &std::path::Path, key: &str) -> Option<String> {
    FileStorage::open(dir).unwrap().get(key).unwrap()
}

// ============================================================================
// Sign-in and restore
// ============================================================================

#[tokio::test]
async fn test_sign_in_persists_tokens_and_user() {
    let backend = FakeBackend::start().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let state = client(&backend, dir.path()).await;

    let email = Email::parse(BUYER_EMAIL).unwrap();
    let user = state.session().sign_in(&email, &password()).await.unwrap();

    assert_eq!(user.unwrap().email, BUYER_EMAIL);
    let snapshot = state.session().snapshot();
    assert_eq!(snapshot.status, AuthStatus::Authenticated);
    assert!(stored(dir.path(), keys::ACCESS_TOKEN).is_some());
    assert!(stored(dir.path(), keys::REFRESH_TOKEN).is_some());
}

#[tokio::test]
async fn test_session_restored_from_storage() {
    let backend = FakeBackend::start().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let (access, refresh) = backend.issue_tokens(SELLER_EMAIL);
    let storage = FileStorage::open(dir.path()).unwrap();
    storage.set(keys::ACCESS_TOKEN, &access).unwrap();
    storage.set(keys::REFRESH_TOKEN, &refresh).unwrap();

    let state = client(&backend, dir.path()).await;

    let snapshot = state.session().snapshot();
    assert!(snapshot.is_authenticated());
    assert!(snapshot.user.unwrap().is_seller());
}

#[tokio::test]
async fn test_rejected_stored_token_clears_everything() {
    let backend = FakeBackend::start().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let (access, refresh) = backend.issue_tokens(BUYER_EMAIL);
    backend.reject_token(&access);
    let storage = FileStorage::open(dir.path()).unwrap();
    storage.set(keys::ACCESS_TOKEN, &access).unwrap();
    storage.set(keys::REFRESH_TOKEN, &refresh).unwrap();

    let state = client(&backend, dir.path()).await;

    let snapshot = state.session().snapshot();
    assert_eq!(snapshot.status, AuthStatus::Anonymous);
    assert!(snapshot.user.is_none());
    assert!(stored(dir.path(), keys::ACCESS_TOKEN).is_none());
    assert!(stored(dir.path(), keys::REFRESH_TOKEN).is_none());
    assert!(!state.api().has_token().await);
}

#[tokio::test]
async fn test_register_signs_in() {
    let backend = FakeBackend::start().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let state = client(&backend, dir.path()).await;

    let email = Email::parse("new@example.com").unwrap();
    let user = state
        .session()
        .register(&email, &password(), UserRole::Seller)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(user.email, "new@example.com");
    assert!(user.is_seller());
    assert!(state.session().is_authenticated());
}

// ============================================================================
// Sign-out and rejection
// ============================================================================

#[tokio::test]
async fn test_logout_clears_memory_and_storage() {
    let backend = FakeBackend::start().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let state = client(&backend, dir.path()).await;
    let email = Email::parse(BUYER_EMAIL).unwrap();
    state.session().sign_in(&email, &password()).await.unwrap();

    state.session().logout().await;

    let snapshot = state.session().snapshot();
    assert_eq!(snapshot.status, AuthStatus::Anonymous);
    assert!(snapshot.user.is_none());
    assert!(stored(dir.path(), keys::ACCESS_TOKEN).is_none());
    assert!(stored(dir.path(), keys::REFRESH_TOKEN).is_none());
}

#[tokio::test]
async fn test_token_rejected_mid_session_signs_out() {
    let backend = FakeBackend::start().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let state = client(&backend, dir.path()).await;
    let (access, refresh) = backend.issue_tokens(BUYER_EMAIL);
    state
        .session()
        .login(SecretString::from(access.clone()), SecretString::from(refresh))
        .await
        .unwrap();

    backend.reject_token(&access);
    assert!(state.cart().load().await.is_empty());

    let mut rx = state.session().subscribe();
    assert!(wait_for(&mut rx, |s| s.status == AuthStatus::Anonymous).await);
    assert!(stored(dir.path(), keys::ACCESS_TOKEN).is_none());
}

#[tokio::test]
async fn test_rejection_of_replaced_token_is_ignored() {
    let backend = FakeBackend::start().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let state = client(&backend, dir.path()).await;

    let (old_access, old_refresh) = backend.issue_tokens(BUYER_EMAIL);
    state
        .session()
        .login(SecretString::from(old_access), SecretString::from(old_refresh))
        .await
        .unwrap();
    let old_epoch = state.api().token_epoch().await.unwrap();

    let (access, refresh) = backend.issue_tokens(SELLER_EMAIL);
    state
        .session()
        .login(SecretString::from(access), SecretString::from(refresh))
        .await
        .unwrap();

    assert!(!state.session().on_token_rejected(old_epoch).await);
    assert!(state.session().is_authenticated());
}

#[tokio::test]
async fn test_switching_accounts_reloads_cart_and_favorites() {
    let backend = FakeBackend::start().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let state = client(&backend, dir.path()).await;
    let mug = ProductId::new(42);

    let buyer = Email::parse(BUYER_EMAIL).unwrap();
    state.session().sign_in(&buyer, &password()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    state.cart().add_item(mug, 2).await.unwrap();
    assert!(state.favorites().toggle(mug).await.unwrap());

    let seller = Email::parse(SELLER_EMAIL).unwrap();
    state.session().sign_in(&seller, &password()).await.unwrap();

    let mut cart = state.cart().subscribe();
    assert!(wait_for(&mut cart, |c| c.is_empty()).await);
    let mut favorites = state.favorites().subscribe();
    assert!(wait_for(&mut favorites, |f| f.is_empty()).await);
    assert_eq!(backend.cart_lines(1), vec![(42, 2)]);
    assert_eq!(backend.favorite_products(1), vec![42]);
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test]
async fn test_stale_login_never_overrides_newer_login() {
    let backend = FakeBackend::start().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let state = client(&backend, dir.path()).await;

    let (slow_access, slow_refresh) = backend.issue_tokens(SELLER_EMAIL);
    backend.delay_user_fetch(&slow_access, Duration::from_millis(300));
    let (access, refresh) = backend.issue_tokens(BUYER_EMAIL);

    let session = state.session().clone();
    let slow = tokio::spawn(async move {
        session
            .login(SecretString::from(slow_access), SecretString::from(slow_refresh))
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let user = state
        .session()
        .login(SecretString::from(access.clone()), SecretString::from(refresh))
        .await
        .unwrap();
    assert_eq!(user.unwrap().email, BUYER_EMAIL);

    assert!(slow.await.unwrap().unwrap().is_none());
    let snapshot = state.session().snapshot();
    assert_eq!(snapshot.user.unwrap().email, BUYER_EMAIL);
    assert_eq!(stored(dir.path(), keys::ACCESS_TOKEN), Some(access));
}

#[tokio::test]
async fn test_refresh_keeps_session() {
    let backend = FakeBackend::start().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let state = client(&backend, dir.path()).await;
    let email = Email::parse(BUYER_EMAIL).unwrap();
    state.session().sign_in(&email, &password()).await.unwrap();
    let before = stored(dir.path(), keys::ACCESS_TOKEN);

    assert!(state.session().refresh_access().await.unwrap());

    assert!(state.session().is_authenticated());
    assert_ne!(stored(dir.path(), keys::ACCESS_TOKEN), before);
    assert_eq!(backend.hits("user"), 1);
}

#[tokio::test]
async fn test_state_survives_without_storage() {
    let backend = FakeBackend::start().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(cornermarket_storefront::storage::MemoryStorage::unavailable());
    let state =
        cornermarket_storefront::AppState::new(backend.config(dir.path()), storage).unwrap();
    state.init().await;

    let email = Email::parse(BUYER_EMAIL).unwrap();
    state.session().sign_in(&email, &password()).await.unwrap();
    assert!(state.session().is_authenticated());
}
