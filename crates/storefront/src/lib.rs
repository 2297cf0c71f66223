//! Corner Market client library.
//!
//! Keeps a local, observable copy of the signed-in session, the cart, the
//! favorites and the in-progress checkout, synchronized with the
//! marketplace backend. [`AppState`] wires the pieces together; each
//! manager exposes a `subscribe()` watch channel for observers.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod cart;
pub mod checkout;
pub mod config;
pub mod draft;
pub mod error;
pub mod favorites;
pub mod prompt;
pub mod session;
pub mod state;
pub mod storage;
pub mod theme;

pub use api::{ApiClient, ApiError, ErrorKind};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use state::AppState;
