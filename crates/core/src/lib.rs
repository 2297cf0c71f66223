//! Corner Market Core - Shared types library.
//!
//! This crate provides common types used across all Corner Market components:
//! - `storefront` - Client-side state synchronization against the marketplace API
//! - `cli` - Command-line front end over the storefront client
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no storage access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, prices, emails, and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
