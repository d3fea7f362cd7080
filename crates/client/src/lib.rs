//! Cartsync client library.
//!
//! Keeps a locally mutable cart projection responsive to rapid +/- edits
//! while an authoritative commerce API holds the real cart. Bursts of edits
//! are coalesced per product into one net change, submitted after a quiet
//! period, and the projection is then reconciled against a fresh fetch.
//!
//! # Modules
//!
//! - [`cart`] - Cart projection store, mutation coalescer, user notices
//! - [`api`] - Commerce API contract and its HTTP implementation
//! - [`session`] - Per-user wiring of store, coalescer and API
//! - [`config`] - Environment configuration
//! - [`telemetry`] - Tracing and Sentry setup

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod cart;
pub mod config;
pub mod error;
pub mod session;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod test_support;

pub use api::{ApiError, CommerceApi, HttpCommerceClient};
pub use cart::{CartCoalescer, CartNotice, CartStatus, CartStore, NoticeReceiver};
pub use config::{CartSyncConfig, SyncSettings};
pub use error::CartError;
pub use session::CartSession;
