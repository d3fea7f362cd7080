//! Cartsync Core - Shared cart types.
//!
//! This crate provides the record shapes used across all cartsync components:
//! - `client` - Optimistic cart projection and mutation coalescer
//! - `mock-backend` - In-memory commerce API used for demos and tests
//! - `cli` - Command-line front end
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no timers.
//! Every collaborator payload (search results, recommendations, cart fetches)
//! is normalized into these shapes at the boundary where it is ingested.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, prices, products and cart lines

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
