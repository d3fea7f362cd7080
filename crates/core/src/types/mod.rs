//! Core types for cartsync.
//!
//! This module provides type-safe wrappers for the cart domain.

pub mod cart;
pub mod id;
pub mod price;
pub mod user;

pub use cart::{CartLine, CartSnapshot, NetDelta, Product};
pub use id::*;
pub use price::Price;
pub use user::{UserId, UserIdError};
