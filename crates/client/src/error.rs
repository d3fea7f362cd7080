//! Errors returned by explicit cart operations.
//!
//! Background flushes never return errors to the caller; they are reported
//! through [`CartNotice`](crate::CartNotice) instead. Only operations a user
//! awaits directly (refresh, clear, session start) use [`CartError`].

use thiserror::Error;

use crate::api::ApiError;

/// Error from an awaited cart operation.
#[derive(Debug, Error)]
pub enum CartError {
    /// The authoritative cart could not be fetched.
    #[error("Cart sync failed: {0}")]
    Sync(#[source] ApiError),

    /// The backend did not clear the cart.
    #[error("Cart clear failed: {0}")]
    Clear(#[source] ApiError),

    /// The session was closed.
    #[error("Cart session is closed")]
    Closed,
}

impl CartError {
    /// Whether the surrounding application should force re-authentication.
    #[must_use]
    pub const fn requires_reauth(&self) -> bool {
        match self {
            Self::Sync(e) | Self::Clear(e) => e.requires_reauth(),
            Self::Closed => false,
        }
    }
}

/// Result type alias for `CartError`.
pub type Result<T> = std::result::Result<T, CartError>;
