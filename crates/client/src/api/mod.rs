//! Commerce API contract and HTTP client.
//!
//! # Architecture
//!
//! - The backend is the source of truth for the cart; the client never
//!   validates quantities itself (floors are enforced server-side)
//! - [`CommerceApi`] is the seam the coalescer depends on, so tests can swap
//!   in an in-memory backend
//! - [`HttpCommerceClient`] implements it over JSON/HTTP with `reqwest`
//! - Every payload is normalized into `cartsync_core` records in [`wire`]
//!
//! # Example
//!
//! ```rust,ignore
//! use cartsync_client::api::{CommerceApi, HttpCommerceClient};
//!
//! let client = HttpCommerceClient::new(&config.api)?;
//! let snapshot = client.fetch_cart(&user_id).await?;
//! client.submit_cart_delta(&user_id, product_id, 3).await?;
//! ```

mod http;
pub mod wire;

use std::future::Future;

use cartsync_core::{CartSnapshot, NetDelta, ProductId, UserId};
use thiserror::Error;

pub use http::{HttpCommerceClient, REQUEST_ID_HEADER};
pub use wire::products_from_payload;

/// Errors that can occur when talking to the commerce API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The request exceeded the transport timeout.
    #[error("Request timed out")]
    Timeout,

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The backend no longer recognizes the user; re-authentication required.
    #[error("Session expired: {0}")]
    SessionNotFound(String),

    /// The backend refused the operation (e.g. quantity would drop below zero).
    #[error("Rejected ({status}): {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Message from the backend's error body.
        message: String,
    },

    /// A request could not be built from the given input.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

impl ApiError {
    /// Whether the surrounding application should force re-authentication.
    #[must_use]
    pub const fn requires_reauth(&self) -> bool {
        matches!(self, Self::SessionNotFound(_))
    }

    /// Map a transport error, separating timeouts from other failures.
    pub(crate) fn from_transport(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(error)
        }
    }
}

/// Operations the cart engine needs from the commerce backend.
///
/// Implementations must be cheap to share across tasks; the coalescer holds
/// one instance for the whole session.
pub trait CommerceApi: Send + Sync + 'static {
    /// Fetch the authoritative cart for `user_id`.
    fn fetch_cart(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<CartSnapshot, ApiError>> + Send;

    /// Apply one net quantity change to one product.
    fn submit_cart_delta(
        &self,
        user_id: &UserId,
        product_id: ProductId,
        net_quantity: i64,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Apply several net changes in one call. All-or-nothing on the backend.
    fn submit_cart_delta_batch(
        &self,
        user_id: &UserId,
        deltas: &[NetDelta],
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Remove every line from the cart.
    fn clear_cart(&self, user_id: &UserId) -> impl Future<Output = Result<(), ApiError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = ApiError::SessionNotFound("user not found. Please login again.".to_string());
        assert_eq!(
            err.to_string(),
            "Session expired: user not found. Please login again."
        );

        let err = ApiError::Rejected {
            status: 400,
            message: "quantity cannot go below zero".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Rejected (400): quantity cannot go below zero"
        );
    }

    #[test]
    fn test_requires_reauth_only_for_session_not_found() {
        assert!(ApiError::SessionNotFound(String::new()).requires_reauth());
        assert!(!ApiError::Timeout.requires_reauth());
        assert!(
            !ApiError::Rejected {
                status: 404,
                message: String::new()
            }
            .requires_reauth()
        );
    }
}
