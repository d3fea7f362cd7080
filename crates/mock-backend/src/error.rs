//! Error responses of the mock backend.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use cartsync_core::ProductId;
use serde_json::json;
use thiserror::Error;

/// Failure of a cart request, rendered as `{"error": "..."}`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MockError {
    /// `user_id` missing from the request.
    #[error("user_id required")]
    MissingUser,

    /// No such user; clients must re-authenticate.
    #[error("user not found. Please login again.")]
    UserNotFound,

    /// No such product in the catalog.
    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    /// The change would take a quantity below zero.
    #[error("quantity of product {0} cannot go below zero")]
    BelowZero(ProductId),

    /// The change would take a quantity past what a cart line can hold.
    #[error("quantity of product {0} is out of range")]
    QuantityOutOfRange(ProductId),

    /// Malformed request body.
    #[error("{0}")]
    BadRequest(String),

    /// Failure injected by a test.
    #[error("Failed to update cart: injected failure")]
    Injected,
}

impl MockError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::UserNotFound => StatusCode::NOT_FOUND,
            Self::MissingUser
            | Self::ProductNotFound(_)
            | Self::BelowZero(_)
            | Self::QuantityOutOfRange(_)
            | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Injected => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for MockError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self, "Cart request failed");
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
