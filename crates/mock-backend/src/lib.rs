//! In-memory commerce backend for cartsync.
//!
//! Serves the cart endpoints the client talks to, backed by a catalog and
//! per-user carts held in memory. Used by the integration tests and by
//! `cartsync mock-server` for local development.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health             - Health check
//! GET  /api/products       - Catalog listing ({products: [...]})
//! GET  /api/cart?user_id=  - Cart for a user
//! POST /api/cart/update    - Apply one net quantity change
//! POST /api/cart/batch     - Apply several net changes, all-or-nothing
//! POST /api/cart/clear     - Remove every line
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

mod error;
mod routes;
mod state;

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

pub use error::MockError;
pub use state::{CallCounters, MockBackend};

/// Build the router for `backend`.
pub fn router(backend: MockBackend) -> Router {
    routes::routes()
        .layer(TraceLayer::new_for_http())
        .with_state(backend)
}

/// Serve `backend` on `listener` until the task is dropped or aborted.
///
/// # Errors
///
/// Returns an error if the server fails while accepting connections.
pub async fn serve(listener: TcpListener, backend: MockBackend) -> std::io::Result<()> {
    axum::serve(listener, router(backend)).await
}

/// Bind `addr` and serve `backend` on a background task.
///
/// Returns the bound address (useful with port 0) and the server task.
///
/// # Errors
///
/// Returns an error if the address cannot be bound.
pub async fn spawn(
    addr: SocketAddr,
    backend: MockBackend,
) -> std::io::Result<(SocketAddr, JoinHandle<std::io::Result<()>>)> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!("Mock commerce backend listening on {local_addr}");
    let handle = tokio::spawn(serve(listener, backend));
    Ok((local_addr, handle))
}
