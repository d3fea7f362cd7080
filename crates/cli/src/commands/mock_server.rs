//! Run the in-memory commerce backend.
//!
//! Seeds the demo catalog (products 1-5) and the user `demo`, then serves
//! until interrupted.

use std::net::SocketAddr;

use cartsync_mock_backend::MockBackend;
use tracing::info;

/// Serve the demo backend on `addr` until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn run(addr: SocketAddr) -> Result<(), std::io::Error> {
    let backend = MockBackend::demo();
    let (local_addr, server) = cartsync_mock_backend::spawn(addr, backend).await?;
    info!(
        "Serving demo catalog at http://{local_addr} (export CARTSYNC_API_BASE_URL=http://{local_addr})"
    );

    tokio::select! {
        result = server => {
            result.map_err(std::io::Error::other)??;
        }
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Shutting down mock backend");
        }
    }
    Ok(())
}
