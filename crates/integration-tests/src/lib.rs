//! Integration tests for cartsync.
//!
//! Each test starts its own mock commerce backend on an ephemeral port and
//! drives the real HTTP client and coalescer against it.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p cartsync-integration-tests
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use cartsync_client::config::ApiConfig;
use cartsync_client::{
    CartError, CartNotice, CartSession, HttpCommerceClient, NoticeReceiver, SyncSettings,
};
use cartsync_core::{Price, Product, ProductId, UserId};
use cartsync_mock_backend::MockBackend;
use uuid::Uuid;

/// Debounce window used by end-to-end tests.
pub const TEST_DEBOUNCE: Duration = Duration::from_millis(50);

/// Long enough for a window to elapse and its flush and re-fetch to finish.
pub const SETTLE: Duration = Duration::from_millis(400);

/// A running mock backend plus a freshly registered user.
pub struct TestContext {
    pub backend: MockBackend,
    pub base_url: String,
    pub user: UserId,
}

impl TestContext {
    /// Start a demo backend on 127.0.0.1 and register a unique user.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound.
    pub async fn new() -> Self {
        let backend = MockBackend::demo();
        let addr: SocketAddr = ([127, 0, 0, 1], 0).into();
        let (addr, _server) = cartsync_mock_backend::spawn(addr, backend.clone())
            .await
            .expect("bind mock backend");

        let user = UserId::parse(&format!("it-{}", Uuid::new_v4().simple()))
            .expect("generated user id is valid");
        backend.add_user(user.as_str());

        Self {
            backend,
            base_url: format!("http://{addr}"),
            user,
        }
    }

    /// HTTP client pointed at this backend.
    ///
    /// # Panics
    ///
    /// Panics if the client cannot be built.
    #[must_use]
    pub fn client(&self) -> HttpCommerceClient {
        let config = ApiConfig::new(&self.base_url).expect("valid base url");
        HttpCommerceClient::new(&config).expect("build http client")
    }

    /// Start a session for this context's user.
    ///
    /// # Errors
    ///
    /// Propagates the initial fetch failure.
    pub async fn session(
        &self,
        settings: SyncSettings,
    ) -> Result<(CartSession, NoticeReceiver), CartError> {
        CartSession::start(self.client(), self.user.clone(), settings).await
    }

    /// Quantity of `product_id` in the backend's copy of the cart.
    #[must_use]
    pub fn server_quantity(&self, product_id: ProductId) -> u32 {
        self.backend.quantity(self.user.as_str(), product_id)
    }
}

/// Settings with the short test debounce window.
#[must_use]
pub const fn test_settings() -> SyncSettings {
    SyncSettings::with_debounce(TEST_DEBOUNCE)
}

/// A product from the demo catalog.
///
/// # Panics
///
/// Panics if `id` is not in the demo catalog.
#[must_use]
pub fn demo_product(backend: &MockBackend, id: i64) -> Product {
    backend
        .products()
        .into_iter()
        .find(|p| p.id == ProductId::new(id))
        .expect("product in demo catalog")
}

/// A $10.00 product registered in `backend`.
#[must_use]
pub fn ten_dollar_product(backend: &MockBackend) -> Product {
    let product = Product {
        id: ProductId::new(100),
        title: "Ten Dollar Tee".to_string(),
        unit_price: Price::from_cents(1000),
        category: "apparel".to_string(),
    };
    backend.add_product(product.clone());
    product
}

/// Wait for the next notice, failing after two seconds.
///
/// # Panics
///
/// Panics on timeout or a closed channel.
pub async fn next_notice(notices: &mut NoticeReceiver) -> CartNotice {
    tokio::time::timeout(Duration::from_secs(2), notices.recv())
        .await
        .expect("notice within timeout")
        .expect("notice channel open")
}
