//! Per-user cart session.
//!
//! Wires a [`CommerceApi`], a fresh [`CartStore`] and a [`CartCoalescer`]
//! together for one logged-in user. Dropping the session without calling
//! [`CartSession::close`] lets already-scheduled flushes finish on their own.

use cartsync_core::{Product, ProductId, UserId};
use tracing::{info, instrument};

use crate::api::{CommerceApi, HttpCommerceClient};
use crate::cart::{CartCoalescer, CartStore, NoticeReceiver};
use crate::config::SyncSettings;
use crate::error::CartError;
use crate::telemetry;

/// A user's cart: projection plus background synchronization.
#[derive(Debug, Clone)]
pub struct CartSession<A: CommerceApi = HttpCommerceClient> {
    coalescer: CartCoalescer<A>,
}

impl<A: CommerceApi> CartSession<A> {
    /// Start a session and load the authoritative cart.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Sync` if the initial fetch fails. A
    /// `SessionNotFound` cause means the user must log in again.
    #[instrument(skip(api, settings), fields(user_id = %user_id))]
    pub async fn start(
        api: A,
        user_id: UserId,
        settings: SyncSettings,
    ) -> Result<(Self, NoticeReceiver), CartError> {
        let (coalescer, notices) = CartCoalescer::new(api, user_id, CartStore::new(), settings);
        coalescer.refresh().await?;

        telemetry::set_sentry_user(coalescer.user_id());
        info!(
            lines = coalescer.store().lines().len(),
            count = coalescer.store().aggregate_count(),
            "Cart session started"
        );
        Ok((Self { coalescer }, notices))
    }

    /// The user this session belongs to.
    #[must_use]
    pub fn user_id(&self) -> &UserId {
        self.coalescer.user_id()
    }

    /// The shared projection every view reads.
    #[must_use]
    pub fn store(&self) -> &CartStore {
        self.coalescer.store()
    }

    /// The coalescer behind this session.
    #[must_use]
    pub const fn coalescer(&self) -> &CartCoalescer<A> {
        &self.coalescer
    }

    /// Record a +/- edit. See [`CartCoalescer::record`].
    pub fn record(&self, delta: i64, product: &Product) {
        self.coalescer.record(delta, product);
    }

    /// Quantity currently displayed for `product_id`.
    #[must_use]
    pub fn quantity_of(&self, product_id: ProductId) -> u32 {
        self.coalescer.store().quantity_of(product_id)
    }

    /// Re-fetch the authoritative cart.
    ///
    /// # Errors
    ///
    /// See [`CartCoalescer::refresh`].
    pub async fn refresh(&self) -> Result<(), CartError> {
        self.coalescer.refresh().await
    }

    /// Send every pending edit now.
    pub async fn flush_all(&self) {
        self.coalescer.flush_all().await;
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// See [`CartCoalescer::clear`].
    pub async fn clear(&self) -> Result<(), CartError> {
        telemetry::add_breadcrumb("cart", "Cart cleared", None);
        self.coalescer.clear().await
    }

    /// Log out: flush pending edits, then discard the projection.
    #[instrument(skip(self), fields(user_id = %self.user_id()))]
    pub async fn close(&self) {
        self.coalescer.close().await;
        telemetry::clear_sentry_user();
        info!("Cart session closed");
    }
}
