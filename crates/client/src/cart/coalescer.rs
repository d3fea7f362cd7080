//! Debounced mutation coalescer.
//!
//! Each product runs its own small state machine:
//!
//! ```text
//!   Idle --record--> Accumulating --window elapses--> Flushing --> Idle
//!                     ^        |
//!                     +record--+  (net += delta, window restarts)
//! ```
//!
//! When a product's window elapses its pending entry (net delta and timer) is
//! removed under the lock before any network call starts, so an edit that
//! arrives while the call is in flight begins a fresh cycle. A zero net sends
//! nothing. After every submission, successful or not, the authoritative cart
//! is fetched and reconciled into the store.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cartsync_core::{NetDelta, Product, ProductId, UserId};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::notice::{CartNotice, NoticeReceiver};
use super::store::CartStore;
use crate::api::{ApiError, CommerceApi};
use crate::config::SyncSettings;
use crate::error::CartError;
use crate::telemetry;

/// Coalesces per-product quantity edits into minimal server calls.
///
/// Cheaply cloneable; clones drive the same queues and store.
pub struct CartCoalescer<A: CommerceApi> {
    inner: Arc<CoalescerInner<A>>,
}

impl<A: CommerceApi> Clone for CartCoalescer<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: CommerceApi> std::fmt::Debug for CartCoalescer<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock_state();
        f.debug_struct("CartCoalescer")
            .field("user_id", &self.inner.user_id)
            .field("settings", &self.inner.settings)
            .field("pending", &state.pending.len())
            .field("in_flight", &state.in_flight.len())
            .finish_non_exhaustive()
    }
}

struct CoalescerInner<A> {
    api: A,
    user_id: UserId,
    store: CartStore,
    settings: SyncSettings,
    runtime: Handle,
    state: Mutex<CoalescerState>,
    notices: mpsc::UnboundedSender<CartNotice>,
}

#[derive(Default)]
struct CoalescerState {
    /// Accumulating products.
    pending: HashMap<ProductId, PendingDelta>,
    /// Flushing products: number of submissions awaiting the server.
    in_flight: HashMap<ProductId, usize>,
    /// Expired nets waiting for the batch dispatcher of the current tick.
    ready: Vec<NetDelta>,
    /// Products whose last submission finished when `fetches_started` had
    /// this value. They stay fenced until a later fetch has been applied.
    settled_after: HashMap<ProductId, u64>,
    next_timer_id: u64,
    fetches_started: u64,
    last_applied_fetch: u64,
    closed: bool,
}

struct PendingDelta {
    net: i64,
    /// Some edit was clamped by the projection, so the displayed quantity may
    /// differ from the server even when `net` is zero.
    clamped: bool,
    timer_id: u64,
    timer: JoinHandle<()>,
}

/// What an expired window leaves to do.
enum Expired {
    Submit(NetDelta),
    Resync,
}

impl<A: CommerceApi> CartCoalescer<A> {
    /// Create a coalescer writing into `store` for `user_id`.
    ///
    /// Returns the coalescer and the receiving end of its notice channel.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime; timers are spawned on the
    /// runtime that was current at construction.
    #[must_use]
    pub fn new(
        api: A,
        user_id: UserId,
        store: CartStore,
        settings: SyncSettings,
    ) -> (Self, NoticeReceiver) {
        let (notices, receiver) = mpsc::unbounded_channel();
        let coalescer = Self {
            inner: Arc::new(CoalescerInner {
                api,
                user_id,
                store,
                settings,
                runtime: Handle::current(),
                state: Mutex::new(CoalescerState::default()),
                notices,
            }),
        };
        (coalescer, receiver)
    }

    /// The store this coalescer writes into.
    #[must_use]
    pub fn store(&self) -> &CartStore {
        &self.inner.store
    }

    /// The user whose cart is synchronized.
    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.inner.user_id
    }

    /// The settings in effect.
    #[must_use]
    pub fn settings(&self) -> SyncSettings {
        self.inner.settings
    }

    /// The API this coalescer submits to.
    #[must_use]
    pub fn api(&self) -> &A {
        &self.inner.api
    }

    /// Record a quantity edit.
    ///
    /// The store reflects the edit before this returns. The delta joins the
    /// product's pending net and the product's debounce window restarts.
    /// Never fails; edits after [`close`](Self::close) are ignored.
    #[instrument(skip(self, product), fields(product_id = %product.id))]
    pub fn record(&self, delta: i64, product: &Product) {
        if delta == 0 {
            return;
        }

        let mut state = self.inner.lock_state();
        if state.closed {
            debug!("Ignoring cart edit after session close");
            return;
        }

        let applied = self.inner.store.apply_measured(delta, product);
        let clamped = applied != delta;

        let timer_id = state.next_timer_id;
        state.next_timer_id += 1;
        let timer = self.inner.spawn_timer(product.id, timer_id);

        let net = match state.pending.entry(product.id) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.timer.abort();
                entry.net = entry.net.saturating_add(delta);
                entry.clamped |= clamped;
                entry.timer = timer;
                entry.timer_id = timer_id;
                entry.net
            }
            Entry::Vacant(vacant) => {
                vacant.insert(PendingDelta {
                    net: delta,
                    clamped,
                    timer_id,
                    timer,
                });
                delta
            }
        };
        drop(state);

        debug!(delta, net_delta = net, clamped, "Debounce window restarted");
        let (product_id, delta) = (product.id.to_string(), delta.to_string());
        telemetry::add_breadcrumb(
            "cart",
            "Cart quantity edited",
            Some(&[("product_id", product_id.as_str()), ("delta", delta.as_str())]),
        );
    }

    /// Net delta accumulated for `product_id` and not yet sent.
    #[must_use]
    pub fn pending_net(&self, product_id: ProductId) -> Option<i64> {
        self.inner
            .lock_state()
            .pending
            .get(&product_id)
            .map(|p| p.net)
    }

    /// Whether `product_id` has a submission awaiting the server.
    #[must_use]
    pub fn is_flushing(&self, product_id: ProductId) -> bool {
        self.inner.lock_state().in_flight.contains_key(&product_id)
    }

    /// Whether any product is accumulating or flushing.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        let state = self.inner.lock_state();
        !state.pending.is_empty() || !state.in_flight.is_empty() || !state.ready.is_empty()
    }

    /// Fetch the authoritative cart and reconcile it into the store.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Sync` if the fetch fails; the store is then marked
    /// `Unknown`. Returns `CartError::Closed` after [`close`](Self::close).
    pub async fn refresh(&self) -> Result<(), CartError> {
        if self.inner.lock_state().closed {
            return Err(CartError::Closed);
        }
        self.inner.reconcile().await.map_err(|e| {
            self.inner.store.mark_unknown(e.to_string());
            CartError::Sync(e)
        })
    }

    /// Expire every pending window now and wait for the resulting
    /// submissions and reconciliation.
    pub async fn flush_all(&self) {
        if self.inner.lock_state().closed {
            return;
        }
        self.inner.flush_pending().await;
    }

    /// Empty the cart.
    ///
    /// Pending edits are discarded, the store is cleared immediately, the
    /// backend is asked to clear, and the cart is re-fetched either way.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Clear` if the backend refused, `CartError::Sync`
    /// if the follow-up fetch failed, `CartError::Closed` after close.
    #[instrument(skip(self), fields(user_id = %self.inner.user_id))]
    pub async fn clear(&self) -> Result<(), CartError> {
        {
            let mut state = self.inner.lock_state();
            if state.closed {
                return Err(CartError::Closed);
            }
            state.discard_unsent();
            self.inner.store.clear();
        }

        let cleared = self.inner.api.clear_cart(&self.inner.user_id).await;
        if let Err(e) = &cleared {
            warn!(error = %e, "Failed to clear cart");
        }

        let synced = self.inner.reconcile().await;
        if let Err(e) = &synced {
            self.inner.store.mark_unknown(e.to_string());
        }

        cleared.map_err(CartError::Clear)?;
        synced.map_err(CartError::Sync)?;
        info!("Cart cleared");
        Ok(())
    }

    /// Stop accepting edits, flush what is pending, and discard the
    /// projection.
    pub async fn close(&self) {
        {
            let mut state = self.inner.lock_state();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        self.inner.flush_pending().await;
        self.inner.store.discard();
        debug!("Cart coalescer closed");
    }
}

impl CoalescerState {
    /// Drop every net that has not reached the wire: pending windows and
    /// nets waiting for the batch dispatcher.
    fn discard_unsent(&mut self) {
        for (_, pending) in self.pending.drain() {
            pending.timer.abort();
        }
        for delta in std::mem::take(&mut self.ready) {
            self.release_in_flight(delta.product_id);
        }
    }

    /// Count one submission for `product_id` as finished. Returns whether it
    /// was the last one in flight.
    fn release_in_flight(&mut self, product_id: ProductId) -> bool {
        let Entry::Occupied(mut count) = self.in_flight.entry(product_id) else {
            return false;
        };
        *count.get_mut() -= 1;
        if *count.get() == 0 {
            count.remove();
            return true;
        }
        false
    }

    /// Products whose local line must survive a snapshot from fetch `ticket`.
    fn fenced_for(&self, ticket: u64) -> HashSet<ProductId> {
        self.pending
            .keys()
            .chain(self.in_flight.keys())
            .chain(self.ready.iter().map(|d| &d.product_id))
            .copied()
            .chain(
                self.settled_after
                    .iter()
                    .filter(|&(_, &settled)| ticket <= settled)
                    .map(|(product_id, _)| *product_id),
            )
            .collect()
    }
}

impl<A: CommerceApi> CoalescerInner<A> {
    fn lock_state(&self) -> MutexGuard<'_, CoalescerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_timer(self: &Arc<Self>, product_id: ProductId, timer_id: u64) -> JoinHandle<()> {
        let inner = Arc::clone(self);
        let window = self.settings.debounce;
        self.runtime.spawn(async move {
            tokio::time::sleep(window).await;
            inner.expire(product_id, timer_id).await;
        })
    }

    /// Take a product out of the pending queue if `timer_id` is still its
    /// current timer.
    fn take_expired(
        state: &mut CoalescerState,
        product_id: ProductId,
        timer_id: Option<u64>,
    ) -> Option<Expired> {
        if let Some(expected) = timer_id
            && state.pending.get(&product_id).map(|p| p.timer_id) != Some(expected)
        {
            return None;
        }

        let entry = state.pending.remove(&product_id)?;
        if timer_id.is_none() {
            entry.timer.abort();
        }

        if entry.net == 0 {
            debug!(product_id = %product_id, clamped = entry.clamped, "Net delta is zero, nothing to send");
            return entry.clamped.then_some(Expired::Resync);
        }

        *state.in_flight.entry(product_id).or_default() += 1;
        Some(Expired::Submit(NetDelta {
            product_id,
            quantity: entry.net,
        }))
    }

    async fn expire(self: &Arc<Self>, product_id: ProductId, timer_id: u64) {
        let expired = {
            let mut state = self.lock_state();
            Self::take_expired(&mut state, product_id, Some(timer_id))
        };

        match expired {
            None => {}
            Some(Expired::Resync) => self.resync().await,
            Some(Expired::Submit(delta)) if self.settings.batch_flush => {
                self.dispatch_batched(delta).await;
            }
            Some(Expired::Submit(delta)) => {
                let result = self
                    .api
                    .submit_cart_delta(&self.user_id, delta.product_id, delta.quantity)
                    .await;
                self.finish_flush(&[delta], result).await;
            }
        }
    }

    /// Collect nets expiring in the same scheduler tick into one call.
    ///
    /// The first timer to arrive becomes the dispatcher; it yields once so
    /// other timers woken in this tick can add their nets.
    async fn dispatch_batched(self: &Arc<Self>, delta: NetDelta) {
        let is_dispatcher = {
            let mut state = self.lock_state();
            state.ready.push(delta);
            state.ready.len() == 1
        };
        if !is_dispatcher {
            return;
        }

        tokio::task::yield_now().await;

        let batch = std::mem::take(&mut self.lock_state().ready);
        self.submit(batch).await;
    }

    /// Submit `deltas` as one call (single or batch) and finish the flush.
    async fn submit(self: &Arc<Self>, deltas: Vec<NetDelta>) {
        let result = match deltas.as_slice() {
            [] => return,
            [single] => {
                self.api
                    .submit_cart_delta(&self.user_id, single.product_id, single.quantity)
                    .await
            }
            many => {
                self.api
                    .submit_cart_delta_batch(&self.user_id, many)
                    .await
            }
        };
        self.finish_flush(&deltas, result).await;
    }

    async fn flush_pending(self: &Arc<Self>) {
        let (deltas, needs_resync) = {
            let mut state = self.lock_state();
            let product_ids: Vec<ProductId> = state.pending.keys().copied().collect();
            let mut deltas = Vec::with_capacity(product_ids.len());
            let mut needs_resync = false;
            for product_id in product_ids {
                match Self::take_expired(&mut state, product_id, None) {
                    Some(Expired::Submit(delta)) => deltas.push(delta),
                    Some(Expired::Resync) => needs_resync = true,
                    None => {}
                }
            }
            (deltas, needs_resync)
        };

        if deltas.is_empty() {
            if needs_resync {
                self.resync().await;
            }
            return;
        }

        if self.settings.batch_flush {
            self.submit(deltas).await;
        } else {
            for delta in deltas {
                self.submit(vec![delta]).await;
            }
        }
    }

    async fn finish_flush(self: &Arc<Self>, deltas: &[NetDelta], result: Result<(), ApiError>) {
        {
            // A fetch already started may have read the cart before this
            // submission landed, so its snapshot must not touch these lines.
            let mut state = self.lock_state();
            let settled = state.fetches_started;
            for delta in deltas {
                if state.release_in_flight(delta.product_id) {
                    state.settled_after.insert(delta.product_id, settled);
                }
            }
        }

        match result {
            Ok(()) => info!(products = deltas.len(), "Cart flush confirmed"),
            Err(e) => self.report_flush_failure(deltas, &e),
        }

        self.resync().await;
    }

    fn report_flush_failure(&self, deltas: &[NetDelta], error: &ApiError) {
        if matches!(error, ApiError::Rejected { .. }) {
            warn!(error = %error, deltas = ?deltas, "Cart flush rejected by server");
        } else {
            let event_id = sentry::capture_error(error);
            tracing::error!(
                error = %error,
                deltas = ?deltas,
                sentry_event_id = %event_id,
                "Cart flush failed"
            );
        }

        // The receiver may be gone if nobody shows notices; that is fine.
        let _ = self.notices.send(CartNotice::FlushFailed {
            deltas: deltas.to_vec(),
            message: error.to_string(),
            reauth_required: error.requires_reauth(),
        });
    }

    /// Reconcile in the background; failures become a notice.
    async fn resync(self: &Arc<Self>) {
        if let Err(e) = self.reconcile().await {
            warn!(error = %e, "Cart reconciliation failed");
            self.store.mark_unknown(e.to_string());
            let _ = self.notices.send(CartNotice::SyncFailed {
                message: e.to_string(),
                reauth_required: e.requires_reauth(),
            });
        }
    }

    /// Fetch the authoritative cart and apply it, fencing products that still
    /// have local edits pending or in flight.
    ///
    /// A snapshot from a fetch that started before the last applied one is
    /// dropped, so responses arriving out of order never roll the store back.
    async fn reconcile(self: &Arc<Self>) -> Result<(), ApiError> {
        let ticket = {
            let mut state = self.lock_state();
            state.fetches_started += 1;
            state.fetches_started
        };

        let result = self.api.fetch_cart(&self.user_id).await;

        let mut state = self.lock_state();
        if ticket < state.last_applied_fetch {
            debug!(ticket, "Dropping out-of-order cart snapshot");
            return Ok(());
        }
        let snapshot = result?;
        state.last_applied_fetch = ticket;
        if state.closed {
            return Ok(());
        }

        let fenced = state.fenced_for(ticket);
        state.settled_after.retain(|_, settled| *settled > ticket);
        if !fenced.is_empty() {
            debug!(fenced = fenced.len(), "Keeping local lines for products mid-flight");
        }
        self.store.reconcile(snapshot.lines, &fenced);
        drop(state);
        Ok(())
    }
}
