//! Cart projection store.
//!
//! The single in-memory answer to "what is in the cart right now" for every
//! view. Views read it synchronously and push edits through
//! [`CartStore::apply_optimistic`]; only the coalescer's reconciliation
//! replaces lines wholesale.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use cartsync_core::{CartLine, Price, Product, ProductId};
use tokio::sync::watch;

/// Whether the projection can be trusted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CartStatus {
    /// No authoritative fetch has completed yet.
    #[default]
    Loading,
    /// Lines are either server-confirmed or local edits awaiting a flush.
    Ready,
    /// The last authoritative fetch failed; lines may be stale.
    Unknown {
        /// Human-readable failure reason.
        reason: String,
    },
}

#[derive(Debug, Default)]
struct CartProjection {
    lines: HashMap<ProductId, CartLine>,
    status: CartStatus,
}

/// Shared handle to the cart projection.
///
/// Cloning is cheap; all clones see the same lines.
#[derive(Debug, Clone)]
pub struct CartStore {
    inner: Arc<CartStoreInner>,
}

#[derive(Debug)]
struct CartStoreInner {
    projection: RwLock<CartProjection>,
    revision: watch::Sender<u64>,
}

impl Default for CartStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CartStore {
    /// Create an empty store in the `Loading` state.
    #[must_use]
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(CartStoreInner {
                projection: RwLock::new(CartProjection::default()),
                revision,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, CartProjection> {
        self.inner
            .projection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CartProjection> {
        self.inner
            .projection
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn bump_revision(&self) {
        self.inner.revision.send_modify(|rev| *rev = rev.wrapping_add(1));
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Quantity of `product_id` currently displayed, 0 if not in the cart.
    #[must_use]
    pub fn quantity_of(&self, product_id: ProductId) -> u32 {
        self.read().lines.get(&product_id).map_or(0, |l| l.quantity)
    }

    /// The line for `product_id`, if present.
    #[must_use]
    pub fn line(&self, product_id: ProductId) -> Option<CartLine> {
        self.read().lines.get(&product_id).cloned()
    }

    /// All lines, ordered by product id.
    #[must_use]
    pub fn lines(&self) -> Vec<CartLine> {
        let mut lines: Vec<CartLine> = self.read().lines.values().cloned().collect();
        lines.sort_by_key(|l| l.product_id);
        lines
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().lines.is_empty()
    }

    /// Sum of quantities, recomputed from the current lines.
    #[must_use]
    pub fn aggregate_count(&self) -> u64 {
        self.read()
            .lines
            .values()
            .map(|l| u64::from(l.quantity))
            .sum()
    }

    /// Sum of `unit_price * quantity`, recomputed from the current lines.
    #[must_use]
    pub fn aggregate_total(&self) -> Price {
        self.read().lines.values().map(CartLine::line_total).sum()
    }

    /// Current trust level of the projection.
    #[must_use]
    pub fn status(&self) -> CartStatus {
        self.read().status.clone()
    }

    /// Subscribe to changes. The value is a revision counter bumped on every
    /// mutation; receivers re-read the store when it changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Apply a signed quantity change locally, before the server confirms it.
    ///
    /// - absent and `delta > 0`: inserts a line with `quantity = delta`
    /// - present: `quantity = max(0, quantity + delta)`, removing the line at 0
    /// - absent and `delta <= 0`: nothing changes
    pub fn apply_optimistic(&self, delta: i64, product: &Product) {
        self.apply_measured(delta, product);
    }

    /// Like [`apply_optimistic`](Self::apply_optimistic), returning the change
    /// in displayed quantity, which differs from `delta` when clamped.
    pub(crate) fn apply_measured(&self, delta: i64, product: &Product) -> i64 {
        let applied = {
            let mut projection = self.write();
            match projection.lines.get_mut(&product.id) {
                Some(line) => {
                    let before = i64::from(line.quantity);
                    let next =
                        u32::try_from(before.saturating_add(delta).max(0)).unwrap_or(u32::MAX);
                    if next == 0 {
                        projection.lines.remove(&product.id);
                    } else {
                        line.quantity = next;
                    }
                    i64::from(next) - before
                }
                None if delta > 0 => {
                    let quantity = u32::try_from(delta).unwrap_or(u32::MAX);
                    projection
                        .lines
                        .insert(product.id, CartLine::from_product(product, quantity));
                    i64::from(quantity)
                }
                None => 0,
            }
        };

        if applied != 0 {
            self.bump_revision();
        }
        applied
    }

    /// Replace every line with `lines` and mark the projection `Ready`.
    pub fn replace_all(&self, lines: Vec<CartLine>) {
        self.reconcile(lines, &HashSet::new());
    }

    /// Replace lines with server truth, except for `fenced` products.
    ///
    /// A fenced product keeps its local line, or its local absence, so an edit
    /// still waiting for its flush is not overwritten by a snapshot taken
    /// before that edit reached the server. Lines are always taken whole from
    /// one source. Zero-quantity lines from `lines` are dropped.
    pub fn reconcile(&self, lines: Vec<CartLine>, fenced: &HashSet<ProductId>) {
        {
            let mut projection = self.write();
            let mut next: HashMap<ProductId, CartLine> = lines
                .into_iter()
                .filter(|l| l.quantity > 0 && !fenced.contains(&l.product_id))
                .map(|l| (l.product_id, l))
                .collect();

            for product_id in fenced {
                if let Some(local) = projection.lines.remove(product_id) {
                    next.insert(*product_id, local);
                }
            }

            projection.lines = next;
            projection.status = CartStatus::Ready;
        }
        self.bump_revision();
    }

    /// Remove every line locally (optimistic clear).
    pub fn clear(&self) {
        self.write().lines.clear();
        self.bump_revision();
    }

    /// Record that the projection could not be refreshed from the server.
    pub fn mark_unknown(&self, reason: impl Into<String>) {
        self.write().status = CartStatus::Unknown {
            reason: reason.into(),
        };
        self.bump_revision();
    }

    /// Drop every line and return to `Loading` (logout).
    pub(crate) fn discard(&self) {
        {
            let mut projection = self.write();
            projection.lines.clear();
            projection.status = CartStatus::Loading;
        }
        self.bump_revision();
    }
}
