//! Backend state shared across handlers.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cartsync_core::{CartLine, NetDelta, Price, Product, ProductId};

use crate::error::MockError;

/// In-memory catalog and carts.
///
/// Cheaply cloneable; clones share state, so a test can keep a handle to
/// inspect and steer the backend while the server owns another.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    inner: Arc<Mutex<BackendState>>,
}

#[derive(Debug, Default)]
struct BackendState {
    catalog: BTreeMap<ProductId, Product>,
    carts: HashMap<String, BTreeMap<ProductId, u32>>,
    fail_updates: usize,
    counters: CallCounters,
}

/// Number of requests each endpoint has handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounters {
    pub fetches: usize,
    pub updates: usize,
    pub batches: usize,
    pub clears: usize,
}

impl MockBackend {
    /// Create a backend with no products and no users.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend seeded with a small catalog and the user `demo`.
    #[must_use]
    pub fn demo() -> Self {
        let backend = Self::new();
        for (id, title, cents, category) in [
            (1, "Trail Running Shoes", 8999, "footwear"),
            (2, "Merino Wool Socks", 1499, "apparel"),
            (3, "Insulated Water Bottle", 2450, "outdoor"),
            (4, "Packable Rain Jacket", 12900, "apparel"),
            (5, "Headlamp", 3200, "outdoor"),
        ] {
            backend.add_product(Product {
                id: ProductId::new(id),
                title: title.to_string(),
                unit_price: Price::from_cents(cents),
                category: category.to_string(),
            });
        }
        backend.add_user("demo");
        backend
    }

    fn lock(&self) -> MutexGuard<'_, BackendState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add or replace a catalog product.
    pub fn add_product(&self, product: Product) {
        self.lock().catalog.insert(product.id, product);
    }

    /// Register a user with an empty cart.
    pub fn add_user(&self, user_id: &str) {
        self.lock().carts.entry(user_id.to_string()).or_default();
    }

    /// Forget a user, as if their account was deleted.
    pub fn remove_user(&self, user_id: &str) {
        self.lock().carts.remove(user_id);
    }

    /// Set a quantity directly, bypassing validation (another device editing
    /// the same cart). Registers the user if needed.
    pub fn set_quantity(&self, user_id: &str, product_id: ProductId, quantity: u32) {
        let mut state = self.lock();
        let cart = state.carts.entry(user_id.to_string()).or_default();
        if quantity == 0 {
            cart.remove(&product_id);
        } else {
            cart.insert(product_id, quantity);
        }
    }

    /// Quantity of `product_id` in the user's cart, 0 if absent.
    #[must_use]
    pub fn quantity(&self, user_id: &str, product_id: ProductId) -> u32 {
        self.lock()
            .carts
            .get(user_id)
            .and_then(|cart| cart.get(&product_id).copied())
            .unwrap_or(0)
    }

    /// Make the next `count` update or batch requests fail with a 500.
    pub fn fail_next_updates(&self, count: usize) {
        self.lock().fail_updates = count;
    }

    /// Requests handled so far.
    #[must_use]
    pub fn counters(&self) -> CallCounters {
        self.lock().counters
    }

    /// Catalog products ordered by id.
    #[must_use]
    pub fn products(&self) -> Vec<Product> {
        self.lock().catalog.values().cloned().collect()
    }

    /// Lines of the user's cart, ordered by product id.
    ///
    /// # Errors
    ///
    /// Returns `MockError::UserNotFound` for an unknown user.
    pub fn cart(&self, user_id: &str) -> Result<Vec<CartLine>, MockError> {
        let mut state = self.lock();
        state.counters.fetches += 1;
        let cart = state.carts.get(user_id).ok_or(MockError::UserNotFound)?;
        Ok(cart
            .iter()
            .filter_map(|(id, quantity)| {
                state
                    .catalog
                    .get(id)
                    .map(|product| CartLine::from_product(product, *quantity))
            })
            .collect())
    }

    /// Apply one net change.
    ///
    /// # Errors
    ///
    /// Unknown user or product, a result below zero, or an injected failure.
    pub fn apply_delta(&self, user_id: &str, delta: NetDelta) -> Result<(), MockError> {
        let mut state = self.lock();
        state.counters.updates += 1;
        state.take_injected_failure()?;
        state.apply(user_id, &[delta])
    }

    /// Apply several net changes; none are applied if any is rejected.
    ///
    /// # Errors
    ///
    /// Same as [`apply_delta`](Self::apply_delta).
    pub fn apply_batch(&self, user_id: &str, deltas: &[NetDelta]) -> Result<(), MockError> {
        let mut state = self.lock();
        state.counters.batches += 1;
        state.take_injected_failure()?;
        state.apply(user_id, deltas)
    }

    /// Remove every line from the user's cart.
    ///
    /// # Errors
    ///
    /// Returns `MockError::UserNotFound` for an unknown user.
    pub fn clear(&self, user_id: &str) -> Result<(), MockError> {
        let mut state = self.lock();
        state.counters.clears += 1;
        state
            .carts
            .get_mut(user_id)
            .ok_or(MockError::UserNotFound)?
            .clear();
        Ok(())
    }
}

impl BackendState {
    fn take_injected_failure(&mut self) -> Result<(), MockError> {
        if self.fail_updates > 0 {
            self.fail_updates -= 1;
            return Err(MockError::Injected);
        }
        Ok(())
    }

    fn apply(&mut self, user_id: &str, deltas: &[NetDelta]) -> Result<(), MockError> {
        let cart = self.carts.get(user_id).ok_or(MockError::UserNotFound)?;

        let mut next = cart.clone();
        for delta in deltas {
            if !self.catalog.contains_key(&delta.product_id) {
                return Err(MockError::ProductNotFound(delta.product_id));
            }
            let current = i64::from(next.get(&delta.product_id).copied().unwrap_or(0));
            let target = current
                .checked_add(delta.quantity)
                .ok_or(MockError::QuantityOutOfRange(delta.product_id))?;
            if target < 0 {
                return Err(MockError::BelowZero(delta.product_id));
            }
            let quantity = u32::try_from(target)
                .map_err(|_| MockError::QuantityOutOfRange(delta.product_id))?;
            if quantity == 0 {
                next.remove(&delta.product_id);
            } else {
                next.insert(delta.product_id, quantity);
            }
        }

        self.carts.insert(user_id.to_string(), next);
        Ok(())
    }
}
