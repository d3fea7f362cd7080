//! In-memory commerce backend for unit tests.

#![allow(clippy::unwrap_used)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use cartsync_core::{CartLine, CartSnapshot, NetDelta, Price, Product, ProductId, UserId};

use crate::api::{ApiError, CommerceApi};

pub(crate) fn product(id: i64, cents: i64) -> Product {
    Product {
        id: ProductId::new(id),
        title: format!("Product {id}"),
        unit_price: Price::from_cents(cents),
        category: "misc".to_string(),
    }
}

#[derive(Debug, Default)]
struct FakeState {
    catalog: HashMap<ProductId, Product>,
    quantities: BTreeMap<ProductId, u32>,
    submissions: Vec<NetDelta>,
    batches: Vec<Vec<NetDelta>>,
    submission_attempts: usize,
    fetches: usize,
    fail_submissions: usize,
    fail_fetches: usize,
    session_expired: bool,
    submit_latency: Option<Duration>,
    fetch_latency: Option<Duration>,
}

impl FakeState {
    fn apply(&mut self, delta: &NetDelta) -> Result<(), ApiError> {
        if !self.catalog.contains_key(&delta.product_id) {
            return Err(ApiError::Rejected {
                status: 400,
                message: format!("product {} not found", delta.product_id),
            });
        }
        let current = i64::from(self.quantities.get(&delta.product_id).copied().unwrap_or(0));
        let next = current.saturating_add(delta.quantity);
        if next < 0 {
            return Err(ApiError::Rejected {
                status: 400,
                message: "quantity cannot go below zero".to_string(),
            });
        }
        let Ok(next) = u32::try_from(next) else {
            return Err(ApiError::Rejected {
                status: 400,
                message: "quantity out of range".to_string(),
            });
        };
        if next == 0 {
            self.quantities.remove(&delta.product_id);
        } else {
            self.quantities.insert(delta.product_id, next);
        }
        Ok(())
    }

    fn read_cart(&mut self) -> Result<CartSnapshot, ApiError> {
        self.check_session()?;
        if self.fail_fetches > 0 {
            self.fail_fetches -= 1;
            return Err(ApiError::Timeout);
        }

        let lines: Vec<CartLine> = self
            .quantities
            .iter()
            .filter_map(|(id, quantity)| {
                self.catalog
                    .get(id)
                    .map(|p| CartLine::from_product(p, *quantity))
            })
            .collect();
        Ok(CartSnapshot {
            count: lines.iter().map(|l| u64::from(l.quantity)).sum(),
            total: lines.iter().map(CartLine::line_total).sum(),
            lines,
        })
    }

    fn check_session(&self) -> Result<(), ApiError> {
        if self.session_expired {
            return Err(ApiError::SessionNotFound(
                "user not found. Please login again.".to_string(),
            ));
        }
        Ok(())
    }

    fn take_submit_failure(&mut self) -> Result<(), ApiError> {
        if self.fail_submissions > 0 {
            self.fail_submissions -= 1;
            return Err(ApiError::Rejected {
                status: 500,
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

/// Cloneable handle to a shared in-memory cart backend.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeCommerceApi {
    state: Arc<Mutex<FakeState>>,
}

impl FakeCommerceApi {
    pub(crate) fn with_catalog(products: impl IntoIterator<Item = Product>) -> Self {
        let api = Self::default();
        api.lock().catalog = products.into_iter().map(|p| (p.id, p)).collect();
        api
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub(crate) fn set_quantity(&self, product_id: ProductId, quantity: u32) {
        let mut state = self.lock();
        if quantity == 0 {
            state.quantities.remove(&product_id);
        } else {
            state.quantities.insert(product_id, quantity);
        }
    }

    pub(crate) fn quantity(&self, product_id: ProductId) -> u32 {
        self.lock().quantities.get(&product_id).copied().unwrap_or(0)
    }

    pub(crate) fn submissions(&self) -> Vec<NetDelta> {
        self.lock().submissions.clone()
    }

    pub(crate) fn batches(&self) -> Vec<Vec<NetDelta>> {
        self.lock().batches.clone()
    }

    pub(crate) fn submission_attempts(&self) -> usize {
        self.lock().submission_attempts
    }

    pub(crate) fn fetch_count(&self) -> usize {
        self.lock().fetches
    }

    pub(crate) fn fail_next_submissions(&self, count: usize) {
        self.lock().fail_submissions = count;
    }

    pub(crate) fn fail_next_fetches(&self, count: usize) {
        self.lock().fail_fetches = count;
    }

    pub(crate) fn expire_session(&self) {
        self.lock().session_expired = true;
    }

    pub(crate) fn set_submit_latency(&self, latency: Duration) {
        self.lock().submit_latency = Some(latency);
    }

    /// Delay fetch responses. The cart is read when the request arrives and
    /// returned after `latency`, like a slow network on the way back.
    pub(crate) fn set_fetch_latency(&self, latency: Duration) {
        self.lock().fetch_latency = Some(latency);
    }

    async fn submit_delay(&self) {
        let latency = self.lock().submit_latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl CommerceApi for FakeCommerceApi {
    async fn fetch_cart(&self, _user_id: &UserId) -> Result<CartSnapshot, ApiError> {
        let (snapshot, latency) = {
            let mut state = self.lock();
            state.fetches += 1;
            (state.read_cart(), state.fetch_latency)
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        snapshot
    }

    async fn submit_cart_delta(
        &self,
        _user_id: &UserId,
        product_id: ProductId,
        net_quantity: i64,
    ) -> Result<(), ApiError> {
        self.lock().submission_attempts += 1;
        self.submit_delay().await;

        let mut state = self.lock();
        state.check_session()?;
        state.take_submit_failure()?;
        let delta = NetDelta {
            product_id,
            quantity: net_quantity,
        };
        state.apply(&delta)?;
        state.submissions.push(delta);
        Ok(())
    }

    async fn submit_cart_delta_batch(
        &self,
        _user_id: &UserId,
        deltas: &[NetDelta],
    ) -> Result<(), ApiError> {
        self.lock().submission_attempts += 1;
        self.submit_delay().await;

        let mut state = self.lock();
        state.check_session()?;
        state.take_submit_failure()?;
        let before = state.quantities.clone();
        for delta in deltas {
            if let Err(e) = state.apply(delta) {
                state.quantities = before;
                return Err(e);
            }
        }
        state.batches.push(deltas.to_vec());
        Ok(())
    }

    async fn clear_cart(&self, _user_id: &UserId) -> Result<(), ApiError> {
        let mut state = self.lock();
        state.check_session()?;
        state.quantities.clear();
        Ok(())
    }
}
