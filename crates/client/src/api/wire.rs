//! JSON shapes of the commerce API and their normalization into core records.
//!
//! Products reach the client from several endpoints (search, recommendations,
//! cart fetches) with loosely typed fields: ids arrive as numbers or numeric
//! strings, titles and categories may be missing. Everything is converted to
//! [`Product`] / [`CartLine`] here, and malformed entries are dropped one by
//! one instead of failing the whole payload.

use cartsync_core::{CartLine, CartSnapshot, NetDelta, Price, Product, ProductId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

// =============================================================================
// Response Types
// =============================================================================

/// Product id as sent by the backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireProductId {
    Number(i64),
    Text(String),
}

impl WireProductId {
    fn parse(&self) -> Result<ProductId, String> {
        match self {
            Self::Number(n) => Ok(ProductId::new(*n)),
            Self::Text(s) => s
                .parse::<ProductId>()
                .map_err(|e| format!("invalid product_id {s:?}: {e}")),
        }
    }
}

/// Product fields shared by search, recommendation and cart payloads.
#[derive(Debug, Clone, Deserialize)]
pub struct WireProduct {
    pub product_id: WireProductId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub category: Option<String>,
}

/// One item of a cart fetch.
#[derive(Debug, Clone, Deserialize)]
pub struct WireCartItem {
    pub product_id: WireProductId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

const fn default_quantity() -> i64 {
    1
}

/// Body of `GET /api/cart`.
#[derive(Debug, Clone, Deserialize)]
pub struct CartResponse {
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub total: Option<Decimal>,
}

/// Error body returned with non-2xx statuses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    /// The human-readable message, if the backend provided one.
    #[must_use]
    pub fn into_message(self) -> Option<String> {
        self.error.or(self.message).filter(|m| !m.trim().is_empty())
    }
}

// =============================================================================
// Request Types
// =============================================================================

/// Body of `POST /api/cart/update`.
#[derive(Debug, Serialize)]
pub struct CartDeltaBody<'a> {
    pub user_id: &'a str,
    pub product_id: i64,
    pub quantity: i64,
}

/// One item of `POST /api/cart/batch`.
#[derive(Debug, Serialize)]
pub struct CartBatchItem {
    pub product_id: i64,
    pub quantity: i64,
}

/// Body of `POST /api/cart/batch`.
#[derive(Debug, Serialize)]
pub struct CartBatchBody<'a> {
    pub user_id: &'a str,
    pub items: Vec<CartBatchItem>,
}

impl<'a> CartBatchBody<'a> {
    pub fn new(user_id: &'a UserId, deltas: &[NetDelta]) -> Self {
        Self {
            user_id: user_id.as_str(),
            items: deltas
                .iter()
                .map(|d| CartBatchItem {
                    product_id: d.product_id.as_i64(),
                    quantity: d.quantity,
                })
                .collect(),
        }
    }
}

/// Body of requests that only identify the user (`POST /api/cart/clear`).
#[derive(Debug, Serialize)]
pub struct UserBody<'a> {
    pub user_id: &'a str,
}

// =============================================================================
// Normalization
// =============================================================================

fn normalize_product(
    product_id: &WireProductId,
    title: Option<String>,
    price: Option<Decimal>,
    category: Option<String>,
) -> Result<Product, String> {
    let id = product_id.parse()?;
    let price = price.ok_or_else(|| format!("product {id} has no price"))?;
    if price.is_sign_negative() {
        return Err(format!("product {id} has negative price {price}"));
    }

    Ok(Product {
        id,
        title: title.unwrap_or_default(),
        unit_price: Price::new(price),
        category: category.unwrap_or_default(),
    })
}

impl TryFrom<WireProduct> for Product {
    type Error = String;

    fn try_from(wire: WireProduct) -> Result<Self, Self::Error> {
        normalize_product(&wire.product_id, wire.title, wire.price, wire.category)
    }
}

impl TryFrom<WireCartItem> for CartLine {
    type Error = String;

    fn try_from(wire: WireCartItem) -> Result<Self, Self::Error> {
        let product = normalize_product(&wire.product_id, wire.title, wire.price, wire.category)?;
        let quantity = u32::try_from(wire.quantity)
            .ok()
            .filter(|q| *q > 0)
            .ok_or_else(|| {
                format!(
                    "product {} has out-of-range quantity {}",
                    product.id, wire.quantity
                )
            })?;
        Ok(Self::from_product(&product, quantity))
    }
}

impl CartResponse {
    /// Normalize into a snapshot, dropping malformed or empty lines.
    ///
    /// `count` and `total` fall back to values computed from the kept lines
    /// when the backend omits them.
    #[must_use]
    pub fn into_snapshot(self) -> CartSnapshot {
        let mut lines: Vec<CartLine> = Vec::with_capacity(self.items.len());
        for raw in self.items {
            let line = serde_json::from_value::<WireCartItem>(raw)
                .map_err(|e| e.to_string())
                .and_then(CartLine::try_from);
            match line {
                Ok(line) if lines.iter().any(|l| l.product_id == line.product_id) => {
                    warn!(product_id = %line.product_id, "Duplicate cart line dropped");
                }
                Ok(line) => lines.push(line),
                Err(reason) => warn!(reason = %reason, "Malformed cart line dropped"),
            }
        }

        let count = self
            .count
            .unwrap_or_else(|| lines.iter().map(|l| u64::from(l.quantity)).sum());
        let total = self
            .total
            .map_or_else(|| lines.iter().map(CartLine::line_total).sum(), Price::new);

        CartSnapshot {
            lines,
            count,
            total,
        }
    }
}

/// Extract products from a search or recommendation payload.
///
/// Accepts a bare array, or an object holding arrays under `products`,
/// `items`, `recent` or `similar`. Products are deduplicated by id, keeping
/// the first occurrence.
#[must_use]
pub fn products_from_payload(payload: &serde_json::Value) -> Vec<Product> {
    const LIST_KEYS: &[&str] = &["products", "items", "recent", "similar"];

    let entries: Vec<&serde_json::Value> = match payload {
        serde_json::Value::Array(items) => items.iter().collect(),
        serde_json::Value::Object(map) => LIST_KEYS
            .iter()
            .filter_map(|key| map.get(*key).and_then(serde_json::Value::as_array))
            .flatten()
            .collect(),
        _ => Vec::new(),
    };

    let mut products: Vec<Product> = Vec::with_capacity(entries.len());
    for entry in entries {
        let product = serde_json::from_value::<WireProduct>(entry.clone())
            .map_err(|e| e.to_string())
            .and_then(Product::try_from);
        match product {
            Ok(p) if products.iter().any(|existing| existing.id == p.id) => {}
            Ok(p) => products.push(p),
            Err(reason) => debug!(reason = %reason, "Skipping malformed product"),
        }
    }
    products
}
