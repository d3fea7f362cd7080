//! Product and cart line records.
//!
//! [`Product`] is the single record shape for anything a view can put in the
//! cart, whether it came from search, recommendations, or a cart fetch.
//! [`CartLine`] is one product currently in the cart.

use serde::{Deserialize, Serialize};

use super::id::ProductId;
use super::price::Price;

/// A product as displayed in a grid, modal, or cart panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Stable product identifier.
    pub id: ProductId,
    /// Display title.
    pub title: String,
    /// Unit price.
    pub unit_price: Price,
    /// Catalog category.
    pub category: String,
}

/// One product in the cart.
///
/// A line with `quantity == 0` never exists in a cart projection; it is
/// removed instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    /// Product this line refers to (unique within a cart).
    pub product_id: ProductId,
    /// Display title, copied from the product.
    pub title: String,
    /// Unit price, copied from the product.
    pub unit_price: Price,
    /// Catalog category, copied from the product.
    pub category: String,
    /// Number of units in the cart.
    pub quantity: u32,
}

impl CartLine {
    /// Create a line for `product` with the given quantity.
    #[must_use]
    pub fn from_product(product: &Product, quantity: u32) -> Self {
        Self {
            product_id: product.id,
            title: product.title.clone(),
            unit_price: product.unit_price,
            category: product.category.clone(),
            quantity,
        }
    }

    /// `unit_price * quantity`.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.unit_price.times(self.quantity)
    }

    /// The product attributes of this line.
    #[must_use]
    pub fn product(&self) -> Product {
        Product {
            id: self.product_id,
            title: self.title.clone(),
            unit_price: self.unit_price,
            category: self.category.clone(),
        }
    }
}

/// Authoritative cart state as reported by the commerce API.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CartSnapshot {
    /// Lines in the cart, in server order.
    pub lines: Vec<CartLine>,
    /// Total number of units as reported by the server.
    pub count: u64,
    /// Total price as reported by the server.
    pub total: Price,
}

impl CartSnapshot {
    /// Quantity of `product_id` in this snapshot, 0 if absent.
    #[must_use]
    pub fn quantity_of(&self, product_id: ProductId) -> u32 {
        self.lines
            .iter()
            .find(|line| line.product_id == product_id)
            .map_or(0, |line| line.quantity)
    }
}

/// A coalesced, not-yet-confirmed quantity change for one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetDelta {
    /// Product the change applies to.
    pub product_id: ProductId,
    /// Algebraic sum of every edit since the product's last flush.
    pub quantity: i64,
}
