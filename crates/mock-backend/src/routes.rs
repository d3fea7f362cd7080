//! Cart API route handlers.

use axum::{
    Json, Router,
    extract::{Query, State, rejection::JsonRejection},
    routing::{get, post},
};
use cartsync_core::{CartLine, NetDelta, Product, ProductId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::MockError;
use crate::state::MockBackend;

/// Create the backend's routes.
pub fn routes() -> Router<MockBackend> {
    Router::new()
        .route("/health", get(health))
        .route("/api/products", get(list_products))
        .route("/api/cart", get(get_cart))
        .route("/api/cart/update", post(update_cart))
        .route("/api/cart/batch", post(batch_update_cart))
        .route("/api/cart/clear", post(clear_cart))
}

// =============================================================================
// Request / Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    user_id: Option<String>,
    product_id: i64,
    quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct BatchItem {
    product_id: i64,
    quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    user_id: Option<String>,
    #[serde(default)]
    items: Vec<BatchItem>,
}

#[derive(Debug, Deserialize)]
pub struct ClearRequest {
    user_id: Option<String>,
}

/// A catalog product on the wire. Prices are JSON numbers.
#[derive(Debug, Serialize)]
pub struct ProductBody {
    product_id: i64,
    title: String,
    #[serde(with = "rust_decimal::serde::float")]
    price: Decimal,
    category: String,
}

impl From<&Product> for ProductBody {
    fn from(product: &Product) -> Self {
        Self {
            product_id: product.id.as_i64(),
            title: product.title.clone(),
            price: product.unit_price.amount(),
            category: product.category.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProductsBody {
    products: Vec<ProductBody>,
}

#[derive(Debug, Serialize)]
pub struct CartItemBody {
    product_id: i64,
    title: String,
    #[serde(with = "rust_decimal::serde::float")]
    price: Decimal,
    category: String,
    quantity: u32,
}

impl From<&CartLine> for CartItemBody {
    fn from(line: &CartLine) -> Self {
        Self {
            product_id: line.product_id.as_i64(),
            title: line.title.clone(),
            price: line.unit_price.amount(),
            category: line.category.clone(),
            quantity: line.quantity,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CartBody {
    items: Vec<CartItemBody>,
    #[serde(with = "rust_decimal::serde::float")]
    total: Decimal,
    total_items: u64,
    count: u64,
}

#[derive(Debug, Serialize)]
pub struct StatusBody {
    status: &'static str,
}

// =============================================================================
// Handlers
// =============================================================================

fn require_user(user_id: Option<String>) -> Result<String, MockError> {
    user_id
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or(MockError::MissingUser)
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, MockError> {
    payload
        .map(|Json(inner)| inner)
        .map_err(|e| MockError::BadRequest(e.body_text()))
}

async fn health() -> &'static str {
    "ok"
}

async fn list_products(State(backend): State<MockBackend>) -> Json<ProductsBody> {
    Json(ProductsBody {
        products: backend.products().iter().map(ProductBody::from).collect(),
    })
}

#[instrument(skip(backend))]
async fn get_cart(
    State(backend): State<MockBackend>,
    Query(query): Query<UserQuery>,
) -> Result<Json<CartBody>, MockError> {
    let user_id = require_user(query.user_id)?;
    let lines = backend.cart(&user_id)?;

    let total: Decimal = lines.iter().map(|l| l.line_total().amount()).sum();
    let count: u64 = lines.iter().map(|l| u64::from(l.quantity)).sum();
    debug!(lines = lines.len(), count, "Serving cart");

    Ok(Json(CartBody {
        items: lines.iter().map(CartItemBody::from).collect(),
        total,
        total_items: count,
        count,
    }))
}

#[instrument(skip(backend, payload))]
async fn update_cart(
    State(backend): State<MockBackend>,
    payload: Result<Json<UpdateRequest>, JsonRejection>,
) -> Result<Json<StatusBody>, MockError> {
    let request = body(payload)?;
    let user_id = require_user(request.user_id)?;
    if request.quantity == 0 {
        return Err(MockError::BadRequest("quantity must be non-zero".to_string()));
    }

    backend.apply_delta(
        &user_id,
        NetDelta {
            product_id: ProductId::new(request.product_id),
            quantity: request.quantity,
        },
    )?;
    Ok(Json(StatusBody { status: "updated" }))
}

#[instrument(skip(backend, payload))]
async fn batch_update_cart(
    State(backend): State<MockBackend>,
    payload: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Json<StatusBody>, MockError> {
    let request = body(payload)?;
    let user_id = require_user(request.user_id)?;
    if request.items.is_empty() {
        return Err(MockError::BadRequest("items (list) required".to_string()));
    }

    let deltas: Vec<NetDelta> = request
        .items
        .iter()
        .map(|item| NetDelta {
            product_id: ProductId::new(item.product_id),
            quantity: item.quantity,
        })
        .collect();
    backend.apply_batch(&user_id, &deltas)?;
    Ok(Json(StatusBody { status: "updated" }))
}

#[instrument(skip(backend, payload))]
async fn clear_cart(
    State(backend): State<MockBackend>,
    payload: Result<Json<ClearRequest>, JsonRejection>,
) -> Result<Json<StatusBody>, MockError> {
    let user_id = require_user(body(payload)?.user_id)?;
    backend.clear(&user_id)?;
    Ok(Json(StatusBody { status: "cleared" }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::net::SocketAddr;

    use serde_json::{Value, json};

    use super::*;

    async fn start(backend: MockBackend) -> String {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let (addr, _server) = crate::spawn(addr, backend).await.unwrap();
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_get_cart_serializes_float_prices() {
        let backend = MockBackend::demo();
        backend.set_quantity("demo", ProductId::new(2), 2);
        let base = start(backend).await;

        let body: Value = reqwest::get(format!("{base}/api/cart?user_id=demo"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["count"], json!(2));
        assert_eq!(body["total_items"], json!(2));
        assert_eq!(body["total"], json!(29.98));
        assert_eq!(body["items"][0]["product_id"], json!(2));
        assert_eq!(body["items"][0]["price"], json!(14.99));
        assert_eq!(body["items"][0]["quantity"], json!(2));
    }

    #[tokio::test]
    async fn test_unknown_user_is_404_with_error_body() {
        let base = start(MockBackend::demo()).await;

        let response = reqwest::get(format!("{base}/api/cart?user_id=ghost"))
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 404);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], json!("user not found. Please login again."));
    }

    #[tokio::test]
    async fn test_update_below_zero_is_400() {
        let backend = MockBackend::demo();
        let base = start(backend.clone()).await;

        let response = reqwest::Client::new()
            .post(format!("{base}/api/cart/update"))
            .json(&json!({"user_id": "demo", "product_id": 1, "quantity": -1}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 400);
        assert_eq!(backend.quantity("demo", ProductId::new(1)), 0);
    }

    #[tokio::test]
    async fn test_malformed_body_is_400_with_error_body() {
        let base = start(MockBackend::demo()).await;

        let response = reqwest::Client::new()
            .post(format!("{base}/api/cart/update"))
            .header("content-type", "application/json")
            .body("{\"user_id\": \"demo\"")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 400);
        let body: Value = response.json().await.unwrap();
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_batch_and_clear() {
        let backend = MockBackend::demo();
        let base = start(backend.clone()).await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{base}/api/cart/batch"))
            .json(&json!({
                "user_id": "demo",
                "items": [{"product_id": 1, "quantity": 2}, {"product_id": 5, "quantity": 1}]
            }))
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());
        assert_eq!(backend.quantity("demo", ProductId::new(1)), 2);
        assert_eq!(backend.quantity("demo", ProductId::new(5)), 1);

        let response = client
            .post(format!("{base}/api/cart/clear"))
            .json(&json!({"user_id": "demo"}))
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());
        assert!(backend.cart("demo").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_products_listing() {
        let base = start(MockBackend::demo()).await;

        let body: Value = reqwest::get(format!("{base}/api/products"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["products"].as_array().unwrap().len(), 5);
        assert_eq!(body["products"][0]["title"], json!("Trail Running Shoes"));
    }
}
