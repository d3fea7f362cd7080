//! JSON/HTTP implementation of [`CommerceApi`] using `reqwest`.

use std::sync::Arc;

use cartsync_core::{CartSnapshot, NetDelta, Product, ProductId, UserId};
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};
use url::Url;
use uuid::Uuid;

use super::wire::{
    CartBatchBody, CartDeltaBody, CartResponse, ErrorBody, UserBody, products_from_payload,
};
use super::{ApiError, CommerceApi};
use crate::config::ApiConfig;

/// Header carrying a per-request correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const PRODUCTS_PATH: &str = "api/products";
const CART_PATH: &str = "api/cart";
const CART_UPDATE_PATH: &str = "api/cart/update";
const CART_BATCH_PATH: &str = "api/cart/batch";
const CART_CLEAR_PATH: &str = "api/cart/clear";

/// Client for the commerce API's cart endpoints.
///
/// Cheaply cloneable; clones share one connection pool.
#[derive(Clone)]
pub struct HttpCommerceClient {
    inner: Arc<HttpCommerceClientInner>,
}

struct HttpCommerceClientInner {
    client: reqwest::Client,
    base_url: Url,
    token: Option<SecretString>,
}

impl std::fmt::Debug for HttpCommerceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCommerceClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("token", &self.inner.token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl HttpCommerceClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(HttpCommerceClientInner {
                client,
                base_url: config.base_url.clone(),
                token: config.token.clone(),
            }),
        })
    }

    /// The base URL requests are resolved against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Fetch the product catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body is not JSON.
    #[instrument(skip(self))]
    pub async fn fetch_products(&self) -> Result<Vec<Product>, ApiError> {
        let payload: serde_json::Value = self.send_json(self.endpoint(PRODUCTS_PATH)?).await?;
        let products = products_from_payload(&payload);
        debug!(products = products.len(), "Fetched product catalog");
        Ok(products)
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.inner
            .base_url
            .join(path)
            .map_err(|e| ApiError::InvalidPayload(format!("bad endpoint {path}: {e}")))
    }

    /// Send a request and return the raw body of a successful response.
    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<String, ApiError> {
        let request_id = Uuid::new_v4().to_string();

        let mut request = self
            .inner
            .client
            .request(method.clone(), url.clone())
            .header(REQUEST_ID_HEADER, &request_id);
        if let Some(token) = &self.inner.token {
            request = request.bearer_auth(token.expose_secret());
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(ApiError::from_transport)?;
        let status = response.status();
        let response_text = response.text().await.map_err(ApiError::from_transport)?;

        if status.is_success() {
            debug!(%method, path = %url.path(), %status, request_id = %request_id, "Commerce API call succeeded");
            return Ok(response_text);
        }

        let message = serde_json::from_str::<ErrorBody>(&response_text)
            .ok()
            .and_then(ErrorBody::into_message)
            .unwrap_or_else(|| {
                let snippet: String = response_text.chars().take(200).collect();
                if snippet.trim().is_empty() {
                    status.canonical_reason().unwrap_or("request failed").to_string()
                } else {
                    snippet
                }
            });

        warn!(
            %method,
            path = %url.path(),
            %status,
            request_id = %request_id,
            error = %message,
            "Commerce API returned non-success status"
        );

        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::SessionNotFound(message));
        }

        Err(ApiError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        let text = self.send::<()>(Method::GET, url, None).await?;
        serde_json::from_str(&text).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %text.chars().take(500).collect::<String>(),
                "Failed to parse commerce API response"
            );
            ApiError::Parse(e)
        })
    }
}

impl CommerceApi for HttpCommerceClient {
    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn fetch_cart(&self, user_id: &UserId) -> Result<CartSnapshot, ApiError> {
        let mut url = self.endpoint(CART_PATH)?;
        url.query_pairs_mut()
            .append_pair("user_id", user_id.as_str());

        let response: CartResponse = self.send_json(url).await?;
        let snapshot = response.into_snapshot();
        debug!(
            lines = snapshot.lines.len(),
            count = snapshot.count,
            "Fetched cart"
        );
        Ok(snapshot)
    }

    #[instrument(skip(self), fields(user_id = %user_id, product_id = %product_id))]
    async fn submit_cart_delta(
        &self,
        user_id: &UserId,
        product_id: ProductId,
        net_quantity: i64,
    ) -> Result<(), ApiError> {
        if net_quantity == 0 {
            return Err(ApiError::InvalidPayload(
                "net quantity must be non-zero".to_string(),
            ));
        }

        let body = CartDeltaBody {
            user_id: user_id.as_str(),
            product_id: product_id.as_i64(),
            quantity: net_quantity,
        };
        self.send(Method::POST, self.endpoint(CART_UPDATE_PATH)?, Some(&body))
            .await?;
        Ok(())
    }

    #[instrument(skip(self, deltas), fields(user_id = %user_id, items = deltas.len()))]
    async fn submit_cart_delta_batch(
        &self,
        user_id: &UserId,
        deltas: &[NetDelta],
    ) -> Result<(), ApiError> {
        if deltas.is_empty() {
            return Err(ApiError::InvalidPayload("empty batch".to_string()));
        }

        let body = CartBatchBody::new(user_id, deltas);
        self.send(Method::POST, self.endpoint(CART_BATCH_PATH)?, Some(&body))
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn clear_cart(&self, user_id: &UserId) -> Result<(), ApiError> {
        let body = UserBody {
            user_id: user_id.as_str(),
        };
        self.send(Method::POST, self.endpoint(CART_CLEAR_PATH)?, Some(&body))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_keeps_base_path() {
        let config = ApiConfig::new("https://shop.example.com/store").unwrap();
        let client = HttpCommerceClient::new(&config).unwrap();
        assert_eq!(
            client.endpoint(CART_UPDATE_PATH).unwrap().as_str(),
            "https://shop.example.com/store/api/cart/update"
        );
    }

    #[test]
    fn test_debug_redacts_token() {
        let mut config = ApiConfig::new("http://localhost:5000").unwrap();
        config.token = Some(SecretString::from("tok_live_abc"));
        let client = HttpCommerceClient::new(&config).unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("tok_live_abc"));
    }

    #[tokio::test]
    async fn test_zero_delta_is_rejected_locally() {
        let config = ApiConfig::new("http://localhost:5000").unwrap();
        let client = HttpCommerceClient::new(&config).unwrap();
        let user = UserId::parse("u1").unwrap();
        let result = client.submit_cart_delta(&user, ProductId::new(1), 0).await;
        assert!(matches!(result, Err(ApiError::InvalidPayload(_))));
    }
}
