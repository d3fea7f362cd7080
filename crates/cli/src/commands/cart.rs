//! Cart commands.
//!
//! # Environment Variables
//!
//! - `CARTSYNC_API_BASE_URL` - Commerce API base URL (required)
//! - `CARTSYNC_DEBOUNCE_MS`, `CARTSYNC_BATCH_FLUSH` - Coalescer tuning

use cartsync_client::{
    ApiError, CartError, CartNotice, CartSession, CartStatus, CartStore, CartSyncConfig,
    HttpCommerceClient, NoticeReceiver,
};
use cartsync_core::{Price, Product, ProductId, UserId, UserIdError};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{info, warn};

/// Errors that can occur while running a cart command.
#[derive(Debug, Error)]
pub enum CartCommandError {
    /// The `--user` value is not a valid user id.
    #[error("Invalid user id: {0}")]
    InvalidUser(#[from] UserIdError),

    /// The HTTP client could not be built.
    #[error("API client error: {0}")]
    Api(#[from] ApiError),

    /// A cart operation failed.
    #[error("{0}")]
    Cart(#[from] CartError),

    /// The product is in neither the cart nor the catalog, and no price was
    /// given.
    #[error("Product {0} is not in the cart or catalog; pass --price (and --title) to add it")]
    UnknownProduct(ProductId),

    /// The backend no longer recognizes the user.
    #[error("Session expired for user {0}. Please login again.")]
    ReauthRequired(UserId),

    /// Some edits were not applied.
    #[error("{0} cart update(s) failed; cart re-synced from server")]
    FlushFailed(usize),
}

/// Arguments of `cartsync edit`.
#[derive(Debug)]
pub struct Edit {
    pub product_id: i64,
    pub delta: i64,
    pub times: u32,
    pub title: Option<String>,
    pub price: Option<Decimal>,
    pub category: Option<String>,
}

async fn start_session(
    config: &CartSyncConfig,
    user: &str,
) -> Result<(CartSession, NoticeReceiver), CartCommandError> {
    let user_id = UserId::parse(user)?;
    let api = HttpCommerceClient::new(&config.api)?;
    info!(base_url = %api.base_url(), user_id = %user_id, "Connecting to commerce API");

    CartSession::start(api, user_id.clone(), config.sync)
        .await
        .map_err(|e| {
            if e.requires_reauth() {
                CartCommandError::ReauthRequired(user_id)
            } else {
                CartCommandError::Cart(e)
            }
        })
}

/// Fetch and print the cart.
///
/// # Errors
///
/// Returns an error if the user id is invalid or the cart cannot be fetched.
pub async fn show(config: &CartSyncConfig, user: &str) -> Result<(), CartCommandError> {
    let (session, _notices) = start_session(config, user).await?;
    print_cart(session.store());
    Ok(())
}

/// Record `times` edits of `delta` through the coalescer, flush, and print
/// the reconciled cart.
///
/// # Errors
///
/// Returns an error if the product cannot be resolved, the session cannot
/// start, or any flush failed.
pub async fn edit(
    config: &CartSyncConfig,
    user: &str,
    edit: Edit,
) -> Result<(), CartCommandError> {
    let (session, mut notices) = start_session(config, user).await?;
    let product = match resolve_product(session.store(), &edit) {
        Err(CartCommandError::UnknownProduct(id)) => {
            catalog_product(session.coalescer().api(), id).await?
        }
        resolved => resolved?,
    };

    for _ in 0..edit.times {
        session.record(edit.delta, &product);
    }
    info!(
        product_id = %product.id,
        quantity = session.quantity_of(product.id),
        pending = ?session.coalescer().pending_net(product.id),
        "Edits recorded"
    );

    session.flush_all().await;
    let failures = drain_notices(&mut notices, session.user_id())?;
    print_cart(session.store());
    session.close().await;

    if failures > 0 {
        return Err(CartCommandError::FlushFailed(failures));
    }
    Ok(())
}

/// Empty the cart.
///
/// # Errors
///
/// Returns an error if the session cannot start or the backend refuses.
pub async fn clear(config: &CartSyncConfig, user: &str) -> Result<(), CartCommandError> {
    let (session, _notices) = start_session(config, user).await?;
    let before = session.store().aggregate_count();
    session.clear().await?;
    info!(removed = before, "Cart cleared");
    print_cart(session.store());
    Ok(())
}

/// The product to edit: taken from the flags when a price is given,
/// otherwise from the existing cart line. `UnknownProduct` means the caller
/// should try the catalog.
fn resolve_product(store: &CartStore, edit: &Edit) -> Result<Product, CartCommandError> {
    let id = ProductId::new(edit.product_id);
    let existing = store.line(id).map(|line| line.product());

    match (edit.price, existing) {
        (Some(price), existing) => Ok(Product {
            id,
            title: edit
                .title
                .clone()
                .or_else(|| existing.as_ref().map(|p| p.title.clone()))
                .unwrap_or_else(|| format!("Product {id}")),
            unit_price: Price::new(price),
            category: edit
                .category
                .clone()
                .or_else(|| existing.map(|p| p.category))
                .unwrap_or_default(),
        }),
        (None, Some(product)) => Ok(product),
        (None, None) => Err(CartCommandError::UnknownProduct(id)),
    }
}

/// Look `id` up in the backend's product catalog.
async fn catalog_product(
    api: &HttpCommerceClient,
    id: ProductId,
) -> Result<Product, CartCommandError> {
    api.fetch_products()
        .await?
        .into_iter()
        .find(|p| p.id == id)
        .ok_or(CartCommandError::UnknownProduct(id))
}

/// Log every pending notice and count flush failures.
fn drain_notices(
    notices: &mut NoticeReceiver,
    user_id: &UserId,
) -> Result<usize, CartCommandError> {
    let mut failures = 0;
    while let Ok(notice) = notices.try_recv() {
        warn!(message = notice.message(), "Cart sync problem");
        if notice.reauth_required() {
            return Err(CartCommandError::ReauthRequired(user_id.clone()));
        }
        if matches!(notice, CartNotice::FlushFailed { .. }) {
            failures += 1;
        }
    }
    Ok(failures)
}

#[allow(clippy::print_stdout)]
fn print_cart(store: &CartStore) {
    if let CartStatus::Unknown { reason } = store.status() {
        println!("(cart may be stale: {reason})");
    }

    let lines = store.lines();
    if lines.is_empty() {
        println!("Cart is empty");
        return;
    }

    for line in &lines {
        println!(
            "{:>6}  {:<32} {:>4} x {:>10} = {:>10}",
            line.product_id.to_string(),
            line.title,
            line.quantity,
            line.unit_price.to_string(),
            line.line_total().to_string(),
        );
    }
    println!(
        "{} item(s), total {}",
        store.aggregate_count(),
        store.aggregate_total()
    );
}
