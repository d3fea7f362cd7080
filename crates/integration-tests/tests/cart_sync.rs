//! End-to-end cart synchronization tests.
//!
//! These run the HTTP client, coalescer and store against the mock backend in
//! real time, with a short debounce window.

#![allow(clippy::unwrap_used)]

use cartsync_client::{CartNotice, CartStatus, CommerceApi, SyncSettings};
use cartsync_core::{NetDelta, Price, ProductId};
use cartsync_integration_tests::{
    SETTLE, TEST_DEBOUNCE, TestContext, demo_product, next_notice, ten_dollar_product,
    test_settings,
};

// =============================================================================
// Coalescing
// =============================================================================

#[tokio::test]
async fn test_three_clicks_become_one_update() {
    let ctx = TestContext::new().await;
    let tee = ten_dollar_product(&ctx.backend);
    let (session, _notices) = ctx.session(test_settings()).await.unwrap();

    for _ in 0..3 {
        session.record(1, &tee);
    }
    assert_eq!(session.quantity_of(tee.id), 3);
    assert_eq!(session.store().aggregate_total(), Price::from_cents(3000));

    tokio::time::sleep(SETTLE).await;

    assert_eq!(ctx.backend.counters().updates, 1);
    assert_eq!(ctx.server_quantity(tee.id), 3);
    assert_eq!(session.quantity_of(tee.id), 3);
    assert_eq!(session.store().aggregate_total(), Price::from_cents(3000));
    assert_eq!(session.store().status(), CartStatus::Ready);
}

#[tokio::test]
async fn test_add_then_remove_never_reaches_server() {
    let ctx = TestContext::new().await;
    let tee = ten_dollar_product(&ctx.backend);
    let (session, _notices) = ctx.session(test_settings()).await.unwrap();
    let fetches_after_start = ctx.backend.counters().fetches;

    session.record(1, &tee);
    session.record(-1, &tee);
    assert!(session.store().line(tee.id).is_none());

    tokio::time::sleep(SETTLE).await;

    let counters = ctx.backend.counters();
    assert_eq!(counters.updates, 0);
    assert_eq!(counters.batches, 0);
    assert_eq!(counters.fetches, fetches_after_start);
    assert!(session.store().is_empty());
}

#[tokio::test]
async fn test_products_flush_independently() {
    let ctx = TestContext::new().await;
    let socks = demo_product(&ctx.backend, 2);
    let lamp = demo_product(&ctx.backend, 5);
    let (session, _notices) = ctx.session(test_settings()).await.unwrap();

    session.record(2, &socks);
    session.record(1, &lamp);
    session.record(-1, &socks);

    tokio::time::sleep(SETTLE).await;

    assert_eq!(ctx.backend.counters().updates, 2);
    assert_eq!(ctx.server_quantity(socks.id), 1);
    assert_eq!(ctx.server_quantity(lamp.id), 1);
    assert_eq!(session.store().aggregate_count(), 2);
}

#[tokio::test]
async fn test_batch_flush_uses_one_call() {
    let ctx = TestContext::new().await;
    let socks = demo_product(&ctx.backend, 2);
    let lamp = demo_product(&ctx.backend, 5);
    let settings = SyncSettings {
        debounce: TEST_DEBOUNCE,
        batch_flush: true,
    };
    let (session, _notices) = ctx.session(settings).await.unwrap();

    session.record(3, &socks);
    session.record(1, &lamp);
    session.flush_all().await;
    tokio::time::sleep(SETTLE).await;

    let counters = ctx.backend.counters();
    assert_eq!(counters.updates, 0);
    assert_eq!(counters.batches, 1);
    assert_eq!(ctx.server_quantity(socks.id), 3);
    assert_eq!(ctx.server_quantity(lamp.id), 1);
}

// =============================================================================
// Failures and reconciliation
// =============================================================================

#[tokio::test]
async fn test_failed_flush_notifies_and_shows_server_quantity() {
    let ctx = TestContext::new().await;
    let tee = ten_dollar_product(&ctx.backend);
    ctx.backend.set_quantity(ctx.user.as_str(), tee.id, 2);
    let (session, mut notices) = ctx.session(test_settings()).await.unwrap();
    assert_eq!(session.quantity_of(tee.id), 2);

    ctx.backend.fail_next_updates(1);
    session.record(1, &tee);
    assert_eq!(session.quantity_of(tee.id), 3);

    let notice = next_notice(&mut notices).await;
    match notice {
        CartNotice::FlushFailed { deltas, .. } => {
            assert_eq!(
                deltas,
                vec![NetDelta {
                    product_id: tee.id,
                    quantity: 1
                }]
            );
        }
        CartNotice::SyncFailed { .. } => panic!("expected a flush failure"),
    }

    tokio::time::sleep(SETTLE).await;
    assert_eq!(session.quantity_of(tee.id), 2);
    assert!(notices.try_recv().is_err());
}

#[tokio::test]
async fn test_decrement_below_zero_is_rejected_and_reverted() {
    let ctx = TestContext::new().await;
    let socks = demo_product(&ctx.backend, 2);
    ctx.backend.set_quantity(ctx.user.as_str(), socks.id, 1);
    let (session, mut notices) = ctx.session(test_settings()).await.unwrap();

    // Another device removed the socks after our fetch
    ctx.backend.set_quantity(ctx.user.as_str(), socks.id, 0);
    session.record(-1, &socks);

    let notice = next_notice(&mut notices).await;
    assert!(matches!(notice, CartNotice::FlushFailed { .. }));
    assert!(notice.message().contains("below zero"));

    tokio::time::sleep(SETTLE).await;
    assert_eq!(session.quantity_of(socks.id), 0);
}

#[tokio::test]
async fn test_unknown_user_requires_reauth() {
    let ctx = TestContext::new().await;
    let tee = ten_dollar_product(&ctx.backend);
    let (session, mut notices) = ctx.session(test_settings()).await.unwrap();

    ctx.backend.remove_user(ctx.user.as_str());
    session.record(1, &tee);

    let notice = next_notice(&mut notices).await;
    assert!(notice.reauth_required());
    assert_eq!(notice.message(), "Session expired: user not found. Please login again.");

    let sync = next_notice(&mut notices).await;
    assert!(matches!(sync, CartNotice::SyncFailed { .. }));
    assert!(matches!(
        session.store().status(),
        CartStatus::Unknown { .. }
    ));
}

#[tokio::test]
async fn test_start_for_unknown_user_fails() {
    let ctx = TestContext::new().await;
    ctx.backend.remove_user(ctx.user.as_str());

    let err = ctx.session(test_settings()).await.unwrap_err();
    assert!(err.requires_reauth());
}

#[tokio::test]
async fn test_two_devices_converge() {
    let ctx = TestContext::new().await;
    let bottle = demo_product(&ctx.backend, 3);
    let (phone, _phone_notices) = ctx.session(test_settings()).await.unwrap();
    let (laptop, _laptop_notices) = ctx.session(test_settings()).await.unwrap();

    phone.record(2, &bottle);
    laptop.record(1, &bottle);
    tokio::time::sleep(SETTLE).await;

    phone.refresh().await.unwrap();
    laptop.refresh().await.unwrap();
    assert_eq!(ctx.server_quantity(bottle.id), 3);
    assert_eq!(phone.quantity_of(bottle.id), 3);
    assert_eq!(laptop.quantity_of(bottle.id), 3);
}

// =============================================================================
// Clear and logout
// =============================================================================

#[tokio::test]
async fn test_clear_empties_server_and_projection() {
    let ctx = TestContext::new().await;
    ctx.backend.set_quantity(ctx.user.as_str(), ProductId::new(1), 2);
    ctx.backend.set_quantity(ctx.user.as_str(), ProductId::new(4), 1);
    let (session, _notices) = ctx.session(test_settings()).await.unwrap();
    assert_eq!(session.store().aggregate_count(), 3);

    session.record(1, &demo_product(&ctx.backend, 5));
    session.clear().await.unwrap();
    tokio::time::sleep(SETTLE).await;

    assert!(session.store().is_empty());
    assert!(ctx.backend.cart(ctx.user.as_str()).unwrap().is_empty());
    assert_eq!(ctx.backend.counters().updates, 0);
}

#[tokio::test]
async fn test_close_flushes_pending_edits() {
    let ctx = TestContext::new().await;
    let shoes = demo_product(&ctx.backend, 1);
    let settings = SyncSettings::with_debounce(std::time::Duration::from_secs(5));
    let (session, _notices) = ctx.session(settings).await.unwrap();

    session.record(1, &shoes);
    session.close().await;

    assert_eq!(ctx.server_quantity(shoes.id), 1);
    assert!(session.store().is_empty());
    assert_eq!(session.store().status(), CartStatus::Loading);
}

// =============================================================================
// HTTP client
// =============================================================================

#[tokio::test]
async fn test_http_fetch_normalizes_backend_payload() {
    let ctx = TestContext::new().await;
    ctx.backend.set_quantity(ctx.user.as_str(), ProductId::new(2), 3);

    let snapshot = ctx.client().fetch_cart(&ctx.user).await.unwrap();

    assert_eq!(snapshot.count, 3);
    assert_eq!(snapshot.total, Price::from_cents(4497));
    assert_eq!(snapshot.lines[0].title, "Merino Wool Socks");
    assert_eq!(snapshot.lines[0].category, "apparel");
}

#[tokio::test]
async fn test_http_fetch_products_reads_catalog() {
    let ctx = TestContext::new().await;
    let tee = ten_dollar_product(&ctx.backend);

    let products = ctx.client().fetch_products().await.unwrap();

    assert_eq!(products, ctx.backend.products());
    assert!(products.contains(&tee));
}

#[tokio::test]
async fn test_large_edit_is_rejected_without_panicking() {
    let ctx = TestContext::new().await;
    let socks = demo_product(&ctx.backend, 2);
    let (session, mut notices) = ctx.session(test_settings()).await.unwrap();

    session.record(5_000_000_000_000_000_000, &socks);
    session.record(5_000_000_000_000_000_000, &socks);
    assert_eq!(session.quantity_of(socks.id), u32::MAX);

    let notice = next_notice(&mut notices).await;
    assert!(matches!(notice, CartNotice::FlushFailed { .. }));
    tokio::time::sleep(SETTLE).await;
    assert_eq!(session.quantity_of(socks.id), 0);
    assert_eq!(ctx.server_quantity(socks.id), 0);
}
