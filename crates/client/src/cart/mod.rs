//! Cart projection and background synchronization.
//!
//! - [`CartStore`] - shared, synchronously readable projection of the cart
//! - [`CartCoalescer`] - per-product debounce, net-delta flushes, reconciliation
//! - [`CartNotice`] - background failures surfaced to the UI

mod coalescer;
mod notice;
mod store;

pub use coalescer::CartCoalescer;
pub use notice::{CartNotice, NoticeReceiver};
pub use store::{CartStatus, CartStore};
