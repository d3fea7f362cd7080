//! User-facing notifications emitted by the coalescer.
//!
//! Flush and reconciliation errors never propagate to the code that recorded
//! the edit. They are sent here instead, for the UI to show as a transient
//! toast.

use cartsync_core::NetDelta;
use tokio::sync::mpsc;

/// Receiving half of the notice channel.
pub type NoticeReceiver = mpsc::UnboundedReceiver<CartNotice>;

/// A notification about background cart synchronization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartNotice {
    /// A flush was rejected or failed in transit. Sent once per failed server
    /// call; the projection is re-synchronized regardless.
    FlushFailed {
        /// The net changes that call carried.
        deltas: Vec<NetDelta>,
        /// Human-readable failure message.
        message: String,
        /// The backend no longer recognizes the user.
        reauth_required: bool,
    },
    /// The authoritative cart could not be fetched; the displayed cart may be
    /// stale until the next successful fetch.
    SyncFailed {
        /// Human-readable failure message.
        message: String,
        /// The backend no longer recognizes the user.
        reauth_required: bool,
    },
}

impl CartNotice {
    /// Text suitable for a toast.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::FlushFailed { message, .. } | Self::SyncFailed { message, .. } => message,
        }
    }

    /// Whether the user must log in again.
    #[must_use]
    pub const fn reauth_required(&self) -> bool {
        match self {
            Self::FlushFailed {
                reauth_required, ..
            }
            | Self::SyncFailed {
                reauth_required, ..
            } => *reauth_required,
        }
    }
}
