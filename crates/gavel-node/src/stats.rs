//! Point-in-time system figures.

use chrono::{DateTime, Utc};
use gavel_auction::AuctionStore;
use gavel_session::SessionRegistry;
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStats {
    pub active_auctions: usize,
    pub completed_auctions: usize,
    /// Sum of every accepted bid still held in memory.
    pub total_bid_volume: Decimal,
    pub active_sessions: usize,
}

impl SystemStats {
    #[must_use]
    pub fn collect(store: &AuctionStore, sessions: &SessionRegistry, now: DateTime<Utc>) -> Self {
        Self {
            active_auctions: store.active_count(now),
            completed_auctions: store.completed_count(),
            total_bid_volume: store.total_bid_volume(),
            active_sessions: sessions.active_count(now),
        }
    }
}
