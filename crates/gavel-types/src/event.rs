//! Real-time auction events and their wire envelope.
//!
//! The bidding engine and the expiry sweep emit [`AuctionEvent`]s into an
//! [`EventSink`]. The notification layer wraps them in a [`WireMessage`] and
//! serializes that to JSON for subscribers:
//!
//! ```text
//! {"type":"bidUpdate","data":{"auctionId":1,"auctionTitle":"...","bidAmount":"110", ...}}
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AuctionId, AuctionOutcome, Bid, BidId, EndReason, Result};

/// Payload for an accepted bid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidEvent {
    pub auction_id: AuctionId,
    pub auction_title: String,
    pub bid_id: BidId,
    pub bid_amount: Decimal,
    pub bidder_id: String,
    pub bid_timestamp: DateTime<Utc>,
}

impl BidEvent {
    #[must_use]
    pub fn from_bid(auction_title: &str, bid: &Bid) -> Self {
        Self {
            auction_id: bid.auction_id,
            auction_title: auction_title.to_string(),
            bid_id: bid.id,
            bid_amount: bid.amount,
            bidder_id: bid.bidder_id.clone(),
            bid_timestamp: bid.timestamp,
        }
    }
}

/// Payload for a completed auction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionClosedEvent {
    pub auction_id: AuctionId,
    pub auction_title: String,
    pub reason: EndReason,
    pub winner: Option<String>,
    pub winning_bid: Decimal,
    pub total_bids: usize,
    pub completed_time: DateTime<Utc>,
}

impl From<&AuctionOutcome> for AuctionClosedEvent {
    fn from(outcome: &AuctionOutcome) -> Self {
        Self {
            auction_id: outcome.auction_id,
            auction_title: outcome.title.clone(),
            reason: outcome.reason,
            winner: outcome.winner.clone(),
            winning_bid: outcome.winning_bid,
            total_bids: outcome.total_bids,
            completed_time: outcome.completed_time,
        }
    }
}

/// Everything the core publishes about an auction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuctionEvent {
    BidAccepted(BidEvent),
    AuctionClosed(AuctionClosedEvent),
}

impl AuctionEvent {
    /// The auction whose subscribers should receive this event.
    #[must_use]
    pub fn auction_id(&self) -> AuctionId {
        match self {
            Self::BidAccepted(e) => e.auction_id,
            Self::AuctionClosed(e) => e.auction_id,
        }
    }

    /// Serialize into the JSON frame sent to subscribers.
    pub fn to_wire_bytes(&self) -> Result<Vec<u8>> {
        let message = match self {
            Self::BidAccepted(e) => WireMessage::BidUpdate(e.clone()),
            Self::AuctionClosed(e) => WireMessage::AuctionClosed(e.clone()),
        };
        message.to_bytes()
    }
}

/// Frames pushed to subscriber connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum WireMessage {
    /// Sent once when a connection subscribes.
    Connected {
        #[serde(rename = "auctionId")]
        auction_id: AuctionId,
        message: String,
    },
    BidUpdate(BidEvent),
    AuctionClosed(AuctionClosedEvent),
}

impl WireMessage {
    #[must_use]
    pub fn connected(auction_id: AuctionId) -> Self {
        Self::Connected {
            auction_id,
            message: format!("Connected to auction {}", auction_id.0),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Receiver of core events. Implementations must return promptly: the
/// bidding engine calls `emit` while it holds the auction's lock, which is
/// what keeps per-auction event order identical to acceptance order.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: AuctionEvent);
}

/// A sink that discards everything, for components running without subscribers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: AuctionEvent) {}
}
