//! Auction and bid entities.
//!
//! An [`Auction`] owns its append-only bid log. Every mutation goes through
//! methods on this type so that the pricing invariants hold no matter which
//! component drives them:
//!
//! - `current_highest_bid >= starting_price`
//! - `current_highest_bid` is the amount of the last accepted bid, or the
//!   starting price when there are none
//! - exactly one bid carries `winning = true` once any bid exists, and it is
//!   the last one
//! - bid ids are `1, 2, 3, ...` with no gaps
//! - `ACTIVE -> COMPLETED` happens at most once

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AuctionId, BidId, GavelError, Result};

/// Lifecycle status of an auction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuctionStatus {
    Active,
    Completed,
}

impl fmt::Display for AuctionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Completed => write!(f, "COMPLETED"),
        }
    }
}

/// Why an auction was completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EndReason {
    /// End time passed; closed by the expiry sweep.
    Expired,
    /// Closed early by an operator.
    ManualClose,
    Cancelled,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expired => write!(f, "EXPIRED"),
            Self::ManualClose => write!(f, "MANUAL_CLOSE"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// One accepted bid. Immutable apart from the `winning` flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bid {
    pub id: BidId,
    pub auction_id: AuctionId,
    pub bidder_id: String,
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
    pub winning: bool,
}

/// Terminal facts recorded when an auction completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionOutcome {
    pub auction_id: AuctionId,
    pub title: String,
    pub reason: EndReason,
    pub completed_time: DateTime<Utc>,
    /// `None` when the auction ended without bids.
    pub winner: Option<String>,
    pub winning_bid: Decimal,
    pub total_bids: usize,
}

impl AuctionOutcome {
    #[must_use]
    pub fn has_winner(&self) -> bool {
        self.winner.is_some()
    }
}

/// The full auction record, including its bid log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Auction {
    pub id: AuctionId,
    pub title: String,
    pub description: String,
    pub starting_price: Decimal,
    pub current_highest_bid: Decimal,
    pub current_highest_bidder: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: AuctionStatus,
    pub completed_time: Option<DateTime<Utc>>,
    pub end_reason: Option<EndReason>,
    /// Ordered by bid id; only ever appended to.
    bids: Vec<Bid>,
    /// Last issued bid id. Incremented before use, so the first bid gets `1`.
    last_bid_id: BidId,
}

impl Auction {
    /// Create a new ACTIVE auction with no bids.
    #[must_use]
    pub fn new(
        id: AuctionId,
        title: impl Into<String>,
        description: impl Into<String>,
        starting_price: Decimal,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            description: description.into(),
            starting_price,
            current_highest_bid: starting_price,
            current_highest_bidder: None,
            start_time,
            end_time,
            status: AuctionStatus::Active,
            completed_time: None,
            end_reason: None,
            bids: Vec::new(),
            last_bid_id: BidId(0),
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == AuctionStatus::Active
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == AuctionStatus::Completed
    }

    /// ACTIVE and before its end time.
    #[must_use]
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && now < self.end_time
    }

    /// ACTIVE but past its end time, waiting for the expiry sweep.
    #[must_use]
    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && now >= self.end_time
    }

    /// Guard a bid attempt against the auction's state and clock.
    ///
    /// # Errors
    /// - [`GavelError::AuctionNotActive`] once completed
    /// - [`GavelError::AuctionExpired`] if `now` is at or past `end_time`
    pub fn ensure_open(&self, now: DateTime<Utc>) -> Result<()> {
        if !self.is_active() {
            return Err(GavelError::AuctionNotActive(self.id));
        }
        if now >= self.end_time {
            return Err(GavelError::AuctionExpired {
                auction_id: self.id,
                end_time: self.end_time,
            });
        }
        Ok(())
    }

    /// Append a bid and make it the winning one.
    ///
    /// Callers must have already checked the amount; this only maintains the
    /// log, the counter, and the winning flag.
    pub fn record_bid(
        &mut self,
        bidder_id: impl Into<String>,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> &Bid {
        self.last_bid_id = self.last_bid_id.next();
        let bidder_id = bidder_id.into();

        if let Some(previous) = self.bids.last_mut() {
            previous.winning = false;
        }

        self.current_highest_bid = amount;
        self.current_highest_bidder = Some(bidder_id.clone());
        self.bids.push(Bid {
            id: self.last_bid_id,
            auction_id: self.id,
            bidder_id,
            amount,
            timestamp: now,
            winning: true,
        });

        &self.bids[self.bids.len() - 1]
    }

    /// Transition ACTIVE -> COMPLETED.
    ///
    /// # Errors
    /// Returns [`GavelError::AuctionAlreadyCompleted`] if this auction was
    /// already completed; the recorded outcome is left untouched.
    pub fn complete(&mut self, reason: EndReason, now: DateTime<Utc>) -> Result<AuctionOutcome> {
        if self.is_completed() {
            return Err(GavelError::AuctionAlreadyCompleted(self.id));
        }
        self.status = AuctionStatus::Completed;
        self.completed_time = Some(now);
        self.end_reason = Some(reason);
        Ok(self.outcome_at(now, reason))
    }

    /// The recorded outcome, if this auction has completed.
    #[must_use]
    pub fn outcome(&self) -> Option<AuctionOutcome> {
        match (self.completed_time, self.end_reason) {
            (Some(at), Some(reason)) => Some(self.outcome_at(at, reason)),
            _ => None,
        }
    }

    fn outcome_at(&self, completed_time: DateTime<Utc>, reason: EndReason) -> AuctionOutcome {
        AuctionOutcome {
            auction_id: self.id,
            title: self.title.clone(),
            reason,
            completed_time,
            winner: self.current_highest_bidder.clone(),
            winning_bid: self.current_highest_bid,
            total_bids: self.bids.len(),
        }
    }

    /// All bids in acceptance order.
    #[must_use]
    pub fn bids(&self) -> &[Bid] {
        &self.bids
    }

    #[must_use]
    pub fn bid_count(&self) -> usize {
        self.bids.len()
    }

    /// The bid currently flagged as winning.
    #[must_use]
    pub fn winning_bid(&self) -> Option<&Bid> {
        self.bids.last().filter(|b| b.winning)
    }

    /// Sum of every accepted bid amount.
    #[must_use]
    pub fn bid_volume(&self) -> Decimal {
        self.bids.iter().map(|b| b.amount).sum()
    }

    /// A read-only view without the bid log.
    #[must_use]
    pub fn snapshot(&self) -> AuctionSnapshot {
        AuctionSnapshot {
            id: self.id,
            title: self.title.clone(),
            description: self.description.clone(),
            starting_price: self.starting_price,
            current_highest_bid: self.current_highest_bid,
            current_highest_bidder: self.current_highest_bidder.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            status: self.status,
            completed_time: self.completed_time,
            end_reason: self.end_reason,
            bid_count: self.bids.len(),
        }
    }
}

/// Point-in-time copy of an auction's header fields.
///
/// Returned by every listing and lookup; never half-updated because it is
/// copied while the auction's lock is held.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionSnapshot {
    pub id: AuctionId,
    pub title: String,
    pub description: String,
    pub starting_price: Decimal,
    pub current_highest_bid: Decimal,
    pub current_highest_bidder: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: AuctionStatus,
    pub completed_time: Option<DateTime<Utc>>,
    pub end_reason: Option<EndReason>,
    pub bid_count: usize,
}

impl AuctionSnapshot {
    #[must_use]
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.status == AuctionStatus::Active && now < self.end_time
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Auction {
    /// An ACTIVE auction starting at `start` and lasting one hour.
    pub fn dummy(id: u64, starting_price: Decimal, start: DateTime<Utc>) -> Self {
        Self::new(
            AuctionId(id),
            format!("Lot {id}"),
            "test lot",
            starting_price,
            start,
            start + chrono::Duration::hours(1),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn new_auction_starts_at_starting_price() {
        let a = Auction::dummy(1, Decimal::new(100, 0), t0());
        assert_eq!(a.current_highest_bid, Decimal::new(100, 0));
        assert!(a.current_highest_bidder.is_none());
        assert!(a.is_active());
        assert!(a.winning_bid().is_none());
        assert_eq!(a.bid_count(), 0);
    }

    #[test]
    fn bid_ids_start_at_one_without_gaps() {
        let mut a = Auction::dummy(1, Decimal::new(100, 0), t0());
        let first = a.record_bid("alice", Decimal::new(110, 0), t0()).id;
        let second = a.record_bid("bob", Decimal::new(120, 0), t0()).id;
        let third = a.record_bid("alice", Decimal::new(130, 0), t0()).id;
        assert_eq!((first, second, third), (BidId(1), BidId(2), BidId(3)));
    }

    #[test]
    fn only_last_bid_is_winning() {
        let mut a = Auction::dummy(1, Decimal::new(100, 0), t0());
        a.record_bid("alice", Decimal::new(110, 0), t0());
        a.record_bid("bob", Decimal::new(116, 0), t0());

        let winners: Vec<_> = a.bids().iter().filter(|b| b.winning).collect();
        assert_eq!(winners.len(), 1);
        assert_eq!(winners[0].bidder_id, "bob");
        assert_eq!(winners[0].amount, a.current_highest_bid);
        assert_eq!(a.current_highest_bidder.as_deref(), Some("bob"));
    }

    #[test]
    fn ensure_open_rejects_expired_and_completed() {
        let mut a = Auction::dummy(1, Decimal::new(100, 0), t0());
        assert!(a.ensure_open(t0()).is_ok());

        let late = a.end_time;
        assert!(matches!(
            a.ensure_open(late),
            Err(GavelError::AuctionExpired { .. })
        ));
        assert!(a.is_overdue_at(late));

        a.complete(EndReason::ManualClose, t0()).unwrap();
        assert!(matches!(
            a.ensure_open(t0()),
            Err(GavelError::AuctionNotActive(_))
        ));
    }

    #[test]
    fn complete_records_outcome_once() {
        let mut a = Auction::dummy(1, Decimal::new(100, 0), t0());
        a.record_bid("alice", Decimal::new(150, 0), t0());

        let outcome = a.complete(EndReason::Expired, t0()).unwrap();
        assert_eq!(outcome.winner.as_deref(), Some("alice"));
        assert_eq!(outcome.winning_bid, Decimal::new(150, 0));
        assert_eq!(outcome.total_bids, 1);

        let later = t0() + chrono::Duration::minutes(5);
        let err = a.complete(EndReason::ManualClose, later).unwrap_err();
        assert!(matches!(err, GavelError::AuctionAlreadyCompleted(_)));
        assert_eq!(a.completed_time, Some(t0()));
        assert_eq!(a.end_reason, Some(EndReason::Expired));
        assert_eq!(a.outcome(), Some(outcome));
    }

    #[test]
    fn outcome_without_bids_has_no_winner() {
        let mut a = Auction::dummy(1, Decimal::new(100, 0), t0());
        let outcome = a.complete(EndReason::Expired, t0()).unwrap();
        assert!(!outcome.has_winner());
        assert_eq!(outcome.winning_bid, Decimal::new(100, 0));
    }

    #[test]
    fn snapshot_copies_header_and_count() {
        let mut a = Auction::dummy(4, Decimal::new(10, 0), t0());
        a.record_bid("carol", Decimal::new(20, 0), t0());
        let snap = a.snapshot();
        assert_eq!(snap.id, AuctionId(4));
        assert_eq!(snap.bid_count, 1);
        assert_eq!(snap.current_highest_bid, Decimal::new(20, 0));
        assert!(snap.is_open_at(t0()));
        assert_eq!(a.bid_volume(), Decimal::new(20, 0));
    }

    #[test]
    fn status_and_reason_display() {
        assert_eq!(AuctionStatus::Completed.to_string(), "COMPLETED");
        assert_eq!(EndReason::ManualClose.to_string(), "MANUAL_CLOSE");
        let json = serde_json::to_string(&EndReason::Expired).unwrap();
        assert_eq!(json, "\"EXPIRED\"");
    }
}
