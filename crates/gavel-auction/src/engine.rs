//! Bid validation and application.
//!
//! Every bid runs one critical section on its auction's write lock:
//!
//! ```text
//! lock(auction) -> ensure_open(now) -> amount > highest + increment?
//!              -> record_bid -> sink.emit(BidAccepted) -> unlock
//! ```
//!
//! Two bids on the same auction can never validate against the same view of
//! the highest bid. Bids on different auctions share nothing but the map.
//! Equal concurrent amounts resolve by lock acquisition order: the first one
//! in wins, the rest see the raised price and are rejected as too low.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use gavel_types::{
    AuctionClosedEvent, AuctionEvent, AuctionId, AuctionOutcome, BidEvent, BidId, BiddingConfig,
    EndReason, EventSink, GavelError, Result,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::store::AuctionStore;

/// Proof that a bid was accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidReceipt {
    pub auction_id: AuctionId,
    pub bid_id: BidId,
    pub amount: Decimal,
    /// Highest bid immediately before this one.
    pub previous_highest: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Applies bids to the [`AuctionStore`] and reports them to an [`EventSink`].
pub struct BiddingEngine {
    store: Arc<AuctionStore>,
    sink: Arc<dyn EventSink>,
    config: BiddingConfig,
}

impl BiddingEngine {
    #[must_use]
    pub fn new(store: Arc<AuctionStore>, sink: Arc<dyn EventSink>, config: BiddingConfig) -> Self {
        Self {
            store,
            sink,
            config,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<AuctionStore> {
        &self.store
    }

    #[must_use]
    pub fn min_increment(&self) -> Decimal {
        self.config.min_increment
    }

    /// Place a bid.
    ///
    /// `Ok` is the accepted outcome; `Err` is the rejection reason.
    ///
    /// # Errors
    /// - [`GavelError::InvalidBidAmount`] for a non-positive amount
    /// - [`GavelError::AuctionNotFound`] for an unknown auction
    /// - [`GavelError::AuctionNotActive`] / [`GavelError::AuctionExpired`]
    ///   when the auction is completed or past its end time
    /// - [`GavelError::BidTooLow`] unless `amount > highest + min_increment`
    pub fn place_bid(
        &self,
        auction_id: AuctionId,
        bidder_id: &str,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<BidReceipt> {
        if amount <= Decimal::ZERO {
            return Err(GavelError::InvalidBidAmount(amount));
        }

        let cell = self.store.cell(auction_id)?;
        let mut auction = cell.write();

        auction.ensure_open(now)?;

        let previous_highest = auction.current_highest_bid;
        let floor = previous_highest
            .checked_add(self.config.min_increment)
            .unwrap_or(Decimal::MAX);
        if amount <= floor {
            tracing::debug!(
                auction = %auction_id,
                bidder = bidder_id,
                amount = %amount,
                floor = %floor,
                "Bid rejected: too low"
            );
            return Err(GavelError::BidTooLow {
                amount,
                minimum_exclusive: floor,
            });
        }

        let bid = auction.record_bid(bidder_id, amount, now).clone();
        let receipt = BidReceipt {
            auction_id,
            bid_id: bid.id,
            amount,
            previous_highest,
            timestamp: now,
        };
        let event = BidEvent::from_bid(&auction.title, &bid);

        tracing::debug!(
            auction = %auction_id,
            bid = %receipt.bid_id,
            bidder = bidder_id,
            amount = %amount,
            "Bid accepted"
        );

        // Still under the lock: per-auction event order == acceptance order.
        self.sink.emit(AuctionEvent::BidAccepted(event));
        Ok(receipt)
    }

    /// The exclusive lower bound the next bid must exceed.
    pub fn minimum_next_bid(&self, auction_id: AuctionId) -> Result<Decimal> {
        let cell = self.store.cell(auction_id)?;
        let highest = cell.read().current_highest_bid;
        Ok(highest
            .checked_add(self.config.min_increment)
            .unwrap_or(Decimal::MAX))
    }

    /// Close an auction and announce it to subscribers.
    pub fn close_auction(
        &self,
        auction_id: AuctionId,
        reason: EndReason,
        now: DateTime<Utc>,
    ) -> Result<AuctionOutcome> {
        let outcome = self.store.close(auction_id, reason, now)?;
        self.sink
            .emit(AuctionEvent::AuctionClosed(AuctionClosedEvent::from(&outcome)));
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use gavel_types::{ErrorKind, NullSink};
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<AuctionEvent>>,
    }

    impl EventSink for RecordingSink {
        fn emit(&self, event: AuctionEvent) {
            self.events.lock().push(event);
        }
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn setup(sink: Arc<dyn EventSink>) -> (BiddingEngine, AuctionId) {
        let store = Arc::new(AuctionStore::default());
        let id = store
            .create(
                "Vintage Watch",
                "",
                Decimal::new(100, 0),
                t0() + TimeDelta::hours(1),
                t0(),
            )
            .unwrap();
        (
            BiddingEngine::new(store, sink, BiddingConfig::default()),
            id,
        )
    }

    #[test]
    fn accepts_bid_above_increment() {
        let (engine, id) = setup(Arc::new(NullSink));
        let receipt = engine
            .place_bid(id, "alice", Decimal::new(110, 0), t0())
            .unwrap();
        assert_eq!(receipt.bid_id, BidId(1));
        assert_eq!(receipt.previous_highest, Decimal::new(100, 0));

        let snap = engine.store().get(id).unwrap();
        assert_eq!(snap.current_highest_bid, Decimal::new(110, 0));
        assert_eq!(snap.current_highest_bidder.as_deref(), Some("alice"));
    }

    #[test]
    fn rejects_bid_at_exact_increment() {
        let (engine, id) = setup(Arc::new(NullSink));
        let err = engine
            .place_bid(id, "alice", Decimal::new(105, 0), t0())
            .unwrap_err();
        assert!(matches!(err, GavelError::BidTooLow { .. }));
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(engine.store().bid_count(id).unwrap(), 0);
    }

    #[test]
    fn rejects_non_positive_amount() {
        let (engine, id) = setup(Arc::new(NullSink));
        let err = engine
            .place_bid(id, "alice", Decimal::new(-1, 0), t0())
            .unwrap_err();
        assert!(matches!(err, GavelError::InvalidBidAmount(_)));
    }

    #[test]
    fn rejects_unknown_auction() {
        let (engine, _) = setup(Arc::new(NullSink));
        let err = engine
            .place_bid(AuctionId(404), "alice", Decimal::new(500, 0), t0())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn rejects_after_end_time_even_before_sweep() {
        let (engine, id) = setup(Arc::new(NullSink));
        let err = engine
            .place_bid(id, "alice", Decimal::new(500, 0), t0() + TimeDelta::hours(1))
            .unwrap_err();
        assert!(matches!(err, GavelError::AuctionExpired { .. }));
        assert_eq!(err.kind(), ErrorKind::State);
    }

    #[test]
    fn rejects_after_close() {
        let (engine, id) = setup(Arc::new(NullSink));
        engine
            .close_auction(id, EndReason::ManualClose, t0())
            .unwrap();
        let err = engine
            .place_bid(id, "alice", Decimal::new(500, 0), t0())
            .unwrap_err();
        assert!(matches!(err, GavelError::AuctionNotActive(_)));
    }

    #[test]
    fn minimum_next_bid_tracks_highest() {
        let (engine, id) = setup(Arc::new(NullSink));
        assert_eq!(engine.minimum_next_bid(id).unwrap(), Decimal::new(105, 0));
        engine
            .place_bid(id, "alice", Decimal::new(120, 0), t0())
            .unwrap();
        assert_eq!(engine.minimum_next_bid(id).unwrap(), Decimal::new(125, 0));
    }

    #[test]
    fn emits_events_in_acceptance_order() {
        let sink = Arc::new(RecordingSink::default());
        let (engine, id) = setup(sink.clone());

        engine
            .place_bid(id, "alice", Decimal::new(110, 0), t0())
            .unwrap();
        let _ = engine.place_bid(id, "bob", Decimal::new(112, 0), t0());
        engine
            .place_bid(id, "bob", Decimal::new(116, 0), t0())
            .unwrap();
        engine.close_auction(id, EndReason::Expired, t0()).unwrap();

        let events = sink.events.lock();
        assert_eq!(events.len(), 3, "rejected bids emit nothing");
        match (&events[0], &events[1], &events[2]) {
            (
                AuctionEvent::BidAccepted(first),
                AuctionEvent::BidAccepted(second),
                AuctionEvent::AuctionClosed(closed),
            ) => {
                assert_eq!(first.bid_amount, Decimal::new(110, 0));
                assert_eq!(first.auction_title, "Vintage Watch");
                assert_eq!(second.bidder_id, "bob");
                assert_eq!(second.bid_id, BidId(2));
                assert_eq!(closed.winner.as_deref(), Some("bob"));
            }
            other => panic!("unexpected event sequence: {other:?}"),
        }
    }

    #[test]
    fn custom_increment_applies() {
        let store = Arc::new(AuctionStore::default());
        let id = store
            .create("X", "", Decimal::new(100, 0), t0() + TimeDelta::hours(1), t0())
            .unwrap();
        let engine = BiddingEngine::new(
            store,
            Arc::new(NullSink),
            BiddingConfig {
                min_increment: Decimal::ZERO,
            },
        );
        assert!(engine
            .place_bid(id, "a", Decimal::new(100, 0), t0())
            .is_err());
        assert!(engine
            .place_bid(id, "a", Decimal::new(10001, 2), t0())
            .is_ok());
    }
}
