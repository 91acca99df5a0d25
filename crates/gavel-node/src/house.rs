//! The auction house facade.
//!
//! Reads the clock once per call and passes `now` down, so every component
//! sees the same instant for one operation.

use std::{sync::Arc, time::Duration};

use gavel_auction::{AuctionStore, BidReceipt, BiddingEngine};
use gavel_notify::{Connection, NotificationHub};
use gavel_session::{SessionRegistry, SessionToken};
use gavel_types::{
    AuctionEvent, AuctionId, AuctionOutcome, AuctionSnapshot, Bid, Clock, ConnectionId, EndReason,
    EventSink, GavelConfig, GavelError, Result,
};
use rust_decimal::Decimal;

use crate::{scheduler::ExpirationScheduler, stats::SystemStats};

pub struct AuctionHouse {
    store: Arc<AuctionStore>,
    engine: Arc<BiddingEngine>,
    sessions: Arc<SessionRegistry>,
    hub: Arc<NotificationHub>,
    clock: Arc<dyn Clock>,
    config: GavelConfig,
}

impl AuctionHouse {
    /// An auction house that publishes events synchronously from the
    /// bidding path.
    #[must_use]
    pub fn new(config: GavelConfig, clock: Arc<dyn Clock>) -> Self {
        let hub = Arc::new(NotificationHub::new());
        let sink: Arc<dyn EventSink> = hub.clone();
        Self::with_event_sink(config, clock, hub, sink)
    }

    /// An auction house whose events go to `sink`, which is expected to
    /// forward them to `hub` (typically an `EventQueue` plus dispatcher).
    #[must_use]
    pub fn with_event_sink(
        config: GavelConfig,
        clock: Arc<dyn Clock>,
        hub: Arc<NotificationHub>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let store = Arc::new(AuctionStore::new(config.auction.clone()));
        let engine = Arc::new(BiddingEngine::new(
            store.clone(),
            sink,
            config.bidding.clone(),
        ));
        let sessions = Arc::new(SessionRegistry::new(&config.session));
        Self {
            store,
            engine,
            sessions,
            hub,
            clock,
            config,
        }
    }

    /// A scheduler sweeping this house's components.
    #[must_use]
    pub fn scheduler(&self) -> Arc<ExpirationScheduler> {
        Arc::new(ExpirationScheduler::new(
            self.engine.clone(),
            self.sessions.clone(),
            self.hub.clone(),
            self.config.scheduler.clone(),
            self.clock.clone(),
        ))
    }

    #[must_use]
    pub fn store(&self) -> &Arc<AuctionStore> {
        &self.store
    }

    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    #[must_use]
    pub fn hub(&self) -> &Arc<NotificationHub> {
        &self.hub
    }

    // =================================================================
    // Auctions
    // =================================================================

    pub fn create_auction(
        &self,
        title: &str,
        description: &str,
        starting_price: Decimal,
        duration: Duration,
    ) -> Result<AuctionSnapshot> {
        let now = self.clock.now();
        let id = self
            .store
            .create_with_duration(title, description, starting_price, duration, now)?;
        self.get_auction(id)
    }

    pub fn get_auction(&self, auction_id: AuctionId) -> Result<AuctionSnapshot> {
        self.store
            .get(auction_id)
            .ok_or(GavelError::AuctionNotFound(auction_id))
    }

    pub fn list_active_auctions(&self) -> Vec<AuctionSnapshot> {
        self.store.list_active(self.clock.now())
    }

    pub fn list_completed_auctions(&self) -> Vec<AuctionSnapshot> {
        self.store.list_completed()
    }

    pub fn close_auction(
        &self,
        auction_id: AuctionId,
        reason: EndReason,
    ) -> Result<AuctionOutcome> {
        self.engine.close_auction(auction_id, reason, self.clock.now())
    }

    /// Bid as the user behind `token`.
    ///
    /// The session must be live; it is touched before the bid is judged, so
    /// a rejected bid still counts as activity.
    ///
    /// # Errors
    /// [`GavelError::SessionNotFound`] for a dead session, otherwise as
    /// [`BiddingEngine::place_bid`].
    pub fn place_bid(
        &self,
        token: &str,
        auction_id: AuctionId,
        amount: Decimal,
    ) -> Result<BidReceipt> {
        let now = self.clock.now();
        let bidder = self.sessions.resolve(token, now)?;
        self.sessions.touch(token, now);
        self.engine.place_bid(auction_id, &bidder, amount, now)
    }

    /// Bids newest first.
    pub fn get_bids_for_auction(&self, auction_id: AuctionId) -> Result<Vec<Bid>> {
        self.store.bids_for(auction_id)
    }

    pub fn minimum_next_bid(&self, auction_id: AuctionId) -> Result<Decimal> {
        self.engine.minimum_next_bid(auction_id)
    }

    // =================================================================
    // Sessions
    // =================================================================

    pub fn create_session(
        &self,
        username: &str,
        device_id: &str,
        ip_address: &str,
        user_agent: &str,
    ) -> Result<SessionToken> {
        self.sessions
            .create_session(username, device_id, ip_address, user_agent, self.clock.now())
    }

    pub fn is_session_valid(&self, token: &str) -> bool {
        self.sessions.is_valid(token, self.clock.now())
    }

    /// Anti-hijack check. A mismatch ends the session.
    ///
    /// # Errors
    /// [`GavelError::FingerprintMismatch`], or [`GavelError::SessionNotFound`]
    /// for an unknown or expired session.
    pub fn validate_session_fingerprint(
        &self,
        token: &str,
        ip_address: &str,
        user_agent: &str,
    ) -> Result<()> {
        self.sessions
            .verify_fingerprint(token, ip_address, user_agent, self.clock.now())
    }

    pub fn touch_session(&self, token: &str) {
        self.sessions.touch(token, self.clock.now());
    }

    pub fn logout(&self, token: &str) -> bool {
        self.sessions.logout(token)
    }

    pub fn logout_all_for_user(&self, username: &str) -> Result<usize> {
        self.sessions.logout_all_for_user(username)
    }

    // =================================================================
    // Notifications
    // =================================================================

    /// Follow an existing auction.
    ///
    /// # Errors
    /// [`GavelError::AuctionNotFound`], or the connection's own failure on
    /// the greeting frame.
    pub fn subscribe(&self, auction_id: AuctionId, connection: Arc<dyn Connection>) -> Result<()> {
        if self.store.get(auction_id).is_none() {
            return Err(GavelError::AuctionNotFound(auction_id));
        }
        self.hub.subscribe(auction_id, connection)
    }

    pub fn unsubscribe(&self, auction_id: AuctionId, connection_id: ConnectionId) -> bool {
        self.hub.unsubscribe(auction_id, connection_id)
    }

    pub fn publish(&self, event: &AuctionEvent) -> usize {
        self.hub.publish(event)
    }

    pub fn stats(&self) -> SystemStats {
        SystemStats::collect(&self.store, &self.sessions, self.clock.now())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use gavel_types::{ErrorKind, ManualClock};

    use super::*;

    fn house() -> (AuctionHouse, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::fixed());
        (AuctionHouse::new(GavelConfig::default(), clock.clone()), clock)
    }

    #[test]
    fn create_auction_checks_duration() {
        let (house, _) = house();
        let err = house
            .create_auction("Lamp", "", Decimal::new(10, 0), Duration::from_secs(30))
            .unwrap_err();
        assert!(matches!(err, GavelError::InvalidDuration { .. }));
        assert_eq!(err.kind(), ErrorKind::Validation);

        let snap = house
            .create_auction("Lamp", "brass", Decimal::new(10, 0), Duration::from_secs(3600))
            .unwrap();
        assert_eq!(snap.title, "Lamp");
        assert_eq!(snap.end_time - snap.start_time, TimeDelta::hours(1));
    }

    #[test]
    fn bid_needs_live_session() {
        let (house, clock) = house();
        let lot = house
            .create_auction("Lamp", "", Decimal::new(10, 0), Duration::from_secs(7200))
            .unwrap();
        let token = house.create_session("alice", "d", "ip", "ua").unwrap();

        let receipt = house
            .place_bid(token.as_str(), lot.id, Decimal::new(20, 0))
            .unwrap();
        assert_eq!(receipt.amount, Decimal::new(20, 0));
        assert_eq!(
            house.get_auction(lot.id).unwrap().current_highest_bidder.as_deref(),
            Some("alice")
        );

        clock.advance(TimeDelta::minutes(31));
        let err = house
            .place_bid(token.as_str(), lot.id, Decimal::new(50, 0))
            .unwrap_err();
        assert!(matches!(err, GavelError::SessionNotFound));
    }

    #[test]
    fn bidding_keeps_session_alive() {
        let (house, clock) = house();
        let lot = house
            .create_auction("Lamp", "", Decimal::new(10, 0), Duration::from_secs(7200))
            .unwrap();
        let token = house.create_session("alice", "d", "ip", "ua").unwrap();
        for step in 1..=3_i64 {
            clock.advance(TimeDelta::minutes(20));
            house
                .place_bid(token.as_str(), lot.id, Decimal::new(10 + step * 10, 0))
                .unwrap();
        }
        assert!(house.is_session_valid(token.as_str()));
    }

    #[test]
    fn fingerprint_mismatch_ends_session() {
        let (house, _) = house();
        let token = house.create_session("alice", "d", "10.0.0.1", "ua").unwrap();
        assert!(house
            .validate_session_fingerprint(token.as_str(), "10.0.0.1", "ua")
            .is_ok());
        let err = house
            .validate_session_fingerprint(token.as_str(), "10.9.9.9", "ua")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Security);
        assert!(!house.is_session_valid(token.as_str()));
    }

    #[test]
    fn fingerprint_check_on_expired_session_is_not_found() {
        let (house, clock) = house();
        let token = house.create_session("alice", "d", "10.0.0.1", "ua").unwrap();
        clock.advance(TimeDelta::minutes(31));
        let err = house
            .validate_session_fingerprint(token.as_str(), "10.0.0.1", "ua")
            .unwrap_err();
        assert!(matches!(err, GavelError::SessionNotFound));
        assert!(house.sessions().is_empty());
    }

    #[test]
    fn subscribe_requires_known_auction() {
        let (house, _) = house();
        let (conn, _rx) = gavel_notify::ChannelConnection::new(4);
        let err = house.subscribe(AuctionId(9), Arc::new(conn)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn stats_count_everything() {
        let (house, _) = house();
        let lot = house
            .create_auction("Lamp", "", Decimal::new(10, 0), Duration::from_secs(7200))
            .unwrap();
        let token = house.create_session("alice", "d", "ip", "ua").unwrap();
        house
            .place_bid(token.as_str(), lot.id, Decimal::new(20, 0))
            .unwrap();

        let stats = house.stats();
        assert_eq!(stats.active_auctions, 1);
        assert_eq!(stats.active_sessions, 1);
        assert_eq!(stats.total_bid_volume, Decimal::new(20, 0));
    }
}
