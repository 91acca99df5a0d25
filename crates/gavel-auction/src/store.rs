//! The auction store.
//!
//! Auctions live in a `DashMap<AuctionId, Arc<RwLock<Auction>>>`:
//! - the map only guards membership (create / purge)
//! - each auction's `RwLock` is its exclusive section; bid acceptance and
//!   completion take the write half, snapshots take the read half
//!
//! No code path holds a map shard guard while waiting on an auction lock,
//! except `purge_completed_before`, which only touches completed auctions.
//! Operations on different auctions never contend.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use gavel_types::{
    Auction, AuctionId, AuctionOutcome, AuctionRules, AuctionSnapshot, Bid, EndReason, GavelError,
    Result, to_delta,
};
use parking_lot::RwLock;
use rust_decimal::Decimal;

/// Shared handle to one auction's exclusive section.
pub(crate) type AuctionCell = Arc<RwLock<Auction>>;

/// Owns every auction in the process.
pub struct AuctionStore {
    auctions: DashMap<AuctionId, AuctionCell>,
    /// Last issued auction id; ids start at 1.
    last_id: AtomicU64,
    rules: AuctionRules,
}

impl AuctionStore {
    #[must_use]
    pub fn new(rules: AuctionRules) -> Self {
        Self {
            auctions: DashMap::new(),
            last_id: AtomicU64::new(0),
            rules,
        }
    }

    // =================================================================
    // Creation
    // =================================================================

    /// Create an ACTIVE auction ending at `end_time`.
    ///
    /// # Errors
    /// [`GavelError::InvalidAuction`] for a blank title, a non-positive
    /// starting price, or an end time not after `now`.
    pub fn create(
        &self,
        title: &str,
        description: &str,
        starting_price: Decimal,
        end_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<AuctionId> {
        let title = title.trim();
        if title.is_empty() {
            return Err(GavelError::InvalidAuction {
                reason: "title must not be blank".into(),
            });
        }
        if starting_price <= Decimal::ZERO {
            return Err(GavelError::InvalidAuction {
                reason: format!("starting price must be positive, got {starting_price}"),
            });
        }
        if end_time <= now {
            return Err(GavelError::InvalidAuction {
                reason: format!("end time {end_time} is not after {now}"),
            });
        }

        let id = AuctionId(self.last_id.fetch_add(1, Ordering::Relaxed) + 1);
        let auction = Auction::new(id, title, description.trim(), starting_price, now, end_time);
        self.auctions.insert(id, Arc::new(RwLock::new(auction)));

        tracing::info!(
            auction = %id,
            title,
            starting_price = %starting_price,
            end_time = %end_time,
            "Auction created"
        );
        Ok(id)
    }

    /// Create an auction lasting `duration` from `now`.
    ///
    /// # Errors
    /// [`GavelError::InvalidDuration`] when `duration` is outside the
    /// configured [`AuctionRules`], otherwise as [`Self::create`].
    pub fn create_with_duration(
        &self,
        title: &str,
        description: &str,
        starting_price: Decimal,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> Result<AuctionId> {
        self.validate_duration(duration)?;
        let end_time = now.checked_add_signed(to_delta(duration)).ok_or_else(|| {
            GavelError::InvalidDuration {
                reason: format!("{}s from {now} is past the calendar", duration.as_secs()),
            }
        })?;
        self.create(title, description, starting_price, end_time, now)
    }

    /// Check a requested auction length against the configured bounds.
    pub fn validate_duration(&self, duration: Duration) -> Result<()> {
        if duration < self.rules.min_duration || duration > self.rules.max_duration {
            return Err(GavelError::InvalidDuration {
                reason: format!(
                    "{}s is outside {}s..={}s",
                    duration.as_secs(),
                    self.rules.min_duration.as_secs(),
                    self.rules.max_duration.as_secs()
                ),
            });
        }
        Ok(())
    }

    // =================================================================
    // Lookups
    // =================================================================

    /// The auction's exclusive section.
    pub(crate) fn cell(&self, id: AuctionId) -> Result<AuctionCell> {
        self.auctions
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(GavelError::AuctionNotFound(id))
    }

    /// Point lookup of an auction's header.
    #[must_use]
    pub fn get(&self, id: AuctionId) -> Option<AuctionSnapshot> {
        self.cell(id).ok().map(|cell| cell.read().snapshot())
    }

    /// Full copy including the bid log.
    #[must_use]
    pub fn auction(&self, id: AuctionId) -> Option<Auction> {
        self.cell(id).ok().map(|cell| cell.read().clone())
    }

    /// Bids for an auction, newest first.
    pub fn bids_for(&self, id: AuctionId) -> Result<Vec<Bid>> {
        let cell = self.cell(id)?;
        let auction = cell.read();
        Ok(auction.bids().iter().rev().cloned().collect())
    }

    /// The bid currently flagged as winning, if any.
    pub fn highest_bid(&self, id: AuctionId) -> Result<Option<Bid>> {
        let cell = self.cell(id)?;
        let auction = cell.read();
        Ok(auction.winning_bid().cloned())
    }

    pub fn bid_count(&self, id: AuctionId) -> Result<usize> {
        Ok(self.cell(id)?.read().bid_count())
    }

    /// ACTIVE and before its end time.
    #[must_use]
    pub fn is_active(&self, id: AuctionId, now: DateTime<Utc>) -> bool {
        self.cell(id).is_ok_and(|cell| cell.read().is_open_at(now))
    }

    // =================================================================
    // Listings (weakly consistent)
    // =================================================================

    /// Clone out every cell so no shard guard is held while reading auctions.
    fn cells(&self) -> Vec<AuctionCell> {
        self.auctions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Auctions still accepting bids at `now`, ordered by id.
    #[must_use]
    pub fn list_active(&self, now: DateTime<Utc>) -> Vec<AuctionSnapshot> {
        let mut active: Vec<_> = self
            .cells()
            .iter()
            .map(|cell| cell.read().snapshot())
            .filter(|snap| snap.is_open_at(now))
            .collect();
        active.sort_by_key(|snap| snap.id);
        active
    }

    /// Completed auctions, most recently completed first.
    #[must_use]
    pub fn list_completed(&self) -> Vec<AuctionSnapshot> {
        let mut completed: Vec<_> = self
            .cells()
            .iter()
            .filter_map(|cell| {
                let auction = cell.read();
                auction.is_completed().then(|| auction.snapshot())
            })
            .collect();
        completed.sort_by(|a, b| b.completed_time.cmp(&a.completed_time).then(a.id.cmp(&b.id)));
        completed
    }

    /// ACTIVE auctions whose end time has passed.
    #[must_use]
    pub fn overdue(&self, now: DateTime<Utc>) -> Vec<AuctionId> {
        let mut ids: Vec<_> = self
            .cells()
            .iter()
            .filter_map(|cell| {
                let auction = cell.read();
                auction.is_overdue_at(now).then_some(auction.id)
            })
            .collect();
        ids.sort();
        ids
    }

    #[must_use]
    pub fn active_count(&self, now: DateTime<Utc>) -> usize {
        self.cells()
            .iter()
            .filter(|cell| cell.read().is_open_at(now))
            .count()
    }

    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.cells()
            .iter()
            .filter(|cell| cell.read().is_completed())
            .count()
    }

    /// Sum of every accepted bid across all retained auctions.
    #[must_use]
    pub fn total_bid_volume(&self) -> Decimal {
        self.cells().iter().map(|cell| cell.read().bid_volume()).sum()
    }

    /// Number of retained auctions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.auctions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.auctions.is_empty()
    }

    // =================================================================
    // Transitions
    // =================================================================

    /// Transition an auction ACTIVE -> COMPLETED.
    ///
    /// Concurrent callers serialize on the auction's lock: exactly one gets
    /// the outcome, the rest get [`GavelError::AuctionAlreadyCompleted`] and
    /// can read the same terminal state with [`Self::get`].
    ///
    /// # Errors
    /// - [`GavelError::AuctionNotFound`] for an unknown id
    /// - [`GavelError::AuctionAlreadyCompleted`] if someone else closed it first
    pub fn close(
        &self,
        id: AuctionId,
        reason: EndReason,
        now: DateTime<Utc>,
    ) -> Result<AuctionOutcome> {
        let cell = self.cell(id)?;
        let outcome = cell.write().complete(reason, now)?;

        match &outcome.winner {
            Some(winner) => tracing::info!(
                auction = %id,
                reason = %reason,
                winner = winner.as_str(),
                winning_bid = %outcome.winning_bid,
                bids = outcome.total_bids,
                "Auction completed"
            ),
            None => tracing::info!(
                auction = %id,
                reason = %reason,
                "Auction completed with no bids"
            ),
        }
        Ok(outcome)
    }

    /// Permanently remove completed auctions whose completion is older than `cutoff`.
    pub fn purge_completed_before(&self, cutoff: DateTime<Utc>) -> Vec<AuctionId> {
        let stale = |auction: &Auction| {
            auction.is_completed() && auction.completed_time.is_some_and(|t| t < cutoff)
        };

        let candidates: Vec<AuctionId> = self
            .cells()
            .iter()
            .filter_map(|cell| {
                let auction = cell.read();
                stale(&*auction).then_some(auction.id)
            })
            .collect();

        let mut purged = Vec::with_capacity(candidates.len());
        for id in candidates {
            if self
                .auctions
                .remove_if(&id, |_, cell| stale(&*cell.read()))
                .is_some()
            {
                purged.push(id);
            }
        }
        if !purged.is_empty() {
            tracing::info!(purged = purged.len(), cutoff = %cutoff, "Purged completed auctions");
        }
        purged
    }
}

impl Default for AuctionStore {
    fn default() -> Self {
        Self::new(AuctionRules::default())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use gavel_types::AuctionStatus;

    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn unbounded_rules() -> AuctionRules {
        AuctionRules {
            min_duration: Duration::from_secs(1),
            max_duration: Duration::MAX,
        }
    }

    #[test]
    fn duration_past_calendar_is_rejected_not_panicking() {
        let store = AuctionStore::new(unbounded_rules());
        for secs in [u64::MAX / 2, 10_000_000_000_000] {
            let err = store
                .create_with_duration("Lot", "", Decimal::ONE, Duration::from_secs(secs), t0())
                .unwrap_err();
            assert!(matches!(err, GavelError::InvalidDuration { .. }), "{err}");
        }
        assert!(store.is_empty());
    }

    fn store_with_one() -> (AuctionStore, AuctionId) {
        let store = AuctionStore::default();
        let id = store
            .create(
                "Vintage Watch",
                "Classic 1960s",
                Decimal::new(500, 0),
                t0() + TimeDelta::hours(2),
                t0(),
            )
            .unwrap();
        (store, id)
    }

    #[test]
    fn create_assigns_increasing_ids() {
        let store = AuctionStore::default();
        let end = t0() + TimeDelta::hours(1);
        let a = store.create("A", "", Decimal::ONE, end, t0()).unwrap();
        let b = store.create("B", "", Decimal::ONE, end, t0()).unwrap();
        assert_eq!(a, AuctionId(1));
        assert_eq!(b, AuctionId(2));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn create_initializes_state() {
        let (store, id) = store_with_one();
        let snap = store.get(id).unwrap();
        assert_eq!(snap.current_highest_bid, Decimal::new(500, 0));
        assert_eq!(snap.status, AuctionStatus::Active);
        assert_eq!(snap.start_time, t0());
        assert!(snap.current_highest_bidder.is_none());
    }

    #[test]
    fn create_rejects_bad_input() {
        let store = AuctionStore::default();
        let end = t0() + TimeDelta::hours(1);
        assert!(matches!(
            store.create("  ", "", Decimal::ONE, end, t0()),
            Err(GavelError::InvalidAuction { .. })
        ));
        assert!(matches!(
            store.create("X", "", Decimal::ZERO, end, t0()),
            Err(GavelError::InvalidAuction { .. })
        ));
        assert!(matches!(
            store.create("X", "", Decimal::ONE, t0(), t0()),
            Err(GavelError::InvalidAuction { .. })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn create_with_duration_enforces_bounds() {
        let store = AuctionStore::default();
        let err = store
            .create_with_duration("X", "", Decimal::ONE, Duration::from_secs(30), t0())
            .unwrap_err();
        assert!(matches!(err, GavelError::InvalidDuration { .. }));

        let err = store
            .create_with_duration("X", "", Decimal::ONE, Duration::from_secs(169 * 3600), t0())
            .unwrap_err();
        assert!(matches!(err, GavelError::InvalidDuration { .. }));

        let id = store
            .create_with_duration("X", "", Decimal::ONE, Duration::from_secs(90 * 60), t0())
            .unwrap();
        assert_eq!(store.get(id).unwrap().end_time, t0() + TimeDelta::minutes(90));
    }

    #[test]
    fn unknown_auction_is_not_found() {
        let store = AuctionStore::default();
        assert!(store.get(AuctionId(99)).is_none());
        assert!(matches!(
            store.bids_for(AuctionId(99)),
            Err(GavelError::AuctionNotFound(AuctionId(99)))
        ));
        assert!(matches!(
            store.close(AuctionId(99), EndReason::ManualClose, t0()),
            Err(GavelError::AuctionNotFound(_))
        ));
    }

    #[test]
    fn close_is_once_only() {
        let (store, id) = store_with_one();
        let outcome = store.close(id, EndReason::ManualClose, t0()).unwrap();
        assert_eq!(outcome.reason, EndReason::ManualClose);
        assert!(!outcome.has_winner());

        let err = store
            .close(id, EndReason::Expired, t0() + TimeDelta::minutes(1))
            .unwrap_err();
        assert!(matches!(err, GavelError::AuctionAlreadyCompleted(_)));

        let snap = store.get(id).unwrap();
        assert_eq!(snap.status, AuctionStatus::Completed);
        assert_eq!(snap.end_reason, Some(EndReason::ManualClose));
        assert_eq!(snap.completed_time, Some(t0()));
    }

    #[test]
    fn listings_split_active_and_completed() {
        let store = AuctionStore::default();
        let a = store
            .create("A", "", Decimal::ONE, t0() + TimeDelta::hours(1), t0())
            .unwrap();
        let b = store
            .create("B", "", Decimal::ONE, t0() + TimeDelta::minutes(10), t0())
            .unwrap();
        let c = store
            .create("C", "", Decimal::ONE, t0() + TimeDelta::hours(1), t0())
            .unwrap();
        store.close(c, EndReason::Cancelled, t0()).unwrap();

        let later = t0() + TimeDelta::minutes(20);
        let active: Vec<_> = store.list_active(later).into_iter().map(|s| s.id).collect();
        assert_eq!(active, vec![a]);
        assert_eq!(store.overdue(later), vec![b]);
        assert_eq!(store.active_count(later), 1);

        let completed: Vec<_> = store.list_completed().into_iter().map(|s| s.id).collect();
        assert_eq!(completed, vec![c]);
        assert_eq!(store.completed_count(), 1);
        assert!(!store.is_active(b, later));
        assert!(store.is_active(a, later));
    }

    #[test]
    fn purge_only_removes_old_completed() {
        let store = AuctionStore::default();
        let end = t0() + TimeDelta::hours(1);
        let old = store.create("Old", "", Decimal::ONE, end, t0()).unwrap();
        let recent = store.create("Recent", "", Decimal::ONE, end, t0()).unwrap();
        let open = store.create("Open", "", Decimal::ONE, end, t0()).unwrap();

        store.close(old, EndReason::Expired, t0()).unwrap();
        store
            .close(recent, EndReason::Expired, t0() + TimeDelta::days(10))
            .unwrap();

        let purged = store.purge_completed_before(t0() + TimeDelta::days(5));
        assert_eq!(purged, vec![old]);
        assert!(store.get(old).is_none());
        assert!(store.get(recent).is_some());
        assert!(store.get(open).is_some());

        assert!(store.purge_completed_before(t0() + TimeDelta::days(5)).is_empty());
    }
}
