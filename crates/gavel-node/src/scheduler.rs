//! Background sweeps.
//!
//! Three independent loops, each on its own `tokio::time::interval`:
//!
//! | Sweep     | Default period | Work                                               |
//! |-----------|----------------|----------------------------------------------------|
//! | auctions  | 1 s            | close ACTIVE auctions past `end_time` as EXPIRED   |
//! | sessions  | 60 s           | drop sessions past their inactivity window         |
//! | retention | 30 min         | purge auctions completed more than 30 days ago     |
//!
//! The sweeps take the same per-auction and per-session locks as request
//! paths and never hold anything across entries, so one entry failing only
//! affects that entry. A panic while closing one auction is caught and
//! counted as a failure; a panic anywhere else in a tick is caught and
//! logged, and the loop keeps running.
//!
//! Purging an auction also drops its subscriber channel from the hub.

use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Utc};
use gavel_auction::BiddingEngine;
use gavel_notify::NotificationHub;
use gavel_session::SessionRegistry;
use gavel_types::{Clock, EndReason, ErrorKind, SchedulerConfig};
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};

use crate::stats::SystemStats;

/// What one auction-expiry pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuctionSweepReport {
    /// Closed by this pass.
    pub closed: usize,
    /// Already closed or removed by someone else in the meantime.
    pub skipped: usize,
    pub failed: usize,
}

pub struct ExpirationScheduler {
    engine: Arc<BiddingEngine>,
    sessions: Arc<SessionRegistry>,
    hub: Arc<NotificationHub>,
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
}

impl ExpirationScheduler {
    #[must_use]
    pub fn new(
        engine: Arc<BiddingEngine>,
        sessions: Arc<SessionRegistry>,
        hub: Arc<NotificationHub>,
        config: SchedulerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            engine,
            sessions,
            hub,
            config,
            clock,
        }
    }

    /// Close every ACTIVE auction whose end time has passed.
    ///
    /// Each close publishes `auctionClosed`. Losing a race to another closer
    /// counts as skipped, not failed.
    pub fn sweep_expired_auctions(&self, now: DateTime<Utc>) -> AuctionSweepReport {
        let mut report = AuctionSweepReport::default();
        for auction_id in self.engine.store().overdue(now) {
            let closed = catch_unwind(AssertUnwindSafe(|| {
                self.engine.close_auction(auction_id, EndReason::Expired, now)
            }));
            match closed {
                Ok(Ok(_)) => report.closed += 1,
                Ok(Err(e)) if matches!(e.kind(), ErrorKind::State | ErrorKind::NotFound) => {
                    report.skipped += 1;
                }
                Ok(Err(e)) => {
                    report.failed += 1;
                    tracing::warn!(auction = %auction_id, error = %e, "Expiry failed");
                }
                Err(_) => {
                    report.failed += 1;
                    tracing::error!(auction = %auction_id, "Expiry panicked");
                }
            }
        }
        if report.closed > 0 || report.failed > 0 {
            tracing::info!(
                closed = report.closed,
                skipped = report.skipped,
                failed = report.failed,
                "Auction expiry sweep"
            );
        }
        report
    }

    pub fn sweep_sessions(&self, now: DateTime<Utc>) -> usize {
        self.sessions.sweep_expired(now)
    }

    /// Purge auctions completed before `now - retention_window`, along with
    /// whatever subscribers they still have.
    pub fn sweep_retention(&self, now: DateTime<Utc>) -> usize {
        let Some(cutoff) = now.checked_sub_signed(self.config.retention_delta()) else {
            return 0;
        };
        let purged = self.engine.store().purge_completed_before(cutoff);
        for &auction_id in &purged {
            self.hub.drop_channel(auction_id);
        }
        purged.len()
    }

    #[must_use]
    pub fn stats(&self, now: DateTime<Utc>) -> SystemStats {
        SystemStats::collect(self.engine.store(), &self.sessions, now)
    }

    /// Start the three sweep loops on the current tokio runtime.
    #[must_use]
    pub fn spawn(self: Arc<Self>) -> SchedulerHandle {
        let (stop, stopped) = watch::channel(false);

        let auctions = {
            let this = Arc::clone(&self);
            every(
                "auction-expiry",
                self.config.auction_sweep_interval,
                stopped.clone(),
                move || {
                    this.sweep_expired_auctions(this.clock.now());
                },
            )
        };
        let sessions = {
            let this = Arc::clone(&self);
            every(
                "session-expiry",
                self.config.session_sweep_interval,
                stopped.clone(),
                move || {
                    this.sweep_sessions(this.clock.now());
                },
            )
        };
        let retention = {
            let this = Arc::clone(&self);
            every(
                "retention",
                self.config.retention_sweep_interval,
                stopped,
                move || {
                    let now = this.clock.now();
                    this.sweep_retention(now);
                    let stats = this.stats(now);
                    tracing::info!(
                        active_auctions = stats.active_auctions,
                        completed_auctions = stats.completed_auctions,
                        total_bid_volume = %stats.total_bid_volume,
                        active_sessions = stats.active_sessions,
                        "System stats"
                    );
                },
            )
        };

        tracing::info!(
            auction_sweep_ms = self.config.auction_sweep_interval.as_millis(),
            session_sweep_ms = self.config.session_sweep_interval.as_millis(),
            retention_sweep_ms = self.config.retention_sweep_interval.as_millis(),
            "Expiration scheduler started"
        );
        SchedulerHandle {
            stop,
            tasks: vec![auctions, sessions, retention],
        }
    }
}

/// Owns the sweep tasks. Dropping it also stops them, without waiting.
pub struct SchedulerHandle {
    stop: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Signal every loop and wait for them to finish their current pass.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Sweep task ended abnormally");
            }
        }
        tracing::info!("Expiration scheduler stopped");
    }
}

fn every<F>(
    name: &'static str,
    period: Duration,
    mut stopped: watch::Receiver<bool>,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if catch_unwind(AssertUnwindSafe(&mut tick)).is_err() {
                        tracing::error!(task = name, "Sweep tick panicked");
                    }
                }
                _ = stopped.changed() => break,
            }
        }
        tracing::info!(task = name, "Sweep loop exited");
    })
}
