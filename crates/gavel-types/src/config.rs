//! Configuration for the auction house.
//!
//! Every section has a `Default` built from [`crate::constants`], and every
//! struct is `#[serde(default)]`, so a JSON file only needs the fields it
//! overrides.

use std::{path::Path, time::Duration};

use chrono::TimeDelta;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{GavelError, Result, constants};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GavelConfig {
    pub bidding: BiddingConfig,
    pub auction: AuctionRules,
    pub session: SessionConfig,
    pub scheduler: SchedulerConfig,
}

impl GavelConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)
            .map_err(|e| GavelError::Configuration(format!("invalid config JSON: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    /// Reject values that would break the engine's invariants.
    pub fn validate(&self) -> Result<()> {
        if self.bidding.min_increment < Decimal::ZERO {
            return Err(GavelError::Configuration(
                "bidding.min_increment must not be negative".into(),
            ));
        }
        if self.auction.min_duration.is_zero() {
            return Err(GavelError::Configuration(
                "auction.min_duration must be positive".into(),
            ));
        }
        if TimeDelta::from_std(self.auction.max_duration).is_err() {
            return Err(GavelError::Configuration(
                "auction.max_duration is out of range".into(),
            ));
        }
        if self.auction.min_duration > self.auction.max_duration {
            return Err(GavelError::Configuration(
                "auction.min_duration exceeds auction.max_duration".into(),
            ));
        }
        if self.session.inactivity_timeout.is_zero() {
            return Err(GavelError::Configuration(
                "session.inactivity_timeout must be positive".into(),
            ));
        }
        let s = &self.scheduler;
        for (name, interval) in [
            ("auction_sweep_interval", s.auction_sweep_interval),
            ("session_sweep_interval", s.session_sweep_interval),
            ("retention_sweep_interval", s.retention_sweep_interval),
        ] {
            if interval.is_zero() {
                return Err(GavelError::Configuration(format!(
                    "scheduler.{name} must be positive"
                )));
            }
        }
        Ok(())
    }
}

/// Bid acceptance rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BiddingConfig {
    /// A bid is accepted only if `amount > current_highest_bid + min_increment`.
    pub min_increment: Decimal,
}

impl Default for BiddingConfig {
    fn default() -> Self {
        Self {
            min_increment: Decimal::new(constants::DEFAULT_MIN_INCREMENT_UNITS, 0),
        }
    }
}

/// Bounds for auctions created from a duration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuctionRules {
    pub min_duration: Duration,
    pub max_duration: Duration,
}

impl Default for AuctionRules {
    fn default() -> Self {
        Self {
            min_duration: Duration::from_secs(constants::MIN_AUCTION_DURATION_SECS),
            max_duration: Duration::from_secs(constants::MAX_AUCTION_DURATION_SECS),
        }
    }
}

/// Session lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// A session is invalid once idle for longer than this.
    pub inactivity_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout: Duration::from_secs(constants::DEFAULT_SESSION_TIMEOUT_SECS),
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn timeout_delta(&self) -> TimeDelta {
        to_delta(self.inactivity_timeout)
    }
}

/// Background sweep timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub auction_sweep_interval: Duration,
    pub session_sweep_interval: Duration,
    pub retention_sweep_interval: Duration,
    /// Completed auctions older than this are purged.
    pub retention_window: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            auction_sweep_interval: Duration::from_millis(constants::DEFAULT_AUCTION_SWEEP_MS),
            session_sweep_interval: Duration::from_millis(constants::DEFAULT_SESSION_SWEEP_MS),
            retention_sweep_interval: Duration::from_millis(constants::DEFAULT_RETENTION_SWEEP_MS),
            retention_window: Duration::from_secs(constants::DEFAULT_RETENTION_WINDOW_SECS),
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub fn retention_delta(&self) -> TimeDelta {
        to_delta(self.retention_window)
    }
}

/// Saturating `std` -> `chrono` duration conversion.
#[must_use]
pub fn to_delta(d: Duration) -> TimeDelta {
    TimeDelta::from_std(d).unwrap_or(TimeDelta::MAX)
}
