//! Error types for the Gavel auction house.
//!
//! All errors use the `GV_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by category:
//! - 1xx: Validation errors (bad bid amount, malformed auction input)
//! - 2xx: Not-found errors (unknown auction / session / user)
//! - 3xx: State errors (inactive or expired auction, double completion)
//! - 4xx: Security errors (fingerprint mismatch)
//! - 5xx: Delivery errors (subscriber transport failures, never surfaced to bidders)
//! - 9xx: General / internal errors

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::AuctionId;

/// Coarse classification of a [`GavelError`].
///
/// Callers that only need to decide how to react (retry with a higher
/// amount, re-authenticate, give up) match on this instead of the variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    State,
    Security,
    Delivery,
    Internal,
}

/// Central error enum for all Gavel operations.
#[derive(Debug, Error)]
pub enum GavelError {
    // =================================================================
    // Validation Errors (1xx)
    // =================================================================
    /// The bid does not exceed the current highest bid plus the minimum increment.
    #[error("GV_ERR_100: Bid of {amount} too low: must exceed {minimum_exclusive}")]
    BidTooLow {
        amount: Decimal,
        minimum_exclusive: Decimal,
    },

    /// The bid amount itself is malformed (zero, negative).
    #[error("GV_ERR_101: Invalid bid amount {0}")]
    InvalidBidAmount(Decimal),

    /// Auction creation input failed validation.
    #[error("GV_ERR_102: Invalid auction: {reason}")]
    InvalidAuction { reason: String },

    /// Auction duration outside the configured bounds.
    #[error("GV_ERR_103: Invalid auction duration: {reason}")]
    InvalidDuration { reason: String },

    /// Session creation input failed validation.
    #[error("GV_ERR_104: Invalid session: {reason}")]
    InvalidSession { reason: String },

    // =================================================================
    // Not-Found Errors (2xx)
    // =================================================================
    #[error("GV_ERR_200: Auction not found: {0}")]
    AuctionNotFound(AuctionId),

    /// The session token is unknown, logged out, or has expired.
    #[error("GV_ERR_201: Session not found or expired")]
    SessionNotFound,

    #[error("GV_ERR_202: User has no sessions: {0}")]
    UserNotFound(String),

    // =================================================================
    // State Errors (3xx)
    // =================================================================
    /// The auction has already been completed.
    #[error("GV_ERR_300: Auction {0} is not active")]
    AuctionNotActive(AuctionId),

    /// The auction is still ACTIVE but its end time has passed.
    #[error("GV_ERR_301: Auction {auction_id} ended at {end_time}")]
    AuctionExpired {
        auction_id: AuctionId,
        end_time: DateTime<Utc>,
    },

    /// A second completion attempt on the same auction.
    #[error("GV_ERR_302: Auction {0} already completed")]
    AuctionAlreadyCompleted(AuctionId),

    // =================================================================
    // Security Errors (4xx)
    // =================================================================
    /// The request origin does not match the one captured at login.
    #[error(
        "GV_ERR_400: Session fingerprint mismatch (ip match: {ip_match}, user-agent match: {user_agent_match})"
    )]
    FingerprintMismatch {
        ip_match: bool,
        user_agent_match: bool,
    },

    // =================================================================
    // Delivery Errors (5xx)
    // =================================================================
    /// The subscriber connection has been closed by its transport.
    #[error("GV_ERR_500: Connection closed")]
    ConnectionClosed,

    /// The transport could not accept the message right now.
    #[error("GV_ERR_501: Delivery backpressure: {reason}")]
    DeliveryBackpressure { reason: String },

    /// The transport failed while sending.
    #[error("GV_ERR_502: Delivery failed: {reason}")]
    DeliveryFailed { reason: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    #[error("GV_ERR_900: Internal error: {0}")]
    Internal(String),

    #[error("GV_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config file, out-of-range values, etc.).
    #[error("GV_ERR_902: Configuration error: {0}")]
    Configuration(String),

    #[error("GV_ERR_903: I/O error: {0}")]
    Io(String),
}

impl GavelError {
    /// Map this error onto its category.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BidTooLow { .. }
            | Self::InvalidBidAmount(_)
            | Self::InvalidAuction { .. }
            | Self::InvalidDuration { .. }
            | Self::InvalidSession { .. } => ErrorKind::Validation,
            Self::AuctionNotFound(_) | Self::SessionNotFound | Self::UserNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::AuctionNotActive(_)
            | Self::AuctionExpired { .. }
            | Self::AuctionAlreadyCompleted(_) => ErrorKind::State,
            Self::FingerprintMismatch { .. } => ErrorKind::Security,
            Self::ConnectionClosed
            | Self::DeliveryBackpressure { .. }
            | Self::DeliveryFailed { .. } => ErrorKind::Delivery,
            Self::Internal(_) | Self::Serialization(_) | Self::Configuration(_) | Self::Io(_) => {
                ErrorKind::Internal
            }
        }
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, GavelError>;

impl From<std::io::Error> for GavelError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for GavelError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
