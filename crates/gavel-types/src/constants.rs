//! System-wide constants and defaults for the Gavel auction house.

/// Default minimum increment a bid must exceed over the current highest bid.
pub const DEFAULT_MIN_INCREMENT_UNITS: i64 = 5;

/// Default session inactivity timeout in seconds (30 minutes).
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 30 * 60;

/// Default auction expiry sweep interval in milliseconds.
pub const DEFAULT_AUCTION_SWEEP_MS: u64 = 1000;

/// Default session expiry sweep interval in milliseconds.
pub const DEFAULT_SESSION_SWEEP_MS: u64 = 60_000;

/// Default retention sweep interval in milliseconds (30 minutes).
pub const DEFAULT_RETENTION_SWEEP_MS: u64 = 30 * 60 * 1000;

/// Default retention window for completed auctions, in seconds (30 days).
pub const DEFAULT_RETENTION_WINDOW_SECS: u64 = 30 * 24 * 60 * 60;

/// Shortest auction a seller may schedule, in seconds.
pub const MIN_AUCTION_DURATION_SECS: u64 = 60;

/// Longest auction a seller may schedule, in seconds (168 hours).
pub const MAX_AUCTION_DURATION_SECS: u64 = 168 * 60 * 60;

/// Random bytes per session token (256 bits of entropy).
pub const SESSION_TOKEN_BYTES: usize = 32;

/// Characters of a token that may appear in logs.
pub const TOKEN_LOG_PREFIX_LEN: usize = 8;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Service name.
pub const SERVICE_NAME: &str = "Gavel";
