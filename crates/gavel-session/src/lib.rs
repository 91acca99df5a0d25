//! # gavel-session
//!
//! Authenticated user sessions.
//!
//! - [`SessionToken`]: 256 bits from the OS CSPRNG, hex-encoded. Only its
//!   SHA-256 [`TokenDigest`] is kept in memory.
//! - [`SessionRegistry`]: token index plus per-user index, kept consistent
//!   under one index guard. Expiry is applied on every read, so a session
//!   is dead the moment its inactivity window passes, swept or not.

pub mod registry;
pub mod token;

pub use registry::SessionRegistry;
pub use token::{SessionToken, TokenDigest};
