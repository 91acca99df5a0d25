//! # gavel-types
//!
//! Shared types, errors, and configuration for the **Gavel** auction house.
//!
//! This crate is the leaf dependency of the workspace: every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`AuctionId`], [`BidId`], [`ConnectionId`]
//! - **Auction model**: [`Auction`], [`Bid`], [`AuctionStatus`], [`EndReason`], [`AuctionSnapshot`], [`AuctionOutcome`]
//! - **Session model**: [`Session`], [`Fingerprint`], [`SessionInfo`]
//! - **Events**: [`AuctionEvent`], [`BidEvent`], [`AuctionClosedEvent`], [`WireMessage`], [`EventSink`]
//! - **Configuration**: [`GavelConfig`] and its sections
//! - **Time**: [`Clock`], [`SystemClock`]
//! - **Errors**: [`GavelError`] with `GV_ERR_` prefix codes, [`ErrorKind`]
//! - **Constants**: system-wide defaults

pub mod auction;
pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod ids;
pub mod session;

pub use auction::*;
pub use clock::*;
pub use config::*;
pub use error::*;
pub use event::*;
pub use ids::*;
pub use session::*;

// Constants are accessed via `gavel_types::constants::FOO`
// (not re-exported to avoid name collisions).
