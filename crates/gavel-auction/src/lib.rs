//! # gavel-auction
//!
//! The auction state machine: an [`AuctionStore`] holding every auction
//! behind its own lock, and a [`BiddingEngine`] that validates and applies
//! bids inside that lock.
//!
//! ## Bid Flow
//!
//! ```text
//! caller -> BiddingEngine.place_bid()
//!        -> AuctionStore cell (per-auction write lock)
//!        -> Auction.ensure_open() -> increment check -> Auction.record_bid()
//!        -> EventSink.emit(BidAccepted)
//! ```
//!
//! Completion (`AuctionStore::close`) takes the same lock, so a bid and a
//! close on the same auction are strictly ordered.

pub mod engine;
pub mod store;

pub use engine::{BidReceipt, BiddingEngine};
pub use store::AuctionStore;
