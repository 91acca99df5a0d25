//! # gavel-notify
//!
//! Real-time fan-out of auction events to subscriber connections.
//!
//! ```text
//! BiddingEngine ──emit──> EventQueue ──mpsc──> dispatcher task
//!                                                   │
//!                                        NotificationHub::publish
//!                                          │        │        │
//!                                        conn A   conn B   conn C (closed -> pruned)
//! ```
//!
//! The hub can also be used as the engine's sink directly; the queue only
//! moves serialization and delivery off the bidding thread.

pub mod connection;
pub mod hub;
pub mod queue;

pub use connection::{ChannelConnection, Connection};
pub use hub::NotificationHub;
pub use queue::{EventQueue, spawn_dispatcher};
