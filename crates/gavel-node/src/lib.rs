//! # gavel-node
//!
//! Wires the components into a running auction house:
//!
//! - [`AuctionHouse`]: the operation surface callers use
//! - [`ExpirationScheduler`]: auction expiry, session expiry and retention
//!   sweeps, each on its own tokio interval
//! - [`telemetry`]: `tracing-subscriber` setup for the `gaveld` binary

pub mod house;
pub mod scheduler;
pub mod stats;
pub mod telemetry;

pub use house::AuctionHouse;
pub use scheduler::{AuctionSweepReport, ExpirationScheduler, SchedulerHandle};
pub use stats::SystemStats;
