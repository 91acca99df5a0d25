//! `gaveld`: runs the auction house until Ctrl-C.
//!
//! Environment:
//! - `GAVEL_CONFIG`: path to a JSON config file (defaults apply otherwise)
//! - `GAVEL_LOG_JSON=1`: JSON log lines
//! - `RUST_LOG`: log filter, `info` by default

use std::sync::Arc;

use gavel_node::{AuctionHouse, telemetry};
use gavel_notify::{EventQueue, NotificationHub, spawn_dispatcher};
use gavel_types::{
    GavelConfig, Result, SystemClock,
    constants::{SERVICE_NAME, VERSION},
};

#[tokio::main]
async fn main() -> Result<()> {
    let json_logs = std::env::var("GAVEL_LOG_JSON").is_ok_and(|v| v == "1");
    telemetry::init_tracing(json_logs)?;

    let config = match std::env::var_os("GAVEL_CONFIG") {
        Some(path) => GavelConfig::load(path)?,
        None => GavelConfig::default(),
    };
    tracing::info!(service = SERVICE_NAME, version = VERSION, "Starting");

    let hub = Arc::new(NotificationHub::new());
    let (queue, events) = EventQueue::new();
    let dispatcher = spawn_dispatcher(hub.clone(), events);
    let house = AuctionHouse::with_event_sink(config, Arc::new(SystemClock), hub, Arc::new(queue));
    let scheduler = house.scheduler().spawn();

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    scheduler.shutdown().await;
    let stats = house.stats();
    drop(house);
    if let Err(e) = dispatcher.await {
        tracing::warn!(error = %e, "Dispatcher ended abnormally");
    }
    tracing::info!(
        active_auctions = stats.active_auctions,
        completed_auctions = stats.completed_auctions,
        total_bid_volume = %stats.total_bid_volume,
        "Stopped"
    );
    Ok(())
}
