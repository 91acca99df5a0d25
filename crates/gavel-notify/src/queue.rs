//! Hand-off from the bidding path to an async delivery task.

use std::sync::Arc;

use gavel_types::{AuctionEvent, EventSink};
use tokio::{sync::mpsc, task::JoinHandle};

use crate::hub::NotificationHub;

/// An [`EventSink`] that only enqueues. `emit` never blocks and never fails
/// the caller; once the dispatcher is gone events are discarded.
#[derive(Debug, Clone)]
pub struct EventQueue {
    tx: mpsc::UnboundedSender<AuctionEvent>,
}

impl EventQueue {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AuctionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for EventQueue {
    fn emit(&self, event: AuctionEvent) {
        if let Err(mpsc::error::SendError(event)) = self.tx.send(event) {
            tracing::debug!(auction = %event.auction_id(), "Dispatcher stopped; event discarded");
        }
    }
}

/// Drain `rx` into `hub` in arrival order until every [`EventQueue`] is dropped.
pub fn spawn_dispatcher(
    hub: Arc<NotificationHub>,
    mut rx: mpsc::UnboundedReceiver<AuctionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("Notification dispatcher started");
        while let Some(event) = rx.recv().await {
            hub.publish(&event);
        }
        tracing::info!("Notification dispatcher stopped");
    })
}
