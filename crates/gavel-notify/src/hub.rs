//! Per-auction subscriber sets.
//!
//! Delivery works on a snapshot of the auction's connections taken under the
//! shard lock; frames are sent after the lock is released. Dead connections
//! found while sending are removed afterwards, and an auction whose last
//! connection goes away loses its entry.

use std::sync::Arc;

use dashmap::DashMap;
use gavel_types::{AuctionEvent, AuctionId, ConnectionId, EventSink, GavelError, WireMessage};

use crate::connection::Connection;

#[derive(Default)]
pub struct NotificationHub {
    channels: DashMap<AuctionId, Vec<Arc<dyn Connection>>>,
}

impl NotificationHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `connection` for `auction_id` and greet it with a
    /// `connected` frame. Subscribing the same connection twice is a no-op.
    ///
    /// # Errors
    /// Whatever the greeting's `send` returned, other than backpressure. The
    /// connection is not registered in that case.
    pub fn subscribe(
        &self,
        auction_id: AuctionId,
        connection: Arc<dyn Connection>,
    ) -> gavel_types::Result<()> {
        let greeting = WireMessage::connected(auction_id).to_bytes()?;
        match connection.send(&greeting) {
            Ok(()) | Err(GavelError::DeliveryBackpressure { .. }) => {}
            Err(e) => return Err(e),
        }

        let id = connection.id();
        let mut conns = self.channels.entry(auction_id).or_default();
        if !conns.iter().any(|c| c.id() == id) {
            conns.push(connection);
        }
        let total = conns.len();
        drop(conns);

        tracing::info!(auction = %auction_id, connection = %id, subscribers = total, "Subscribed");
        Ok(())
    }

    /// Remove a connection. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, auction_id: AuctionId, connection_id: ConnectionId) -> bool {
        let removed = self.remove_where(auction_id, |c| c.id() == connection_id) > 0;
        if removed {
            tracing::info!(auction = %auction_id, connection = %connection_id, "Unsubscribed");
        }
        removed
    }

    /// Remove a connection from every auction it follows.
    pub fn disconnect(&self, connection_id: ConnectionId) -> usize {
        let auctions: Vec<AuctionId> = self
            .channels
            .iter()
            .filter(|e| e.value().iter().any(|c| c.id() == connection_id))
            .map(|e| *e.key())
            .collect();
        auctions
            .into_iter()
            .filter(|&auction_id| self.unsubscribe(auction_id, connection_id))
            .count()
    }

    /// Deliver `event` to every connection of its auction.
    ///
    /// Returns how many connections accepted the frame. Failures stay here:
    /// backpressure drops this frame for that connection only, any other
    /// failure (or a closed connection) prunes it.
    pub fn publish(&self, event: &AuctionEvent) -> usize {
        let auction_id = event.auction_id();
        let Some(targets) = self.channels.get(&auction_id).map(|c| c.value().clone()) else {
            return 0;
        };

        let frame = match event.to_wire_bytes() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(auction = %auction_id, error = %e, "Dropping unserializable event");
                return 0;
            }
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        for conn in &targets {
            if !conn.is_open() {
                dead.push(conn.id());
                continue;
            }
            match conn.send(&frame) {
                Ok(()) => delivered += 1,
                Err(GavelError::DeliveryBackpressure { reason }) => {
                    tracing::debug!(
                        auction = %auction_id,
                        connection = %conn.id(),
                        reason = %reason,
                        "Frame dropped for slow subscriber"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        auction = %auction_id,
                        connection = %conn.id(),
                        error = %e,
                        "Pruning failed subscriber"
                    );
                    dead.push(conn.id());
                }
            }
        }

        if !dead.is_empty() {
            self.remove_where(auction_id, |c| dead.contains(&c.id()));
        }
        tracing::debug!(
            auction = %auction_id,
            delivered,
            pruned = dead.len(),
            "Event published"
        );
        delivered
    }

    pub fn subscriber_count(&self, auction_id: AuctionId) -> usize {
        self.channels.get(&auction_id).map_or(0, |c| c.len())
    }

    /// Auctions with at least one subscriber.
    pub fn active_auction_channels(&self) -> usize {
        self.channels.len()
    }

    /// Forget every connection of an auction that no longer exists.
    ///
    /// Returns how many connections were dropped.
    pub fn drop_channel(&self, auction_id: AuctionId) -> usize {
        let Some((_, conns)) = self.channels.remove(&auction_id) else {
            return 0;
        };
        tracing::info!(auction = %auction_id, subscribers = conns.len(), "Channel dropped");
        conns.len()
    }

    /// Drop matching connections and the auction entry if none are left.
    fn remove_where(
        &self,
        auction_id: AuctionId,
        doomed: impl Fn(&Arc<dyn Connection>) -> bool,
    ) -> usize {
        let removed = {
            let Some(mut conns) = self.channels.get_mut(&auction_id) else {
                return 0;
            };
            let before = conns.len();
            conns.retain(|c| !doomed(c));
            before - conns.len()
        };
        self.channels.remove_if(&auction_id, |_, conns| conns.is_empty());
        removed
    }
}

impl EventSink for NotificationHub {
    fn emit(&self, event: AuctionEvent) {
        self.publish(&event);
    }
}
