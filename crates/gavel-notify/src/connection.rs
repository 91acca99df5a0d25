//! Subscriber transports.

use gavel_types::{ConnectionId, GavelError, Result};
use tokio::sync::mpsc::{self, error::TrySendError};

/// One subscriber's outbound half.
///
/// `send` must not block and must not call back into the hub: it runs while
/// a publish is in progress.
pub trait Connection: Send + Sync {
    fn id(&self) -> ConnectionId;

    /// Hand one JSON frame to the transport.
    ///
    /// # Errors
    /// - [`GavelError::DeliveryBackpressure`] if the frame cannot be taken
    ///   right now; the hub drops the frame and keeps the connection.
    /// - Anything else means the connection is unusable and gets pruned.
    fn send(&self, frame: &[u8]) -> Result<()>;

    fn is_open(&self) -> bool;
}

/// A [`Connection`] backed by a bounded tokio channel. The receiving half
/// goes to whatever writes frames to the socket.
#[derive(Debug, Clone)]
pub struct ChannelConnection {
    id: ConnectionId,
    tx: mpsc::Sender<Vec<u8>>,
}

impl ChannelConnection {
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                id: ConnectionId::new(),
                tx,
            },
            rx,
        )
    }
}

impl Connection for ChannelConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&self, frame: &[u8]) -> Result<()> {
        self.tx.try_send(frame.to_vec()).map_err(|e| match e {
            TrySendError::Full(_) => GavelError::DeliveryBackpressure {
                reason: "outbound buffer full".into(),
            },
            TrySendError::Closed(_) => GavelError::ConnectionClosed,
        })
    }

    fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_buffer_is_backpressure() {
        let (conn, _rx) = ChannelConnection::new(1);
        conn.send(b"one").unwrap();
        let err = conn.send(b"two").unwrap_err();
        assert!(matches!(err, GavelError::DeliveryBackpressure { .. }));
        assert!(conn.is_open());
    }

    #[test]
    fn dropped_receiver_closes() {
        let (conn, rx) = ChannelConnection::new(4);
        drop(rx);
        assert!(!conn.is_open());
        assert!(matches!(conn.send(b"x"), Err(GavelError::ConnectionClosed)));
    }

    #[test]
    fn frames_arrive_in_order() {
        let (conn, mut rx) = ChannelConnection::new(4);
        conn.send(b"a").unwrap();
        conn.send(b"b").unwrap();
        assert_eq!(rx.try_recv().unwrap(), b"a");
        assert_eq!(rx.try_recv().unwrap(), b"b");
    }
}
