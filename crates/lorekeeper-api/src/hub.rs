//! In-process registry of open WebSocket connections.
//!
//! Each socket registers an unbounded channel; a writer task drains it into
//! the socket. Delivering to an id with no registered channel (or whose
//! writer has exited) reports `Gone`.

use dashmap::DashMap;
use tokio::sync::mpsc;

use lorekeeper_core::delivery::StreamingDelivery;
use lorekeeper_types::error::DeliveryError;
use lorekeeper_types::message::OutboundFrame;

#[derive(Default)]
pub struct ConnectionHub {
    senders: DashMap<String, mpsc::UnboundedSender<OutboundFrame>>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and return the receiving end of its outbox.
    pub fn register(&self, connection_id: &str) -> mpsc::UnboundedReceiver<OutboundFrame> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.insert(connection_id.to_string(), tx);
        rx
    }

    pub fn unregister(&self, connection_id: &str) {
        self.senders.remove(connection_id);
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}

impl StreamingDelivery for ConnectionHub {
    async fn send(&self, connection_id: &str, frame: OutboundFrame) -> Result<(), DeliveryError> {
        // Clone out of the map so no shard lock is held across the send.
        let Some(sender) = self.senders.get(connection_id).map(|s| s.clone()) else {
            return Err(DeliveryError::Gone);
        };
        sender.send(frame).map_err(|_| DeliveryError::Gone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_reaches_registered_connection() {
        let hub = ConnectionHub::new();
        let mut rx = hub.register("c1");

        hub.send("c1", OutboundFrame::chunk("Hello")).await.unwrap();
        assert_eq!(rx.recv().await, Some(OutboundFrame::chunk("Hello")));
    }

    #[tokio::test]
    async fn test_unknown_connection_is_gone() {
        let hub = ConnectionHub::new();
        assert_eq!(hub.send("nope", OutboundFrame::Pong).await, Err(DeliveryError::Gone));
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_gone() {
        let hub = ConnectionHub::new();
        drop(hub.register("c1"));
        assert_eq!(hub.send("c1", OutboundFrame::Pong).await, Err(DeliveryError::Gone));
    }

    #[tokio::test]
    async fn test_unregister_removes_connection() {
        let hub = ConnectionHub::new();
        let _rx = hub.register("c1");
        assert_eq!(hub.len(), 1);

        hub.unregister("c1");
        assert!(hub.is_empty());
        assert_eq!(hub.send("c1", OutboundFrame::Pong).await, Err(DeliveryError::Gone));
    }
}
