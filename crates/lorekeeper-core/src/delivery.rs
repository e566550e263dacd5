//! StreamingDelivery trait definition.
//!
//! Pushes frames to a specific client connection. Implemented by the
//! server's connection hub in lorekeeper-api.

use lorekeeper_types::error::DeliveryError;
use lorekeeper_types::message::OutboundFrame;

pub trait StreamingDelivery: Send + Sync {
    /// Send one frame to `connection_id`.
    ///
    /// `Err(DeliveryError::Gone)` means the connection no longer exists.
    fn send(
        &self,
        connection_id: &str,
        frame: OutboundFrame,
    ) -> impl std::future::Future<Output = Result<(), DeliveryError>> + Send;
}

impl<T: StreamingDelivery> StreamingDelivery for std::sync::Arc<T> {
    async fn send(&self, connection_id: &str, frame: OutboundFrame) -> Result<(), DeliveryError> {
        self.as_ref().send(connection_id, frame).await
    }
}
