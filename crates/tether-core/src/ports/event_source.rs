//! EventSource port - the message transport delivering lifecycle events.
//!
//! Delivery is at-least-once: a message that is nacked (or never acked) is
//! delivered again later, possibly out of order.

use async_trait::async_trait;

use crate::domain::{DeliveryTag, InboundMessage, TetherError};

#[async_trait]
pub trait EventSource: Send + Sync {
    /// Route messages from `exchange` to this consumer.
    async fn bind(&self, exchange: &str) -> Result<(), TetherError>;

    /// Open the connection and start receiving.
    async fn connect(&self) -> Result<(), TetherError>;

    /// Wait for the next message; `None` once the source is closed.
    async fn next(&self) -> Option<InboundMessage>;

    /// Mark a message as handled.
    async fn ack(&self, delivery: DeliveryTag) -> Result<(), TetherError>;

    /// Hand a message back for redelivery.
    async fn nack(&self, delivery: DeliveryTag) -> Result<(), TetherError>;

    /// Release the connection.
    async fn close(&self) -> Result<(), TetherError>;
}
