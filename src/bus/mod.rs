pub mod memory;
pub mod redis;

use async_trait::async_trait;

#[derive(thiserror::Error, Debug, Clone)]
pub enum BusError {
    #[error("channel closed")]
    ChannelClosed,
    #[error("subscriber lagged, {0} messages dropped")]
    Lagged(u64),
    #[error("connection error: {0}")]
    Connection(String),
}

/// Thin contract over an external pub/sub broker. No ordering is required between
/// channels; within a single channel, delivery order matches publish order on the
/// same broker node. At-most-once delivery is acceptable — the bus is not the
/// system of record.
#[async_trait]
pub trait Bus: Send + Sync {
    async fn subscribe(&self, channels: &[String]) -> Result<Box<dyn BusSubscription>, BusError>;
    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), BusError>;
}

#[async_trait]
pub trait BusSubscription: Send {
    /// Yields `(channel, payload)` pairs, or `None` once the subscription is closed.
    async fn recv(&mut self) -> Option<Result<(String, Vec<u8>), BusError>>;

    /// Verifies liveness. Called once at subscribe time per spec.
    async fn ping(&mut self) -> Result<(), BusError>;

    async fn unsubscribe(&mut self, channels: &[String]) -> Result<(), BusError>;

    async fn close(&mut self);
}
