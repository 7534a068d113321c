use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::{Bus, BusError, BusSubscription};

#[derive(Clone)]
struct Envelope {
    channel: String,
    payload: Vec<u8>,
}

/// Single-process fan-out bus: every publish goes onto one broadcast channel; each
/// subscription filters client-side for the channels it cares about. Used when no
/// `BUS_URL` is configured — fan-out is then limited to sessions on this replica.
pub struct MemoryBus {
    sender: broadcast::Sender<Envelope>,
}

impl MemoryBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);
        MemoryBus { sender }
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Bus for MemoryBus {
    async fn subscribe(&self, channels: &[String]) -> Result<Box<dyn BusSubscription>, BusError> {
        Ok(Box::new(MemorySubscription {
            receiver: self.sender.subscribe(),
            channels: Mutex::new(channels.iter().cloned().collect()),
        }))
    }

    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), BusError> {
        let _ = self.sender.send(Envelope {
            channel: channel.to_string(),
            payload: payload.to_vec(),
        });
        Ok(())
    }
}

pub struct MemorySubscription {
    receiver: broadcast::Receiver<Envelope>,
    channels: Mutex<HashSet<String>>,
}

#[async_trait]
impl BusSubscription for MemorySubscription {
    async fn recv(&mut self) -> Option<Result<(String, Vec<u8>), BusError>> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) => {
                    let interested = self.channels.lock().unwrap().contains(&envelope.channel);
                    if interested {
                        return Some(Ok((envelope.channel, envelope.payload)));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    return Some(Err(BusError::Lagged(n)));
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    async fn ping(&mut self) -> Result<(), BusError> {
        Ok(())
    }

    async fn unsubscribe(&mut self, channels: &[String]) -> Result<(), BusError> {
        let mut set = self.channels.lock().unwrap();
        for channel in channels {
            set.remove(channel);
        }
        Ok(())
    }

    async fn close(&mut self) {
        self.channels.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_only_sees_subscribed_channels() {
        let bus = MemoryBus::new();
        let mut sub = bus
            .subscribe(&["room-a".to_string()])
            .await
            .unwrap();

        bus.publish("room-b", b"ignored").await.unwrap();
        bus.publish("room-a", b"hello").await.unwrap();

        let (channel, payload) = sub.recv().await.unwrap().unwrap();
        assert_eq!(channel, "room-a");
        assert_eq!(payload, b"hello");
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery_for_that_channel() {
        let bus = MemoryBus::new();
        let mut sub = bus
            .subscribe(&["room-a".to_string(), "room-b".to_string()])
            .await
            .unwrap();
        sub.unsubscribe(&["room-a".to_string()]).await.unwrap();
        bus.publish("room-a", b"dropped").await.unwrap();
        bus.publish("room-b", b"kept").await.unwrap();

        let (channel, payload) = sub.recv().await.unwrap().unwrap();
        assert_eq!(channel, "room-b");
        assert_eq!(payload, b"kept");
    }
}
