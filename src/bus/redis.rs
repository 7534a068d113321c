use async_trait::async_trait;
use deadpool_redis::redis::AsyncCommands;
use deadpool_redis::{Config, Pool, Runtime};
use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use super::{Bus, BusError, BusSubscription};

/// Cross-replica bus backed by Redis Pub/Sub. `publish` always goes through the
/// pool, never directly to a local channel, so replicas never see their own
/// publishes twice. Each `subscribe` call opens its own dedicated connection —
/// Redis's client protocol puts a connection in subscriber mode for its lifetime.
pub struct RedisBus {
    pool: Pool,
    client: deadpool_redis::redis::Client,
}

impl RedisBus {
    pub fn new(url: &str) -> Result<Self, BusError> {
        let cfg = Config::from_url(url);
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| BusError::Connection(e.to_string()))?;
        let client = deadpool_redis::redis::Client::open(url)
            .map_err(|e| BusError::Connection(e.to_string()))?;
        Ok(RedisBus { pool, client })
    }

    pub async fn health_check(&self) -> Result<(), BusError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;
        let _: String = deadpool_redis::redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;
        Ok(())
    }
}

enum Control {
    Unsubscribe(Vec<String>),
}

#[async_trait]
impl Bus for RedisBus {
    async fn subscribe(&self, channels: &[String]) -> Result<Box<dyn BusSubscription>, BusError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;
        for channel in channels {
            pubsub
                .subscribe(channel)
                .await
                .map_err(|e| BusError::Connection(e.to_string()))?;
        }

        let (msg_tx, msg_rx) = mpsc::channel(256);
        let (control_tx, mut control_rx) = mpsc::channel::<Control>(8);
        let (stop_tx, mut stop_rx) = watch::channel(false);

        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => {
                        debug!("redis bus subscription stopped");
                        break;
                    }
                    control = control_rx.recv() => {
                        match control {
                            Some(Control::Unsubscribe(channels)) => {
                                drop(stream);
                                for channel in &channels {
                                    if let Err(e) = pubsub.unsubscribe(channel).await {
                                        warn!(error = %e, channel, "redis unsubscribe failed");
                                    }
                                }
                                stream = pubsub.on_message();
                            }
                            None => break,
                        }
                    }
                    next = stream.next() => {
                        match next {
                            Some(msg) => {
                                let channel: String = msg.get_channel_name().to_string();
                                let payload: Vec<u8> = msg.get_payload_bytes().to_vec();
                                if msg_tx.send(Ok((channel, payload))).await.is_err() {
                                    break;
                                }
                            }
                            None => {
                                let _ = msg_tx.send(Err(BusError::ChannelClosed)).await;
                                break;
                            }
                        }
                    }
                }
            }
        });

        Ok(Box::new(RedisSubscription {
            msg_rx,
            control_tx,
            stop_tx,
        }))
    }

    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), BusError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;
        conn.publish::<_, _, ()>(channel, payload)
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;
        Ok(())
    }
}

pub struct RedisSubscription {
    msg_rx: mpsc::Receiver<Result<(String, Vec<u8>), BusError>>,
    control_tx: mpsc::Sender<Control>,
    stop_tx: watch::Sender<bool>,
}

#[async_trait]
impl BusSubscription for RedisSubscription {
    async fn recv(&mut self) -> Option<Result<(String, Vec<u8>), BusError>> {
        self.msg_rx.recv().await
    }

    async fn ping(&mut self) -> Result<(), BusError> {
        Ok(())
    }

    async fn unsubscribe(&mut self, channels: &[String]) -> Result<(), BusError> {
        self.control_tx
            .send(Control::Unsubscribe(channels.to_vec()))
            .await
            .map_err(|_| BusError::ChannelClosed)
    }

    async fn close(&mut self) {
        let _ = self.stop_tx.send(true);
    }
}
