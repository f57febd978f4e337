//! Progress hub
//!
//! Read side of the broker. One `PgListener` per process LISTENs on the
//! shared NOTIFY channel; a background task demultiplexes every inbound
//! message to the matching per-channel broadcast stream by the
//! `sse:{channelId}` topic in its payload. Subscribers (typically SSE
//! connections) get a `broadcast::Receiver` per channel; the first
//! subscriber creates the channel and idle channels are dropped once
//! their last receiver is gone.

use serde_json::Value;
use sqlx::postgres::{PgListener, PgPool};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use super::{channel_of, BROKER_CHANNEL};

/// Buffered events per channel before slow subscribers start lagging.
const CHANNEL_CAPACITY: usize = 64;

type ChannelMap = Arc<RwLock<HashMap<String, broadcast::Sender<Value>>>>;

#[derive(Clone)]
pub struct ProgressHub {
    channels: ChannelMap,
}

impl ProgressHub {
    /// Connect a listener and start the demultiplexing task.
    pub async fn start(pool: &PgPool) -> Result<Self, sqlx::Error> {
        let mut listener = PgListener::connect_with(pool).await?;
        listener.listen(BROKER_CHANNEL).await?;
        tracing::info!(channel = BROKER_CHANNEL, "Progress hub listening");

        let channels: ChannelMap = Arc::new(RwLock::new(HashMap::new()));
        tokio::spawn(run_listener(listener, channels.clone()));

        Ok(Self { channels })
    }

    /// Subscribe to a caller's progress stream.
    pub async fn subscribe(&self, channel_id: &str) -> broadcast::Receiver<Value> {
        let mut channels = self.channels.write().await;
        channels
            .entry(channel_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Number of live channels, for introspection and tests.
    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }
}

async fn run_listener(mut listener: PgListener, channels: ChannelMap) {
    loop {
        match listener.recv().await {
            Ok(notification) => {
                dispatch(&channels, notification.payload()).await;
            }
            Err(e) => {
                // PgListener re-establishes its connection on the next
                // recv; just avoid a hot error loop.
                tracing::warn!(error = %e, "Progress hub lost broker connection, retrying");
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        }
    }
}

/// Route one raw broker payload to its channel. Malformed payloads are
/// handled best-effort and never kill the listener task.
async fn dispatch(channels: &ChannelMap, payload: &str) {
    let parsed: Value =
        serde_json::from_str(payload).unwrap_or_else(|_| Value::String(payload.to_string()));

    let Some(topic) = parsed.get("topic").and_then(Value::as_str) else {
        tracing::debug!("Dropping broker message without topic");
        return;
    };
    let Some(channel_id) = channel_of(topic) else {
        return;
    };
    let message = parsed
        .get("message")
        .cloned()
        .unwrap_or_else(|| parsed.clone());

    let mut stale = false;
    {
        let channels = channels.read().await;
        match channels.get(channel_id) {
            Some(sender) if sender.receiver_count() > 0 => {
                // Error only means every receiver vanished mid-send.
                let _ = sender.send(message);
            }
            Some(_) => stale = true,
            None => {}
        }
    }

    if stale {
        let mut channels = channels.write().await;
        if channels
            .get(channel_id)
            .is_some_and(|s| s.receiver_count() == 0)
        {
            channels.remove(channel_id);
            tracing::debug!(channel_id = %channel_id, "Dropped idle progress channel");
        }
    }
}
