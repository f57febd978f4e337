//! Progress publisher
//!
//! Write side of the broker: wraps one event and publishes it on the
//! caller's topic via `pg_notify`. Publish failures are logged and
//! swallowed; the pipeline never fails a claim because a progress
//! message could not be delivered.

use serde_json::json;
use sqlx::PgPool;

use super::{topic_for, ProgressData, ProgressEvent, BROKER_CHANNEL};

#[derive(Clone)]
pub struct ProgressPublisher {
    pool: PgPool,
}

impl ProgressPublisher {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Publish one event on `sse:{channel_id}`.
    pub async fn publish(&self, channel_id: &str, event: &str, data: ProgressData) {
        if let Err(e) = self.try_publish(channel_id, event, data).await {
            tracing::warn!(
                channel_id = %channel_id,
                event = %event,
                error = %e,
                "Failed to publish progress event"
            );
        }
    }

    async fn try_publish(
        &self,
        channel_id: &str,
        event: &str,
        data: ProgressData,
    ) -> Result<(), sqlx::Error> {
        let message = ProgressEvent::now(event, data);
        let payload = json!({
            "topic": topic_for(channel_id),
            "message": message,
        });

        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(BROKER_CHANNEL)
            .bind(payload.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
