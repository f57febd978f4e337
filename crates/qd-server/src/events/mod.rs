//! Progress events
//!
//! The pipeline reports progress to the uploading client through a
//! publish/subscribe broker. Postgres `NOTIFY`/`LISTEN` is the broker:
//! it is already the only shared infrastructure between server
//! processes, so an event published by a queue worker in one process
//! reaches subscribers connected to any other process.
//!
//! Topics are named `sse:{channelId}` where the channel id is the
//! caller's identity. NOTIFY channels cannot be pattern-matched, so
//! all topics travel over one NOTIFY channel and the hub demultiplexes
//! on the topic carried in the payload.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod hub;
pub mod publisher;

pub use hub::ProgressHub;
pub use publisher::ProgressPublisher;

/// The single NOTIFY channel all progress topics travel over.
pub const BROKER_CHANNEL: &str = "sse_events";

/// Prefix for per-caller topics.
pub const TOPIC_PREFIX: &str = "sse:";

/// Known pipeline phases surfaced to clients.
pub const PHASE_PARSING_XML: &str = "PARSING_XML";
pub const PHASE_INSERTED_XML: &str = "INSERTED_XML";

/// Event name used for all pipeline progress messages.
pub const EVENT_IMPORT_PROGRESS: &str = "import-progress";

/// Payload of one progress event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressData {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_session_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xml1_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ma_lk: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
}

/// One message on a progress topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub event: String,
    pub data: ProgressData,
    /// Wall-clock timestamp, `YYYY-MM-DD HH:mm:ss`
    pub at: String,
}

impl ProgressEvent {
    pub fn now(event: &str, data: ProgressData) -> Self {
        Self {
            event: event.to_string(),
            data,
            at: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

/// Full topic name for a channel id.
pub fn topic_for(channel_id: &str) -> String {
    format!("{}{}", TOPIC_PREFIX, channel_id)
}

/// Channel id for a topic name, if it is a progress topic.
pub fn channel_of(topic: &str) -> Option<&str> {
    topic.strip_prefix(TOPIC_PREFIX).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_round_trip() {
        let topic = topic_for("user-42");
        assert_eq!(topic, "sse:user-42");
        assert_eq!(channel_of(&topic), Some("user-42"));
    }

    #[test]
    fn test_channel_of_rejects_foreign_topics() {
        assert_eq!(channel_of("jobs:1"), None);
        assert_eq!(channel_of("sse:"), None);
    }

    #[test]
    fn test_event_serialization_skips_empty_fields() {
        let event = ProgressEvent::now(
            EVENT_IMPORT_PROGRESS,
            ProgressData {
                success: true,
                phase: Some(PHASE_PARSING_XML.to_string()),
                ma_lk: Some("LK1".to_string()),
                ..Default::default()
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["data"]["phase"], "PARSING_XML");
        assert_eq!(json["data"]["maLk"], "LK1");
        assert!(json["data"].get("xml1Id").is_none());
        // Timestamp has the fixed human-readable shape.
        let at = json["at"].as_str().unwrap();
        assert_eq!(at.len(), 19);
        assert_eq!(&at[4..5], "-");
        assert_eq!(&at[10..11], " ");
    }
}
