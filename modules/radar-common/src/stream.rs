//! Outbound live-stream contract.
//!
//! Three message kinds, each carrying the event id and a monotonically
//! increasing per-event sequence number. Delivery is best-effort
//! at-most-once per connection; clients reconnect and re-fetch. Within one
//! event, sequence order matches the persisted history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::reasons::ReasonContribution;
use crate::types::{AnchorHit, EventStatus};

/// Full event projection pushed on create and on every meaningful touch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventUpsert {
    pub event_id: i64,
    pub seq: u64,
    pub status: EventStatus,
    pub summary: Option<String>,
    pub lane: Option<String>,
    pub score_plantao: f64,
    pub score_oceano_azul: f64,
    pub reasons: Vec<ReasonContribution>,
    /// Top-k anchors by confidence, for the evidence chips in the UI.
    pub anchors: Vec<AnchorHit>,
    pub doc_count: u32,
    pub source_count: u32,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub flags: Vec<String>,
}

/// State transition notification, mirroring one history row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventStateChanged {
    pub event_id: i64,
    pub seq: u64,
    pub previous_status: EventStatus,
    pub new_status: EventStatus,
    pub reason_code: String,
    pub changed_at: DateTime<Utc>,
}

/// Tombstone: clients remove `from_event_id` and highlight `to_event_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMerged {
    pub from_event_id: i64,
    pub to_event_id: i64,
    /// Sequence on the `from` event's stream.
    pub seq: u64,
    pub reason_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum StreamMessage {
    #[serde(rename = "EVENT_UPSERT")]
    EventUpsert(EventUpsert),
    #[serde(rename = "EVENT_STATE_CHANGED")]
    EventStateChanged(EventStateChanged),
    #[serde(rename = "EVENT_MERGED")]
    EventMerged(EventMerged),
}

impl StreamMessage {
    /// The event whose per-event ordering this message participates in.
    pub fn event_id(&self) -> i64 {
        match self {
            StreamMessage::EventUpsert(m) => m.event_id,
            StreamMessage::EventStateChanged(m) => m.event_id,
            StreamMessage::EventMerged(m) => m.from_event_id,
        }
    }

    pub fn seq(&self) -> u64 {
        match self {
            StreamMessage::EventUpsert(m) => m.seq,
            StreamMessage::EventStateChanged(m) => m.seq,
            StreamMessage::EventMerged(m) => m.seq,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StreamMessage::EventUpsert(_) => "EVENT_UPSERT",
            StreamMessage::EventStateChanged(_) => "EVENT_STATE_CHANGED",
            StreamMessage::EventMerged(_) => "EVENT_MERGED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_serialization_uses_wire_names() {
        let msg = StreamMessage::EventMerged(EventMerged {
            from_event_id: 2,
            to_event_id: 1,
            seq: 7,
            reason_code: "HARD_ANCHOR_MATCH".to_string(),
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["kind"], "EVENT_MERGED");
        assert_eq!(json["from_event_id"], 2);
        assert_eq!(json["to_event_id"], 1);

        let back: StreamMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind(), "EVENT_MERGED");
        assert_eq!(back.event_id(), 2);
        assert_eq!(back.seq(), 7);
    }

    #[test]
    fn state_changed_round_trip() {
        let msg = StreamMessage::EventStateChanged(EventStateChanged {
            event_id: 5,
            seq: 3,
            previous_status: EventStatus::Hydrating,
            new_status: EventStatus::PartialEnrich,
            reason_code: "HYDRATION_TIMEOUT_FAST".to_string(),
            changed_at: Utc::now(),
        });
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"EVENT_STATE_CHANGED\""));
        assert!(json.contains("\"PARTIAL_ENRICH\""));
        let back: StreamMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_id(), 5);
    }
}
