//! Live event broadcast.
//!
//! A per-process hub fans messages out to connected stream handlers;
//! `pg_notify` on the radar channel nudges other replicas. Delivery is
//! best-effort at-most-once; clients reconnect and re-fetch. Per-event
//! ordering comes from serialising sequence assignment per event id.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;
use tracing::debug;

use radar_common::stream::{EventMerged, EventStateChanged, EventUpsert, StreamMessage};
use radar_store::Store;

/// Postgres channel used for cross-process fan-out.
pub const STREAM_CHANNEL: &str = "radar_stream";

/// Hub capacity; slow subscribers lose old messages, by design.
const HUB_CAPACITY: usize = 1024;

pub struct Broadcaster {
    store: Store,
    tx: broadcast::Sender<StreamMessage>,
    /// Next sequence per event. The lock serialises publishes per event.
    seqs: Mutex<HashMap<i64, u64>>,
}

impl Broadcaster {
    pub fn new(store: Store) -> Self {
        let (tx, _) = broadcast::channel(HUB_CAPACITY);
        Self {
            store,
            tx,
            seqs: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe this process's stream handlers.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamMessage> {
        self.tx.subscribe()
    }

    pub async fn publish_upsert(&self, mut upsert: EventUpsert) {
        upsert.seq = self.next_seq(upsert.event_id);
        self.publish(StreamMessage::EventUpsert(upsert)).await;
    }

    pub async fn publish_state_changed(&self, mut msg: EventStateChanged) {
        msg.seq = self.next_seq(msg.event_id);
        self.publish(StreamMessage::EventStateChanged(msg)).await;
    }

    pub async fn publish_merged(&self, mut msg: EventMerged) {
        msg.seq = self.next_seq(msg.from_event_id);
        self.publish(StreamMessage::EventMerged(msg)).await;
    }

    fn next_seq(&self, event_id: i64) -> u64 {
        let mut seqs = self.seqs.lock().expect("seq lock poisoned");
        let seq = seqs.entry(event_id).or_insert(0);
        *seq += 1;
        *seq
    }

    async fn publish(&self, message: StreamMessage) {
        debug!(
            kind = message.kind(),
            event_id = message.event_id(),
            seq = message.seq(),
            "broadcasting"
        );
        // Local hub: an error just means no subscriber is connected.
        let _ = self.tx.send(message.clone());

        // Cross-process nudge through Postgres.
        if let Ok(payload) = serde_json::to_string(&message) {
            self.store.notify(STREAM_CHANNEL, &payload).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_event_sequences_are_independent_and_monotonic() {
        // next_seq is pure bookkeeping; exercise it without a database.
        let seqs: Mutex<HashMap<i64, u64>> = Mutex::new(HashMap::new());
        let mut next = |event_id: i64| {
            let mut s = seqs.lock().unwrap();
            let e = s.entry(event_id).or_insert(0);
            *e += 1;
            *e
        };
        assert_eq!(next(1), 1);
        assert_eq!(next(1), 2);
        assert_eq!(next(2), 1);
        assert_eq!(next(1), 3);
        assert_eq!(next(2), 2);
    }
}
