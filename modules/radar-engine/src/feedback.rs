//! Feedback sink: validates, persists, then applies editorial actions.
//!
//! Every action lands as an immutable `feedback_events` row whether or not
//! its side effect goes through; the backtesting pipeline reads them all.

use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};
use tracing::info;

use radar_common::{reasons, EditorialAction, EventStatus, RadarError};
use radar_store::Store;

use crate::engine::EventEngine;
use crate::state;

pub struct FeedbackSink {
    store: Store,
    engine: Arc<EventEngine>,
}

/// What a feedback application did.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedbackOutcome {
    Transitioned(EventStatus),
    Snoozed { minutes: i64 },
    DraftTriggered,
    Merged { into: i64 },
    Split { new_event_id: i64 },
    Recorded,
}

impl FeedbackSink {
    pub fn new(store: Store, engine: Arc<EventEngine>) -> Self {
        Self { store, engine }
    }

    /// Apply one editorial action. Rejects actions the event's current
    /// state does not permit.
    pub async fn apply(
        &self,
        event_id: i64,
        action: EditorialAction,
        payload: serde_json::Value,
        actor: &str,
    ) -> Result<FeedbackOutcome> {
        let event = self
            .store
            .event_by_id(event_id)
            .await?
            .ok_or_else(|| RadarError::Logic(format!("event {event_id} not found")))?;

        let status = event.status();
        if !state::action_allowed(status, state::gate_for(action)) {
            return Err(RadarError::Policy(format!(
                "action {action} not allowed in state {status}"
            ))
            .into());
        }

        self.store
            .insert_feedback(event_id, action, payload.clone(), actor)
            .await?;
        info!(event_id, %action, actor, "editorial feedback recorded");

        match action {
            EditorialAction::Ignore => {
                self.engine
                    .apply_transition(event_id, EventStatus::Ignored, reasons::EDITORIAL_IGNORE)
                    .await?;
                Ok(FeedbackOutcome::Transitioned(EventStatus::Ignored))
            }
            EditorialAction::NotNews => {
                self.engine
                    .apply_transition(event_id, EventStatus::Ignored, reasons::EDITORIAL_NOT_NEWS)
                    .await?;
                Ok(FeedbackOutcome::Transitioned(EventStatus::Ignored))
            }
            EditorialAction::Snooze => {
                // Snooze mutes alerts for a while; the event keeps flowing.
                let minutes = payload
                    .get("minutes")
                    .and_then(|v| v.as_i64())
                    .unwrap_or(60)
                    .clamp(1, 24 * 60);
                let until = Utc::now() + Duration::minutes(minutes);
                self.store.extend_alert_cooldown(event_id, until).await?;
                Ok(FeedbackOutcome::Snoozed { minutes })
            }
            EditorialAction::Pautar => {
                // Draft trigger contract only: record the trigger; the CMS
                // integration consumes it out of band.
                self.store
                    .record_trigger(
                        event_id,
                        "draft-trigger",
                        serde_json::json!({
                            "kind": "DRAFT_REQUESTED",
                            "requested_by": actor,
                            "unverified": event.status() != EventStatus::Hot,
                        }),
                    )
                    .await?;
                Ok(FeedbackOutcome::DraftTriggered)
            }
            EditorialAction::Merge => {
                let target = payload
                    .get("target_event_id")
                    .and_then(|v| v.as_i64())
                    .ok_or_else(|| {
                        RadarError::Policy("MERGE payload needs target_event_id".to_string())
                    })?;
                // Resolve through the target's own pointer before merging:
                // tombstones never chain.
                let canonical = self
                    .store
                    .resolve_canonical(target)
                    .await?
                    .ok_or_else(|| RadarError::Logic(format!("merge target {target} not found")))?;
                let outcome = self
                    .store
                    .merge_events(
                        event_id,
                        canonical.id,
                        reasons::EDITORIAL_MERGE,
                        serde_json::json!({ "actor": actor }),
                    )
                    .await?;
                if outcome.merged {
                    self.engine
                        .apply_merges(std::slice::from_ref(&outcome), reasons::EDITORIAL_MERGE)
                        .await?;
                }
                Ok(FeedbackOutcome::Merged { into: canonical.id })
            }
            EditorialAction::Split => {
                let doc_ids: Vec<i64> = payload
                    .get("doc_ids")
                    .and_then(|v| v.as_array())
                    .map(|a| a.iter().filter_map(|v| v.as_i64()).collect())
                    .unwrap_or_default();
                if doc_ids.is_empty() {
                    return Err(
                        RadarError::Policy("SPLIT payload needs doc_ids".to_string()).into()
                    );
                }
                let outcome = self.store.split_event(event_id, &doc_ids).await?;
                // Both halves change shape; no tombstone is emitted.
                self.engine.rescore(outcome.source_event_id).await?;
                self.engine.rescore(outcome.new_event_id).await?;
                Ok(FeedbackOutcome::Split {
                    new_event_id: outcome.new_event_id,
                })
            }
        }
    }
}
