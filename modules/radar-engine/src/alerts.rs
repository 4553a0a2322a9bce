//! Alert dispatcher: exactly one notification per meaningful transition.
//!
//! The fingerprint hashes the transition and the score bands; repeat
//! transitions with the same fingerprint are dropped, and a per-event
//! cooldown throttles everything else. Score crossings alone never alert.

use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use anyhow::Result;
use radar_common::EventStatus;
use radar_store::Store;

pub struct AlertDispatcher {
    store: Store,
    cooldown: Duration,
}

/// Everything that identifies an alert-worthy transition.
#[derive(Debug, Clone)]
pub struct TransitionAlert {
    pub event_id: i64,
    pub previous_status: EventStatus,
    pub new_status: EventStatus,
    pub reason_code: String,
    pub score_plantao: f64,
    pub score_oceano_azul: f64,
}

/// Stable fingerprint: transition identity plus 5-point score bands, so
/// small score drift doesn't re-alert but a regime change does.
pub fn fingerprint(alert: &TransitionAlert) -> String {
    let mut hasher = Sha256::new();
    hasher.update(alert.event_id.to_be_bytes());
    hasher.update(alert.previous_status.as_str().as_bytes());
    hasher.update(alert.new_status.as_str().as_bytes());
    hasher.update(alert.reason_code.as_bytes());
    hasher.update(((alert.score_plantao / 5.0) as i64).to_be_bytes());
    hasher.update(((alert.score_oceano_azul / 5.0) as i64).to_be_bytes());
    format!("{:x}", hasher.finalize())
}

impl AlertDispatcher {
    pub fn new(store: Store, cooldown_secs: i64) -> Self {
        Self {
            store,
            cooldown: Duration::seconds(cooldown_secs),
        }
    }

    /// Dispatch one alert for a state transition, unless deduped or
    /// cooling down. Returns whether an alert went out.
    pub async fn on_transition(&self, alert: TransitionAlert) -> Result<bool> {
        let now = Utc::now();
        let print = fingerprint(&alert);

        if let Some(state) = self.store.alert_state(alert.event_id).await? {
            if let Some(until) = state.cooldown_until {
                if until > now {
                    debug!(event_id = alert.event_id, "alert suppressed by cooldown");
                    return Ok(false);
                }
            }
            if state.last_fingerprint.as_deref() == Some(print.as_str()) {
                debug!(event_id = alert.event_id, "alert suppressed by fingerprint");
                return Ok(false);
            }
        }

        let payload = serde_json::json!({
            "event_id": alert.event_id,
            "previous_status": alert.previous_status.as_str(),
            "new_status": alert.new_status.as_str(),
            "reason_code": alert.reason_code,
            "score_plantao": alert.score_plantao,
            "score_oceano_azul": alert.score_oceano_azul,
            "generated_at": now.to_rfc3339(),
        });

        self.store
            .record_alert(alert.event_id, &print, now + self.cooldown, payload)
            .await?;
        info!(
            event_id = alert.event_id,
            from = alert.previous_status.as_str(),
            to = alert.new_status.as_str(),
            "alert dispatched"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(score: f64) -> TransitionAlert {
        TransitionAlert {
            event_id: 7,
            previous_status: EventStatus::Hydrating,
            new_status: EventStatus::Hot,
            reason_code: "SCORE_THRESHOLD_HOT".to_string(),
            score_plantao: score,
            score_oceano_azul: 10.0,
        }
    }

    #[test]
    fn fingerprint_stable_within_band() {
        assert_eq!(fingerprint(&alert(71.0)), fingerprint(&alert(74.0)));
    }

    #[test]
    fn fingerprint_changes_across_bands() {
        assert_ne!(fingerprint(&alert(71.0)), fingerprint(&alert(96.0)));
    }

    #[test]
    fn fingerprint_changes_with_transition() {
        let a = alert(71.0);
        let mut b = alert(71.0);
        b.new_status = EventStatus::Quarantine;
        b.reason_code = "QUARANTINE_CONTRADICTORY".to_string();
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }
}
