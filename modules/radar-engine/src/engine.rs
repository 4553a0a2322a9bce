//! Orchestration around one event: recompute scores, drive score-born
//! transitions, keep flags current, and push the upsert to the stream.

use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};
use tracing::{info, warn};

use radar_common::reasons;
use radar_common::stream::{EventMerged, EventStateChanged, EventUpsert};
use radar_common::{EventFlag, EventStatus};
use radar_store::merges::MergeOutcome;
use radar_store::Store;

use crate::alerts::{AlertDispatcher, TransitionAlert};
use crate::broadcast::Broadcaster;
use crate::oceano::{oceano_score, OceanoInputs};
use crate::plantao::{plantao_score, velocity, PlantaoInputs};
use crate::state;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub hot_threshold: f64,
    pub viral_velocity: f64,
    pub decay_half_life_hours: f64,
    pub velocity_window_minutes: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hot_threshold: 55.0,
            viral_velocity: 50.0,
            decay_half_life_hours: 2.0,
            velocity_window_minutes: 30,
        }
    }
}

pub struct EventEngine {
    store: Store,
    broadcaster: Arc<Broadcaster>,
    alerts: AlertDispatcher,
    cfg: EngineConfig,
}

impl EventEngine {
    pub fn new(
        store: Store,
        broadcaster: Arc<Broadcaster>,
        alerts: AlertDispatcher,
        cfg: EngineConfig,
    ) -> Self {
        Self {
            store,
            broadcaster,
            alerts,
            cfg,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Recompute both scores, refresh flags, apply any score-born
    /// transition, and push an upsert. Runs on every event touch.
    pub async fn rescore(&self, event_id: i64) -> Result<()> {
        let Some(event) = self.store.resolve_canonical(event_id).await? else {
            warn!(event_id, "rescore on unknown event");
            return Ok(());
        };
        let event_id = event.id;
        let status = event.status();
        if status == EventStatus::Merged {
            return Ok(());
        }

        let window = Duration::minutes(self.cfg.velocity_window_minutes);
        let stats = self.store.scoring_stats(event_id, window).await?;
        let now = Utc::now();

        let vel = velocity(stats.docs_window, stats.docs_prev_window);

        let mut impact = 0.0;
        if stats.has_official {
            impact += 2.0;
        }
        if stats.max_evidence >= crate::oceano::STRONG_EVIDENCE_FLOOR {
            impact += 2.5;
        }
        if vel >= 3.0 {
            impact += 1.5;
        }
        impact += (stats.source_count as f64 * 0.5).min(4.0);

        let mut trust_penalty = 0.0;
        if !stats.has_official && stats.source_count < 2 {
            trust_penalty += 4.0;
        }
        if !stats.has_tier1 && stats.max_evidence < 1.0 {
            trust_penalty += 3.0;
        }

        let plantao = plantao_score(
            &PlantaoInputs {
                highest_tier: stats.highest_tier,
                has_tier1: stats.has_tier1,
                velocity: vel,
                source_count: stats.source_count,
                impact_signal: impact,
                trust_penalty,
                first_seen_at: event.first_seen_at,
            },
            self.cfg.decay_half_life_hours,
            now,
        );

        let coverage_lag = if stats.has_tier1 {
            None
        } else {
            Some((now - event.first_seen_at).num_seconds().max(0) as f64 / 60.0)
        };
        let oceano = oceano_score(&OceanoInputs {
            evidence_score: stats.max_evidence,
            has_tier1_coverage: stats.has_tier1,
            coverage_lag_minutes: coverage_lag,
            is_official: stats.has_official,
            has_pdf_evidence: stats.has_pdf_evidence,
            trust_penalty,
        });

        let mut all_reasons = plantao.reasons.clone();
        all_reasons.extend(oceano.reasons.clone());
        self.store
            .update_scores(event_id, plantao.score, oceano.score, &all_reasons)
            .await?;

        // Viral flag tracks the current read; other flags stay put.
        let mut flags = event.flag_list();
        let viral = state::unverified_viral(
            vel,
            self.cfg.viral_velocity,
            stats.highest_tier,
            stats.source_count,
            stats.max_evidence,
        );
        let viral_name = EventFlag::UnverifiedViral.as_str().to_string();
        let had_viral = flags.contains(&viral_name);
        if viral && !had_viral {
            flags.push(viral_name);
            self.store.set_flags(event_id, &flags).await?;
        } else if !viral && had_viral {
            flags.retain(|f| f != &viral_name);
            self.store.set_flags(event_id, &flags).await?;
        }

        // HOT needs the threshold plus hard evidence or Tier-1 backing.
        if !status.is_terminal()
            && status != EventStatus::Hot
            && state::qualifies_hot(
                plantao.score,
                self.cfg.hot_threshold,
                stats.strong_anchor_count,
                stats.has_tier1,
            )
        {
            self.apply_transition(event_id, EventStatus::Hot, reasons::SCORE_THRESHOLD_HOT)
                .await?;
        }

        self.push_upsert(event_id).await?;
        Ok(())
    }

    /// Atomic transition + stream + alert. Returns whether the status
    /// actually changed.
    pub async fn apply_transition(
        &self,
        event_id: i64,
        new_status: EventStatus,
        reason_code: &str,
    ) -> Result<bool> {
        let Some(previous) = self
            .store
            .transition_status(event_id, new_status, reason_code)
            .await?
        else {
            return Ok(false);
        };

        let scores = self.store.event_scores(event_id).await?;
        let (p, oa) = scores
            .map(|s| (s.score_plantao, s.score_oceano_azul))
            .unwrap_or((0.0, 0.0));

        self.broadcaster
            .publish_state_changed(EventStateChanged {
                event_id,
                seq: 0,
                previous_status: previous,
                new_status,
                reason_code: reason_code.to_string(),
                changed_at: Utc::now(),
            })
            .await;

        self.alerts
            .on_transition(TransitionAlert {
                event_id,
                previous_status: previous,
                new_status,
                reason_code: reason_code.to_string(),
                score_plantao: p,
                score_oceano_azul: oa,
            })
            .await?;

        info!(event_id, from = previous.as_str(), to = new_status.as_str(), reason_code, "event transitioned");
        Ok(true)
    }

    /// Organizer quarantine signals: union the flags onto the event and
    /// quarantine it unless already terminal.
    pub async fn apply_quarantine(&self, event_id: i64, new_flags: &[EventFlag]) -> Result<()> {
        if new_flags.is_empty() {
            return Ok(());
        }
        let Some(event) = self.store.event_by_id(event_id).await? else {
            return Ok(());
        };
        let mut flags = event.flag_list();
        for flag in new_flags {
            let name = flag.as_str().to_string();
            if !flags.contains(&name) {
                flags.push(name);
            }
        }
        self.store.set_flags(event_id, &flags).await?;

        if !event.status().is_terminal() {
            let reason = if new_flags.contains(&EventFlag::SourceBlacklistHit) {
                reasons::QUARANTINE_BLACKLIST
            } else {
                reasons::QUARANTINE_CONTRADICTORY
            };
            self.apply_transition(event_id, EventStatus::Quarantine, reason)
                .await?;
        }
        Ok(())
    }

    /// Tombstone broadcasts + canonical rescore after a merge sweep or an
    /// editorial merge.
    pub async fn apply_merges(&self, outcomes: &[MergeOutcome], reason_code: &str) -> Result<()> {
        for outcome in outcomes {
            if !outcome.merged {
                continue;
            }
            self.broadcaster
                .publish_merged(EventMerged {
                    from_event_id: outcome.from_event_id,
                    to_event_id: outcome.to_event_id,
                    seq: 0,
                    reason_code: reason_code.to_string(),
                })
                .await;
            self.rescore(outcome.to_event_id).await?;
        }
        Ok(())
    }

    /// Project the event into an EVENT_UPSERT and publish it.
    pub async fn push_upsert(&self, event_id: i64) -> Result<()> {
        let Some(event) = self.store.event_by_id(event_id).await? else {
            return Ok(());
        };
        let scores = self.store.event_scores(event_id).await?;
        let stats = self
            .store
            .scoring_stats(event_id, Duration::minutes(self.cfg.velocity_window_minutes))
            .await?;
        let anchors = self.store.top_anchors(event_id, 8).await?;

        let reasons = scores
            .as_ref()
            .map(|s| serde_json::from_value(s.reasons.clone()).unwrap_or_default())
            .unwrap_or_default();

        self.broadcaster
            .publish_upsert(EventUpsert {
                event_id,
                seq: 0,
                status: event.status(),
                summary: event.summary.clone(),
                lane: event.lane.clone(),
                score_plantao: scores.as_ref().map(|s| s.score_plantao).unwrap_or(0.0),
                score_oceano_azul: scores.as_ref().map(|s| s.score_oceano_azul).unwrap_or(0.0),
                reasons,
                anchors,
                doc_count: stats.doc_count as u32,
                source_count: stats.source_count as u32,
                first_seen_at: event.first_seen_at,
                last_seen_at: event.last_seen_at,
                flags: event.flag_list(),
            })
            .await;
        Ok(())
    }
}
