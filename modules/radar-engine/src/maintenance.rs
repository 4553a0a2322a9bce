//! Periodic state maintenance: gate timeouts, quarantine TTL, inactivity
//! expiry and exhausted enrichment. The gating clocks are independent of
//! transport timeouts; they start at event creation and drive the state
//! machine, never retries.

use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};
use tracing::info;

use radar_common::reasons;
use radar_common::{EventStatus, PoolKind};
use radar_store::Store;

use crate::engine::EventEngine;
use crate::state;

#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    pub gate_fast_secs: i64,
    pub gate_render_secs: i64,
    pub quarantine_ttl_secs: i64,
    pub inactivity_horizon_secs: i64,
}

pub struct StateMaintenance {
    store: Store,
    engine: Arc<EventEngine>,
    cfg: MaintenanceConfig,
}

impl StateMaintenance {
    pub fn new(store: Store, engine: Arc<EventEngine>, cfg: MaintenanceConfig) -> Self {
        Self { store, engine, cfg }
    }

    /// One sweep. Returns the number of transitions applied.
    pub async fn sweep(&self) -> Result<usize> {
        let now = Utc::now();
        let mut transitioned = 0usize;

        // HYDRATING past its gate → PARTIAL_ENRICH (or FAILED_ENRICH when
        // every enrichment attempt already died).
        for event in self.store.events_in_status(&[EventStatus::Hydrating]).await? {
            let pool = self
                .store
                .event_pool(event.id)
                .await?
                .and_then(|p| PoolKind::parse(&p))
                .unwrap_or(PoolKind::Fast);
            let gate = state::gate_timeout(pool, self.cfg.gate_fast_secs, self.cfg.gate_render_secs);
            if !state::hydration_timed_out(event.first_seen_at, gate, now) {
                continue;
            }

            if self.store.enrichment_exhausted(event.id).await? {
                if self
                    .engine
                    .apply_transition(
                        event.id,
                        EventStatus::FailedEnrich,
                        reasons::ENRICH_RETRIES_EXHAUSTED,
                    )
                    .await?
                {
                    transitioned += 1;
                }
                continue;
            }

            let reason = match pool {
                PoolKind::HeavyRender => reasons::HYDRATION_TIMEOUT_RENDER,
                _ => reasons::HYDRATION_TIMEOUT_FAST,
            };
            if self
                .engine
                .apply_transition(event.id, EventStatus::PartialEnrich, reason)
                .await?
            {
                transitioned += 1;
            }
        }

        // QUARANTINE TTL → EXPIRED. Timeout expiry only; editorial
        // decisions land on IGNORED elsewhere.
        let ttl = Duration::seconds(self.cfg.quarantine_ttl_secs);
        for event in self.store.events_in_status(&[EventStatus::Quarantine]).await? {
            if state::quarantine_expired(event.updated_at, ttl, now)
                && self
                    .engine
                    .apply_transition(event.id, EventStatus::Expired, reasons::QUARANTINE_TTL_EXPIRED)
                    .await?
            {
                transitioned += 1;
            }
        }

        // Inactivity horizon for live surfaces.
        let horizon = Duration::seconds(self.cfg.inactivity_horizon_secs);
        for event in self
            .store
            .events_in_status(&[EventStatus::Hot, EventStatus::PartialEnrich])
            .await?
        {
            if state::inactivity_expired(event.last_seen_at, horizon, now)
                && self
                    .engine
                    .apply_transition(event.id, EventStatus::Expired, reasons::INACTIVITY_EXPIRED)
                    .await?
            {
                transitioned += 1;
            }
        }

        if transitioned > 0 {
            info!(transitioned, "state maintenance sweep complete");
        }
        Ok(transitioned)
    }
}
