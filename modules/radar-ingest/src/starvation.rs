//! Yield monitor — detects DATA_STARVATION: transport healthy, useful
//! output collapsed.
//!
//! Per source, useful yield (anchors plus documents with non-zero evidence)
//! is compared against a rolling baseline shaped by a calendar profile.
//! An incident opens when 2xx responses keep arriving while yield sits at
//! zero across the profile's window, and closes when yield returns.

use anyhow::Result;
use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use tracing::{info, warn};

use radar_store::Store;

use crate::registry::ProfileRegistry;

/// Baseline windows to average over when `baseline_rolling` is set.
const BASELINE_WINDOWS: i64 = 7;
/// Expected yield below this never opens an incident: the source was
/// never productive enough for silence to mean anything.
const MIN_EXPECTED_YIELD: f64 = 1.0;

/// Hour-of-day and day-of-week shape for the expected yield.
pub fn calendar_factor(profile: Option<&str>, at: DateTime<Utc>) -> f64 {
    match profile {
        Some("business") => {
            let weekday = at.weekday().number_from_monday();
            let day_factor = if weekday >= 6 { 0.3 } else { 1.0 };
            let hour_factor = match at.hour() {
                6..=21 => 1.0,
                _ => 0.3,
            };
            day_factor * hour_factor
        }
        // Flat profile: gazettes and wire feeds publish around the clock.
        _ => 1.0,
    }
}

/// Pure starvation verdict: healthy transport, zero useful output, and a
/// baseline that says output was expected.
pub fn is_starved(observed: f64, expected: f64, healthy_attempts: i64) -> bool {
    healthy_attempts > 0 && observed <= f64::EPSILON && expected >= MIN_EXPECTED_YIELD
}

pub struct YieldMonitor {
    store: Store,
    registry: ProfileRegistry,
}

impl YieldMonitor {
    pub fn new(store: Store, registry: ProfileRegistry) -> Self {
        Self { store, registry }
    }

    /// One sweep across all enabled sources. Returns how many incidents
    /// were opened.
    pub async fn sweep(&self) -> Result<usize> {
        let now = Utc::now();
        let mut opened = 0usize;

        for (profile, source) in self.registry.enabled_profiles().await? {
            let source_id = profile.id.expect("registry fills id");
            let window_hours = profile.observability.starvation_window_hours as i64;
            let window = Duration::hours(window_hours);

            let healthy = self.store.healthy_attempts_since(source_id, window).await?;
            let observed = self.store.useful_yield_since(source_id, window).await?;

            let baseline = if profile.observability.baseline_rolling {
                let total = self
                    .store
                    .useful_yield_since(source_id, window * (BASELINE_WINDOWS + 1) as i32)
                    .await?;
                (total - observed) / BASELINE_WINDOWS as f64
            } else {
                observed
            };
            let expected =
                baseline * calendar_factor(profile.observability.calendar_profile.as_deref(), now);

            if is_starved(observed, expected, healthy) {
                if !self.store.has_open_starvation_incident(source_id).await? {
                    let id = self
                        .store
                        .open_starvation_incident(source_id, window_hours as i32, observed, expected)
                        .await?;
                    warn!(
                        source_id,
                        domain = %source.domain,
                        incident = id,
                        observed,
                        expected,
                        window_hours,
                        "DATA_STARVATION incident opened"
                    );
                    opened += 1;
                }
            } else if observed > 0.0 {
                let closed = self.store.close_starvation_incidents(source_id).await?;
                if closed > 0 {
                    info!(source_id, closed, "starvation incidents closed, yield recovered");
                }
            }
        }
        Ok(opened)
    }
}
