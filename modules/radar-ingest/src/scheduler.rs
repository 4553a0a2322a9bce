//! Fetch scheduler — decides which sources are due and enqueues one job
//! per source in the pool its profile declares.
//!
//! Decision logic is pure and separately testable; the loop persists the
//! dispatch mark and hands work to the queue. Per-source serialisation is
//! enforced twice: here (active-job check) and by the queue's conditional
//! insert.

use std::collections::HashMap;
use std::str::FromStr;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use radar_common::PoolKind;
use radar_store::Store;

use crate::profile::{Cadence, SourceProfile};
use crate::registry::ProfileRegistry;

/// One planned dispatch.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub source_id: i64,
    pub tier: i32,
    pub pool: PoolKind,
    pub last_dispatched_at: Option<DateTime<Utc>>,
}

/// Whether a source is due under its cadence, measured against the
/// persisted last-dispatch mark.
pub fn is_due(cadence: &Cadence, last_dispatched: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    if let Some(interval) = cadence.interval_seconds {
        return match last_dispatched {
            None => true,
            Some(last) => (now - last).num_seconds() >= interval as i64,
        };
    }

    if let Some(expr) = &cadence.cron {
        // Profiles use 5-field cron; the parser wants a seconds field.
        let with_seconds = format!("0 {expr}");
        let schedule = match cron::Schedule::from_str(&with_seconds) {
            Ok(s) => s,
            Err(e) => {
                warn!(cron = %expr, error = %e, "invalid cron expression, skipping source");
                return false;
            }
        };
        let reference = last_dispatched.unwrap_or(now - Duration::days(1));
        return schedule
            .after(&reference)
            .next()
            .map(|fire| fire <= now)
            .unwrap_or(false);
    }

    // Malformed cadence: err on the side of not overfetching.
    false
}

/// Order simultaneously-due dispatches: Tier-1 first, then the most
/// starved source (oldest dispatch mark) first.
pub fn order_dispatches(mut due: Vec<Dispatch>) -> Vec<Dispatch> {
    due.sort_by(|a, b| {
        a.tier
            .cmp(&b.tier)
            .then_with(|| match (a.last_dispatched_at, b.last_dispatched_at) {
                (None, None) => std::cmp::Ordering::Equal,
                (None, Some(_)) => std::cmp::Ordering::Less,
                (Some(_), None) => std::cmp::Ordering::Greater,
                (Some(x), Some(y)) => x.cmp(&y),
            })
            .then_with(|| a.source_id.cmp(&b.source_id))
    });
    due
}

/// Proportional backpressure. When a pool's queue depth exceeds the
/// high-water mark, only `high_water / depth` of its non-Tier-1 dispatches
/// go through (best-ranked first). Tier-1 sources are throttled last: they
/// only start dropping past three times the mark.
pub fn throttle(
    ordered: Vec<Dispatch>,
    depths: &HashMap<PoolKind, i64>,
    high_water: i64,
) -> Vec<Dispatch> {
    let mut kept = Vec::with_capacity(ordered.len());
    let mut kept_per_pool: HashMap<PoolKind, (usize, usize)> = HashMap::new(); // (tier1, rest)
    let mut seen_per_pool: HashMap<PoolKind, (usize, usize)> = HashMap::new();

    for d in ordered {
        let depth = depths.get(&d.pool).copied().unwrap_or(0);
        if depth <= high_water {
            kept.push(d);
            continue;
        }

        let factor = (high_water as f64 / depth as f64).clamp(0.0, 1.0);
        let seen = seen_per_pool.entry(d.pool).or_insert((0, 0));
        let counts = kept_per_pool.entry(d.pool).or_insert((0, 0));

        if d.tier == 1 {
            seen.0 += 1;
            let allowed = if depth > high_water * 3 {
                (seen.0 as f64 * factor).ceil() as usize
            } else {
                seen.0
            };
            if counts.0 < allowed {
                counts.0 += 1;
                kept.push(d);
            }
        } else {
            seen.1 += 1;
            let allowed = (seen.1 as f64 * factor).ceil() as usize;
            if counts.1 < allowed {
                counts.1 += 1;
                kept.push(d);
            }
        }
    }
    kept
}

/// The dispatch loop.
pub struct Scheduler {
    store: Store,
    registry: ProfileRegistry,
    high_water: i64,
}

impl Scheduler {
    pub fn new(store: Store, registry: ProfileRegistry, high_water: i64) -> Self {
        Self {
            store,
            registry,
            high_water,
        }
    }

    /// One scheduling pass: plan, throttle, enqueue, mark.
    pub async fn tick(&self) -> Result<usize> {
        let now = Utc::now();
        let profiles = self.registry.enabled_profiles().await?;

        let mut due: Vec<(Dispatch, SourceProfile)> = Vec::new();
        let mut skipped_in_flight = 0usize;

        for (profile, source) in profiles {
            let source_id = profile.id.expect("registry fills id");
            if !is_due(&profile.cadence, source.last_dispatched_at, now) {
                continue;
            }
            // A previous job without a terminal outcome means skip. Stale
            // jobs are failed by the reaper after cadence + timeout.
            if self.store.source_has_active_job(source_id).await? {
                skipped_in_flight += 1;
                continue;
            }
            due.push((
                Dispatch {
                    source_id,
                    tier: profile.tier,
                    pool: profile.pool,
                    last_dispatched_at: source.last_dispatched_at,
                },
                profile,
            ));
        }

        let mut depths = HashMap::new();
        for pool in PoolKind::ALL {
            depths.insert(pool, self.store.queue_depth(pool).await?);
        }

        let mut by_id: HashMap<i64, SourceProfile> =
            due.iter().map(|(d, p)| (d.source_id, p.clone())).collect();
        let planned = throttle(
            order_dispatches(due.into_iter().map(|(d, _)| d).collect()),
            &depths,
            self.high_water,
        );

        let mut dispatched = 0usize;
        for dispatch in planned {
            let profile = by_id.remove(&dispatch.source_id).expect("planned from due");
            let payload = serde_json::to_value(&profile)?;
            if self
                .store
                .enqueue_fetch_job(dispatch.pool, dispatch.source_id, &payload)
                .await?
                .is_some()
            {
                self.store.mark_dispatched(dispatch.source_id, now).await?;
                dispatched += 1;
            }
        }

        if dispatched > 0 || skipped_in_flight > 0 {
            info!(dispatched, skipped_in_flight, "scheduler tick complete");
        }
        Ok(dispatched)
    }
}
