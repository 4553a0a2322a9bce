//! State machine rules and action gating, as pure functions.
//!
//! The persistence side (atomic status + history append) lives in the
//! store; everything here decides, nothing here writes.

use chrono::{DateTime, Duration, Utc};

use radar_common::{EditorialAction, EventStatus, PoolKind};

/// Editorial actions gated by status. `DispatchVerified` and
/// `DispatchUnverified` are the draft triggers behind `PAUTAR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatedAction {
    OpenSource,
    CopyLink,
    Monitor,
    Snooze,
    Ignore,
    DispatchVerified,
    DispatchUnverified,
    ManualMerge,
    Split,
}

/// Whether an action is allowed in a status. The gating clock has already
/// run by the time a status is set, so this is a pure table.
pub fn action_allowed(status: EventStatus, action: GatedAction) -> bool {
    use EventStatus::*;
    use GatedAction::*;

    match status {
        Merged => false,
        Ignored | Expired | FailedEnrich => matches!(action, OpenSource | CopyLink),
        Hydrating => matches!(action, OpenSource | CopyLink | Monitor | Snooze | Ignore),
        PartialEnrich => !matches!(action, DispatchVerified),
        Quarantine => matches!(action, OpenSource | CopyLink | Monitor | Snooze | Ignore | Split),
        New | Hot => true,
    }
}

/// Map an editorial feedback action onto the gate table.
pub fn gate_for(action: EditorialAction) -> GatedAction {
    match action {
        EditorialAction::Ignore | EditorialAction::NotNews => GatedAction::Ignore,
        EditorialAction::Snooze => GatedAction::Snooze,
        EditorialAction::Pautar => GatedAction::DispatchUnverified,
        EditorialAction::Merge => GatedAction::ManualMerge,
        EditorialAction::Split => GatedAction::Split,
    }
}

/// Gate timeout for the pool that fed the event.
pub fn gate_timeout(pool: PoolKind, gate_fast_secs: i64, gate_render_secs: i64) -> Duration {
    match pool {
        PoolKind::Fast | PoolKind::DeepExtract => Duration::seconds(gate_fast_secs),
        PoolKind::HeavyRender => Duration::seconds(gate_render_secs),
    }
}

/// HYDRATING past its gate without strong evidence moves to
/// PARTIAL_ENRICH so the UI never blocks indefinitely.
pub fn hydration_timed_out(
    first_seen_at: DateTime<Utc>,
    gate: Duration,
    now: DateTime<Utc>,
) -> bool {
    now - first_seen_at >= gate
}

/// HOT requires crossing the threshold AND at least one strong anchor or
/// a Tier-1 confirmation. Score alone never promotes.
pub fn qualifies_hot(
    score_plantao: f64,
    hot_threshold: f64,
    strong_anchor_count: i64,
    has_tier1: bool,
) -> bool {
    score_plantao >= hot_threshold && (strong_anchor_count > 0 || has_tier1)
}

/// The viral override: extreme velocity without the evidence to match.
/// A flag, not a state; the UI forces the unverified-draft path.
pub fn unverified_viral(
    velocity: f64,
    viral_velocity: f64,
    highest_tier: i32,
    source_count: i64,
    evidence_score: f64,
) -> bool {
    velocity >= viral_velocity
        && (highest_tier == 1 || source_count >= 3 || evidence_score < 1.0)
}

/// Quarantine TTL expiry goes to EXPIRED, never to IGNORED: timeouts and
/// editorial decisions stay distinguishable downstream.
pub fn quarantine_expired(
    entered_at: DateTime<Utc>,
    ttl: Duration,
    now: DateTime<Utc>,
) -> bool {
    now - entered_at >= ttl
}

/// Inactivity horizon for HOT / PARTIAL_ENRICH events.
pub fn inactivity_expired(
    last_seen_at: DateTime<Utc>,
    horizon: Duration,
    now: DateTime<Utc>,
) -> bool {
    now - last_seen_at >= horizon
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hydrating_blocks_drafts_and_merges() {
        assert!(!action_allowed(EventStatus::Hydrating, GatedAction::DispatchVerified));
        assert!(!action_allowed(EventStatus::Hydrating, GatedAction::DispatchUnverified));
        assert!(!action_allowed(EventStatus::Hydrating, GatedAction::ManualMerge));
        assert!(action_allowed(EventStatus::Hydrating, GatedAction::OpenSource));
        assert!(action_allowed(EventStatus::Hydrating, GatedAction::Snooze));
        assert!(action_allowed(EventStatus::Hydrating, GatedAction::Ignore));
    }

    #[test]
    fn partial_enrich_allows_unverified_draft_only() {
        assert!(action_allowed(EventStatus::PartialEnrich, GatedAction::DispatchUnverified));
        assert!(!action_allowed(EventStatus::PartialEnrich, GatedAction::DispatchVerified));
        assert!(action_allowed(EventStatus::PartialEnrich, GatedAction::ManualMerge));
    }

    #[test]
    fn merged_tombstones_refuse_everything() {
        for action in [
            GatedAction::OpenSource,
            GatedAction::Ignore,
            GatedAction::ManualMerge,
            GatedAction::Split,
        ] {
            assert!(!action_allowed(EventStatus::Merged, action));
        }
    }

    #[test]
    fn terminal_states_are_read_only() {
        assert!(action_allowed(EventStatus::Expired, GatedAction::CopyLink));
        assert!(!action_allowed(EventStatus::Expired, GatedAction::ManualMerge));
        assert!(!action_allowed(EventStatus::Ignored, GatedAction::Split));
    }

    #[test]
    fn gate_timeout_boundary_is_inclusive() {
        let now = Utc::now();
        let gate = Duration::seconds(15);
        assert!(hydration_timed_out(now - Duration::seconds(15), gate, now));
        assert!(!hydration_timed_out(now - Duration::seconds(14), gate, now));
    }

    #[test]
    fn render_pool_gets_the_longer_gate() {
        assert_eq!(
            gate_timeout(PoolKind::HeavyRender, 15, 45),
            Duration::seconds(45)
        );
        assert_eq!(gate_timeout(PoolKind::Fast, 15, 45), Duration::seconds(15));
    }

    #[test]
    fn hot_needs_evidence_not_just_score() {
        assert!(!qualifies_hot(95.0, 70.0, 0, false));
        assert!(qualifies_hot(95.0, 70.0, 1, false));
        assert!(qualifies_hot(95.0, 70.0, 0, true));
        assert!(!qualifies_hot(50.0, 70.0, 5, true));
    }

    #[test]
    fn viral_override_requires_extreme_velocity() {
        assert!(unverified_viral(60.0, 50.0, 2, 4, 0.0));
        assert!(unverified_viral(60.0, 50.0, 1, 1, 5.0));
        assert!(unverified_viral(60.0, 50.0, 3, 1, 0.5), "minimal evidence path");
        assert!(!unverified_viral(10.0, 50.0, 1, 10, 0.0));
    }

    #[test]
    fn quarantine_ttl_boundary() {
        let now = Utc::now();
        let ttl = Duration::minutes(15);
        assert!(quarantine_expired(now - Duration::minutes(15), ttl, now));
        assert!(!quarantine_expired(now - Duration::minutes(14), ttl, now));
    }
}
