//! SCORE_PLANTAO — the breaking surface.
//!
//! Velocity, tier weight and source diversity drive it; an exponential
//! decay with a fixed half-life pulls aging events down. Every
//! contribution ships as a stable reason code.

use chrono::{DateTime, Utc};

use radar_common::reasons::{self, ReasonContribution};

const BASE_WEIGHT: f64 = 10.0;
/// Velocity above this adds the spike reason code.
const VELOCITY_SPIKE_FLOOR: f64 = 5.0;

#[derive(Debug, Clone)]
pub struct PlantaoInputs {
    /// Best (lowest) tier among the event's sources.
    pub highest_tier: i32,
    pub has_tier1: bool,
    /// Documents per trailing window plus the window-over-window delta.
    pub velocity: f64,
    pub source_count: i64,
    pub impact_signal: f64,
    pub trust_penalty: f64,
    pub first_seen_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ScoreBreakdown {
    pub score: f64,
    pub reasons: Vec<ReasonContribution>,
}

/// Velocity with its first derivative: the current window count plus how
/// much it grew over the previous window.
pub fn velocity(docs_window: i64, docs_prev_window: i64) -> f64 {
    let current = docs_window as f64;
    let delta = (docs_window - docs_prev_window) as f64;
    current + delta.max(0.0)
}

pub fn plantao_score(
    inputs: &PlantaoInputs,
    decay_half_life_hours: f64,
    now: DateTime<Utc>,
) -> ScoreBreakdown {
    let mut reasons = Vec::new();

    let tier_weight = (4 - inputs.highest_tier).max(1) as f64 * 2.0;
    reasons.push(ReasonContribution::new(reasons::PLANTAO_BASE, BASE_WEIGHT));
    reasons.push(ReasonContribution::new(
        reasons::PLANTAO_TIER_WEIGHT,
        tier_weight,
    ));
    if inputs.has_tier1 {
        reasons.push(ReasonContribution::new(
            reasons::PLANTAO_TIER1_CONFIRMATION,
            2.0,
        ));
    }

    let velocity_boost = inputs.velocity.ln_1p() * 5.0;
    if inputs.velocity > VELOCITY_SPIKE_FLOOR {
        reasons.push(ReasonContribution::new(
            reasons::PLANTAO_VELOCITY_SPIKE,
            velocity_boost,
        ));
    }

    let diversity_boost = (inputs.source_count.max(0) as f64).sqrt() * 3.0;
    if inputs.source_count > 2 {
        reasons.push(ReasonContribution::new(
            reasons::PLANTAO_DIVERSITY,
            diversity_boost,
        ));
    }

    if inputs.impact_signal > 0.0 {
        reasons.push(ReasonContribution::new(
            reasons::PLANTAO_IMPACT,
            inputs.impact_signal,
        ));
    }

    let tier1_boost = if inputs.has_tier1 { 2.0 } else { 0.0 };
    let mut raw = BASE_WEIGHT + tier_weight + tier1_boost + velocity_boost + diversity_boost
        + inputs.impact_signal
        - inputs.trust_penalty;
    if inputs.trust_penalty > 0.0 {
        reasons.push(ReasonContribution::new(
            reasons::TRUST_PENALTY_LOW_TIER,
            -inputs.trust_penalty,
        ));
    }
    raw = raw.max(0.0);

    let age_hours = (now - inputs.first_seen_at).num_seconds().max(0) as f64 / 3600.0;
    let decay = (-age_hours / decay_half_life_hours * std::f64::consts::LN_2).exp();
    if decay < 0.8 {
        reasons.push(ReasonContribution::new(
            reasons::PLANTAO_DECAY,
            raw * (decay - 1.0),
        ));
    }

    ScoreBreakdown {
        score: (raw * decay * 100.0).round() / 100.0,
        reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn inputs() -> PlantaoInputs {
        PlantaoInputs {
            highest_tier: 2,
            has_tier1: false,
            velocity: 0.0,
            source_count: 1,
            impact_signal: 0.0,
            trust_penalty: 0.0,
            first_seen_at: Utc::now(),
        }
    }

    #[test]
    fn velocity_includes_positive_derivative() {
        assert_eq!(velocity(6, 2), 10.0);
        assert_eq!(velocity(2, 6), 2.0, "shrinking windows add nothing");
        assert_eq!(velocity(0, 0), 0.0);
    }

    #[test]
    fn tier1_scores_above_tier3() {
        let now = Utc::now();
        let mut t1 = inputs();
        t1.highest_tier = 1;
        t1.has_tier1 = true;
        let mut t3 = inputs();
        t3.highest_tier = 3;
        let s1 = plantao_score(&t1, 2.0, now).score;
        let s3 = plantao_score(&t3, 2.0, now).score;
        assert!(s1 > s3);
    }

    #[test]
    fn velocity_spike_reason_appears() {
        let now = Utc::now();
        let mut fast = inputs();
        fast.velocity = 12.0;
        let breakdown = plantao_score(&fast, 2.0, now);
        assert!(breakdown
            .reasons
            .iter()
            .any(|r| r.code == "PLANTAO_VELOCITY_SPIKE"));

        let slow = plantao_score(&inputs(), 2.0, now);
        assert!(!slow
            .reasons
            .iter()
            .any(|r| r.code == "PLANTAO_VELOCITY_SPIKE"));
    }

    #[test]
    fn decay_halves_after_half_life() {
        let now = Utc::now();
        let mut fresh = inputs();
        fresh.velocity = 10.0;
        let mut old = fresh.clone();
        old.first_seen_at = now - Duration::hours(2);

        let fresh_score = plantao_score(&fresh, 2.0, now).score;
        let old_score = plantao_score(&old, 2.0, now).score;
        assert!(
            (old_score - fresh_score / 2.0).abs() < 0.5,
            "fresh {fresh_score} old {old_score}"
        );
        let breakdown = plantao_score(&old, 2.0, now);
        assert!(breakdown.reasons.iter().any(|r| r.code == "PLANTAO_DECAY"));
    }

    #[test]
    fn trust_penalty_subtracts_with_reason() {
        let now = Utc::now();
        let mut penalised = inputs();
        penalised.trust_penalty = 5.0;
        let with = plantao_score(&penalised, 2.0, now);
        let without = plantao_score(&inputs(), 2.0, now);
        assert!(with.score < without.score);
        assert!(with
            .reasons
            .iter()
            .any(|r| r.code == "TRUST_PENALTY_LOW_TIER" && r.contribution < 0.0));
    }

    #[test]
    fn score_never_negative() {
        let now = Utc::now();
        let mut p = inputs();
        p.trust_penalty = 1000.0;
        assert!(plantao_score(&p, 2.0, now).score >= 0.0);
    }
}
