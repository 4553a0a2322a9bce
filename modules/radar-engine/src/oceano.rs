//! SCORE_OCEANO_AZUL — the underreported-leads surface.
//!
//! Deterministic evidence multiplies; Tier-1 silence (coverage lag) adds;
//! the trust penalty shrinks when the evidence is strong, because an
//! official document id speaks for itself.

use radar_common::reasons::{self, ReasonContribution};

const BASE_WEIGHT: f64 = 5.0;
const SCORE_CAP: f64 = 100.0;
/// Evidence at or above this counts as strong.
pub const STRONG_EVIDENCE_FLOOR: f64 = 3.0;

#[derive(Debug, Clone)]
pub struct OceanoInputs {
    pub evidence_score: f64,
    pub has_tier1_coverage: bool,
    /// Minutes since first seen without Tier-1 coverage. None when Tier-1
    /// already covered (no lag boost).
    pub coverage_lag_minutes: Option<f64>,
    pub is_official: bool,
    pub has_pdf_evidence: bool,
    pub trust_penalty: f64,
}

pub fn oceano_score(inputs: &OceanoInputs) -> super::plantao::ScoreBreakdown {
    let mut reasons = Vec::new();

    let evidence_multiplier = 1.0 + inputs.evidence_score / 5.0;
    if inputs.evidence_score >= STRONG_EVIDENCE_FLOOR {
        reasons.push(ReasonContribution::new(
            reasons::OCEANO_EVIDENCE_STRONG,
            inputs.evidence_score,
        ));
    }

    let lag_boost = if inputs.has_tier1_coverage {
        0.0
    } else {
        match inputs.coverage_lag_minutes {
            Some(minutes) => (minutes.max(0.0) / 6.0).min(20.0),
            None => 10.0,
        }
    };
    if lag_boost > 0.0 {
        reasons.push(ReasonContribution::new(
            reasons::OCEANO_COVERAGE_LAG,
            lag_boost,
        ));
    }

    let official_boost = if inputs.is_official { 5.0 } else { 0.0 };
    if inputs.is_official {
        reasons.push(ReasonContribution::new(
            reasons::OCEANO_OFFICIAL_SOURCE,
            official_boost,
        ));
    }

    let pdf_boost = if inputs.has_pdf_evidence { 4.0 } else { 0.0 };
    if inputs.has_pdf_evidence {
        reasons.push(ReasonContribution::new(
            reasons::OCEANO_EVIDENCE_PDF,
            pdf_boost,
        ));
    }

    // Strong evidence shields against the low-trust discount.
    let penalty_factor = if inputs.evidence_score >= STRONG_EVIDENCE_FLOOR {
        0.25
    } else {
        0.6
    };
    let effective_penalty = inputs.trust_penalty.max(0.0) * penalty_factor;
    if effective_penalty > 0.0 && inputs.evidence_score >= STRONG_EVIDENCE_FLOOR {
        reasons.push(ReasonContribution::new(
            reasons::OCEANO_TRUST_PENALTY_REDUCED,
            -effective_penalty,
        ));
    }

    let raw = (BASE_WEIGHT + official_boost + lag_boost + pdf_boost) * evidence_multiplier
        - effective_penalty;
    let score = raw.clamp(0.0, SCORE_CAP);

    super::plantao::ScoreBreakdown {
        score: (score * 100.0).round() / 100.0,
        reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> OceanoInputs {
        OceanoInputs {
            evidence_score: 0.0,
            has_tier1_coverage: false,
            coverage_lag_minutes: None,
            is_official: false,
            has_pdf_evidence: false,
            trust_penalty: 0.0,
        }
    }

    #[test]
    fn more_evidence_never_lowers_the_score() {
        let mut prev = 0.0;
        for evidence in [0.0, 1.0, 3.0, 5.0, 10.0, 15.0] {
            let mut i = inputs();
            i.evidence_score = evidence;
            let score = oceano_score(&i).score;
            assert!(score >= prev, "evidence {evidence}: {score} < {prev}");
            prev = score;
        }
    }

    #[test]
    fn pdf_from_official_gazette_scores_high() {
        let mut i = inputs();
        i.evidence_score = 6.0;
        i.is_official = true;
        i.has_pdf_evidence = true;
        i.coverage_lag_minutes = Some(120.0);
        let breakdown = oceano_score(&i);
        assert!(breakdown.score >= 70.0, "score {}", breakdown.score);
        assert!(breakdown.reasons.iter().any(|r| r.code == "OCEANO_EVIDENCE_PDF"));
        assert!(breakdown.reasons.iter().any(|r| r.code == "OCEANO_COVERAGE_LAG"));
        assert!(breakdown.reasons.iter().any(|r| r.code == "OCEANO_OFFICIAL_SOURCE"));
    }

    #[test]
    fn tier1_coverage_removes_lag_boost() {
        let mut covered = inputs();
        covered.has_tier1_coverage = true;
        covered.coverage_lag_minutes = None;
        let breakdown = oceano_score(&covered);
        assert!(!breakdown.reasons.iter().any(|r| r.code == "OCEANO_COVERAGE_LAG"));
    }

    #[test]
    fn lag_boost_is_capped() {
        let mut i = inputs();
        i.coverage_lag_minutes = Some(100_000.0);
        let lag = oceano_score(&i);
        let boost = lag
            .reasons
            .iter()
            .find(|r| r.code == "OCEANO_COVERAGE_LAG")
            .unwrap()
            .contribution;
        assert!(boost <= 20.0, "lag boost {boost} above cap");
    }

    #[test]
    fn strong_evidence_shrinks_trust_penalty() {
        let mut weak = inputs();
        weak.trust_penalty = 10.0;
        weak.evidence_score = 1.0;

        let mut strong = weak.clone();
        strong.evidence_score = 5.0;

        let weak_out = oceano_score(&weak);
        let strong_out = oceano_score(&strong);
        assert!(strong_out.score > weak_out.score);
        assert!(strong_out
            .reasons
            .iter()
            .any(|r| r.code == "OCEANO_TRUST_PENALTY_REDUCED"));
    }

    #[test]
    fn score_stays_in_bounds() {
        let mut i = inputs();
        i.evidence_score = 15.0;
        i.is_official = true;
        i.has_pdf_evidence = true;
        i.coverage_lag_minutes = Some(10_000.0);
        assert!(oceano_score(&i).score <= 100.0);

        let mut j = inputs();
        j.trust_penalty = 1000.0;
        assert!(oceano_score(&j).score >= 0.0);
    }
}
