//! End-to-end rule scenarios across the organizer and engine crates,
//! exercised on the pure layers: regex pack → evidence → scores → state
//! rules. No database required.

use chrono::{Duration, Utc};

use radar_common::{AnchorType, EventStatus, PoolKind};
use radar_engine::oceano::{oceano_score, OceanoInputs};
use radar_engine::plantao::{plantao_score, velocity, PlantaoInputs};
use radar_engine::state::{
    action_allowed, gate_timeout, hydration_timed_out, qualifies_hot, unverified_viral,
    GatedAction,
};
use radar_organizer::{compute_evidence, extract_anchors};

const GAZETTE_ARTICLE: &str = "\
O presidente assinou nesta terça-feira o Decreto nº 11.555/2025, que libera \
R$ 4,5 bilhões para obras de saneamento. A íntegra está disponível em \
https://www.in.gov.br/web/dou/-/decreto-11555.pdf e o processo tramita \
sob o número SEI 00123.000456/2025-11.";

// A tier-1 gazette decree should surface on the blue-ocean ranking with
// the PDF-evidence reason attached.
#[test]
fn gazette_decree_ranks_on_blue_ocean() {
    let anchors = extract_anchors(GAZETTE_ARTICLE);

    let act: Vec<_> = anchors
        .iter()
        .filter(|a| a.anchor_type == AnchorType::Ato)
        .collect();
    assert_eq!(act.len(), 1);
    assert_eq!(act[0].value, "DECRETO 11.555/2025");

    let money: Vec<_> = anchors
        .iter()
        .filter(|a| a.anchor_type == AnchorType::Valor)
        .collect();
    assert_eq!(money.len(), 1);
    assert_eq!(money[0].value, "BRL:4500000000.00");

    assert!(anchors.iter().any(|a| a.anchor_type == AnchorType::Pdf));
    assert!(anchors.iter().any(|a| a.anchor_type == AnchorType::LinkGov));
    assert!(anchors.iter().any(|a| a.anchor_type == AnchorType::Sei));

    let features = compute_evidence(&anchors, true, false);
    assert!(features.has_pdf);
    assert!(features.has_official_domain);
    assert!(features.evidence_score >= 3.0, "evidence {}", features.evidence_score);

    let breakdown = oceano_score(&OceanoInputs {
        evidence_score: features.evidence_score,
        has_tier1_coverage: false,
        coverage_lag_minutes: Some(30.0),
        is_official: true,
        has_pdf_evidence: features.has_pdf,
        trust_penalty: 0.0,
    });
    let baseline = oceano_score(&OceanoInputs {
        evidence_score: 0.0,
        has_tier1_coverage: true,
        coverage_lag_minutes: None,
        is_official: false,
        has_pdf_evidence: false,
        trust_penalty: 0.0,
    });
    assert!(breakdown.score >= 30.0, "oceano {}", breakdown.score);
    assert!(
        breakdown.score >= baseline.score * 3.0,
        "gazette {} vs baseline {}",
        breakdown.score,
        baseline.score
    );
    assert!(breakdown.reasons.iter().any(|r| r.code == "OCEANO_EVIDENCE_PDF"));
    assert!(breakdown.reasons.iter().any(|r| r.code == "OCEANO_COVERAGE_LAG"));
}

// Two write-ups of the same lawsuit must normalise to the same judicial
// pair; that pair is what the hard-merge rule keys on.
#[test]
fn shared_judicial_id_normalises_identically() {
    let first = extract_anchors("Ação 0001234-56.2025.1.00.0000 chega ao STF.");
    let second =
        extract_anchors("O processo de número 0001234-56.2025.1.00.0000 teve liminar negada.");

    let key = |anchors: &[radar_common::AnchorHit]| {
        anchors
            .iter()
            .find(|a| a.anchor_type == AnchorType::Cnj)
            .map(|a| (a.anchor_type, a.value.clone()))
    };
    let a = key(&first).expect("first article carries the id");
    let b = key(&second).expect("second article carries the id");
    assert_eq!(a, b);
}

// A viral social-origin event: extreme velocity, no strong anchor, no
// tier-1 confirmation inside the fast gate.
#[test]
fn viral_event_degrades_to_partial_enrich_with_flag() {
    let first_seen = Utc::now() - Duration::seconds(16);
    let now = Utc::now();

    // Gate expired without strong evidence.
    let gate = gate_timeout(PoolKind::Fast, 15, 45);
    assert!(hydration_timed_out(first_seen, gate, now));

    // Velocity is extreme, evidence minimal: the flag goes up.
    let vel = velocity(60, 5);
    assert!(unverified_viral(vel, 50.0, 3, 1, 0.0));

    // Even a huge score cannot reach HOT without a strong anchor or a
    // tier-1 source.
    let breakdown = plantao_score(
        &PlantaoInputs {
            highest_tier: 3,
            has_tier1: false,
            velocity: vel,
            source_count: 1,
            impact_signal: 1.5,
            trust_penalty: 0.0,
            first_seen_at: first_seen,
        },
        2.0,
        now,
    );
    assert!(!qualifies_hot(breakdown.score, 70.0, 0, false));

    // In PARTIAL_ENRICH the verified draft stays off and the unverified
    // path opens up.
    assert!(!action_allowed(EventStatus::PartialEnrich, GatedAction::DispatchVerified));
    assert!(action_allowed(EventStatus::PartialEnrich, GatedAction::DispatchUnverified));
}

// Tier-1 confirmation plus threshold is the legitimate road to HOT.
#[test]
fn tier1_confirmation_reaches_hot() {
    let now = Utc::now();
    let breakdown = plantao_score(
        &PlantaoInputs {
            highest_tier: 1,
            has_tier1: true,
            velocity: velocity(100, 50),
            source_count: 9,
            impact_signal: 9.5,
            trust_penalty: 0.0,
            first_seen_at: now - Duration::minutes(5),
        },
        2.0,
        now,
    );
    assert!(
        qualifies_hot(breakdown.score, 55.0, 2, true),
        "score {} should qualify",
        breakdown.score
    );
}

// The render gate is strictly longer than the fast gate, and both are
// measured from event creation.
#[test]
fn render_gate_outlasts_fast_gate() {
    let fast = gate_timeout(PoolKind::Fast, 15, 45);
    let render = gate_timeout(PoolKind::HeavyRender, 15, 45);
    assert!(render > fast);

    let now = Utc::now();
    let created = now - Duration::seconds(30);
    assert!(hydration_timed_out(created, fast, now));
    assert!(!hydration_timed_out(created, render, now));
}
