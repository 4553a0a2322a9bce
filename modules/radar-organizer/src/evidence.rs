//! Evidence features per document, from the anchor set.
//!
//! The score is a monotone weighted sum over distinct anchor values:
//! adding a strong anchor can only raise it. Capped so one gazette annex
//! full of ids doesn't dominate every ranking.

use std::collections::HashSet;

use radar_common::{AnchorHit, AnchorType, EvidenceFeatures};

/// Score cap.
const EVIDENCE_CAP: f64 = 15.0;

fn weight(anchor_type: AnchorType) -> f64 {
    match anchor_type {
        AnchorType::Cnj | AnchorType::Tcu => 2.0,
        AnchorType::Cnpj | AnchorType::Pl => 1.5,
        AnchorType::Sei | AnchorType::Cpf | AnchorType::Pdf => 1.2,
        AnchorType::Ato => 1.0,
        AnchorType::LinkGov => 0.8,
        AnchorType::Valor => 0.5,
        AnchorType::Data | AnchorType::Hora => 0.2,
    }
}

/// Build the evidence feature row for one document.
pub fn compute_evidence(
    anchors: &[AnchorHit],
    source_is_official: bool,
    has_table_like: bool,
) -> EvidenceFeatures {
    let mut score = 0.0;
    let mut seen_values: HashSet<(&str, &str)> = HashSet::new();
    let mut money_count = 0u32;

    for anchor in anchors {
        if anchor.anchor_type == AnchorType::Valor {
            money_count += 1;
        }
        if seen_values.insert((anchor.anchor_type.as_str(), anchor.value.as_str())) {
            score += weight(anchor.anchor_type);
        }
    }

    let has_pdf = anchors.iter().any(|a| a.anchor_type == AnchorType::Pdf);
    let has_gov_link = anchors.iter().any(|a| {
        a.anchor_type == AnchorType::LinkGov
            || (a.anchor_type == AnchorType::Pdf && a.value.contains(".gov"))
    });

    if has_table_like {
        score += 0.5;
    }

    EvidenceFeatures {
        evidence_score: score.min(EVIDENCE_CAP),
        has_pdf,
        has_official_domain: source_is_official || has_gov_link,
        anchors_count: anchors.len() as u32,
        money_count,
        has_table_like,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(anchor_type: AnchorType, value: &str) -> AnchorHit {
        AnchorHit {
            anchor_type,
            value: value.to_string(),
            span: String::new(),
            confidence: 1.0,
        }
    }

    #[test]
    fn adding_a_strong_anchor_never_lowers_the_score() {
        let mut anchors = vec![hit(AnchorType::Valor, "BRL:100.00")];
        let base = compute_evidence(&anchors, false, false).evidence_score;
        for (t, v) in [
            (AnchorType::Cnj, "0001234-56.2025.1.00.0000"),
            (AnchorType::Cnpj, "12345678000195"),
            (AnchorType::Pl, "PL 1234/2025"),
            (AnchorType::Ato, "DECRETO 11.555/2025"),
        ] {
            anchors.push(hit(t, v));
            let with = compute_evidence(&anchors, false, false).evidence_score;
            assert!(with > base, "strong anchor {t} should raise the score");
        }
    }

    #[test]
    fn duplicate_values_count_once() {
        let anchors = vec![
            hit(AnchorType::Cnj, "0001234-56.2025.1.00.0000"),
            hit(AnchorType::Cnj, "0001234-56.2025.1.00.0000"),
        ];
        let single = compute_evidence(&anchors[..1], false, false).evidence_score;
        let double = compute_evidence(&anchors, false, false).evidence_score;
        assert_eq!(single, double);
    }

    #[test]
    fn score_is_capped() {
        let anchors: Vec<AnchorHit> = (0..40)
            .map(|i| hit(AnchorType::Cnj, &format!("000{i:04}-56.2025.1.00.0000")))
            .collect();
        let features = compute_evidence(&anchors, false, false);
        assert_eq!(features.evidence_score, 15.0);
    }

    #[test]
    fn features_reflect_anchor_mix() {
        let anchors = vec![
            hit(AnchorType::Pdf, "https://in.gov.br/decreto.pdf"),
            hit(AnchorType::Valor, "BRL:100.00"),
            hit(AnchorType::Valor, "BRL:200.00"),
        ];
        let features = compute_evidence(&anchors, false, true);
        assert!(features.has_pdf);
        assert!(features.has_official_domain, "gov pdf implies official artefact");
        assert_eq!(features.money_count, 2);
        assert_eq!(features.anchors_count, 3);
        assert!(features.has_table_like);
    }

    #[test]
    fn official_source_sets_official_domain() {
        let features = compute_evidence(&[], true, false);
        assert!(features.has_official_domain);
        assert_eq!(features.evidence_score, 0.0);
    }
}
