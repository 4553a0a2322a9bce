//! Reason-code registry lock.
//!
//! The registry is append-only: codes are part of the outbound contract and
//! of persisted `reasons` payloads, so renaming or removing one silently
//! breaks clients and backtests. This test pins the exact set that has
//! shipped. Adding a code means appending BOTH to the registry and to the
//! expected list below — never editing existing entries.

use radar_common::reasons::ALL_REASON_CODES;

/// Every code that has ever shipped, in registration order.
const SHIPPED_CODES: &[&str] = &[
    "PLANTAO_BASE",
    "PLANTAO_TIER_WEIGHT",
    "PLANTAO_VELOCITY_SPIKE",
    "PLANTAO_DIVERSITY",
    "PLANTAO_IMPACT",
    "PLANTAO_TIER1_CONFIRMATION",
    "PLANTAO_DECAY",
    "OCEANO_EVIDENCE_STRONG",
    "OCEANO_EVIDENCE_PDF",
    "OCEANO_COVERAGE_LAG",
    "OCEANO_OFFICIAL_SOURCE",
    "OCEANO_TRUST_PENALTY_REDUCED",
    "TRUST_PENALTY_LOW_TIER",
    "TRUST_PENALTY_SINGLE_SOURCE",
    "EVENT_CREATED",
    "HYDRATION_TIMEOUT_FAST",
    "HYDRATION_TIMEOUT_RENDER",
    "SCORE_THRESHOLD_HOT",
    "QUARANTINE_CONTRADICTORY",
    "QUARANTINE_BLACKLIST",
    "QUARANTINE_TTL_EXPIRED",
    "INACTIVITY_EXPIRED",
    "ENRICH_RETRIES_EXHAUSTED",
    "EDITORIAL_IGNORE",
    "EDITORIAL_SNOOZE",
    "EDITORIAL_NOT_NEWS",
    "EDITORIAL_SPLIT_CREATED",
    "EDITORIAL_SPLIT_SOURCE_UPDATED",
    "HARD_ANCHOR_MATCH",
    "NEAR_DUPLICATE",
    "SAME_EVENT_LEXICAL",
    "EDITORIAL_MERGE",
    "DEFERRED_CANONICALIZATION",
];

#[test]
fn every_shipped_code_is_still_registered() {
    for code in SHIPPED_CODES {
        assert!(
            ALL_REASON_CODES.contains(code),
            "shipped reason code {code} was renamed or removed"
        );
    }
}

#[test]
fn registry_is_append_only() {
    // The shipped prefix must be intact and in order; new codes may only
    // appear after it.
    assert!(
        ALL_REASON_CODES.len() >= SHIPPED_CODES.len(),
        "registry shrank below the shipped set"
    );
    for (i, code) in SHIPPED_CODES.iter().enumerate() {
        assert_eq!(
            ALL_REASON_CODES[i], *code,
            "registry order changed at index {i}"
        );
    }
}

#[test]
fn no_duplicate_codes() {
    let mut seen = std::collections::HashSet::new();
    for code in ALL_REASON_CODES {
        assert!(seen.insert(code), "duplicate reason code {code}");
    }
}
