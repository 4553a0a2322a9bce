//! Stable reason codes — a closed, append-only vocabulary.
//!
//! Codes explain score contributions and state transitions to clients and
//! to the backtesting pipeline. They are part of the outbound contract:
//! never renamed, never removed, only appended. The registry test locks the
//! full set.

// --- Plantão (breaking) score contributions ---

pub const PLANTAO_BASE: &str = "PLANTAO_BASE";
pub const PLANTAO_TIER_WEIGHT: &str = "PLANTAO_TIER_WEIGHT";
pub const PLANTAO_VELOCITY_SPIKE: &str = "PLANTAO_VELOCITY_SPIKE";
pub const PLANTAO_DIVERSITY: &str = "PLANTAO_DIVERSITY";
pub const PLANTAO_IMPACT: &str = "PLANTAO_IMPACT";
pub const PLANTAO_TIER1_CONFIRMATION: &str = "PLANTAO_TIER1_CONFIRMATION";
pub const PLANTAO_DECAY: &str = "PLANTAO_DECAY";

// --- Oceano Azul (blue ocean) score contributions ---

pub const OCEANO_EVIDENCE_STRONG: &str = "OCEANO_EVIDENCE_STRONG";
pub const OCEANO_EVIDENCE_PDF: &str = "OCEANO_EVIDENCE_PDF";
pub const OCEANO_COVERAGE_LAG: &str = "OCEANO_COVERAGE_LAG";
pub const OCEANO_OFFICIAL_SOURCE: &str = "OCEANO_OFFICIAL_SOURCE";
pub const OCEANO_TRUST_PENALTY_REDUCED: &str = "OCEANO_TRUST_PENALTY_REDUCED";

// --- Shared penalties ---

pub const TRUST_PENALTY_LOW_TIER: &str = "TRUST_PENALTY_LOW_TIER";
pub const TRUST_PENALTY_SINGLE_SOURCE: &str = "TRUST_PENALTY_SINGLE_SOURCE";

// --- State transition reasons ---

pub const EVENT_CREATED: &str = "EVENT_CREATED";
pub const HYDRATION_TIMEOUT_FAST: &str = "HYDRATION_TIMEOUT_FAST";
pub const HYDRATION_TIMEOUT_RENDER: &str = "HYDRATION_TIMEOUT_RENDER";
pub const SCORE_THRESHOLD_HOT: &str = "SCORE_THRESHOLD_HOT";
pub const QUARANTINE_CONTRADICTORY: &str = "QUARANTINE_CONTRADICTORY";
pub const QUARANTINE_BLACKLIST: &str = "QUARANTINE_BLACKLIST";
pub const QUARANTINE_TTL_EXPIRED: &str = "QUARANTINE_TTL_EXPIRED";
pub const INACTIVITY_EXPIRED: &str = "INACTIVITY_EXPIRED";
pub const ENRICH_RETRIES_EXHAUSTED: &str = "ENRICH_RETRIES_EXHAUSTED";
pub const EDITORIAL_IGNORE: &str = "EDITORIAL_IGNORE";
pub const EDITORIAL_SNOOZE: &str = "EDITORIAL_SNOOZE";
pub const EDITORIAL_NOT_NEWS: &str = "EDITORIAL_NOT_NEWS";
pub const EDITORIAL_SPLIT_CREATED: &str = "EDITORIAL_SPLIT_CREATED";
pub const EDITORIAL_SPLIT_SOURCE_UPDATED: &str = "EDITORIAL_SPLIT_SOURCE_UPDATED";

// --- Merge reasons ---

pub const HARD_ANCHOR_MATCH: &str = "HARD_ANCHOR_MATCH";
pub const NEAR_DUPLICATE: &str = "NEAR_DUPLICATE";
pub const SAME_EVENT_LEXICAL: &str = "SAME_EVENT_LEXICAL";
pub const EDITORIAL_MERGE: &str = "EDITORIAL_MERGE";
pub const DEFERRED_CANONICALIZATION: &str = "DEFERRED_CANONICALIZATION";

/// Every registered reason code, in registration order. Append-only.
pub const ALL_REASON_CODES: &[&str] = &[
    PLANTAO_BASE,
    PLANTAO_TIER_WEIGHT,
    PLANTAO_VELOCITY_SPIKE,
    PLANTAO_DIVERSITY,
    PLANTAO_IMPACT,
    PLANTAO_TIER1_CONFIRMATION,
    PLANTAO_DECAY,
    OCEANO_EVIDENCE_STRONG,
    OCEANO_EVIDENCE_PDF,
    OCEANO_COVERAGE_LAG,
    OCEANO_OFFICIAL_SOURCE,
    OCEANO_TRUST_PENALTY_REDUCED,
    TRUST_PENALTY_LOW_TIER,
    TRUST_PENALTY_SINGLE_SOURCE,
    EVENT_CREATED,
    HYDRATION_TIMEOUT_FAST,
    HYDRATION_TIMEOUT_RENDER,
    SCORE_THRESHOLD_HOT,
    QUARANTINE_CONTRADICTORY,
    QUARANTINE_BLACKLIST,
    QUARANTINE_TTL_EXPIRED,
    INACTIVITY_EXPIRED,
    ENRICH_RETRIES_EXHAUSTED,
    EDITORIAL_IGNORE,
    EDITORIAL_SNOOZE,
    EDITORIAL_NOT_NEWS,
    EDITORIAL_SPLIT_CREATED,
    EDITORIAL_SPLIT_SOURCE_UPDATED,
    HARD_ANCHOR_MATCH,
    NEAR_DUPLICATE,
    SAME_EVENT_LEXICAL,
    EDITORIAL_MERGE,
    DEFERRED_CANONICALIZATION,
];

/// A reason code with its numeric contribution to a score.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ReasonContribution {
    pub code: String,
    pub contribution: f64,
}

impl ReasonContribution {
    pub fn new(code: &'static str, contribution: f64) -> Self {
        debug_assert!(
            ALL_REASON_CODES.contains(&code),
            "unregistered reason code: {code}"
        );
        Self {
            code: code.to_string(),
            contribution,
        }
    }
}
