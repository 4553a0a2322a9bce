use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Fetch routing ---

/// Worker pool a fetch job runs on. Each pool has its own concurrency
/// budget and latency expectations; DEEP never blocks the fast path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolKind {
    #[serde(rename = "FAST_POOL")]
    Fast,
    #[serde(rename = "HEAVY_RENDER_POOL")]
    HeavyRender,
    #[serde(rename = "DEEP_EXTRACT_POOL")]
    DeepExtract,
}

impl std::fmt::Display for PoolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolKind::Fast => write!(f, "FAST_POOL"),
            PoolKind::HeavyRender => write!(f, "HEAVY_RENDER_POOL"),
            PoolKind::DeepExtract => write!(f, "DEEP_EXTRACT_POOL"),
        }
    }
}

impl PoolKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "FAST_POOL" => Some(Self::Fast),
            "HEAVY_RENDER_POOL" => Some(Self::HeavyRender),
            "DEEP_EXTRACT_POOL" => Some(Self::DeepExtract),
            _ => None,
        }
    }

    pub const ALL: [PoolKind; 3] = [PoolKind::Fast, PoolKind::HeavyRender, PoolKind::DeepExtract];
}

/// How a source's payload is turned into documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FetchStrategy {
    Rss,
    Html,
    Api,
    SpaApi,
    SpaHeadless,
    Pdf,
}

impl std::fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchStrategy::Rss => write!(f, "RSS"),
            FetchStrategy::Html => write!(f, "HTML"),
            FetchStrategy::Api => write!(f, "API"),
            FetchStrategy::SpaApi => write!(f, "SPA_API"),
            FetchStrategy::SpaHeadless => write!(f, "SPA_HEADLESS"),
            FetchStrategy::Pdf => write!(f, "PDF"),
        }
    }
}

// --- Event lifecycle ---

/// Event status. `Merged`, `Ignored`, `Expired` and `FailedEnrich` are
/// terminal. `Expired` is reached only by timeout; `Ignored` only by
/// explicit editorial action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    New,
    Hydrating,
    PartialEnrich,
    FailedEnrich,
    Quarantine,
    Hot,
    Merged,
    Ignored,
    Expired,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::New => "NEW",
            EventStatus::Hydrating => "HYDRATING",
            EventStatus::PartialEnrich => "PARTIAL_ENRICH",
            EventStatus::FailedEnrich => "FAILED_ENRICH",
            EventStatus::Quarantine => "QUARANTINE",
            EventStatus::Hot => "HOT",
            EventStatus::Merged => "MERGED",
            EventStatus::Ignored => "IGNORED",
            EventStatus::Expired => "EXPIRED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NEW" => Some(Self::New),
            "HYDRATING" => Some(Self::Hydrating),
            "PARTIAL_ENRICH" => Some(Self::PartialEnrich),
            "FAILED_ENRICH" => Some(Self::FailedEnrich),
            "QUARANTINE" => Some(Self::Quarantine),
            "HOT" => Some(Self::Hot),
            "MERGED" => Some(Self::Merged),
            "IGNORED" => Some(Self::Ignored),
            "EXPIRED" => Some(Self::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventStatus::Merged
                | EventStatus::Ignored
                | EventStatus::Expired
                | EventStatus::FailedEnrich
        )
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event-level flag. Set-valued on the event row; `UnverifiedViral` is the
/// velocity override that forces the unverified-draft path in the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventFlag {
    UnverifiedViral,
    SourceBlacklistHit,
    ContradictoryEvidence,
}

impl EventFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventFlag::UnverifiedViral => "UNVERIFIED_VIRAL",
            EventFlag::SourceBlacklistHit => "SOURCE_BLACKLIST_HIT",
            EventFlag::ContradictoryEvidence => "CONTRADICTORY_EVIDENCE",
        }
    }
}

/// Editorial action captured by the feedback sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EditorialAction {
    Ignore,
    Snooze,
    Pautar,
    Merge,
    Split,
    NotNews,
}

impl std::fmt::Display for EditorialAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EditorialAction::Ignore => write!(f, "IGNORE"),
            EditorialAction::Snooze => write!(f, "SNOOZE"),
            EditorialAction::Pautar => write!(f, "PAUTAR"),
            EditorialAction::Merge => write!(f, "MERGE"),
            EditorialAction::Split => write!(f, "SPLIT"),
            EditorialAction::NotNews => write!(f, "NOT_NEWS"),
        }
    }
}

// --- Anchors & evidence ---

/// Deterministic anchor category extracted by the regex pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnchorType {
    Cnpj,
    Cpf,
    Cnj,
    Sei,
    Tcu,
    Pl,
    Ato,
    Valor,
    Data,
    Hora,
    LinkGov,
    Pdf,
}

impl AnchorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnchorType::Cnpj => "CNPJ",
            AnchorType::Cpf => "CPF",
            AnchorType::Cnj => "CNJ",
            AnchorType::Sei => "SEI",
            AnchorType::Tcu => "TCU",
            AnchorType::Pl => "PL",
            AnchorType::Ato => "ATO",
            AnchorType::Valor => "VALOR",
            AnchorType::Data => "DATA",
            AnchorType::Hora => "HORA",
            AnchorType::LinkGov => "LINK_GOV",
            AnchorType::Pdf => "PDF",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CNPJ" => Some(Self::Cnpj),
            "CPF" => Some(Self::Cpf),
            "CNJ" => Some(Self::Cnj),
            "SEI" => Some(Self::Sei),
            "TCU" => Some(Self::Tcu),
            "PL" => Some(Self::Pl),
            "ATO" => Some(Self::Ato),
            "VALOR" => Some(Self::Valor),
            "DATA" => Some(Self::Data),
            "HORA" => Some(Self::Hora),
            "LINK_GOV" => Some(Self::LinkGov),
            "PDF" => Some(Self::Pdf),
            _ => None,
        }
    }

    /// Strong anchors can hard-merge events on an exact `(type, value)` pair.
    pub fn is_strong(&self) -> bool {
        matches!(
            self,
            AnchorType::Cnpj
                | AnchorType::Cnj
                | AnchorType::Sei
                | AnchorType::Tcu
                | AnchorType::Pl
                | AnchorType::Ato
        )
    }

    pub const STRONG: [AnchorType; 6] = [
        AnchorType::Cnpj,
        AnchorType::Cnj,
        AnchorType::Sei,
        AnchorType::Tcu,
        AnchorType::Pl,
        AnchorType::Ato,
    ];
}

impl std::fmt::Display for AnchorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One anchor hit inside a document: normalised value plus the surrounding
/// text span for the evidence pointer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorHit {
    pub anchor_type: AnchorType,
    pub value: String,
    pub span: String,
    pub confidence: f64,
}

/// Per-document evidence summary computed from the anchor set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvidenceFeatures {
    pub evidence_score: f64,
    pub has_pdf: bool,
    pub has_official_domain: bool,
    pub anchors_count: u32,
    pub money_count: u32,
    pub has_table_like: bool,
}

/// An entity surfaced in a document (normalised key + display label).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMention {
    pub entity_key: String,
    pub label: String,
    pub span: String,
}

// --- Extraction output ---

/// A document candidate produced by the extractor, before versioning.
/// `content_hash` is the per-item hash that gates new versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateDocument {
    pub url: String,
    pub canonical_url: Option<String>,
    pub title: Option<String>,
    pub clean_text: String,
    pub lang: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    pub content_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for s in [
            EventStatus::New,
            EventStatus::Hydrating,
            EventStatus::PartialEnrich,
            EventStatus::FailedEnrich,
            EventStatus::Quarantine,
            EventStatus::Hot,
            EventStatus::Merged,
            EventStatus::Ignored,
            EventStatus::Expired,
        ] {
            assert_eq!(EventStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(EventStatus::parse("BOGUS"), None);
    }

    #[test]
    fn terminal_statuses() {
        assert!(EventStatus::Merged.is_terminal());
        assert!(EventStatus::Expired.is_terminal());
        assert!(EventStatus::Ignored.is_terminal());
        assert!(EventStatus::FailedEnrich.is_terminal());
        assert!(!EventStatus::Hot.is_terminal());
        assert!(!EventStatus::Quarantine.is_terminal());
    }

    #[test]
    fn strong_anchor_partition() {
        assert!(AnchorType::Cnj.is_strong());
        assert!(AnchorType::Pl.is_strong());
        assert!(!AnchorType::Valor.is_strong());
        assert!(!AnchorType::LinkGov.is_strong());
        for t in AnchorType::STRONG {
            assert!(t.is_strong());
        }
    }

    #[test]
    fn pool_wire_names() {
        assert_eq!(PoolKind::Fast.to_string(), "FAST_POOL");
        assert_eq!(PoolKind::parse("DEEP_EXTRACT_POOL"), Some(PoolKind::DeepExtract));
        let json = serde_json::to_string(&PoolKind::HeavyRender).unwrap();
        assert_eq!(json, "\"HEAVY_RENDER_POOL\"");
    }

    #[test]
    fn strategy_wire_names() {
        let json = serde_json::to_string(&FetchStrategy::SpaHeadless).unwrap();
        assert_eq!(json, "\"SPA_HEADLESS\"");
        assert_eq!(FetchStrategy::Rss.to_string(), "RSS");
    }
}
