//! Source Profile DSL — the per-source ingestion contract.
//!
//! Profiles live in `sources.fetch_policy` as JSON and are validated on
//! load. Canonical database columns (id, tier, is_official, lang, domain)
//! always win over the JSON payload; the registry overlays them.

use std::collections::HashMap;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use radar_common::{FetchStrategy, PoolKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceProfile {
    /// Database id, filled by the registry overlay.
    #[serde(default)]
    pub id: Option<i64>,
    pub source_id: String,
    #[serde(default)]
    pub source_domain: Option<String>,
    pub tier: i32,
    #[serde(default)]
    pub is_official: bool,
    #[serde(default = "default_lang")]
    pub lang: String,
    pub pool: PoolKind,
    pub strategy: FetchStrategy,
    /// Named endpoints: feed | latest | search | api.
    pub endpoints: HashMap<String, String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub cadence: Cadence,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub observability: Observability,
    #[serde(default)]
    pub metadata: Metadata,
}

fn default_lang() -> String {
    "pt-BR".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cadence {
    #[serde(default)]
    pub cron: Option<String>,
    #[serde(default)]
    pub interval_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Limits {
    pub rate_limit_req_per_min: u32,
    pub concurrency_per_domain: u32,
    pub timeout_seconds: u64,
    pub max_bytes: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            rate_limit_req_per_min: 10,
            concurrency_per_domain: 1,
            timeout_seconds: 30,
            max_bytes: 5_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observability {
    pub starvation_window_hours: u32,
    #[serde(default)]
    pub yield_keys: Vec<String>,
    #[serde(default = "default_true")]
    pub baseline_rolling: bool,
    #[serde(default)]
    pub calendar_profile: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for Observability {
    fn default() -> Self {
        Self {
            starvation_window_hours: 24,
            yield_keys: Vec::new(),
            baseline_rolling: true,
            calendar_profile: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    /// Field mapping for API / SPA_API payloads.
    #[serde(default)]
    pub spa_api_contract: Option<SpaApiContract>,
    /// Request overrides for API / SPA_API fetches.
    #[serde(default)]
    pub spa_api_request: Option<SpaApiRequest>,
    /// Capture rules for SPA_HEADLESS renders.
    #[serde(default)]
    pub headless_capture: Option<HeadlessCapture>,
}

/// How to map a JSON payload into documents. `items_path` is a dot path to
/// the item array; the key fields name the item attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpaApiContract {
    pub items_path: String,
    #[serde(default = "default_title_key")]
    pub title_key: String,
    #[serde(default = "default_text_key")]
    pub text_key: String,
    #[serde(default = "default_link_key")]
    pub link_key: String,
    #[serde(default)]
    pub published_key: Option<String>,
}

fn default_title_key() -> String {
    "title".to_string()
}
fn default_text_key() -> String {
    "content".to_string()
}
fn default_link_key() -> String {
    "url".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpaApiRequest {
    #[serde(default)]
    pub url: Option<String>,
    /// GET or POST; anything else falls back to GET.
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<HashMap<String, String>>,
    #[serde(default)]
    pub json: Option<serde_json::Value>,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
}

/// Which JSON payloads in a rendered page count as captured output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadlessCapture {
    /// Substrings a payload must contain to be kept. Empty keeps all.
    #[serde(default)]
    pub markers: Vec<String>,
    #[serde(default = "default_max_payloads")]
    pub max_payloads: usize,
    #[serde(default = "default_max_chars")]
    pub max_chars_per_payload: usize,
}

fn default_max_payloads() -> usize {
    20
}
fn default_max_chars() -> usize {
    5000
}

impl Default for HeadlessCapture {
    fn default() -> Self {
        Self {
            markers: Vec::new(),
            max_payloads: default_max_payloads(),
            max_chars_per_payload: default_max_chars(),
        }
    }
}

impl SourceProfile {
    /// Minimum contract check. Rejected profiles are logged and skipped;
    /// they never halt the scheduler loop.
    pub fn validate(&self) -> Result<()> {
        if self.source_id.trim().is_empty() {
            bail!("source_id is empty");
        }
        if !(1..=3).contains(&self.tier) {
            bail!("tier {} outside 1..3", self.tier);
        }
        if self.endpoints.is_empty() {
            bail!("at least one endpoint must be defined");
        }
        if self.cadence.cron.is_none() && self.cadence.interval_seconds.is_none() {
            bail!("cadence needs cron or interval_seconds");
        }
        if let Some(cron) = &self.cadence.cron {
            if cron.split_whitespace().count() != 5 {
                bail!("cron must have 5 fields: {cron}");
            }
        }
        if let Some(interval) = self.cadence.interval_seconds {
            if interval == 0 {
                bail!("interval_seconds must be positive");
            }
        }
        if self.limits.max_bytes < 1024 {
            bail!("max_bytes below 1 KiB");
        }
        Ok(())
    }

    /// The endpoint a fetch should hit, per strategy.
    pub fn fetch_url(&self) -> Option<&str> {
        let order: &[&str] = match self.strategy {
            FetchStrategy::Api | FetchStrategy::SpaApi => &["api", "latest", "feed"],
            FetchStrategy::Pdf => &["latest", "feed", "api"],
            _ => &["feed", "latest", "api"],
        };
        order
            .iter()
            .find_map(|k| self.endpoints.get(*k))
            .map(String::as_str)
    }

    /// Domain for rate-limit and concurrency keys.
    pub fn domain(&self) -> String {
        if let Some(d) = &self.source_domain {
            return d.to_lowercase();
        }
        self.fetch_url()
            .and_then(|u| url::Url::parse(u).ok())
            .and_then(|u| u.host_str().map(str::to_lowercase))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal(strategy: FetchStrategy, pool: PoolKind) -> SourceProfile {
        SourceProfile {
            id: Some(1),
            source_id: "dou".to_string(),
            source_domain: Some("in.gov.br".to_string()),
            tier: 1,
            is_official: true,
            lang: "pt-BR".to_string(),
            pool,
            strategy,
            endpoints: [("feed".to_string(), "https://in.gov.br/rss".to_string())]
                .into_iter()
                .collect(),
            headers: HashMap::new(),
            cadence: Cadence {
                cron: None,
                interval_seconds: Some(300),
            },
            limits: Limits::default(),
            observability: Observability::default(),
            metadata: Metadata::default(),
        }
    }

    #[test]
    fn valid_minimal_profile() {
        assert!(minimal(FetchStrategy::Rss, PoolKind::Fast).validate().is_ok());
    }

    #[test]
    fn rejects_missing_endpoints() {
        let mut p = minimal(FetchStrategy::Rss, PoolKind::Fast);
        p.endpoints.clear();
        assert!(p.validate().is_err());
    }

    #[test]
    fn rejects_missing_cadence() {
        let mut p = minimal(FetchStrategy::Rss, PoolKind::Fast);
        p.cadence = Cadence::default();
        assert!(p.validate().is_err());
    }

    #[test]
    fn rejects_bad_cron() {
        let mut p = minimal(FetchStrategy::Rss, PoolKind::Fast);
        p.cadence = Cadence {
            cron: Some("*/5 * *".to_string()),
            interval_seconds: None,
        };
        assert!(p.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_tier() {
        let mut p = minimal(FetchStrategy::Rss, PoolKind::Fast);
        p.tier = 4;
        assert!(p.validate().is_err());
    }

    #[test]
    fn rejects_unknown_pool_on_parse() {
        let json = serde_json::json!({
            "source_id": "x",
            "tier": 1,
            "pool": "WARP_POOL",
            "strategy": "RSS",
            "endpoints": {"feed": "https://example.com/rss"},
            "cadence": {"interval_seconds": 60}
        });
        assert!(serde_json::from_value::<SourceProfile>(json).is_err());
    }

    #[test]
    fn rejects_unknown_strategy_on_parse() {
        let json = serde_json::json!({
            "source_id": "x",
            "tier": 1,
            "pool": "FAST_POOL",
            "strategy": "CARRIER_PIGEON",
            "endpoints": {"feed": "https://example.com/rss"},
            "cadence": {"interval_seconds": 60}
        });
        assert!(serde_json::from_value::<SourceProfile>(json).is_err());
    }

    #[test]
    fn fetch_url_prefers_api_for_api_strategies() {
        let mut p = minimal(FetchStrategy::SpaApi, PoolKind::HeavyRender);
        p.endpoints
            .insert("api".to_string(), "https://in.gov.br/api/latest".to_string());
        assert_eq!(p.fetch_url(), Some("https://in.gov.br/api/latest"));
        let p = minimal(FetchStrategy::Rss, PoolKind::Fast);
        assert_eq!(p.fetch_url(), Some("https://in.gov.br/rss"));
    }

    #[test]
    fn domain_falls_back_to_endpoint_host() {
        let mut p = minimal(FetchStrategy::Rss, PoolKind::Fast);
        p.source_domain = None;
        assert_eq!(p.domain(), "in.gov.br");
    }
}
