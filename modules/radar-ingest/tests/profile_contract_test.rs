//! The full source-profile contract, as an administrator would write it
//! into `sources.fetch_policy`.

use radar_common::{FetchStrategy, PoolKind};
use radar_ingest::SourceProfile;

#[test]
fn full_profile_round_trips() {
    let json = serde_json::json!({
        "source_id": "dou-secao1",
        "source_domain": "in.gov.br",
        "tier": 1,
        "is_official": true,
        "lang": "pt-BR",
        "pool": "FAST_POOL",
        "strategy": "RSS",
        "endpoints": {
            "feed": "https://www.in.gov.br/leiturajornal?secao=do1&rss=true",
            "latest": "https://www.in.gov.br/leiturajornal"
        },
        "headers": {
            "User-Agent": "RadarPautas/0.1 (institutional; newsroom monitoring)"
        },
        "cadence": { "interval_seconds": 300 },
        "limits": {
            "rate_limit_req_per_min": 12,
            "concurrency_per_domain": 2,
            "timeout_seconds": 5,
            "max_bytes": 2_000_000
        },
        "observability": {
            "starvation_window_hours": 6,
            "yield_keys": ["anchors", "documents"],
            "baseline_rolling": true,
            "calendar_profile": "business"
        }
    });

    let profile: SourceProfile = serde_json::from_value(json).unwrap();
    assert!(profile.validate().is_ok());
    assert_eq!(profile.pool, PoolKind::Fast);
    assert_eq!(profile.strategy, FetchStrategy::Rss);
    assert_eq!(profile.limits.max_bytes, 2_000_000);
    assert_eq!(profile.observability.starvation_window_hours, 6);
    assert_eq!(
        profile.observability.calendar_profile.as_deref(),
        Some("business")
    );
    assert_eq!(
        profile.fetch_url(),
        Some("https://www.in.gov.br/leiturajornal?secao=do1&rss=true")
    );

    // Serialise back out: the queue stores the same shape on each job.
    let back = serde_json::to_value(&profile).unwrap();
    assert_eq!(back["pool"], "FAST_POOL");
    assert_eq!(back["strategy"], "RSS");
}

#[test]
fn spa_profile_with_metadata_contracts() {
    let json = serde_json::json!({
        "source_id": "camara-spa",
        "tier": 2,
        "pool": "HEAVY_RENDER_POOL",
        "strategy": "SPA_HEADLESS",
        "endpoints": { "latest": "https://www.camara.leg.br/ultimas-noticias" },
        "cadence": { "cron": "*/10 * * * *" },
        "metadata": {
            "spa_api_contract": {
                "items_path": "props.pageProps.noticias",
                "title_key": "titulo",
                "text_key": "resumo",
                "link_key": "url"
            },
            "headless_capture": {
                "markers": ["noticias"],
                "max_payloads": 10,
                "max_chars_per_payload": 4000
            }
        }
    });

    let profile: SourceProfile = serde_json::from_value(json).unwrap();
    assert!(profile.validate().is_ok());
    assert_eq!(profile.strategy, FetchStrategy::SpaHeadless);
    let capture = profile.metadata.headless_capture.as_ref().unwrap();
    assert_eq!(capture.markers, vec!["noticias"]);
    assert_eq!(capture.max_payloads, 10);
    let contract = profile.metadata.spa_api_contract.as_ref().unwrap();
    assert_eq!(contract.items_path, "props.pageProps.noticias");
    // Defaults fill the keys the contract left out.
    assert!(contract.published_key.is_none());
}

#[test]
fn defaults_cover_omitted_sections() {
    let json = serde_json::json!({
        "source_id": "minimal",
        "tier": 3,
        "pool": "FAST_POOL",
        "strategy": "HTML",
        "endpoints": { "latest": "https://example.com/news" },
        "cadence": { "interval_seconds": 600 }
    });

    let profile: SourceProfile = serde_json::from_value(json).unwrap();
    assert!(profile.validate().is_ok());
    assert_eq!(profile.limits.rate_limit_req_per_min, 10);
    assert_eq!(profile.limits.max_bytes, 5_000_000);
    assert_eq!(profile.observability.starvation_window_hours, 24);
    assert!(profile.observability.baseline_rolling);
    assert_eq!(profile.lang, "pt-BR");
    assert!(!profile.is_official);
}
