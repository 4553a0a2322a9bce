//! Extraction: raw payload → candidate documents, per strategy.
//!
//! RSS entries become one candidate each with the per-item hash
//! title ∥ link ∥ summary; entries without a resolvable link are
//! discarded. Page strategies hash the clean text. API strategies map
//! JSON per the profile's contract. PDFs go through poppler (OCR only
//! when there is no text layer).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use spider_transformations::transformation::content::{
    transform_content_input, ReturnFormat, TransformConfig, TransformInput,
};
use tracing::{info, warn};

use radar_common::fingerprint::{content_hash, item_hash};
use radar_common::{CandidateDocument, FetchStrategy};

use crate::fetcher::Payload;
use crate::pdf;
use crate::profile::{SourceProfile, SpaApiContract};

/// Clean text shorter than this is treated as extraction failure.
const MIN_CLEAN_TEXT_CHARS: usize = 40;

/// Turn one fetched payload into candidate documents.
pub async fn extract(profile: &SourceProfile, payload: &Payload) -> Result<Vec<CandidateDocument>> {
    let url = profile.fetch_url().unwrap_or_default();
    let candidates = match (profile.strategy, payload) {
        (FetchStrategy::Rss, Payload::Http(bytes)) => extract_rss(bytes)?,
        (FetchStrategy::Html, Payload::Http(bytes)) => extract_html(bytes, url),
        (FetchStrategy::Api | FetchStrategy::SpaApi, Payload::Http(bytes)) => {
            let body: serde_json::Value =
                serde_json::from_slice(bytes).context("api payload is not json")?;
            extract_api(&body, profile.metadata.spa_api_contract.as_ref(), url)
        }
        (FetchStrategy::SpaHeadless, Payload::Render { html, captured }) => {
            extract_headless(html, captured, profile, url)
        }
        (FetchStrategy::Pdf, Payload::Http(bytes)) => extract_pdf(bytes, url).await?,
        (strategy, _) => {
            warn!(%strategy, "payload kind does not match strategy");
            Vec::new()
        }
    };

    let kept: Vec<CandidateDocument> = candidates
        .into_iter()
        .filter(|c| c.clean_text.chars().count() >= MIN_CLEAN_TEXT_CHARS || c.title.is_some())
        .collect();
    info!(
        source = %profile.source_id,
        strategy = %profile.strategy,
        documents = kept.len(),
        "extraction complete"
    );
    Ok(kept)
}

fn extract_rss(bytes: &[u8]) -> Result<Vec<CandidateDocument>> {
    let feed = feed_rs::parser::parse(bytes).context("failed to parse rss/atom feed")?;

    let mut out = Vec::new();
    for entry in feed.entries {
        // Entries without a resolvable link are discarded.
        let Some(link) = entry
            .links
            .first()
            .map(|l| l.href.clone())
            .or_else(|| entry.id.starts_with("http").then(|| entry.id.clone()))
        else {
            continue;
        };

        let title = entry.title.as_ref().map(|t| t.content.clone());
        let summary = entry
            .summary
            .as_ref()
            .map(|s| s.content.clone())
            .or_else(|| {
                entry
                    .content
                    .as_ref()
                    .and_then(|c| c.body.clone())
            })
            .unwrap_or_default();
        let clean_text = strip_tags(&summary);
        let published = entry
            .published
            .or(entry.updated)
            .map(|dt| dt.with_timezone(&Utc));

        let hash = item_hash(title.as_deref().unwrap_or(""), &link, &summary);
        out.push(CandidateDocument {
            url: link,
            canonical_url: None,
            lang: detect_lang(&clean_text),
            title,
            clean_text,
            published_at: published,
            modified_at: None,
            content_hash: hash,
        });
    }
    Ok(out)
}

fn extract_html(bytes: &[u8], url: &str) -> Vec<CandidateDocument> {
    let text = html_to_text(bytes, Some(url));
    if text.trim().is_empty() {
        return Vec::new();
    }
    let html = String::from_utf8_lossy(bytes);
    let candidate = CandidateDocument {
        url: url.to_string(),
        canonical_url: canonical_link(&html),
        title: html_title(&html),
        lang: detect_lang(&text),
        content_hash: content_hash(&text),
        clean_text: text,
        published_at: None,
        modified_at: None,
    };
    vec![candidate]
}

fn extract_api(
    body: &serde_json::Value,
    contract: Option<&SpaApiContract>,
    fallback_url: &str,
) -> Vec<CandidateDocument> {
    let Some(contract) = contract else {
        warn!("api strategy without spa_api_contract, dropping payload");
        return Vec::new();
    };

    let mut items = body;
    for segment in contract.items_path.split('.') {
        if segment.is_empty() {
            continue;
        }
        match items.get(segment) {
            Some(next) => items = next,
            None => return Vec::new(),
        }
    }
    let Some(items) = items.as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let title = item
                .get(&contract.title_key)
                .and_then(|v| v.as_str())
                .map(str::to_string);
            let text = item
                .get(&contract.text_key)
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            let link = item
                .get(&contract.link_key)
                .and_then(|v| v.as_str())
                .unwrap_or(fallback_url);
            if link.is_empty() {
                return None;
            }
            let clean_text = strip_tags(text);
            let published = contract
                .published_key
                .as_ref()
                .and_then(|k| item.get(k))
                .and_then(|v| v.as_str())
                .and_then(parse_timestamp);

            Some(CandidateDocument {
                url: link.to_string(),
                canonical_url: None,
                content_hash: item_hash(title.as_deref().unwrap_or(""), link, text),
                lang: detect_lang(&clean_text),
                title,
                clean_text,
                published_at: published,
                modified_at: None,
            })
        })
        .collect()
}

fn extract_headless(
    html: &str,
    captured: &[String],
    profile: &SourceProfile,
    url: &str,
) -> Vec<CandidateDocument> {
    // Captured payloads are the primary output when a contract says how to
    // read them; the rendered page is the fallback.
    if let Some(contract) = profile.metadata.spa_api_contract.as_ref() {
        let mut out = Vec::new();
        for payload in captured {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(payload) {
                out.extend(extract_api(&value, Some(contract), url));
            }
        }
        if !out.is_empty() {
            return out;
        }
    }
    extract_html(html.as_bytes(), url)
}

async fn extract_pdf(bytes: &[u8], url: &str) -> Result<Vec<CandidateDocument>> {
    let extracted = pdf::extract_text(bytes).await?;
    if extracted.text.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![CandidateDocument {
        url: url.to_string(),
        canonical_url: None,
        title: None,
        lang: detect_lang(&extracted.text),
        content_hash: content_hash(&extracted.text),
        clean_text: extracted.text,
        published_at: None,
        modified_at: None,
    }])
}

/// Readability-based main-content extraction (markdown output).
pub fn html_to_text(html: &[u8], url: Option<&str>) -> String {
    let parsed_url = url.and_then(|u| url::Url::parse(u).ok());
    let config = TransformConfig {
        readability: true,
        main_content: true,
        return_format: ReturnFormat::Markdown,
        filter_images: true,
        filter_svg: true,
        clean_html: true,
    };
    let input = TransformInput {
        url: parsed_url.as_ref(),
        content: html,
        screenshot_bytes: None,
        encoding: None,
        selector_config: None,
        ignore_tags: None,
    };
    transform_content_input(input, &config)
}

/// Minimal tag stripper for feed summaries and API fragments.
fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for ch in input.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn html_title(html: &str) -> Option<String> {
    let open = html.find("<title")?;
    let rest = &html[open..];
    let start = rest.find('>')? + 1;
    let end = rest.find("</title")?;
    if end <= start {
        return None;
    }
    let title = strip_tags(&rest[start..end]);
    (!title.is_empty()).then_some(title)
}

fn canonical_link(html: &str) -> Option<String> {
    let re = regex::Regex::new(
        r#"<link[^>]+rel\s*=\s*["']canonical["'][^>]*href\s*=\s*["']([^"']+)["']"#,
    )
    .expect("valid canonical regex");
    re.captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Cheap stopword-vote language detection: enough to tag pt vs en.
fn detect_lang(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower.split_whitespace().take(200).collect();
    if words.len() < 5 {
        return None;
    }
    let pt = ["de", "da", "do", "que", "para", "com", "não", "uma", "os", "governo"];
    let en = ["the", "of", "and", "to", "in", "that", "for", "with", "was", "government"];
    let pt_hits = words.iter().filter(|w| pt.contains(*w)).count();
    let en_hits = words.iter().filter(|w| en.contains(*w)).count();
    if pt_hits == 0 && en_hits == 0 {
        return None;
    }
    Some(if pt_hits >= en_hits { "pt" } else { "en" }.to_string())
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::HeadlessCapture;
    use radar_common::PoolKind;
    use std::collections::HashMap;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel>
  <title>Diário Oficial</title>
  <item>
    <title>Decreto 11.555/2025 libera recursos</title>
    <link>https://www.in.gov.br/web/dou/decreto-11555</link>
    <description>O decreto libera R$ 4,5 bilhões para obras de saneamento em todo o país.</description>
    <pubDate>Tue, 03 Jun 2025 12:00:00 GMT</pubDate>
  </item>
  <item>
    <title>Item sem link não deve virar documento</title>
    <description>corpo</description>
  </item>
</channel></rss>"#;

    fn profile(strategy: FetchStrategy) -> SourceProfile {
        SourceProfile {
            id: Some(1),
            source_id: "dou".to_string(),
            source_domain: Some("in.gov.br".to_string()),
            tier: 1,
            is_official: true,
            lang: "pt-BR".to_string(),
            pool: PoolKind::Fast,
            strategy,
            endpoints: [("feed".to_string(), "https://in.gov.br/rss".to_string())]
                .into_iter()
                .collect(),
            headers: HashMap::new(),
            cadence: crate::profile::Cadence {
                cron: None,
                interval_seconds: Some(300),
            },
            limits: Default::default(),
            observability: Default::default(),
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn rss_entries_become_candidates_and_linkless_items_drop() {
        let profile = profile(FetchStrategy::Rss);
        let payload = Payload::Http(FEED.as_bytes().to_vec());
        let docs = extract(&profile, &payload).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].url, "https://www.in.gov.br/web/dou/decreto-11555");
        assert!(docs[0].title.as_deref().unwrap().contains("Decreto"));
        assert!(docs[0].published_at.is_some());
    }

    #[tokio::test]
    async fn rss_item_hash_is_stable_per_item() {
        let profile = profile(FetchStrategy::Rss);
        let payload = Payload::Http(FEED.as_bytes().to_vec());
        let first = extract(&profile, &payload).await.unwrap();
        let second = extract(&profile, &payload).await.unwrap();
        assert_eq!(first[0].content_hash, second[0].content_hash);
    }

    #[test]
    fn api_contract_maps_items() {
        let body = serde_json::json!({
            "data": {
                "items": [
                    {"headline": "Portaria nº 12/2025 publicada",
                     "body": "A portaria estabelece novas regras para licitações públicas no país.",
                     "url": "https://example.gov.br/portaria-12",
                     "date": "2025-06-03T12:00:00Z"},
                    {"headline": "Sem link", "body": "x", "url": ""}
                ]
            }
        });
        let contract = SpaApiContract {
            items_path: "data.items".to_string(),
            title_key: "headline".to_string(),
            text_key: "body".to_string(),
            link_key: "url".to_string(),
            published_key: Some("date".to_string()),
        };
        let docs = extract_api(&body, Some(&contract), "https://example.gov.br");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].url, "https://example.gov.br/portaria-12");
        assert!(docs[0].published_at.is_some());
    }

    #[test]
    fn headless_prefers_captured_payloads() {
        let mut p = profile(FetchStrategy::SpaHeadless);
        p.metadata.spa_api_contract = Some(SpaApiContract {
            items_path: "noticias".to_string(),
            title_key: "titulo".to_string(),
            text_key: "texto".to_string(),
            link_key: "link".to_string(),
            published_key: None,
        });
        p.metadata.headless_capture = Some(HeadlessCapture::default());
        let captured = vec![serde_json::json!({
            "noticias": [{
                "titulo": "Operação da PF cumpre mandados",
                "texto": "A Polícia Federal deflagrou operação para apurar desvios em contratos.",
                "link": "https://example.com/operacao"
            }]
        })
        .to_string()];
        let docs = extract_headless("<html><body>fallback</body></html>", &captured, &p, "https://example.com");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].url, "https://example.com/operacao");
    }

    #[test]
    fn strip_tags_flattens_markup() {
        assert_eq!(
            strip_tags("<p>Um <b>decreto</b> foi\npublicado</p>"),
            "Um decreto foi publicado"
        );
    }

    #[test]
    fn detects_portuguese() {
        let text = "O governo anunciou que os recursos para as obras de \
                    infraestrutura não serão contingenciados este ano.";
        assert_eq!(detect_lang(text).as_deref(), Some("pt"));
    }

    #[test]
    fn canonical_link_is_parsed() {
        let html = r#"<head><link rel="canonical" href="https://example.com/a"/></head>"#;
        assert_eq!(canonical_link(html).as_deref(), Some("https://example.com/a"));
    }

    #[test]
    fn title_is_parsed() {
        let html = "<html><head><title>Manchete do dia</title></head></html>";
        assert_eq!(html_title(html).as_deref(), Some("Manchete do dia"));
    }
}
