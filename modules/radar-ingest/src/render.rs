//! Headless rendering for SPA sources.
//!
//! Chromium runs as a subprocess (`--dump-dom`) under a semaphore: each
//! instance is heavy, so concurrency stays low regardless of the render
//! pool's worker count. Asset loading is disabled to keep renders fast.
//!
//! Capture rules from the profile pick JSON payloads embedded in the
//! rendered DOM (state blobs, `application/json` script tags); those are
//! the primary output and the page text is the fallback.

use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::profile::HeadlessCapture;

/// Max concurrent Chromium processes. Each instance is heavy (~100MB+ RSS).
const MAX_CONCURRENT_CHROME: usize = 2;
/// Max retry attempts for transient Chromium failures.
const CHROME_MAX_ATTEMPTS: u32 = 3;
/// Base backoff for Chromium retries. Actual delay is base * 3^attempt + jitter.
const CHROME_RETRY_BASE: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub html: String,
    /// JSON payloads matching the capture rules, largest first.
    pub captured: Vec<String>,
}

pub struct RenderClient {
    semaphore: Semaphore,
    chrome_bin: String,
}

impl RenderClient {
    pub fn new() -> Self {
        let chrome_bin = std::env::var("CHROME_BIN").unwrap_or_else(|_| "chromium".to_string());
        info!(%chrome_bin, "render client initialized (max_concurrent={MAX_CONCURRENT_CHROME})");
        Self {
            semaphore: Semaphore::new(MAX_CONCURRENT_CHROME),
            chrome_bin,
        }
    }

    /// Render a page and apply the capture rules.
    pub async fn fetch(
        &self,
        url: &str,
        capture: &HeadlessCapture,
        timeout: Duration,
    ) -> Result<RenderedPage> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| anyhow::anyhow!("render semaphore closed"))?;

        info!(url, "rendering page");
        let html_bytes = self.run_chrome(url, timeout).await?;
        if html_bytes.is_empty() {
            warn!(url, "empty DOM output");
            return Ok(RenderedPage {
                html: String::new(),
                captured: Vec::new(),
            });
        }

        let html = String::from_utf8_lossy(&html_bytes).into_owned();
        let captured = capture_json_payloads(&html, capture);
        info!(url, bytes = html.len(), captured = captured.len(), "rendered successfully");
        Ok(RenderedPage { html, captured })
    }

    /// Launch Chromium --dump-dom and return raw stdout bytes.
    async fn run_chrome(&self, url: &str, timeout: Duration) -> Result<Vec<u8>> {
        let parsed = url::Url::parse(url).context("invalid render url")?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            anyhow::bail!("only http/https urls can be rendered, got {}", parsed.scheme());
        }

        for attempt in 0..CHROME_MAX_ATTEMPTS {
            let tmp_dir = tempfile::tempdir().context("failed to create temp profile dir")?;

            let result = tokio::time::timeout(
                timeout,
                tokio::process::Command::new(&self.chrome_bin)
                    .args([
                        "--headless",
                        "--no-sandbox",
                        "--disable-gpu",
                        "--disable-dev-shm-usage",
                        "--blink-settings=imagesEnabled=false",
                        &format!("--user-data-dir={}", tmp_dir.path().display()),
                        "--dump-dom",
                        url,
                    ])
                    .output(),
            )
            .await;

            match result {
                Ok(Ok(output)) => {
                    if output.status.success() {
                        if output.stdout.is_empty() && attempt + 1 < CHROME_MAX_ATTEMPTS {
                            warn!(url, attempt = attempt + 1, "chromium returned empty DOM, retrying");
                            retry_backoff(attempt).await;
                            continue;
                        }
                        return Ok(output.stdout);
                    }
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    if is_transient_error(&stderr) && attempt + 1 < CHROME_MAX_ATTEMPTS {
                        retry_backoff(attempt).await;
                        continue;
                    }
                    warn!(url, stderr = %stderr, "chromium exited with error");
                    return Ok(Vec::new());
                }
                Ok(Err(e)) => {
                    let msg = e.to_string();
                    if is_transient_error(&msg) && attempt + 1 < CHROME_MAX_ATTEMPTS {
                        warn!(url, attempt = attempt + 1, error = %e, "chromium launch failed, retrying");
                        retry_backoff(attempt).await;
                        continue;
                    }
                    anyhow::bail!("failed to run chromium for {url}: {e}");
                }
                Err(_) => {
                    if attempt + 1 < CHROME_MAX_ATTEMPTS {
                        warn!(url, attempt = attempt + 1, "chromium timed out, retrying");
                        retry_backoff(attempt).await;
                        continue;
                    }
                    anyhow::bail!("chromium timed out after {timeout:?} for {url}");
                }
            }
        }

        Ok(Vec::new())
    }
}

impl Default for RenderClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Pull JSON blobs out of the rendered DOM: `<script type="application/json">`
/// tags and framework state scripts. Payloads must parse as JSON and match
/// the profile's markers; results are capped per the capture rules.
pub fn capture_json_payloads(html: &str, capture: &HeadlessCapture) -> Vec<String> {
    let mut payloads = Vec::new();

    for candidate in script_bodies(html) {
        let trimmed = candidate.trim();
        if trimmed.len() < 2 || !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
            continue;
        }
        if serde_json::from_str::<serde_json::Value>(trimmed).is_err() {
            continue;
        }
        if !capture.markers.is_empty() && !capture.markers.iter().any(|m| trimmed.contains(m)) {
            continue;
        }
        let mut payload = trimmed.to_string();
        if payload.len() > capture.max_chars_per_payload {
            let mut end = capture.max_chars_per_payload;
            while !payload.is_char_boundary(end) {
                end -= 1;
            }
            payload.truncate(end);
        }
        payloads.push(payload);
        if payloads.len() >= capture.max_payloads {
            break;
        }
    }

    payloads
}

fn script_bodies(html: &str) -> Vec<&str> {
    let mut bodies = Vec::new();
    let mut rest = html;
    while let Some(open) = rest.find("<script") {
        let after_open = &rest[open..];
        let Some(tag_end) = after_open.find('>') else { break };
        let body_start = &after_open[tag_end + 1..];
        let Some(close) = body_start.find("</script") else { break };
        bodies.push(&body_start[..close]);
        rest = &body_start[close..];
    }
    bodies
}

fn is_transient_error(msg: &str) -> bool {
    msg.contains("Cannot fork") || msg.contains("Resource temporarily unavailable")
}

async fn retry_backoff(attempt: u32) {
    let backoff = CHROME_RETRY_BASE * 3u32.pow(attempt);
    let jitter = Duration::from_millis(rand::rng().random_range(0..1000));
    tokio::time::sleep(backoff + jitter).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture_all() -> HeadlessCapture {
        HeadlessCapture {
            markers: Vec::new(),
            max_payloads: 20,
            max_chars_per_payload: 5000,
        }
    }

    #[test]
    fn captures_json_script_tags() {
        let html = r#"
            <html><head>
            <script type="application/json">{"items":[{"title":"Decreto publicado"}]}</script>
            <script>var x = 1;</script>
            </head><body></body></html>
        "#;
        let payloads = capture_json_payloads(html, &capture_all());
        assert_eq!(payloads.len(), 1);
        assert!(payloads[0].contains("Decreto publicado"));
    }

    #[test]
    fn marker_filters_payloads() {
        let html = r#"
            <script type="application/json">{"items":[1,2]}</script>
            <script type="application/json">{"noticias":[{"titulo":"x"}]}</script>
        "#;
        let capture = HeadlessCapture {
            markers: vec!["noticias".to_string()],
            max_payloads: 20,
            max_chars_per_payload: 5000,
        };
        let payloads = capture_json_payloads(html, &capture);
        assert_eq!(payloads.len(), 1);
        assert!(payloads[0].contains("noticias"));
    }

    #[test]
    fn non_json_scripts_are_ignored() {
        let html = "<script>window.__x = {broken</script>";
        assert!(capture_json_payloads(html, &capture_all()).is_empty());
    }

    #[test]
    fn payload_caps_apply() {
        let big = format!("{{\"k\":\"{}\"}}", "a".repeat(10_000));
        let html = format!("<script type=\"application/json\">{big}</script>");
        let capture = HeadlessCapture {
            markers: Vec::new(),
            max_payloads: 1,
            max_chars_per_payload: 100,
        };
        let payloads = capture_json_payloads(&html, &capture);
        assert_eq!(payloads.len(), 1);
        assert!(payloads[0].len() <= 100);
    }
}
