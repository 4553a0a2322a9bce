//! The fetcher: one entry point for all strategies.
//!
//! Cross-pool contracts run in a fixed order: SSRF guard, circuit
//! breaker, rate/concurrency preflight, conditional GET, streamed body
//! cap. A `fetch_attempts` row is recorded for every outcome, 304s
//! included.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{info, warn};

use radar_common::fingerprint::content_hash;
use radar_common::{FetchStrategy, RadarError, UrlValidator};
use radar_store::fetches::NewFetchAttempt;
use radar_store::{CounterStore, Store};

use crate::breaker::CircuitBreaker;
use crate::profile::SourceProfile;
use crate::render::RenderClient;

/// What a successful fetch hands to the extractor.
#[derive(Debug)]
pub enum Payload {
    /// Raw HTTP body (RSS, HTML, API, PDF).
    Http(Vec<u8>),
    /// Rendered page: captured JSON payloads first, page HTML as fallback.
    Render {
        html: String,
        captured: Vec<String>,
    },
}

#[derive(Debug)]
pub enum FetchOutcome {
    /// 304, or the server sent nothing new. Zero bytes, no snapshot.
    NotModified,
    /// 2xx body identical to the latest snapshot. No new snapshot.
    Unchanged,
    /// New content: snapshot stored, payload ready for extraction.
    Fetched {
        snapshot_id: i64,
        payload: Payload,
    },
    /// Locally rejected (rate limit, domain concurrency, open breaker).
    /// The job should be parked, not failed.
    Parked { reason: String, backoff: Duration },
    /// Failed attempt. `retryable` follows the error taxonomy.
    Failed {
        error_class: String,
        retryable: bool,
    },
}

pub struct Fetcher {
    client: reqwest::Client,
    validator: UrlValidator,
    counters: Arc<dyn CounterStore>,
    breaker: CircuitBreaker,
    store: Store,
    render: RenderClient,
    blob_dir: PathBuf,
}

impl Fetcher {
    pub fn new(
        store: Store,
        counters: Arc<dyn CounterStore>,
        render: RenderClient,
        blob_dir: PathBuf,
        breaker_threshold: u32,
        breaker_cooldown: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("failed to build fetch HTTP client")?;
        Ok(Self {
            client,
            validator: UrlValidator::new(),
            breaker: CircuitBreaker::new(counters.clone(), breaker_threshold, breaker_cooldown),
            counters,
            store,
            render,
            blob_dir,
        })
    }

    /// Run one fetch for a profile, recording the attempt whatever happens.
    pub async fn fetch(&self, profile: &SourceProfile) -> Result<FetchOutcome> {
        let source_pk = profile
            .id
            .ok_or_else(|| RadarError::Logic(format!("profile {} has no db id", profile.source_id)))?;
        let Some(url) = profile.fetch_url().map(str::to_string) else {
            self.record(profile, "", 0, Some("NoEndpoint"), 0, 0, None).await;
            return Ok(FetchOutcome::Failed {
                error_class: "Content".to_string(),
                retryable: false,
            });
        };

        // SSRF guard runs before anything touches the network.
        if let Err(e) = self.validator.validate_with_dns(&url).await {
            warn!(%url, error = %e, "fetch blocked by ssrf guard");
            self.record(profile, &url, 0, Some(e.class()), 0, 0, None).await;
            return Ok(FetchOutcome::Failed {
                error_class: e.class().to_string(),
                retryable: false,
            });
        }

        // Breaker + rate + concurrency. Parked jobs do not count as
        // attempts against the breaker.
        if let Some((reason, backoff)) = self.preflight(profile, source_pk).await? {
            self.record(profile, &url, 0, Some(reason.as_str()), 0, 0, None).await;
            return Ok(FetchOutcome::Parked { reason, backoff });
        }

        let started = Instant::now();
        let result = self.execute(profile, &url).await;
        let latency_ms = started.elapsed().as_millis() as i64;
        self.release_domain_slot(profile).await;

        match result {
            Ok(Response::NotModified) => {
                self.record(profile, &url, 304, None, latency_ms, 0, None).await;
                self.record_breaker(source_pk, true).await;
                Ok(FetchOutcome::NotModified)
            }
            Ok(Response::Body {
                status,
                bytes,
                headers,
                rendered,
            }) => {
                let hash = match &rendered {
                    Some(r) => content_hash(&r.html),
                    None => content_hash(&String::from_utf8_lossy(&bytes)),
                };
                self.record_breaker(source_pk, true).await;

                if let Some(last) = self.store.latest_snapshot(&url).await? {
                    if last.content_hash == hash {
                        self.record(profile, &url, status, None, latency_ms, bytes.len() as i64, None)
                            .await;
                        info!(%url, "content identical to latest snapshot, skipping extraction");
                        return Ok(FetchOutcome::Unchanged);
                    }
                }

                let snapshot_hash = content_hash(&format!("{url}{hash}"));
                let body_ref = self.write_blob(&snapshot_hash, &bytes, rendered.as_ref()).await;
                let snapshot_id = self
                    .store
                    .insert_snapshot(&url, &hash, &snapshot_hash, headers, body_ref)
                    .await?;
                self.record(
                    profile,
                    &url,
                    status,
                    None,
                    latency_ms,
                    bytes.len() as i64,
                    Some(snapshot_hash),
                )
                .await;

                let payload = match rendered {
                    Some(r) => Payload::Render {
                        html: r.html,
                        captured: r.captured,
                    },
                    None => Payload::Http(bytes),
                };
                Ok(FetchOutcome::Fetched {
                    snapshot_id,
                    payload,
                })
            }
            Err(radar_err) => {
                let status = match &radar_err {
                    RadarError::Http(s) => *s as i32,
                    _ => 0,
                };
                warn!(%url, error = %radar_err, "fetch failed");
                self.record(
                    profile,
                    &url,
                    status,
                    Some(radar_err.class()),
                    latency_ms,
                    0,
                    None,
                )
                .await;
                if radar_err.trips_breaker() {
                    self.record_breaker(source_pk, false).await;
                }
                Ok(FetchOutcome::Failed {
                    error_class: radar_err.class().to_string(),
                    retryable: radar_err.is_retryable(),
                })
            }
        }
    }

    /// Strategy-specific transport.
    async fn execute(&self, profile: &SourceProfile, url: &str) -> Result<Response, RadarError> {
        match profile.strategy {
            FetchStrategy::SpaHeadless => {
                let capture = profile
                    .metadata
                    .headless_capture
                    .clone()
                    .unwrap_or_default();
                let page = self
                    .render
                    .fetch(url, &capture, Duration::from_secs(profile.limits.timeout_seconds))
                    .await
                    .map_err(|e| RadarError::Transport(format!("headless render: {e}")))?;
                if page.html.is_empty() && page.captured.is_empty() {
                    return Err(RadarError::Content("empty rendered page".to_string()));
                }
                let over_cap = page.html.len() as u64 > profile.limits.max_bytes;
                if over_cap {
                    return Err(RadarError::Policy("rendered page exceeds max_bytes".to_string()));
                }
                Ok(Response::Body {
                    status: 200,
                    bytes: page.html.clone().into_bytes(),
                    headers: None,
                    rendered: Some(page),
                })
            }
            _ => self.execute_http(profile, url).await,
        }
    }

    async fn execute_http(&self, profile: &SourceProfile, url: &str) -> Result<Response, RadarError> {
        let overrides = match profile.strategy {
            FetchStrategy::Api | FetchStrategy::SpaApi => {
                profile.metadata.spa_api_request.clone().unwrap_or_default()
            }
            _ => Default::default(),
        };
        let target = overrides.url.as_deref().unwrap_or(url);
        let method = match overrides.method.as_deref() {
            Some("POST") | Some("post") => reqwest::Method::POST,
            _ => reqwest::Method::GET,
        };

        let mut request = self
            .client
            .request(method, target)
            .timeout(Duration::from_secs(profile.limits.timeout_seconds));

        for (k, v) in &profile.headers {
            request = request.header(k.as_str(), v.as_str());
        }
        if let Some(extra) = &overrides.headers {
            for (k, v) in extra {
                request = request.header(k.as_str(), v.as_str());
            }
        }
        if let Some(params) = &overrides.params {
            request = request.query(params);
        }
        if let Some(json) = &overrides.json {
            request = request.json(json);
        }

        // Conditional headers from the latest snapshot for this url.
        if let Ok(Some(last)) = self.store.latest_snapshot(target).await {
            if let Some(headers) = &last.headers {
                if let Some(etag) = headers.get("etag").and_then(|v| v.as_str()) {
                    request = request.header("If-None-Match", etag);
                }
                if let Some(modified) = headers.get("last-modified").and_then(|v| v.as_str()) {
                    request = request.header("If-Modified-Since", modified);
                }
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| RadarError::Transport(e.to_string()))?;
        let status = response.status().as_u16();

        if status == 304 {
            return Ok(Response::NotModified);
        }
        if !(200..300).contains(&status) {
            return Err(RadarError::Http(status));
        }

        // Cap enforced while streaming: oversized bodies are cut off
        // without buffering the rest.
        let headers = snapshot_headers(&response);
        let mut body: Vec<u8> = Vec::new();
        let mut response = response;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| RadarError::Transport(e.to_string()))?
        {
            if body.len() as u64 + chunk.len() as u64 > profile.limits.max_bytes {
                return Err(RadarError::Policy(format!(
                    "body exceeds max_bytes {}",
                    profile.limits.max_bytes
                )));
            }
            body.extend_from_slice(&chunk);
        }

        if body.is_empty() {
            return Err(RadarError::Content("zero-length body".to_string()));
        }

        Ok(Response::Body {
            status: status as i32,
            bytes: body,
            headers: Some(headers),
            rendered: None,
        })
    }

    /// Returns a park reason when the source or domain is over budget.
    async fn preflight(
        &self,
        profile: &SourceProfile,
        source_pk: i64,
    ) -> Result<Option<(String, Duration)>> {
        if self.breaker.is_open(source_pk).await? {
            return Ok(Some(("CircuitOpen".to_string(), self.breaker.cooldown())));
        }

        let bucket = chrono::Utc::now().format("%Y%m%d%H%M");
        let count = self
            .counters
            .incr(
                &format!("radar:rl:{source_pk}:{bucket}"),
                Duration::from_secs(90),
            )
            .await?;
        if count > profile.limits.rate_limit_req_per_min as i64 {
            return Ok(Some(("RateLimited".to_string(), Duration::from_secs(60))));
        }

        let domain = profile.domain();
        if !domain.is_empty() {
            let slots = self
                .counters
                .incr(
                    &format!("radar:cc:{domain}"),
                    Duration::from_secs(profile.limits.timeout_seconds + 5),
                )
                .await?;
            if slots > profile.limits.concurrency_per_domain as i64 {
                self.counters.decr(&format!("radar:cc:{domain}")).await.ok();
                return Ok(Some((
                    "DomainConcurrencyLimited".to_string(),
                    Duration::from_secs(15),
                )));
            }
        }
        Ok(None)
    }

    async fn release_domain_slot(&self, profile: &SourceProfile) {
        let domain = profile.domain();
        if !domain.is_empty() {
            self.counters.decr(&format!("radar:cc:{domain}")).await.ok();
        }
    }

    async fn record_breaker(&self, source_pk: i64, success: bool) {
        if let Err(e) = self.breaker.record(source_pk, success).await {
            warn!(source_pk, error = %e, "breaker bookkeeping failed");
        }
    }

    async fn record(
        &self,
        profile: &SourceProfile,
        url: &str,
        status_code: i32,
        error_class: Option<&str>,
        latency_ms: i64,
        bytes_read: i64,
        snapshot_hash: Option<String>,
    ) {
        let Some(source_id) = profile.id else { return };
        let attempt = NewFetchAttempt {
            source_id,
            url: url.to_string(),
            status_code,
            error_class: error_class.map(str::to_string),
            latency_ms,
            bytes_read,
            pool: profile.pool,
            snapshot_hash,
        };
        if let Err(e) = self.store.record_attempt(attempt).await {
            warn!(source_id, error = %e, "failed to record fetch attempt");
        }
    }

    /// Content-addressed blob under the data dir; returns the relative ref.
    async fn write_blob(
        &self,
        snapshot_hash: &str,
        bytes: &[u8],
        rendered: Option<&crate::render::RenderedPage>,
    ) -> Option<String> {
        let rel = format!("snapshots/{}", snapshot_hash);
        let path = self.blob_dir.join(&rel);
        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!(error = %e, "blob dir create failed, snapshot body not stored");
                return None;
            }
        }
        let data: Vec<u8> = match rendered {
            Some(r) => r.html.clone().into_bytes(),
            None => bytes.to_vec(),
        };
        match tokio::fs::write(&path, data).await {
            Ok(()) => Some(rel),
            Err(e) => {
                warn!(error = %e, "snapshot body write failed");
                None
            }
        }
    }
}

enum Response {
    NotModified,
    Body {
        status: i32,
        bytes: Vec<u8>,
        headers: Option<serde_json::Value>,
        rendered: Option<crate::render::RenderedPage>,
    },
}

fn snapshot_headers(response: &reqwest::Response) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for key in ["etag", "last-modified", "content-type"] {
        if let Some(value) = response.headers().get(key).and_then(|v| v.to_str().ok()) {
            map.insert(key.to_string(), serde_json::Value::String(value.to_string()));
        }
    }
    serde_json::Value::Object(map)
}
