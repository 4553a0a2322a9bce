//! Pool workers: claim jobs from the per-pool queue, fetch, extract,
//! version, and hand each new document to the downstream processor
//! (anchors → clustering → scoring run synchronously from there).

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use tracing::{error, info, warn};

use radar_common::fingerprint::simhash64;
use radar_common::PoolKind;
use radar_store::documents::{DocumentRow, VersionOutcome};
use radar_store::queue::FetchJobRow;
use radar_store::Store;

use crate::fetcher::{FetchOutcome, Fetcher};
use crate::profile::SourceProfile;

/// Retry budget per pool. DEEP gets the most attempts because nothing
/// downstream waits on it.
fn attempt_budget(pool: PoolKind) -> i32 {
    match pool {
        PoolKind::Fast => 3,
        PoolKind::HeavyRender => 2,
        PoolKind::DeepExtract => 4,
    }
}

/// How long an idle worker sleeps before polling the queue again.
fn idle_sleep(pool: PoolKind) -> Duration {
    match pool {
        PoolKind::Fast => Duration::from_millis(500),
        PoolKind::HeavyRender => Duration::from_secs(2),
        PoolKind::DeepExtract => Duration::from_secs(5),
    }
}

/// A freshly stored document version with its source context.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub doc: DocumentRow,
    pub source_id: i64,
    pub tier: i32,
    pub is_official: bool,
}

/// Downstream pipeline seam: the organizer/scoring side implements this.
#[async_trait]
pub trait DocumentProcessor: Send + Sync {
    async fn process(&self, new_doc: NewDocument) -> Result<()>;
}

/// Run one pool's workers until the task is aborted.
pub async fn run_pool(
    pool: PoolKind,
    workers: usize,
    store: Store,
    fetcher: Arc<Fetcher>,
    processor: Arc<dyn DocumentProcessor>,
) {
    info!(%pool, workers, "starting pool workers");
    let mut handles = Vec::with_capacity(workers);
    for worker in 0..workers {
        let store = store.clone();
        let fetcher = fetcher.clone();
        let processor = processor.clone();
        handles.push(tokio::spawn(async move {
            worker_loop(pool, worker, store, fetcher, processor).await;
        }));
    }
    for handle in handles {
        let _ = handle.await;
    }
}

async fn worker_loop(
    pool: PoolKind,
    worker: usize,
    store: Store,
    fetcher: Arc<Fetcher>,
    processor: Arc<dyn DocumentProcessor>,
) {
    loop {
        let job = match store.claim_fetch_job(pool).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tokio::time::sleep(idle_sleep(pool)).await;
                continue;
            }
            Err(e) => {
                error!(%pool, worker, error = %e, "queue claim failed, backing off");
                tokio::time::sleep(Duration::from_secs(5)).await;
                continue;
            }
        };

        if let Err(e) = handle_job(&store, &fetcher, &processor, &job).await {
            error!(%pool, job_id = job.id, error = %e, "job handling failed");
            let _ = store
                .finish_fetch_job(job.id, false, Some("Storage"))
                .await;
        }
    }
}

async fn handle_job(
    store: &Store,
    fetcher: &Fetcher,
    processor: &Arc<dyn DocumentProcessor>,
    job: &FetchJobRow,
) -> Result<()> {
    let profile: SourceProfile = match serde_json::from_value(job.profile.clone()) {
        Ok(p) => p,
        Err(e) => {
            warn!(job_id = job.id, error = %e, "job carries an unreadable profile");
            store
                .finish_fetch_job(job.id, false, Some("Content"))
                .await?;
            return Ok(());
        }
    };

    match fetcher.fetch(&profile).await? {
        FetchOutcome::NotModified | FetchOutcome::Unchanged => {
            store.finish_fetch_job(job.id, true, None).await?;
        }
        FetchOutcome::Parked { reason, backoff } => {
            if job.attempt >= attempt_budget(job_pool(job)) {
                store
                    .finish_fetch_job(job.id, false, Some(&reason))
                    .await?;
            } else {
                store
                    .park_fetch_job(job.id, ChronoDuration::seconds(backoff.as_secs() as i64), Some(&reason))
                    .await?;
            }
        }
        FetchOutcome::Failed {
            error_class,
            retryable,
        } => {
            if retryable && job.attempt < attempt_budget(job_pool(job)) {
                let backoff = ChronoDuration::seconds(30 * 2i64.pow(job.attempt as u32));
                store
                    .park_fetch_job(job.id, backoff, Some(&error_class))
                    .await?;
            } else {
                store
                    .finish_fetch_job(job.id, false, Some(&error_class))
                    .await?;
            }
        }
        FetchOutcome::Fetched {
            snapshot_id,
            payload,
        } => {
            let candidates = match crate::extract::extract(&profile, &payload).await {
                Ok(candidates) => candidates,
                Err(e) => {
                    warn!(job_id = job.id, error = %e, "extraction failed, no document created");
                    store.finish_fetch_job(job.id, false, Some("Content")).await?;
                    return Ok(());
                }
            };
            let source_id = profile.id.expect("profile carries db id");
            let mut created = 0usize;
            for candidate in &candidates {
                let fingerprint = simhash64(&candidate.clean_text).map(|h| h as i64);
                match store
                    .upsert_document_version(candidate, fingerprint, Some(snapshot_id), source_id)
                    .await?
                {
                    VersionOutcome::Unchanged { .. } => {}
                    VersionOutcome::Created(doc) => {
                        created += 1;
                        let new_doc = NewDocument {
                            doc,
                            source_id,
                            tier: profile.tier,
                            is_official: profile.is_official,
                        };
                        if let Err(e) = processor.process(new_doc).await {
                            error!(source_id, error = %e, "document processing failed");
                        }
                    }
                }
            }
            info!(
                source = %profile.source_id,
                candidates = candidates.len(),
                created,
                "fetch job complete"
            );
            store.finish_fetch_job(job.id, true, None).await?;
        }
    }
    Ok(())
}

fn job_pool(job: &FetchJobRow) -> PoolKind {
    PoolKind::parse(&job.pool).unwrap_or(PoolKind::Fast)
}
