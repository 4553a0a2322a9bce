use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;

use radar_common::PoolKind;

use crate::Store;

/// One unit of work-in-flight. The queue is the broker: jobs survive
/// restarts and are claimed with SKIP LOCKED so workers never collide.
#[derive(Debug, Clone, FromRow)]
pub struct FetchJobRow {
    pub id: i64,
    pub pool: String,
    pub source_id: i64,
    pub profile: serde_json::Value,
    pub state: String,
    pub attempt: i32,
    pub not_before: DateTime<Utc>,
    pub enqueued_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_class: Option<String>,
}

impl Store {
    /// Enqueue one fetch job unless the source already has an unfinished
    /// one. Per-source serialisation starts here: the scheduler never gets
    /// two concurrent jobs for the same source.
    pub async fn enqueue_fetch_job(
        &self,
        pool_kind: PoolKind,
        source_id: i64,
        profile: &serde_json::Value,
    ) -> Result<Option<i64>> {
        let row = sqlx::query_as::<_, (i64,)>(
            r#"
            INSERT INTO fetch_jobs (pool, source_id, profile)
            SELECT $1, $2, $3
            WHERE NOT EXISTS (
                SELECT 1 FROM fetch_jobs
                WHERE source_id = $2 AND state IN ('QUEUED', 'RUNNING')
            )
            RETURNING id
            "#,
        )
        .bind(pool_kind.to_string())
        .bind(source_id)
        .bind(profile)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.0))
    }

    /// Claim the next due job for a pool. `FOR UPDATE SKIP LOCKED` keeps
    /// concurrent workers from double-claiming; a source with a RUNNING
    /// job is passed over so per-source fetches stay serialised even when
    /// enrichment jobs pile up behind a scheduled one.
    pub async fn claim_fetch_job(&self, pool_kind: PoolKind) -> Result<Option<FetchJobRow>> {
        let row = sqlx::query_as::<_, FetchJobRow>(
            r#"
            UPDATE fetch_jobs SET state = 'RUNNING', claimed_at = now()
            WHERE id = (
                SELECT j.id FROM fetch_jobs j
                WHERE j.pool = $1 AND j.state = 'QUEUED' AND j.not_before <= now()
                  AND NOT EXISTS (
                      SELECT 1 FROM fetch_jobs r
                      WHERE r.source_id = j.source_id AND r.state = 'RUNNING'
                  )
                ORDER BY j.enqueued_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(pool_kind.to_string())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Enqueue a derived enrichment job (deep artefact download). Unlike
    /// scheduler dispatches, several may queue behind a running job; the
    /// dedupe key is the artefact url inside the profile snapshot.
    pub async fn enqueue_enrichment_job(
        &self,
        pool_kind: PoolKind,
        source_id: i64,
        profile: &serde_json::Value,
        artefact_url: &str,
    ) -> Result<Option<i64>> {
        let row = sqlx::query_as::<_, (i64,)>(
            r#"
            INSERT INTO fetch_jobs (pool, source_id, profile)
            SELECT $1, $2, $3
            WHERE NOT EXISTS (
                SELECT 1 FROM fetch_jobs
                WHERE source_id = $2
                  AND state IN ('QUEUED', 'RUNNING')
                  AND profile -> 'endpoints' ->> 'latest' = $4
            )
            RETURNING id
            "#,
        )
        .bind(pool_kind.to_string())
        .bind(source_id)
        .bind(profile)
        .bind(artefact_url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.0))
    }

    /// Terminal outcome for a job.
    pub async fn finish_fetch_job(
        &self,
        job_id: i64,
        ok: bool,
        error_class: Option<&str>,
    ) -> Result<()> {
        let state = if ok { "DONE" } else { "FAILED" };
        sqlx::query(
            "UPDATE fetch_jobs SET state = $2, finished_at = now(), error_class = $3 WHERE id = $1",
        )
        .bind(job_id)
        .bind(state)
        .bind(error_class)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Park a job for later: back to QUEUED with a not-before delay and a
    /// bumped attempt counter. Used for rate-limit parking and retries.
    pub async fn park_fetch_job(
        &self,
        job_id: i64,
        delay: Duration,
        error_class: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE fetch_jobs
            SET state = 'QUEUED', attempt = attempt + 1,
                not_before = now() + make_interval(secs => $2), error_class = $3
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(delay.num_seconds() as f64)
        .bind(error_class)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Queue depth feeding scheduler backpressure.
    pub async fn queue_depth(&self, pool_kind: PoolKind) -> Result<i64> {
        let row = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM fetch_jobs WHERE pool = $1 AND state = 'QUEUED'",
        )
        .bind(pool_kind.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    /// Whether a source has a job without a terminal outcome.
    pub async fn source_has_active_job(&self, source_id: i64) -> Result<bool> {
        let row = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM fetch_jobs WHERE source_id = $1 AND state IN ('QUEUED', 'RUNNING')",
        )
        .bind(source_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0 > 0)
    }

    /// Fail RUNNING jobs whose worker disappeared. Lets the scheduler
    /// re-dispatch a source after `cadence + timeout`.
    pub async fn fail_stale_jobs(&self, older_than: Duration) -> Result<u64> {
        let cutoff = Utc::now() - older_than;
        let result = sqlx::query(
            r#"
            UPDATE fetch_jobs
            SET state = 'FAILED', finished_at = now(), error_class = 'WorkerLost'
            WHERE state = 'RUNNING' AND claimed_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
