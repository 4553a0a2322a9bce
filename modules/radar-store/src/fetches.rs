use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;

use radar_common::PoolKind;

use crate::Store;

/// Immutable record of one network attempt, 304s and local rejections
/// included.
#[derive(Debug, Clone)]
pub struct NewFetchAttempt {
    pub source_id: i64,
    pub url: String,
    pub status_code: i32,
    pub error_class: Option<String>,
    pub latency_ms: i64,
    pub bytes_read: i64,
    pub pool: PoolKind,
    pub snapshot_hash: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct SnapshotRow {
    pub id: i64,
    pub url: String,
    pub content_hash: String,
    pub snapshot_hash: String,
    pub headers: Option<serde_json::Value>,
    pub body_ref: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl Store {
    pub async fn record_attempt(&self, attempt: NewFetchAttempt) -> Result<i64> {
        let row = sqlx::query_as::<_, (i64,)>(
            r#"
            INSERT INTO fetch_attempts
                (source_id, url, status_code, error_class, latency_ms, bytes_read, pool, snapshot_hash)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(attempt.source_id)
        .bind(&attempt.url)
        .bind(attempt.status_code)
        .bind(&attempt.error_class)
        .bind(attempt.latency_ms)
        .bind(attempt.bytes_read)
        .bind(attempt.pool.to_string())
        .bind(&attempt.snapshot_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    /// Store a snapshot for a 2xx body that was actually read.
    pub async fn insert_snapshot(
        &self,
        url: &str,
        content_hash: &str,
        snapshot_hash: &str,
        headers: Option<serde_json::Value>,
        body_ref: Option<String>,
    ) -> Result<i64> {
        let row = sqlx::query_as::<_, (i64,)>(
            r#"
            INSERT INTO snapshots (url, content_hash, snapshot_hash, headers, body_ref)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(url)
        .bind(content_hash)
        .bind(snapshot_hash)
        .bind(&headers)
        .bind(&body_ref)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    /// Latest snapshot for a url; seeds conditional headers and the
    /// identical-content short-circuit.
    pub async fn latest_snapshot(&self, url: &str) -> Result<Option<SnapshotRow>> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            "SELECT * FROM snapshots WHERE url = $1 ORDER BY fetched_at DESC LIMIT 1",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Count of 2xx attempts for a source inside the trailing window.
    /// The yield monitor compares this against useful output.
    pub async fn healthy_attempts_since(&self, source_id: i64, window: Duration) -> Result<i64> {
        let since = Utc::now() - window;
        let row = sqlx::query_as::<_, (i64,)>(
            r#"
            SELECT COUNT(*) FROM fetch_attempts
            WHERE source_id = $1
              AND attempted_at >= $2
              AND status_code BETWEEN 200 AND 299
            "#,
        )
        .bind(source_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    /// Useful yield for a source inside the window: documents with non-zero
    /// evidence plus anchors extracted.
    pub async fn useful_yield_since(&self, source_id: i64, window: Duration) -> Result<f64> {
        let since = Utc::now() - window;
        let row = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT
                COUNT(DISTINCT d.id) FILTER (WHERE e.evidence_score > 0),
                COUNT(a.id)
            FROM documents d
            LEFT JOIN doc_evidence e ON e.doc_id = d.id
            LEFT JOIN doc_anchors a ON a.doc_id = d.id
            WHERE d.source_id = $1 AND d.created_at >= $2
            "#,
        )
        .bind(source_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0 as f64 + row.1 as f64)
    }

    pub async fn open_starvation_incident(
        &self,
        source_id: i64,
        window_hours: i32,
        observed: f64,
        expected: f64,
    ) -> Result<i64> {
        let row = sqlx::query_as::<_, (i64,)>(
            r#"
            INSERT INTO starvation_incidents (source_id, window_hours, observed_yield, expected_yield)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(source_id)
        .bind(window_hours)
        .bind(observed)
        .bind(expected)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    pub async fn has_open_starvation_incident(&self, source_id: i64) -> Result<bool> {
        let row = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM starvation_incidents WHERE source_id = $1 AND closed_at IS NULL",
        )
        .bind(source_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0 > 0)
    }

    pub async fn close_starvation_incidents(&self, source_id: i64) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE starvation_incidents SET closed_at = now() WHERE source_id = $1 AND closed_at IS NULL",
        )
        .bind(source_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
