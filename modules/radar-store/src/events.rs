use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;

use radar_common::reasons::ReasonContribution;
use radar_common::{EventStatus, RadarError};

use crate::Store;

#[derive(Debug, Clone, FromRow)]
pub struct EventRow {
    pub id: i64,
    pub canonical_event_id: Option<i64>,
    pub status: String,
    pub flags: serde_json::Value,
    pub summary: Option<String>,
    pub lane: Option<String>,
    pub score_plantao: f64,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EventRow {
    pub fn status(&self) -> EventStatus {
        EventStatus::parse(&self.status).unwrap_or(EventStatus::New)
    }

    pub fn flag_list(&self) -> Vec<String> {
        self.flags
            .as_array()
            .map(|a| {
                a.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct EventStateRow {
    pub id: i64,
    pub event_id: i64,
    pub status: String,
    pub reason_code: Option<String>,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct EventScoreRow {
    pub event_id: i64,
    pub score_plantao: f64,
    pub score_oceano_azul: f64,
    pub reasons: serde_json::Value,
    pub computed_at: DateTime<Utc>,
}

/// Aggregates the scoring engine needs for one event, in one round trip.
#[derive(Debug, Clone, Default, FromRow)]
pub struct ScoringStats {
    pub doc_count: i64,
    pub source_count: i64,
    pub highest_tier: i32,
    pub has_tier1: bool,
    pub has_official: bool,
    /// Documents attached in the trailing velocity window.
    pub docs_window: i64,
    /// Documents attached in the window before that (for the derivative).
    pub docs_prev_window: i64,
    pub max_evidence: f64,
    pub has_pdf_evidence: bool,
    pub strong_anchor_count: i64,
}

impl Store {
    /// Create an event in HYDRATING with its initial history row.
    pub async fn create_event(
        &self,
        summary: Option<&str>,
        lane: Option<&str>,
        reason_code: &str,
    ) -> Result<EventRow> {
        let mut tx = self.pool.begin().await?;
        let event = sqlx::query_as::<_, EventRow>(
            r#"
            INSERT INTO events (status, summary, lane)
            VALUES ('HYDRATING', $1, $2)
            RETURNING *
            "#,
        )
        .bind(summary)
        .bind(lane)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO event_state_history (event_id, status, reason_code) VALUES ($1, 'HYDRATING', $2)",
        )
        .bind(event.id)
        .bind(reason_code)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(event)
    }

    pub async fn event_by_id(&self, id: i64) -> Result<Option<EventRow>> {
        let row = sqlx::query_as::<_, EventRow>("SELECT * FROM events WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Follow the tombstone pointer one step. Merge chains are never deeper
    /// than one, so one hop resolves any follower.
    pub async fn resolve_canonical(&self, id: i64) -> Result<Option<EventRow>> {
        let Some(event) = self.event_by_id(id).await? else {
            return Ok(None);
        };
        match event.canonical_event_id {
            Some(canonical_id) => self.event_by_id(canonical_id).await,
            None => Ok(Some(event)),
        }
    }

    /// Attach a document to an event; duplicate edges are ignored.
    /// Returns true when a new edge was created.
    pub async fn attach_doc(
        &self,
        event_id: i64,
        doc_id: i64,
        source_id: i64,
        is_primary: bool,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO event_docs (event_id, doc_id, source_id, is_primary)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (event_id, doc_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(doc_id)
        .bind(source_id)
        .bind(is_primary)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            sqlx::query("UPDATE events SET last_seen_at = now(), updated_at = now() WHERE id = $1")
                .bind(event_id)
                .execute(&self.pool)
                .await?;
        }
        Ok(result.rows_affected() > 0)
    }

    /// Atomic status transition: row lock, status update and history append
    /// in one transaction. Returns false when the event is already in the
    /// target status (no history row is appended).
    pub async fn transition_status(
        &self,
        event_id: i64,
        new_status: EventStatus,
        reason_code: &str,
    ) -> Result<Option<EventStatus>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, (String,)>(
            "SELECT status FROM events WHERE id = $1 FOR UPDATE",
        )
        .bind(event_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((current,)) = row else {
            return Err(RadarError::Logic(format!("event {event_id} not found")).into());
        };
        let current_status = EventStatus::parse(&current)
            .ok_or_else(|| RadarError::Logic(format!("unknown status {current}")))?;

        if current_status == new_status {
            tx.rollback().await?;
            return Ok(None);
        }

        sqlx::query("UPDATE events SET status = $2, updated_at = now() WHERE id = $1")
            .bind(event_id)
            .bind(new_status.as_str())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO event_state_history (event_id, status, reason_code) VALUES ($1, $2, $3)",
        )
        .bind(event_id)
        .bind(new_status.as_str())
        .bind(reason_code)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(current_status))
    }

    pub async fn set_flags(&self, event_id: i64, flags: &[String]) -> Result<()> {
        sqlx::query("UPDATE events SET flags = $2, updated_at = now() WHERE id = $1")
            .bind(event_id)
            .bind(serde_json::to_value(flags)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_summary_if_empty(&self, event_id: i64, summary: &str) -> Result<()> {
        sqlx::query(
            "UPDATE events SET summary = COALESCE(summary, $2), updated_at = now() WHERE id = $1",
        )
        .bind(event_id)
        .bind(summary)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_scores(
        &self,
        event_id: i64,
        score_plantao: f64,
        score_oceano_azul: f64,
        reasons: &[ReasonContribution],
    ) -> Result<()> {
        let reasons_json = serde_json::to_value(reasons)?;
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO event_scores (event_id, score_plantao, score_oceano_azul, reasons, computed_at)
            VALUES ($1, $2, $3, $4, now())
            ON CONFLICT (event_id) DO UPDATE SET
                score_plantao = EXCLUDED.score_plantao,
                score_oceano_azul = EXCLUDED.score_oceano_azul,
                reasons = EXCLUDED.reasons,
                computed_at = now()
            "#,
        )
        .bind(event_id)
        .bind(score_plantao)
        .bind(score_oceano_azul)
        .bind(&reasons_json)
        .execute(&mut *tx)
        .await?;

        // Denormalised copy for feed ordering.
        sqlx::query("UPDATE events SET score_plantao = $2, updated_at = now() WHERE id = $1")
            .bind(event_id)
            .bind(score_plantao)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn event_scores(&self, event_id: i64) -> Result<Option<EventScoreRow>> {
        let row = sqlx::query_as::<_, EventScoreRow>(
            "SELECT * FROM event_scores WHERE event_id = $1",
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn state_history(&self, event_id: i64) -> Result<Vec<EventStateRow>> {
        let rows = sqlx::query_as::<_, EventStateRow>(
            "SELECT * FROM event_state_history WHERE event_id = $1 ORDER BY id ASC",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn events_in_status(&self, statuses: &[EventStatus]) -> Result<Vec<EventRow>> {
        let names: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
        let rows = sqlx::query_as::<_, EventRow>(
            "SELECT * FROM events WHERE status = ANY($1) AND canonical_event_id IS NULL",
        )
        .bind(&names)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Feed query: canonical events only, terminal-for-feed statuses
    /// excluded. Followers are never returned here.
    pub async fn feed_events(&self, limit: i64) -> Result<Vec<EventRow>> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT * FROM events
            WHERE canonical_event_id IS NULL
              AND status NOT IN ('MERGED', 'IGNORED', 'EXPIRED')
            ORDER BY score_plantao DESC, created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// The pool that fed this event, from the primary document's source
    /// profile. Drives which gate timeout applies.
    pub async fn event_pool(&self, event_id: i64) -> Result<Option<String>> {
        let row = sqlx::query_as::<_, (Option<String>,)>(
            r#"
            SELECT s.fetch_policy ->> 'pool'
            FROM event_docs ed
            JOIN sources s ON s.id = ed.source_id
            WHERE ed.event_id = $1 AND ed.is_primary
            LIMIT 1
            "#,
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.and_then(|r| r.0))
    }

    /// True when every job touched for this event's sources since the
    /// event appeared has failed terminally: nothing queued, running or
    /// done that could still enrich it.
    pub async fn enrichment_exhausted(&self, event_id: i64) -> Result<bool> {
        let row = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE j.state = 'FAILED'),
                COUNT(*) FILTER (WHERE j.state IN ('QUEUED', 'RUNNING', 'DONE'))
            FROM fetch_jobs j
            WHERE j.source_id IN (SELECT source_id FROM event_docs WHERE event_id = $1)
              AND j.enqueued_at >= (SELECT created_at FROM events WHERE id = $1)
            "#,
        )
        .bind(event_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0 > 0 && row.1 == 0)
    }

    /// One-round-trip aggregate for the scoring engine.
    pub async fn scoring_stats(&self, event_id: i64, velocity_window: Duration) -> Result<ScoringStats> {
        let now = Utc::now();
        let window_start = now - velocity_window;
        let prev_window_start = now - velocity_window - velocity_window;
        let strong: Vec<&str> = radar_common::AnchorType::STRONG
            .iter()
            .map(|t| t.as_str())
            .collect();

        let row = sqlx::query_as::<_, ScoringStats>(
            r#"
            SELECT
                COUNT(DISTINCT ed.doc_id) AS doc_count,
                COUNT(DISTINCT ed.source_id) AS source_count,
                COALESCE(MIN(s.tier), 3) AS highest_tier,
                COALESCE(BOOL_OR(s.tier = 1), FALSE) AS has_tier1,
                COALESCE(BOOL_OR(s.is_official), FALSE) AS has_official,
                COUNT(DISTINCT ed.doc_id) FILTER (WHERE ed.seen_at >= $2) AS docs_window,
                COUNT(DISTINCT ed.doc_id)
                    FILTER (WHERE ed.seen_at >= $3 AND ed.seen_at < $2) AS docs_prev_window,
                COALESCE(MAX(ev.evidence_score), 0) AS max_evidence,
                COALESCE(BOOL_OR(ev.has_pdf), FALSE) AS has_pdf_evidence,
                COUNT(DISTINCT (a.anchor_type, a.anchor_value))
                    FILTER (WHERE a.anchor_type = ANY($4)) AS strong_anchor_count
            FROM event_docs ed
            JOIN sources s ON s.id = ed.source_id
            LEFT JOIN doc_evidence ev ON ev.doc_id = ed.doc_id
            LEFT JOIN doc_anchors a ON a.doc_id = ed.doc_id
            WHERE ed.event_id = $1
            "#,
        )
        .bind(event_id)
        .bind(window_start)
        .bind(prev_window_start)
        .bind(&strong)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }
}
