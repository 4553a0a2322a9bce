use anyhow::Result;
use radar_common::RadarError;

use crate::Store;

/// Outcome of a canonical merge. `merged == false` means the call was a
/// no-op (already merged, or the same audit row exists).
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub merged: bool,
    pub from_event_id: i64,
    pub to_event_id: i64,
    pub moved_docs: u64,
    pub deduped_docs: u64,
}

impl Store {
    /// Fold `from_event` into `canonical_event`:
    /// - re-home every event_doc edge, deduplicating on (event_id, doc_id)
    /// - keep exactly one primary document on the canonical
    /// - widen the canonical's timeline bounds, union flags, keep max scores
    /// - tombstone the follower (canonical_event_id + MERGED + history)
    /// - append a merge_audit row
    ///
    /// Idempotent: a duplicate `(from, to, reason)` audit row short-circuits.
    pub async fn merge_events(
        &self,
        from_event_id: i64,
        to_event_id: i64,
        reason_code: &str,
        evidence: serde_json::Value,
    ) -> Result<MergeOutcome> {
        if from_event_id == to_event_id {
            return Err(RadarError::Logic(format!(
                "refusing to merge event {from_event_id} into itself"
            ))
            .into());
        }

        let noop = MergeOutcome {
            merged: false,
            from_event_id,
            to_event_id,
            moved_docs: 0,
            deduped_docs: 0,
        };

        let mut tx = self.pool.begin().await?;

        // Lock both rows in id order to avoid deadlocks between concurrent
        // merges of the same pair.
        let (first, second) = if from_event_id < to_event_id {
            (from_event_id, to_event_id)
        } else {
            (to_event_id, from_event_id)
        };
        for id in [first, second] {
            sqlx::query("SELECT id FROM events WHERE id = $1 FOR UPDATE")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        let from = sqlx::query_as::<_, (Option<i64>, String)>(
            "SELECT canonical_event_id, status FROM events WHERE id = $1",
        )
        .bind(from_event_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| RadarError::Logic(format!("event {from_event_id} not found")))?;

        let to = sqlx::query_as::<_, (Option<i64>, String)>(
            "SELECT canonical_event_id, status FROM events WHERE id = $1",
        )
        .bind(to_event_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| RadarError::Logic(format!("event {to_event_id} not found")))?;

        // Already a follower (of this target or any other): nothing to do.
        if from.0.is_some() {
            tx.rollback().await?;
            return Ok(noop);
        }
        if to.0.is_some() {
            return Err(RadarError::Logic(format!(
                "canonical target {to_event_id} is itself merged into {}",
                to.0.unwrap()
            ))
            .into());
        }

        let duplicate = sqlx::query_as::<_, (i64,)>(
            r#"
            SELECT id FROM merge_audit
            WHERE from_event_id = $1 AND to_event_id = $2 AND reason_code = $3
            LIMIT 1
            "#,
        )
        .bind(from_event_id)
        .bind(to_event_id)
        .bind(reason_code)
        .fetch_optional(&mut *tx)
        .await?;
        if duplicate.is_some() {
            tx.rollback().await?;
            return Ok(noop);
        }

        // Drop follower edges whose doc already sits on the canonical.
        let deduped = sqlx::query(
            r#"
            DELETE FROM event_docs ed
            WHERE ed.event_id = $1
              AND EXISTS (SELECT 1 FROM event_docs c WHERE c.event_id = $2 AND c.doc_id = ed.doc_id)
            "#,
        )
        .bind(from_event_id)
        .bind(to_event_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        // Re-home the rest. Incoming primaries are demoted; a primary is
        // promoted below if the canonical has none.
        let moved = sqlx::query(
            "UPDATE event_docs SET event_id = $2, is_primary = FALSE WHERE event_id = $1",
        )
        .bind(from_event_id)
        .bind(to_event_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query(
            r#"
            UPDATE event_docs SET is_primary = TRUE
            WHERE event_id = $1
              AND doc_id = (
                  SELECT doc_id FROM event_docs
                  WHERE event_id = $1
                  ORDER BY seen_at ASC, doc_id ASC
                  LIMIT 1
              )
              AND NOT EXISTS (
                  SELECT 1 FROM event_docs WHERE event_id = $1 AND is_primary
              )
            "#,
        )
        .bind(to_event_id)
        .execute(&mut *tx)
        .await?;

        // Widen timeline, union flags, keep the follower's summary/lane only
        // where the canonical has none, preserve the strongest plantao score.
        sqlx::query(
            r#"
            UPDATE events c SET
                first_seen_at = LEAST(c.first_seen_at, f.first_seen_at),
                last_seen_at = GREATEST(c.last_seen_at, f.last_seen_at),
                summary = COALESCE(c.summary, f.summary),
                lane = COALESCE(c.lane, f.lane),
                flags = (
                    SELECT COALESCE(jsonb_agg(DISTINCT flag), '[]'::jsonb)
                    FROM (
                        SELECT jsonb_array_elements(c.flags) AS flag
                        UNION ALL
                        SELECT jsonb_array_elements(f.flags)
                    ) merged_flags
                ),
                score_plantao = GREATEST(c.score_plantao, f.score_plantao),
                updated_at = now()
            FROM events f
            WHERE c.id = $2 AND f.id = $1
            "#,
        )
        .bind(from_event_id)
        .bind(to_event_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO event_scores (event_id, score_plantao, score_oceano_azul, reasons)
            SELECT $2, s.score_plantao, s.score_oceano_azul, s.reasons
            FROM event_scores s WHERE s.event_id = $1
            ON CONFLICT (event_id) DO UPDATE SET
                score_plantao = GREATEST(event_scores.score_plantao, EXCLUDED.score_plantao),
                score_oceano_azul = GREATEST(event_scores.score_oceano_azul, EXCLUDED.score_oceano_azul)
            "#,
        )
        .bind(from_event_id)
        .bind(to_event_id)
        .execute(&mut *tx)
        .await?;

        // Tombstone the follower.
        sqlx::query(
            "UPDATE events SET canonical_event_id = $2, status = 'MERGED', updated_at = now() WHERE id = $1",
        )
        .bind(from_event_id)
        .bind(to_event_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO event_state_history (event_id, status, reason_code) VALUES ($1, 'MERGED', $2)",
        )
        .bind(from_event_id)
        .bind(reason_code)
        .execute(&mut *tx)
        .await?;

        let evidence = merge_evidence(evidence, moved, deduped);
        sqlx::query(
            r#"
            INSERT INTO merge_audit (from_event_id, to_event_id, reason_code, evidence)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(from_event_id)
        .bind(to_event_id)
        .bind(reason_code)
        .bind(&evidence)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(MergeOutcome {
            merged: true,
            from_event_id,
            to_event_id,
            moved_docs: moved,
            deduped_docs: deduped,
        })
    }

    pub async fn merge_audit_count(&self, from_event_id: i64, to_event_id: i64) -> Result<i64> {
        let row = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM merge_audit WHERE from_event_id = $1 AND to_event_id = $2",
        )
        .bind(from_event_id)
        .bind(to_event_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }
}

/// Outcome of an editorial split.
#[derive(Debug, Clone)]
pub struct SplitOutcome {
    pub source_event_id: i64,
    pub new_event_id: i64,
    pub moved_docs: u64,
    pub remaining_docs: u64,
}

impl Store {
    /// Peel the named documents off `event_id` into a new event. The new
    /// event starts at HYDRATING; the source must keep at least one
    /// document. Both sides end up with exactly one primary document.
    pub async fn split_event(&self, event_id: i64, doc_ids: &[i64]) -> Result<SplitOutcome> {
        if doc_ids.is_empty() {
            return Err(RadarError::Logic("split requires document ids".to_string()).into());
        }

        let mut tx = self.pool.begin().await?;

        let source = sqlx::query_as::<_, (Option<i64>, String, Option<String>, Option<String>)>(
            "SELECT canonical_event_id, status, summary, lane FROM events WHERE id = $1 FOR UPDATE",
        )
        .bind(event_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| RadarError::Logic(format!("event {event_id} not found")))?;

        if source.0.is_some() || source.1 == "MERGED" {
            return Err(RadarError::Logic(format!(
                "event {event_id} is tombstoned, split refused"
            ))
            .into());
        }

        let total = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM event_docs WHERE event_id = $1",
        )
        .bind(event_id)
        .fetch_one(&mut *tx)
        .await?
        .0;

        let targets = sqlx::query_as::<_, (i64,)>(
            "SELECT doc_id FROM event_docs WHERE event_id = $1 AND doc_id = ANY($2)",
        )
        .bind(event_id)
        .bind(doc_ids)
        .fetch_all(&mut *tx)
        .await?;

        if targets.is_empty() {
            return Err(
                RadarError::Logic("none of the documents belong to the event".to_string()).into(),
            );
        }
        if targets.len() as i64 >= total {
            return Err(RadarError::Logic(
                "split must leave at least one document on the source event".to_string(),
            )
            .into());
        }

        let new_event = sqlx::query_as::<_, (i64,)>(
            r#"
            INSERT INTO events (status, summary, lane)
            VALUES ('HYDRATING', $1, $2)
            RETURNING id
            "#,
        )
        .bind(&source.2)
        .bind(&source.3)
        .fetch_one(&mut *tx)
        .await?;
        let new_event_id = new_event.0;

        sqlx::query(
            "INSERT INTO event_state_history (event_id, status, reason_code) VALUES ($1, 'HYDRATING', $2)",
        )
        .bind(new_event_id)
        .bind(radar_common::reasons::EDITORIAL_SPLIT_CREATED)
        .execute(&mut *tx)
        .await?;

        let moved = sqlx::query(
            "UPDATE event_docs SET event_id = $2, is_primary = FALSE WHERE event_id = $1 AND doc_id = ANY($3)",
        )
        .bind(event_id)
        .bind(new_event_id)
        .bind(doc_ids)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        // One primary on each side: earliest-seen document wins when the
        // old primary moved away (or was never set).
        for id in [event_id, new_event_id] {
            sqlx::query(
                r#"
                UPDATE event_docs SET is_primary = TRUE
                WHERE event_id = $1
                  AND doc_id = (
                      SELECT doc_id FROM event_docs
                      WHERE event_id = $1
                      ORDER BY seen_at ASC, doc_id ASC
                      LIMIT 1
                  )
                  AND NOT EXISTS (SELECT 1 FROM event_docs WHERE event_id = $1 AND is_primary)
                "#,
            )
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }

        // Timeline bounds follow the documents each side kept.
        for id in [event_id, new_event_id] {
            sqlx::query(
                r#"
                UPDATE events e SET
                    first_seen_at = b.min_seen,
                    last_seen_at = b.max_seen,
                    updated_at = now()
                FROM (
                    SELECT MIN(seen_at) AS min_seen, MAX(seen_at) AS max_seen
                    FROM event_docs WHERE event_id = $1
                ) b
                WHERE e.id = $1 AND b.min_seen IS NOT NULL
                "#,
            )
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "INSERT INTO event_state_history (event_id, status, reason_code) VALUES ($1, $2, $3)",
        )
        .bind(event_id)
        .bind(&source.1)
        .bind(radar_common::reasons::EDITORIAL_SPLIT_SOURCE_UPDATED)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(SplitOutcome {
            source_event_id: event_id,
            new_event_id,
            moved_docs: moved,
            remaining_docs: (total - targets.len() as i64) as u64,
        })
    }
}

fn merge_evidence(mut evidence: serde_json::Value, moved: u64, deduped: u64) -> serde_json::Value {
    if !evidence.is_object() {
        evidence = serde_json::json!({});
    }
    let obj = evidence.as_object_mut().expect("object ensured above");
    obj.insert("moved_docs".into(), serde_json::json!(moved));
    obj.insert("deduped_docs".into(), serde_json::json!(deduped));
    evidence
}
