use anyhow::Result;
use chrono::{Duration, Utc};
use sqlx::FromRow;

use radar_common::{AnchorHit, AnchorType, EvidenceFeatures};

use crate::Store;

impl Store {
    pub async fn insert_anchors(&self, doc_id: i64, anchors: &[AnchorHit]) -> Result<()> {
        for a in anchors {
            sqlx::query(
                r#"
                INSERT INTO doc_anchors (doc_id, anchor_type, anchor_value, evidence_ptr, confidence)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(doc_id)
            .bind(a.anchor_type.as_str())
            .bind(&a.value)
            .bind(&a.span)
            .bind(a.confidence)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    pub async fn upsert_evidence(&self, doc_id: i64, features: &EvidenceFeatures) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO doc_evidence
                (doc_id, evidence_score, has_pdf, has_official_domain, anchors_count, money_count, has_table_like)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (doc_id) DO UPDATE SET
                evidence_score = EXCLUDED.evidence_score,
                has_pdf = EXCLUDED.has_pdf,
                has_official_domain = EXCLUDED.has_official_domain,
                anchors_count = EXCLUDED.anchors_count,
                money_count = EXCLUDED.money_count,
                has_table_like = EXCLUDED.has_table_like
            "#,
        )
        .bind(doc_id)
        .bind(features.evidence_score)
        .bind(features.has_pdf)
        .bind(features.has_official_domain)
        .bind(features.anchors_count as i32)
        .bind(features.money_count as i32)
        .bind(features.has_table_like)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Canonical active events that already carry this exact `(type, value)`
    /// pair inside the window. Hard-merge decisions match on the pair,
    /// never on value alone.
    pub async fn events_with_anchor(
        &self,
        anchor_type: AnchorType,
        value: &str,
        window: Duration,
    ) -> Result<Vec<i64>> {
        let since = Utc::now() - window;
        let rows = sqlx::query_as::<_, (i64,)>(
            r#"
            SELECT DISTINCT e.id
            FROM events e
            JOIN event_docs ed ON ed.event_id = e.id
            JOIN doc_anchors a ON a.doc_id = ed.doc_id
            WHERE a.anchor_type = $1
              AND a.anchor_value = $2
              AND e.canonical_event_id IS NULL
              AND e.status NOT IN ('MERGED', 'IGNORED', 'EXPIRED')
              AND e.last_seen_at >= $3
            ORDER BY e.id ASC
            "#,
        )
        .bind(anchor_type.as_str())
        .bind(value)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    /// Top-k anchors for an event by confidence, for the upsert payload.
    pub async fn top_anchors(&self, event_id: i64, k: i64) -> Result<Vec<AnchorHit>> {
        let rows = sqlx::query_as::<_, (String, String, String, f64)>(
            r#"
            SELECT DISTINCT ON (a.anchor_type, a.anchor_value)
                a.anchor_type, a.anchor_value, COALESCE(a.evidence_ptr, ''), a.confidence
            FROM doc_anchors a
            JOIN event_docs ed ON ed.doc_id = a.doc_id
            WHERE ed.event_id = $1
            ORDER BY a.anchor_type, a.anchor_value, a.confidence DESC
            LIMIT $2
            "#,
        )
        .bind(event_id)
        .bind(k)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(t, value, span, confidence)| {
                AnchorType::parse(&t).map(|anchor_type| AnchorHit {
                    anchor_type,
                    value,
                    span,
                    confidence,
                })
            })
            .collect())
    }

    /// Strong-anchor pairs shared by two or more canonical active events.
    /// Input to the deferred canonicalisation sweep.
    pub async fn shared_strong_anchor_groups(
        &self,
        window: Duration,
    ) -> Result<Vec<AnchorGroupRow>> {
        let since = Utc::now() - window;
        let strong: Vec<&str> = AnchorType::STRONG.iter().map(|t| t.as_str()).collect();
        let rows = sqlx::query_as::<_, AnchorGroupRow>(
            r#"
            SELECT
                a.anchor_type,
                a.anchor_value,
                e.id AS event_id,
                e.first_seen_at,
                (SELECT COUNT(*) FROM doc_anchors a2
                 JOIN event_docs ed2 ON ed2.doc_id = a2.doc_id
                 WHERE ed2.event_id = e.id) AS anchor_count
            FROM events e
            JOIN event_docs ed ON ed.event_id = e.id
            JOIN doc_anchors a ON a.doc_id = ed.doc_id
            WHERE a.anchor_type = ANY($1)
              AND e.canonical_event_id IS NULL
              AND e.status NOT IN ('MERGED', 'IGNORED', 'EXPIRED')
              AND e.first_seen_at >= $2
            GROUP BY a.anchor_type, a.anchor_value, e.id, e.first_seen_at
            ORDER BY a.anchor_type, a.anchor_value, e.first_seen_at ASC, e.id ASC
            "#,
        )
        .bind(&strong)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

/// One `(pair, event)` membership row from the canonicalisation query.
#[derive(Debug, Clone, FromRow)]
pub struct AnchorGroupRow {
    pub anchor_type: String,
    pub anchor_value: String,
    pub event_id: i64,
    pub first_seen_at: chrono::DateTime<Utc>,
    pub anchor_count: i64,
}
