use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;

use radar_common::{CandidateDocument, EntityMention};

use crate::Store;

#[derive(Debug, Clone, FromRow)]
pub struct DocumentRow {
    pub id: i64,
    pub url: String,
    pub canonical_url: Option<String>,
    pub title: Option<String>,
    pub clean_text: String,
    pub lang: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    pub content_hash: String,
    pub version_no: i32,
    pub simhash: Option<i64>,
    pub snapshot_id: Option<i64>,
    pub source_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of offering a candidate to the version store.
#[derive(Debug)]
pub enum VersionOutcome {
    /// Hash unchanged against the latest stored version. No write happened.
    Unchanged { doc_id: i64 },
    /// A new version row was created.
    Created(DocumentRow),
}

impl Store {
    pub async fn latest_document(&self, url: &str) -> Result<Option<DocumentRow>> {
        let row = sqlx::query_as::<_, DocumentRow>(
            "SELECT * FROM documents WHERE url = $1 ORDER BY version_no DESC LIMIT 1",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn document_by_id(&self, id: i64) -> Result<Option<DocumentRow>> {
        let row = sqlx::query_as::<_, DocumentRow>("SELECT * FROM documents WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Create a new document version unless the candidate's content hash
    /// matches the latest stored version for the url.
    pub async fn upsert_document_version(
        &self,
        candidate: &CandidateDocument,
        simhash: Option<i64>,
        snapshot_id: Option<i64>,
        source_id: i64,
    ) -> Result<VersionOutcome> {
        let latest = self.latest_document(&candidate.url).await?;
        if let Some(latest) = &latest {
            if latest.content_hash == candidate.content_hash {
                return Ok(VersionOutcome::Unchanged { doc_id: latest.id });
            }
        }
        let next_version = latest.map(|d| d.version_no + 1).unwrap_or(1);

        let row = sqlx::query_as::<_, DocumentRow>(
            r#"
            INSERT INTO documents
                (url, canonical_url, title, clean_text, lang, published_at, modified_at,
                 content_hash, version_no, simhash, snapshot_id, source_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(&candidate.url)
        .bind(&candidate.canonical_url)
        .bind(&candidate.title)
        .bind(&candidate.clean_text)
        .bind(&candidate.lang)
        .bind(candidate.published_at)
        .bind(candidate.modified_at)
        .bind(&candidate.content_hash)
        .bind(next_version)
        .bind(simhash)
        .bind(snapshot_id)
        .bind(source_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(VersionOutcome::Created(row))
    }

    pub async fn insert_entity_mentions(
        &self,
        doc_id: i64,
        mentions: &[EntityMention],
    ) -> Result<()> {
        for m in mentions {
            sqlx::query(
                "INSERT INTO entity_mentions (doc_id, entity_key, label, span) VALUES ($1, $2, $3, $4)",
            )
            .bind(doc_id)
            .bind(&m.entity_key)
            .bind(&m.label)
            .bind(&m.span)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Simhash fingerprints of documents attached to active (non-terminal,
    /// canonical) events inside the window. Feeds the near-duplicate rule.
    pub async fn active_fingerprints(&self, window: Duration) -> Result<Vec<(i64, i64)>> {
        let since = Utc::now() - window;
        let rows = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT ed.event_id, d.simhash
            FROM event_docs ed
            JOIN documents d ON d.id = ed.doc_id
            JOIN events e ON e.id = ed.event_id
            WHERE d.simhash IS NOT NULL
              AND e.canonical_event_id IS NULL
              AND e.status NOT IN ('MERGED', 'IGNORED', 'EXPIRED')
              AND ed.seen_at >= $1
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Lexical profiles (title + lede of the primary document, entity keys)
    /// of active events inside the window. Feeds the same-event rule.
    pub async fn active_event_profiles(&self, window: Duration) -> Result<Vec<EventProfile>> {
        let since = Utc::now() - window;
        let rows = sqlx::query_as::<_, EventProfile>(
            r#"
            SELECT
                e.id AS event_id,
                COALESCE(d.title, '') AS title,
                LEFT(d.clean_text, 600) AS lede,
                COALESCE(
                    (SELECT array_agg(DISTINCT em.entity_key)
                     FROM entity_mentions em
                     JOIN event_docs ed2 ON ed2.doc_id = em.doc_id
                     WHERE ed2.event_id = e.id),
                    '{}'
                ) AS entity_keys
            FROM events e
            JOIN event_docs ed ON ed.event_id = e.id AND ed.is_primary
            JOIN documents d ON d.id = ed.doc_id
            WHERE e.canonical_event_id IS NULL
              AND e.status NOT IN ('MERGED', 'IGNORED', 'EXPIRED')
              AND e.last_seen_at >= $1
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

/// Lexical clustering candidate: one active event's primary title + lede
/// plus its entity keys.
#[derive(Debug, Clone, FromRow)]
pub struct EventProfile {
    pub event_id: i64,
    pub title: String,
    pub lede: String,
    pub entity_keys: Vec<String>,
}
