use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::Store;

/// A configured source with its fetch-policy payload. Mutated only by
/// administrative loads.
#[derive(Debug, Clone, FromRow)]
pub struct SourceRow {
    pub id: i64,
    pub name: String,
    pub domain: String,
    pub tier: i32,
    pub is_official: bool,
    pub lang: String,
    pub enabled: bool,
    pub fetch_policy: serde_json::Value,
    pub last_dispatched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for an administrative source load.
#[derive(Debug, Clone)]
pub struct NewSource {
    pub name: String,
    pub domain: String,
    pub tier: i32,
    pub is_official: bool,
    pub lang: String,
    pub fetch_policy: serde_json::Value,
}

impl Store {
    pub async fn enabled_sources(&self) -> Result<Vec<SourceRow>> {
        let rows = sqlx::query_as::<_, SourceRow>(
            "SELECT * FROM sources WHERE enabled ORDER BY tier ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn source_by_id(&self, id: i64) -> Result<Option<SourceRow>> {
        let row = sqlx::query_as::<_, SourceRow>("SELECT * FROM sources WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Administrative load of a new source profile.
    pub async fn insert_source(&self, source: NewSource) -> Result<i64> {
        let row = sqlx::query_as::<_, (i64,)>(
            r#"
            INSERT INTO sources (name, domain, tier, is_official, lang, fetch_policy)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(&source.name)
        .bind(&source.domain)
        .bind(source.tier)
        .bind(source.is_official)
        .bind(&source.lang)
        .bind(&source.fetch_policy)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    /// Persist the scheduler's dispatch mark. Cadence decisions compare
    /// against this, not against attempt timestamps.
    pub async fn mark_dispatched(&self, source_id: i64, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE sources SET last_dispatched_at = $2, updated_at = now() WHERE id = $1")
            .bind(source_id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_source_enabled(&self, source_id: i64, enabled: bool) -> Result<()> {
        sqlx::query("UPDATE sources SET enabled = $2, updated_at = now() WHERE id = $1")
            .bind(source_id)
            .bind(enabled)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
