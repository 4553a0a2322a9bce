use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::Store;

#[derive(Debug, Clone, FromRow)]
pub struct AlertStateRow {
    pub event_id: i64,
    pub last_fingerprint: Option<String>,
    pub last_alert_at: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,
}

impl Store {
    pub async fn alert_state(&self, event_id: i64) -> Result<Option<AlertStateRow>> {
        let row = sqlx::query_as::<_, AlertStateRow>(
            "SELECT * FROM event_alert_state WHERE event_id = $1",
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Record a sent alert and advance the dedupe state in one transaction.
    pub async fn record_alert(
        &self,
        event_id: i64,
        fingerprint: &str,
        cooldown_until: DateTime<Utc>,
        payload: serde_json::Value,
    ) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, (i64,)>(
            "INSERT INTO alerts (event_id, payload) VALUES ($1, $2) RETURNING id",
        )
        .bind(event_id)
        .bind(&payload)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO event_alert_state (event_id, last_fingerprint, last_alert_at, cooldown_until)
            VALUES ($1, $2, now(), $3)
            ON CONFLICT (event_id) DO UPDATE SET
                last_fingerprint = EXCLUDED.last_fingerprint,
                last_alert_at = now(),
                cooldown_until = EXCLUDED.cooldown_until
            "#,
        )
        .bind(event_id)
        .bind(fingerprint)
        .bind(cooldown_until)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.0)
    }

    /// Push the alert cooldown forward without sending anything. Backs the
    /// editorial snooze.
    pub async fn extend_alert_cooldown(
        &self,
        event_id: i64,
        until: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO event_alert_state (event_id, cooldown_until)
            VALUES ($1, $2)
            ON CONFLICT (event_id) DO UPDATE SET cooldown_until = EXCLUDED.cooldown_until
            "#,
        )
        .bind(event_id)
        .bind(until)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record an out-of-band trigger (draft requests) on its own channel,
    /// without touching the transition-alert dedupe state.
    pub async fn record_trigger(
        &self,
        event_id: i64,
        channel: &str,
        payload: serde_json::Value,
    ) -> Result<i64> {
        let row = sqlx::query_as::<_, (i64,)>(
            "INSERT INTO alerts (event_id, channel, payload) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(event_id)
        .bind(channel)
        .bind(&payload)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }
}
