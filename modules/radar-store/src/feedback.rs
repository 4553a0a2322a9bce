use anyhow::Result;

use radar_common::EditorialAction;

use crate::Store;

impl Store {
    /// Persist an editorial action. Immutable; the sink applies the side
    /// effects separately.
    pub async fn insert_feedback(
        &self,
        event_id: i64,
        action: EditorialAction,
        payload: serde_json::Value,
        actor: &str,
    ) -> Result<i64> {
        let row = sqlx::query_as::<_, (i64,)>(
            r#"
            INSERT INTO feedback_events (event_id, action, payload, actor)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(event_id)
        .bind(action.to_string())
        .bind(&payload)
        .bind(actor)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }
}
