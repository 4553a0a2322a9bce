use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// Shared handle over the Postgres pool. Cheap to clone; every repository
/// method lives in an `impl Store` block in its own module.
#[derive(Clone)]
pub struct Store {
    pub(crate) pool: PgPool,
}

impl Store {
    /// Connect and run embedded migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(16)
            .connect(database_url)
            .await
            .context("Postgres connect failed")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("migrations failed")?;

        info!("store connected, migrations applied");
        Ok(Self { pool })
    }

    /// Wrap an existing pool (tests).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Best-effort pg_notify nudge on a channel. A nudge, not a delivery
    /// guarantee; listeners catch up from the tables.
    pub async fn notify(&self, channel: &str, payload: &str) {
        let result = sqlx::query("SELECT pg_notify($1, $2)")
            .bind(channel)
            .bind(payload)
            .execute(&self.pool)
            .await;
        if let Err(e) = result {
            tracing::warn!(error = %e, channel, "pg_notify failed (non-fatal)");
        }
    }
}
