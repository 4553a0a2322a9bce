//! Key-value counters: rate-limit buckets, circuit-breaker state and
//! short-lived locks. Never a source of truth; every value here expires
//! and can be lost without correctness impact.
//!
//! Redis backs multi-replica deployments so counters don't drift across
//! processes; the in-memory backend covers tests and single-process runs.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::AsyncCommands;

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment, setting the TTL when the key is created.
    /// Returns the value after the increment.
    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64>;

    /// Atomically decrement. Missing keys count as zero.
    async fn decr(&self, key: &str) -> Result<i64>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    async fn del(&self, key: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Redis backend
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct RedisCounters {
    manager: redis::aio::ConnectionManager,
}

impl RedisCounters {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).context("invalid redis url")?;
        let manager = client
            .get_connection_manager()
            .await
            .context("redis connect failed")?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl CounterStore for RedisCounters {
    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64> {
        let mut con = self.manager.clone();
        let value: i64 = con.incr(key, 1).await?;
        if value == 1 {
            let _: bool = con.expire(key, ttl.as_secs() as i64).await?;
        }
        Ok(value)
    }

    async fn decr(&self, key: &str) -> Result<i64> {
        let mut con = self.manager.clone();
        let value: i64 = con.decr(key, 1).await?;
        Ok(value)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut con = self.manager.clone();
        let value: Option<String> = con.get(key).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut con = self.manager.clone();
        let _: () = con.set_ex(key, value, ttl.as_secs()).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut con = self.manager.clone();
        let _: () = con.del(key).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Entry {
    value: i64,
    text: Option<String>,
    expires_at: Instant,
}

/// Process-local counter store for tests and single-replica runs.
#[derive(Default)]
pub struct MemoryCounters {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCounters {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_live_entry<R>(
        &self,
        key: &str,
        f: impl FnOnce(Option<&mut Entry>) -> R,
    ) -> R {
        let mut entries = self.entries.lock().expect("counter lock poisoned");
        let now = Instant::now();
        let expired = entries.get(key).is_some_and(|e| e.expires_at <= now);
        if expired {
            entries.remove(key);
        }
        f(entries.get_mut(key))
    }
}

#[async_trait]
impl CounterStore for MemoryCounters {
    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64> {
        let mut entries = self.entries.lock().expect("counter lock poisoned");
        let now = Instant::now();
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: 0,
            text: None,
            expires_at: now + ttl,
        });
        if entry.expires_at <= now {
            entry.value = 0;
            entry.expires_at = now + ttl;
        }
        entry.value += 1;
        Ok(entry.value)
    }

    async fn decr(&self, key: &str) -> Result<i64> {
        Ok(self.with_live_entry(key, |entry| match entry {
            Some(e) => {
                e.value -= 1;
                e.value
            }
            None => -1,
        }))
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.with_live_entry(key, |entry| {
            entry.map(|e| e.text.clone().unwrap_or_else(|| e.value.to_string()))
        }))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock().expect("counter lock poisoned");
        entries.insert(
            key.to_string(),
            Entry {
                value: 0,
                text: Some(value.to_string()),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.entries
            .lock()
            .expect("counter lock poisoned")
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn incr_counts_up_and_expires() {
        let kv = MemoryCounters::new();
        assert_eq!(kv.incr("k", Duration::from_secs(60)).await.unwrap(), 1);
        assert_eq!(kv.incr("k", Duration::from_secs(60)).await.unwrap(), 2);

        let kv = MemoryCounters::new();
        assert_eq!(kv.incr("k", Duration::from_millis(0)).await.unwrap(), 1);
        // TTL of zero: next increment starts a fresh window.
        assert_eq!(kv.incr("k", Duration::from_secs(60)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn set_get_del_round_trip() {
        let kv = MemoryCounters::new();
        kv.set_ex("open", "1", Duration::from_secs(60)).await.unwrap();
        assert_eq!(kv.get("open").await.unwrap().as_deref(), Some("1"));
        kv.del("open").await.unwrap();
        assert_eq!(kv.get("open").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_value_reads_as_missing() {
        let kv = MemoryCounters::new();
        kv.set_ex("open", "1", Duration::from_millis(0)).await.unwrap();
        assert_eq!(kv.get("open").await.unwrap(), None);
    }

    #[tokio::test]
    async fn decr_missing_key_goes_negative() {
        let kv = MemoryCounters::new();
        assert_eq!(kv.decr("c").await.unwrap(), -1);
    }
}
