//! Per-source circuit breaker over the counter store.
//!
//! N consecutive failures open the breaker for a cooldown window; while
//! open, jobs short-circuit to a synthetic failure without touching the
//! network. Any success clears the streak. State lives in the key-value
//! store so replicas share one view.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::warn;

use radar_store::CounterStore;

/// Failure-streak counters expire on their own after this long.
const STREAK_TTL: Duration = Duration::from_secs(300);

pub struct CircuitBreaker {
    counters: Arc<dyn CounterStore>,
    threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(counters: Arc<dyn CounterStore>, threshold: u32, cooldown: Duration) -> Self {
        Self {
            counters,
            threshold,
            cooldown,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub async fn is_open(&self, source_pk: i64) -> Result<bool> {
        Ok(self
            .counters
            .get(&format!("radar:cb:{source_pk}:open"))
            .await?
            .is_some())
    }

    /// Record an outcome. Success clears the streak and closes the
    /// breaker; the Nth consecutive failure opens it.
    pub async fn record(&self, source_pk: i64, success: bool) -> Result<()> {
        let fails_key = format!("radar:cb:{source_pk}:fails");
        let open_key = format!("radar:cb:{source_pk}:open");

        if success {
            self.counters.del(&fails_key).await?;
            self.counters.del(&open_key).await?;
            return Ok(());
        }

        let fails = self.counters.incr(&fails_key, STREAK_TTL).await?;
        if fails >= self.threshold as i64 {
            self.counters.set_ex(&open_key, "1", self.cooldown).await?;
            warn!(source_pk, fails, "circuit breaker opened");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radar_store::MemoryCounters;

    fn breaker(threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            Arc::new(MemoryCounters::new()),
            threshold,
            Duration::from_secs(120),
        )
    }

    #[tokio::test]
    async fn opens_on_nth_failure_not_before() {
        let cb = breaker(5);
        for _ in 0..4 {
            cb.record(7, false).await.unwrap();
        }
        assert!(!cb.is_open(7).await.unwrap(), "closed after N-1 failures");
        cb.record(7, false).await.unwrap();
        assert!(cb.is_open(7).await.unwrap(), "open after the Nth failure");
    }

    #[tokio::test]
    async fn success_resets_the_streak() {
        let cb = breaker(3);
        cb.record(1, false).await.unwrap();
        cb.record(1, false).await.unwrap();
        cb.record(1, true).await.unwrap();
        cb.record(1, false).await.unwrap();
        cb.record(1, false).await.unwrap();
        assert!(!cb.is_open(1).await.unwrap(), "streak restarted after success");
        cb.record(1, false).await.unwrap();
        assert!(cb.is_open(1).await.unwrap());
    }

    #[tokio::test]
    async fn success_closes_an_open_breaker() {
        let cb = breaker(2);
        cb.record(3, false).await.unwrap();
        cb.record(3, false).await.unwrap();
        assert!(cb.is_open(3).await.unwrap());
        cb.record(3, true).await.unwrap();
        assert!(!cb.is_open(3).await.unwrap());
    }

    #[tokio::test]
    async fn sources_do_not_share_state() {
        let cb = breaker(2);
        cb.record(10, false).await.unwrap();
        cb.record(10, false).await.unwrap();
        assert!(cb.is_open(10).await.unwrap());
        assert!(!cb.is_open(11).await.unwrap());
    }
}
