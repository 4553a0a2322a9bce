use thiserror::Error;

pub type RadarResult<T> = std::result::Result<T, RadarError>;

/// Error taxonomy for the pipeline. The fetcher classifies every failure
/// into one of these kinds; the kind decides retry, breaker and scheduling
/// behaviour.
#[derive(Error, Debug)]
pub enum RadarError {
    /// Network-level failure: DNS, TLS, connect, read. Retried with backoff
    /// within the pool's attempt budget; counts against the circuit breaker.
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status. 4xx surfaces without retry (408/429 back
    /// off), 5xx retries within budget.
    #[error("http status {0}")]
    Http(u16),

    /// Unparseable or empty payload. Not retried; the attempt is recorded
    /// and no document is created.
    #[error("content error: {0}")]
    Content(String),

    /// Request rejected locally before the network: SSRF block, rate limit,
    /// domain concurrency, body cap. Waits for the next cadence tick.
    #[error("policy violation: {0}")]
    Policy(String),

    /// Database or queue failure. Retried locally with bounded backoff,
    /// escalates if persistent.
    #[error("storage error: {0}")]
    Storage(String),

    /// Invariant violation. Fatal for the job; no state change is applied.
    #[error("logic error: {0}")]
    Logic(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RadarError {
    /// Short class name recorded on `fetch_attempts.error_class`.
    pub fn class(&self) -> &'static str {
        match self {
            RadarError::Transport(_) => "Transport",
            RadarError::Http(_) => "Http",
            RadarError::Content(_) => "Content",
            RadarError::Policy(_) => "Policy",
            RadarError::Storage(_) => "Storage",
            RadarError::Logic(_) => "Logic",
            RadarError::Other(_) => "Other",
        }
    }

    /// Whether the fetcher may retry this failure within the attempt budget.
    pub fn is_retryable(&self) -> bool {
        match self {
            RadarError::Transport(_) => true,
            RadarError::Http(status) => matches!(status, 408 | 429) || *status >= 500,
            RadarError::Storage(_) => true,
            _ => false,
        }
    }

    /// Whether this failure counts toward opening the circuit breaker.
    pub fn trips_breaker(&self) -> bool {
        match self {
            RadarError::Transport(_) => true,
            RadarError::Http(status) => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_retry_classes() {
        assert!(RadarError::Http(429).is_retryable());
        assert!(RadarError::Http(408).is_retryable());
        assert!(RadarError::Http(503).is_retryable());
        assert!(!RadarError::Http(404).is_retryable());
        assert!(!RadarError::Http(403).is_retryable());
    }

    #[test]
    fn content_and_policy_never_retry() {
        assert!(!RadarError::Content("empty body".into()).is_retryable());
        assert!(!RadarError::Policy("ssrf".into()).is_retryable());
        assert!(!RadarError::Logic("self merge".into()).is_retryable());
    }

    #[test]
    fn transport_trips_breaker() {
        assert!(RadarError::Transport("refused".into()).trips_breaker());
        assert!(RadarError::Http(502).trips_breaker());
        assert!(!RadarError::Http(404).trips_breaker());
        assert!(!RadarError::Content("x".into()).trips_breaker());
    }
}
