use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres — source of truth and work-in-flight queue.
    pub database_url: String,
    /// Optional Redis for rate-limit counters and breaker state. When unset,
    /// counters fall back to a process-local store.
    pub redis_url: Option<String>,
    /// Institutional User-Agent sent on every request. Never rotated.
    pub user_agent: String,
    /// Data directory for snapshot blobs.
    pub data_dir: std::path::PathBuf,

    // Pool concurrency budgets
    pub fast_pool_workers: usize,
    pub render_pool_workers: usize,
    pub deep_pool_workers: usize,

    /// Queue depth per pool above which the scheduler throttles dispatches.
    pub queue_high_water: u64,

    // Gating (seconds). Independent of transport timeouts: these drive the
    // state machine, not retries.
    pub gate_fast_secs: i64,
    pub gate_render_secs: i64,

    /// Quarantine TTL before expiry (seconds).
    pub quarantine_ttl_secs: i64,
    /// Inactivity horizon after which HOT / PARTIAL_ENRICH events expire.
    pub inactivity_horizon_secs: i64,

    /// Score threshold for the HOT transition.
    pub hot_threshold: f64,
    /// Velocity (docs per trailing window) considered extreme for the
    /// unverified-viral flag.
    pub viral_velocity: f64,
    /// Plantão decay half-life in hours.
    pub decay_half_life_hours: f64,

    /// Alert cooldown per event (seconds).
    pub alert_cooldown_secs: i64,

    /// Consecutive failures that open a source's circuit breaker.
    pub breaker_threshold: u32,
    /// Breaker cooldown window (seconds).
    pub breaker_cooldown_secs: u64,

    /// Clustering: minimum simhash similarity for near-duplicate attach.
    pub near_dup_threshold: f64,
    /// Clustering: minimum lexical similarity for same-event attach.
    pub same_event_threshold: f64,
    /// Clustering time window (hours) for anchor and lexical linkage.
    pub cluster_window_hours: i64,
    /// Domains whose documents quarantine their events on sight.
    pub blacklist_domains: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            redis_url: env::var("REDIS_URL").ok(),
            user_agent: env::var("RADAR_USER_AGENT").unwrap_or_else(|_| {
                "RadarPautas/0.1 (institutional; newsroom monitoring)".to_string()
            }),
            data_dir: std::path::PathBuf::from(
                env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()),
            ),
            fast_pool_workers: env_usize("RADAR_FAST_WORKERS", 8),
            render_pool_workers: env_usize("RADAR_RENDER_WORKERS", 2),
            deep_pool_workers: env_usize("RADAR_DEEP_WORKERS", 2),
            queue_high_water: env_parse("RADAR_QUEUE_HIGH_WATER", 200),
            gate_fast_secs: env_parse("RADAR_GATE_FAST_S", 15),
            gate_render_secs: env_parse("RADAR_GATE_RENDER_S", 45),
            quarantine_ttl_secs: env_parse("RADAR_QUARANTINE_TTL_S", 900),
            inactivity_horizon_secs: env_parse("RADAR_INACTIVITY_HORIZON_S", 21_600),
            hot_threshold: env_parse("RADAR_HOT_THRESHOLD", 55.0),
            viral_velocity: env_parse("RADAR_VIRAL_VELOCITY", 50.0),
            decay_half_life_hours: env_parse("RADAR_DECAY_HALF_LIFE_H", 2.0),
            alert_cooldown_secs: env_parse("RADAR_ALERT_COOLDOWN_S", 300),
            breaker_threshold: env_parse("RADAR_BREAKER_THRESHOLD", 5),
            breaker_cooldown_secs: env_parse("RADAR_BREAKER_COOLDOWN_S", 120),
            near_dup_threshold: env_parse("RADAR_NEAR_DUP_THRESHOLD", 0.92),
            same_event_threshold: env_parse("RADAR_SAME_EVENT_THRESHOLD", 0.35),
            cluster_window_hours: env_parse("RADAR_CLUSTER_WINDOW_H", 24),
            blacklist_domains: env::var("RADAR_BLACKLIST_DOMAINS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
