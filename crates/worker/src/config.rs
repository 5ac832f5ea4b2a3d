use std::time::Duration;

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Maximum concurrently executing tasks (default: `10`).
    pub concurrency: usize,
    /// Delay between claim rounds when the queues are idle (default: 500 ms).
    pub poll_interval: Duration,
    /// Grace period for in-flight tasks on shutdown (default: 30 s).
    pub shutdown_timeout: Duration,
    /// How often abandoned `active` tasks are swept (default: 60 s).
    pub stale_check_interval: Duration,
    /// Connection pool size (default: `15`).
    pub db_max_connections: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            poll_interval: Duration::from_millis(500),
            shutdown_timeout: Duration::from_secs(30),
            stale_check_interval: Duration::from_secs(60),
            db_max_connections: 15,
        }
    }
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default |
    /// |---------------------------|---------|
    /// | `WORKER_CONCURRENCY`      | `10`    |
    /// | `WORKER_POLL_INTERVAL_MS` | `500`   |
    /// | `SHUTDOWN_TIMEOUT_SECS`   | `30`    |
    /// | `STALE_TASK_CHECK_SECS`   | `60`    |
    /// | `DB_MAX_CONNECTIONS`      | `15`    |
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            concurrency: env_parse("WORKER_CONCURRENCY")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.concurrency),
            poll_interval: env_parse("WORKER_POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            shutdown_timeout: env_parse("SHUTDOWN_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
            stale_check_interval: env_parse("STALE_TASK_CHECK_SECS")
                .filter(|n: &u64| *n > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.stale_check_interval),
            db_max_connections: env_parse("DB_MAX_CONNECTIONS").unwrap_or(defaults.db_max_connections),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
