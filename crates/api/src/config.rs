//! Application configuration loaded from environment variables.

/// Server and runtime configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `POLL_INTERVAL_MS` — worker poll interval (default: `200`)
/// - `WORKER_CONCURRENCY` — pollers per task kind (default: `1`)
/// - `LEASE_MS` — task lease window (default: `5000`)
/// - `MAX_DELIVERIES` — deliveries before a task is failed (default: `3`)
/// - `MAX_COMPENSATION_ATTEMPTS` — retries per compensating step (default: `3`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub poll_interval_ms: u64,
    pub worker_concurrency: usize,
    pub lease_ms: u64,
    pub max_deliveries: u32,
    pub max_compensation_attempts: u32,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: parsed_var("PORT", defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            poll_interval_ms: parsed_var("POLL_INTERVAL_MS", defaults.poll_interval_ms),
            worker_concurrency: parsed_var("WORKER_CONCURRENCY", defaults.worker_concurrency),
            lease_ms: parsed_var("LEASE_MS", defaults.lease_ms),
            max_deliveries: parsed_var("MAX_DELIVERIES", defaults.max_deliveries),
            max_compensation_attempts: parsed_var(
                "MAX_COMPENSATION_ATTEMPTS",
                defaults.max_compensation_attempts,
            ),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            poll_interval_ms: 200,
            worker_concurrency: 1,
            lease_ms: 5000,
            max_deliveries: 3,
            max_compensation_attempts: 3,
        }
    }
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
