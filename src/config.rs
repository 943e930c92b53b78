//! Service configuration.

use std::time::Duration;

/// Configuration shared by every component of the service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Path of the SQLite database file.
    pub database_path: String,
    /// Directory holding the binary dataset, model and index files.
    pub bin_dir: String,
    /// Redis connection URL for the job backend.
    pub redis_url: String,
    /// Name of the job submission queue.
    pub queue_name: String,
    /// Pause between outcome poller sweeps.
    pub sweep_interval: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            database_path: "kgforge.db".to_string(),
            bin_dir: "./binaries".to_string(),
            redis_url: "redis://localhost:6379".to_string(),
            queue_name: "kgforge_jobs".to_string(),
            sweep_interval: Duration::from_secs(5),
        }
    }
}

impl ServiceConfig {
    /// Sets the SQLite database path.
    pub fn with_database_path(mut self, path: impl Into<String>) -> Self {
        self.database_path = path.into();
        self
    }

    /// Sets the binaries directory.
    pub fn with_bin_dir(mut self, dir: impl Into<String>) -> Self {
        self.bin_dir = dir.into();
        self
    }

    /// Sets the Redis connection URL.
    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = url.into();
        self
    }

    /// Sets the job queue name.
    pub fn with_queue_name(mut self, name: impl Into<String>) -> Self {
        self.queue_name = name.into();
        self
    }

    /// Sets the pause between outcome poller sweeps.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.database_path, "kgforge.db");
        assert_eq!(config.bin_dir, "./binaries");
        assert_eq!(config.redis_url, "redis://localhost:6379");
        assert_eq!(config.queue_name, "kgforge_jobs");
        assert_eq!(config.sweep_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_builders() {
        let config = ServiceConfig::default()
            .with_database_path("/tmp/test.db")
            .with_bin_dir("/tmp/binaries")
            .with_redis_url("redis://redis:6379")
            .with_queue_name("jobs")
            .with_sweep_interval(Duration::from_millis(100));

        assert_eq!(config.database_path, "/tmp/test.db");
        assert_eq!(config.bin_dir, "/tmp/binaries");
        assert_eq!(config.redis_url, "redis://redis:6379");
        assert_eq!(config.queue_name, "jobs");
        assert_eq!(config.sweep_interval, Duration::from_millis(100));
    }
}
