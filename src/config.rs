use std::time::Duration;

/// Process-wide configuration, loaded once at boot from the
/// environment: bind address, worker count, queue backpressure limit,
/// ack deadline, and the plugin-image trust whitelist.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub ack_deadline: Duration,
    pub trusted_image_globs: Vec<String>,
    pub database_url: Option<String>,
}

impl ServerConfig {
    /// Load from the environment, applying defaults (backpressure 999,
    /// ack deadline 30 minutes) where a variable is unset, and sizing
    /// the worker pool to the available CPUs.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let bind_addr = std::env::var("GANTRY_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
        let worker_count = std::env::var("GANTRY_WORKERS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(num_cpus_fallback);
        let queue_capacity = std::env::var("GANTRY_QUEUE_CAPACITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(gantry_queue::DEFAULT_CAPACITY);
        let ack_deadline = std::env::var("GANTRY_ACK_DEADLINE_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(gantry_queue::DEFAULT_ACK_DEADLINE);
        let trusted_image_globs = std::env::var("GANTRY_TRUSTED_IMAGES")
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_else(|_| vec!["plugins/*".to_string()]);
        let database_url = std::env::var("DATABASE_URL").ok();

        Self {
            bind_addr,
            worker_count,
            queue_capacity,
            ack_deadline,
            trusted_image_globs,
            database_url,
        }
    }
}

fn num_cpus_fallback() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_env_is_unset() {
        std::env::remove_var("GANTRY_QUEUE_CAPACITY");
        std::env::remove_var("GANTRY_ACK_DEADLINE_SECS");
        std::env::remove_var("GANTRY_TRUSTED_IMAGES");
        let config = ServerConfig::from_env();
        assert_eq!(config.queue_capacity, gantry_queue::DEFAULT_CAPACITY);
        assert_eq!(config.ack_deadline, gantry_queue::DEFAULT_ACK_DEADLINE);
        assert!(!config.trusted_image_globs.is_empty());
    }
}
