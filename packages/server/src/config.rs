use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Stable identifier for this worker instance. Defaults to a generated one.
    pub worker_id: Option<String>,
    /// Seconds to sleep between empty job polls.
    pub job_poll_interval_secs: u64,
    /// Maximum jobs claimed per poll.
    pub job_batch_size: i64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            worker_id: env::var("WORKER_ID").ok(),
            job_poll_interval_secs: env::var("JOB_POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("JOB_POLL_INTERVAL_SECS must be a valid number")?,
            job_batch_size: env::var("JOB_BATCH_SIZE")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("JOB_BATCH_SIZE must be a valid number")?,
        })
    }
}
