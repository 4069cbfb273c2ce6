//! Runtime knobs for the coordinator and worker processes.
//!
//! Everything here has a sensible default, can be overridden through the
//! environment, and (where a flag exists) through the CLI. Nothing is
//! auto-tuned.

use std::env;
use std::time::Duration;

/// How long an `IN_PROGRESS` task may run before the monitor reclaims it.
pub const DEFAULT_TASK_TIMEOUT_MS: u64 = 10_000;

/// How long a worker sleeps after a `WAIT` reply before asking again.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 200;

/// Deadline for a single RPC round trip, so a partitioned peer cannot stall
/// a handler forever.
pub const DEFAULT_IO_TIMEOUT_MS: u64 = 10_000;

const TASK_TIMEOUT_ENV: &str = "MR_TASK_TIMEOUT_MS";
const POLL_INTERVAL_ENV: &str = "MR_POLL_INTERVAL_MS";

#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub task_timeout: Duration,
    pub poll_interval: Duration,
    pub io_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            task_timeout: Duration::from_millis(DEFAULT_TASK_TIMEOUT_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            io_timeout: Duration::from_millis(DEFAULT_IO_TIMEOUT_MS),
        }
    }
}

impl Config {
    /// Defaults overlaid with any environment overrides.
    ///
    /// Unparsable values are ignored rather than fatal; a typo in an env
    /// var must not take a whole job down.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(ms) = env_ms(TASK_TIMEOUT_ENV) {
            config.task_timeout = ms;
        }
        if let Some(ms) = env_ms(POLL_INTERVAL_ENV) {
            config.poll_interval = ms;
        }
        config
    }

    /// CLI override for the task timeout; strongest of the three layers.
    pub fn with_task_timeout_ms(mut self, ms: Option<u64>) -> Self {
        if let Some(ms) = ms {
            self.task_timeout = Duration::from_millis(ms);
        }
        self
    }
}

fn env_ms(name: &str) -> Option<Duration> {
    env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
}
