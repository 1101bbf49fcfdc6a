use std::time::Duration;

use super::environment::parse_var;

pub const MIN_INTERVAL_SECS: u32 = 1;
pub const MAX_INTERVAL_SECS: u32 = 3600;
pub const DEFAULT_INTERVAL_SECS: u32 = 60;

/// Timing knobs for the collector loop.
#[derive(Debug, Clone)]
pub struct CollectorSettings {
    /// Sleep when the persisted plan is empty.
    pub idle_backoff: Duration,
    /// Sleep after skipping a plan entry whose task no longer exists.
    pub missing_task_backoff: Duration,
    /// Sleep after a failed fetch or merge.
    pub retry_backoff: Duration,
    /// How long `stop()` waits for the loop before aborting it.
    pub stop_grace: Duration,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            idle_backoff: Duration::from_secs(10),
            missing_task_backoff: Duration::from_secs(10),
            retry_backoff: Duration::from_secs(5),
            stop_grace: Duration::from_secs(1),
        }
    }
}

impl CollectorSettings {
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();

        let idle_secs = parse_var("COLLECTOR_IDLE_BACKOFF_SECS", defaults.idle_backoff.as_secs())?;
        let retry_secs = parse_var("COLLECTOR_RETRY_BACKOFF_SECS", defaults.retry_backoff.as_secs())?;
        let grace_ms = parse_var(
            "COLLECTOR_STOP_GRACE_MS",
            defaults.stop_grace.as_millis() as u64,
        )?;

        Ok(Self {
            idle_backoff: Duration::from_secs(idle_secs),
            missing_task_backoff: Duration::from_secs(idle_secs),
            retry_backoff: Duration::from_secs(retry_secs),
            stop_grace: Duration::from_millis(grace_ms),
        })
    }
}

pub fn interval_in_bounds(secs: i64) -> bool {
    (MIN_INTERVAL_SECS as i64..=MAX_INTERVAL_SECS as i64).contains(&secs)
}
