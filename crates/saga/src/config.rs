//! Coordinator tunables.

use std::time::Duration;

/// Retry and polling policy for the coordinator.
///
/// The defaults mirror the channel defaults; deployments tune them per
/// namespace rather than per saga.
#[derive(Debug, Clone, Copy)]
pub struct CoordinatorConfig {
    /// How many times a compensating task is retried before the saga is
    /// marked `Failed` for operator intervention.
    pub max_compensation_attempts: u32,

    /// Lease window used by restart recovery: a dispatched step older than
    /// this with no result is re-enqueued. Should match the channel lease.
    pub lease: Duration,

    /// How long one `next_result` call in the run loop waits before
    /// checking for shutdown.
    pub result_poll_timeout: Duration,

    /// How often the run loop sweeps the channel for expired leases.
    pub reclaim_interval: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_compensation_attempts: 3,
            lease: Duration::from_secs(5),
            result_poll_timeout: Duration::from_millis(500),
            reclaim_interval: Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.max_compensation_attempts, 3);
        assert_eq!(config.lease, Duration::from_secs(5));
        assert_eq!(config.result_poll_timeout, Duration::from_millis(500));
        assert_eq!(config.reclaim_interval, Duration::from_secs(1));
    }
}
