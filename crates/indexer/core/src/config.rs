use shardex_types::ShardNumber;
use std::time::Duration;

/// Default pause between two sync cycles.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(10);

/// Default number of worker pool tasks.
pub const DEFAULT_WORKER_COUNT: usize = 8;

/// Default number of touched accounts that triggers a flush during catch-up.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 1_000;

/// Configuration of one shard syncer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Shard to synchronize.
    pub shard: ShardNumber,
    /// Interval between the starts of two cycles.
    pub interval: Duration,
    /// Number of worker pool tasks.
    pub worker_count: usize,
    /// Number of touched accounts after which catch-up flushes them.
    pub flush_threshold: usize,
}

impl SyncConfig {
    /// Creates a configuration for `shard` with default settings.
    pub const fn new(shard: ShardNumber) -> Self {
        Self {
            shard,
            interval: DEFAULT_SYNC_INTERVAL,
            worker_count: DEFAULT_WORKER_COUNT,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
        }
    }

    /// Sets the cycle interval.
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the worker count. A count of zero is raised to one.
    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count.max(1);
        self
    }

    /// Sets the flush threshold. A threshold of zero is raised to one.
    pub fn with_flush_threshold(mut self, flush_threshold: usize) -> Self {
        self.flush_threshold = flush_threshold.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_values_are_clamped() {
        let config = SyncConfig::new(1).with_worker_count(0).with_flush_threshold(0);
        assert_eq!(config.worker_count, 1);
        assert_eq!(config.flush_threshold, 1);
        assert_eq!(config.interval, DEFAULT_SYNC_INTERVAL);
    }
}
