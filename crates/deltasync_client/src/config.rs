//! Client configuration.

use std::time::Duration;

/// Tunables for the sync client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Interval between scheduled pulls.
    pub poll_interval: Duration,
    /// Whether a successful pull triggers a flush of the offline queue.
    pub flush_after_pull: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            flush_after_pull: true,
        }
    }
}

impl ClientConfig {
    /// Creates a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the pull polling interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets whether pulls trigger a queue flush.
    pub fn with_flush_after_pull(mut self, flush: bool) -> Self {
        self.flush_after_pull = flush;
        self
    }
}
