//! Server configuration.

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum number of actions accepted in a single pushed transaction.
    pub max_push_actions: usize,
    /// Maximum number of actions returned by a single pull.
    ///
    /// A longer backlog is truncated; the response's `sync_id` then points
    /// at the last included action so the client's next pull resumes from
    /// there.
    pub max_pull_batch: usize,
}

impl ServerConfig {
    /// Creates a configuration with default limits.
    pub fn new() -> Self {
        Self {
            max_push_actions: 100,
            max_pull_batch: 1000,
        }
    }

    /// Sets the maximum number of actions per pushed transaction.
    pub fn with_max_push_actions(mut self, max: usize) -> Self {
        self.max_push_actions = max;
        self
    }

    /// Sets the maximum number of actions per pull response.
    pub fn with_max_pull_batch(mut self, max: usize) -> Self {
        self.max_pull_batch = max;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.max_push_actions, 100);
        assert_eq!(config.max_pull_batch, 1000);
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new()
            .with_max_push_actions(5)
            .with_max_pull_batch(2);
        assert_eq!(config.max_push_actions, 5);
        assert_eq!(config.max_pull_batch, 2);
    }
}
