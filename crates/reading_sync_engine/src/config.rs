//! Configuration for the sync engine.

use std::time::Duration;

/// Name of the notebook every managed note lives in.
pub const DEFAULT_NOTEBOOK_NAME: &str = "SectionReading";

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Canonical notebook name, compared by exact string equality.
    pub notebook_name: String,
    /// Deadline applied to every remote call, if any.
    pub remote_timeout: Option<Duration>,
    /// Number of jobs the serialized lane can queue before callers wait.
    pub lane_capacity: usize,
}

impl SyncConfig {
    /// Creates a new sync configuration with default values.
    pub fn new() -> Self {
        Self {
            notebook_name: DEFAULT_NOTEBOOK_NAME.to_string(),
            remote_timeout: Some(Duration::from_secs(30)),
            lane_capacity: 16,
        }
    }

    /// Sets the canonical notebook name.
    pub fn with_notebook_name(mut self, name: impl Into<String>) -> Self {
        self.notebook_name = name.into();
        self
    }

    /// Sets the per-call remote timeout.
    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = Some(timeout);
        self
    }

    /// Lets remote calls run without a deadline.
    pub fn without_remote_timeout(mut self) -> Self {
        self.remote_timeout = None;
        self
    }

    /// Sets the lane queue capacity (at least 1).
    pub fn with_lane_capacity(mut self, capacity: usize) -> Self {
        self.lane_capacity = capacity.max(1);
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}
