#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct JobQueueLimits {
    /// Jobs accepted but not yet finished, across all keys.
    pub max_pending:     usize,
    /// Keys whose jobs may execute at the same time.
    pub max_concurrency: usize,
}

impl Default for JobQueueLimits {
    fn default() -> Self {
        Self {
            max_pending:     10_000,
            max_concurrency: 16,
        }
    }
}

impl JobQueueLimits {
    pub fn unbounded() -> Self {
        Self {
            max_pending:     usize::MAX,
            max_concurrency: tokio::sync::Semaphore::MAX_PERMITS,
        }
    }
}
