use federa_common::validation::Validate;
use federa_jobs::JobQueueLimits;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenerationPolicy {
    /// Entity messages older than the ring's known generation are dropped.
    #[default]
    RejectStale,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RaConfig {
    /// Messages admitted but not yet turned into jobs.
    pub message_queue_depth: usize,
    pub jobs:                JobQueueLimits,
    pub generation_policy:   GenerationPolicy,
}

impl Default for RaConfig {
    fn default() -> Self {
        Self {
            message_queue_depth: 1024,
            jobs:                JobQueueLimits::default(),
            generation_policy:   GenerationPolicy::default(),
        }
    }
}

impl Validate for RaConfig {
    fn check(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.message_queue_depth == 0 {
            errors.push("message_queue_depth must be positive".to_owned());
        }
        if self.jobs.max_pending == 0 {
            errors.push("jobs.max_pending must be positive".to_owned());
        }
        if self.jobs.max_concurrency == 0 {
            errors.push("jobs.max_concurrency must be positive".to_owned());
        }
        errors
    }
}
