use std::time::Duration;

/// Circuit-breaker tunables (`spec.md` §4.11 "Configuration:
/// failureThreshold, retryDelaySeconds, maxRetries").
#[derive(Debug, Clone, Copy)]
pub struct HealthConfig {
    /// Consecutive failures before an index is marked `failed`.
    pub failure_threshold: u32,
    /// Cooldown before a `failed` index gets one retry attempt.
    pub retry_delay: Duration,
    /// Retry attempts granted after the cooldown before the index is
    /// treated as permanently unusable until an explicit `reset`.
    pub max_retries: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, retry_delay: Duration::from_secs(30), max_retries: 3 }
    }
}
