use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::config::HealthConfig;

/// `spec.md` §4.11 "State: one of {healthy, failed, retrying}".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Failed,
    Retrying,
}

#[derive(Debug, Clone, Copy)]
struct IndexHealth {
    state: HealthState,
    total_successes: u64,
    total_failures: u64,
    consecutive_failures: u32,
    last_failure_time: Option<Instant>,
    retries_used: u32,
}

impl Default for IndexHealth {
    fn default() -> Self {
        Self { state: HealthState::Healthy, total_successes: 0, total_failures: 0, consecutive_failures: 0, last_failure_time: None, retries_used: 0 }
    }
}

/// A read-only view of one index's counters, for callers that want to
/// report or test against the tracker's state without mutating it.
#[derive(Debug, Clone, Copy)]
pub struct HealthSnapshot {
    pub state: HealthState,
    pub total_successes: u64,
    pub total_failures: u64,
    pub consecutive_failures: u32,
}

/// Per-index circuit breaker (`spec.md` §4.11). One instance is shared
/// across all callers of a given schema; state lives in a `DashMap` keyed
/// by index name so unrelated indexes never contend on the same shard
/// lock (`spec.md` §5 "Health tracker uses atomic counters per (index
/// name) with a short mutex for state transitions" — `DashMap`'s sharded
/// `RwLock`s are that short mutex, scoped per key instead of hand-rolled).
pub struct HealthTracker {
    config: HealthConfig,
    states: DashMap<String, IndexHealth>,
}

impl HealthTracker {
    pub fn new(config: HealthConfig) -> Self { Self { config, states: DashMap::new() } }

    /// `true` when `index` may be used right now; `false` carries a
    /// human-readable reason (circuit open, or a retry already in
    /// flight). A `healthy`→`true` call never starts a retry; a
    /// `failed` index past its cooldown transitions to `retrying` and
    /// is allowed through exactly once until that attempt resolves via
    /// [`Self::record_success`] or [`Self::record_failure`].
    pub fn should_use(&self, index: &str) -> (bool, Option<String>) {
        let mut entry = self.states.entry(index.to_string()).or_default();
        match entry.state {
            HealthState::Healthy => (true, None),
            HealthState::Retrying => (false, Some(format!("index '{index}' already has a retry in flight"))),
            HealthState::Failed => {
                if entry.retries_used >= self.config.max_retries {
                    return (false, Some(format!("index '{index}' exhausted {} retries, needs reset", self.config.max_retries)));
                }
                let elapsed = entry.last_failure_time.map(|t| t.elapsed()).unwrap_or(Duration::MAX);
                if elapsed >= self.config.retry_delay {
                    entry.state = HealthState::Retrying;
                    (true, None)
                } else {
                    (false, Some(format!("index '{index}' cooling down, {:?} remaining", self.config.retry_delay.saturating_sub(elapsed))))
                }
            }
        }
    }

    pub fn record_success(&self, index: &str) {
        let mut entry = self.states.entry(index.to_string()).or_default();
        entry.total_successes += 1;
        entry.consecutive_failures = 0;
        entry.retries_used = 0;
        entry.state = HealthState::Healthy;
        debug!(index, "recorded success, circuit closed");
    }

    pub fn record_failure(&self, index: &str, err: &str) {
        let mut entry = self.states.entry(index.to_string()).or_default();
        entry.total_failures += 1;
        entry.consecutive_failures += 1;
        entry.last_failure_time = Some(Instant::now());
        if entry.state == HealthState::Retrying {
            entry.retries_used += 1;
        }
        if entry.consecutive_failures >= self.config.failure_threshold {
            entry.state = HealthState::Failed;
            warn!(index, err, consecutive_failures = entry.consecutive_failures, "index marked failed");
        }
    }

    /// Clears all state for `index` (`spec.md` §4.11 "used on index
    /// rebuild").
    pub fn reset(&self, index: &str) {
        self.states.remove(index);
        debug!(index, "health state reset");
    }

    pub fn snapshot(&self, index: &str) -> HealthSnapshot {
        let entry = self.states.entry(index.to_string()).or_default();
        HealthSnapshot { state: entry.state, total_successes: entry.total_successes, total_failures: entry.total_failures, consecutive_failures: entry.consecutive_failures }
    }
}
