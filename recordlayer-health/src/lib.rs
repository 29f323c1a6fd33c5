//! Per-index circuit breaker (`spec.md` §4.11). Tracks consecutive
//! failures for a named index and, once a threshold is crossed, blocks
//! further use until a cooldown elapses and grants a single probing
//! retry — intended for callers like vector nearest-neighbor execution
//! that want to fall back to a flat scan rather than repeatedly hammer
//! a backend that is already failing.

mod config;
mod tracker;

pub use config::HealthConfig;
pub use tracker::{HealthSnapshot, HealthState, HealthTracker};
