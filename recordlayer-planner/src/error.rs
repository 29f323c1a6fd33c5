use thiserror::Error;

/// `spec.md` §4.6 "Failure": surfaced only when an index the query
/// requires is missing/not `READABLE` and no fallback exists; every other
/// situation degrades to `FullScan + FilterPlan` instead of erroring.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlannerError {
    #[error("no viable index for record type {record_type:?} and no full-scan fallback available")]
    NoViableIndex { record_type: String },
}
