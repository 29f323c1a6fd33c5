use thiserror::Error;

use crate::key_expr::KeyExpression;

/// `spec.md` §3 "Index": the kind tag dispatching to a maintainer variant
/// in `recordlayer-index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    Value,
    Unique,
    Rank,
    Count,
    Sum,
    Min,
    Max,
    Average,
    Version,
    Vector,
    Spatial,
    RangeComponent,
}

impl IndexKind {
    /// Aggregate kinds store one value per group-by prefix rather than one
    /// entry per key-expression tuple (`spec.md` §4.3).
    pub fn is_aggregate(self) -> bool { matches!(self, IndexKind::Count | IndexKind::Sum | IndexKind::Min | IndexKind::Max | IndexKind::Average) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorMetric {
    Euclidean,
    Cosine,
    DotProduct,
}

/// Kind-specific configuration. `spec.md` §4.2 "optional per-index
/// configuration (e.g., vector-index parameters)".
#[derive(Debug, Clone, PartialEq)]
pub enum IndexOptions {
    None,
    /// For aggregate kinds: how many leading tuple positions of `root`'s
    /// evaluation form the group-by key; the remaining position (there
    /// must be exactly one) is the aggregated numeric value.
    Aggregate { group_by_arity: usize },
    Vector { dimensions: usize, metric: VectorMetric },
    Spatial,
}

/// `spec.md` §3 "Index state machine": `DISABLED -> WRITE_ONLY -> READABLE`,
/// `READABLE -> WRITE_ONLY` for rebuilds. Transitions are administrator
/// initiated; this type only validates which transitions are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum IndexState {
    Disabled,
    WriteOnly,
    Readable,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexStateError {
    #[error("illegal index state transition {from:?} -> {to:?}")]
    IllegalTransition { from: IndexState, to: IndexState },
}

impl IndexState {
    /// `spec.md` §3: DISABLED -> WRITE_ONLY, WRITE_ONLY -> READABLE,
    /// READABLE -> WRITE_ONLY (rebuild). WRITE_ONLY -> DISABLED and
    /// READABLE -> DISABLED are also administrator-initiated rollbacks and
    /// are permitted; READABLE -> READABLE / WRITE_ONLY -> WRITE_ONLY /
    /// DISABLED -> DISABLED are no-ops permitted for idempotent callers.
    pub fn validate_transition(self, to: IndexState) -> Result<(), IndexStateError> {
        use IndexState::*;
        let legal = match (self, to) {
            (a, b) if a == b => true,
            (Disabled, WriteOnly) => true,
            (WriteOnly, Readable) => true,
            (Readable, WriteOnly) => true,
            (WriteOnly, Disabled) => true,
            (Readable, Disabled) => true,
            _ => false,
        };
        if legal { Ok(()) } else { Err(IndexStateError::IllegalTransition { from: self, to }) }
    }

    /// `spec.md` §3: maintainers fire for WRITE_ONLY and READABLE, not DISABLED.
    pub fn maintains_on_write(self) -> bool { !matches!(self, IndexState::Disabled) }

    /// `spec.md` §3: only READABLE indexes are visible to the planner.
    pub fn is_queryable(self) -> bool { matches!(self, IndexState::Readable) }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexDef {
    pub name: String,
    pub kind: IndexKind,
    pub root: KeyExpression,
    pub record_types: Vec<String>,
    pub options: IndexOptions,
    pub state: IndexState,
}

impl IndexDef {
    pub fn new(name: impl Into<String>, kind: IndexKind, root: KeyExpression, record_types: Vec<String>) -> Self {
        Self { name: name.into(), kind, root, record_types, options: IndexOptions::None, state: IndexState::Disabled }
    }

    pub fn with_options(mut self, options: IndexOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_state(mut self, state: IndexState) -> Self {
        self.state = state;
        self
    }

    pub fn applies_to(&self, record_type: &str) -> bool { self.record_types.iter().any(|t| t == record_type) }
}
