use recordlayer_query::Filter;
use recordlayer_tuple::Value;

/// `spec.md` §4.7: the physical plan shapes the planner chooses between.
/// This crate only describes the chosen plan; `recordlayer-physical`
/// carries the execution operators that walk it against a `KvTransaction`.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    /// `spec.md` §4.7 "IndexScan(index, beginValues, endValues,
    /// strictness)". `begin`/`end` of `None` mean unbounded on that side.
    /// `begin_exclusive` realizes `Gt` (skip entries at `begin` itself);
    /// `end_inclusive` realizes `Le` and equality (extend to include all
    /// entries under `end`'s prefix, per "`end` is extended by a single
    /// `0xFF` byte" for equality scans).
    IndexScan { index: String, begin: Option<Vec<Value>>, begin_exclusive: bool, end: Option<Vec<Value>>, end_inclusive: bool },
    /// `spec.md` §4.7 "Intersection(children[])": merges sorted-by-PK
    /// streams, emitting iff a PK appears in every child.
    Intersection(Vec<Plan>),
    /// One candidate per branch of a top-level `Or` (typically produced by
    /// `rewrite`'s DNF conversion, `spec.md` §4.6 step 2), executed
    /// independently and deduplicated by primary key in first-seen order,
    /// the same way `InJoin` deduplicates across its per-value sub-scans.
    Union(Vec<Plan>),
    /// `spec.md` §4.7 "InJoin(field, values[], index)".
    InJoin { field: String, values: Vec<Value>, index: String },
    /// `spec.md` §4.7 "NearestNeighbors(index, query, k, filter?)".
    NearestNeighbors { index: String, query: Vec<f64>, k: usize, filter: Option<Box<Filter>> },
    /// `spec.md` §4.6 "A `FilterPlan(remainingFilter)` wraps any candidate
    /// whose index does not cover the full predicate".
    Filter { child: Box<Plan>, remaining: Filter },
    /// `spec.md` §4.7 "FullScan — range-read over the entity's
    /// primary-key subspace."
    FullScan { record_type: String },
    /// `spec.md` §4.8: "If `W` is empty... the planner returns an empty
    /// plan immediately", and the same shape serves as the zero-candidate
    /// fallback when a required index is entirely missing.
    Empty,
}

impl Plan {
    /// `IndexScan` for an equality leaf: `begin == end`, end extended to
    /// cover every entry whose value-prefix equals `value`.
    pub fn equality_scan(index: impl Into<String>, value: Vec<Value>) -> Self {
        Plan::IndexScan { index: index.into(), begin: Some(value.clone()), begin_exclusive: false, end: Some(value), end_inclusive: true }
    }

    pub fn filtered(self, remaining: Option<Filter>) -> Plan {
        match remaining {
            Some(f) => Plan::Filter { child: Box::new(self), remaining: f },
            None => self,
        }
    }
}
