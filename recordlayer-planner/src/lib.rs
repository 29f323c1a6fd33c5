//! Filter rewrite, candidate generation, cost estimation, and plan cache
//! (`spec.md` §4.6 "Query planner"). Grounded on `storage/common/src/
//! planner.rs`'s `Planner::plan()` stub, whose accompanying test suite
//! specifies the six-step pipeline this crate actually implements.

mod cache;
mod candidate;
mod config;
mod cost;
mod error;
mod fingerprint;
mod in_extract;
mod plan;
mod query;
mod rewrite;
mod stats;

use std::collections::HashMap;

use recordlayer_query::{Filter, FilterLeaf};
use recordlayer_query::boundary::intersect_windows;
use recordlayer_schema::Schema;

pub use cache::PlanCache;
pub use candidate::generate_candidates;
pub use config::PlannerConfig;
pub use cost::{estimate_cost, select_best, Cost};
pub use error::PlannerError;
pub use fingerprint::fingerprint;
pub use in_extract::{extract_in_leaves, ExtractedIn};
pub use plan::Plan;
pub use query::{Query, SortKey};
pub use rewrite::rewrite;
pub use stats::{Histogram, HistogramBucket, StatisticsManager, TableStats};

/// `spec.md` §4.8 "range window prefilter": merges sibling `Overlaps`
/// leaves on the same field within a top-level conjunction into one
/// narrowed window, short-circuiting to `None` the instant two windows on
/// the same field can't overlap at all. Only looks at the outermost
/// `And`; `Overlaps` leaves nested under `Or`/`Not` are left alone since
/// they aren't jointly required.
fn narrow_overlap_windows(filter: &Filter) -> Option<Filter> {
    let Filter::And(children) = filter else {
        return Some(filter.clone());
    };

    let mut by_field: HashMap<String, recordlayer_schema::RangeValue> = HashMap::new();
    let mut others = Vec::new();
    for child in children {
        match child {
            Filter::Leaf(FilterLeaf::Overlaps { field, query }) => match by_field.remove(field) {
                Some(existing) => {
                    let merged = intersect_windows(&existing, query)?;
                    by_field.insert(field.clone(), merged);
                }
                None => {
                    by_field.insert(field.clone(), query.clone());
                }
            },
            other => others.push(other.clone()),
        }
    }

    let mut merged_children: Vec<Filter> =
        by_field.into_iter().map(|(field, query)| Filter::Leaf(FilterLeaf::Overlaps { field, query })).collect();
    merged_children.extend(others);
    Some(match merged_children.len() {
        1 => merged_children.into_iter().next().unwrap(),
        _ => Filter::And(merged_children),
    })
}

/// `spec.md` §4.6 "Query planner" end to end: cache lookup, rewrite,
/// range-window prefilter, candidate generation, cost-based selection,
/// cache insertion.
///
/// Callers supply `now_epoch_secs` for every call (this crate never reads
/// the system clock itself), mirroring `StatisticsManager`'s
/// caller-supplied timestamps so planning stays deterministic and
/// reproducible in tests.
pub struct Planner {
    config: PlannerConfig,
    stats: StatisticsManager,
    cache: PlanCache,
}

impl Planner {
    pub fn new(config: PlannerConfig) -> Self {
        let cache = PlanCache::new(config.cache_capacity, config.cache_ttl_secs);
        Self { config, stats: StatisticsManager::new(), cache }
    }

    pub fn statistics(&self) -> &StatisticsManager { &self.stats }

    pub fn cache(&self) -> &PlanCache { &self.cache }

    /// Runs the full pipeline; returns `Ok(Plan::Empty)` immediately when
    /// the range-window prefilter detects a logically impossible
    /// conjunction (`spec.md` §4.8), and `Err` only when candidate
    /// generation produces nothing at all (it always includes a
    /// `FullScan` fallback, so this is effectively unreachable today but
    /// kept for the eventuality that a future candidate source opts out
    /// of the fallback).
    pub fn plan(&self, schema: &Schema, query: &Query, now_epoch_secs: u64) -> Result<Plan, PlannerError> {
        let key = fingerprint(query);
        if let Some(cached) = self.cache.get(&key, now_epoch_secs) {
            return Ok(cached);
        }

        let rewritten = rewrite(&query.filter, &self.config);

        let chosen = match narrow_overlap_windows(&rewritten) {
            None => Plan::Empty,
            Some(windowed) => {
                let candidates = generate_candidates(&query.record_type, &windowed, schema, self.config.max_candidate_plans);
                select_best(&candidates, &self.stats)
                    .cloned()
                    .ok_or_else(|| PlannerError::NoViableIndex { record_type: query.record_type.clone() })?
            }
        };

        self.cache.insert(key, chosen.clone(), now_epoch_secs);
        Ok(chosen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recordlayer_schema::{BoundaryType, Entity, FieldDescriptor, FieldType, IndexDef, IndexKind, IndexState, KeyExpression, RangeComponent, RangeValue};
    use recordlayer_tuple::Value;

    fn booking_schema() -> Schema {
        let mut schema = Schema::new();
        schema
            .add_entity(Entity::new("Booking", vec![FieldDescriptor::scalar("bookingID", 1, FieldType::Int)], KeyExpression::field("bookingID")))
            .unwrap();
        schema
            .add_index(
                IndexDef::new(
                    "period_lower",
                    IndexKind::RangeComponent,
                    KeyExpression::range("period", RangeComponent::LowerBound, BoundaryType::HalfOpen),
                    vec!["Booking".into()],
                )
                .with_state(IndexState::Readable),
            )
            .unwrap();
        schema
            .add_index(
                IndexDef::new(
                    "period_upper",
                    IndexKind::RangeComponent,
                    KeyExpression::range("period", RangeComponent::UpperBound, BoundaryType::HalfOpen),
                    vec!["Booking".into()],
                )
                .with_state(IndexState::Readable),
            )
            .unwrap();
        schema
    }

    #[test]
    fn s5_disjoint_overlap_windows_short_circuit_to_empty_plan() {
        let schema = booking_schema();
        let q1 = RangeValue { lower: Some(Value::Int(10)), upper: Some(Value::Int(20)), lower_boundary: BoundaryType::HalfOpen, upper_boundary: BoundaryType::HalfOpen };
        let q2 = RangeValue { lower: Some(Value::Int(30)), upper: Some(Value::Int(40)), lower_boundary: BoundaryType::HalfOpen, upper_boundary: BoundaryType::HalfOpen };
        let filter = Filter::And(vec![
            Filter::Leaf(FilterLeaf::Overlaps { field: "period".into(), query: q1 }),
            Filter::Leaf(FilterLeaf::Overlaps { field: "period".into(), query: q2 }),
        ]);
        let planner = Planner::new(PlannerConfig::default());
        let query = Query::new("Booking", filter);
        assert_eq!(planner.plan(&schema, &query, 0).unwrap(), Plan::Empty);
    }

    #[test]
    fn repeated_plan_call_hits_cache() {
        let schema = booking_schema();
        let planner = Planner::new(PlannerConfig::default());
        let query = Query::new("Booking", Filter::field_eq("status", "open"));
        let first = planner.plan(&schema, &query, 0).unwrap();
        assert_eq!(planner.cache().len(), 1);
        let second = planner.plan(&schema, &query, 1).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn equality_on_record_with_no_index_falls_back_to_full_scan() {
        let schema = Schema::new();
        let planner = Planner::new(PlannerConfig::default());
        let query = Query::new("Thing", Filter::field_eq("x", 1i64));
        let chosen = planner.plan(&schema, &query, 0).unwrap();
        assert!(matches!(chosen, Plan::Filter { child, .. } if matches!(*child, Plan::FullScan { .. })));
    }
}
