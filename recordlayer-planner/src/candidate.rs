use std::collections::HashMap;

use recordlayer_query::{ComparisonOp, Filter, FilterLeaf};
use recordlayer_schema::{IndexDef, IndexKind, IndexOptions, IndexState, KeyExpression, RangeComponent, RangeValue, Schema};
use recordlayer_tuple::Value;

use crate::in_extract::extract_in_leaves;
use crate::plan::Plan;

/// Splits a filter into its top-level `And` conjuncts; a non-`And` filter
/// is treated as a single conjunct (`spec.md` §4.6 step 3 reasons over
/// "each filter leaf" an index can serve, which in practice means each
/// conjunct of the top-level predicate).
fn conjuncts(filter: &Filter) -> Vec<Filter> {
    match filter {
        Filter::And(children) => children.clone(),
        other => vec![other.clone()],
    }
}

fn remaining_after(filter: &Filter, consumed: &Filter) -> Option<Filter> {
    let rest: Vec<Filter> = conjuncts(filter).into_iter().filter(|c| c != consumed).collect();
    match rest.len() {
        0 => None,
        1 => Some(rest.into_iter().next().unwrap()),
        _ => Some(Filter::And(rest)),
    }
}

fn single_field_root(index: &IndexDef) -> Option<&str> {
    match &index.root {
        KeyExpression::Field(name) => Some(name.as_str()),
        _ => None,
    }
}

fn readable_indexes_for<'s>(schema: &'s Schema, record_type: &str) -> Vec<&'s IndexDef> {
    schema.indexes_for(record_type).into_iter().filter(|i| i.state == IndexState::Readable).collect()
}

/// Groups the auto-generated `RANGE_COMPONENT` index pair by the
/// range-typed field they share, keeping only fields where both the
/// lower-bound and upper-bound half are present and readable
/// (`spec.md` §4.3 RANGE_COMPONENT, §4.6 "Pair of RANGE_COMPONENT
/// indexes... -> Intersection").
fn range_component_pairs<'s>(indexes: &[&'s IndexDef]) -> HashMap<String, (&'s IndexDef, &'s IndexDef)> {
    let mut lowers: HashMap<String, &IndexDef> = HashMap::new();
    let mut uppers: HashMap<String, &IndexDef> = HashMap::new();
    for idx in indexes {
        if idx.kind != IndexKind::RangeComponent {
            continue;
        }
        if let KeyExpression::Range(field, component, _) = &idx.root {
            match component {
                RangeComponent::LowerBound => lowers.insert(field.clone(), idx),
                RangeComponent::UpperBound => uppers.insert(field.clone(), idx),
            };
        }
    }
    let mut out = HashMap::new();
    for (field, lower) in lowers {
        if let Some(upper) = uppers.get(&field) {
            out.insert(field, (lower, *upper));
        }
    }
    out
}

/// True iff the result of an `IndexScan`/`InJoin` on `child` is a
/// full-scan-over-everything in disguise — i.e. `generate_candidates`
/// found nothing better for this branch than its own fallback. Used by
/// [`union_of_branch_candidates`] to prefer an actual index candidate over
/// the forced fallback when picking one plan per `Or` branch.
fn is_full_scan_plan(plan: &Plan) -> bool {
    match plan {
        Plan::FullScan { .. } => true,
        Plan::Filter { child, .. } => is_full_scan_plan(child),
        _ => false,
    }
}

/// `spec.md` §4.6 step 2 converts `And(Or(a, b), c)` into DNF
/// (`Or(And(a, c), And(b, c))`) whenever it fits the term budget — a
/// top-level `Or`, which the rest of candidate generation must handle as
/// well as it handles `And`, or the rewrite step actively destroys
/// cheaper plans that existed before it ran. Plans one branch at a time
/// (recursing into `generate_candidates`) and combines them with
/// `Plan::Union`, which the executor deduplicates by primary key exactly
/// like `InJoin` does for repeated index values.
fn union_of_branch_candidates(record_type: &str, branches: &[Filter], schema: &Schema, max_candidate_plans: usize) -> Option<Plan> {
    if branches.len() < 2 {
        return None;
    }
    let mut parts = Vec::with_capacity(branches.len());
    for branch in branches {
        let sub = generate_candidates(record_type, branch, schema, max_candidate_plans);
        let chosen = sub.iter().find(|p| !is_full_scan_plan(p)).cloned().or_else(|| sub.into_iter().next())?;
        parts.push(chosen);
    }
    Some(Plan::Union(parts))
}

/// Whether every record satisfying `filter` necessarily satisfies
/// `In(field, values)` too — true only when that leaf is reachable from
/// `filter`'s root through `And` nodes alone. An `In` leaf guarded by an
/// `Or` sibling or a `Not` ancestor isn't a precondition of the whole
/// filter, so substituting it for an `InJoin` candidate there could drop
/// records whose match comes from elsewhere in the tree.
fn is_unconditional_conjunct(filter: &Filter, field: &str, values: &[Value]) -> bool {
    match filter {
        Filter::Leaf(FilterLeaf::In { field: f, values: v }) => f == field && v.as_slice() == values,
        Filter::And(children) => children.iter().any(|c| is_unconditional_conjunct(c, field, values)),
        _ => false,
    }
}

/// `spec.md` §4.6 step 3: candidate generation, bounded by
/// `max_candidate_plans`. Always includes a `FullScan` fallback so step 5
/// has something to choose if every index candidate is more expensive (or
/// none exist).
pub fn generate_candidates(record_type: &str, filter: &Filter, schema: &Schema, max_candidate_plans: usize) -> Vec<Plan> {
    let indexes = readable_indexes_for(schema, record_type);
    let range_pairs = range_component_pairs(&indexes);
    let mut candidates = Vec::new();

    if let Filter::Or(branches) = filter {
        if let Some(plan) = union_of_branch_candidates(record_type, branches, schema, max_candidate_plans) {
            candidates.push(plan);
        }
    }

    for conjunct in conjuncts(filter) {
        if candidates.len() >= max_candidate_plans {
            break;
        }
        match &conjunct {
            Filter::Or(branches) => {
                if let Some(plan) = union_of_branch_candidates(record_type, branches, schema, max_candidate_plans) {
                    candidates.push(plan.filtered(remaining_after(filter, &conjunct)));
                }
            }
            Filter::Leaf(FilterLeaf::FieldCmp { field, op: ComparisonOp::Eq, value }) => {
                for idx in &indexes {
                    if matches!(idx.kind, IndexKind::Value | IndexKind::Unique) && single_field_root(idx) == Some(field.as_str()) {
                        let plan = Plan::equality_scan(idx.name.clone(), vec![value.clone()]);
                        candidates.push(plan.filtered(remaining_after(filter, &conjunct)));
                    }
                }
            }
            Filter::Leaf(FilterLeaf::FieldCmp { field, op, value }) if matches!(op, ComparisonOp::Lt | ComparisonOp::Le | ComparisonOp::Gt | ComparisonOp::Ge) => {
                for idx in &indexes {
                    if matches!(idx.kind, IndexKind::Value | IndexKind::Unique) && single_field_root(idx) == Some(field.as_str()) {
                        let scan = match op {
                            ComparisonOp::Lt => Plan::IndexScan { index: idx.name.clone(), begin: None, begin_exclusive: false, end: Some(vec![value.clone()]), end_inclusive: false },
                            ComparisonOp::Le => Plan::IndexScan { index: idx.name.clone(), begin: None, begin_exclusive: false, end: Some(vec![value.clone()]), end_inclusive: true },
                            ComparisonOp::Gt => Plan::IndexScan { index: idx.name.clone(), begin: Some(vec![value.clone()]), begin_exclusive: true, end: None, end_inclusive: false },
                            ComparisonOp::Ge => Plan::IndexScan { index: idx.name.clone(), begin: Some(vec![value.clone()]), begin_exclusive: false, end: None, end_inclusive: false },
                            _ => unreachable!(),
                        };
                        candidates.push(scan.filtered(remaining_after(filter, &conjunct)));
                    }
                }
            }
            Filter::Leaf(FilterLeaf::In { field, values }) if values.len() >= 2 => {
                for idx in &indexes {
                    if matches!(idx.kind, IndexKind::Value | IndexKind::Unique) && single_field_root(idx) == Some(field.as_str()) {
                        let plan = Plan::InJoin { field: field.clone(), values: values.clone(), index: idx.name.clone() };
                        candidates.push(plan.filtered(remaining_after(filter, &conjunct)));
                    }
                }
            }
            Filter::Leaf(FilterLeaf::Overlaps { field, query }) => {
                if let Some((lower, upper)) = range_pairs.get(field) {
                    if let Some(plan) = overlap_intersection_plan(lower, upper, query) {
                        candidates.push(plan.filtered(remaining_after(filter, &conjunct)));
                    }
                }
            }
            Filter::Leaf(FilterLeaf::NearestNeighbor { field, query, k }) => {
                for idx in &indexes {
                    if idx.kind == IndexKind::Vector && single_field_root(idx) == Some(field.as_str()) {
                        if let IndexOptions::Vector { .. } = &idx.options {
                            let flat: Vec<f64> = query
                                .iter()
                                .filter_map(|v| if let recordlayer_tuple::Value::Double(d) = v { Some(*d) } else { None })
                                .collect();
                            let remaining = remaining_after(filter, &conjunct);
                            candidates.push(Plan::NearestNeighbors {
                                index: idx.name.clone(),
                                query: flat,
                                k: *k,
                                filter: remaining.map(Box::new),
                            });
                        }
                    }
                }
            }
            _ => {}
        }
    }

    // `spec.md` §4.6 "IN-extraction": catches `In` leaves the single-level
    // `conjuncts()` split above misses because they sit under a nested
    // `And` (e.g. built directly rather than via `rewrite`'s flattening).
    // Only leaves `is_unconditional_conjunct` confirms are true
    // preconditions of `filter` are used — an `In` reachable only through
    // an `Or` or a `Not` stays out of this loop and is picked up instead
    // by the `Or`-branch handling above (or left to the `FullScan`
    // fallback), since substituting it here could silently drop matches.
    for extracted in extract_in_leaves(filter) {
        if extracted.values.len() < 2 || candidates.len() >= max_candidate_plans {
            continue;
        }
        if !is_unconditional_conjunct(filter, &extracted.field, &extracted.values) {
            continue;
        }
        for idx in &indexes {
            if matches!(idx.kind, IndexKind::Value | IndexKind::Unique) && single_field_root(idx) == Some(extracted.field.as_str()) {
                let already_covered = candidates.iter().any(|p| matches!(p, Plan::InJoin { index, .. } if index == &idx.name));
                if already_covered {
                    continue;
                }
                let leaf = Filter::Leaf(FilterLeaf::In { field: extracted.field.clone(), values: extracted.values.clone() });
                let plan = Plan::InJoin { field: extracted.field.clone(), values: extracted.values.clone(), index: idx.name.clone() };
                candidates.push(plan.filtered(remaining_after(filter, &leaf)));
            }
        }
    }

    candidates.push(Plan::FullScan { record_type: record_type.to_string() }.filtered(Some(filter.clone())));
    candidates.truncate(max_candidate_plans.max(1));
    candidates
}

/// `spec.md` §4.6: "`Intersection([scan(start), scan(end)])` where the two
/// sub-scans read the start-index with `start < queryRange.upper` and the
/// end-index with `end > queryRange.lower`". Partial query ranges drop the
/// corresponding inequality (the scan side stays fully unbounded).
fn overlap_intersection_plan(lower_idx: &IndexDef, upper_idx: &IndexDef, query: &RangeValue) -> Option<Plan> {
    use recordlayer_schema::BoundaryType;

    // Scan over the *lower-bound* component index: we want field-lower
    // values satisfying `field.lower ? query.upper`. If `query.upper` is
    // unbounded, every field-lower value qualifies (full index scan).
    let lower_scan = match &query.upper {
        Some(upper) => {
            let end_inclusive = query.upper_boundary == BoundaryType::Closed;
            Plan::IndexScan { index: lower_idx.name.clone(), begin: None, begin_exclusive: false, end: Some(vec![upper.clone()]), end_inclusive }
        }
        None => Plan::IndexScan { index: lower_idx.name.clone(), begin: None, begin_exclusive: false, end: None, end_inclusive: false },
    };

    // Scan over the *upper-bound* component index: field-upper values
    // satisfying `field.upper ? query.lower`, where the inequality's
    // strictness is the *field's* own upper-boundary kind (carried by the
    // upper-bound index's declared `KeyExpression::Range` boundary, since
    // that index only contains records whose boundary matches it) rather
    // than the query's.
    let field_upper_boundary = match &upper_idx.root {
        KeyExpression::Range(_, RangeComponent::UpperBound, boundary) => *boundary,
        _ => BoundaryType::HalfOpen,
    };
    let upper_scan = match &query.lower {
        Some(lower) => {
            let begin_exclusive = field_upper_boundary == BoundaryType::HalfOpen;
            Plan::IndexScan { index: upper_idx.name.clone(), begin: Some(vec![lower.clone()]), begin_exclusive, end: None, end_inclusive: false }
        }
        None => Plan::IndexScan { index: upper_idx.name.clone(), begin: None, begin_exclusive: false, end: None, end_inclusive: false },
    };

    Some(Plan::Intersection(vec![lower_scan, upper_scan]))
}
