use recordlayer_query::Filter;

use crate::plan::Plan;
use crate::stats::StatisticsManager;

const IO_PER_ROW_INDEX: f64 = 1.0;
const IO_PER_ROW_FULL_SCAN: f64 = 10.0;
const CPU_PER_ROW: f64 = 0.1;

/// `spec.md` §4.6 step 4: `(rows, ioCost, cpuCost)`, with a `total()` that
/// weighs I/O above CPU the way a range-read-bound KV store should —
/// `ioCost` dominates comparisons between an index scan and a full scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cost {
    pub rows: f64,
    pub io: f64,
    pub cpu: f64,
}

impl Cost {
    pub fn total(&self) -> f64 { self.io + self.cpu }

    fn from_rows(rows: f64, io_per_row: f64) -> Self { Self { rows, io: rows * io_per_row, cpu: rows * CPU_PER_ROW } }
}

impl std::ops::Add for Cost {
    type Output = Cost;
    fn add(self, rhs: Cost) -> Cost { Cost { rows: self.rows + rhs.rows, io: self.io + rhs.io, cpu: self.cpu + rhs.cpu } }
}

/// Estimates `plan`'s cost against `stats`, falling back to the manager's
/// heuristic selectivity constants when no histogram/table-stats entry
/// exists for the index or record type involved (`spec.md` §4.6: "Missing
/// stats -> heuristic constants").
pub fn estimate_cost(plan: &Plan, stats: &StatisticsManager) -> Cost {
    match plan {
        Plan::IndexScan { index, begin, end, .. } => {
            let base_rows = stats.row_count(index) as f64;
            let selectivity = match (begin, end) {
                (Some(b), Some(e)) if b == e => stats.equality_selectivity(index, &b[b.len() - 1]),
                _ => stats.range_selectivity(index, begin.as_ref().and_then(|v| v.last()), end.as_ref().and_then(|v| v.last())),
            };
            Cost::from_rows((base_rows * selectivity).max(1.0), IO_PER_ROW_INDEX)
        }
        Plan::Intersection(children) => {
            let child_costs: Vec<Cost> = children.iter().map(|c| estimate_cost(c, stats)).collect();
            let total_io_cpu = child_costs.iter().fold(Cost { rows: 0.0, io: 0.0, cpu: 0.0 }, |acc, c| acc + *c);
            // Intersection emits at most the smallest child's row estimate.
            let narrowest = child_costs.iter().map(|c| c.rows).fold(f64::INFINITY, f64::min);
            Cost { rows: narrowest.min(total_io_cpu.rows), io: total_io_cpu.io, cpu: total_io_cpu.cpu }
        }
        Plan::Union(children) => {
            // `spec.md` §4.6 step 4 gives no formula for `Or` directly; it
            // is treated like `InJoin`'s "Σ per-value selectivity ·
            // rowCount" generalized to per-branch cardinalities, since a
            // `Union` is exactly an `InJoin` generalized from one field's
            // values to arbitrary per-branch plans.
            children.iter().map(|c| estimate_cost(c, stats)).fold(Cost { rows: 0.0, io: 0.0, cpu: 0.0 }, |acc, c| acc + c)
        }
        Plan::InJoin { field: _, values, index } => {
            let base_rows = stats.row_count(index) as f64;
            let per_value_rows = values.iter().map(|v| base_rows * stats.equality_selectivity(index, v)).sum::<f64>().max(1.0);
            Cost::from_rows(per_value_rows, IO_PER_ROW_INDEX)
        }
        Plan::NearestNeighbors { index, k, .. } => {
            // Oversampling widens the read past `k`; approximate with a
            // fixed multiplier rather than simulating the retry loop here.
            let rows = (*k as f64 * 2.0).max(1.0);
            let _ = index;
            Cost::from_rows(rows, IO_PER_ROW_INDEX)
        }
        Plan::Filter { child, remaining } => {
            let child_cost = estimate_cost(child, stats);
            let residual_rows = child_cost.rows * residual_selectivity(remaining);
            Cost { rows: residual_rows.max(1.0).min(child_cost.rows), io: child_cost.io, cpu: child_cost.cpu + residual_rows * CPU_PER_ROW }
        }
        Plan::FullScan { record_type } => Cost::from_rows(stats.row_count(record_type) as f64, IO_PER_ROW_FULL_SCAN),
        Plan::Empty => Cost { rows: 0.0, io: 0.0, cpu: 0.0 },
    }
}

/// Crude residual-predicate selectivity for ordering candidates that
/// already share the same base scan: counts leaves and applies the
/// equality heuristic per leaf, which only needs to be directionally
/// correct since it never changes which *index* is chosen, only whether
/// a `FilterPlan` wrapper looks cheap relative to its unwrapped child.
fn residual_selectivity(filter: &Filter) -> f64 {
    fn leaf_count(filter: &Filter) -> usize {
        match filter {
            Filter::Leaf(_) => 1,
            Filter::Not(inner) => leaf_count(inner),
            Filter::And(children) | Filter::Or(children) => children.iter().map(leaf_count).sum(),
        }
    }
    0.1f64.powi(leaf_count(filter) as i32).max(0.01)
}

/// Step 5: picks the plan with the lowest total cost; ties broken by
/// lower `ioCost`, then by fewer estimated rows (`spec.md` §4.6 step 4:
/// "Comparison is by total; ties broken by lower ioCost then fewer
/// rows.").
pub fn select_best<'p>(candidates: &'p [Plan], stats: &StatisticsManager) -> Option<&'p Plan> {
    candidates
        .iter()
        .map(|p| (p, estimate_cost(p, stats)))
        .min_by(|(_, a), (_, b)| {
            a.total()
                .partial_cmp(&b.total())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.io.partial_cmp(&b.io).unwrap_or(std::cmp::Ordering::Equal))
                .then(a.rows.partial_cmp(&b.rows).unwrap_or(std::cmp::Ordering::Equal))
        })
        .map(|(p, _)| p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use recordlayer_tuple::Value;

    #[test]
    fn index_scan_cheaper_than_full_scan_with_default_stats() {
        let stats = StatisticsManager::new();
        let scan = Plan::equality_scan("category_idx", vec![Value::String("Electronics".into())]);
        let full = Plan::FullScan { record_type: "Product".into() };
        assert!(estimate_cost(&scan, &stats).total() < estimate_cost(&full, &stats).total());
    }

    #[test]
    fn select_best_prefers_lower_cost_candidate() {
        let stats = StatisticsManager::new();
        let scan = Plan::equality_scan("category_idx", vec![Value::String("Electronics".into())]);
        let full = Plan::FullScan { record_type: "Product".into() }.filtered(Some(Filter::field_eq("category", "Electronics")));
        let candidates = vec![scan.clone(), full];
        let chosen = select_best(&candidates, &stats).unwrap();
        assert_eq!(*chosen, scan);
    }

    #[test]
    fn intersection_cost_is_narrower_than_either_child_alone() {
        let stats = StatisticsManager::new();
        let a = Plan::IndexScan { index: "a_lower".into(), begin: None, begin_exclusive: false, end: None, end_inclusive: false };
        let b = Plan::IndexScan { index: "b_upper".into(), begin: None, begin_exclusive: false, end: None, end_inclusive: false };
        let intersection = Plan::Intersection(vec![a.clone(), b.clone()]);
        let c = estimate_cost(&intersection, &stats);
        assert!(c.rows <= estimate_cost(&a, &stats).rows);
    }
}
