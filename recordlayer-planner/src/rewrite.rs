use recordlayer_query::{ComparisonOp, Filter, FilterLeaf};

use crate::config::PlannerConfig;

/// `spec.md` §4.6 step 2. Applies De Morgan push-down, same-kind
/// flattening, and child dedup unconditionally (these can only shrink or
/// preserve the tree), then optionally converts to DNF if the estimated
/// blow-up stays within `maxDNFTerms`. Any step that would exceed
/// `maxDepth` instead returns its input unchanged, per "the rewriter
/// returns the original filter if any limit is exceeded".
pub fn rewrite(filter: &Filter, config: &PlannerConfig) -> Filter {
    let pushed = push_not_down(filter, config.max_depth, 0);
    let flattened = flatten(&pushed);
    let deduped = dedup(&flattened);
    match to_dnf(&deduped, config.max_dnf_terms, config.max_depth, 0) {
        Some(dnf) => dnf,
        None => deduped,
    }
}

fn negate_op(op: ComparisonOp) -> Option<ComparisonOp> {
    match op {
        ComparisonOp::Eq => Some(ComparisonOp::Ne),
        ComparisonOp::Ne => Some(ComparisonOp::Eq),
        ComparisonOp::Lt => Some(ComparisonOp::Ge),
        ComparisonOp::Le => Some(ComparisonOp::Gt),
        ComparisonOp::Gt => Some(ComparisonOp::Le),
        ComparisonOp::Ge => Some(ComparisonOp::Lt),
        ComparisonOp::StartsWith | ComparisonOp::Contains => None,
    }
}

/// Pushes `Not` through `And`/`Or` via De Morgan and cancels `Not(Not(x))`.
/// A `Not(FieldCmp)`/`Not(KeyExprCmp)` absorbs into the leaf when the
/// operator has a direct negation (fingerprint rule: "Not absorbs into
/// leaves where possible").
fn push_not_down(filter: &Filter, max_depth: usize, depth: usize) -> Filter {
    if depth >= max_depth {
        return filter.clone();
    }
    match filter {
        Filter::Leaf(_) => filter.clone(),
        Filter::And(children) => Filter::And(children.iter().map(|c| push_not_down(c, max_depth, depth + 1)).collect()),
        Filter::Or(children) => Filter::Or(children.iter().map(|c| push_not_down(c, max_depth, depth + 1)).collect()),
        Filter::Not(inner) => match inner.as_ref() {
            Filter::Not(grandchild) => push_not_down(grandchild, max_depth, depth + 1),
            Filter::And(children) => {
                Filter::Or(children.iter().map(|c| push_not_down(&Filter::Not(Box::new(c.clone())), max_depth, depth + 1)).collect())
            }
            Filter::Or(children) => {
                Filter::And(children.iter().map(|c| push_not_down(&Filter::Not(Box::new(c.clone())), max_depth, depth + 1)).collect())
            }
            Filter::Leaf(FilterLeaf::FieldCmp { field, op, value }) => match negate_op(*op) {
                Some(negated) => Filter::Leaf(FilterLeaf::FieldCmp { field: field.clone(), op: negated, value: value.clone() }),
                None => filter.clone(),
            },
            Filter::Leaf(FilterLeaf::KeyExprCmp { expr, op, value }) => match negate_op(*op) {
                Some(negated) => Filter::Leaf(FilterLeaf::KeyExprCmp { expr: expr.clone(), op: negated, value: value.clone() }),
                None => filter.clone(),
            },
            Filter::Leaf(_) => filter.clone(),
        },
    }
}

/// Flattens nested `And`/`Or` of the same kind: `And([a, And([b, c])])` -> `And([a, b, c])`.
fn flatten(filter: &Filter) -> Filter {
    match filter {
        Filter::Leaf(_) => filter.clone(),
        Filter::Not(inner) => Filter::Not(Box::new(flatten(inner))),
        Filter::And(children) => {
            let mut out = Vec::new();
            for child in children {
                match flatten(child) {
                    Filter::And(grandchildren) => out.extend(grandchildren),
                    other => out.push(other),
                }
            }
            Filter::And(out)
        }
        Filter::Or(children) => {
            let mut out = Vec::new();
            for child in children {
                match flatten(child) {
                    Filter::Or(grandchildren) => out.extend(grandchildren),
                    other => out.push(other),
                }
            }
            Filter::Or(out)
        }
    }
}

/// Deduplicates identical children of `And`/`Or` (commutative, so
/// order-independent equality is what matters).
fn dedup(filter: &Filter) -> Filter {
    match filter {
        Filter::Leaf(_) => filter.clone(),
        Filter::Not(inner) => Filter::Not(Box::new(dedup(inner))),
        Filter::And(children) => Filter::And(dedup_children(children)),
        Filter::Or(children) => Filter::Or(dedup_children(children)),
    }
}

fn dedup_children(children: &[Filter]) -> Vec<Filter> {
    let deduped_inner: Vec<Filter> = children.iter().map(dedup).collect();
    let mut out: Vec<Filter> = Vec::new();
    for child in deduped_inner {
        if !out.contains(&child) {
            out.push(child);
        }
    }
    out
}

/// Estimated term count after full DNF expansion, without materializing
/// it: for `Or`, sum of children; for `And`, product of children; a leaf
/// or `Not` contributes 1.
fn estimate_dnf_terms(filter: &Filter) -> usize {
    match filter {
        Filter::Leaf(_) | Filter::Not(_) => 1,
        Filter::Or(children) => children.iter().map(estimate_dnf_terms).sum::<usize>().max(1),
        Filter::And(children) => children.iter().map(estimate_dnf_terms).product::<usize>().max(1),
    }
}

/// Converts to disjunctive normal form (`Or` of `And`s of leaves) if the
/// estimated term count stays within `max_dnf_terms`; returns `None`
/// otherwise (caller keeps the pre-DNF form).
fn to_dnf(filter: &Filter, max_dnf_terms: usize, max_depth: usize, depth: usize) -> Option<Filter> {
    if depth >= max_depth || estimate_dnf_terms(filter) > max_dnf_terms {
        return None;
    }
    let conjunctions = distribute(filter)?;
    let dnf_children: Vec<Filter> = conjunctions.into_iter().map(Filter::And).collect();
    Some(if dnf_children.len() == 1 { dnf_children.into_iter().next().unwrap() } else { Filter::Or(dnf_children) })
}

/// Returns the filter's DNF as a list of conjunction term-lists (each
/// inner `Vec<Filter>` is one `And` clause in the eventual `Or`).
fn distribute(filter: &Filter) -> Option<Vec<Vec<Filter>>> {
    match filter {
        Filter::Leaf(_) | Filter::Not(_) => Some(vec![vec![filter.clone()]]),
        Filter::Or(children) => {
            let mut out = Vec::new();
            for child in children {
                out.extend(distribute(child)?);
            }
            Some(out)
        }
        Filter::And(children) => {
            let mut acc: Vec<Vec<Filter>> = vec![vec![]];
            for child in children {
                let child_terms = distribute(child)?;
                let mut next = Vec::with_capacity(acc.len() * child_terms.len());
                for prefix in &acc {
                    for term in &child_terms {
                        let mut combined = prefix.clone();
                        combined.extend(term.iter().cloned());
                        next.push(combined);
                    }
                }
                acc = next;
                if acc.len() > 100_000 {
                    return None;
                }
            }
            Some(acc)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(field: &str, op: ComparisonOp, value: i64) -> Filter { Filter::field_cmp(field, op, value) }

    #[test]
    fn de_morgan_pushes_not_through_and() {
        let f = Filter::not(Filter::and([leaf("a", ComparisonOp::Eq, 1), leaf("b", ComparisonOp::Eq, 2)]));
        let rewritten = rewrite(&f, &PlannerConfig::default());
        assert_eq!(rewritten, Filter::Or(vec![leaf("a", ComparisonOp::Ne, 1), leaf("b", ComparisonOp::Ne, 2)]));
    }

    #[test]
    fn double_not_cancels() {
        let f = Filter::not(Filter::not(leaf("a", ComparisonOp::Eq, 1)));
        let rewritten = rewrite(&f, &PlannerConfig::default());
        assert_eq!(rewritten, leaf("a", ComparisonOp::Eq, 1));
    }

    #[test]
    fn flattens_nested_and() {
        let f = Filter::and([leaf("a", ComparisonOp::Eq, 1), Filter::and([leaf("b", ComparisonOp::Eq, 2), leaf("c", ComparisonOp::Eq, 3)])]);
        let rewritten = rewrite(&f, &PlannerConfig::default());
        assert_eq!(rewritten, Filter::And(vec![leaf("a", ComparisonOp::Eq, 1), leaf("b", ComparisonOp::Eq, 2), leaf("c", ComparisonOp::Eq, 3)]));
    }

    #[test]
    fn dedups_identical_children() {
        let f = Filter::and([leaf("a", ComparisonOp::Eq, 1), leaf("a", ComparisonOp::Eq, 1)]);
        let rewritten = rewrite(&f, &PlannerConfig::default());
        assert_eq!(rewritten, leaf("a", ComparisonOp::Eq, 1));
    }

    #[test]
    fn converts_to_dnf_when_within_budget() {
        let f = Filter::and([Filter::or([leaf("a", ComparisonOp::Eq, 1), leaf("a", ComparisonOp::Eq, 2)]), leaf("b", ComparisonOp::Eq, 3)]);
        let rewritten = rewrite(&f, &PlannerConfig::default());
        assert_eq!(
            rewritten,
            Filter::Or(vec![
                Filter::And(vec![leaf("a", ComparisonOp::Eq, 1), leaf("b", ComparisonOp::Eq, 3)]),
                Filter::And(vec![leaf("a", ComparisonOp::Eq, 2), leaf("b", ComparisonOp::Eq, 3)]),
            ])
        );
    }

    #[test]
    fn skips_dnf_conversion_beyond_budget() {
        let config = PlannerConfig { max_dnf_terms: 1, ..PlannerConfig::default() };
        let f = Filter::and([Filter::or([leaf("a", ComparisonOp::Eq, 1), leaf("a", ComparisonOp::Eq, 2)]), leaf("b", ComparisonOp::Eq, 3)]);
        let rewritten = rewrite(&f, &config);
        assert_eq!(rewritten, f);
    }
}
