use recordlayer_query::{Filter, FilterLeaf};
use recordlayer_tuple::encode_tuple;

use crate::query::{Query, SortKey};

/// Stable canonical fingerprint of `(filter, sort, limit)`, used as the
/// plan cache key (`spec.md` §4.6 step 1). Two queries that are
/// semantically identical up to reordering of commutative `And`/`Or`
/// children, or `In` value-list order, must fingerprint identically.
pub fn fingerprint(query: &Query) -> String {
    let filter_fp = fingerprint_filter(&query.filter);
    let sort_fp = query.sort.iter().map(fingerprint_sort_key).collect::<Vec<_>>().join(",");
    format!("f[{filter_fp}]|s[{sort_fp}]|l[{}]", query.limit.map(|l| l.to_string()).unwrap_or_else(|| "-".into()))
}

fn fingerprint_sort_key(key: &SortKey) -> String { format!("{}:{}", key.field, if key.descending { "desc" } else { "asc" }) }

fn hex(bytes: &[u8]) -> String { bytes.iter().map(|b| format!("{b:02x}")).collect() }

/// Canonicalises a filter tree: leaves become `(field, op, normalizedValue)`
/// triples (byte-encoded so `f64`'s lack of `Eq` doesn't block comparison),
/// `And`/`Or` children are sorted by their own fingerprint so order never
/// affects the result, and `In.values` are sorted before hashing.
fn fingerprint_filter(filter: &Filter) -> String {
    match filter {
        Filter::Leaf(leaf) => fingerprint_leaf(leaf),
        Filter::And(children) => format!("and({})", sorted_joined(children)),
        Filter::Or(children) => format!("or({})", sorted_joined(children)),
        Filter::Not(inner) => format!("not({})", fingerprint_filter(inner)),
    }
}

fn sorted_joined(children: &[Filter]) -> String {
    let mut parts: Vec<String> = children.iter().map(fingerprint_filter).collect();
    parts.sort();
    parts.join(",")
}

fn fingerprint_leaf(leaf: &FilterLeaf) -> String {
    match leaf {
        FilterLeaf::FieldCmp { field, op, value } => format!("fc({field},{op:?},{})", hex(&encode_tuple(std::slice::from_ref(value)))),
        FilterLeaf::KeyExprCmp { expr, op, value } => format!("kc({expr:?},{op:?},{})", hex(&encode_tuple(std::slice::from_ref(value)))),
        FilterLeaf::In { field, values } => {
            let mut encoded: Vec<String> = values.iter().map(|v| hex(&encode_tuple(std::slice::from_ref(v)))).collect();
            encoded.sort();
            format!("in({field},[{}])", encoded.join(";"))
        }
        FilterLeaf::Overlaps { field, query } => format!("ov({field},{query:?})"),
        FilterLeaf::NearestNeighbor { field, query, k } => {
            let encoded: Vec<String> = query.iter().map(|v| hex(&encode_tuple(std::slice::from_ref(v)))).collect();
            format!("nn({field},{k},[{}])", encoded.join(";"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recordlayer_query::ComparisonOp;
    use recordlayer_tuple::Value;

    #[test]
    fn and_children_order_does_not_matter() {
        let a = Query::new("Product", Filter::and([Filter::field_eq("x", 1i64), Filter::field_eq("y", 2i64)]));
        let b = Query::new("Product", Filter::and([Filter::field_eq("y", 2i64), Filter::field_eq("x", 1i64)]));
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn in_value_order_does_not_matter() {
        let a = Query::new("Product", Filter::in_values("status", vec![Value::Int(1), Value::Int(2)]));
        let b = Query::new("Product", Filter::in_values("status", vec![Value::Int(2), Value::Int(1)]));
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn different_filters_fingerprint_differently() {
        let a = Query::new("Product", Filter::field_cmp("x", ComparisonOp::Eq, 1i64));
        let b = Query::new("Product", Filter::field_cmp("x", ComparisonOp::Eq, 2i64));
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn sort_and_limit_are_part_of_the_key() {
        let base = Filter::field_eq("x", 1i64);
        let a = Query::new("Product", base.clone()).with_limit(10);
        let b = Query::new("Product", base).with_limit(20);
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }
}
