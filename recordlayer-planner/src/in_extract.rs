use recordlayer_query::{Filter, FilterLeaf};
use recordlayer_tuple::{encode_tuple, Value};

/// One extracted `In` leaf: the field it constrains and the distinct
/// value set (as byte-encoded tuples, since `Value` has no `Eq`/`Hash`
/// thanks to `f64`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedIn {
    pub field: String,
    pub values: Vec<Value>,
}

/// Collects every `FilterLeaf::In` reachable through `And`/`Or`/`Not`,
/// deduped by `(field, value set)` — set equality, not list order — so
/// two `In` leaves on the same field with different value sets both
/// survive (`spec.md` §4.6's IN-extraction step).
pub fn extract_in_leaves(filter: &Filter) -> Vec<ExtractedIn> {
    let mut found = Vec::new();
    collect(filter, &mut found);
    let mut out: Vec<ExtractedIn> = Vec::new();
    for candidate in found {
        if !out.iter().any(|existing| same_in(existing, &candidate)) {
            out.push(candidate);
        }
    }
    out
}

fn collect(filter: &Filter, out: &mut Vec<ExtractedIn>) {
    match filter {
        Filter::Leaf(FilterLeaf::In { field, values }) => out.push(ExtractedIn { field: field.clone(), values: values.clone() }),
        Filter::Leaf(_) => {}
        Filter::And(children) | Filter::Or(children) => children.iter().for_each(|c| collect(c, out)),
        Filter::Not(inner) => collect(inner, out),
    }
}

fn value_set(values: &[Value]) -> Vec<Vec<u8>> {
    let mut encoded: Vec<Vec<u8>> = values.iter().map(|v| encode_tuple(std::slice::from_ref(v))).collect();
    encoded.sort();
    encoded.dedup();
    encoded
}

fn same_in(a: &ExtractedIn, b: &ExtractedIn) -> bool { a.field == b.field && value_set(&a.values) == value_set(&b.values) }

#[cfg(test)]
mod tests {
    use super::*;
    use recordlayer_query::ComparisonOp;

    #[test]
    fn extracts_single_in_leaf() {
        let f = Filter::in_values("status", vec![Value::String("a".into()), Value::String("b".into())]);
        let extracted = extract_in_leaves(&f);
        assert_eq!(extracted.len(), 1);
        assert_eq!(extracted[0].field, "status");
    }

    #[test]
    fn dedups_identical_value_sets_regardless_of_order() {
        let f = Filter::and([
            Filter::in_values("status", vec![Value::String("a".into()), Value::String("b".into())]),
            Filter::in_values("status", vec![Value::String("b".into()), Value::String("a".into())]),
        ]);
        assert_eq!(extract_in_leaves(&f).len(), 1);
    }

    #[test]
    fn keeps_distinct_value_sets_on_same_field() {
        let f = Filter::or([
            Filter::in_values("status", vec![Value::String("a".into())]),
            Filter::in_values("status", vec![Value::String("b".into())]),
        ]);
        assert_eq!(extract_in_leaves(&f).len(), 2);
    }

    #[test]
    fn reaches_through_not_and_nested_combinators() {
        let f = Filter::not(Filter::and([
            Filter::in_values("region", vec![Value::Int(1)]),
            Filter::field_cmp("age", ComparisonOp::Gt, 10i64),
        ]));
        let extracted = extract_in_leaves(&f);
        assert_eq!(extracted.len(), 1);
        assert_eq!(extracted[0].field, "region");
    }
}
