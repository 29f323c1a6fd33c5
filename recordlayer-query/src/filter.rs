use std::cmp::Ordering;

use recordlayer_schema::{FieldValue, KeyExpression, RangeValue};
use recordlayer_tuple::{encode_tuple, Value};

use crate::boundary::overlaps;
use crate::record::Record;

/// `spec.md` §4.5 leaf comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    StartsWith,
    Contains,
}

/// Byte-order comparison, consistent with the tuple codec's order
/// preservation invariant (`spec.md` §8 property 2) so filter evaluation
/// agrees with index scan order.
pub fn compare_values(a: &Value, b: &Value) -> Ordering { encode_tuple(std::slice::from_ref(a)).cmp(&encode_tuple(std::slice::from_ref(b))) }

fn op_matches(op: ComparisonOp, element: &Value, rhs: &Value) -> bool {
    match op {
        ComparisonOp::Eq => element == rhs,
        ComparisonOp::Ne => element != rhs,
        ComparisonOp::Lt => compare_values(element, rhs) == Ordering::Less,
        ComparisonOp::Le => compare_values(element, rhs) != Ordering::Greater,
        ComparisonOp::Gt => compare_values(element, rhs) == Ordering::Greater,
        ComparisonOp::Ge => compare_values(element, rhs) != Ordering::Less,
        ComparisonOp::StartsWith => match (element, rhs) {
            (Value::String(e), Value::String(r)) => e.starts_with(r.as_str()),
            (Value::Bytes(e), Value::Bytes(r)) => e.starts_with(r.as_slice()),
            _ => false,
        },
        ComparisonOp::Contains => match (element, rhs) {
            (Value::String(e), Value::String(r)) => e.contains(r.as_str()),
            (Value::Bytes(e), Value::Bytes(r)) => e.windows(r.len().max(1)).any(|w| w == r.as_slice()),
            _ => false,
        },
    }
}

/// `spec.md` §4.5: `FieldEq/Ne/Lt/Le/Gt/Ge/StartsWith/Contains`,
/// `KeyExpressionCompare`, `In`. `Overlaps` is this crate's addition for
/// `Range<T>`-typed fields (`spec.md` §4.6's `overlaps(queryRange)`
/// clause, which the query components section assumes without naming a
/// leaf shape for it).
#[derive(Debug, Clone, PartialEq)]
pub enum FilterLeaf {
    FieldCmp { field: String, op: ComparisonOp, value: Value },
    KeyExprCmp { expr: KeyExpression, op: ComparisonOp, value: Value },
    In { field: String, values: Vec<Value> },
    Overlaps { field: String, query: RangeValue },
    /// `spec.md` §4.6 "Vector index + nearest-neighbor clause ->
    /// `NearestNeighbors(k, query, filter?)`". Matching this leaf
    /// in-memory (e.g. as a residual predicate after the planner already
    /// picked a `NearestNeighbors` physical plan for it) is vacuously true
    /// — candidate selection, not per-record filtering, is what decides
    /// which records are nearest.
    NearestNeighbor { field: String, query: Vec<Value>, k: usize },
}

impl FilterLeaf {
    fn elements<'r>(&self, record: &'r Record) -> Vec<Value> {
        match self {
            FilterLeaf::FieldCmp { field, .. } | FilterLeaf::In { field, .. } | FilterLeaf::Overlaps { field, .. } => {
                record.field(field).map(FieldValue::elements).unwrap_or_default()
            }
            FilterLeaf::KeyExprCmp { expr, .. } => expr.evaluate(&record.fields).into_iter().flatten().collect(),
            FilterLeaf::NearestNeighbor { .. } => vec![],
        }
    }

    /// ANY-semantics: matches iff *any* extracted element satisfies the
    /// comparison (`spec.md` §4.5).
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            FilterLeaf::FieldCmp { op, value, .. } | FilterLeaf::KeyExprCmp { op, value, .. } => {
                self.elements(record).iter().any(|e| op_matches(*op, e, value))
            }
            FilterLeaf::In { values, .. } => self.elements(record).iter().any(|e| values.iter().any(|v| e == v)),
            FilterLeaf::Overlaps { field, query } => match record.field(field) {
                Some(FieldValue::Range(r)) => overlaps(r, query),
                _ => false,
            },
            FilterLeaf::NearestNeighbor { .. } => true,
        }
    }
}

/// `spec.md` §4.5 combinators: `And`, `Or`, `Not`. Children order is
/// preserved (deterministic rewriting) but semantically order-irrelevant.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Leaf(FilterLeaf),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn field_eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Leaf(FilterLeaf::FieldCmp { field: field.into(), op: ComparisonOp::Eq, value: value.into() })
    }

    pub fn field_cmp(field: impl Into<String>, op: ComparisonOp, value: impl Into<Value>) -> Self {
        Filter::Leaf(FilterLeaf::FieldCmp { field: field.into(), op, value: value.into() })
    }

    pub fn in_values(field: impl Into<String>, values: Vec<Value>) -> Self { Filter::Leaf(FilterLeaf::In { field: field.into(), values }) }

    pub fn and(children: impl IntoIterator<Item = Filter>) -> Self { Filter::And(children.into_iter().collect()) }

    pub fn or(children: impl IntoIterator<Item = Filter>) -> Self { Filter::Or(children.into_iter().collect()) }

    pub fn not(child: Filter) -> Self { Filter::Not(Box::new(child)) }

    /// Evaluate against a deserialised record, short-circuiting `And`/`Or`
    /// in child order (`spec.md` §4.5).
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Filter::Leaf(leaf) => leaf.matches(record),
            Filter::And(children) => children.iter().all(|c| c.matches(record)),
            Filter::Or(children) => children.iter().any(|c| c.matches(record)),
            Filter::Not(child) => !child.matches(record),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn record(fields: Vec<(&str, FieldValue)>) -> Record {
        Record::new("Product", vec![Value::Int(1)], fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    #[test]
    fn field_eq_matches() {
        let r = record(vec![("category", FieldValue::Scalar(Value::String("Electronics".into())))]);
        assert!(Filter::field_eq("category", "Electronics").matches(&r));
        assert!(!Filter::field_eq("category", "Books").matches(&r));
    }

    #[test]
    fn repeated_field_any_semantics() {
        let r = record(vec![("tag", FieldValue::Repeated(vec![Value::Int(1), Value::Int(2)]))]);
        assert!(Filter::field_eq("tag", 2i64).matches(&r));
        assert!(!Filter::field_eq("tag", 3i64).matches(&r));
    }

    #[test]
    fn in_matches_any_value() {
        let r = record(vec![("age", FieldValue::Scalar(Value::Int(25)))]);
        assert!(Filter::in_values("age", vec![Value::Int(20), Value::Int(25), Value::Int(30)]).matches(&r));
        assert!(!Filter::in_values("age", vec![Value::Int(20), Value::Int(30)]).matches(&r));
    }

    #[test]
    fn and_or_not_combinators() {
        let r = record(vec![("a", FieldValue::Scalar(Value::Int(1))), ("b", FieldValue::Scalar(Value::Int(2)))]);
        assert!(Filter::and([Filter::field_eq("a", 1i64), Filter::field_eq("b", 2i64)]).matches(&r));
        assert!(!Filter::and([Filter::field_eq("a", 1i64), Filter::field_eq("b", 3i64)]).matches(&r));
        assert!(Filter::or([Filter::field_eq("a", 9i64), Filter::field_eq("b", 2i64)]).matches(&r));
        assert!(Filter::not(Filter::field_eq("a", 9i64)).matches(&r));
    }

    #[test]
    fn starts_with_and_contains() {
        let r = record(vec![("name", FieldValue::Scalar(Value::String("hello world".into())))]);
        assert!(Filter::field_cmp("name", ComparisonOp::StartsWith, "hello").matches(&r));
        assert!(Filter::field_cmp("name", ComparisonOp::Contains, "wor").matches(&r));
        assert!(!Filter::field_cmp("name", ComparisonOp::StartsWith, "world").matches(&r));
    }
}
