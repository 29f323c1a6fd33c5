use std::collections::BTreeMap;

use recordlayer_tuple::Value;

use crate::field::{BoundaryType, FieldValue};

/// `spec.md` §3 "Key expression": `Field`, `Concat`, `Range`. Evaluating a
/// key expression against a record yields a *set* of tuples (one per
/// fanout path through any repeated fields).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyExpression {
    Field(String),
    Concat(Vec<KeyExpression>),
    Range(String, RangeComponent, BoundaryType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeComponent {
    LowerBound,
    UpperBound,
}

impl KeyExpression {
    pub fn field(name: impl Into<String>) -> Self { KeyExpression::Field(name.into()) }

    pub fn concat(children: impl IntoIterator<Item = KeyExpression>) -> Self {
        KeyExpression::Concat(children.into_iter().collect())
    }

    pub fn range(name: impl Into<String>, component: RangeComponent, boundary: BoundaryType) -> Self {
        KeyExpression::Range(name.into(), component, boundary)
    }

    /// All field names this expression reads from a record, in
    /// left-to-right order (used by the planner to check index/field
    /// compatibility without re-walking the tree each time).
    pub fn referenced_fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            KeyExpression::Field(name) => out.push(name),
            KeyExpression::Range(name, ..) => out.push(name),
            KeyExpression::Concat(children) => {
                for c in children {
                    c.collect_fields(out);
                }
            }
        }
    }

    /// Evaluate against a record (a field-name -> extracted-value map) and
    /// produce the set of tuples a maintainer should write one entry for
    /// each of (`spec.md` §3). `Concat`'s fan-out is the Cartesian product
    /// across children; a `Field`/`Range` leaf contributes its own
    /// element list.
    pub fn evaluate(&self, record: &BTreeMap<String, FieldValue>) -> Vec<Vec<Value>> {
        match self {
            KeyExpression::Field(name) => match record.get(name) {
                Some(fv) => fv.elements().into_iter().map(|v| vec![v]).collect(),
                None => vec![],
            },
            KeyExpression::Range(name, component, boundary) => match record.get(name) {
                Some(FieldValue::Range(r)) => {
                    let chosen_boundary = match component {
                        RangeComponent::LowerBound => r.lower_boundary,
                        RangeComponent::UpperBound => r.upper_boundary,
                    };
                    if chosen_boundary != *boundary {
                        return vec![];
                    }
                    let value = match component {
                        RangeComponent::LowerBound => &r.lower,
                        RangeComponent::UpperBound => &r.upper,
                    };
                    match value {
                        Some(v) => vec![vec![v.clone()]],
                        None => vec![],
                    }
                }
                _ => vec![],
            },
            KeyExpression::Concat(children) => {
                let mut acc: Vec<Vec<Value>> = vec![vec![]];
                for child in children {
                    let child_tuples = child.evaluate(record);
                    if child_tuples.is_empty() {
                        return vec![];
                    }
                    let mut next = Vec::with_capacity(acc.len() * child_tuples.len());
                    for prefix in &acc {
                        for suffix in &child_tuples {
                            let mut combined = prefix.clone();
                            combined.extend(suffix.iter().cloned());
                            next.push(combined);
                        }
                    }
                    acc = next;
                }
                acc
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(pairs: Vec<(&str, FieldValue)>) -> BTreeMap<String, FieldValue> {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn scalar_field_yields_single_tuple() {
        let r = rec(vec![("category", FieldValue::Scalar(Value::String("Electronics".into())))]);
        let expr = KeyExpression::field("category");
        assert_eq!(expr.evaluate(&r), vec![vec![Value::String("Electronics".into())]]);
    }

    #[test]
    fn optional_absent_yields_no_tuples() {
        let r = rec(vec![("nickname", FieldValue::Optional(None))]);
        let expr = KeyExpression::field("nickname");
        assert_eq!(expr.evaluate(&r), Vec::<Vec<Value>>::new());
    }

    #[test]
    fn repeated_field_fans_out() {
        let r = rec(vec![("tag", FieldValue::Repeated(vec![Value::Int(1), Value::Int(2)]))]);
        let expr = KeyExpression::field("tag");
        assert_eq!(expr.evaluate(&r), vec![vec![Value::Int(1)], vec![Value::Int(2)]]);
    }

    #[test]
    fn concat_is_cartesian_product() {
        let r = rec(vec![
            ("a", FieldValue::Repeated(vec![Value::Int(1), Value::Int(2)])),
            ("b", FieldValue::Repeated(vec![Value::Int(10), Value::Int(20)])),
        ]);
        let expr = KeyExpression::concat([KeyExpression::field("a"), KeyExpression::field("b")]);
        assert_eq!(
            expr.evaluate(&r),
            vec![
                vec![Value::Int(1), Value::Int(10)],
                vec![Value::Int(1), Value::Int(20)],
                vec![Value::Int(2), Value::Int(10)],
                vec![Value::Int(2), Value::Int(20)],
            ]
        );
    }

    #[test]
    fn concat_with_absent_optional_child_yields_nothing() {
        let r = rec(vec![("a", FieldValue::Scalar(Value::Int(1))), ("b", FieldValue::Optional(None))]);
        let expr = KeyExpression::concat([KeyExpression::field("a"), KeyExpression::field("b")]);
        assert!(expr.evaluate(&r).is_empty());
    }

    #[test]
    fn range_boundary_extraction() {
        let r = rec(vec![(
            "period",
            FieldValue::Range(crate::field::RangeValue {
                lower: Some(Value::Int(10)),
                upper: Some(Value::Int(20)),
                lower_boundary: BoundaryType::HalfOpen,
                upper_boundary: BoundaryType::HalfOpen,
            }),
        )]);
        let lower = KeyExpression::range("period", RangeComponent::LowerBound, BoundaryType::HalfOpen);
        let upper = KeyExpression::range("period", RangeComponent::UpperBound, BoundaryType::HalfOpen);
        assert_eq!(lower.evaluate(&r), vec![vec![Value::Int(10)]]);
        assert_eq!(upper.evaluate(&r), vec![vec![Value::Int(20)]]);
    }
}
