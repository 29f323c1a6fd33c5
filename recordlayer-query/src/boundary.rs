use std::cmp::Ordering;

use recordlayer_schema::{BoundaryType, RangeValue};
use recordlayer_tuple::Value;

use crate::filter::compare_values;

/// `spec.md` §4.6 "Boundary operators for range overlap": which
/// inequality (`<`, `≤`, `>`, `≥`) applies to `F.lower ? Q.upper` and
/// `F.upper ? Q.lower` given the boundary kind of each range. Partial
/// ranges (one side unbounded) always overlap on that side.
pub fn overlaps(field_range: &RangeValue, query: &RangeValue) -> bool {
    let lower_ok = match (&field_range.lower, &query.upper) {
        (Some(f_lower), Some(q_upper)) => {
            let strict = query.upper_boundary == BoundaryType::HalfOpen;
            let cmp = compare_values(f_lower, q_upper);
            if strict { cmp == Ordering::Less } else { cmp != Ordering::Greater }
        }
        _ => true,
    };
    let upper_ok = match (&field_range.upper, &query.lower) {
        (Some(f_upper), Some(q_lower)) => {
            let strict = field_range.upper_boundary == BoundaryType::HalfOpen;
            let cmp = compare_values(f_upper, q_lower);
            if strict { cmp == Ordering::Greater } else { cmp != Ordering::Less }
        }
        _ => true,
    };
    lower_ok && upper_ok
}

/// Intersection window of two range-typed query predicates on the same
/// field (`spec.md` §4.8 "range window prefilter"): `(max of lowers, min
/// of uppers)`. `None` on either side means unbounded. Returns `None` if
/// the resulting window is empty (`lower >= upper` under the tighter of
/// the two boundary kinds).
pub fn intersect_windows(a: &RangeValue, b: &RangeValue) -> Option<RangeValue> {
    let (lower, lower_boundary) = match (&a.lower, &b.lower) {
        (Some(al), Some(bl)) => {
            if compare_values(al, bl) == Ordering::Less {
                (Some(bl.clone()), b.lower_boundary)
            } else {
                (Some(al.clone()), a.lower_boundary)
            }
        }
        (Some(al), None) => (Some(al.clone()), a.lower_boundary),
        (None, Some(bl)) => (Some(bl.clone()), b.lower_boundary),
        (None, None) => (None, BoundaryType::HalfOpen),
    };
    let (upper, upper_boundary) = match (&a.upper, &b.upper) {
        (Some(au), Some(bu)) => {
            if compare_values(au, bu) == Ordering::Greater {
                (Some(bu.clone()), b.upper_boundary)
            } else {
                (Some(au.clone()), a.upper_boundary)
            }
        }
        (Some(au), None) => (Some(au.clone()), a.upper_boundary),
        (None, Some(bu)) => (Some(bu.clone()), b.upper_boundary),
        (None, None) => (None, BoundaryType::HalfOpen),
    };

    if let (Some(l), Some(u)) = (&lower, &upper) {
        let empty = match compare_values(l, u) {
            Ordering::Greater => true,
            Ordering::Equal => matches!((lower_boundary, upper_boundary), (BoundaryType::HalfOpen, _) | (_, BoundaryType::HalfOpen)),
            Ordering::Less => false,
        };
        if empty {
            return None;
        }
    }

    Some(RangeValue { lower, upper, lower_boundary, upper_boundary })
}

pub fn value_lt(a: &Value, b: &Value) -> bool { compare_values(a, b) == Ordering::Less }

#[cfg(test)]
mod tests {
    use super::*;

    fn range(lo: i64, hi: i64, lb: BoundaryType, ub: BoundaryType) -> RangeValue {
        RangeValue { lower: Some(Value::Int(lo)), upper: Some(Value::Int(hi)), lower_boundary: lb, upper_boundary: ub }
    }

    #[test]
    fn half_open_half_open_overlap() {
        let f = range(10, 20, BoundaryType::HalfOpen, BoundaryType::HalfOpen);
        let q = range(15, 25, BoundaryType::HalfOpen, BoundaryType::HalfOpen);
        assert!(overlaps(&f, &q));
        let q2 = range(20, 25, BoundaryType::HalfOpen, BoundaryType::HalfOpen);
        assert!(!overlaps(&f, &q2));
    }

    #[test]
    fn closed_closed_touching_boundaries_overlap() {
        let f = range(10, 20, BoundaryType::Closed, BoundaryType::Closed);
        let q = range(20, 30, BoundaryType::Closed, BoundaryType::Closed);
        assert!(overlaps(&f, &q));
    }

    #[test]
    fn unbounded_side_always_overlaps() {
        let f = RangeValue { lower: None, upper: Some(Value::Int(20)), lower_boundary: BoundaryType::HalfOpen, upper_boundary: BoundaryType::HalfOpen };
        let q = range(100, 200, BoundaryType::HalfOpen, BoundaryType::HalfOpen);
        assert!(!overlaps(&f, &q));
        let q2 = range(-100, -50, BoundaryType::HalfOpen, BoundaryType::HalfOpen);
        assert!(overlaps(&f, &q2));
    }

    #[test]
    fn window_intersection_narrows_to_tighter_bounds() {
        let a = range(10, 50, BoundaryType::HalfOpen, BoundaryType::HalfOpen);
        let b = range(20, 40, BoundaryType::HalfOpen, BoundaryType::HalfOpen);
        let w = intersect_windows(&a, &b).unwrap();
        assert_eq!(w.lower, Some(Value::Int(20)));
        assert_eq!(w.upper, Some(Value::Int(40)));
    }

    #[test]
    fn empty_window_detected() {
        let a = range(10, 20, BoundaryType::HalfOpen, BoundaryType::HalfOpen);
        let b = range(30, 40, BoundaryType::HalfOpen, BoundaryType::HalfOpen);
        assert!(intersect_windows(&a, &b).is_none());
    }
}
