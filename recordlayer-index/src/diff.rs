use std::collections::BTreeMap;

use recordlayer_tuple::{encode_tuple, Value};

/// Diffs two tuple sets by their order-preserving byte encoding (`Value`
/// has no total `Eq`/`Hash` because of `Double`, so set membership is
/// decided on encoded bytes, which is exactly the identity the maintainer
/// writes entries under anyway).
///
/// Returns `(added, removed)`: tuples present in `new` but not `old`, and
/// tuples present in `old` but not `new`, in original-`Vec<Value>` form.
pub fn diff_tuples(old: &[Vec<Value>], new: &[Vec<Value>]) -> (Vec<Vec<Value>>, Vec<Vec<Value>>) {
    let mut old_map: BTreeMap<Vec<u8>, Vec<Value>> = old.iter().map(|t| (encode_tuple(t), t.clone())).collect();
    let mut added = Vec::new();
    for t in new {
        let key = encode_tuple(t);
        if old_map.remove(&key).is_none() {
            added.push(t.clone());
        }
    }
    let removed = old_map.into_values().collect();
    (added, removed)
}

/// Splits an aggregate key expression's evaluated tuples into
/// `(group_tuple, numeric_value)` pairs using the configured
/// `group_by_arity` (`spec.md` §4.3 SUM/MIN/MAX/AVERAGE).
pub fn split_group_value(tuples: &[Vec<Value>], group_by_arity: usize) -> Vec<(Vec<Value>, i64)> {
    tuples
        .iter()
        .filter_map(|t| {
            if t.len() != group_by_arity + 1 {
                return None;
            }
            let value = match &t[group_by_arity] {
                Value::Int(i) => *i,
                Value::Double(d) => *d as i64,
                _ => return None,
            };
            Some((t[..group_by_arity].to_vec(), value))
        })
        .collect()
}

/// Per-group signed delta between an old and new set of `(group, value)`
/// contributions. A record whose group is unchanged but value changed
/// nets to `new_value - old_value` for that single group automatically,
/// since both old and new map into the same group key.
pub fn group_value_deltas(old: &[(Vec<Value>, i64)], new: &[(Vec<Value>, i64)]) -> Vec<(Vec<Value>, i64)> {
    let mut totals: BTreeMap<Vec<u8>, (Vec<Value>, i64)> = BTreeMap::new();
    for (group, value) in old {
        let key = encode_tuple(group);
        let entry = totals.entry(key).or_insert_with(|| (group.clone(), 0));
        entry.1 -= value;
    }
    for (group, value) in new {
        let key = encode_tuple(group);
        let entry = totals.entry(key).or_insert_with(|| (group.clone(), 0));
        entry.1 += value;
    }
    totals.into_values().filter(|(_, delta)| *delta != 0).collect()
}

/// Per-group membership delta (+1 added / -1 removed), used by COUNT.
pub fn group_count_deltas(old: &[Vec<Value>], new: &[Vec<Value>]) -> Vec<(Vec<Value>, i64)> {
    let (added, removed) = diff_tuples(old, new);
    added.into_iter().map(|g| (g, 1i64)).chain(removed.into_iter().map(|g| (g, -1i64))).collect()
}
