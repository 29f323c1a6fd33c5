//! `spec.md` §6 "Persisted layout": the fixed subspace-naming convention
//! every other crate builds keys under, so the `S/R/...`, `S/I/...`,
//! `S/rangeSet/...`, `S/stats/...`, `S/state/...` prefixes are defined in
//! exactly one place.

use crate::{Subspace, Value};

pub fn record_subspace(root: &Subspace, entity_name: &str) -> Subspace {
    root.subspace(&[Value::String("R".into()), Value::String(entity_name.into())])
}

pub fn index_subspace(root: &Subspace, index_name: &str) -> Subspace {
    root.subspace(&[Value::String("I".into()), Value::String(index_name.into())])
}

pub fn range_set_subspace(root: &Subspace, index_name: &str) -> Subspace {
    root.subspace(&[Value::String("rangeSet".into()), Value::String(index_name.into())])
}

pub fn stats_subspace(root: &Subspace, key: &str) -> Subspace {
    root.subspace(&[Value::String("stats".into()), Value::String(key.into())])
}

pub fn state_subspace(root: &Subspace) -> Subspace {
    root.subspace(&[Value::String("state".into())])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subspaces_are_disjoint_and_nested_under_root() {
        let root = Subspace::new(b"S".to_vec());
        let r = record_subspace(&root, "Product");
        let i = index_subspace(&root, "category_idx");
        assert_ne!(r.prefix(), i.prefix());
        assert!(r.prefix().starts_with(root.prefix()));
        assert!(i.prefix().starts_with(root.prefix()));
    }
}
