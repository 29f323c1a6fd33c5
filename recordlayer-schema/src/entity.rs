use crate::field::FieldDescriptor;
use crate::key_expr::KeyExpression;

/// `spec.md` §3 "Entity (record type)": a fixed, ordered field set plus
/// the key expression producing its primary key.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
    pub primary_key: KeyExpression,
    /// "the record store rejects duplicates only when schema marks PK as
    /// enforced" (`spec.md` §3).
    pub primary_key_enforced: bool,
}

impl Entity {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDescriptor>, primary_key: KeyExpression) -> Self {
        Self { name: name.into(), fields, primary_key, primary_key_enforced: true }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> { self.fields.iter().find(|f| f.name == name) }
}
