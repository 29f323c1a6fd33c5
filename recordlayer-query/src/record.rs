use std::collections::BTreeMap;

use recordlayer_schema::FieldValue;
use recordlayer_tuple::Value;

/// A deserialised record: its primary-key tuple plus the field values a
/// filter or key expression reads. Record *serialization* itself (the
/// field-tagged binary wire format) is an external collaborator
/// (`spec.md` §1); this is the minimal shape the query/index layers need
/// once a record has been decoded by that external codec.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub record_type: String,
    pub pk: Vec<Value>,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new(record_type: impl Into<String>, pk: Vec<Value>, fields: BTreeMap<String, FieldValue>) -> Self {
        Self { record_type: record_type.into(), pk, fields }
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> { self.fields.get(name) }
}
