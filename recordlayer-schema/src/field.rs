use recordlayer_tuple::Value;

/// The scalar shape a [`FieldDescriptor`] carries. Record serialization
/// itself (the wire/tag-based binary codec) is an external collaborator
/// (`spec.md` §1); this only distinguishes the shapes a key expression
/// needs to know about when it fans a field out into tuples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldCardinality {
    /// Exactly one element.
    Scalar,
    /// Zero or one element (absent maps to no extracted element).
    Optional,
    /// Zero or more elements; a `Concat` containing a repeated field
    /// fans out to one tuple per combination (`spec.md` §3).
    Repeated,
}

/// A field's value type, for descriptor bookkeeping. Ranges get their own
/// variant because `Range(fieldName, component, boundaryType)` key
/// expression nodes are only valid against them (`spec.md` §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Bool,
    Int,
    Double,
    String,
    Bytes,
    Uuid,
    Range(Box<FieldType>),
    Nested(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub tag: u32,
    pub cardinality: FieldCardinality,
    pub value_type: FieldType,
}

impl FieldDescriptor {
    pub fn scalar(name: impl Into<String>, tag: u32, value_type: FieldType) -> Self {
        Self { name: name.into(), tag, cardinality: FieldCardinality::Scalar, value_type }
    }

    pub fn optional(name: impl Into<String>, tag: u32, value_type: FieldType) -> Self {
        Self { name: name.into(), tag, cardinality: FieldCardinality::Optional, value_type }
    }

    pub fn repeated(name: impl Into<String>, tag: u32, value_type: FieldType) -> Self {
        Self { name: name.into(), tag, cardinality: FieldCardinality::Repeated, value_type }
    }
}

/// One boundary of a `Range<T>`-typed field's current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BoundaryType {
    HalfOpen,
    Closed,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RangeValue {
    pub lower: Option<Value>,
    pub upper: Option<Value>,
    pub lower_boundary: BoundaryType,
    pub upper_boundary: BoundaryType,
}

/// A field's extracted value(s), as evaluated out of a concrete record.
/// This is the minimal surface key expressions need; the application's
/// record codec (out of scope, `spec.md` §1) is responsible for
/// producing these from its own typed records.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum FieldValue {
    Scalar(Value),
    Optional(Option<Value>),
    Repeated(Vec<Value>),
    Range(RangeValue),
}

impl FieldValue {
    /// Elements this field contributes to a `Concat` fan-out: zero for an
    /// absent optional, one for a scalar or present optional, N for
    /// repeated (`spec.md` §3 "Field(fieldName)").
    pub fn elements(&self) -> Vec<Value> {
        match self {
            FieldValue::Scalar(v) => vec![v.clone()],
            FieldValue::Optional(Some(v)) => vec![v.clone()],
            FieldValue::Optional(None) => vec![],
            FieldValue::Repeated(vs) => vs.clone(),
            FieldValue::Range(_) => vec![],
        }
    }
}
