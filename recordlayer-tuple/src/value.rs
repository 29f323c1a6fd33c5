use crate::Versionstamp;

/// One element of a [`Tuple`](crate::encode_tuple)/[`decode_tuple`](crate::decode_tuple)
/// sequence. Mirrors the scalar set `spec.md` §3 requires plus a nested
/// variant so key expressions can emit `Concat` fan-out as one `Tuple`
/// element inside a larger tuple.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    Uuid([u8; 16]),
    Versionstamp(Versionstamp),
    Tuple(Vec<Value>),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self { Value::Int(v) }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self { Value::String(v.to_string()) }
}

impl From<String> for Value {
    fn from(v: String) -> Self { Value::String(v) }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self { Value::Bool(v) }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self { Value::Double(v) }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self { Value::Bytes(v) }
}
