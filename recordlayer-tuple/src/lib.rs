//! Order-preserving tuple codec and subspace composition.
//!
//! Mirrors the collation trick in `index/src/collation.rs` (flip the sign
//! bit of positives, invert all bits of negatives, to make IEEE-754 doubles
//! compare the same as their encoded bytes) generalized to a full tagged
//! tuple codec: every supported scalar type gets a disjoint one-byte tag so
//! that cross-type comparison is total, and variable-length elements
//! (bytes/strings/nested tuples) are self-delimited so that encoding a
//! prefix of a tuple yields a byte-prefix of the full encoding.

pub mod layout;
mod value;
mod versionstamp;

pub use value::Value;
pub use versionstamp::Versionstamp;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TupleError {
    #[error("corrupt tuple: {0}")]
    CorruptTuple(String),
    #[error("type mismatch: expected {expected}, found tag {found:#04x}")]
    TypeMismatch { expected: &'static str, found: u8 },
}

mod tag {
    pub const NULL: u8 = 0x00;
    pub const BYTES: u8 = 0x01;
    pub const STRING: u8 = 0x02;
    pub const NESTED_START: u8 = 0x03;
    pub const NESTED_END: u8 = 0x04;
    // negative integers: tag decreases as byte-length increases (1..=8 bytes)
    pub const NEG_INT_MAX_LEN8: u8 = 0x0c;
    pub const INT_ZERO: u8 = 0x14;
    // positive integers: tag increases as byte-length increases (1..=8 bytes)
    pub const POS_INT_LEN1: u8 = 0x15;
    pub const DOUBLE: u8 = 0x21;
    pub const BOOL_FALSE: u8 = 0x26;
    pub const BOOL_TRUE: u8 = 0x27;
    pub const UUID: u8 = 0x30;
    pub const VERSIONSTAMP: u8 = 0x31;
}

/// Encode a sequence of tuple elements into its order-preserving byte form.
pub fn encode_tuple(values: &[Value]) -> Vec<u8> {
    let mut out = Vec::new();
    for v in values {
        encode_value(v, &mut out);
    }
    out
}

fn encode_value(v: &Value, out: &mut Vec<u8>) {
    match v {
        Value::Null => out.push(tag::NULL),
        Value::Bool(false) => out.push(tag::BOOL_FALSE),
        Value::Bool(true) => out.push(tag::BOOL_TRUE),
        Value::Int(i) => encode_int(*i, out),
        Value::Double(d) => encode_double(*d, out),
        Value::String(s) => encode_escaped(tag::STRING, s.as_bytes(), out),
        Value::Bytes(b) => encode_escaped(tag::BYTES, b, out),
        Value::Uuid(u) => {
            out.push(tag::UUID);
            out.extend_from_slice(u);
        }
        Value::Versionstamp(vs) => {
            out.push(tag::VERSIONSTAMP);
            out.extend_from_slice(&vs.to_bytes());
        }
        Value::Tuple(children) => {
            out.push(tag::NESTED_START);
            for c in children {
                encode_value(c, out);
            }
            out.push(tag::NESTED_END);
        }
    }
}

fn minimal_be_bytes(mut mag: u64) -> Vec<u8> {
    if mag == 0 {
        return Vec::new();
    }
    let mut bytes = Vec::with_capacity(8);
    while mag > 0 {
        bytes.push((mag & 0xff) as u8);
        mag >>= 8;
    }
    bytes.reverse();
    bytes
}

fn encode_int(i: i64, out: &mut Vec<u8>) {
    if i == 0 {
        out.push(tag::INT_ZERO);
    } else if i > 0 {
        let bytes = minimal_be_bytes(i as u64);
        out.push(tag::POS_INT_LEN1 + (bytes.len() as u8 - 1));
        out.extend_from_slice(&bytes);
    } else {
        // magnitude of i64::MIN doesn't fit in i64, widen to u64 via wrapping negate.
        let mag = (i as i128).unsigned_abs() as u64;
        let bytes = minimal_be_bytes(mag);
        let len = bytes.len() as u8;
        out.push(tag::NEG_INT_MAX_LEN8 + (8 - len));
        // invert bits so larger magnitude (more negative) sorts first
        out.extend(bytes.iter().map(|b| !b));
    }
}

fn encode_double(d: f64, out: &mut Vec<u8>) {
    out.push(tag::DOUBLE);
    let bits = d.to_bits();
    let flipped = if d.is_sign_negative() { !bits } else { bits | (1u64 << 63) };
    out.extend_from_slice(&flipped.to_be_bytes());
}

fn encode_escaped(tag_byte: u8, bytes: &[u8], out: &mut Vec<u8>) {
    out.push(tag_byte);
    for &b in bytes {
        out.push(b);
        if b == 0x00 {
            out.push(0xff);
        }
    }
    out.extend_from_slice(&[0x00, 0x00]);
}

/// Decode a full byte buffer into its tuple elements. Requires the whole
/// input to be consumed (a genuine prefix is not itself a valid tuple).
pub fn decode_tuple(bytes: &[u8]) -> Result<Vec<Value>, TupleError> {
    let mut pos = 0;
    let values = decode_sequence(bytes, &mut pos, false)?;
    if pos != bytes.len() {
        return Err(TupleError::CorruptTuple(format!("{} trailing byte(s)", bytes.len() - pos)));
    }
    Ok(values)
}

fn decode_sequence(bytes: &[u8], pos: &mut usize, nested: bool) -> Result<Vec<Value>, TupleError> {
    let mut values = Vec::new();
    loop {
        if *pos >= bytes.len() {
            if nested {
                return Err(TupleError::CorruptTuple("unterminated nested tuple".into()));
            }
            return Ok(values);
        }
        if nested && bytes[*pos] == tag::NESTED_END {
            *pos += 1;
            return Ok(values);
        }
        values.push(decode_value(bytes, pos)?);
    }
}

fn decode_value(bytes: &[u8], pos: &mut usize) -> Result<Value, TupleError> {
    let t = bytes[*pos];
    *pos += 1;
    match t {
        tag::NULL => Ok(Value::Null),
        tag::BOOL_FALSE => Ok(Value::Bool(false)),
        tag::BOOL_TRUE => Ok(Value::Bool(true)),
        tag::INT_ZERO => Ok(Value::Int(0)),
        tag::STRING => Ok(Value::String(String::from_utf8(decode_escaped(bytes, pos)?).map_err(|e| TupleError::CorruptTuple(e.to_string()))?)),
        tag::BYTES => Ok(Value::Bytes(decode_escaped(bytes, pos)?)),
        tag::NESTED_START => Ok(Value::Tuple(decode_sequence(bytes, pos, true)?)),
        tag::UUID => {
            let slice = take(bytes, pos, 16)?;
            let mut u = [0u8; 16];
            u.copy_from_slice(slice);
            Ok(Value::Uuid(u))
        }
        tag::VERSIONSTAMP => {
            let slice = take(bytes, pos, 12)?;
            Ok(Value::Versionstamp(Versionstamp::from_bytes(slice)))
        }
        tag::DOUBLE => {
            let slice = take(bytes, pos, 8)?;
            let raw = u64::from_be_bytes(slice.try_into().unwrap());
            let bits = if raw & (1u64 << 63) != 0 { raw & !(1u64 << 63) } else { !raw };
            Ok(Value::Double(f64::from_bits(bits)))
        }
        t if (tag::POS_INT_LEN1..tag::POS_INT_LEN1 + 8).contains(&t) => {
            let len = (t - tag::POS_INT_LEN1 + 1) as usize;
            let slice = take(bytes, pos, len)?;
            let mut buf = [0u8; 8];
            buf[8 - len..].copy_from_slice(slice);
            Ok(Value::Int(u64::from_be_bytes(buf) as i64))
        }
        t if (tag::NEG_INT_MAX_LEN8..=tag::NEG_INT_MAX_LEN8 + 7).contains(&t) => {
            let len = (8 - (t - tag::NEG_INT_MAX_LEN8)) as usize;
            let slice = take(bytes, pos, len)?;
            let mut inverted = [0u8; 8];
            inverted[8 - len..].copy_from_slice(&slice.iter().map(|b| !b).collect::<Vec<_>>());
            let magnitude = u64::from_be_bytes(inverted);
            Ok(Value::Int(-(magnitude as i128) as i64))
        }
        other => Err(TupleError::CorruptTuple(format!("unknown type tag {other:#04x}"))),
    }
}

fn take<'a>(bytes: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8], TupleError> {
    if *pos + len > bytes.len() {
        return Err(TupleError::CorruptTuple("truncated element".into()));
    }
    let slice = &bytes[*pos..*pos + len];
    *pos += len;
    Ok(slice)
}

fn decode_escaped(bytes: &[u8], pos: &mut usize) -> Result<Vec<u8>, TupleError> {
    let mut out = Vec::new();
    loop {
        if *pos >= bytes.len() {
            return Err(TupleError::CorruptTuple("unterminated string/bytes element".into()));
        }
        let b = bytes[*pos];
        *pos += 1;
        if b == 0x00 {
            if *pos >= bytes.len() {
                return Err(TupleError::CorruptTuple("truncated escape sequence".into()));
            }
            let next = bytes[*pos];
            *pos += 1;
            if next == 0x00 {
                return Ok(out);
            } else if next == 0xff {
                out.push(0x00);
            } else {
                return Err(TupleError::CorruptTuple("invalid escape sequence".into()));
            }
        } else {
            out.push(b);
        }
    }
}

/// A byte-prefix namespace in the KV store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subspace {
    prefix: Vec<u8>,
}

impl Subspace {
    pub fn new(prefix: impl Into<Vec<u8>>) -> Self { Self { prefix: prefix.into() } }

    pub fn prefix(&self) -> &[u8] { &self.prefix }

    /// `P || encode(T)`
    pub fn pack(&self, values: &[Value]) -> Vec<u8> {
        let mut out = self.prefix.clone();
        out.extend(encode_tuple(values));
        out
    }

    pub fn unpack(&self, key: &[u8]) -> Result<Vec<Value>, TupleError> {
        let rest = key
            .strip_prefix(self.prefix.as_slice())
            .ok_or_else(|| TupleError::CorruptTuple("key does not belong to subspace".into()))?;
        decode_tuple(rest)
    }

    /// `[P, P || 0xFF)` — the canonical "all keys under P" range.
    pub fn range(&self) -> (Vec<u8>, Vec<u8>) {
        let begin = self.prefix.clone();
        let mut end = self.prefix.clone();
        end.push(0xff);
        (begin, end)
    }

    /// `sub.subspace(T) = subspace with prefix P || encode(T)`
    pub fn subspace(&self, values: &[Value]) -> Subspace { Subspace::new(self.pack(values)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(values: Vec<Value>) {
        let encoded = encode_tuple(&values);
        let decoded = decode_tuple(&encoded).expect("decode");
        assert_eq!(decoded, values);
    }

    #[test]
    fn roundtrip_scalars() {
        roundtrip(vec![Value::Null]);
        roundtrip(vec![Value::Bool(true), Value::Bool(false)]);
        roundtrip(vec![Value::Int(0), Value::Int(1), Value::Int(-1), Value::Int(i64::MAX), Value::Int(i64::MIN)]);
        roundtrip(vec![Value::Double(0.0), Value::Double(-0.0), Value::Double(3.5), Value::Double(-3.5)]);
        roundtrip(vec![Value::String("hello\u{0}world".into())]);
        roundtrip(vec![Value::Bytes(vec![0, 1, 2, 0, 0, 255])]);
        roundtrip(vec![Value::Uuid([7u8; 16])]);
        roundtrip(vec![Value::Tuple(vec![Value::Int(1), Value::String("x".into())])]);
    }

    #[test]
    fn tuple_prefix_encodes_to_byte_prefix() {
        let full = vec![Value::Int(1), Value::String("two".into()), Value::Bool(true)];
        let prefix = vec![Value::Int(1), Value::String("two".into())];
        let full_bytes = encode_tuple(&full);
        let prefix_bytes = encode_tuple(&prefix);
        assert!(full_bytes.starts_with(&prefix_bytes));
    }

    #[test]
    fn order_preservation_integers() {
        let values = [-1000i64, -5, -1, 0, 1, 5, 1000, i64::MIN, i64::MAX];
        let mut sorted = values.to_vec();
        sorted.sort();
        let mut by_bytes: Vec<i64> = values.to_vec();
        by_bytes.sort_by(|a, b| encode_tuple(&[Value::Int(*a)]).cmp(&encode_tuple(&[Value::Int(*b)])));
        assert_eq!(sorted, by_bytes);
    }

    #[test]
    fn order_preservation_doubles() {
        let values = [-100.5, -1.0, -0.0, 0.0, 1.0, 100.5, f64::MIN, f64::MAX];
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let mut by_bytes: Vec<f64> = values.to_vec();
        by_bytes.sort_by(|a, b| encode_tuple(&[Value::Double(*a)]).cmp(&encode_tuple(&[Value::Double(*b)])));
        assert_eq!(sorted, by_bytes);
    }

    #[test]
    fn order_preservation_strings() {
        let values = ["", "a", "aa", "ab", "b", "\u{0}"];
        let mut sorted = values.to_vec();
        sorted.sort();
        let mut by_bytes = values.to_vec();
        by_bytes.sort_by(|a, b| encode_tuple(&[Value::String(a.to_string())]).cmp(&encode_tuple(&[Value::String(b.to_string())])));
        assert_eq!(sorted, by_bytes);
    }

    #[test]
    fn cross_type_disjoint_tags() {
        // Values of different types never compare equal at the byte level for the same prefix.
        let null = encode_tuple(&[Value::Null]);
        let int_zero = encode_tuple(&[Value::Int(0)]);
        let bool_false = encode_tuple(&[Value::Bool(false)]);
        assert_ne!(null[0], int_zero[0]);
        assert_ne!(null[0], bool_false[0]);
        assert_ne!(int_zero[0], bool_false[0]);
    }

    #[test]
    fn corrupt_tuple_errors() {
        assert!(decode_tuple(&[tag::STRING, b'a']).is_err());
        assert!(decode_tuple(&[0xfe]).is_err());
        assert!(decode_tuple(&[tag::NESTED_START]).is_err());
    }

    #[test]
    fn subspace_pack_unpack_and_range() {
        let sub = Subspace::new(vec![0x10, 0x20]);
        let packed = sub.pack(&[Value::String("users".into()), Value::Int(7)]);
        assert!(packed.starts_with(&[0x10, 0x20]));
        let unpacked = sub.unpack(&packed).unwrap();
        assert_eq!(unpacked, vec![Value::String("users".into()), Value::Int(7)]);

        let (begin, end) = sub.range();
        assert_eq!(begin, vec![0x10, 0x20]);
        assert_eq!(end, vec![0x10, 0x20, 0xff]);
        assert!(packed.as_slice() > begin.as_slice());
        assert!(packed < end);

        let child = sub.subspace(&[Value::String("users".into())]);
        assert!(child.prefix().starts_with(&[0x10, 0x20]));
    }
}
