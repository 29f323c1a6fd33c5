use recordlayer_query::Record;
use recordlayer_tuple::Value;

use crate::error::PhysicalError;

/// Decodes a stored record's wire bytes into the query layer's `Record`
/// shape. Record serialization is an external collaborator (`spec.md`
/// §1); every operator here reads raw bytes off the record subspace and
/// hands them to a caller-supplied `RecordLoader` rather than assuming
/// any particular wire format.
pub trait RecordLoader: Send + Sync {
    fn decode(&self, record_type: &str, pk: &[Value], bytes: &[u8]) -> Result<Record, PhysicalError>;
}
