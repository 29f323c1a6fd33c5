use std::collections::BTreeMap;

use recordlayer_physical::{PhysicalError, RecordLoader};
use recordlayer_query::Record;
use recordlayer_schema::FieldValue;
use recordlayer_tuple::Value;

use crate::error::RecordLayerError;

/// The record store's write-side counterpart to [`RecordLoader`]: decoding
/// stored bytes back into a field map is `recordlayer-physical`'s seam,
/// encoding a field map into storable bytes is this crate's (`spec.md` §1
/// treats record serialization itself as an external collaborator).
pub trait RecordCodec: RecordLoader {
    fn encode(&self, fields: &BTreeMap<String, FieldValue>) -> Result<Vec<u8>, RecordLayerError>;
}

/// Reference codec: `bincode` over the field map. `FieldValue` and
/// everything it's built from already derive `serde::Serialize`/
/// `Deserialize` (`recordlayer-schema`'s field/value types), so this is
/// the direct "hand the map to bincode" implementation, the same pattern
/// `ankurah_core`'s property-bag encoding is modeled on.
#[derive(Debug, Default, Clone, Copy)]
pub struct BincodeRecordCodec;

impl RecordLoader for BincodeRecordCodec {
    fn decode(&self, record_type: &str, pk: &[Value], bytes: &[u8]) -> Result<Record, PhysicalError> {
        let fields: BTreeMap<String, FieldValue> = bincode::deserialize(bytes).map_err(|e| PhysicalError::Decode(e.to_string()))?;
        Ok(Record::new(record_type, pk.to_vec(), fields))
    }
}

impl RecordCodec for BincodeRecordCodec {
    fn encode(&self, fields: &BTreeMap<String, FieldValue>) -> Result<Vec<u8>, RecordLayerError> {
        bincode::serialize(fields).map_err(|e| RecordLayerError::Decode(e.to_string()))
    }
}

/// Adapts a borrowed `&dyn RecordCodec` to `&dyn RecordLoader` without
/// relying on trait-object upcasting, so the physical executor and the
/// online indexer/scrubber (which only need the decode half) can be
/// driven off the one codec the record store owns.
pub(crate) struct CodecLoader<'a>(pub &'a dyn RecordCodec);

impl RecordLoader for CodecLoader<'_> {
    fn decode(&self, record_type: &str, pk: &[Value], bytes: &[u8]) -> Result<Record, PhysicalError> { self.0.decode(record_type, pk, bytes) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recordlayer_tuple::Value;

    #[test]
    fn encode_decode_roundtrips_through_bincode() {
        let codec = BincodeRecordCodec;
        let fields = BTreeMap::from([("name".to_string(), FieldValue::Scalar(Value::String("widget".into())))]);
        let bytes = codec.encode(&fields).unwrap();
        let record = codec.decode("Widget", &[Value::Int(1)], &bytes).unwrap();
        assert_eq!(record.fields, fields);
        assert_eq!(record.pk, vec![Value::Int(1)]);
    }
}
