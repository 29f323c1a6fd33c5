use async_trait::async_trait;
use recordlayer_kv::KvTransaction;
use recordlayer_query::Record;
use recordlayer_schema::KeyExpression;
use recordlayer_tuple::{Subspace, Value};

use crate::error::IndexError;
use crate::maintain::Maintain;

/// `spec.md` §4.3/§5.4 SPATIAL: no production R-tree/quadtree is in scope;
/// this reference backend orders entries by geohash-prefix string so a
/// nearby-points query is a single contiguous range scan, generalized
/// enough to swap in a real structure later (`spec.md` explicitly allows a
/// non-production algorithm here, matching the VECTOR index's stance).
#[async_trait]
pub trait SpatialIndexBackend: Send + Sync {
    async fn upsert(&self, txn: &dyn KvTransaction, pk: &[Value], lat: f64, lon: f64) -> Result<(), IndexError>;
    async fn remove(&self, txn: &dyn KvTransaction, pk: &[Value]) -> Result<(), IndexError>;
    async fn near(&self, txn: &dyn KvTransaction, lat: f64, lon: f64, precision: usize) -> Result<Vec<Vec<Value>>, IndexError>;
}

const BASE32: &[u8] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Standard geohash encoding: interleave latitude/longitude bit
/// refinements into 5-bit base32 characters.
fn geohash(lat: f64, lon: f64, precision: usize) -> String {
    let mut lat_range = (-90.0f64, 90.0f64);
    let mut lon_range = (-180.0f64, 180.0f64);
    let mut out = String::with_capacity(precision);
    let mut bit = 0;
    let mut ch = 0u8;
    let mut even = true;

    while out.len() < precision {
        if even {
            let mid = (lon_range.0 + lon_range.1) / 2.0;
            if lon >= mid {
                ch |= 1 << (4 - bit);
                lon_range.0 = mid;
            } else {
                lon_range.1 = mid;
            }
        } else {
            let mid = (lat_range.0 + lat_range.1) / 2.0;
            if lat >= mid {
                ch |= 1 << (4 - bit);
                lat_range.0 = mid;
            } else {
                lat_range.1 = mid;
            }
        }
        even = !even;
        if bit < 4 {
            bit += 1;
        } else {
            out.push(BASE32[ch as usize] as char);
            bit = 0;
            ch = 0;
        }
    }
    out
}

pub struct GeohashSpatialIndex {
    pub subspace: Subspace,
    pub precision: usize,
}

impl GeohashSpatialIndex {
    pub fn new(subspace: Subspace, precision: usize) -> Self { Self { subspace, precision } }
}

#[async_trait]
impl SpatialIndexBackend for GeohashSpatialIndex {
    async fn upsert(&self, txn: &dyn KvTransaction, pk: &[Value], lat: f64, lon: f64) -> Result<(), IndexError> {
        let hash = geohash(lat, lon, self.precision);
        let mut tuple = vec![Value::String(hash)];
        tuple.extend(pk.iter().cloned());
        txn.set(&self.subspace.pack(&tuple), &[]);
        Ok(())
    }

    async fn remove(&self, txn: &dyn KvTransaction, pk: &[Value]) -> Result<(), IndexError> {
        let (begin, end) = self.subspace.range();
        let entries = txn.get_range(&begin, &end).await?;
        for (key, _) in entries {
            let decoded = self.subspace.unpack(&key)?;
            if &decoded[1..] == pk {
                txn.clear(&key);
            }
        }
        Ok(())
    }

    async fn near(&self, txn: &dyn KvTransaction, lat: f64, lon: f64, precision: usize) -> Result<Vec<Vec<Value>>, IndexError> {
        let prefix_hash = geohash(lat, lon, precision.min(self.precision));
        let prefix_subspace = self.subspace.subspace(&[Value::String(prefix_hash)]);
        let (begin, end) = prefix_subspace.range();
        let entries = txn.get_range(&begin, &end).await?;
        entries.into_iter().map(|(key, _)| self.subspace.unpack(&key).map(|t| t[1..].to_vec()).map_err(IndexError::from)).collect()
    }
}

pub struct SpatialMaintainer {
    pub backend: GeohashSpatialIndex,
    pub lat_field: String,
    pub lon_field: String,
}

impl SpatialMaintainer {
    pub fn new(backend: GeohashSpatialIndex, lat_field: impl Into<String>, lon_field: impl Into<String>) -> Self {
        Self { backend, lat_field: lat_field.into(), lon_field: lon_field.into() }
    }

    fn coords(&self, record: &Record) -> Option<(f64, f64)> {
        let lat = match record.field(&self.lat_field)? {
            recordlayer_schema::FieldValue::Scalar(Value::Double(d)) => *d,
            recordlayer_schema::FieldValue::Scalar(Value::Int(i)) => *i as f64,
            _ => return None,
        };
        let lon = match record.field(&self.lon_field)? {
            recordlayer_schema::FieldValue::Scalar(Value::Double(d)) => *d,
            recordlayer_schema::FieldValue::Scalar(Value::Int(i)) => *i as f64,
            _ => return None,
        };
        Some((lat, lon))
    }
}

#[async_trait]
impl Maintain for SpatialMaintainer {
    async fn apply(&self, txn: &dyn KvTransaction, old: Option<&Record>, new: Option<&Record>) -> Result<(), IndexError> {
        if let Some(record) = old {
            self.backend.remove(txn, &record.pk).await?;
        }
        if let Some(record) = new {
            if let Some((lat, lon)) = self.coords(record) {
                self.backend.upsert(txn, &record.pk, lat, lon).await?;
            }
        }
        Ok(())
    }

    async fn clear_all(&self, txn: &dyn KvTransaction) -> Result<(), IndexError> {
        let (begin, end) = self.backend.subspace.range();
        txn.clear_range(&begin, &end);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recordlayer_kv::memory::MemoryKv;
    use recordlayer_kv::KvDatabase;
    use recordlayer_schema::FieldValue;
    use std::collections::BTreeMap;

    fn place(pk: i64, lat: f64, lon: f64) -> Record {
        Record::new(
            "Place",
            vec![Value::Int(pk)],
            BTreeMap::from([
                ("lat".to_string(), FieldValue::Scalar(Value::Double(lat))),
                ("lon".to_string(), FieldValue::Scalar(Value::Double(lon))),
            ]),
        )
    }

    #[tokio::test]
    async fn near_finds_points_sharing_geohash_prefix() {
        let db = MemoryKv::new_test();
        let backend = GeohashSpatialIndex::new(Subspace::new(b"I/places".to_vec()), 7);
        let m = SpatialMaintainer::new(backend, "lat", "lon");

        let txn = db.begin().await.unwrap();
        m.apply(&*txn, None, Some(&place(1, 40.7128, -74.0060))).await.unwrap();
        m.apply(&*txn, None, Some(&place(2, 40.7129, -74.0061))).await.unwrap();
        m.apply(&*txn, None, Some(&place(3, 34.0522, -118.2437))).await.unwrap();
        txn.commit().await.unwrap();

        let txn2 = db.begin().await.unwrap();
        let nearby = m.backend.near(&*txn2, 40.7128, -74.0060, 5).await.unwrap();
        let pks: Vec<i64> = nearby.into_iter().map(|t| if let Value::Int(i) = t[0] { i } else { unreachable!() }).collect();
        assert!(pks.contains(&1));
        assert!(pks.contains(&2));
        assert!(!pks.contains(&3));
    }
}
