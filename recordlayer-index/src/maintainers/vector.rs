use async_trait::async_trait;
use recordlayer_kv::KvTransaction;
use recordlayer_query::Record;
use recordlayer_schema::{KeyExpression, VectorMetric};
use recordlayer_tuple::{Subspace, Value};

use crate::error::IndexError;
use crate::maintain::Maintain;

/// `spec.md` §4.3/§5.4 VECTOR: no production approximate-nearest-neighbor
/// structure is in scope; this is a reference brute-force backend (one
/// `pk -> embedding` entry per record, `nearest` does a full scan) behind a
/// trait so a real ANN structure (HNSW, IVF) can be swapped in later
/// without touching callers.
#[async_trait]
pub trait VectorIndexBackend: Send + Sync {
    async fn upsert(&self, txn: &dyn KvTransaction, pk: &[Value], embedding: &[f64]) -> Result<(), IndexError>;
    async fn remove(&self, txn: &dyn KvTransaction, pk: &[Value]) -> Result<(), IndexError>;
    async fn nearest(&self, txn: &dyn KvTransaction, query: &[f64], k: usize) -> Result<Vec<(Vec<Value>, f64)>, IndexError>;
}

/// The same per-metric distance math `BruteForceVectorIndex::nearest` uses,
/// exposed so a flat-scan fallback over already-fetched records can rank
/// candidates identically to the indexed path.
pub fn distance(metric: VectorMetric, a: &[f64], b: &[f64]) -> f64 {
    match metric {
        VectorMetric::Euclidean => a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt(),
        VectorMetric::DotProduct => -a.iter().zip(b).map(|(x, y)| x * y).sum::<f64>(),
        VectorMetric::Cosine => {
            let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
            let na = a.iter().map(|x| x * x).sum::<f64>().sqrt();
            let nb = b.iter().map(|x| x * x).sum::<f64>().sqrt();
            if na == 0.0 || nb == 0.0 { 1.0 } else { 1.0 - dot / (na * nb) }
        }
    }
}

fn encode_embedding(embedding: &[f64]) -> Vec<u8> { embedding.iter().flat_map(|d| d.to_le_bytes()).collect() }

fn decode_embedding(bytes: &[u8]) -> Vec<f64> {
    bytes.chunks_exact(8).map(|c| f64::from_le_bytes(c.try_into().unwrap())).collect()
}

/// Reference brute-force [`VectorIndexBackend`].
pub struct BruteForceVectorIndex {
    pub subspace: Subspace,
    pub metric: VectorMetric,
    pub dimensions: usize,
}

impl BruteForceVectorIndex {
    pub fn new(subspace: Subspace, metric: VectorMetric, dimensions: usize) -> Self { Self { subspace, metric, dimensions } }
}

#[async_trait]
impl VectorIndexBackend for BruteForceVectorIndex {
    async fn upsert(&self, txn: &dyn KvTransaction, pk: &[Value], embedding: &[f64]) -> Result<(), IndexError> {
        if embedding.len() != self.dimensions {
            return Err(IndexError::MalformedAggregate("vector".into(), "embedding dimensionality mismatch"));
        }
        txn.set(&self.subspace.pack(pk), &encode_embedding(embedding));
        Ok(())
    }

    async fn remove(&self, txn: &dyn KvTransaction, pk: &[Value]) -> Result<(), IndexError> {
        txn.clear(&self.subspace.pack(pk));
        Ok(())
    }

    async fn nearest(&self, txn: &dyn KvTransaction, query: &[f64], k: usize) -> Result<Vec<(Vec<Value>, f64)>, IndexError> {
        let (begin, end) = self.subspace.range();
        let entries = txn.get_range(&begin, &end).await?;
        let mut scored: Vec<(Vec<Value>, f64)> = entries
            .into_iter()
            .map(|(key, value)| {
                let pk = self.subspace.unpack(&key).unwrap_or_default();
                let embedding = decode_embedding(&value);
                (pk, distance(self.metric, query, &embedding))
            })
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}

pub struct VectorMaintainer {
    pub backend: BruteForceVectorIndex,
    pub key_expr: KeyExpression,
}

impl VectorMaintainer {
    pub fn new(backend: BruteForceVectorIndex, key_expr: KeyExpression) -> Self { Self { backend, key_expr } }

    fn embedding(&self, record: &Record) -> Option<Vec<f64>> {
        let tuples = self.key_expr.evaluate(&record.fields);
        let tuple = tuples.into_iter().next()?;
        let value = tuple.into_iter().next()?;
        match value {
            Value::Tuple(elements) => elements
                .into_iter()
                .map(|v| if let Value::Double(d) = v { Some(d) } else { None })
                .collect(),
            _ => None,
        }
    }
}

#[async_trait]
impl Maintain for VectorMaintainer {
    async fn apply(&self, txn: &dyn KvTransaction, old: Option<&Record>, new: Option<&Record>) -> Result<(), IndexError> {
        if let Some(record) = old {
            self.backend.remove(txn, &record.pk).await?;
        }
        if let Some(record) = new {
            if let Some(embedding) = self.embedding(record) {
                self.backend.upsert(txn, &record.pk, &embedding).await?;
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
