use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

use recordlayer_index::{BruteForceVectorIndex, VectorIndexBackend};
use recordlayer_kv::KvTransaction;
use recordlayer_planner::Plan;
use recordlayer_query::Record;
use recordlayer_schema::{IndexOptions, Schema};
use recordlayer_tuple::{encode_tuple, layout, Subspace, Value};
use tracing::debug;

use crate::error::PhysicalError;
use crate::loader::RecordLoader;

/// Default nearest-neighbor oversampling retries before giving up and
/// returning whatever was found (`spec.md` §4.7 "NearestNeighbors ...
/// bounded by maxAttempts").
const DEFAULT_MAX_NN_ATTEMPTS: usize = 5;

/// Walks a chosen [`Plan`] against a transaction, reading index/record
/// subspaces under `root` and decoding stored bytes through a
/// caller-supplied [`RecordLoader`] (`spec.md` §4.7 "Physical plan
/// operators"). Grounded on `storage/sled/src/scan_index.rs`'s
/// prefix-guard / equality-extension scan logic.
pub struct Executor<'s> {
    schema: &'s Schema,
    root: Subspace,
    max_nn_attempts: usize,
}

impl<'s> Executor<'s> {
    pub fn new(schema: &'s Schema, root: Subspace) -> Self { Self { schema, root, max_nn_attempts: DEFAULT_MAX_NN_ATTEMPTS } }

    pub fn with_max_nn_attempts(mut self, attempts: usize) -> Self {
        self.max_nn_attempts = attempts;
        self
    }

    /// Executes `plan`, returning matching records with no further
    /// filtering beyond what the plan tree already specifies.
    pub async fn execute(&self, plan: &Plan, txn: &dyn KvTransaction, loader: &dyn RecordLoader) -> Result<Vec<Record>, PhysicalError> {
        self.execute_plan(plan, txn, loader).await
    }

    fn execute_plan<'a>(
        &'a self,
        plan: &'a Plan,
        txn: &'a dyn KvTransaction,
        loader: &'a dyn RecordLoader,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Record>, PhysicalError>> + Send + 'a>> {
        Box::pin(async move {
            match plan {
                Plan::IndexScan { index, begin, begin_exclusive, end, end_inclusive } => {
                    self.exec_index_scan(index, begin.as_deref(), *begin_exclusive, end.as_deref(), *end_inclusive, txn, loader).await
                }
                Plan::Intersection(children) => {
                    let mut sets = Vec::with_capacity(children.len());
                    for child in children {
                        sets.push(self.execute_plan(child, txn, loader).await?);
                    }
                    Ok(intersect_by_pk(sets))
                }
                Plan::Union(children) => {
                    let mut seen: HashSet<Vec<u8>> = HashSet::new();
                    let mut out = Vec::new();
                    for child in children {
                        for record in self.execute_plan(child, txn, loader).await? {
                            if seen.insert(encode_tuple(&record.pk)) {
                                out.push(record);
                            }
                        }
                    }
                    Ok(out)
                }
                Plan::InJoin { field: _, values, index } => self.exec_in_join(index, values, txn, loader).await,
                Plan::NearestNeighbors { index, query, k, filter } => self.exec_nearest_neighbors(index, query, *k, filter.as_deref(), txn, loader).await,
                Plan::Filter { child, remaining } => {
                    let records = self.execute_plan(child, txn, loader).await?;
                    Ok(records.into_iter().filter(|r| remaining.matches(r)).collect())
                }
                Plan::FullScan { record_type } => self.exec_full_scan(record_type, txn, loader).await,
                Plan::Empty => Ok(Vec::new()),
            }
        })
    }

    fn index_arities(&self, index_name: &str) -> Result<(String, usize), PhysicalError> {
        let index_def = self.schema.index(index_name)?;
        let record_type = index_def.record_types.first().cloned().unwrap_or_default();
        let value_arity = index_def.root.referenced_fields().len().max(1);
        Ok((record_type, value_arity))
    }

    async fn fetch_record(
        &self,
        record_type: &str,
        pk: &[Value],
        record_subspace: &Subspace,
        txn: &dyn KvTransaction,
        loader: &dyn RecordLoader,
    ) -> Result<Option<Record>, PhysicalError> {
        match txn.get(&record_subspace.pack(pk)).await? {
            Some(bytes) => Ok(Some(loader.decode(record_type, pk, &bytes)?)),
            None => Ok(None),
        }
    }

    async fn exec_index_scan(
        &self,
        index_name: &str,
        begin: Option<&[Value]>,
        begin_exclusive: bool,
        end: Option<&[Value]>,
        end_inclusive: bool,
        txn: &dyn KvTransaction,
        loader: &dyn RecordLoader,
    ) -> Result<Vec<Record>, PhysicalError> {
        let (record_type, value_arity) = self.index_arities(index_name)?;
        let index_subspace = layout::index_subspace(&self.root, index_name);
        let record_subspace = layout::record_subspace(&self.root, &record_type);
        let (full_begin, full_end) = index_subspace.range();

        let begin_bytes = match begin {
            Some(values) => {
                let mut b = index_subspace.pack(values);
                if begin_exclusive {
                    b.push(0xff);
                }
                b
            }
            None => full_begin,
        };
        let end_bytes = match end {
            Some(values) => {
                let mut e = index_subspace.pack(values);
                if end_inclusive {
                    e.push(0xff);
                }
                e
            }
            None => full_end,
        };

        let pairs = txn.get_range(&begin_bytes, &end_bytes).await?;
        let mut out = Vec::with_capacity(pairs.len());
        for (key, _value) in pairs {
            let full_tuple = index_subspace.unpack(&key)?;
            if full_tuple.len() < value_arity {
                continue;
            }
            let pk = full_tuple[value_arity..].to_vec();
            if let Some(record) = self.fetch_record(&record_type, &pk, &record_subspace, txn, loader).await? {
                out.push(record);
            }
        }
        Ok(out)
    }

    async fn exec_in_join(&self, index_name: &str, values: &[Value], txn: &dyn KvTransaction, loader: &dyn RecordLoader) -> Result<Vec<Record>, PhysicalError> {
        let (record_type, value_arity) = self.index_arities(index_name)?;
        let index_subspace = layout::index_subspace(&self.root, index_name);
        let record_subspace = layout::record_subspace(&self.root, &record_type);

        let mut seen: HashSet<Vec<u8>> = HashSet::new();
        let mut out = Vec::new();
        for value in values {
            let begin = index_subspace.pack(std::slice::from_ref(value));
            let mut end = begin.clone();
            end.push(0xff);
            let pairs = txn.get_range(&begin, &end).await?;
            for (key, _v) in pairs {
                let full_tuple = index_subspace.unpack(&key)?;
                if full_tuple.len() < value_arity {
                    continue;
                }
                let pk = full_tuple[value_arity..].to_vec();
                if !seen.insert(encode_tuple(&pk)) {
                    continue;
                }
                if let Some(record) = self.fetch_record(&record_type, &pk, &record_subspace, txn, loader).await? {
                    out.push(record);
                }
            }
        }
        Ok(out)
    }

    async fn exec_nearest_neighbors(
        &self,
        index_name: &str,
        query: &[f64],
        k: usize,
        filter: Option<&recordlayer_query::Filter>,
        txn: &dyn KvTransaction,
        loader: &dyn RecordLoader,
    ) -> Result<Vec<Record>, PhysicalError> {
        let index_def = self.schema.index(index_name)?;
        let (dimensions, metric) = match &index_def.options {
            IndexOptions::Vector { dimensions, metric } => (*dimensions, *metric),
            _ => return Err(PhysicalError::NotAVectorIndex(index_name.to_string())),
        };
        let record_type = index_def.record_types.first().cloned().unwrap_or_default();
        let record_subspace = layout::record_subspace(&self.root, &record_type);
        let backend = BruteForceVectorIndex::new(layout::index_subspace(&self.root, index_name), metric, dimensions);

        let mut oversample = 1usize;
        let mut attempt = 0;
        loop {
            let want = k.saturating_mul(oversample).max(k).max(1);
            let nearest = backend.nearest(txn, query, want).await?;
            let mut out = Vec::with_capacity(k);
            for (pk, _distance) in nearest {
                let Some(record) = self.fetch_record(&record_type, &pk, &record_subspace, txn, loader).await? else {
                    continue;
                };
                if filter.map(|f| f.matches(&record)).unwrap_or(true) {
                    out.push(record);
                    if out.len() == k {
                        break;
                    }
                }
            }
            if out.len() >= k || attempt + 1 >= self.max_nn_attempts {
                out.truncate(k);
                return Ok(out);
            }
            attempt += 1;
            oversample *= 2;
            debug!(index = index_name, attempt, oversample, found = out.len(), k, "nearest-neighbor post-filter shortfall, widening oversample");
        }
    }

    async fn exec_full_scan(&self, record_type: &str, txn: &dyn KvTransaction, loader: &dyn RecordLoader) -> Result<Vec<Record>, PhysicalError> {
        let record_subspace = layout::record_subspace(&self.root, record_type);
        let (begin, end) = record_subspace.range();
        let pairs = txn.get_range(&begin, &end).await?;
        let mut out = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let pk = record_subspace.unpack(&key)?;
            out.push(loader.decode(record_type, &pk, &value)?);
        }
        Ok(out)
    }
}

/// `spec.md` §4.7 "Intersection(children[])": a PK survives only if it
/// appears in every child's result set; output re-sorted ascending by PK
/// and deduplicated.
fn intersect_by_pk(mut sets: Vec<Vec<Record>>) -> Vec<Record> {
    if sets.is_empty() {
        return Vec::new();
    }
    let first = sets.remove(0);
    let rest_keys: Vec<HashSet<Vec<u8>>> = sets.iter().map(|recs| recs.iter().map(|r| encode_tuple(&r.pk)).collect()).collect();

    let mut out: Vec<Record> = first.into_iter().filter(|r| rest_keys.iter().all(|keys| keys.contains(&encode_tuple(&r.pk)))).collect();
    out.sort_by(|a, b| encode_tuple(&a.pk).cmp(&encode_tuple(&b.pk)));
    out.dedup_by(|a, b| a.pk == b.pk);
    out
}
