use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use tracing::warn;

use recordlayer_index::vector_distance;
use recordlayer_indexer::{IndexerConfig, OnlineIndexer, Scrubber};
use recordlayer_kv::{KvDatabase, KvTransaction};
use recordlayer_physical::Executor;
use recordlayer_planner::{Plan, Planner, PlannerConfig};
use recordlayer_query::{Filter, Record};
use recordlayer_schema::{Entity, IndexDef, IndexOptions, KeyExpression, Schema};
use recordlayer_tuple::{layout, Subspace, Value};
use recordlayer_health::{HealthConfig, HealthTracker};

use crate::codec::{CodecLoader, RecordCodec};
use crate::error::RecordLayerError;
use crate::index_state::IndexStateManager;
use crate::query_builder::QueryBuilder;

/// Caller-facing record store: owns the schema, the root subspace, the
/// transactional KV store, and a record codec, and exposes the
/// create/save/fetch/delete/scan/query operations `spec.md` names as a
/// single facade over the nine lower-level crates. Grounded on
/// `ankurah_core::node::Node`'s role as the one object an application
/// holds to reach storage, indexing, and querying.
pub struct RecordStore {
    schema: Arc<RwLock<Schema>>,
    root: Subspace,
    db: Arc<dyn KvDatabase>,
    codec: Arc<dyn RecordCodec>,
    health: Arc<HealthTracker>,
    planner: Arc<Planner>,
    indexer_config: IndexerConfig,
}

impl RecordStore {
    pub fn new(schema: Schema, root: Subspace, db: Arc<dyn KvDatabase>, codec: Arc<dyn RecordCodec>) -> Self {
        Self {
            schema: Arc::new(RwLock::new(schema)),
            root,
            db,
            codec,
            health: Arc::new(HealthTracker::new(HealthConfig::default())),
            planner: Arc::new(Planner::new(PlannerConfig::default())),
            indexer_config: IndexerConfig::default(),
        }
    }

    pub fn with_health(mut self, health: Arc<HealthTracker>) -> Self {
        self.health = health;
        self
    }

    pub fn with_planner(mut self, planner: Arc<Planner>) -> Self {
        self.planner = planner;
        self
    }

    pub fn with_indexer_config(mut self, indexer_config: IndexerConfig) -> Self {
        self.indexer_config = indexer_config;
        self
    }

    pub fn db(&self) -> &Arc<dyn KvDatabase> { &self.db }

    pub fn codec(&self) -> &Arc<dyn RecordCodec> { &self.codec }

    pub fn health(&self) -> &Arc<HealthTracker> { &self.health }

    pub fn planner(&self) -> &Arc<Planner> { &self.planner }

    pub fn root(&self) -> &Subspace { &self.root }

    /// A point-in-time copy of the live schema. `Schema` is cheap to clone
    /// (two `HashMap`s and an `Option`), so query planning and index
    /// maintenance work against a stable snapshot rather than holding the
    /// lock across an `.await`.
    pub fn schema(&self) -> Schema { self.schema.read().unwrap().clone() }

    fn primary_key_for(&self, schema: &Schema, record_type: &str, fields: &BTreeMap<String, recordlayer_schema::FieldValue>) -> Result<Vec<Value>, RecordLayerError> {
        let entity = schema.entity(record_type)?;
        let mut tuples = entity.primary_key.evaluate(fields);
        match tuples.len() {
            1 => Ok(tuples.pop().unwrap()),
            0 => Err(RecordLayerError::Decode(format!("primary key expression for '{record_type}' produced no tuple"))),
            _ => Err(RecordLayerError::Decode(format!("primary key expression for '{record_type}' produced more than one tuple"))),
        }
    }

    async fn maintain_indexes(&self, txn: &dyn KvTransaction, schema: &Schema, record_type: &str, old: Option<&Record>, new: Option<&Record>) -> Result<(), RecordLayerError> {
        for index in schema.indexes_for(record_type) {
            if !index.state.maintains_on_write() {
                continue;
            }
            let maintainer = recordlayer_indexer::build_maintainer(&self.root, index)?;
            recordlayer_index::Maintain::apply(&maintainer, txn, old, new).await?;
        }
        Ok(())
    }

    /// Upserts a record regardless of whether one already exists under its
    /// primary key (`spec.md` §4.1 "save"). Unlike [`Self::create`], this
    /// never checks `primaryKeyEnforced`.
    pub async fn save_in(&self, txn: &dyn KvTransaction, record_type: &str, fields: BTreeMap<String, recordlayer_schema::FieldValue>) -> Result<Vec<Value>, RecordLayerError> {
        let schema = self.schema();
        let pk = self.primary_key_for(&schema, record_type, &fields)?;
        let record_subspace = layout::record_subspace(&self.root, record_type);
        let key = record_subspace.pack(&pk);

        let old = match txn.get(&key).await? {
            Some(bytes) => Some(self.codec.decode(record_type, &pk, &bytes)?),
            None => None,
        };
        let new = Record::new(record_type, pk.clone(), fields);
        let encoded = self.codec.encode(&new.fields)?;
        txn.set(&key, &encoded);

        self.maintain_indexes(txn, &schema, record_type, old.as_ref(), Some(&new)).await?;
        Ok(pk)
    }

    pub async fn save(&self, record_type: &str, fields: BTreeMap<String, recordlayer_schema::FieldValue>) -> Result<Vec<Value>, RecordLayerError> {
        let txn = self.db.begin().await?;
        let pk = self.save_in(&*txn, record_type, fields).await?;
        txn.commit().await?;
        Ok(pk)
    }

    /// Inserts a new record, rejecting a colliding primary key when the
    /// owning entity's `primaryKeyEnforced` is set (`spec.md` §3).
    pub async fn create_in(&self, txn: &dyn KvTransaction, record_type: &str, fields: BTreeMap<String, recordlayer_schema::FieldValue>) -> Result<Vec<Value>, RecordLayerError> {
        let schema = self.schema();
        let pk = self.primary_key_for(&schema, record_type, &fields)?;
        let entity = schema.entity(record_type)?;
        let record_subspace = layout::record_subspace(&self.root, record_type);
        let key = record_subspace.pack(&pk);

        if entity.primary_key_enforced && txn.get(&key).await?.is_some() {
            return Err(RecordLayerError::DuplicateKey(pk));
        }

        let new = Record::new(record_type, pk.clone(), fields);
        let encoded = self.codec.encode(&new.fields)?;
        txn.set(&key, &encoded);

        self.maintain_indexes(txn, &schema, record_type, None, Some(&new)).await?;
        Ok(pk)
    }

    pub async fn create(&self, record_type: &str, fields: BTreeMap<String, recordlayer_schema::FieldValue>) -> Result<Vec<Value>, RecordLayerError> {
        let txn = self.db.begin().await?;
        let pk = self.create_in(&*txn, record_type, fields).await?;
        txn.commit().await?;
        Ok(pk)
    }

    pub async fn fetch_in(&self, txn: &dyn KvTransaction, record_type: &str, pk: &[Value]) -> Result<Option<Record>, RecordLayerError> {
        let record_subspace = layout::record_subspace(&self.root, record_type);
        match txn.get(&record_subspace.pack(pk)).await? {
            Some(bytes) => Ok(Some(self.codec.decode(record_type, pk, &bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn fetch(&self, record_type: &str, pk: &[Value]) -> Result<Option<Record>, RecordLayerError> {
        let txn = self.db.begin().await?;
        self.fetch_in(&*txn, record_type, pk).await
    }

    pub async fn delete_in(&self, txn: &dyn KvTransaction, record_type: &str, pk: &[Value]) -> Result<bool, RecordLayerError> {
        let schema = self.schema();
        let record_subspace = layout::record_subspace(&self.root, record_type);
        let key = record_subspace.pack(pk);

        let old = match txn.get(&key).await? {
            Some(bytes) => self.codec.decode(record_type, pk, &bytes)?,
            None => return Ok(false),
        };
        txn.clear(&key);
        self.maintain_indexes(txn, &schema, record_type, Some(&old), None).await?;
        Ok(true)
    }

    pub async fn delete(&self, record_type: &str, pk: &[Value]) -> Result<bool, RecordLayerError> {
        let txn = self.db.begin().await?;
        let deleted = self.delete_in(&*txn, record_type, pk).await?;
        txn.commit().await?;
        Ok(deleted)
    }

    pub async fn scan_in(&self, txn: &dyn KvTransaction, record_type: &str) -> Result<Vec<Record>, RecordLayerError> {
        let record_subspace = layout::record_subspace(&self.root, record_type);
        let (begin, end) = record_subspace.range();
        let pairs = txn.get_range(&begin, &end).await?;
        let mut out = Vec::with_capacity(pairs.len());
        for (key, bytes) in pairs {
            let pk = record_subspace.unpack(&key)?;
            out.push(self.codec.decode(record_type, &pk, &bytes)?);
        }
        Ok(out)
    }

    pub async fn scan(&self, record_type: &str) -> Result<Vec<Record>, RecordLayerError> {
        let txn = self.db.begin().await?;
        self.scan_in(&*txn, record_type).await
    }

    /// Starts a fluent [`QueryBuilder`] for `record_type`, snapshotting the
    /// schema and cloning the `Arc`-held collaborators the builder needs
    /// so it can run independently of `&self`'s lifetime.
    pub fn query(&self, record_type: impl Into<String>) -> QueryBuilder {
        QueryBuilder::new(self.schema(), self.root.clone(), self.db.clone(), self.codec.clone(), self.health.clone(), self.planner.clone(), record_type.into())
    }

    pub fn collect_table_statistics(&self, record_type: impl Into<String>, stats: recordlayer_planner::TableStats) {
        self.planner.statistics().set_table_statistics(record_type, stats);
    }

    pub fn collect_index_statistics(&self, index_name: impl Into<String>, histogram: recordlayer_planner::Histogram) {
        self.planner.statistics().set_index_histogram(index_name, histogram);
    }

    fn entity_and_index(&self, index_name: &str) -> Result<(Entity, IndexDef), RecordLayerError> {
        let schema = self.schema();
        let index = schema.index(index_name)?.clone();
        let record_type = index.record_types.first().ok_or_else(|| RecordLayerError::Decode(format!("index '{index_name}' applies to no record type")))?;
        let entity = schema.entity(record_type)?.clone();
        Ok((entity, index))
    }

    pub fn online_indexer(&self, index_name: &str) -> Result<OnlineIndexer, RecordLayerError> {
        let (entity, index) = self.entity_and_index(index_name)?;
        Ok(OnlineIndexer::new(self.root.clone(), entity, index, self.indexer_config))
    }

    pub fn scrubber(&self, index_name: &str, repair: bool) -> Result<Scrubber, RecordLayerError> {
        let (entity, index) = self.entity_and_index(index_name)?;
        Ok(Scrubber::new(self.root.clone(), entity, index, self.indexer_config, repair)?)
    }

    pub fn index_state_manager(&self) -> IndexStateManager {
        IndexStateManager::new(self.schema.clone(), self.root.clone(), self.db.clone(), self.health.clone(), self.indexer_config)
    }

    /// The codec, borrowed as a [`recordlayer_physical::RecordLoader`] for
    /// callers (the online indexer, the scrubber) that only need the
    /// decode half.
    pub fn loader(&self) -> CodecLoader<'_> { CodecLoader(self.codec.as_ref()) }

    pub(crate) async fn execute_plan(&self, txn: &dyn KvTransaction, schema: &Schema, plan: &Plan) -> Result<Vec<Record>, RecordLayerError> {
        match nearest_neighbor_index(plan) {
            Some(index_name) => self.execute_with_nn_health_gate(txn, schema, plan, index_name).await,
            None => {
                let executor = Executor::new(schema, self.root.clone());
                Ok(executor.execute(plan, txn, &self.loader()).await?)
            }
        }
    }

    async fn execute_with_nn_health_gate(&self, txn: &dyn KvTransaction, schema: &Schema, plan: &Plan, index_name: &str) -> Result<Vec<Record>, RecordLayerError> {
        let (allowed, _reason) = self.health.should_use(index_name);
        if allowed {
            let executor = Executor::new(schema, self.root.clone());
            match executor.execute(plan, txn, &self.loader()).await {
                Ok(records) => {
                    self.health.record_success(index_name);
                    return Ok(records);
                }
                Err(e) => {
                    self.health.record_failure(index_name, &e.to_string());
                    warn!(index = index_name, error = %e, "nearest-neighbor index execution failed, falling back to flat scan");
                }
            }
        }
        self.flat_scan_nearest_neighbors(txn, schema, plan).await
    }

    /// Health-gated fallback (`spec.md` §4.11): scans the owning entity's
    /// full record range, decodes every record, ranks by the same
    /// per-metric distance the indexed path uses, and returns the top `k`.
    /// No entry in [`recordlayer_health`] itself drives this — wiring the
    /// tracker into nearest-neighbor execution is this crate's job.
    async fn flat_scan_nearest_neighbors(&self, txn: &dyn KvTransaction, schema: &Schema, plan: &Plan) -> Result<Vec<Record>, RecordLayerError> {
        use futures::StreamExt;
        use recordlayer_query::RecordCursor;

        let Some((index_name, query, k, residual)) = unwrap_nearest_neighbors(plan) else {
            return Ok(Vec::new());
        };
        let index = schema.index(index_name)?;
        let (dimensions, metric) = match &index.options {
            IndexOptions::Vector { dimensions, metric } => (*dimensions, *metric),
            _ => return Err(RecordLayerError::Decode(format!("index '{index_name}' is not a vector index"))),
        };
        let record_type = index.record_types.first().cloned().unwrap_or_default();
        let record_subspace = layout::record_subspace(&self.root, &record_type);
        let (begin, end) = record_subspace.range();
        let pairs = txn.get_range(&begin, &end).await?;

        let mut records = Vec::with_capacity(pairs.len());
        for (key, bytes) in pairs {
            let pk = record_subspace.unpack(&key)?;
            records.push(Ok(self.codec.decode(&record_type, &pk, &bytes)?));
        }
        let stream = futures::stream::iter(records);
        let candidates: Vec<Record> = match residual {
            Some(filter) => stream.filter_predicate(filter).collect::<Vec<_>>().await.into_iter().collect::<Result<Vec<_>, _>>()?,
            None => stream.collect::<Vec<_>>().await.into_iter().collect::<Result<Vec<_>, _>>()?,
        };

        let mut scored: Vec<(Record, f64)> = candidates
            .into_iter()
            .filter_map(|record| {
                let embedding = extract_embedding(&index.root, &record)?;
                if embedding.len() != dimensions {
                    return None;
                }
                let distance = vector_distance(metric, &query, &embedding);
                Some((record, distance))
            })
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored.into_iter().map(|(record, _)| record).collect())
    }
}

fn nearest_neighbor_index(plan: &Plan) -> Option<&str> {
    match plan {
        Plan::NearestNeighbors { index, .. } => Some(index.as_str()),
        Plan::Filter { child, .. } => nearest_neighbor_index(child),
        _ => None,
    }
}

fn unwrap_nearest_neighbors(plan: &Plan) -> Option<(&str, Vec<f64>, usize, Option<Filter>)> {
    match plan {
        Plan::NearestNeighbors { index, query, k, filter } => Some((index.as_str(), query.clone(), *k, filter.as_ref().map(|f| (**f).clone()))),
        Plan::Filter { child, remaining } => match &**child {
            Plan::NearestNeighbors { index, query, k, filter } => {
                let combined = match filter {
                    Some(inner) => Filter::and([remaining.clone(), (**inner).clone()]),
                    None => remaining.clone(),
                };
                Some((index.as_str(), query.clone(), *k, Some(combined)))
            }
            _ => None,
        },
        _ => None,
    }
}

/// Mirrors `VectorMaintainer`'s own embedding extraction
/// (`recordlayer-index/src/maintainers/vector.rs`): the index's key
/// expression must evaluate to exactly one tuple of one `Tuple(doubles)`
/// element.
fn extract_embedding(key_expr: &KeyExpression, record: &Record) -> Option<Vec<f64>> {
    let tuple = key_expr.evaluate(&record.fields).into_iter().next()?;
    let value = tuple.into_iter().next()?;
    match value {
        Value::Tuple(elements) => elements.into_iter().map(|v| if let Value::Double(d) = v { Some(d) } else { None }).collect(),
        _ => None,
    }
}
