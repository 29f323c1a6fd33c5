use std::sync::{Arc, RwLock};

use recordlayer_indexer::{IndexerConfig, OnlineIndexer};
use recordlayer_kv::KvDatabase;
use recordlayer_physical::RecordLoader;
use recordlayer_schema::{Entity, IndexDef, IndexState, Schema};
use recordlayer_tuple::Subspace;
use recordlayer_health::HealthTracker;

use crate::error::RecordLayerError;

/// Drives an index through its `Disabled -> WriteOnly -> Readable` state
/// machine (`spec.md` §4.9), coordinating the schema's state field with
/// the actual online build. Grounded on `core/src/node.rs`'s migration
/// orchestration (flip state, run the background job, flip state again
/// only once the job reports done).
pub struct IndexStateManager {
    schema: Arc<RwLock<Schema>>,
    root: Subspace,
    db: Arc<dyn KvDatabase>,
    health: Arc<HealthTracker>,
    indexer_config: IndexerConfig,
}

impl IndexStateManager {
    pub(crate) fn new(schema: Arc<RwLock<Schema>>, root: Subspace, db: Arc<dyn KvDatabase>, health: Arc<HealthTracker>, indexer_config: IndexerConfig) -> Self {
        Self { schema, root, db, health, indexer_config }
    }

    pub fn state(&self, index_name: &str) -> Result<IndexState, RecordLayerError> {
        Ok(self.schema.read().unwrap().index(index_name)?.state)
    }

    fn entity_and_index(&self, index_name: &str) -> Result<(Entity, IndexDef), RecordLayerError> {
        let schema = self.schema.read().unwrap();
        let index = schema.index(index_name)?.clone();
        let record_type = index.record_types.first().ok_or_else(|| RecordLayerError::Decode(format!("index '{index_name}' applies to no record type")))?;
        let entity = schema.entity(record_type)?.clone();
        Ok((entity, index))
    }

    fn set_state(&self, index_name: &str, state: IndexState) -> Result<(), RecordLayerError> {
        Ok(self.schema.write().unwrap().set_index_state(index_name, state)?)
    }

    pub fn disable(&self, index_name: &str) -> Result<(), RecordLayerError> { self.set_state(index_name, IndexState::Disabled) }

    /// `Disabled -> WriteOnly`, runs the online build to completion, then
    /// `WriteOnly -> Readable`. Refuses promotion (leaving the index in
    /// `WriteOnly`) while the indexer's failure log is non-empty
    /// (`spec.md` §4.9 "an index does not become Readable while any shard
    /// has outstanding failures").
    pub async fn enable(&self, index_name: &str, loader: &dyn RecordLoader) -> Result<(), RecordLayerError> {
        self.set_state(index_name, IndexState::WriteOnly)?;
        let (entity, index) = self.entity_and_index(index_name)?;
        let indexer = OnlineIndexer::new(self.root.clone(), entity, index, self.indexer_config);
        indexer.build(&*self.db, loader).await?;
        if !indexer.is_complete(&*self.db).await? {
            return Err(RecordLayerError::Decode(format!("index '{index_name}' has {} unresolved range failures", indexer.failures().len())));
        }
        self.set_state(index_name, IndexState::Readable)
    }

    /// Promotes an already-`WriteOnly` index without re-running a build,
    /// for the case where the caller built it out of band.
    pub fn make_readable(&self, index_name: &str) -> Result<(), RecordLayerError> { self.set_state(index_name, IndexState::Readable) }

    /// `Readable -> WriteOnly`, clears the maintainer's existing entries
    /// and the online indexer's progress, resets the index's health
    /// state, rebuilds from scratch, then promotes back to `Readable`
    /// (`spec.md` §4.9 rebuild path).
    pub async fn rebuild(&self, index_name: &str, loader: &dyn RecordLoader) -> Result<(), RecordLayerError> {
        self.set_state(index_name, IndexState::WriteOnly)?;
        let (entity, index) = self.entity_and_index(index_name)?;
        let indexer = OnlineIndexer::new(self.root.clone(), entity, index, self.indexer_config);
        indexer.rebuild(&*self.db).await?;
        self.health.reset(index_name);
        indexer.build(&*self.db, loader).await?;
        if !indexer.is_complete(&*self.db).await? {
            return Err(RecordLayerError::Decode(format!("index '{index_name}' has {} unresolved range failures after rebuild", indexer.failures().len())));
        }
        self.set_state(index_name, IndexState::Readable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use recordlayer_health::HealthConfig;
    use recordlayer_kv::memory::MemoryKv;
    use recordlayer_schema::{FieldDescriptor, FieldType, FieldValue, IndexDef, IndexKind, KeyExpression};
    use recordlayer_tuple::Value;

    use crate::codec::BincodeRecordCodec;
    use crate::store::RecordStore;

    fn schema() -> Schema {
        let mut schema = Schema::new();
        schema
            .add_entity(Entity::new("Widget", vec![FieldDescriptor::scalar("id", 1, FieldType::Int), FieldDescriptor::scalar("status", 2, FieldType::String)], KeyExpression::field("id")))
            .unwrap();
        schema.add_index(IndexDef::new("status_idx", IndexKind::Value, KeyExpression::field("status"), vec!["Widget".into()]).with_state(IndexState::Disabled)).unwrap();
        schema
    }

    #[tokio::test]
    async fn enable_builds_index_then_promotes_to_readable() {
        let store = RecordStore::new(schema(), Subspace::new(b"T".to_vec()), Arc::new(MemoryKv::new_test()), Arc::new(BincodeRecordCodec)).with_health(Arc::new(HealthTracker::new(HealthConfig::default())));
        store
            .save("Widget", BTreeMap::from([("id".into(), FieldValue::Scalar(Value::Int(1))), ("status".into(), FieldValue::Scalar(Value::String("open".into())))]))
            .await
            .unwrap();

        let manager = store.index_state_manager();
        assert_eq!(manager.state("status_idx").unwrap(), IndexState::Disabled);
        manager.enable("status_idx", &store.loader()).await.unwrap();
        assert_eq!(manager.state("status_idx").unwrap(), IndexState::Readable);
    }

    #[tokio::test]
    async fn enable_then_disable_then_enable_again_round_trips() {
        let store = RecordStore::new(schema(), Subspace::new(b"T".to_vec()), Arc::new(MemoryKv::new_test()), Arc::new(BincodeRecordCodec)).with_health(Arc::new(HealthTracker::new(HealthConfig::default())));
        let manager = store.index_state_manager();
        manager.enable("status_idx", &store.loader()).await.unwrap();
        manager.disable("status_idx").unwrap();
        assert_eq!(manager.state("status_idx").unwrap(), IndexState::Disabled);
        manager.enable("status_idx", &store.loader()).await.unwrap();
        assert_eq!(manager.state("status_idx").unwrap(), IndexState::Readable);
    }
}
