use std::sync::Mutex;
use std::time::Duration;

use recordlayer_index::Maintain;
use recordlayer_kv::{KvDatabase, KvError};
use recordlayer_physical::RecordLoader;
use recordlayer_schema::{Entity, IndexDef};
use recordlayer_tuple::{layout, Subspace};
use tracing::{debug, warn};

use crate::config::IndexerConfig;
use crate::error::IndexerError;
use crate::maintainer_factory::build_maintainer;
use crate::range_set::RangeSet;

/// A byte range that could not be built after exhausting retries
/// (`spec.md` §4.9 "non-retryable: record in a per-index failure log and
/// skip the range"). Not persisted — this is a single build run's report,
/// inspected via [`OnlineIndexer::failures`] and cleared on [`OnlineIndexer::rebuild`].
#[derive(Debug, Clone)]
pub struct RangeFailure {
    pub range: (Vec<u8>, Vec<u8>),
    pub cause: String,
}

/// Builds one `WRITE_ONLY` index to completion in sharded, resumable,
/// throttled passes (`spec.md` §4.9). Grounded on `storage/sled/src/
/// index.rs`'s `Index::build_if_needed`/`backfill`, generalized from a
/// single-shot whole-collection backfill to the sharded/resumable model
/// here.
pub struct OnlineIndexer {
    root: Subspace,
    entity: Entity,
    index: IndexDef,
    config: IndexerConfig,
    range_set: RangeSet,
    failures: Mutex<Vec<RangeFailure>>,
}

impl OnlineIndexer {
    pub fn new(root: Subspace, entity: Entity, index: IndexDef, config: IndexerConfig) -> Self {
        let range_set = RangeSet::new(layout::range_set_subspace(&root, &index.name));
        Self { root, entity, index, config, range_set, failures: Mutex::new(Vec::new()) }
    }

    pub fn failures(&self) -> Vec<RangeFailure> { self.failures.lock().unwrap().clone() }

    /// `spec.md` §4.9 Open Question resolution: any unresolved failed
    /// range blocks promotion, even once every range has been attempted.
    pub async fn is_complete(&self, db: &dyn KvDatabase) -> Result<bool, IndexerError> {
        if !self.failures.lock().unwrap().is_empty() {
            return Ok(false);
        }
        let txn = db.begin().await?;
        let record_subspace = layout::record_subspace(&self.root, &self.entity.name);
        let (begin, end) = record_subspace.range();
        Ok(self.range_set.missing_ranges(&*txn, &begin, &end).await?.is_empty())
    }

    /// Runs the worker loop until every missing range has either been
    /// built or recorded as a failure. Does not itself transition the
    /// index to `READABLE` — callers check [`Self::is_complete`] and
    /// perform that administrative transition through
    /// `Schema::set_index_state`.
    pub async fn build(&self, db: &dyn KvDatabase, loader: &dyn RecordLoader) -> Result<(), IndexerError> {
        let record_subspace = layout::record_subspace(&self.root, &self.entity.name);
        let (full_begin, full_end) = record_subspace.range();

        let gaps = {
            let txn = db.begin().await?;
            self.range_set.missing_ranges(&*txn, &full_begin, &full_end).await?
        };

        for (gap_begin, gap_end) in gaps {
            for shard in self.shard_gap(db, &record_subspace, &gap_begin, &gap_end).await? {
                self.build_shard(db, &record_subspace, loader, shard).await;
                tokio::time::sleep(Duration::from_millis(self.config.throttle_delay_ms)).await;
            }
        }
        Ok(())
    }

    /// Splits one gap into contiguous key-count shards of at most
    /// `batch_size` primary keys (`spec.md` §4.9 first bullet).
    async fn shard_gap(&self, db: &dyn KvDatabase, record_subspace: &Subspace, begin: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, IndexerError> {
        let txn = db.begin().await?;
        let pairs = txn.get_range(begin, end).await?;
        let keys: Vec<Vec<u8>> = pairs.into_iter().map(|(k, _)| k).collect();
        if keys.is_empty() {
            return Ok(vec![(begin.to_vec(), end.to_vec())]);
        }

        let chunks: Vec<&[Vec<u8>]> = keys.chunks(self.config.batch_size.max(1)).collect();
        let mut shards = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            let shard_begin = if i == 0 { begin.to_vec() } else { chunk[0].clone() };
            let shard_end = match chunks.get(i + 1) {
                Some(next) => next[0].clone(),
                None => end.to_vec(),
            };
            shards.push((shard_begin, shard_end));
        }
        let _ = record_subspace;
        Ok(shards)
    }

    async fn build_shard(&self, db: &dyn KvDatabase, record_subspace: &Subspace, loader: &dyn RecordLoader, shard: (Vec<u8>, Vec<u8>)) {
        let (begin, end) = shard;
        let mut attempt = 0usize;
        loop {
            match self.try_build_shard(db, record_subspace, loader, &begin, &end).await {
                Ok(()) => {
                    debug!(index = %self.index.name, "shard built");
                    return;
                }
                Err(IndexerError::Kv(e)) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let backoff_ms = self.config.throttle_delay_ms.max(1) * (1u64 << attempt.min(10));
                    warn!(index = %self.index.name, attempt, "retrying shard after retryable KV error");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
                Err(e) => {
                    warn!(index = %self.index.name, error = %e, "shard failed, recording and skipping");
                    self.failures.lock().unwrap().push(RangeFailure { range: (begin, end), cause: e.to_string() });
                    return;
                }
            }
        }
    }

    async fn try_build_shard(&self, db: &dyn KvDatabase, record_subspace: &Subspace, loader: &dyn RecordLoader, begin: &[u8], end: &[u8]) -> Result<(), IndexerError> {
        let txn = db.begin().await?;
        let pairs = txn.get_range(begin, end).await?;
        let maintainer = build_maintainer(&self.root, &self.index)?;
        for (key, bytes) in &pairs {
            let pk = record_subspace.unpack(key)?;
            let record = loader.decode(&self.entity.name, &pk, bytes)?;
            maintainer.apply(&*txn, None, Some(&record)).await?;
        }
        self.range_set.mark_complete(&*txn, begin, end);
        txn.commit().await?;
        Ok(())
    }

    /// `spec.md` §4.9 "Rebuild = clear index subspace + clear range-set +
    /// restart".
    pub async fn rebuild(&self, db: &dyn KvDatabase) -> Result<(), IndexerError> {
        let txn = db.begin().await?;
        let maintainer = build_maintainer(&self.root, &self.index)?;
        maintainer.clear_all(&*txn).await?;
        self.range_set.clear(&*txn);
        txn.commit().await?;
        self.failures.lock().unwrap().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recordlayer_kv::memory::MemoryKv;
    use recordlayer_query::Record;
    use recordlayer_schema::{FieldDescriptor, FieldType, FieldValue, IndexKind, KeyExpression};
    use recordlayer_tuple::Value;
    use std::collections::BTreeMap;

    struct FixedLoader;
    impl RecordLoader for FixedLoader {
        fn decode(&self, record_type: &str, pk: &[Value], _bytes: &[u8]) -> Result<Record, recordlayer_physical::PhysicalError> {
            let category = match &pk[0] {
                Value::Int(n) if n % 2 == 0 => "even",
                _ => "odd",
            };
            Ok(Record::new(record_type, pk.to_vec(), BTreeMap::from([("category".to_string(), FieldValue::Scalar(Value::String(category.into())))])))
        }
    }

    fn product_entity() -> Entity {
        Entity::new("Product", vec![FieldDescriptor::scalar("productID", 1, FieldType::Int), FieldDescriptor::scalar("category", 2, FieldType::String)], KeyExpression::field("productID"))
    }

    #[tokio::test]
    async fn build_indexes_every_existing_record_and_reports_complete() {
        let db = MemoryKv::new();
        let root = Subspace::new(b"S".to_vec());
        let record_subspace = layout::record_subspace(&root, "Product");
        {
            let txn = db.begin().await.unwrap();
            for id in 1..=5i64 {
                txn.set(&record_subspace.pack(&[Value::Int(id)]), &[]);
            }
            txn.commit().await.unwrap();
        }

        let index = IndexDef::new("category_idx", IndexKind::Value, KeyExpression::field("category"), vec!["Product".into()]);
        let config = IndexerConfig { batch_size: 2, throttle_delay_ms: 0, max_retries: 1 };
        let indexer = OnlineIndexer::new(root.clone(), product_entity(), index.clone(), config);

        indexer.build(&db, &FixedLoader).await.unwrap();
        assert!(indexer.is_complete(&db).await.unwrap());
        assert!(indexer.failures().is_empty());

        let txn = db.begin().await.unwrap();
        let index_subspace = layout::index_subspace(&root, "category_idx");
        let (begin, end) = index_subspace.range();
        assert_eq!(txn.get_range(&begin, &end).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn build_twice_is_idempotent() {
        let db = MemoryKv::new();
        let root = Subspace::new(b"S".to_vec());
        let record_subspace = layout::record_subspace(&root, "Product");
        {
            let txn = db.begin().await.unwrap();
            for id in 1..=3i64 {
                txn.set(&record_subspace.pack(&[Value::Int(id)]), &[]);
            }
            txn.commit().await.unwrap();
        }

        let index = IndexDef::new("category_idx", IndexKind::Value, KeyExpression::field("category"), vec!["Product".into()]);
        let indexer = OnlineIndexer::new(root.clone(), product_entity(), index, IndexerConfig::default());

        indexer.build(&db, &FixedLoader).await.unwrap();
        indexer.build(&db, &FixedLoader).await.unwrap();

        let txn = db.begin().await.unwrap();
        let index_subspace = layout::index_subspace(&root, "category_idx");
        let (begin, end) = index_subspace.range();
        assert_eq!(txn.get_range(&begin, &end).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn rebuild_clears_index_and_progress() {
        let db = MemoryKv::new();
        let root = Subspace::new(b"S".to_vec());
        let record_subspace = layout::record_subspace(&root, "Product");
        {
            let txn = db.begin().await.unwrap();
            txn.set(&record_subspace.pack(&[Value::Int(1)]), &[]);
            txn.commit().await.unwrap();
        }

        let index = IndexDef::new("category_idx", IndexKind::Value, KeyExpression::field("category"), vec!["Product".into()]);
        let indexer = OnlineIndexer::new(root.clone(), product_entity(), index, IndexerConfig::default());
        indexer.build(&db, &FixedLoader).await.unwrap();
        assert!(indexer.is_complete(&db).await.unwrap());

        indexer.rebuild(&db).await.unwrap();
        assert!(!indexer.is_complete(&db).await.unwrap());

        let txn = db.begin().await.unwrap();
        let index_subspace = layout::index_subspace(&root, "category_idx");
        let (begin, end) = index_subspace.range();
        assert!(txn.get_range(&begin, &end).await.unwrap().is_empty());
    }
}
