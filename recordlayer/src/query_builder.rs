use std::pin::Pin;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use futures::{Stream, StreamExt};

use recordlayer_kv::KvDatabase;
use recordlayer_kv::KvTransaction;
use recordlayer_planner::{Planner, Query, SortKey};
use recordlayer_query::{compare_values, Filter, QueryError, Record, RecordCursor};
use recordlayer_schema::Schema;
use recordlayer_tuple::Subspace;
use recordlayer_health::HealthTracker;

use crate::codec::RecordCodec;
use crate::error::RecordLayerError;
use crate::store::RecordStore;

/// A lazy stream of decoded records, the builder's final product
/// (`spec.md` §4.7 "All cursors are lazy").
pub type RecordStream = Pin<Box<dyn Stream<Item = Result<Record, QueryError>> + Send>>;

/// Fluent query construction over one record type (`spec.md` §4.6), owning
/// its own clone of the collaborators it needs so it can outlive the
/// [`RecordStore`] call that created it. Grounded on
/// `ankql`'s predicate-builder ergonomics, generalized to this crate's
/// planner/executor split.
pub struct QueryBuilder {
    db: Arc<dyn KvDatabase>,
    codec: Arc<dyn RecordCodec>,
    health: Arc<HealthTracker>,
    planner: Arc<Planner>,
    schema: Schema,
    root: Subspace,
    record_type: String,
    filter: Filter,
    sort: Vec<SortKey>,
    limit: Option<usize>,
}

impl QueryBuilder {
    pub(crate) fn new(
        schema: Schema,
        root: Subspace,
        db: Arc<dyn KvDatabase>,
        codec: Arc<dyn RecordCodec>,
        health: Arc<HealthTracker>,
        planner: Arc<Planner>,
        record_type: String,
    ) -> Self {
        Self { db, codec, health, planner, schema, root, record_type, filter: Filter::And(vec![]), sort: Vec::new(), limit: None }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    /// ANDs an `Overlaps` leaf onto the existing filter (`spec.md` §4.6
    /// `overlaps(queryRange)`).
    pub fn overlaps(mut self, field: impl Into<String>, query: recordlayer_schema::RangeValue) -> Self {
        let leaf = Filter::Leaf(recordlayer_query::FilterLeaf::Overlaps { field: field.into(), query });
        self.filter = and_with(self.filter, leaf);
        self
    }

    pub fn order_by(mut self, sort: SortKey) -> Self {
        self.sort.push(sort);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn build_store_handle(&self) -> RecordStore {
        RecordStore::new(self.schema.clone(), self.root.clone(), self.db.clone(), self.codec.clone())
            .with_health(self.health.clone())
            .with_planner(self.planner.clone())
    }

    pub async fn execute_in(&self, txn: &dyn KvTransaction) -> Result<RecordStream, RecordLayerError> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
        let mut query = Query::new(self.record_type.clone(), self.filter.clone()).with_sort(self.sort.clone());
        if let Some(limit) = self.limit {
            query = query.with_limit(limit);
        }
        let plan = self.planner.plan(&self.schema, &query, now)?;

        let store = self.build_store_handle();
        let mut records = store.execute_plan(txn, &self.schema, &plan).await?;

        if !self.sort.is_empty() {
            records.sort_by(|a, b| {
                for key in &self.sort {
                    let av = a.field(&key.field);
                    let bv = b.field(&key.field);
                    let ordering = match (av, bv) {
                        (Some(av), Some(bv)) => compare_values(&single(av), &single(bv)),
                        (Some(_), None) => std::cmp::Ordering::Greater,
                        (None, Some(_)) => std::cmp::Ordering::Less,
                        (None, None) => std::cmp::Ordering::Equal,
                    };
                    let ordering = if key.descending { ordering.reverse() } else { ordering };
                    if ordering != std::cmp::Ordering::Equal {
                        return ordering;
                    }
                }
                std::cmp::Ordering::Equal
            });
        }
        if let Some(limit) = self.limit {
            records.truncate(limit);
        }

        let items: Vec<Result<Record, QueryError>> = records.into_iter().map(Ok).collect();
        let stream = futures::stream::iter(items).take_limit(self.limit.map(|n| n as u64));
        Ok(Box::pin(stream))
    }

    pub async fn execute(&self) -> Result<RecordStream, RecordLayerError> {
        let txn = self.db.begin().await?;
        self.execute_in(&*txn).await
    }
}

fn and_with(existing: Filter, leaf: Filter) -> Filter {
    match existing {
        Filter::And(mut children) => {
            children.push(leaf);
            Filter::And(children)
        }
        other => Filter::And(vec![other, leaf]),
    }
}

fn single(value: &recordlayer_schema::FieldValue) -> recordlayer_tuple::Value {
    use recordlayer_schema::FieldValue;
    match value {
        FieldValue::Scalar(v) => v.clone(),
        FieldValue::Optional(Some(v)) => v.clone(),
        FieldValue::Optional(None) => recordlayer_tuple::Value::Null,
        FieldValue::Repeated(vs) => vs.first().cloned().unwrap_or(recordlayer_tuple::Value::Null),
        FieldValue::Range(r) => r.lower.clone().unwrap_or(recordlayer_tuple::Value::Null),
    }
}
