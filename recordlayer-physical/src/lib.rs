//! Physical execution operators for a chosen [`recordlayer_planner::Plan`]
//! (`spec.md` §4.7 "Physical plan operators"). This crate is the seam
//! between a plan and actual key-value reads: it never chooses a plan
//! (that's `recordlayer-planner`'s job) and never decodes stored record
//! bytes itself (that's the caller-supplied [`RecordLoader`]'s job).

mod error;
mod executor;
mod loader;

pub use error::PhysicalError;
pub use executor::Executor;
pub use loader::RecordLoader;

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use recordlayer_kv::memory::MemoryKv;
    use recordlayer_kv::{KvDatabase, KvTransaction};
    use recordlayer_planner::Plan;
    use recordlayer_query::{Filter, Record};
    use recordlayer_schema::{
        BoundaryType, Entity, FieldDescriptor, FieldType, FieldValue, IndexDef, IndexKind, IndexOptions, IndexState, KeyExpression, RangeComponent, Schema, VectorMetric,
    };
    use recordlayer_tuple::{layout, Subspace, Value};

    use super::*;

    struct JsonLoader;

    impl RecordLoader for JsonLoader {
        fn decode(&self, record_type: &str, pk: &[Value], bytes: &[u8]) -> Result<Record, PhysicalError> {
            let text = std::str::from_utf8(bytes).map_err(|e| PhysicalError::Decode(e.to_string()))?;
            let mut fields = BTreeMap::new();
            fields.insert("raw".to_string(), FieldValue::Scalar(Value::String(text.to_string())));
            if let Some(status) = parse_status(text) {
                fields.insert("status".to_string(), FieldValue::Scalar(Value::String(status)));
            }
            Ok(Record { record_type: record_type.to_string(), pk: pk.to_vec(), fields })
        }
    }

    /// Pulls `"status":"..."` out of the tiny hand-written JSON this test
    /// module writes; not a general JSON parser.
    fn parse_status(text: &str) -> Option<String> {
        let key = "\"status\":\"";
        let start = text.find(key)? + key.len();
        let end = text[start..].find('"')? + start;
        Some(text[start..end].to_string())
    }

    fn root() -> Subspace { Subspace::new(b"T".to_vec()) }

    fn schema_with_status_index() -> Schema {
        let mut schema = Schema::new();
        schema
            .add_entity(Entity::new("Widget", vec![FieldDescriptor::scalar("id", 1, FieldType::Int), FieldDescriptor::scalar("status", 2, FieldType::String)], KeyExpression::field("id")))
            .unwrap();
        schema
            .add_index(IndexDef::new("status_idx", IndexKind::Value, KeyExpression::field("status"), vec!["Widget".into()]).with_state(IndexState::Readable))
            .unwrap();
        schema
    }

    fn seed_widget(txn: &dyn KvTransaction, root: &Subspace, id: i64, status: &str) {
        let record_subspace = layout::record_subspace(root, "Widget");
        let index_subspace = layout::index_subspace(root, "status_idx");
        txn.set(&record_subspace.pack(&[Value::Int(id)]), format!("{{\"status\":\"{status}\"}}").as_bytes());
        txn.set(&index_subspace.pack(&[Value::String(status.into()), Value::Int(id)]), &[]);
    }

    #[tokio::test]
    async fn index_scan_finds_matching_widget_by_equality() {
        let db = MemoryKv::new();
        let root = root();
        {
            let txn = db.begin().await.unwrap();
            seed_widget(&*txn, &root, 1, "open");
            seed_widget(&*txn, &root, 2, "closed");
            txn.commit().await.unwrap();
        }

        let schema = schema_with_status_index();
        let executor = Executor::new(&schema, root.clone());
        let plan = Plan::equality_scan("status_idx".into(), vec![Value::String("open".into())]);

        let txn = db.begin().await.unwrap();
        let records = executor.execute(&plan, &*txn, &JsonLoader).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].pk, vec![Value::Int(1)]);
    }

    #[tokio::test]
    async fn in_join_dedups_and_fetches_each_matching_value() {
        let db = MemoryKv::new();
        let root = root();
        {
            let txn = db.begin().await.unwrap();
            seed_widget(&*txn, &root, 1, "open");
            seed_widget(&*txn, &root, 2, "closed");
            seed_widget(&*txn, &root, 3, "archived");
            txn.commit().await.unwrap();
        }

        let schema = schema_with_status_index();
        let executor = Executor::new(&schema, root.clone());
        let plan = Plan::InJoin { field: "status".into(), values: vec![Value::String("open".into()), Value::String("archived".into())], index: "status_idx".into() };

        let txn = db.begin().await.unwrap();
        let mut records = executor.execute(&plan, &*txn, &JsonLoader).await.unwrap();
        records.sort_by_key(|r| r.pk.clone());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].pk, vec![Value::Int(1)]);
        assert_eq!(records[1].pk, vec![Value::Int(3)]);
    }

    fn booking_schema() -> Schema {
        let mut schema = Schema::new();
        schema
            .add_entity(Entity::new("Booking", vec![FieldDescriptor::scalar("bookingID", 1, FieldType::Int)], KeyExpression::field("bookingID")))
            .unwrap();
        schema
            .add_index(
                IndexDef::new("period_lower", IndexKind::RangeComponent, KeyExpression::range("period", RangeComponent::LowerBound, BoundaryType::HalfOpen), vec!["Booking".into()])
                    .with_state(IndexState::Readable),
            )
            .unwrap();
        schema
            .add_index(
                IndexDef::new("period_upper", IndexKind::RangeComponent, KeyExpression::range("period", RangeComponent::UpperBound, BoundaryType::HalfOpen), vec!["Booking".into()])
                    .with_state(IndexState::Readable),
            )
            .unwrap();
        schema
    }

    fn seed_booking(txn: &dyn KvTransaction, root: &Subspace, id: i64, lower: i64, upper: i64) {
        let record_subspace = layout::record_subspace(root, "Booking");
        let lower_subspace = layout::index_subspace(root, "period_lower");
        let upper_subspace = layout::index_subspace(root, "period_upper");
        txn.set(&record_subspace.pack(&[Value::Int(id)]), format!("{{\"id\":{id}}}").as_bytes());
        txn.set(&lower_subspace.pack(&[Value::Int(lower), Value::Int(id)]), &[]);
        txn.set(&upper_subspace.pack(&[Value::Int(upper), Value::Int(id)]), &[]);
    }

    #[tokio::test]
    async fn intersection_of_range_component_bounds_finds_overlapping_booking() {
        let db = MemoryKv::new();
        let root = root();
        {
            let txn = db.begin().await.unwrap();
            seed_booking(&*txn, &root, 1, 0, 10);
            seed_booking(&*txn, &root, 2, 20, 30);
            txn.commit().await.unwrap();
        }

        let schema = booking_schema();
        let executor = Executor::new(&schema, root.clone());
        let plan = Plan::Intersection(vec![
            Plan::IndexScan { index: "period_lower".into(), begin: None, begin_exclusive: false, end: Some(vec![Value::Int(5)]), end_inclusive: true },
            Plan::IndexScan { index: "period_upper".into(), begin: Some(vec![Value::Int(5)]), begin_exclusive: true, end: None, end_inclusive: false },
        ]);

        let txn = db.begin().await.unwrap();
        let records = executor.execute(&plan, &*txn, &JsonLoader).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].pk, vec![Value::Int(1)]);
    }

    #[tokio::test]
    async fn full_scan_with_residual_filter_returns_only_matches() {
        let db = MemoryKv::new();
        let root = root();
        {
            let txn = db.begin().await.unwrap();
            seed_widget(&*txn, &root, 1, "open");
            seed_widget(&*txn, &root, 2, "closed");
            txn.commit().await.unwrap();
        }

        let schema = schema_with_status_index();
        let executor = Executor::new(&schema, root.clone());
        let plan = Plan::FullScan { record_type: "Widget".into() }.filtered(Some(Filter::field_eq("status", "closed")));

        let txn = db.begin().await.unwrap();
        let records = executor.execute(&plan, &*txn, &JsonLoader).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].pk, vec![Value::Int(2)]);
    }

    #[tokio::test]
    async fn empty_plan_returns_no_records_without_touching_storage() {
        let db = MemoryKv::new();
        let schema = schema_with_status_index();
        let executor = Executor::new(&schema, root());
        let txn = db.begin().await.unwrap();
        let records = executor.execute(&Plan::Empty, &*txn, &JsonLoader).await.unwrap();
        assert!(records.is_empty());
    }

    fn vector_schema() -> Schema {
        let mut schema = Schema::new();
        schema.add_entity(Entity::new("Doc", vec![FieldDescriptor::scalar("id", 1, FieldType::Int)], KeyExpression::field("id"))).unwrap();
        let mut index = IndexDef::new("embedding_idx", IndexKind::Vector, KeyExpression::field("embedding"), vec!["Doc".into()]).with_state(IndexState::Readable);
        index.options = IndexOptions::Vector { dimensions: 2, metric: VectorMetric::Euclidean };
        schema.add_index(index).unwrap();
        schema
    }

    #[tokio::test]
    async fn nearest_neighbors_oversamples_until_k_post_filter_matches_are_found() {
        use recordlayer_index::BruteForceVectorIndex;
        use recordlayer_index::VectorIndexBackend as _;

        let db = MemoryKv::new();
        let root = root();
        let schema = vector_schema();
        let vector_subspace = layout::index_subspace(&root, "embedding_idx");
        let backend = BruteForceVectorIndex::new(vector_subspace, VectorMetric::Euclidean, 2);
        {
            let txn = db.begin().await.unwrap();
            let record_subspace = layout::record_subspace(&root, "Doc");
            for (id, status, vector) in [(1i64, "keep", vec![0.0, 0.0]), (2, "drop", vec![0.1, 0.1]), (3, "keep", vec![5.0, 5.0])] {
                txn.set(&record_subspace.pack(&[Value::Int(id)]), format!("{{\"status\":\"{status}\"}}").as_bytes());
                backend.upsert(&*txn, &[Value::Int(id)], &vector).await.unwrap();
            }
            txn.commit().await.unwrap();
        }

        let executor = Executor::new(&schema, root.clone());
        // Closest point (0.1, 0.1) is "drop"; the first oversampling attempt
        // (k=1) only sees that one and must retry to reach the "keep" match.
        let plan = Plan::NearestNeighbors { index: "embedding_idx".into(), query: vec![0.1, 0.1], k: 1, filter: Some(Box::new(Filter::field_eq("status", "keep"))) };

        let txn = db.begin().await.unwrap();
        let records = executor.execute(&plan, &*txn, &JsonLoader).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].pk, vec![Value::Int(1)]);
    }
}
