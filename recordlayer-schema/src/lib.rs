//! Entities, indexes, key expressions, and the index state machine.
//!
//! Grounded on `core/src/schema.rs`'s placeholder `Entity`/`Collection`
//! shape (fleshed out fresh, since the teacher never implemented it) and
//! `storage/common/src/index_spec.rs`'s prefix/inverse matching, which this
//! crate's planner-facing consumers reuse for candidate-index compatibility.

mod entity;
mod error;
mod field;
mod index;
mod key_expr;
mod schema;

pub use entity::Entity;
pub use error::SchemaError;
pub use field::{BoundaryType, FieldCardinality, FieldDescriptor, FieldType, FieldValue, RangeValue};
pub use index::{IndexDef, IndexKind, IndexOptions, IndexState, IndexStateError, VectorMetric};
pub use key_expr::{KeyExpression, RangeComponent};
pub use schema::{Schema, SchemaVersion};
