//! Filter AST, matching semantics, and the lazy record cursor contract
//! (`spec.md` §4.5, §4.7). Grounded on `storage/common/src/predicate.rs`'s
//! `ConjunctFinder`/AST visitor shape and `storage/common/src/filtering.rs`'s
//! `ValueSetStream` combinator style.

pub mod boundary;
mod cursor;
mod filter;
mod record;

pub use cursor::{FilteredCursor, LimitedCursor, QueryError, RecordCursor};
pub use filter::{compare_values, ComparisonOp, Filter, FilterLeaf};
pub use record::Record;
