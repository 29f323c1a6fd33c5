//! Index lifecycle maintenance: bringing a `WRITE_ONLY` index up to date
//! with already-written records (`spec.md` §4.9 online indexer), and
//! checking an established index against its records for drift
//! (`spec.md` §4.10 scrubber). Neither module decides the `WRITE_ONLY` →
//! `READABLE` transition itself — callers check [`OnlineIndexer::is_complete`]
//! and drive `Schema::set_index_state` once satisfied.

mod config;
mod error;
mod maintainer_factory;
mod online_indexer;
mod range_set;
mod scrubber;

pub use config::IndexerConfig;
pub use error::IndexerError;
pub use maintainer_factory::build_maintainer;
pub use online_indexer::{OnlineIndexer, RangeFailure};
pub use range_set::RangeSet;
pub use scrubber::{DanglingEntry, MissingEntry, ScrubReport, Scrubber};
