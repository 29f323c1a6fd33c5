pub mod average;
pub mod count;
pub mod minmax;
pub mod rank;
pub mod spatial;
pub mod sum;
pub mod unique;
pub mod value;
pub mod vector;
pub mod version;

pub use average::AverageMaintainer;
pub use count::CountMaintainer;
pub use minmax::{MinMaxKind, MinMaxMaintainer};
pub use rank::RankMaintainer;
pub use spatial::{GeohashSpatialIndex, SpatialIndexBackend, SpatialMaintainer};
pub use sum::SumMaintainer;
pub use unique::UniqueMaintainer;
pub use value::ValueMaintainer;
pub use vector::{distance as vector_distance, BruteForceVectorIndex, VectorIndexBackend, VectorMaintainer};
pub use version::VersionMaintainer;
