//! Slice (range) queries over the clustering components of a partition.

mod builder;
mod generator;
mod spec;

pub use builder::{DEFAULT_BATCH_SIZE, DEFAULT_LIMIT, SliceQuery};
pub use generator::{SliceStatement, generate_delete, generate_select};
pub use spec::{BoundingMode, OrderingMode, SliceQuerySpec};
