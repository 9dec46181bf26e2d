//! CQLModel Rust - entity mapping for wide-column databases.
//!
//! CQLModel maps Rust types onto CQL tables and turns entity operations into
//! statements:
//!
//! - Dirty tracking through entity proxies and wrapped containers
//! - Immediate or batched flushing, with atomic logged and counter batches
//! - Consistency levels resolved per call, per attribute and per entity
//! - Simple and clustered counters
//! - Slice, typed and indexed queries
//!
//! # Quick Start
//!
//! ```ignore
//! use cqlmodel::prelude::*;
//!
//! async fn example(cx: &Cx, session: impl CqlSession) -> Outcome<(), Error> {
//!     let mut manager = PersistenceManager::new(session, ManagerConfig::default());
//!     manager.register::<User>(cx).await?;
//!
//!     // Insert
//!     let mut user = manager.persist(cx, User::new(10, "john")).await?;
//!
//!     // Update only what changed
//!     user.set("name", |u| u.name = "jane".to_string())?;
//!     user.counter("visits")?.incr();
//!     manager.update(cx, &mut user).await?;
//!
//!     // Range read on a clustered entity
//!     let slice = manager
//!         .slice_query::<Tweet>()?
//!         .partition_components(vec![Value::BigInt(10)])
//!         .from_clusterings(vec![Value::Int(1)])
//!         .to_clusterings(vec![Value::Int(5)]);
//!     let tweets = manager.get_slice::<Tweet>(cx, &slice).await?;
//!
//!     // Batch window
//!     let mut batch = BatchingPersistenceManager::new(manager);
//!     batch.start_batch_with(ConsistencyLevel::Quorum);
//!     batch.remove(cx, user).await?;
//!     batch.end_batch(cx).await
//! }
//! ```

pub use cqlmodel_core::{
    BatchType, ColumnInfo, CompoundKeyDescriptor, ConsistencyLevel, Counter, CqlSession, CqlType,
    Cx, Entity, EntityMeta, EntityMetaBuilder, Error, Event, Interceptor, KeyComponent, KeyRole,
    MappingErrorKind, Options, OptionsBuilder, Outcome, PreparedStatement, PropertyKind,
    PropertyMeta, PropertyMetaBuilder, Result, Row, Statement, StatementBody, Transcoder,
    ValidationErrorKind, Value, parse_consistency_map,
};

pub use cqlmodel_query::{
    BoundingMode, IndexCondition, OrderingMode, SliceQuery, SliceQuerySpec, SliceStatement,
    StatementWrapper, TypedQueryValidator, generate_delete, generate_select,
};

pub use cqlmodel_session::{
    BatchingPersistenceManager, ConsistencyOverrider, DirtyMap, DirtyTracker, EntityProxy,
    EntityRef, FlushContext, FlushMode, ListWrapper, ManagerConfig, MapWrapper, PersistenceManager,
    Refresh, SetWrapper, Slot, Tracked,
};

/// Commonly used items.
///
/// ```ignore
/// use cqlmodel::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        BatchingPersistenceManager, BoundingMode, ConsistencyLevel, Counter, CqlSession, CqlType,
        Cx, Entity, EntityMeta, EntityProxy, Error, Event, IndexCondition, Interceptor,
        ManagerConfig, Options, OrderingMode, Outcome, PersistenceManager, PropertyKind,
        PropertyMeta, Refresh, Result, Row, SliceQuery, Tracked, Value,
    };
}
