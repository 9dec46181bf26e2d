//! Persistence contexts, dirty tracking and batching for CQLModel Rust.
//!
//! `cqlmodel-session` is the **mutation-flush layer**. It turns entity
//! operations into statements and decides when those statements reach the
//! cluster.
//!
//! # Role In The Architecture
//!
//! - **Dirty tracking**: proxies and wrapped containers record which
//!   attributes changed since load.
//! - **Flush contexts**: statements execute immediately, or accumulate in a
//!   batch window and are sent as atomic groups at the end of the window.
//! - **Consistency resolution**: one place decides the level a read or a
//!   write is sent with.
//! - **Managers**: `PersistenceManager` is the caller-facing surface;
//!   `BatchingPersistenceManager` adds the batch window.
//!
//! # Example
//!
//! ```ignore
//! let mut manager = PersistenceManager::new(session, ManagerConfig::default());
//! manager.register::<User>(&cx).await?;
//!
//! let mut user = manager.persist(&cx, User::new(10, "john")).await?;
//! user.set("name", |u| u.name = "jane".into())?;
//! manager.update(&cx, &mut user).await?;
//!
//! let mut batch = BatchingPersistenceManager::new(manager);
//! batch.start_batch_with(ConsistencyLevel::Quorum);
//! batch.persist(&cx, User::new(11, "paul")).await?;
//! batch.end_batch(&cx).await?;
//! ```

/// Unwrap an `Outcome`, returning early on anything but `Ok`.
macro_rules! try_outcome {
    ($outcome:expr) => {
        match $outcome {
            ::asupersync::Outcome::Ok(value) => value,
            ::asupersync::Outcome::Err(e) => return ::asupersync::Outcome::Err(e),
            ::asupersync::Outcome::Cancelled(r) => return ::asupersync::Outcome::Cancelled(r),
            ::asupersync::Outcome::Panicked(p) => return ::asupersync::Outcome::Panicked(p),
        }
    };
}

/// Unwrap a `Result` inside a function returning `Outcome`.
macro_rules! try_result {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => return ::asupersync::Outcome::Err(e),
        }
    };
}

pub mod batch;
pub mod consistency;
pub mod context;
pub mod dao;
pub mod dirty;
pub mod flush;
pub mod manager;
pub mod proxy;
pub mod wrapper;

pub use batch::BatchingPersistenceManager;
pub use consistency::ConsistencyOverrider;
pub use context::{PersistenceContext, Refresh};
pub use dao::DaoContext;
pub use dirty::{DirtyMap, DirtyTracker};
pub use flush::{EventHolder, FlushContext, FlushMode};
pub use manager::{ManagerConfig, PersistenceManager};
pub use proxy::{EntityProxy, EntityRef, ProxyContext, Tracked};
pub use wrapper::{
    EntryCursor, KeySetView, ListCursor, ListWrapper, MapWrapper, SetCursor, SetWrapper, Slot,
    SubList, ValuesView,
};

#[cfg(test)]
pub(crate) mod testing;
