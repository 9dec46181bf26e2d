//! Batch windows over a persistence manager.
//!
//! Writes issued between [`BatchingPersistenceManager::start_batch`] and
//! [`BatchingPersistenceManager::end_batch`] accumulate in a batching flush
//! context and reach the cluster as one logged batch plus one counter batch.
//! Reads execute at once.
//!
//! The level of a window is chosen when it starts. Passing a level to a
//! single operation inside a window abandons the window and fails.

use crate::consistency::batch_conflict;
use crate::context::Refresh;
use crate::flush::FlushContext;
use crate::manager::PersistenceManager;
use crate::proxy::{EntityProxy, Tracked};
use cqlmodel_core::{
    ConsistencyLevel, CqlSession, Cx, Entity, Error, Options, Outcome, Result, Value,
};
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// A persistence manager with an explicit batch window.
pub struct BatchingPersistenceManager<S: CqlSession> {
    manager: PersistenceManager<S>,
    flush: FlushContext<S>,
    default_level: ConsistencyLevel,
    last_timestamp: i64,
}

impl<S: CqlSession> fmt::Debug for BatchingPersistenceManager<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchingPersistenceManager")
            .field("flush", &self.flush)
            .field("default_level", &self.default_level)
            .finish_non_exhaustive()
    }
}

fn now_micros() -> i64 {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    i64::try_from(elapsed.as_micros()).unwrap_or(i64::MAX)
}

impl<S: CqlSession> BatchingPersistenceManager<S> {
    /// Wrap a manager. The window level defaults to the configured default
    /// write level.
    pub fn new(manager: PersistenceManager<S>) -> Self {
        let default_level = manager.config().default_write_level;
        let flush = FlushContext::batching(Arc::clone(manager.session()), default_level);
        Self {
            manager,
            flush,
            default_level,
            last_timestamp: 0,
        }
    }

    /// The wrapped manager, for queries and registration lookups.
    pub fn manager(&self) -> &PersistenceManager<S> {
        &self.manager
    }

    /// Drop any pending window and return the wrapped manager.
    pub fn into_inner(self) -> PersistenceManager<S> {
        self.manager
    }

    pub fn is_batching(&self) -> bool {
        self.flush.is_batching()
    }

    /// Level the current window writes with.
    pub fn batch_level(&self) -> ConsistencyLevel {
        self.flush.consistency_level()
    }

    /// Statements waiting for the end of the window.
    pub fn pending_statements(&self) -> usize {
        self.flush.statement_count()
    }

    /// Open a window at the default write level.
    pub fn start_batch(&mut self) {
        self.reset(self.default_level);
    }

    /// Open a window at `level`.
    pub fn start_batch_with(&mut self, level: ConsistencyLevel) {
        tracing::debug!(level = %level, "Starting batch");
        self.reset(level);
    }

    /// Send the pending statements. The window is reset to the default
    /// level whether or not the send succeeds.
    pub async fn end_batch(&mut self, cx: &Cx) -> Outcome<(), Error> {
        let fresh = self.flush.duplicate_with_no_data(self.default_level);
        let mut pending = std::mem::replace(&mut self.flush, fresh);
        pending.end_batch(cx).await
    }

    /// Abandon the pending statements and events.
    pub fn clean_batch(&mut self) {
        tracing::debug!(pending = self.flush.statement_count(), "Cleaning batch");
        self.reset(self.default_level);
    }

    fn reset(&mut self, level: ConsistencyLevel) {
        self.flush = self.flush.duplicate_with_no_data(level);
    }

    /// Fail on a call-site level, abandoning the window first.
    fn reject_runtime_level(&mut self, options: &Options) -> Result<()> {
        if options.has_consistency() {
            self.clean_batch();
            return Err(batch_conflict());
        }
        Ok(())
    }

    /// Strictly increasing write timestamp in microseconds.
    fn next_timestamp(&mut self) -> i64 {
        self.last_timestamp = now_micros().max(self.last_timestamp + 1);
        self.last_timestamp
    }

    fn stamped(&mut self, options: Options) -> Options {
        if options.timestamp().is_some() {
            options
        } else {
            options.duplicate_with_new_timestamp(self.next_timestamp())
        }
    }

    pub async fn persist<T: Entity>(
        &mut self,
        cx: &Cx,
        entity: impl Into<Tracked<T>>,
    ) -> Outcome<EntityProxy<T>, Error> {
        self.persist_with(cx, entity, Options::none()).await
    }

    pub async fn persist_with<T: Entity>(
        &mut self,
        cx: &Cx,
        entity: impl Into<Tracked<T>>,
        options: Options,
    ) -> Outcome<EntityProxy<T>, Error> {
        try_result!(self.reject_runtime_level(&options));
        let options = self.stamped(options);
        self.manager
            .persist_in(cx, &mut self.flush, entity.into(), options)
            .await
    }

    pub async fn update<T: Entity>(
        &mut self,
        cx: &Cx,
        proxy: &mut EntityProxy<T>,
    ) -> Outcome<(), Error> {
        self.update_with(cx, proxy, Options::none()).await
    }

    pub async fn update_with<T: Entity>(
        &mut self,
        cx: &Cx,
        proxy: &mut EntityProxy<T>,
        options: Options,
    ) -> Outcome<(), Error> {
        try_result!(self.reject_runtime_level(&options));
        let options = self.stamped(options);
        self.manager
            .update_in(cx, &mut self.flush, proxy, options)
            .await
    }

    pub async fn remove<T: Entity>(
        &mut self,
        cx: &Cx,
        entity: impl Into<Tracked<T>>,
    ) -> Outcome<(), Error> {
        self.remove_with(cx, entity, Options::none()).await
    }

    pub async fn remove_with<T: Entity>(
        &mut self,
        cx: &Cx,
        entity: impl Into<Tracked<T>>,
        options: Options,
    ) -> Outcome<(), Error> {
        try_result!(self.reject_runtime_level(&options));
        let options = self.stamped(options);
        self.manager
            .remove_in(cx, &mut self.flush, entity.into(), options)
            .await
    }

    pub async fn remove_by_id<T: Entity>(&mut self, cx: &Cx, key: &[Value]) -> Outcome<(), Error> {
        let options = self.stamped(Options::none());
        self.manager
            .remove_by_id_in::<T>(cx, &mut self.flush, key, options)
            .await
    }

    /// Load an entity. The read runs at once, at the window level.
    pub async fn find<T: Entity>(
        &mut self,
        cx: &Cx,
        key: &[Value],
    ) -> Outcome<Option<EntityProxy<T>>, Error> {
        self.find_with(cx, key, Options::none()).await
    }

    pub async fn find_with<T: Entity>(
        &mut self,
        cx: &Cx,
        key: &[Value],
        options: Options,
    ) -> Outcome<Option<EntityProxy<T>>, Error> {
        try_result!(self.reject_runtime_level(&options));
        self.manager
            .find_in(cx, &mut self.flush, key, options)
            .await
    }

    pub fn get_proxy<T: Entity>(&mut self, key: &[Value]) -> Result<EntityProxy<T>> {
        self.get_proxy_with(key, Options::none())
    }

    pub fn get_proxy_with<T: Entity>(
        &mut self,
        key: &[Value],
        options: Options,
    ) -> Result<EntityProxy<T>> {
        self.reject_runtime_level(&options)?;
        self.manager.get_proxy_in(&mut self.flush, key, options)
    }

    pub async fn refresh<T: Entity>(
        &mut self,
        cx: &Cx,
        proxy: &mut EntityProxy<T>,
    ) -> Outcome<Refresh, Error> {
        self.refresh_with(cx, proxy, Options::none()).await
    }

    /// Reload a proxy. A call-site level fails without touching the window.
    pub async fn refresh_with<T: Entity>(
        &mut self,
        cx: &Cx,
        proxy: &mut EntityProxy<T>,
        options: Options,
    ) -> Outcome<Refresh, Error> {
        if options.has_consistency() {
            return Outcome::Err(batch_conflict());
        }
        self.manager
            .refresh_in(cx, &mut self.flush, proxy, options)
            .await
    }

    pub async fn initialize<T: Entity>(
        &self,
        cx: &Cx,
        proxy: &mut EntityProxy<T>,
    ) -> Outcome<(), Error> {
        self.manager.initialize(cx, proxy).await
    }
}
