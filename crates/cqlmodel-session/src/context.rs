//! Per-operation persistence coordinator.
//!
//! A `PersistenceContext` lives for one manager call. It binds the
//! statements of one entity type through the [`DaoContext`], resolves the
//! levels through the [`ConsistencyOverrider`] and pushes everything through
//! the borrowed [`FlushContext`], which decides whether the statements run
//! now or at the end of the batch window.

use crate::consistency::ConsistencyOverrider;
use crate::dao::DaoContext;
use crate::flush::FlushContext;
use crate::proxy::{EntityProxy, ProxyContext, SharedEntity};
use cqlmodel_core::{
    CqlSession, Cx, Entity, EntityMeta, Error, Event, Options, Outcome, PropertyMeta, Result,
    Row, Value,
};
use cqlmodel_query::prepared::COUNTER_VALUE;
use std::sync::Arc;

/// Result of refreshing a proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// The proxy now holds the current row.
    Refreshed,
    /// The row no longer exists; the proxy was left untouched.
    Stale,
}

impl Refresh {
    pub fn is_stale(&self) -> bool {
        matches!(self, Refresh::Stale)
    }
}

/// Coordinator of one operation on one entity type.
pub struct PersistenceContext<'a, S: CqlSession> {
    meta: Arc<EntityMeta>,
    dao: &'a DaoContext<S>,
    flush: &'a mut FlushContext<S>,
    options: Options,
    proxy_options: Options,
    overrider: ConsistencyOverrider,
}

impl<'a, S: CqlSession> PersistenceContext<'a, S> {
    pub fn new(
        meta: Arc<EntityMeta>,
        dao: &'a DaoContext<S>,
        flush: &'a mut FlushContext<S>,
        options: Options,
    ) -> Self {
        Self {
            meta,
            dao,
            flush,
            options,
            proxy_options: options,
            overrider: ConsistencyOverrider::new(),
        }
    }

    /// Options recorded on the proxies this context hands out, when they
    /// differ from the options the statements run with. A level forced by a
    /// batch window applies to the window only.
    pub fn with_proxy_options(mut self, options: Options) -> Self {
        self.proxy_options = options;
        self
    }

    pub fn meta(&self) -> &Arc<EntityMeta> {
        &self.meta
    }

    pub fn options(&self) -> Options {
        self.options
    }

    fn proxy<T: Entity>(&self, entity: T, key: Vec<Value>, loaded: Vec<String>) -> EntityProxy<T> {
        self.proxy_from(SharedEntity::new(entity), key, loaded)
    }

    fn proxy_from<T: Entity>(
        &self,
        entity: SharedEntity<T>,
        key: Vec<Value>,
        loaded: Vec<String>,
    ) -> EntityProxy<T> {
        EntityProxy::from_shared(
            entity,
            ProxyContext::new(Arc::clone(&self.meta), key, self.proxy_options),
            loaded,
        )
    }

    /// Names of the attributes a full-row read fills in.
    fn eagerly_loaded(&self) -> Vec<String> {
        let meta = &self.meta;
        let mut loaded = vec![meta.id_meta().name().to_string()];
        if meta.is_clustered_counter() {
            loaded.extend(meta.all_counter_metas().iter().map(|pm| pm.name().to_string()));
        } else {
            loaded.extend(meta.eager_metas().iter().map(|pm| pm.name().to_string()));
        }
        loaded
    }

    /// Write a new entity and wrap it in a proxy.
    ///
    /// A clustered counter entity is written through its counter increments
    /// only; any other entity gets one insert followed by its counter deltas.
    #[tracing::instrument(
        level = "debug",
        skip(self, cx, entity),
        fields(entity = self.meta.class_name())
    )]
    pub async fn persist<T: Entity>(
        &mut self,
        cx: &Cx,
        entity: T,
    ) -> Outcome<EntityProxy<T>, Error> {
        let meta = Arc::clone(&self.meta);
        let entity = SharedEntity::new(entity);
        try_result!(self.flush.trigger_interceptor(&meta, &entity, Event::PrePersist));

        let key = entity.lock().primary_key();
        if !meta.is_clustered_counter() {
            let level = self.overrider.write_level(&self.options, &meta);
            let insert = try_result!(self.dao.bind_for_insert(
                &meta,
                &*entity.lock(),
                &self.options,
                level
            ));
            try_outcome!(self.flush.push_statement(cx, insert).await);
        }
        let counters = drain_counters(&meta, &mut *entity.lock());
        try_outcome!(self.persist_counters(cx, counters, &key).await);

        try_result!(self.flush.trigger_interceptor(&meta, &entity, Event::PostPersist));

        let loaded = meta.properties().iter().map(|pm| pm.name().to_string()).collect();
        Outcome::Ok(self.proxy_from(entity, key, loaded))
    }

    /// One counter statement per pending delta. Zero deltas are dropped.
    async fn persist_counters(
        &mut self,
        cx: &Cx,
        counters: Vec<(Arc<PropertyMeta>, Vec<i64>)>,
        key: &[Value],
    ) -> Outcome<(), Error> {
        let meta = Arc::clone(&self.meta);
        for (pm, deltas) in counters {
            let level = self
                .overrider
                .write_level_for_property(&self.options, &pm, &meta);
            for delta in deltas.into_iter().filter(|delta| *delta != 0) {
                let wrapper = if meta.is_clustered_counter() {
                    self.dao
                        .bind_for_clustered_counter_delta(&meta, &pm, key, delta, level)
                } else {
                    self.dao
                        .bind_for_simple_counter_delta(&meta, &pm, key, delta, level)
                };
                try_outcome!(self.flush.push_counter_statement(cx, try_result!(wrapper)).await);
            }
        }
        Outcome::Ok(())
    }

    /// Write the changes recorded on a proxy.
    ///
    /// Dirty non-counter attributes, sorted by name, become one update
    /// statement; pending counter deltas follow as counter statements.
    #[tracing::instrument(
        level = "debug",
        skip(self, cx, proxy),
        fields(entity = self.meta.class_name())
    )]
    pub async fn update<T: Entity>(
        &mut self,
        cx: &Cx,
        proxy: &mut EntityProxy<T>,
    ) -> Outcome<(), Error> {
        let meta = Arc::clone(&self.meta);
        let key = proxy.primary_key().to_vec();
        try_result!(self.flush.trigger_interceptor(&meta, proxy.real(), Event::PreUpdate));

        let dirty: Vec<_> = proxy
            .dirty_tracker()
            .properties()
            .into_iter()
            .filter(|pm| !pm.is_counter())
            .collect();
        if !dirty.is_empty() {
            tracing::debug!(count = dirty.len(), "Updating dirty attributes");
            let level = self.overrider.write_level(&self.options, &meta);
            let snapshot = proxy.real().snapshot();
            let wrapper = try_outcome!(
                self.dao
                    .bind_for_update(cx, &meta, &snapshot, &dirty, &self.options, level)
                    .await
            );
            try_outcome!(self.flush.push_statement(cx, wrapper).await);
            proxy.dirty_tracker().clear();
        }

        let counters = drain_counters(&meta, &mut *proxy.real().lock());
        try_outcome!(self.persist_counters(cx, counters, &key).await);

        try_result!(self.flush.trigger_interceptor(&meta, proxy.real(), Event::PostUpdate));
        proxy.rebind_options(self.proxy_options);
        Outcome::Ok(())
    }

    /// Delete an entity, running its remove interceptors.
    #[tracing::instrument(
        level = "debug",
        skip(self, cx, entity),
        fields(entity = self.meta.class_name())
    )]
    pub async fn remove<T: Entity>(&mut self, cx: &Cx, entity: T) -> Outcome<(), Error> {
        let meta = Arc::clone(&self.meta);
        let entity = SharedEntity::new(entity);
        try_result!(self.flush.trigger_interceptor(&meta, &entity, Event::PreRemove));
        let key = entity.lock().primary_key();
        try_outcome!(self.remove_by_key(cx, &key).await);
        try_result!(self.flush.trigger_interceptor(&meta, &entity, Event::PostRemove));
        Outcome::Ok(())
    }

    /// Delete a row by key, with no interceptors.
    ///
    /// A clustered counter row goes with a single row delete. Any other
    /// entity gets one delete per table plus one delete per counter in the
    /// shared counter table.
    pub async fn remove_by_key(&mut self, cx: &Cx, key: &[Value]) -> Outcome<(), Error> {
        let meta = Arc::clone(&self.meta);
        let level = self.overrider.write_level(&self.options, &meta);

        if meta.is_clustered_counter() {
            let delete =
                try_result!(self.dao.bind_for_clustered_counter_delete_all(&meta, key, level));
            try_outcome!(self.flush.push_counter_statement(cx, delete).await);
            return Outcome::Ok(());
        }

        for delete in try_result!(self.dao.bind_for_removal(&meta, key, &self.options, level)) {
            try_outcome!(self.flush.push_statement(cx, delete).await);
        }
        for pm in meta.all_counter_metas() {
            let level = self
                .overrider
                .write_level_for_property(&self.options, pm, &meta);
            let delete =
                try_result!(self.dao.bind_for_simple_counter_delete(&meta, pm, key, level));
            try_outcome!(self.flush.push_counter_statement(cx, delete).await);
        }
        Outcome::Ok(())
    }

    /// Read the row of `key` and decode it, firing `PostLoad`.
    async fn load<T: Entity>(&mut self, cx: &Cx, key: &[Value]) -> Outcome<Option<T>, Error> {
        let meta = Arc::clone(&self.meta);
        let level = self.overrider.read_level(&self.options, &meta);
        let select = if meta.is_clustered_counter() {
            self.dao.bind_for_clustered_counter_select_all(&meta, key, level)
        } else {
            self.dao.bind_for_select_entity(&meta, key, level)
        };
        let rows = try_outcome!(self.flush.query(cx, try_result!(select)).await);
        let Some(row) = rows.first() else {
            tracing::debug!(entity = meta.class_name(), "No row found");
            return Outcome::Ok(None);
        };

        let entity = SharedEntity::new(try_result!(T::from_row(row)));
        try_result!(self.flush.trigger_interceptor(&meta, &entity, Event::PostLoad));
        Outcome::Ok(Some(entity.into_inner()))
    }

    /// Load the eager attributes of an entity.
    #[tracing::instrument(
        level = "debug",
        skip(self, cx, key),
        fields(entity = self.meta.class_name())
    )]
    pub async fn find<T: Entity>(
        &mut self,
        cx: &Cx,
        key: &[Value],
    ) -> Outcome<Option<EntityProxy<T>>, Error> {
        let entity = try_outcome!(self.load::<T>(cx, key).await);
        Outcome::Ok(entity.map(|entity| self.proxy(entity, key.to_vec(), self.eagerly_loaded())))
    }

    /// A proxy around an empty entity holding only `key`. Nothing is read.
    pub fn get_proxy<T: Entity>(&self, key: &[Value]) -> Result<EntityProxy<T>> {
        let id = self.meta.id_meta();
        id.transcoder().encode_components(id, key)?;
        let entity = T::with_primary_key(key)?;
        Ok(self.proxy(entity, key.to_vec(), vec![id.name().to_string()]))
    }

    /// Reload a proxy from its row. Pending changes are discarded.
    pub async fn refresh<T: Entity>(
        &mut self,
        cx: &Cx,
        proxy: &mut EntityProxy<T>,
    ) -> Outcome<Refresh, Error> {
        let key = proxy.primary_key().to_vec();
        match try_outcome!(self.load::<T>(cx, &key).await) {
            Some(entity) => {
                proxy.replace_real(entity, self.eagerly_loaded());
                Outcome::Ok(Refresh::Refreshed)
            }
            None => {
                tracing::debug!(
                    entity = self.meta.class_name(),
                    "Refresh found no row, proxy is stale"
                );
                Outcome::Ok(Refresh::Stale)
            }
        }
    }

    /// Load the lazy attributes and counters a proxy has not loaded yet.
    pub async fn initialize<T: Entity>(
        &mut self,
        cx: &Cx,
        proxy: &mut EntityProxy<T>,
    ) -> Outcome<(), Error> {
        let meta = Arc::clone(&self.meta);
        let key = proxy.primary_key().to_vec();

        for pm in meta.lazy_metas() {
            if proxy.is_loaded(pm.name()) {
                continue;
            }
            let level = self
                .overrider
                .read_level_for_property(&self.options, pm, &meta);
            let select = try_result!(self.dao.bind_for_select_field(&meta, pm, &key, level));
            let rows = try_outcome!(self.flush.query(cx, select).await);
            let value = first_column(&rows, pm.name()).unwrap_or(Value::Null);
            let decoded = try_result!(pm.decode(value));
            try_result!(proxy.real().with(|real| real.write_value(pm.name(), decoded)));
            proxy.mark_loaded(pm.name());
        }

        for pm in meta.all_counter_metas() {
            if proxy.is_loaded(pm.name()) {
                continue;
            }
            let level = self
                .overrider
                .read_level_for_property(&self.options, pm, &meta);
            let (select, column) = if meta.is_clustered_counter() {
                (
                    self.dao.bind_for_clustered_counter_select(&meta, pm, &key, level),
                    pm.name(),
                )
            } else {
                (
                    self.dao.bind_for_simple_counter_select(&meta, pm, &key, level),
                    COUNTER_VALUE,
                )
            };
            let rows = try_outcome!(self.flush.query(cx, try_result!(select)).await);
            let value = first_column(&rows, column).and_then(|value| value.as_i64());
            proxy.real().with(|real| {
                if let Some(counter) = real.counter_mut(pm.name()) {
                    counter.set_loaded(value);
                }
            });
            proxy.mark_loaded(pm.name());
        }
        Outcome::Ok(())
    }
}

/// Pending counter deltas of an entity, taken off its counter cells.
fn drain_counters<T: Entity>(
    meta: &EntityMeta,
    entity: &mut T,
) -> Vec<(Arc<PropertyMeta>, Vec<i64>)> {
    meta.all_counter_metas()
        .into_iter()
        .filter_map(|pm| {
            let deltas = entity.counter_mut(pm.name())?.take_pending();
            Some((Arc::clone(pm), deltas))
        })
        .collect()
}

fn first_column(rows: &[Row], column: &str) -> Option<Value> {
    rows.first()
        .and_then(|row| row.get_by_name(column))
        .cloned()
}
