//! The persistence manager.
//!
//! `PersistenceManager` owns the entity registry and the statement registry,
//! validates arguments, and runs each operation in a fresh
//! [`PersistenceContext`] over an immediate [`FlushContext`]. The batching
//! variant reuses the `*_in` entry points with its own long-lived context.

use crate::consistency::ConsistencyOverrider;
use crate::context::{PersistenceContext, Refresh};
use crate::dao::DaoContext;
use crate::flush::FlushContext;
use crate::proxy::{EntityProxy, ProxyContext, SharedEntity, Tracked};
use cqlmodel_core::{
    ConsistencyLevel, CqlSession, Cx, Entity, EntityMeta, Error, Event, Options, Outcome, Result,
    Row, ValidationErrorKind, Value,
};
use cqlmodel_query::{IndexCondition, SliceQuery, StatementWrapper, TypedQueryValidator};
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration of a persistence manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Read level of entities that declare none.
    pub default_read_level: ConsistencyLevel,
    /// Write level of entities that declare none.
    pub default_write_level: ConsistencyLevel,
    /// Per-table read levels; win over the entity's declared level.
    pub read_level_map: HashMap<String, ConsistencyLevel>,
    /// Per-table write levels; win over the entity's declared level.
    pub write_level_map: HashMap<String, ConsistencyLevel>,
    /// Capacity of the dynamic update statement cache.
    pub statement_cache_size: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            default_read_level: ConsistencyLevel::One,
            default_write_level: ConsistencyLevel::One,
            read_level_map: HashMap::new(),
            write_level_map: HashMap::new(),
            statement_cache_size: 1000,
        }
    }
}

impl ManagerConfig {
    pub fn with_default_read_level(mut self, level: ConsistencyLevel) -> Self {
        self.default_read_level = level;
        self
    }

    pub fn with_default_write_level(mut self, level: ConsistencyLevel) -> Self {
        self.default_write_level = level;
        self
    }

    pub fn with_read_level_map(mut self, map: HashMap<String, ConsistencyLevel>) -> Self {
        self.read_level_map = map;
        self
    }

    pub fn with_write_level_map(mut self, map: HashMap<String, ConsistencyLevel>) -> Self {
        self.write_level_map = map;
        self
    }

    pub fn with_statement_cache_size(mut self, size: usize) -> Self {
        self.statement_cache_size = size;
        self
    }

    /// Entity levels: per-table entry, else declared level, else default.
    fn resolve_levels(&self, meta: &EntityMeta) -> (ConsistencyLevel, ConsistencyLevel) {
        let (declared_read, declared_write) = meta.declared_levels();
        let read = self
            .read_level_map
            .get(meta.table_name())
            .copied()
            .or(declared_read)
            .unwrap_or(self.default_read_level);
        let write = self
            .write_level_map
            .get(meta.table_name())
            .copied()
            .or(declared_write)
            .unwrap_or(self.default_write_level);
        (read, write)
    }
}

// ============================================================================
// Manager
// ============================================================================

fn short_type_name<T>() -> &'static str {
    let name = std::any::type_name::<T>();
    name.rsplit("::").next().unwrap_or(name)
}

fn blank_query(kind: &str) -> Error {
    Error::validation(
        "query",
        ValidationErrorKind::Blank,
        format!("The query string for {kind} query should not be blank"),
    )
}

/// Attributes a result row fills in: the key plus every mapped column the
/// row carries.
fn loaded_from_row(meta: &EntityMeta, row: &Row) -> Vec<String> {
    let mut loaded = vec![meta.id_meta().name().to_string()];
    loaded.extend(
        meta.properties()
            .iter()
            .filter(|pm| !pm.kind().is_id() && row.contains_column(pm.name()))
            .map(|pm| pm.name().to_string()),
    );
    loaded
}

/// Entry point for mapping entities to a CQL cluster.
pub struct PersistenceManager<S: CqlSession> {
    session: Arc<S>,
    dao: DaoContext<S>,
    metas: HashMap<TypeId, Arc<EntityMeta>>,
    config: ManagerConfig,
    overrider: ConsistencyOverrider,
}

impl<S: CqlSession> fmt::Debug for PersistenceManager<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistenceManager")
            .field("entities", &self.metas.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S: CqlSession> PersistenceManager<S> {
    pub fn new(session: S, config: ManagerConfig) -> Self {
        let session = Arc::new(session);
        Self {
            dao: DaoContext::new(Arc::clone(&session), config.statement_cache_size),
            session,
            metas: HashMap::new(),
            config,
            overrider: ConsistencyOverrider::new(),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<S> {
        &self.session
    }

    /// Build, resolve and register the metadata of `T`, preparing its
    /// statements.
    #[tracing::instrument(level = "info", skip(self, cx), fields(entity = short_type_name::<T>()))]
    pub async fn register<T: Entity>(&mut self, cx: &Cx) -> Outcome<Arc<EntityMeta>, Error> {
        if let Some(meta) = self.metas.get(&TypeId::of::<T>()) {
            return Outcome::Ok(Arc::clone(meta));
        }
        let meta = try_result!(T::entity_meta());
        let (read, write) = self.config.resolve_levels(&meta);
        let meta = Arc::new(meta.with_levels(read, write));

        try_outcome!(self.dao.register(cx, &meta).await);
        self.metas.insert(TypeId::of::<T>(), Arc::clone(&meta));

        tracing::info!(
            entity = meta.class_name(),
            table = meta.table_name(),
            read = %read,
            write = %write,
            "Registered entity"
        );
        Outcome::Ok(meta)
    }

    /// Metadata of a registered entity type.
    pub fn meta<T: Entity>(&self) -> Result<&Arc<EntityMeta>> {
        self.metas.get(&TypeId::of::<T>()).ok_or_else(|| {
            let name = short_type_name::<T>();
            Error::validation(
                name,
                ValidationErrorKind::NotRegistered,
                format!("The entity class '{name}' is not managed"),
            )
        })
    }

    fn immediate(&self) -> FlushContext<S> {
        FlushContext::immediate(Arc::clone(&self.session), self.config.default_write_level)
    }

    /// Options with the batch level of `flush` applied.
    fn options_for(&self, options: &Options, flush: &FlushContext<S>) -> Result<Options> {
        self.overrider
            .override_runtime_value_by_batch_setting(options, flush)
    }

    fn proxy_for<T: Entity>(
        &self,
        meta: &Arc<EntityMeta>,
        entity: SharedEntity<T>,
        loaded: Vec<String>,
    ) -> EntityProxy<T> {
        let key = entity.lock().primary_key();
        EntityProxy::from_shared(
            entity,
            ProxyContext::new(Arc::clone(meta), key, Options::none()),
            loaded,
        )
    }

    // ------------------------------------------------------------------
    // Operations over a given flush context
    // ------------------------------------------------------------------

    pub(crate) async fn persist_in<T: Entity>(
        &self,
        cx: &Cx,
        flush: &mut FlushContext<S>,
        entity: Tracked<T>,
        options: Options,
    ) -> Outcome<EntityProxy<T>, Error> {
        let meta = Arc::clone(try_result!(self.meta::<T>()));
        if entity.is_proxy() {
            return Outcome::Err(Error::validation(
                meta.class_name(),
                ValidationErrorKind::AlreadyProxy,
                format!(
                    "The entity '{}' is already in 'managed' state",
                    meta.class_name()
                ),
            ));
        }
        let mut entity = entity.into_inner();

        if meta.is_clustered_counter() {
            if options.ttl().is_some() {
                return Outcome::Err(Error::config(format!(
                    "Cannot set TTL for clustered counter entity '{}'",
                    meta.class_name()
                )));
            }
            let has_value = meta
                .all_counter_metas()
                .iter()
                .any(|pm| entity.counter_mut(pm.name()).is_some_and(|c| c.has_pending()));
            if !has_value {
                return Outcome::Err(Error::validation(
                    meta.class_name(),
                    ValidationErrorKind::Required,
                    format!(
                        "The clustered counter entity '{}' should have at least one counter value to persist",
                        meta.class_name()
                    ),
                ));
            }
        }
        let id = meta.id_meta();
        try_result!(id.transcoder().encode_components(id, &entity.primary_key()));

        let effective = try_result!(self.options_for(&options, flush));
        PersistenceContext::new(meta, &self.dao, flush, effective)
            .with_proxy_options(options)
            .persist(cx, entity)
            .await
    }

    pub(crate) async fn update_in<T: Entity>(
        &self,
        cx: &Cx,
        flush: &mut FlushContext<S>,
        proxy: &mut EntityProxy<T>,
        options: Options,
    ) -> Outcome<(), Error> {
        let meta = Arc::clone(try_result!(self.meta::<T>()));
        let effective = try_result!(self.options_for(&options, flush));
        PersistenceContext::new(meta, &self.dao, flush, effective)
            .with_proxy_options(options)
            .update(cx, proxy)
            .await
    }

    pub(crate) async fn remove_in<T: Entity>(
        &self,
        cx: &Cx,
        flush: &mut FlushContext<S>,
        entity: Tracked<T>,
        options: Options,
    ) -> Outcome<(), Error> {
        let meta = Arc::clone(try_result!(self.meta::<T>()));
        let options = try_result!(self.options_for(&options, flush));
        PersistenceContext::new(meta, &self.dao, flush, options)
            .remove(cx, entity.into_inner())
            .await
    }

    pub(crate) async fn remove_by_id_in<T: Entity>(
        &self,
        cx: &Cx,
        flush: &mut FlushContext<S>,
        key: &[Value],
        options: Options,
    ) -> Outcome<(), Error> {
        let meta = Arc::clone(try_result!(self.meta::<T>()));
        let options = try_result!(self.options_for(&options, flush));
        PersistenceContext::new(meta, &self.dao, flush, options)
            .remove_by_key(cx, key)
            .await
    }

    pub(crate) async fn find_in<T: Entity>(
        &self,
        cx: &Cx,
        flush: &mut FlushContext<S>,
        key: &[Value],
        options: Options,
    ) -> Outcome<Option<EntityProxy<T>>, Error> {
        let meta = Arc::clone(try_result!(self.meta::<T>()));
        let effective = try_result!(self.options_for(&options, flush));
        PersistenceContext::new(meta, &self.dao, flush, effective)
            .with_proxy_options(options)
            .find(cx, key)
            .await
    }

    pub(crate) fn get_proxy_in<T: Entity>(
        &self,
        flush: &mut FlushContext<S>,
        key: &[Value],
        options: Options,
    ) -> Result<EntityProxy<T>> {
        let meta = Arc::clone(self.meta::<T>()?);
        let effective = self.options_for(&options, flush)?;
        PersistenceContext::new(meta, &self.dao, flush, effective)
            .with_proxy_options(options)
            .get_proxy(key)
    }

    pub(crate) async fn refresh_in<T: Entity>(
        &self,
        cx: &Cx,
        flush: &mut FlushContext<S>,
        proxy: &mut EntityProxy<T>,
        options: Options,
    ) -> Outcome<Refresh, Error> {
        let meta = Arc::clone(try_result!(self.meta::<T>()));
        let options = try_result!(self.options_for(&options, flush));
        PersistenceContext::new(meta, &self.dao, flush, options)
            .refresh(cx, proxy)
            .await
    }

    // ------------------------------------------------------------------
    // Entity operations
    // ------------------------------------------------------------------

    /// Insert a new entity and return it as a proxy.
    pub async fn persist<T: Entity>(
        &self,
        cx: &Cx,
        entity: impl Into<Tracked<T>>,
    ) -> Outcome<EntityProxy<T>, Error> {
        self.persist_with(cx, entity, Options::none()).await
    }

    pub async fn persist_with<T: Entity>(
        &self,
        cx: &Cx,
        entity: impl Into<Tracked<T>>,
        options: Options,
    ) -> Outcome<EntityProxy<T>, Error> {
        let mut flush = self.immediate();
        self.persist_in(cx, &mut flush, entity.into(), options).await
    }

    /// Write the dirty attributes and pending counter deltas of a proxy.
    pub async fn update<T: Entity>(
        &self,
        cx: &Cx,
        proxy: &mut EntityProxy<T>,
    ) -> Outcome<(), Error> {
        self.update_with(cx, proxy, Options::none()).await
    }

    pub async fn update_with<T: Entity>(
        &self,
        cx: &Cx,
        proxy: &mut EntityProxy<T>,
        options: Options,
    ) -> Outcome<(), Error> {
        let mut flush = self.immediate();
        self.update_in(cx, &mut flush, proxy, options).await
    }

    /// Delete an entity, managed or not.
    pub async fn remove<T: Entity>(
        &self,
        cx: &Cx,
        entity: impl Into<Tracked<T>>,
    ) -> Outcome<(), Error> {
        self.remove_with(cx, entity, Options::none()).await
    }

    pub async fn remove_with<T: Entity>(
        &self,
        cx: &Cx,
        entity: impl Into<Tracked<T>>,
        options: Options,
    ) -> Outcome<(), Error> {
        let mut flush = self.immediate();
        self.remove_in(cx, &mut flush, entity.into(), options).await
    }

    /// Delete a row by primary key, without loading it.
    pub async fn remove_by_id<T: Entity>(&self, cx: &Cx, key: &[Value]) -> Outcome<(), Error> {
        self.remove_by_id_with::<T>(cx, key, Options::none()).await
    }

    pub async fn remove_by_id_with<T: Entity>(
        &self,
        cx: &Cx,
        key: &[Value],
        options: Options,
    ) -> Outcome<(), Error> {
        let mut flush = self.immediate();
        self.remove_by_id_in::<T>(cx, &mut flush, key, options).await
    }

    /// Unwrap a proxy into its real entity. Nothing is sent.
    pub fn remove_proxy<T: Entity>(&self, proxy: EntityProxy<T>) -> T {
        proxy.into_inner()
    }

    pub fn remove_proxies<T, I>(&self, proxies: I) -> Vec<T>
    where
        T: Entity,
        I: IntoIterator<Item = EntityProxy<T>>,
    {
        proxies.into_iter().map(EntityProxy::into_inner).collect()
    }

    /// Load the lazy attributes and counters of a proxy, then unwrap it.
    pub async fn init_and_remove_proxy<T: Entity>(
        &self,
        cx: &Cx,
        mut proxy: EntityProxy<T>,
    ) -> Outcome<T, Error> {
        try_outcome!(self.initialize(cx, &mut proxy).await);
        Outcome::Ok(proxy.into_inner())
    }

    pub async fn init_and_remove_proxies<T: Entity>(
        &self,
        cx: &Cx,
        mut proxies: Vec<EntityProxy<T>>,
    ) -> Outcome<Vec<T>, Error> {
        try_outcome!(self.initialize_all(cx, &mut proxies).await);
        Outcome::Ok(self.remove_proxies(proxies))
    }

    /// Load an entity by primary key.
    pub async fn find<T: Entity>(
        &self,
        cx: &Cx,
        key: &[Value],
    ) -> Outcome<Option<EntityProxy<T>>, Error> {
        self.find_with(cx, key, Options::none()).await
    }

    pub async fn find_with<T: Entity>(
        &self,
        cx: &Cx,
        key: &[Value],
        options: Options,
    ) -> Outcome<Option<EntityProxy<T>>, Error> {
        let mut flush = self.immediate();
        self.find_in(cx, &mut flush, key, options).await
    }

    /// A proxy holding only `key`, for writing without reading first.
    pub fn get_proxy<T: Entity>(&self, key: &[Value]) -> Result<EntityProxy<T>> {
        self.get_proxy_with(key, Options::none())
    }

    pub fn get_proxy_with<T: Entity>(
        &self,
        key: &[Value],
        options: Options,
    ) -> Result<EntityProxy<T>> {
        let mut flush = self.immediate();
        self.get_proxy_in(&mut flush, key, options)
    }

    /// Reload a proxy from the database.
    pub async fn refresh<T: Entity>(
        &self,
        cx: &Cx,
        proxy: &mut EntityProxy<T>,
    ) -> Outcome<Refresh, Error> {
        self.refresh_with(cx, proxy, Options::none()).await
    }

    pub async fn refresh_with<T: Entity>(
        &self,
        cx: &Cx,
        proxy: &mut EntityProxy<T>,
        options: Options,
    ) -> Outcome<Refresh, Error> {
        let mut flush = self.immediate();
        self.refresh_in(cx, &mut flush, proxy, options).await
    }

    /// Load the lazy attributes and counters of a proxy.
    pub async fn initialize<T: Entity>(
        &self,
        cx: &Cx,
        proxy: &mut EntityProxy<T>,
    ) -> Outcome<(), Error> {
        let meta = Arc::clone(try_result!(self.meta::<T>()));
        let mut flush = self.immediate();
        PersistenceContext::new(meta, &self.dao, &mut flush, proxy.context().options())
            .initialize(cx, proxy)
            .await
    }

    pub async fn initialize_all<T: Entity>(
        &self,
        cx: &Cx,
        proxies: &mut [EntityProxy<T>],
    ) -> Outcome<(), Error> {
        for proxy in proxies {
            try_outcome!(self.initialize(cx, proxy).await);
        }
        Outcome::Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Start a slice query on a clustered entity.
    pub fn slice_query<T: Entity>(&self) -> Result<SliceQuery<'_>> {
        SliceQuery::new(self.meta::<T>()?)
    }

    /// Run the select form of a slice query.
    #[tracing::instrument(
        level = "debug",
        skip(self, cx, slice),
        fields(entity = short_type_name::<T>())
    )]
    pub async fn get_slice<T: Entity>(
        &self,
        cx: &Cx,
        slice: &SliceQuery<'_>,
    ) -> Outcome<Vec<EntityProxy<T>>, Error> {
        let meta = Arc::clone(try_result!(self.meta::<T>()));
        let (query, values, fetch_size) = try_result!(slice.select_statement()).into_parts();
        let level = self.overrider.read_level(&Options::none(), &meta);
        let wrapper = StatementWrapper::regular(query, values, level).with_fetch_size(fetch_size);
        self.load_proxies(cx, &meta, wrapper).await
    }

    /// Run the delete form of a slice query.
    pub async fn remove_slice<T: Entity>(
        &self,
        cx: &Cx,
        slice: &SliceQuery<'_>,
    ) -> Outcome<(), Error> {
        let meta = Arc::clone(try_result!(self.meta::<T>()));
        let (query, values, _) = try_result!(slice.delete_statement()).into_parts();
        let level = self.overrider.write_level(&Options::none(), &meta);
        let mut flush = self.immediate();
        try_outcome!(
            flush
                .push_statement(cx, StatementWrapper::regular(query, values, level))
                .await
        );
        Outcome::Ok(())
    }

    /// Run a hand-written statement and return its raw rows.
    pub async fn native_query(
        &self,
        cx: &Cx,
        query: &str,
        values: Vec<Value>,
    ) -> Outcome<Vec<Row>, Error> {
        if query.trim().is_empty() {
            return Outcome::Err(blank_query("native"));
        }
        let wrapper = StatementWrapper::regular(query, values, self.config.default_read_level);
        self.immediate().query(cx, wrapper).await
    }

    fn typed_meta<T: Entity>(&self, query: &str) -> Result<Arc<EntityMeta>> {
        if query.trim().is_empty() {
            return Err(blank_query("typed"));
        }
        let meta = self.meta::<T>().map_err(|_| {
            let name = short_type_name::<T>();
            Error::validation(
                name,
                ValidationErrorKind::NotRegistered,
                format!("Cannot perform typed query because the entityClass '{name}' is not managed"),
            )
        })?;
        Ok(Arc::clone(meta))
    }

    /// Run a hand-written select and map its rows to proxies. `PostLoad`
    /// fires for each entity.
    pub async fn typed_query<T: Entity>(
        &self,
        cx: &Cx,
        query: &str,
        values: Vec<Value>,
    ) -> Outcome<Vec<EntityProxy<T>>, Error> {
        let meta = try_result!(self.typed_meta::<T>(query));
        try_result!(TypedQueryValidator.validate_typed_query(&meta, query));
        let level = self.overrider.read_level(&Options::none(), &meta);
        self.load_proxies(cx, &meta, StatementWrapper::regular(query, values, level))
            .await
    }

    /// Like [`typed_query`](Self::typed_query) but returns bare entities and
    /// fires no interceptor.
    pub async fn raw_typed_query<T: Entity>(
        &self,
        cx: &Cx,
        query: &str,
        values: Vec<Value>,
    ) -> Outcome<Vec<T>, Error> {
        let meta = try_result!(self.typed_meta::<T>(query));
        try_result!(TypedQueryValidator.validate_raw_typed_query(&meta, query));
        let level = self.overrider.read_level(&Options::none(), &meta);
        let rows = try_outcome!(
            self.immediate()
                .query(cx, StatementWrapper::regular(query, values, level))
                .await
        );
        let entities = try_result!(rows.iter().map(T::from_row).collect::<Result<Vec<_>>>());
        Outcome::Ok(entities)
    }

    /// Select entities through a secondary index.
    pub async fn indexed_query<T: Entity>(
        &self,
        cx: &Cx,
        condition: &IndexCondition,
    ) -> Outcome<Vec<EntityProxy<T>>, Error> {
        let meta = Arc::clone(try_result!(self.meta::<T>()));
        let (query, values) = try_result!(condition.to_query(&meta));
        let level = self.overrider.read_level(&Options::none(), &meta);
        self.load_proxies(cx, &meta, StatementWrapper::regular(query, values, level))
            .await
    }

    async fn load_proxies<T: Entity>(
        &self,
        cx: &Cx,
        meta: &Arc<EntityMeta>,
        wrapper: StatementWrapper,
    ) -> Outcome<Vec<EntityProxy<T>>, Error> {
        let mut flush = self.immediate();
        let rows = try_outcome!(flush.query(cx, wrapper).await);
        tracing::debug!(entity = meta.class_name(), count = rows.len(), "Mapping rows");

        let mut proxies = Vec::with_capacity(rows.len());
        for row in &rows {
            let entity = SharedEntity::new(try_result!(T::from_row(row)));
            try_result!(flush.trigger_interceptor(meta, &entity, Event::PostLoad));
            proxies.push(self.proxy_for(meta, entity, loaded_from_row(meta, row)));
        }
        Outcome::Ok(proxies)
    }
}
