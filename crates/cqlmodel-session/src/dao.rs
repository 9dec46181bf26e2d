//! Statement registry.
//!
//! Every registered entity gets its insert, select and delete statements
//! prepared once. Update statements depend on the dirty property set, so they
//! are prepared on first use and kept in a [`PreparedStatementCache`].
//!
//! The `bind_for_*` methods turn an entity or a primary key into ready-to-push
//! [`StatementWrapper`]s. Bound values follow the marker order of the
//! generated statement text.

use cqlmodel_core::{
    ConsistencyLevel, CqlSession, Cx, Entity, EntityMeta, Error, Options, Outcome,
    PreparedStatement, PropertyMeta, Result, Value, ValidationErrorKind,
};
use cqlmodel_query::prepared::{self, CounterQueryType, DELETE_ALL, SELECT_ALL};
use cqlmodel_query::{PreparedStatementCache, StatementKey, StatementWrapper};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Prepared statements of one entity type.
#[derive(Debug, Default)]
struct EntityStatements {
    /// Absent for clustered counter entities, which are written through
    /// counter increments only.
    insert: Option<PreparedStatement>,
    select_entity: Option<PreparedStatement>,
    select_fields: HashMap<String, PreparedStatement>,
    deletes: Vec<(String, PreparedStatement)>,
    clustered_counters: HashMap<(CounterQueryType, String), PreparedStatement>,
}

/// Statement registry shared by every persistence context of a manager.
pub struct DaoContext<S: CqlSession> {
    session: Arc<S>,
    entities: HashMap<String, EntityStatements>,
    simple_counters: HashMap<CounterQueryType, PreparedStatement>,
    update_cache: Mutex<PreparedStatementCache>,
}

impl<S: CqlSession> fmt::Debug for DaoContext<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entities: Vec<&String> = self.entities.keys().collect();
        entities.sort();
        f.debug_struct("DaoContext")
            .field("entities", &entities)
            .field("simple_counters", &self.simple_counters.len())
            .finish_non_exhaustive()
    }
}

fn ttl_value(options: &Options) -> Value {
    Value::Int(
        options
            .ttl()
            .map_or(0, |ttl| i32::try_from(ttl).unwrap_or(i32::MAX)),
    )
}

/// The increment or decrement statement for `delta`, and the magnitude it
/// is bound with. `i64::MIN` has no positive magnitude and is rejected.
fn counter_delta(
    meta: &EntityMeta,
    pm: &PropertyMeta,
    delta: i64,
) -> Result<(CounterQueryType, Value)> {
    let query_type = if delta >= 0 {
        CounterQueryType::Incr
    } else {
        CounterQueryType::Decr
    };
    let magnitude = i64::try_from(delta.unsigned_abs()).map_err(|_| {
        Error::validation(
            pm.name(),
            ValidationErrorKind::Custom,
            format!(
                "The delta {delta} of counter '{}' of entity '{}' is out of range",
                pm.name(),
                meta.class_name()
            ),
        )
    })?;
    Ok((query_type, Value::BigInt(magnitude)))
}

/// JSON form of an encoded value, used to render primary keys as text.
fn plain_json(value: &Value) -> serde_json::Value {
    use serde_json::Value as Json;
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::from(*i),
        Value::BigInt(i) | Value::Timestamp(i) => Json::from(*i),
        Value::Float(f) => Json::from(f64::from(*f)),
        Value::Double(f) => Json::from(*f),
        Value::Decimal(s) | Value::Text(s) => Json::String(s.clone()),
        Value::Blob(bytes) => Json::from(bytes.clone()),
        Value::Uuid(bytes) => Json::String(bytes.iter().map(|b| format!("{b:02x}")).collect()),
        Value::Json(json) => json.clone(),
        Value::List(items) | Value::Set(items) => {
            Json::Array(items.iter().map(plain_json).collect())
        }
        Value::Map(entries) => Json::Array(
            entries
                .iter()
                .map(|(k, v)| Json::Array(vec![plain_json(k), plain_json(v)]))
                .collect(),
        ),
    }
}

/// Text form of a primary key in the shared counter table.
///
/// A single component renders as its plain JSON value, a compound key as a
/// JSON array of its components.
pub fn primary_key_text(encoded_key: &[Value]) -> Result<String> {
    let json = match encoded_key {
        [single] => plain_json(single),
        many => serde_json::Value::Array(many.iter().map(plain_json).collect()),
    };
    Ok(serde_json::to_string(&json)?)
}

impl<S: CqlSession> DaoContext<S> {
    pub fn new(session: Arc<S>, cache_size: usize) -> Self {
        Self {
            session,
            entities: HashMap::new(),
            simple_counters: HashMap::new(),
            update_cache: Mutex::new(PreparedStatementCache::new(cache_size)),
        }
    }

    pub fn session(&self) -> &Arc<S> {
        &self.session
    }

    pub fn is_registered(&self, class_name: &str) -> bool {
        self.entities.contains_key(class_name)
    }

    async fn prepare(&self, cx: &Cx, query: &str) -> Outcome<PreparedStatement, Error> {
        tracing::trace!(query, "Preparing statement");
        self.session.prepare(cx, query).await
    }

    /// Prepare the statements of an entity type. Registering twice is a
    /// no-op.
    #[tracing::instrument(
        level = "debug",
        skip(self, cx, meta),
        fields(entity = meta.class_name())
    )]
    pub async fn register(&mut self, cx: &Cx, meta: &EntityMeta) -> Outcome<(), Error> {
        if self.is_registered(meta.class_name()) {
            return Outcome::Ok(());
        }

        let mut statements = EntityStatements::default();
        if meta.is_clustered_counter() {
            for (query_type, property, query) in prepared::clustered_counter_queries(meta) {
                let ps = try_outcome!(self.prepare(cx, &query).await);
                statements.clustered_counters.insert((query_type, property), ps);
            }
        } else {
            statements.insert = Some(try_outcome!(
                self.prepare(cx, &prepared::insert_query(meta)).await
            ));
            statements.select_entity = Some(try_outcome!(
                self.prepare(cx, &prepared::select_entity_query(meta)).await
            ));
            for pm in meta.all_metas_except_id_and_counters() {
                let query = try_result!(prepared::select_field_query(meta, pm));
                let ps = try_outcome!(self.prepare(cx, &query).await);
                statements.select_fields.insert(pm.name().to_string(), ps);
            }
            for (table, query) in prepared::delete_queries(meta) {
                let ps = try_outcome!(self.prepare(cx, &query).await);
                statements.deletes.push((table, ps));
            }
            if !meta.all_counter_metas().is_empty() && self.simple_counters.is_empty() {
                for (query_type, query) in prepared::simple_counter_queries() {
                    let ps = try_outcome!(self.prepare(cx, &query).await);
                    self.simple_counters.insert(query_type, ps);
                }
            }
        }

        tracing::debug!(
            entity = meta.class_name(),
            table = meta.table_name(),
            "Registered entity statements"
        );
        self.entities
            .insert(meta.class_name().to_string(), statements);
        Outcome::Ok(())
    }

    fn statements(&self, meta: &EntityMeta) -> Result<&EntityStatements> {
        self.entities.get(meta.class_name()).ok_or_else(|| {
            Error::validation(
                meta.class_name(),
                ValidationErrorKind::NotRegistered,
                format!("The entity class '{}' is not managed", meta.class_name()),
            )
        })
    }

    fn encoded_key(&self, meta: &EntityMeta, key: &[Value]) -> Result<Vec<Value>> {
        let id = meta.id_meta();
        id.transcoder().encode_components(id, key)
    }

    fn missing(meta: &EntityMeta, what: &str) -> Error {
        Error::InvalidState(format!(
            "No {what} statement prepared for entity '{}'",
            meta.class_name()
        ))
    }

    pub fn bind_for_insert<T: Entity>(
        &self,
        meta: &EntityMeta,
        entity: &T,
        options: &Options,
        level: ConsistencyLevel,
    ) -> Result<StatementWrapper> {
        let insert = self
            .statements(meta)?
            .insert
            .as_ref()
            .ok_or_else(|| Self::missing(meta, "insert"))?;

        let mut values = self.encoded_key(meta, &entity.primary_key())?;
        let mut current: HashMap<&str, Value> = entity.to_values().into_iter().collect();
        for pm in meta.all_metas_except_id_and_counters() {
            let value = current.remove(pm.name()).unwrap_or(Value::Null);
            values.push(pm.encode(value)?);
        }
        values.push(ttl_value(options));

        Ok(StatementWrapper::bound(insert.clone(), values, level)
            .with_timestamp(options.timestamp()))
    }

    /// Bind an update of exactly `properties`. Columns are set in name order
    /// whatever the order given.
    pub async fn bind_for_update<T: Entity>(
        &self,
        cx: &Cx,
        meta: &EntityMeta,
        entity: &T,
        properties: &[Arc<PropertyMeta>],
        options: &Options,
        level: ConsistencyLevel,
    ) -> Outcome<StatementWrapper, Error> {
        let _ = try_result!(self.statements(meta));
        let mut properties = properties.to_vec();
        properties.sort_by(|a, b| a.name().cmp(b.name()));
        let key = StatementKey::new(meta.class_name(), properties.iter().map(|pm| pm.name()));

        let cached = {
            let mut cache = self.update_cache.lock().unwrap_or_else(|e| e.into_inner());
            cache.get(&key)
        };
        let prepared = match cached {
            Some(prepared) => prepared,
            None => {
                let refs: Vec<&PropertyMeta> = properties.iter().map(AsRef::as_ref).collect();
                let query = prepared::update_fields_query(meta, &refs);
                let prepared = try_outcome!(self.prepare(cx, &query).await);
                self.update_cache
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(key, prepared.clone());
                prepared
            }
        };

        let mut values = vec![ttl_value(options)];
        for pm in &properties {
            let value = entity.value_of(pm.name()).unwrap_or(Value::Null);
            values.push(try_result!(pm.encode(value)));
        }
        values.extend(try_result!(self.encoded_key(meta, &entity.primary_key())));

        Outcome::Ok(
            StatementWrapper::bound(prepared, values, level).with_timestamp(options.timestamp()),
        )
    }

    /// One delete per table of the entity.
    pub fn bind_for_removal(
        &self,
        meta: &EntityMeta,
        key: &[Value],
        options: &Options,
        level: ConsistencyLevel,
    ) -> Result<Vec<StatementWrapper>> {
        let statements = self.statements(meta)?;
        let encoded = self.encoded_key(meta, key)?;
        Ok(statements
            .deletes
            .iter()
            .map(|(table, ps)| {
                tracing::trace!(table = %table, "Binding delete");
                StatementWrapper::bound(ps.clone(), encoded.clone(), level)
                    .with_timestamp(options.timestamp())
            })
            .collect())
    }

    pub fn bind_for_select_entity(
        &self,
        meta: &EntityMeta,
        key: &[Value],
        level: ConsistencyLevel,
    ) -> Result<StatementWrapper> {
        let select = self
            .statements(meta)?
            .select_entity
            .as_ref()
            .ok_or_else(|| Self::missing(meta, "select"))?;
        Ok(StatementWrapper::bound(
            select.clone(),
            self.encoded_key(meta, key)?,
            level,
        ))
    }

    pub fn bind_for_select_field(
        &self,
        meta: &EntityMeta,
        pm: &PropertyMeta,
        key: &[Value],
        level: ConsistencyLevel,
    ) -> Result<StatementWrapper> {
        let statements = self.statements(meta)?;
        let select = match statements.select_fields.get(pm.name()) {
            Some(select) => select,
            None => {
                // Counters and unknown properties never get a field select.
                prepared::select_field_query(meta, pm)?;
                return Err(Self::missing(meta, "field select"));
            }
        };
        Ok(StatementWrapper::bound(
            select.clone(),
            self.encoded_key(meta, key)?,
            level,
        ))
    }

    // ------------------------------------------------------------------
    // Shared counter table
    // ------------------------------------------------------------------

    fn simple_counter(
        &self,
        meta: &EntityMeta,
        query_type: CounterQueryType,
    ) -> Result<&PreparedStatement> {
        self.statements(meta)?;
        self.simple_counters
            .get(&query_type)
            .ok_or_else(|| Self::missing(meta, "counter"))
    }

    fn simple_counter_keys(
        &self,
        meta: &EntityMeta,
        pm: &PropertyMeta,
        key: &[Value],
    ) -> Result<Vec<Value>> {
        let encoded = self.encoded_key(meta, key)?;
        Ok(vec![
            Value::Text(meta.class_name().to_string()),
            Value::Text(primary_key_text(&encoded)?),
            Value::Text(pm.name().to_string()),
        ])
    }

    /// One increment or decrement of a counter in the shared counter table.
    pub fn bind_for_simple_counter_delta(
        &self,
        meta: &EntityMeta,
        pm: &PropertyMeta,
        key: &[Value],
        delta: i64,
        level: ConsistencyLevel,
    ) -> Result<StatementWrapper> {
        let (query_type, magnitude) = counter_delta(meta, pm, delta)?;
        let ps = self.simple_counter(meta, query_type)?;
        let mut values = vec![magnitude];
        values.extend(self.simple_counter_keys(meta, pm, key)?);
        Ok(StatementWrapper::bound(ps.clone(), values, level))
    }

    pub fn bind_for_simple_counter_select(
        &self,
        meta: &EntityMeta,
        pm: &PropertyMeta,
        key: &[Value],
        level: ConsistencyLevel,
    ) -> Result<StatementWrapper> {
        let ps = self.simple_counter(meta, CounterQueryType::Select)?;
        Ok(StatementWrapper::bound(
            ps.clone(),
            self.simple_counter_keys(meta, pm, key)?,
            level,
        ))
    }

    pub fn bind_for_simple_counter_delete(
        &self,
        meta: &EntityMeta,
        pm: &PropertyMeta,
        key: &[Value],
        level: ConsistencyLevel,
    ) -> Result<StatementWrapper> {
        let ps = self.simple_counter(meta, CounterQueryType::Delete)?;
        Ok(StatementWrapper::bound(
            ps.clone(),
            self.simple_counter_keys(meta, pm, key)?,
            level,
        ))
    }

    // ------------------------------------------------------------------
    // Clustered counter tables
    // ------------------------------------------------------------------

    fn clustered_counter(
        &self,
        meta: &EntityMeta,
        query_type: CounterQueryType,
        property: &str,
    ) -> Result<&PreparedStatement> {
        self.statements(meta)?
            .clustered_counters
            .get(&(query_type, property.to_string()))
            .ok_or_else(|| Self::missing(meta, "clustered counter"))
    }

    /// One increment or decrement of a counter column, keyed by the row's
    /// own compound key.
    pub fn bind_for_clustered_counter_delta(
        &self,
        meta: &EntityMeta,
        pm: &PropertyMeta,
        key: &[Value],
        delta: i64,
        level: ConsistencyLevel,
    ) -> Result<StatementWrapper> {
        let (query_type, magnitude) = counter_delta(meta, pm, delta)?;
        let ps = self.clustered_counter(meta, query_type, pm.name())?;
        let mut values = vec![magnitude];
        values.extend(self.encoded_key(meta, key)?);
        Ok(StatementWrapper::bound(ps.clone(), values, level))
    }

    pub fn bind_for_clustered_counter_select(
        &self,
        meta: &EntityMeta,
        pm: &PropertyMeta,
        key: &[Value],
        level: ConsistencyLevel,
    ) -> Result<StatementWrapper> {
        let ps = self.clustered_counter(meta, CounterQueryType::Select, pm.name())?;
        Ok(StatementWrapper::bound(
            ps.clone(),
            self.encoded_key(meta, key)?,
            level,
        ))
    }

    pub fn bind_for_clustered_counter_select_all(
        &self,
        meta: &EntityMeta,
        key: &[Value],
        level: ConsistencyLevel,
    ) -> Result<StatementWrapper> {
        let ps = self.clustered_counter(meta, CounterQueryType::Select, SELECT_ALL)?;
        Ok(StatementWrapper::bound(
            ps.clone(),
            self.encoded_key(meta, key)?,
            level,
        ))
    }

    pub fn bind_for_clustered_counter_delete_all(
        &self,
        meta: &EntityMeta,
        key: &[Value],
        level: ConsistencyLevel,
    ) -> Result<StatementWrapper> {
        let ps = self.clustered_counter(meta, CounterQueryType::Delete, DELETE_ALL)?;
        Ok(StatementWrapper::bound(
            ps.clone(),
            self.encoded_key(meta, key)?,
            level,
        ))
    }
}
