//! Entity-level metadata.

use crate::consistency::ConsistencyLevel;
use crate::error::{Error, MappingErrorKind, Result};
use crate::metadata::{PropertyKind, PropertyMeta, PropertyMetaBuilder};
use crate::model::{ErasedInterceptor, Event, Interceptor, erase};
use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Per-entity-type descriptor.
///
/// Built once at registration and shared read-only afterwards.
#[derive(Clone)]
pub struct EntityMeta {
    class_name: String,
    table_name: String,
    id: Arc<PropertyMeta>,
    properties: Vec<Arc<PropertyMeta>>,
    declared_read_level: Option<ConsistencyLevel>,
    declared_write_level: Option<ConsistencyLevel>,
    read_level: ConsistencyLevel,
    write_level: ConsistencyLevel,
    clustered_counter: bool,
    interceptors: Vec<Arc<dyn ErasedInterceptor>>,
}

impl EntityMeta {
    /// Start describing an entity stored in `table_name`.
    pub fn builder(
        class_name: impl Into<String>,
        table_name: impl Into<String>,
    ) -> EntityMetaBuilder {
        EntityMetaBuilder {
            class_name: class_name.into(),
            table_name: table_name.into(),
            properties: Vec::new(),
            read_level: None,
            write_level: None,
            clustered_counter: false,
            interceptors: Vec::new(),
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// The identifier property (simple id or compound key).
    pub fn id_meta(&self) -> &Arc<PropertyMeta> {
        &self.id
    }

    /// All properties in declared order, id included.
    pub fn properties(&self) -> &[Arc<PropertyMeta>] {
        &self.properties
    }

    /// Default read level for this entity.
    pub fn read_level(&self) -> ConsistencyLevel {
        self.read_level
    }

    /// Default write level for this entity.
    pub fn write_level(&self) -> ConsistencyLevel {
        self.write_level
    }

    /// Levels declared on the entity itself, before configuration applies.
    pub fn declared_levels(&self) -> (Option<ConsistencyLevel>, Option<ConsistencyLevel>) {
        (self.declared_read_level, self.declared_write_level)
    }

    /// Copy of this descriptor with resolved default levels.
    pub fn with_levels(mut self, read: ConsistencyLevel, write: ConsistencyLevel) -> Self {
        self.read_level = read;
        self.write_level = write;
        self
    }

    /// Whether the whole table is a clustered counter table.
    pub fn is_clustered_counter(&self) -> bool {
        self.clustered_counter
    }

    /// Whether the key has clustering components.
    pub fn is_clustered(&self) -> bool {
        self.id.compound_key().is_some_and(|key| key.is_clustered())
    }

    /// Whether the id is a compound key.
    pub fn has_compound_key(&self) -> bool {
        self.id.is_embedded_id()
    }

    pub fn id_column_names(&self) -> Vec<&str> {
        self.id.column_names()
    }

    pub fn all_metas_except_id_and_counters(&self) -> Vec<&Arc<PropertyMeta>> {
        self.properties
            .iter()
            .filter(|pm| !pm.kind().is_id() && !pm.is_counter())
            .collect()
    }

    pub fn all_counter_metas(&self) -> Vec<&Arc<PropertyMeta>> {
        self.properties.iter().filter(|pm| pm.is_counter()).collect()
    }

    /// Non-id, non-counter properties loaded eagerly.
    pub fn eager_metas(&self) -> Vec<&Arc<PropertyMeta>> {
        self.all_metas_except_id_and_counters()
            .into_iter()
            .filter(|pm| !pm.is_lazy())
            .collect()
    }

    pub fn lazy_metas(&self) -> Vec<&Arc<PropertyMeta>> {
        self.all_metas_except_id_and_counters()
            .into_iter()
            .filter(|pm| pm.is_lazy())
            .collect()
    }

    pub fn find_property(&self, name: &str) -> Option<&Arc<PropertyMeta>> {
        self.properties.iter().find(|pm| pm.name() == name)
    }

    /// Look up a property, failing with a mapping error if it is unknown.
    pub fn property(&self, name: &str) -> Result<&Arc<PropertyMeta>> {
        self.find_property(name).ok_or_else(|| {
            Error::mapping(
                MappingErrorKind::UnknownProperty,
                &self.class_name,
                format!("The property '{name}' is not mapped"),
            )
        })
    }

    pub fn has_interceptor(&self, event: Event) -> bool {
        self.interceptors.iter().any(|i| i.accepts(event))
    }

    /// Run every interceptor registered for `event`, in registration order.
    pub fn intercept(&self, entity: &mut dyn Any, event: Event) -> Result<()> {
        for interceptor in self.interceptors.iter().filter(|i| i.accepts(event)) {
            interceptor.invoke(entity, event)?;
        }
        Ok(())
    }
}

impl fmt::Debug for EntityMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityMeta")
            .field("class_name", &self.class_name)
            .field("table_name", &self.table_name)
            .field("id", &self.id.name())
            .field("properties", &self.properties.len())
            .field("read_level", &self.read_level)
            .field("write_level", &self.write_level)
            .field("clustered_counter", &self.clustered_counter)
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}

/// Builder for [`EntityMeta`].
pub struct EntityMetaBuilder {
    class_name: String,
    table_name: String,
    properties: Vec<PropertyMetaBuilder>,
    read_level: Option<ConsistencyLevel>,
    write_level: Option<ConsistencyLevel>,
    clustered_counter: bool,
    interceptors: Vec<Arc<dyn ErasedInterceptor>>,
}

impl EntityMetaBuilder {
    /// Add a property. Declaration order is kept.
    pub fn property(mut self, property: PropertyMetaBuilder) -> Self {
        self.properties.push(property);
        self
    }

    pub fn read_level(mut self, level: ConsistencyLevel) -> Self {
        self.read_level = Some(level);
        self
    }

    pub fn write_level(mut self, level: ConsistencyLevel) -> Self {
        self.write_level = Some(level);
        self
    }

    /// Mark the table as a clustered counter table.
    pub fn clustered_counter(mut self) -> Self {
        self.clustered_counter = true;
        self
    }

    /// Register a lifecycle interceptor for entities of type `T`.
    pub fn interceptor<T, I>(mut self, interceptor: I) -> Self
    where
        T: 'static,
        I: Interceptor<T>,
    {
        self.interceptors.push(erase::<T, I>(interceptor));
        self
    }

    /// Validate and build the descriptor.
    pub fn build(self) -> Result<EntityMeta> {
        let class_name = self.class_name;
        if self.table_name.trim().is_empty() {
            return Err(Error::mapping(
                MappingErrorKind::Invalid,
                &class_name,
                format!("The entity '{class_name}' has a blank table name"),
            ));
        }

        let mut names = HashSet::new();
        let mut properties = Vec::with_capacity(self.properties.len());
        for builder in self.properties {
            if !names.insert(builder.name().to_string()) {
                return Err(Error::mapping(
                    MappingErrorKind::Invalid,
                    &class_name,
                    format!("The property '{}' is declared twice", builder.name()),
                ));
            }
            properties.push(Arc::new(builder.build(&class_name)?));
        }

        let ids: Vec<&Arc<PropertyMeta>> =
            properties.iter().filter(|pm| pm.kind().is_id()).collect();
        let id = match ids.as_slice() {
            [id] => Arc::clone(id),
            [] => {
                return Err(Error::mapping(
                    MappingErrorKind::Id,
                    &class_name,
                    format!("The entity '{class_name}' should have exactly one id, found none"),
                ));
            }
            many => {
                return Err(Error::mapping(
                    MappingErrorKind::Id,
                    &class_name,
                    format!(
                        "The entity '{class_name}' should have exactly one id, found {}",
                        many.len()
                    ),
                ));
            }
        };

        if self.clustered_counter {
            validate_clustered_counter(&class_name, &id, &properties)?;
        }

        tracing::debug!(
            entity = %class_name,
            table = %self.table_name,
            properties = properties.len(),
            "Built entity metadata"
        );

        Ok(EntityMeta {
            class_name,
            table_name: self.table_name,
            id,
            properties,
            declared_read_level: self.read_level,
            declared_write_level: self.write_level,
            read_level: self.read_level.unwrap_or_default(),
            write_level: self.write_level.unwrap_or_default(),
            clustered_counter: self.clustered_counter,
            interceptors: self.interceptors,
        })
    }
}

fn validate_clustered_counter(
    class_name: &str,
    id: &PropertyMeta,
    properties: &[Arc<PropertyMeta>],
) -> Result<()> {
    let fail = |message: String| {
        Err(Error::mapping(
            MappingErrorKind::ClusteredCounter,
            class_name,
            message,
        ))
    };

    if !id.compound_key().is_some_and(|key| key.is_clustered()) {
        return fail(format!(
            "The clustered counter entity '{class_name}' should have a compound key with clustering components"
        ));
    }
    let mut counters = 0;
    for pm in properties.iter().filter(|pm| !pm.kind().is_id()) {
        if pm.kind() != PropertyKind::Counter {
            return fail(format!(
                "The clustered counter entity '{class_name}' should only have counter properties, '{}' is not a counter",
                pm.name()
            ));
        }
        counters += 1;
    }
    if counters == 0 {
        return fail(format!(
            "The clustered counter entity '{class_name}' should have at least one counter property"
        ));
    }
    Ok(())
}
