//! Property (attribute) metadata.

use crate::consistency::ConsistencyLevel;
use crate::error::{Error, MappingErrorKind, Result};
use crate::metadata::CompoundKeyDescriptor;
use crate::transcoder::Transcoder;
use crate::types::CqlType;
use crate::value::Value;

/// What a mapped attribute holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    /// Single-column primary key
    Id,
    /// Compound primary key
    EmbeddedId,
    /// Scalar column
    Simple,
    List,
    Set,
    Map,
    /// Distributed counter
    Counter,
}

impl PropertyKind {
    pub const fn is_id(&self) -> bool {
        matches!(self, PropertyKind::Id | PropertyKind::EmbeddedId)
    }

    pub const fn is_counter(&self) -> bool {
        matches!(self, PropertyKind::Counter)
    }

    pub const fn is_collection(&self) -> bool {
        matches!(self, PropertyKind::List | PropertyKind::Set | PropertyKind::Map)
    }

    fn transcoder(self) -> Transcoder {
        match self {
            PropertyKind::EmbeddedId => Transcoder::Compound,
            PropertyKind::List => Transcoder::List,
            PropertyKind::Set => Transcoder::Set,
            PropertyKind::Map => Transcoder::Map,
            PropertyKind::Id | PropertyKind::Simple | PropertyKind::Counter => Transcoder::Simple,
        }
    }
}

/// One mapped attribute of an entity. Immutable once built.
#[derive(Debug, Clone)]
pub struct PropertyMeta {
    name: String,
    entity_class: String,
    kind: PropertyKind,
    cql_type: CqlType,
    read_level: Option<ConsistencyLevel>,
    write_level: Option<ConsistencyLevel>,
    has_setter: bool,
    lazy: bool,
    compound_key: Option<CompoundKeyDescriptor>,
    transcoder: Transcoder,
}

impl PropertyMeta {
    /// Start describing a property.
    pub fn builder(
        name: impl Into<String>,
        kind: PropertyKind,
        cql_type: CqlType,
    ) -> PropertyMetaBuilder {
        PropertyMetaBuilder {
            name: name.into(),
            kind,
            cql_type,
            read_level: None,
            write_level: None,
            has_setter: true,
            lazy: false,
            compound_key: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the entity class declaring this property.
    pub fn entity_class(&self) -> &str {
        &self.entity_class
    }

    pub fn kind(&self) -> PropertyKind {
        self.kind
    }

    pub fn cql_type(&self) -> &CqlType {
        &self.cql_type
    }

    /// Per-property read level override.
    pub fn read_level(&self) -> Option<ConsistencyLevel> {
        self.read_level
    }

    /// Per-property write level override.
    pub fn write_level(&self) -> Option<ConsistencyLevel> {
        self.write_level
    }

    pub fn has_setter(&self) -> bool {
        self.has_setter
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    pub fn is_counter(&self) -> bool {
        self.kind.is_counter()
    }

    pub fn is_embedded_id(&self) -> bool {
        self.kind == PropertyKind::EmbeddedId
    }

    pub fn compound_key(&self) -> Option<&CompoundKeyDescriptor> {
        self.compound_key.as_ref()
    }

    pub fn transcoder(&self) -> Transcoder {
        self.transcoder
    }

    /// Column names backing this property: the key components for a
    /// compound key, the property name otherwise.
    pub fn column_names(&self) -> Vec<&str> {
        match &self.compound_key {
            Some(key) => key.column_names(),
            None => vec![self.name.as_str()],
        }
    }

    /// Encode an in-memory value with this property's transcoder.
    pub fn encode(&self, value: Value) -> Result<Value> {
        self.transcoder.encode(self, value)
    }

    /// Decode a wire value with this property's transcoder.
    pub fn decode(&self, value: Value) -> Result<Value> {
        self.transcoder.decode(self, value)
    }
}

/// Builder for [`PropertyMeta`].
#[derive(Debug, Clone)]
pub struct PropertyMetaBuilder {
    name: String,
    kind: PropertyKind,
    cql_type: CqlType,
    read_level: Option<ConsistencyLevel>,
    write_level: Option<ConsistencyLevel>,
    has_setter: bool,
    lazy: bool,
    compound_key: Option<CompoundKeyDescriptor>,
}

impl PropertyMetaBuilder {
    pub fn read_level(mut self, level: ConsistencyLevel) -> Self {
        self.read_level = Some(level);
        self
    }

    pub fn write_level(mut self, level: ConsistencyLevel) -> Self {
        self.write_level = Some(level);
        self
    }

    /// The property can be read but has no setter.
    pub fn read_only(mut self) -> Self {
        self.has_setter = false;
        self
    }

    /// Load this property only on explicit initialization.
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    pub fn compound_key(mut self, key: CompoundKeyDescriptor) -> Self {
        self.compound_key = Some(key);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Build the property for the given declaring entity class.
    pub fn build(self, entity_class: &str) -> Result<PropertyMeta> {
        let fail = |message: String| {
            Err(Error::mapping(
                MappingErrorKind::Invalid,
                entity_class,
                message,
            ))
        };

        if self.name.trim().is_empty() {
            return fail(format!(
                "A property of entity '{entity_class}' has a blank name"
            ));
        }
        match (self.kind, &self.compound_key) {
            (PropertyKind::EmbeddedId, None) => {
                return fail(format!(
                    "The compound key '{}' of entity '{entity_class}' has no components",
                    self.name
                ));
            }
            (PropertyKind::EmbeddedId, Some(key)) => key.validate(entity_class)?,
            (_, Some(_)) => {
                return fail(format!(
                    "Only a compound key may declare key components, not '{}'",
                    self.name
                ));
            }
            (_, None) => {}
        }
        if self.kind.is_counter() != (self.cql_type == CqlType::Counter) {
            return fail(format!(
                "The property '{}' of entity '{entity_class}' must use the counter type if and only if it is a counter",
                self.name
            ));
        }
        if self.kind.is_id() && self.lazy {
            return fail(format!(
                "The primary key '{}' of entity '{entity_class}' cannot be lazy",
                self.name
            ));
        }

        Ok(PropertyMeta {
            transcoder: self.kind.transcoder(),
            name: self.name,
            entity_class: entity_class.to_string(),
            kind: self.kind,
            cql_type: self.cql_type,
            read_level: self.read_level,
            write_level: self.write_level,
            has_setter: self.has_setter,
            lazy: self.lazy,
            compound_key: self.compound_key,
        })
    }
}
