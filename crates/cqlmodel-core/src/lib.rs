//! Core types and traits for CQLModel.
//!
//! This crate provides the foundational abstractions the persistence pipeline
//! is built on:
//!
//! - `Entity` trait for mapping user types onto CQL tables
//! - `EntityMeta` / `PropertyMeta` descriptors and compound keys
//! - `Value`, `Row` and `CqlType` for dynamically-typed data
//! - `ConsistencyLevel` and per-call `Options`
//! - `CqlSession` executor capability
//! - `Outcome` re-export from asupersync for cancel-correct operations
//! - `Cx` context for structured concurrency

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod consistency;
pub mod error;
pub mod metadata;
pub mod model;
pub mod row;
pub mod session;
pub mod transcoder;
pub mod types;
pub mod value;

pub use consistency::{ConsistencyLevel, Options, OptionsBuilder, parse_consistency_map};
pub use error::{
    ConfigError, ConnectionError, ConnectionErrorKind, Error, FieldValidationError, MappingError,
    MappingErrorKind, QueryError, QueryErrorKind, Result, TypeError, ValidationError,
    ValidationErrorKind,
};
pub use metadata::{
    CompoundKeyDescriptor, EntityMeta, EntityMetaBuilder, KeyComponent, KeyRole, PropertyKind,
    PropertyMeta, PropertyMetaBuilder,
};
pub use model::{Counter, Entity, Event, Interceptor};
pub use row::{ColumnInfo, Row};
pub use session::{BatchType, CqlSession, PreparedStatement, Statement, StatementBody};
pub use transcoder::Transcoder;
pub use types::CqlType;
pub use value::Value;
