//! Consistency level resolution.
//!
//! Precedence, highest first:
//!
//! 1. the level of an open batch window,
//! 2. the level carried by the call-site `Options`,
//! 3. the property-level default, then the entity-level default.
//!
//! A call-site level while a batch window is open is a configuration error:
//! the batch is sent as one group at one level.

use crate::flush::FlushContext;
use cqlmodel_core::{ConsistencyLevel, CqlSession, EntityMeta, Error, Options, PropertyMeta, Result};

/// Decides the level a read or a write is sent with.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsistencyOverrider;

impl ConsistencyOverrider {
    pub fn new() -> Self {
        Self
    }

    /// Resolve a level from the open batch level, the call-site options and a
    /// fallback default.
    pub fn resolve(
        &self,
        options: &Options,
        batch_level: Option<ConsistencyLevel>,
        fallback: ConsistencyLevel,
    ) -> Result<ConsistencyLevel> {
        match (batch_level, options.consistency()) {
            (Some(_), Some(_)) => Err(batch_conflict()),
            (Some(level), None) | (None, Some(level)) => Ok(level),
            (None, None) => Ok(fallback),
        }
    }

    /// Options with the batch level applied, for operations running inside a
    /// flush context.
    ///
    /// Outside a batch window the options pass through unchanged.
    pub fn override_runtime_value_by_batch_setting<S: CqlSession>(
        &self,
        options: &Options,
        flush: &FlushContext<S>,
    ) -> Result<Options> {
        match flush.batch_level() {
            None => Ok(*options),
            Some(_) if options.has_consistency() => Err(batch_conflict()),
            Some(level) => Ok(options.duplicate_with_consistency(level)),
        }
    }

    pub fn read_level(&self, options: &Options, meta: &EntityMeta) -> ConsistencyLevel {
        options.consistency().unwrap_or_else(|| meta.read_level())
    }

    pub fn write_level(&self, options: &Options, meta: &EntityMeta) -> ConsistencyLevel {
        options.consistency().unwrap_or_else(|| meta.write_level())
    }

    pub fn read_level_for_property(
        &self,
        options: &Options,
        pm: &PropertyMeta,
        meta: &EntityMeta,
    ) -> ConsistencyLevel {
        options
            .consistency()
            .or_else(|| pm.read_level())
            .unwrap_or_else(|| meta.read_level())
    }

    pub fn write_level_for_property(
        &self,
        options: &Options,
        pm: &PropertyMeta,
        meta: &EntityMeta,
    ) -> ConsistencyLevel {
        options
            .consistency()
            .or_else(|| pm.write_level())
            .unwrap_or_else(|| meta.write_level())
    }
}

pub(crate) fn batch_conflict() -> Error {
    Error::config(
        "Runtime custom Consistency Level cannot be set for batch mode. \
         Please set the Consistency Levels at batch start with 'start_batch_with(level)'",
    )
}
