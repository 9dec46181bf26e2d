//! Compound primary keys: partition components followed by clustering components.

use crate::error::{Error, MappingErrorKind, Result};
use crate::types::CqlType;
use std::collections::HashSet;

/// Whether a key component decides data placement or in-partition ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    Partition,
    Clustering,
}

/// One component of a compound key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyComponent {
    name: String,
    cql_type: CqlType,
    role: KeyRole,
    reversed: bool,
}

impl KeyComponent {
    /// A partition component.
    pub fn partition(name: impl Into<String>, cql_type: CqlType) -> Self {
        Self {
            name: name.into(),
            cql_type,
            role: KeyRole::Partition,
            reversed: false,
        }
    }

    /// A clustering component.
    pub fn clustering(name: impl Into<String>, cql_type: CqlType) -> Self {
        Self {
            name: name.into(),
            cql_type,
            role: KeyRole::Clustering,
            reversed: false,
        }
    }

    /// Mark this component as stored in reversed order.
    pub fn reversed(mut self) -> Self {
        self.reversed = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cql_type(&self) -> &CqlType {
        &self.cql_type
    }

    pub fn role(&self) -> KeyRole {
        self.role
    }

    pub fn is_reversed(&self) -> bool {
        self.reversed
    }
}

/// Ordered list of key components.
///
/// Built unchecked; [`CompoundKeyDescriptor::validate`] enforces the layout
/// rules and is run when the owning entity metadata is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompoundKeyDescriptor {
    components: Vec<KeyComponent>,
}

impl CompoundKeyDescriptor {
    pub fn new(components: Vec<KeyComponent>) -> Self {
        Self { components }
    }

    /// Check the component layout.
    ///
    /// - at least 2 components
    /// - no duplicated names
    /// - at least one partition component, all partition components first
    /// - at most one reversed component, and only as the last clustering component
    pub fn validate(&self, entity: &str) -> Result<()> {
        let fail = |message: String| {
            Err(Error::mapping(MappingErrorKind::CompoundKey, entity, message))
        };

        if self.components.len() < 2 {
            return fail(format!(
                "There should be at least 2 components for the compound key of entity '{entity}'"
            ));
        }

        let mut seen = HashSet::new();
        for component in &self.components {
            if !seen.insert(component.name.as_str()) {
                return fail(format!(
                    "The component '{}' is duplicated in the compound key of entity '{entity}'",
                    component.name
                ));
            }
        }

        let partition_count = self.partition_components().count();
        if partition_count == 0 {
            return fail(format!(
                "The compound key of entity '{entity}' should have at least one partition component"
            ));
        }
        if self.components[..partition_count]
            .iter()
            .any(|c| c.role != KeyRole::Partition)
        {
            return fail(format!(
                "The partition components of entity '{entity}' should come before any clustering component"
            ));
        }

        let reversed: Vec<usize> = self
            .components
            .iter()
            .enumerate()
            .filter(|(_, c)| c.reversed)
            .map(|(i, _)| i)
            .collect();
        if reversed.len() > 1 {
            return fail(format!(
                "There should be at most 1 reversed component in the compound key of entity '{entity}'"
            ));
        }
        if let Some(&position) = reversed.first() {
            let is_clustering = self.components[position].role == KeyRole::Clustering;
            if !is_clustering || position != self.components.len() - 1 {
                return fail(format!(
                    "The reversed component of entity '{entity}' must be the last clustering component"
                ));
            }
        }

        Ok(())
    }

    /// All components in declared order.
    pub fn components(&self) -> &[KeyComponent] {
        &self.components
    }

    /// Column names in declared order.
    pub fn column_names(&self) -> Vec<&str> {
        self.components.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn partition_components(&self) -> impl Iterator<Item = &KeyComponent> {
        self.components
            .iter()
            .filter(|c| c.role == KeyRole::Partition)
    }

    pub fn clustering_components(&self) -> impl Iterator<Item = &KeyComponent> {
        self.components
            .iter()
            .filter(|c| c.role == KeyRole::Clustering)
    }

    /// Whether the key has at least one clustering component.
    pub fn is_clustered(&self) -> bool {
        self.clustering_components().next().is_some()
    }

    /// The reversed clustering component, if any.
    pub fn reversed_component(&self) -> Option<&KeyComponent> {
        self.components.iter().find(|c| c.reversed)
    }
}
