//! Entity, property and compound key descriptors.

mod compound_key;
mod entity;
mod property;

pub use compound_key::{CompoundKeyDescriptor, KeyComponent, KeyRole};
pub use entity::{EntityMeta, EntityMetaBuilder};
pub use property::{PropertyKind, PropertyMeta, PropertyMetaBuilder};
