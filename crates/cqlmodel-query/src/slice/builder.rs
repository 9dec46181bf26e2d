//! Slice queries described in terms of an entity's compound key.

use super::generator::{SliceStatement, generate_delete, generate_select};
use super::spec::{BoundingMode, OrderingMode, SliceQuerySpec};
use crate::prepared::entity_select_columns;
use cqlmodel_core::{
    CompoundKeyDescriptor, EntityMeta, Error, Result, ValidationErrorKind, Value,
};
use std::cmp::Ordering;

/// Default maximum number of rows returned.
pub const DEFAULT_LIMIT: usize = 100;
/// Default page size.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// A range query on one partition of a clustered entity.
///
/// The partition key must be complete. Start and end clustering values
/// share a common prefix that becomes part of the equality predicates; the
/// first component where they differ is the varying one.
#[derive(Debug, Clone)]
pub struct SliceQuery<'a> {
    meta: &'a EntityMeta,
    partition: Vec<Value>,
    from: Vec<Value>,
    to: Vec<Value>,
    ordering: OrderingMode,
    bounding: BoundingMode,
    limit: usize,
    batch_size: usize,
}

impl<'a> SliceQuery<'a> {
    /// Start a slice query. The entity must have clustering components.
    pub fn new(meta: &'a EntityMeta) -> Result<Self> {
        if !meta.is_clustered() {
            return Err(Error::config(format!(
                "Cannot perform slice query on entity type '{}' because it is not a clustered entity",
                meta.class_name()
            )));
        }
        Ok(Self {
            meta,
            partition: Vec::new(),
            from: Vec::new(),
            to: Vec::new(),
            ordering: OrderingMode::Ascending,
            bounding: BoundingMode::InclusiveBounds,
            limit: DEFAULT_LIMIT,
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    pub fn partition_components(mut self, values: Vec<Value>) -> Self {
        self.partition = values;
        self
    }

    pub fn from_clusterings(mut self, values: Vec<Value>) -> Self {
        self.from = values;
        self
    }

    pub fn to_clusterings(mut self, values: Vec<Value>) -> Self {
        self.to = values;
        self
    }

    pub fn ordering(mut self, ordering: OrderingMode) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn bounding(mut self, bounding: BoundingMode) -> Self {
        self.bounding = bounding;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn meta(&self) -> &EntityMeta {
        self.meta
    }

    fn key(&self) -> Result<&CompoundKeyDescriptor> {
        self.meta.id_meta().compound_key().ok_or_else(|| {
            Error::config(format!(
                "The entity '{}' has no compound key",
                self.meta.class_name()
            ))
        })
    }

    /// Compute the generator input.
    pub fn to_spec(&self) -> Result<SliceQuerySpec> {
        let key = self.key()?;
        let partition: Vec<_> = key.partition_components().collect();
        let clustering: Vec<_> = key.clustering_components().collect();
        let entity = self.meta.class_name();

        if self.partition.len() != partition.len() {
            return Err(Error::validation(
                "partition_components",
                ValidationErrorKind::MissingKeyComponent,
                format!(
                    "There should be exactly {} partition component(s) for slice query on entity '{entity}'",
                    partition.len()
                ),
            ));
        }
        if let Some((component, _)) = partition
            .iter()
            .zip(&self.partition)
            .find(|(_, value)| value.is_null())
        {
            return Err(Error::validation(
                component.name(),
                ValidationErrorKind::MissingKeyComponent,
                format!(
                    "The partition component '{}' should not be null for slice query on entity '{entity}'",
                    component.name()
                ),
            ));
        }
        for (side, values) in [("start", &self.from), ("end", &self.to)] {
            if values.len() > clustering.len() {
                return Err(Error::config(format!(
                    "There should be at most {} {side} clustering component(s) for slice query on entity '{entity}'",
                    clustering.len()
                )));
            }
            if values.iter().any(Value::is_null) {
                return Err(Error::config(format!(
                    "The {side} clustering components should not contain null for slice query on entity '{entity}'"
                )));
            }
        }

        let common = self
            .from
            .iter()
            .zip(&self.to)
            .take_while(|(a, b)| a == b)
            .count();
        if self.from.len() > common + 1 || self.to.len() > common + 1 {
            return Err(Error::config(format!(
                "Only the last clustering component can differ between start and end for slice query on entity '{entity}'"
            )));
        }

        let start = self.from.get(common).cloned();
        let end = self.to.get(common).cloned();
        if let (Some(start), Some(end)) = (&start, &end) {
            let wrong_order = match (self.ordering, start.compare(end)) {
                (OrderingMode::Ascending, Some(Ordering::Greater)) => Some("lesser"),
                (OrderingMode::Descending, Some(Ordering::Less)) => Some("greater"),
                _ => None,
            };
            if let Some(expected) = wrong_order {
                return Err(Error::config(format!(
                    "For slice query with {} order, start clustering components should be {expected} or equal to end clustering components",
                    match self.ordering {
                        OrderingMode::Ascending => "ascending",
                        OrderingMode::Descending => "descending",
                    }
                )));
            }
        }

        let mut spec = SliceQuerySpec::new(self.meta.table_name())
            .columns(entity_select_columns(self.meta))
            .ordering(self.ordering)
            .bounding(self.bounding)
            .order_column(clustering[0].name())
            .limit(self.limit)
            .batch_size(self.batch_size);
        for (component, value) in partition.iter().zip(&self.partition) {
            spec = spec.fixed(component.name(), value.clone());
        }
        for (component, value) in clustering.iter().zip(&self.from[..common]) {
            spec = spec.fixed(component.name(), value.clone());
        }
        if start.is_some() || end.is_some() {
            spec = spec.varying(clustering[common].name());
            if let Some(start) = start {
                spec = spec.start(start);
            }
            if let Some(end) = end {
                spec = spec.end(end);
            }
        }
        Ok(spec)
    }

    /// Compile the select form.
    pub fn select_statement(&self) -> Result<SliceStatement> {
        generate_select(&self.to_spec()?)
    }

    /// Compile the delete form.
    pub fn delete_statement(&self) -> Result<SliceStatement> {
        generate_delete(&self.to_spec()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cqlmodel_core::{CqlType, KeyComponent, PropertyKind, PropertyMeta};

    fn tweet_meta() -> EntityMeta {
        EntityMeta::builder("Tweet", "tweets")
            .property(
                PropertyMeta::builder("id", PropertyKind::EmbeddedId, CqlType::Custom("TweetKey"))
                    .compound_key(CompoundKeyDescriptor::new(vec![
                        KeyComponent::partition("user_id", CqlType::BigInt),
                        KeyComponent::clustering("author", CqlType::Text),
                        KeyComponent::clustering("rank", CqlType::Int),
                    ])),
            )
            .property(PropertyMeta::builder("content", PropertyKind::Simple, CqlType::Text))
            .build()
            .unwrap()
    }

    #[test]
    fn test_rejects_non_clustered_entity() {
        let meta = EntityMeta::builder("User", "users")
            .property(PropertyMeta::builder("id", PropertyKind::Id, CqlType::BigInt))
            .build()
            .unwrap();
        let err = SliceQuery::new(&meta).unwrap_err();
        assert!(err.to_string().contains("not a clustered entity"));
    }

    #[test]
    fn test_common_prefix_becomes_fixed() {
        let meta = tweet_meta();
        let stmt = SliceQuery::new(&meta)
            .unwrap()
            .partition_components(vec![Value::BigInt(10)])
            .from_clusterings(vec![Value::Text("bob".into()), Value::Int(1)])
            .to_clusterings(vec![Value::Text("bob".into()), Value::Int(5)])
            .select_statement()
            .unwrap();
        assert_eq!(
            stmt.query(),
            "SELECT user_id,author,rank,content FROM tweets WHERE user_id=10 AND author=? AND rank>=1 AND rank<=5 LIMIT 100;"
        );
        assert_eq!(stmt.values(), &[Value::Text("bob".into())]);
        assert_eq!(stmt.fetch_size(), Some(DEFAULT_BATCH_SIZE));
    }

    #[test]
    fn test_descending_orders_by_first_clustering() {
        let meta = tweet_meta();
        let stmt = SliceQuery::new(&meta)
            .unwrap()
            .partition_components(vec![Value::BigInt(10)])
            .from_clusterings(vec![Value::Text("bob".into()), Value::Int(5)])
            .to_clusterings(vec![Value::Text("bob".into())])
            .ordering(OrderingMode::Descending)
            .limit(3)
            .select_statement()
            .unwrap();
        assert_eq!(
            stmt.predicate(),
            "user_id=10 AND author=? AND rank<=5"
        );
        assert!(stmt.query().ends_with("ORDER BY author DESC LIMIT 3;"));
    }

    #[test]
    fn test_partition_only_and_delete() {
        let meta = tweet_meta();
        let query = SliceQuery::new(&meta)
            .unwrap()
            .partition_components(vec![Value::BigInt(10)]);
        assert_eq!(
            query.select_statement().unwrap().predicate(),
            "user_id=10"
        );
        assert_eq!(
            query.delete_statement().unwrap().query(),
            "DELETE FROM tweets WHERE user_id=10;"
        );
    }

    #[test]
    fn test_validation() {
        let meta = tweet_meta();
        let err = SliceQuery::new(&meta).unwrap().to_spec().unwrap_err();
        assert_eq!(
            err.validation_kind(),
            Some(ValidationErrorKind::MissingKeyComponent)
        );

        let err = SliceQuery::new(&meta)
            .unwrap()
            .partition_components(vec![Value::BigInt(10)])
            .from_clusterings(vec![Value::Text("b".into())])
            .to_clusterings(vec![Value::Text("a".into())])
            .to_spec()
            .unwrap_err();
        assert!(err.to_string().contains("lesser or equal"));

        let err = SliceQuery::new(&meta)
            .unwrap()
            .partition_components(vec![Value::BigInt(10)])
            .from_clusterings(vec![Value::Text("a".into()), Value::Int(1)])
            .to_clusterings(vec![Value::Text("b".into())])
            .to_spec()
            .unwrap_err();
        assert!(err.to_string().contains("Only the last clustering component"));

        let err = SliceQuery::new(&meta)
            .unwrap()
            .partition_components(vec![Value::BigInt(10)])
            .from_clusterings(vec![Value::Text("a".into()), Value::Int(1), Value::Int(2)])
            .to_spec()
            .unwrap_err();
        assert!(err.is_config());
    }
}
