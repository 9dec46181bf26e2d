//! Statement templates generated once per entity type.
//!
//! Templates use named markers (`:column`); the binder supplies values in
//! marker order. The shared simple-counter table uses positional markers.

use crate::clause::WhereClause;
use cqlmodel_core::{EntityMeta, Error, PropertyMeta, Result};

/// Shared table holding every simple counter.
pub const COUNTER_TABLE: &str = "cqlmodel_counter_table";
/// Owning entity class name column.
pub const COUNTER_FQCN: &str = "fqcn";
/// Primary key text column.
pub const COUNTER_PRIMARY_KEY: &str = "primary_key";
/// Counter property name column.
pub const COUNTER_PROPERTY_NAME: &str = "property_name";
/// Counter value column.
pub const COUNTER_VALUE: &str = "counter_value";

/// Key of the whole-row select of a clustered counter entity.
pub const SELECT_ALL: &str = "SELECT_ALL";
/// Key of the whole-row delete of a clustered counter entity.
pub const DELETE_ALL: &str = "DELETE_ALL";

/// The four canonical counter operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterQueryType {
    Incr,
    Decr,
    Select,
    Delete,
}

fn id_where(meta: &EntityMeta) -> String {
    WhereClause::named_equalities(meta.id_column_names()).build().0
}

fn named_assignments<'a>(columns: impl IntoIterator<Item = &'a str>) -> String {
    columns
        .into_iter()
        .map(|c| format!("{c}=:{c}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// `INSERT INTO t(id,name) VALUES (:id,:name) USING TTL :ttl;`
///
/// Key columns first, then every non-id, non-counter property.
pub fn insert_query(meta: &EntityMeta) -> String {
    let mut columns: Vec<&str> = meta.id_column_names();
    columns.extend(
        meta.all_metas_except_id_and_counters()
            .into_iter()
            .map(|pm| pm.name()),
    );
    let markers: Vec<String> = columns.iter().map(|c| format!(":{c}")).collect();
    format!(
        "INSERT INTO {}({}) VALUES ({}) USING TTL :ttl;",
        meta.table_name(),
        columns.join(","),
        markers.join(",")
    )
}

/// `SELECT name FROM t WHERE id=:id;`
///
/// Counters are never read through this path.
pub fn select_field_query(meta: &EntityMeta, pm: &PropertyMeta) -> Result<String> {
    if pm.is_counter() {
        return Err(Error::config(format!(
            "Cannot prepare statement for property '{}' of entity '{}' because it is a counter type",
            pm.name(),
            meta.class_name()
        )));
    }
    Ok(format!(
        "SELECT {} FROM {} WHERE {};",
        pm.column_names().join(","),
        meta.table_name(),
        id_where(meta)
    ))
}

/// Columns read when loading an entity. Empty means `*`.
pub fn entity_select_columns(meta: &EntityMeta) -> Vec<String> {
    if meta.is_clustered_counter() {
        return Vec::new();
    }
    meta.id_column_names()
        .into_iter()
        .map(str::to_string)
        .chain(meta.eager_metas().into_iter().map(|pm| pm.name().to_string()))
        .collect()
}

/// Load one entity by key: key columns plus eager properties.
pub fn select_entity_query(meta: &EntityMeta) -> String {
    let columns = entity_select_columns(meta);
    let columns = if columns.is_empty() {
        "*".to_string()
    } else {
        columns.join(",")
    };
    format!(
        "SELECT {columns} FROM {} WHERE {};",
        meta.table_name(),
        id_where(meta)
    )
}

/// `UPDATE t USING TTL :ttl SET name=:name,age=:age WHERE id=:id;`
pub fn update_fields_query(meta: &EntityMeta, properties: &[&PropertyMeta]) -> String {
    format!(
        "UPDATE {} USING TTL :ttl SET {} WHERE {};",
        meta.table_name(),
        named_assignments(properties.iter().map(|pm| pm.name())),
        id_where(meta)
    )
}

/// Delete templates keyed by table name.
pub fn delete_queries(meta: &EntityMeta) -> Vec<(String, String)> {
    vec![(
        meta.table_name().to_string(),
        format!("DELETE FROM {} WHERE {};", meta.table_name(), id_where(meta)),
    )]
}

/// Statements against the shared simple-counter table.
pub fn simple_counter_queries() -> Vec<(CounterQueryType, String)> {
    let keys = format!(
        "{COUNTER_FQCN} = ? AND {COUNTER_PRIMARY_KEY} = ? AND {COUNTER_PROPERTY_NAME} = ?"
    );
    vec![
        (
            CounterQueryType::Incr,
            format!(
                "UPDATE {COUNTER_TABLE} SET {COUNTER_VALUE} = {COUNTER_VALUE} + ? WHERE {keys}"
            ),
        ),
        (
            CounterQueryType::Decr,
            format!(
                "UPDATE {COUNTER_TABLE} SET {COUNTER_VALUE} = {COUNTER_VALUE} - ? WHERE {keys}"
            ),
        ),
        (
            CounterQueryType::Select,
            format!("SELECT {COUNTER_VALUE} FROM {COUNTER_TABLE} WHERE {keys}"),
        ),
        (
            CounterQueryType::Delete,
            format!("DELETE FROM {COUNTER_TABLE} WHERE {keys}"),
        ),
    ]
}

/// Statements of a clustered counter entity, keyed by operation then
/// property name ([`SELECT_ALL`] / [`DELETE_ALL`] for whole-row statements).
pub fn clustered_counter_queries(meta: &EntityMeta) -> Vec<(CounterQueryType, String, String)> {
    let table = meta.table_name();
    let where_clause = id_where(meta);
    let mut queries = Vec::new();
    for pm in meta.all_counter_metas() {
        let name = pm.name();
        queries.push((
            CounterQueryType::Incr,
            name.to_string(),
            format!("UPDATE {table} SET {name}={name}+:{name} WHERE {where_clause};"),
        ));
        queries.push((
            CounterQueryType::Decr,
            name.to_string(),
            format!("UPDATE {table} SET {name}={name}-:{name} WHERE {where_clause};"),
        ));
        queries.push((
            CounterQueryType::Select,
            name.to_string(),
            format!("SELECT {name} FROM {table} WHERE {where_clause};"),
        ));
    }
    queries.push((
        CounterQueryType::Select,
        SELECT_ALL.to_string(),
        format!("SELECT * FROM {table} WHERE {where_clause};"),
    ));
    queries.push((
        CounterQueryType::Delete,
        DELETE_ALL.to_string(),
        format!("DELETE FROM {table} WHERE {where_clause};"),
    ));
    queries
}

#[cfg(test)]
mod tests {
    use super::*;
    use cqlmodel_core::{CompoundKeyDescriptor, CqlType, KeyComponent, PropertyKind};

    fn simple_meta() -> EntityMeta {
        EntityMeta::builder("CompleteBean", "table")
            .property(PropertyMeta::builder("id", PropertyKind::Id, CqlType::BigInt))
            .property(PropertyMeta::builder("name", PropertyKind::Simple, CqlType::Text))
            .property(PropertyMeta::builder("age", PropertyKind::Simple, CqlType::Int))
            .property(PropertyMeta::builder("count", PropertyKind::Counter, CqlType::Counter))
            .build()
            .unwrap()
    }

    fn clustered_meta() -> EntityMeta {
        EntityMeta::builder("ClusteredEntity", "table")
            .property(
                PropertyMeta::builder("id", PropertyKind::EmbeddedId, CqlType::Custom("Key"))
                    .compound_key(CompoundKeyDescriptor::new(vec![
                        KeyComponent::partition("id", CqlType::BigInt),
                        KeyComponent::clustering("a", CqlType::Uuid),
                        KeyComponent::clustering("b", CqlType::Text),
                    ])),
            )
            .property(PropertyMeta::builder("name", PropertyKind::Simple, CqlType::Text))
            .build()
            .unwrap()
    }

    fn counter_meta() -> EntityMeta {
        EntityMeta::builder("ClusteredCounter", "counterTable")
            .property(
                PropertyMeta::builder("id", PropertyKind::EmbeddedId, CqlType::Custom("Key"))
                    .compound_key(CompoundKeyDescriptor::new(vec![
                        KeyComponent::partition("id", CqlType::BigInt),
                        KeyComponent::clustering("name", CqlType::Text),
                    ])),
            )
            .property(PropertyMeta::builder("count", PropertyKind::Counter, CqlType::Counter))
            .clustered_counter()
            .build()
            .unwrap()
    }

    #[test]
    fn test_insert_query() {
        assert_eq!(
            insert_query(&simple_meta()),
            "INSERT INTO table(id,name,age) VALUES (:id,:name,:age) USING TTL :ttl;"
        );
        assert_eq!(
            insert_query(&clustered_meta()),
            "INSERT INTO table(id,a,b,name) VALUES (:id,:a,:b,:name) USING TTL :ttl;"
        );
    }

    #[test]
    fn test_select_field_query() {
        let meta = simple_meta();
        assert_eq!(
            select_field_query(&meta, meta.property("name").unwrap()).unwrap(),
            "SELECT name FROM table WHERE id=:id;"
        );

        let meta = clustered_meta();
        assert_eq!(
            select_field_query(&meta, meta.id_meta()).unwrap(),
            "SELECT id,a,b FROM table WHERE id=:id AND a=:a AND b=:b;"
        );
    }

    #[test]
    fn test_select_field_rejects_counter() {
        let meta = EntityMeta::builder("entity", "table")
            .property(PropertyMeta::builder("id", PropertyKind::Id, CqlType::BigInt))
            .property(PropertyMeta::builder("count", PropertyKind::Counter, CqlType::Counter))
            .build()
            .unwrap();
        let err = select_field_query(&meta, meta.property("count").unwrap()).unwrap_err();
        assert!(err.is_config());
        assert_eq!(
            err.to_string(),
            "Configuration error: Cannot prepare statement for property 'count' of entity 'entity' because it is a counter type"
        );
    }

    #[test]
    fn test_select_entity_query() {
        assert_eq!(
            select_entity_query(&simple_meta()),
            "SELECT id,name,age FROM table WHERE id=:id;"
        );
        assert_eq!(
            select_entity_query(&clustered_meta()),
            "SELECT id,a,b,name FROM table WHERE id=:id AND a=:a AND b=:b;"
        );
        assert_eq!(
            select_entity_query(&counter_meta()),
            "SELECT * FROM counterTable WHERE id=:id AND name=:name;"
        );
    }

    #[test]
    fn test_update_fields_query() {
        let meta = simple_meta();
        let props = [
            meta.property("name").unwrap().as_ref(),
            meta.property("age").unwrap().as_ref(),
        ];
        assert_eq!(
            update_fields_query(&meta, &props),
            "UPDATE table USING TTL :ttl SET name=:name,age=:age WHERE id=:id;"
        );

        let meta = clustered_meta();
        let props = [meta.property("name").unwrap().as_ref()];
        assert_eq!(
            update_fields_query(&meta, &props),
            "UPDATE table USING TTL :ttl SET name=:name WHERE id=:id AND a=:a AND b=:b;"
        );
    }

    #[test]
    fn test_delete_queries() {
        let deletes = delete_queries(&simple_meta());
        assert_eq!(deletes.len(), 1);
        assert_eq!(deletes[0].0, "table");
        assert_eq!(deletes[0].1, "DELETE FROM table WHERE id=:id;");
    }

    #[test]
    fn test_simple_counter_queries() {
        let queries = simple_counter_queries();
        assert_eq!(queries.len(), 4);
        assert_eq!(
            queries[0].1,
            "UPDATE cqlmodel_counter_table SET counter_value = counter_value + ? WHERE fqcn = ? AND primary_key = ? AND property_name = ?"
        );
        assert_eq!(
            queries[1].1,
            "UPDATE cqlmodel_counter_table SET counter_value = counter_value - ? WHERE fqcn = ? AND primary_key = ? AND property_name = ?"
        );
        assert_eq!(
            queries[2].1,
            "SELECT counter_value FROM cqlmodel_counter_table WHERE fqcn = ? AND primary_key = ? AND property_name = ?"
        );
        assert_eq!(
            queries[3].1,
            "DELETE FROM cqlmodel_counter_table WHERE fqcn = ? AND primary_key = ? AND property_name = ?"
        );
    }

    #[test]
    fn test_clustered_counter_queries() {
        let queries = clustered_counter_queries(&counter_meta());
        let texts: Vec<&str> = queries.iter().map(|(_, _, q)| q.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "UPDATE counterTable SET count=count+:count WHERE id=:id AND name=:name;",
                "UPDATE counterTable SET count=count-:count WHERE id=:id AND name=:name;",
                "SELECT count FROM counterTable WHERE id=:id AND name=:name;",
                "SELECT * FROM counterTable WHERE id=:id AND name=:name;",
                "DELETE FROM counterTable WHERE id=:id AND name=:name;",
            ]
        );
        assert_eq!(queries[3].0, CounterQueryType::Select);
        assert_eq!(queries[3].1, SELECT_ALL);
        assert_eq!(queries[4].1, DELETE_ALL);
    }
}
