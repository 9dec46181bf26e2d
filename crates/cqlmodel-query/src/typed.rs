//! Typed and indexed queries.

use crate::clause::{Predicate, Relation};
use cqlmodel_core::{EntityMeta, Error, Result, ValidationErrorKind, Value};
use regex::Regex;
use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

/// Compiled query patterns, keyed by source text. Patterns depend only on
/// table and key column names, so the map stays as small as the set of
/// registered entities.
struct PatternCache {
    compiled: RwLock<HashMap<String, Regex>>,
}

impl PatternCache {
    fn get_or_compile(&self, source: &str) -> Result<Regex> {
        {
            let compiled = self.compiled.read().unwrap_or_else(|e| e.into_inner());
            if let Some(regex) = compiled.get(source) {
                return Ok(regex.clone());
            }
        }
        let regex = Regex::new(source)
            .map_err(|e| Error::config(format!("Invalid query pattern '{source}': {e}")))?;
        self.compiled
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(source.to_string(), regex.clone());
        Ok(regex)
    }
}

fn pattern(source: &str) -> Result<Regex> {
    static CACHE: OnceLock<PatternCache> = OnceLock::new();
    CACHE
        .get_or_init(|| PatternCache {
            compiled: RwLock::new(HashMap::new()),
        })
        .get_or_compile(source)
}

const SELECT_ALL: &str = r"(?i)^\s*select\s+\*";

fn invalid_query(message: String) -> Error {
    Error::validation("query", ValidationErrorKind::Custom, message)
}

/// Checks that a hand-written query can be mapped back to an entity.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypedQueryValidator;

impl TypedQueryValidator {
    /// The query must read from the entity's table, and select its whole
    /// primary key unless it is a `SELECT *`.
    pub fn validate_typed_query(&self, meta: &EntityMeta, query: &str) -> Result<()> {
        tracing::debug!(query, entity = meta.class_name(), "Validate typed query");
        self.validate_raw_typed_query(meta, query)?;

        if pattern(SELECT_ALL)?.is_match(query) {
            return Ok(());
        }
        for column in meta.id_column_names() {
            let selected = pattern(&format!(r"(?i)\b{}\b", regex::escape(column)))?;
            if !selected.is_match(query) {
                let message = if meta.has_compound_key() {
                    format!(
                        "The typed query [{query}] should contain the component column '{column}' for compound key of entity '{}'",
                        meta.class_name()
                    )
                } else {
                    format!("The typed query [{query}] should contain the id column '{column}'")
                };
                return Err(invalid_query(message));
            }
        }
        Ok(())
    }

    /// The query must contain `FROM <table>`.
    pub fn validate_raw_typed_query(&self, meta: &EntityMeta, query: &str) -> Result<()> {
        tracing::debug!(query, entity = meta.class_name(), "Validate raw typed query");
        let table = meta.table_name();
        let from = pattern(&format!(r"(?i)\bfrom\s+{}\b", regex::escape(table)))?;
        if from.is_match(query) {
            Ok(())
        } else {
            Err(invalid_query(format!(
                "The typed query [{query}] should contain the ' from {}' clause if type is '{}'",
                table.to_lowercase(),
                meta.class_name()
            )))
        }
    }
}

/// Equality condition on a secondary index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexCondition {
    column: String,
    value: Value,
    relation: Relation,
}

impl IndexCondition {
    pub fn new(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
            relation: Relation::Eq,
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn relation(&self) -> Relation {
        self.relation
    }

    /// Check the column name and value.
    pub fn validate(&self) -> Result<()> {
        if self.column.trim().is_empty() {
            return Err(Error::validation(
                "column",
                ValidationErrorKind::Blank,
                "Column name for index condition should not be blank",
            ));
        }
        if self.value.is_null() {
            return Err(Error::validation(
                "value",
                ValidationErrorKind::Required,
                "Column value for index condition should not be null",
            ));
        }
        Ok(())
    }

    /// `SELECT * FROM t WHERE col=:col;` with the value to bind.
    pub fn to_query(&self, meta: &EntityMeta) -> Result<(String, Vec<Value>)> {
        if meta.is_clustered() {
            return Err(Error::config("Index query is not supported for clustered entity"));
        }
        self.validate()?;
        let predicate = Predicate::named(self.column.as_str(), self.relation);
        Ok((
            format!(
                "SELECT * FROM {} WHERE {};",
                meta.table_name(),
                predicate.to_cql()
            ),
            vec![self.value.clone()],
        ))
    }
}
