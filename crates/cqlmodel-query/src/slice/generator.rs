//! Compile a [`SliceQuerySpec`] into a single select or delete statement.
//!
//! Fixed components become equality predicates in declared order. The
//! varying component gets one predicate per present bound, start first:
//!
//! | ordering   | start      | end        |
//! |------------|------------|------------|
//! | ascending  | `>=` / `>` | `<=` / `<` |
//! | descending | `<=` / `<` | `>=` / `>` |
//!
//! The inclusive operator is used when the bounding mode makes that side
//! inclusive. Delete statements carry the fixed prefix only.

use super::spec::{OrderingMode, SliceQuerySpec};
use crate::clause::{Limit, OrderBy, Predicate, Relation, WhereClause};
use cqlmodel_core::{Error, Result, Value};

/// Output of the generator.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceStatement {
    query: String,
    predicate: String,
    values: Vec<Value>,
    fetch_size: Option<usize>,
}

impl SliceStatement {
    /// Full statement text.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// WHERE clause text, without the `WHERE` keyword.
    pub fn predicate(&self) -> &str {
        &self.predicate
    }

    /// Positionally bound values, in marker order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn fetch_size(&self) -> Option<usize> {
        self.fetch_size
    }

    pub fn into_parts(self) -> (String, Vec<Value>, Option<usize>) {
        (self.query, self.values, self.fetch_size)
    }
}

/// Generate the select form.
pub fn generate_select(spec: &SliceQuerySpec) -> Result<SliceStatement> {
    let mut clause = fixed_clause(spec)?;
    for predicate in varying_predicates(spec)? {
        clause.push(predicate);
    }
    let (predicate, values) = clause.build();

    let columns = if spec.columns.is_empty() {
        "*".to_string()
    } else {
        spec.columns.join(",")
    };
    let mut query = format!("SELECT {columns} FROM {} WHERE {predicate}", spec.table);
    if spec.ordering == OrderingMode::Descending {
        if let Some(column) = spec.order_column.as_ref().or(spec.varying.as_ref()) {
            query.push(' ');
            query.push_str(&OrderBy::desc(column.as_str()).to_cql());
        }
    }
    if let Some(limit) = spec.limit {
        query.push(' ');
        query.push_str(&Limit(limit).to_cql());
    }
    query.push(';');

    tracing::trace!(table = %spec.table, query = %query, "Generated slice select");

    Ok(SliceStatement {
        query,
        predicate,
        values,
        fetch_size: spec.batch_size,
    })
}

/// Generate the delete form. Only the fixed prefix is used.
pub fn generate_delete(spec: &SliceQuerySpec) -> Result<SliceStatement> {
    let (predicate, values) = fixed_clause(spec)?.build();
    let query = format!("DELETE FROM {} WHERE {predicate};", spec.table);

    tracing::trace!(table = %spec.table, query = %query, "Generated slice delete");

    Ok(SliceStatement {
        query,
        predicate,
        values,
        fetch_size: None,
    })
}

fn fixed_clause(spec: &SliceQuerySpec) -> Result<WhereClause> {
    if spec.table.trim().is_empty() {
        return Err(Error::config("The slice query table name should not be blank"));
    }
    if spec.fixed.is_empty() {
        return Err(Error::config(format!(
            "The slice query on table '{}' should have at least one fixed component",
            spec.table
        )));
    }

    let mut clause = WhereClause::new();
    for (column, value) in &spec.fixed {
        if column.trim().is_empty() {
            return Err(Error::config(format!(
                "The slice query on table '{}' has a fixed component without column name",
                spec.table
            )));
        }
        if value.is_null() {
            return Err(Error::config(format!(
                "The fixed component '{column}' of the slice query on table '{}' should not be null",
                spec.table
            )));
        }
        clause.push(Predicate::new(column.as_str(), Relation::Eq, value.clone()));
    }
    Ok(clause)
}

fn varying_predicates(spec: &SliceQuerySpec) -> Result<Vec<Predicate>> {
    if spec.start.is_none() && spec.end.is_none() {
        return Ok(Vec::new());
    }
    let column = match spec.varying.as_deref() {
        Some(column) if !column.trim().is_empty() => column,
        _ => {
            return Err(Error::config(format!(
                "The slice query on table '{}' has range bounds but no varying component name",
                spec.table
            )));
        }
    };

    let start_inclusive = spec.bounding.is_start_inclusive();
    let end_inclusive = spec.bounding.is_end_inclusive();
    let (start_relation, end_relation) = match spec.ordering {
        OrderingMode::Ascending => (
            if start_inclusive { Relation::Gte } else { Relation::Gt },
            if end_inclusive { Relation::Lte } else { Relation::Lt },
        ),
        OrderingMode::Descending => (
            if start_inclusive { Relation::Lte } else { Relation::Lt },
            if end_inclusive { Relation::Gte } else { Relation::Gt },
        ),
    };

    let mut predicates = Vec::with_capacity(2);
    if let Some(start) = &spec.start {
        predicates.push(Predicate::new(column, start_relation, start.clone()));
    }
    if let Some(end) = &spec.end {
        predicates.push(Predicate::new(column, end_relation, end.clone()));
    }
    Ok(predicates)
}
