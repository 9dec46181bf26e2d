//! Statement wrappers: one unit of work for immediate execution or batching.
//!
//! A wrapper pairs a statement (raw text or prepared handle) with its bound
//! values and the consistency level it is sent with, and knows how to write
//! itself to the DML log.

use cqlmodel_core::{BatchType, ConsistencyLevel, PreparedStatement, Statement, Value};

/// Tracing target for executed statements.
///
/// Enable it (`RUST_LOG=cqlmodel::dml=debug`) to see every statement sent
/// to the cluster.
pub const DML_LOG_TARGET: &str = "cqlmodel::dml";

/// What a wrapper executes.
#[derive(Debug, Clone, PartialEq)]
pub enum WrappedStatement {
    /// A prepared statement with bound values
    Bound { prepared: PreparedStatement },
    /// A regular statement built at call time
    Regular {
        query: String,
        fetch_size: Option<usize>,
    },
}

/// Immutable statement plus bound values.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementWrapper {
    statement: WrappedStatement,
    values: Vec<Value>,
    consistency: ConsistencyLevel,
    timestamp: Option<i64>,
}

impl StatementWrapper {
    /// Wrap a prepared statement.
    pub fn bound(
        prepared: PreparedStatement,
        values: Vec<Value>,
        consistency: ConsistencyLevel,
    ) -> Self {
        Self {
            statement: WrappedStatement::Bound { prepared },
            values,
            consistency,
            timestamp: None,
        }
    }

    /// Wrap a regular statement.
    pub fn regular(
        query: impl Into<String>,
        values: Vec<Value>,
        consistency: ConsistencyLevel,
    ) -> Self {
        Self {
            statement: WrappedStatement::Regular {
                query: query.into(),
                fetch_size: None,
            },
            values,
            consistency,
            timestamp: None,
        }
    }

    /// Set the fetch size hint. Ignored for prepared statements.
    #[must_use]
    pub fn with_fetch_size(mut self, size: Option<usize>) -> Self {
        if let WrappedStatement::Regular { fetch_size, .. } = &mut self.statement {
            *fetch_size = size;
        }
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: Option<i64>) -> Self {
        self.timestamp = timestamp;
        self
    }

    #[must_use]
    pub fn with_consistency(mut self, consistency: ConsistencyLevel) -> Self {
        self.consistency = consistency;
        self
    }

    pub fn statement(&self) -> &WrappedStatement {
        &self.statement
    }

    pub fn query(&self) -> &str {
        match &self.statement {
            WrappedStatement::Bound { prepared } => prepared.query(),
            WrappedStatement::Regular { query, .. } => query,
        }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn consistency(&self) -> ConsistencyLevel {
        self.consistency
    }

    pub fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }

    pub fn fetch_size(&self) -> Option<usize> {
        match &self.statement {
            WrappedStatement::Regular { fetch_size, .. } => *fetch_size,
            WrappedStatement::Bound { .. } => None,
        }
    }

    /// Label used in the DML log.
    pub fn kind_label(&self) -> &'static str {
        match self.statement {
            WrappedStatement::Bound { .. } => "Prepared statement",
            WrappedStatement::Regular { .. } => "Simple query",
        }
    }

    /// Build the executor statement.
    pub fn to_statement(&self) -> Statement {
        let statement = match &self.statement {
            WrappedStatement::Bound { prepared } => {
                Statement::prepared(prepared.clone(), self.values.clone())
            }
            WrappedStatement::Regular { query, fetch_size } => {
                Statement::simple(query.clone(), self.values.clone()).with_fetch_size(*fetch_size)
            }
        };
        statement
            .with_consistency(self.consistency)
            .with_timestamp(self.timestamp)
    }

    /// Write this statement to the DML log.
    pub fn log_dml(&self) {
        tracing::debug!(
            target: DML_LOG_TARGET,
            "{} : [{}] with consistency level [{}]",
            self.kind_label(),
            self.query(),
            self.consistency
        );
        if !self.values.is_empty() {
            tracing::trace!(target: DML_LOG_TARGET, values = ?self.values, "bound values");
        }
    }
}

/// Log the start of a batch group.
pub fn log_batch_start(batch_type: BatchType, count: usize) {
    tracing::debug!(
        target: DML_LOG_TARGET,
        batch = batch_type.as_str(),
        count,
        "******BATCH START******"
    );
}

/// Log the end of a batch group.
pub fn log_batch_end(batch_type: BatchType, level: ConsistencyLevel) {
    tracing::debug!(
        target: DML_LOG_TARGET,
        batch = batch_type.as_str(),
        "******BATCH END with consistency level [{}] ******",
        level
    );
}
