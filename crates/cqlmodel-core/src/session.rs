//! Session executor capability.
//!
//! The persistence pipeline never talks to a driver directly. It builds
//! [`Statement`]s and hands them to a [`CqlSession`], one at a time or as an
//! atomic batch group.

use crate::consistency::ConsistencyLevel;
use crate::row::Row;
use crate::value::Value;
use asupersync::{Cx, Outcome};
use std::future::Future;
use std::sync::Arc;

/// A prepared statement handle.
///
/// Prepared statements are compiled once by the cluster and executed many
/// times with different bound values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedStatement {
    /// Unique identifier for this prepared statement (driver-specific)
    id: u64,
    /// The original statement text
    query: Arc<str>,
}

impl PreparedStatement {
    /// Create a new prepared statement.
    ///
    /// This is typically called by the driver, not by users directly.
    #[must_use]
    pub fn new(id: u64, query: impl Into<Arc<str>>) -> Self {
        Self {
            id,
            query: query.into(),
        }
    }

    /// Get the statement ID.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Get the original statement text.
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Number of bind markers (`?` or `:name`) in the statement text.
    #[must_use]
    pub fn marker_count(&self) -> usize {
        count_markers(&self.query)
    }
}

fn count_markers(query: &str) -> usize {
    let bytes = query.as_bytes();
    let mut count = 0;
    let mut in_literal = false;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'\'' => in_literal = !in_literal,
            b'?' if !in_literal => count += 1,
            b':' if !in_literal => {
                if bytes.get(i + 1).is_some_and(|c| c.is_ascii_alphabetic() || *c == b'_') {
                    count += 1;
                }
            }
            _ => {}
        }
    }
    count
}

/// What a statement executes: raw text or a prepared handle.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementBody {
    Query(String),
    Prepared(PreparedStatement),
}

/// One executable unit sent to the session.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    body: StatementBody,
    values: Vec<Value>,
    consistency: ConsistencyLevel,
    fetch_size: Option<usize>,
    timestamp: Option<i64>,
}

impl Statement {
    /// A regular (unprepared) statement.
    pub fn simple(query: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            body: StatementBody::Query(query.into()),
            values,
            consistency: ConsistencyLevel::default(),
            fetch_size: None,
            timestamp: None,
        }
    }

    /// A prepared statement bound with values.
    pub fn prepared(prepared: PreparedStatement, values: Vec<Value>) -> Self {
        Self {
            body: StatementBody::Prepared(prepared),
            values,
            consistency: ConsistencyLevel::default(),
            fetch_size: None,
            timestamp: None,
        }
    }

    #[must_use]
    pub fn with_consistency(mut self, level: ConsistencyLevel) -> Self {
        self.consistency = level;
        self
    }

    #[must_use]
    pub fn with_fetch_size(mut self, fetch_size: Option<usize>) -> Self {
        self.fetch_size = fetch_size;
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: Option<i64>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn body(&self) -> &StatementBody {
        &self.body
    }

    /// The statement text, whether regular or prepared.
    pub fn query(&self) -> &str {
        match &self.body {
            StatementBody::Query(query) => query,
            StatementBody::Prepared(prepared) => prepared.query(),
        }
    }

    pub fn is_prepared(&self) -> bool {
        matches!(self.body, StatementBody::Prepared(_))
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn consistency(&self) -> ConsistencyLevel {
        self.consistency
    }

    pub fn fetch_size(&self) -> Option<usize> {
        self.fetch_size
    }

    pub fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }
}

/// Kind of atomic batch group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchType {
    /// Regular mutations, applied atomically
    Logged,
    /// Counter mutations; cannot share a group with regular mutations
    Counter,
}

impl BatchType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            BatchType::Logged => "LOGGED",
            BatchType::Counter => "COUNTER",
        }
    }
}

/// A session able to execute statements against the cluster.
///
/// All operations are async and take a `Cx` context for cancellation/timeout
/// support. Implementations must be `Send + Sync`; one session is shared
/// read-only by every persistence context.
pub trait CqlSession: Send + Sync {
    /// Prepare a statement for repeated execution.
    fn prepare(
        &self,
        cx: &Cx,
        query: &str,
    ) -> impl Future<Output = Outcome<PreparedStatement, crate::Error>> + Send;

    /// Execute one statement and return its rows (empty for writes).
    fn execute(
        &self,
        cx: &Cx,
        statement: &Statement,
    ) -> impl Future<Output = Outcome<Vec<Row>, crate::Error>> + Send;

    /// Execute a group of statements atomically at the given level.
    fn execute_batch(
        &self,
        cx: &Cx,
        batch_type: BatchType,
        statements: &[Statement],
        level: ConsistencyLevel,
    ) -> impl Future<Output = Outcome<(), crate::Error>> + Send;
}
