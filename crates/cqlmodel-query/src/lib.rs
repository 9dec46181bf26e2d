//! Statement generation for CQLModel Rust.
//!
//! `cqlmodel-query` is the **statement construction layer**. It turns entity
//! metadata into CQL text plus bound values and never talks to the cluster
//! itself:
//!
//! - **Statement wrappers**: the unit of work executed immediately or batched,
//!   with DML logging.
//! - **Slice queries**: range predicates over clustering components.
//! - **Prepared templates**: insert/select/update/delete and counter statements
//!   generated once per entity type.
//! - **Typed queries**: validation of hand-written queries and index conditions.
//!
//! The resulting statements execute through the `CqlSession` trait from
//! `cqlmodel-core`, driven by `cqlmodel-session`.

pub mod cache;
pub mod clause;
pub mod prepared;
pub mod slice;
pub mod typed;
pub mod wrapper;

pub use cache::{PreparedStatementCache, StatementKey};
pub use clause::{Limit, Operand, OrderBy, Predicate, Relation, WhereClause};
pub use prepared::CounterQueryType;
pub use slice::{
    BoundingMode, OrderingMode, SliceQuery, SliceQuerySpec, SliceStatement, generate_delete,
    generate_select,
};
pub use typed::{IndexCondition, TypedQueryValidator};
pub use wrapper::{DML_LOG_TARGET, StatementWrapper, WrappedStatement};
