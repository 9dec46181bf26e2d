//! Range query specification.

use cqlmodel_core::Value;

/// Direction a slice is read in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderingMode {
    #[default]
    Ascending,
    Descending,
}

/// Which ends of the range are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoundingMode {
    #[default]
    InclusiveBounds,
    ExclusiveBounds,
    InclusiveStartBoundOnly,
    InclusiveEndBoundOnly,
}

impl BoundingMode {
    pub const fn is_start_inclusive(&self) -> bool {
        matches!(
            self,
            BoundingMode::InclusiveBounds | BoundingMode::InclusiveStartBoundOnly
        )
    }

    pub const fn is_end_inclusive(&self) -> bool {
        matches!(
            self,
            BoundingMode::InclusiveBounds | BoundingMode::InclusiveEndBoundOnly
        )
    }
}

/// Everything the slice generator needs to compile one statement.
///
/// `fixed` holds the equality prefix in declared order. At most one
/// component varies, bounded by `start` and/or `end`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SliceQuerySpec {
    pub(crate) table: String,
    pub(crate) columns: Vec<String>,
    pub(crate) fixed: Vec<(String, Value)>,
    pub(crate) varying: Option<String>,
    pub(crate) start: Option<Value>,
    pub(crate) end: Option<Value>,
    pub(crate) ordering: OrderingMode,
    pub(crate) bounding: BoundingMode,
    pub(crate) order_column: Option<String>,
    pub(crate) limit: Option<usize>,
    pub(crate) batch_size: Option<usize>,
}

impl SliceQuerySpec {
    /// Start a spec on `table`, selecting every column.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// Columns to select. Empty means `*`.
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Append one equality component.
    pub fn fixed(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fixed.push((column.into(), value.into()));
        self
    }

    /// Name of the component the range applies to.
    pub fn varying(mut self, column: impl Into<String>) -> Self {
        self.varying = Some(column.into());
        self
    }

    pub fn start(mut self, value: impl Into<Value>) -> Self {
        self.start = Some(value.into());
        self
    }

    pub fn end(mut self, value: impl Into<Value>) -> Self {
        self.end = Some(value.into());
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

    /// Column named in `ORDER BY ... DESC` for descending reads.
    pub fn order_column(mut self, column: impl Into<String>) -> Self {
        self.order_column = Some(column.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Page size, sent as the fetch size hint.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn fixed_components(&self) -> &[(String, Value)] {
        &self.fixed
    }

    pub fn varying_component(&self) -> Option<&str> {
        self.varying.as_deref()
    }

    pub fn start_bound(&self) -> Option<&Value> {
        self.start.as_ref()
    }

    pub fn end_bound(&self) -> Option<&Value> {
        self.end.as_ref()
    }

    pub fn ordering_mode(&self) -> OrderingMode {
        self.ordering
    }

    pub fn bounding_mode(&self) -> BoundingMode {
        self.bounding
    }

    pub fn limit_value(&self) -> Option<usize> {
        self.limit
    }

    pub fn batch_size_value(&self) -> Option<usize> {
        self.batch_size
    }
}
