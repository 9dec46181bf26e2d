//! CQL clause types (WHERE predicates, ORDER BY, LIMIT).

use cqlmodel_core::Value;

/// Comparison used by a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Relation {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Relation::Eq => "=",
            Relation::Gt => ">",
            Relation::Gte => ">=",
            Relation::Lt => "<",
            Relation::Lte => "<=",
        }
    }
}

/// Right-hand side of a predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Written inline into the statement text
    Literal(String),
    /// Bound positionally as `?`
    Bound(Value),
    /// Bound by name as `:column`
    Named,
}

/// One `column <op> operand` predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    column: String,
    relation: Relation,
    operand: Operand,
}

impl Predicate {
    /// Predicate on a value. Numbers and booleans are inlined, anything
    /// else is bound as `?`.
    pub fn new(column: impl Into<String>, relation: Relation, value: Value) -> Self {
        let operand = match value.to_cql_literal() {
            Some(literal) if value.is_inline_literal() => Operand::Literal(literal),
            _ => Operand::Bound(value),
        };
        Self {
            column: column.into(),
            relation,
            operand,
        }
    }

    /// Predicate bound by name (`column=:column`).
    pub fn named(column: impl Into<String>, relation: Relation) -> Self {
        Self {
            column: column.into(),
            relation,
            operand: Operand::Named,
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn relation(&self) -> Relation {
        self.relation
    }

    pub fn operand(&self) -> &Operand {
        &self.operand
    }

    /// Render the predicate text.
    pub fn to_cql(&self) -> String {
        let rhs = match &self.operand {
            Operand::Literal(literal) => literal.clone(),
            Operand::Bound(_) => "?".to_string(),
            Operand::Named => format!(":{}", self.column),
        };
        format!("{}{}{}", self.column, self.relation.as_str(), rhs)
    }
}

/// Conjunction of predicates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereClause {
    predicates: Vec<Predicate>,
}

impl WhereClause {
    pub fn new() -> Self {
        Self::default()
    }

    /// Equality on every column, bound by name.
    pub fn named_equalities<'a>(columns: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            predicates: columns
                .into_iter()
                .map(|column| Predicate::named(column, Relation::Eq))
                .collect(),
        }
    }

    /// Add a predicate.
    pub fn and(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn push(&mut self, predicate: Predicate) {
        self.predicates.push(predicate);
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Build the predicate text and the positionally bound values, in order.
    pub fn build(&self) -> (String, Vec<Value>) {
        let text = self
            .predicates
            .iter()
            .map(Predicate::to_cql)
            .collect::<Vec<_>>()
            .join(" AND ");
        let values = self
            .predicates
            .iter()
            .filter_map(|p| match &p.operand {
                Operand::Bound(value) => Some(value.clone()),
                _ => None,
            })
            .collect();
        (text, values)
    }
}

/// ORDER BY on a clustering column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    column: String,
    descending: bool,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }

    pub fn to_cql(&self) -> String {
        format!(
            "ORDER BY {} {}",
            self.column,
            if self.descending { "DESC" } else { "ASC" }
        )
    }
}

/// LIMIT clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit(pub usize);

impl Limit {
    pub fn to_cql(self) -> String {
        format!("LIMIT {}", self.0)
    }
}
