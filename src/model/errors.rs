#![allow(missing_docs)]

use std::fmt;

use thiserror::Error;

use crate::value::ValueType;

/// Structured errors emitted while binding a statement tree to the catalog.
///
/// Every variant carries a machine-readable [`code`](ModelError::code) so
/// callers can tell catalog resolution failures from unsupported shapes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Root element is not a statement the planner compiles.
    #[error("unsupported statement '{kind}'")]
    UnsupportedStatement { kind: String },
    /// Tree is missing an element or attribute the modeler requires.
    #[error("malformed statement tree: {detail}")]
    MalformedTree { detail: String },
    /// Referenced table does not exist.
    #[error("unknown table '{table}'")]
    UnknownTable { table: String },
    /// Two FROM entries share an alias.
    #[error("table alias '{alias}' is used more than once")]
    DuplicateTableAlias { alias: String },
    /// Referenced column does not exist in any table in scope.
    #[error("unknown column '{column}'")]
    UnknownColumn { column: String },
    /// Unqualified column exists in several tables in scope.
    #[error("column '{column}' is ambiguous")]
    AmbiguousColumn { column: String },
    /// A column was listed twice in an INSERT or SET list.
    #[error("column '{column}' is assigned more than once")]
    DuplicateColumn { column: String },
    /// Positional INSERT supplied the wrong number of values.
    #[error("table '{table}' has {expected} columns but {found} values were supplied")]
    ColumnCountMismatch {
        table: String,
        expected: usize,
        found: usize,
    },
    /// NOT NULL column left without a value.
    #[error("column '{column}' requires a value")]
    MissingColumnValue { column: String },
    /// NULL assigned to a NOT NULL column.
    #[error("column '{column}' does not accept NULL")]
    NullNotAllowed { column: String },
    /// Aggregate call inside WHERE or ON.
    #[error("aggregate functions are not allowed in WHERE or ON clauses")]
    AggregateInWhere,
    /// Aggregate call nested in another aggregate.
    #[error("aggregate functions cannot be nested")]
    NestedAggregate,
    /// Display or ORDER BY column is neither grouped nor aggregated.
    #[error("column '{column}' must appear in GROUP BY or inside an aggregate")]
    NonGroupedColumn { column: String },
    /// GROUP BY term is not a plain column.
    #[error("GROUP BY term '{term}' must be a column reference")]
    UnsupportedGroupBy { term: String },
    /// ORDER BY term of a DISTINCT select is not a display column.
    #[error("ORDER BY term '{term}' must appear in the select list of a DISTINCT query")]
    OrderByNotInSelect { term: String },
    /// UPDATE assigns the partitioning column.
    #[error("cannot update partitioning column '{column}' of table '{table}'")]
    PartitionColumnUpdate { table: String, column: String },
    /// Manual join order does not name every table exactly once.
    #[error("invalid join order '{order}': {detail}")]
    InvalidJoinOrder { order: String, detail: String },
    /// Parameter slot has no type from context or literal.
    #[error("cannot infer the type of parameter {index}")]
    UntypedParameter { index: usize },
    /// Literal or expression type is incompatible with its context.
    #[error("type mismatch: {context}")]
    TypeMismatch { context: String },
    /// Aggregate applied to an argument it cannot take.
    #[error("{func} requires a numeric argument, got {found}")]
    NonNumericAggregate { func: &'static str, found: ValueType },
}

impl ModelError {
    /// Builds a [`ModelError::MalformedTree`].
    pub fn malformed(detail: impl Into<String>) -> Self {
        ModelError::MalformedTree {
            detail: detail.into(),
        }
    }

    /// Builds a [`ModelError::TypeMismatch`].
    pub fn type_mismatch(context: impl Into<String>) -> Self {
        ModelError::TypeMismatch {
            context: context.into(),
        }
    }

    /// Formats the error as `[Code] message`.
    pub fn with_code(&self) -> ModelErrorWithCode<'_> {
        ModelErrorWithCode(self)
    }

    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            ModelError::UnsupportedStatement { .. } => "UnsupportedStatement",
            ModelError::MalformedTree { .. } => "MalformedTree",
            ModelError::UnknownTable { .. } => "UnknownTable",
            ModelError::DuplicateTableAlias { .. } => "DuplicateTableAlias",
            ModelError::UnknownColumn { .. } => "UnknownColumn",
            ModelError::AmbiguousColumn { .. } => "AmbiguousColumn",
            ModelError::DuplicateColumn { .. } => "DuplicateColumn",
            ModelError::ColumnCountMismatch { .. } => "ColumnCountMismatch",
            ModelError::MissingColumnValue { .. } => "MissingColumnValue",
            ModelError::NullNotAllowed { .. } => "NullNotAllowed",
            ModelError::AggregateInWhere => "AggregateInWhere",
            ModelError::NestedAggregate => "NestedAggregate",
            ModelError::NonGroupedColumn { .. } => "NonGroupedColumn",
            ModelError::UnsupportedGroupBy { .. } => "UnsupportedGroupBy",
            ModelError::OrderByNotInSelect { .. } => "OrderByNotInSelect",
            ModelError::PartitionColumnUpdate { .. } => "PartitionColumnUpdate",
            ModelError::InvalidJoinOrder { .. } => "InvalidJoinOrder",
            ModelError::UntypedParameter { .. } => "UntypedParameter",
            ModelError::TypeMismatch { .. } => "TypeMismatch",
            ModelError::NonNumericAggregate { .. } => "TypeMismatch",
        }
    }
}

/// Convenience wrapper that formats modeling errors with their codes.
pub struct ModelErrorWithCode<'a>(pub &'a ModelError);

impl fmt::Display for ModelErrorWithCode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.0.code(), self.0)
    }
}
