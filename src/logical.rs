//! Logical statement built by the modeler: what the statement asks for,
//! with every name bound to the catalog, before any access path or
//! distribution decision.

use serde::Serialize;

use crate::plan::{ColumnAssignment, Expr, SortKey};
use crate::value::ValueType;

/// Statement kinds the planner compiles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum StatementKind {
    /// `SELECT`
    Select,
    /// `INSERT`
    Insert,
    /// `UPDATE`
    Update,
    /// `DELETE`
    Delete,
}

impl StatementKind {
    /// True for `SELECT`.
    pub fn is_read_only(self) -> bool {
        self == StatementKind::Select
    }
}

/// Table in scope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TableRef {
    /// Catalog name.
    pub table: String,
    /// Alias; the table name when none was written.
    pub alias: String,
}

/// One column of the statement's result.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DisplayColumn {
    /// Source table name; empty for computed columns.
    pub table_name: String,
    /// Source table alias; empty for computed columns.
    pub table_alias: String,
    /// Source column name; the output alias for computed columns.
    pub column_name: String,
    /// Output alias.
    pub alias: String,
    /// Value.
    pub expr: Expr,
}

/// Bound form of a statement.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LogicalStatement {
    /// Statement text.
    pub sql: String,
    /// Statement kind.
    pub kind: StatementKind,
    /// Tables in FROM order; the target table for DML.
    pub tables: Vec<TableRef>,
    /// Manual join order as aliases, when one was supplied.
    pub join_order: Option<Vec<String>>,
    /// Result columns of a select.
    pub display_columns: Vec<DisplayColumn>,
    /// WHERE / ON conjuncts.
    pub predicates: Vec<Expr>,
    /// GROUP BY columns.
    pub group_by: Vec<Expr>,
    /// ORDER BY terms.
    pub order_by: Vec<SortKey>,
    /// LIMIT.
    pub limit: Option<u64>,
    /// OFFSET.
    pub offset: Option<u64>,
    /// SELECT DISTINCT.
    pub distinct: bool,
    /// Column values of an insert (every table column, in order) or the
    /// SET list of an update.
    pub assignments: Vec<ColumnAssignment>,
    /// Type of every parameter slot.
    pub param_types: Vec<ValueType>,
}

impl LogicalStatement {
    /// True for selects.
    pub fn is_read_only(&self) -> bool {
        self.kind.is_read_only()
    }

    /// Number of tables in scope.
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Target table of DML; first table of a select.
    pub fn target(&self) -> Option<&TableRef> {
        self.tables.first()
    }

    /// Table in scope by alias.
    pub fn table_by_alias(&self, alias: &str) -> Option<&TableRef> {
        self.tables.iter().find(|t| t.alias == alias)
    }

    /// True when the select aggregates: an aggregate call in the display
    /// list or ORDER BY, or a GROUP BY clause.
    pub fn has_aggregation(&self) -> bool {
        !self.group_by.is_empty()
            || self.display_columns.iter().any(|c| c.expr.contains_aggregate())
            || self.order_by.iter().any(|k| k.expr.contains_aggregate())
    }
}
