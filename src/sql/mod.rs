//! Statement text to intermediate tree.
//!
//! The planner never looks at SQL text directly; it consumes the attributed
//! [`Element`] tree produced by a [`StatementParser`]. [`SqlParser`] covers
//! the SQL subset the reference pipeline understands.

#![forbid(unsafe_code)]

/// Tokenizer for the SQL subset.
pub mod lexer;
/// Recursive-descent parser producing intermediate trees.
pub mod parser;
/// Attributed tree shared by the parser, parameterizer and modeler.
pub mod tree;

use thiserror::Error;

pub use parser::SqlParser;
pub use tree::Element;

/// Parser rejection with the byte offset where it happened.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("syntax error at position {position}: {message}")]
pub struct SyntaxError {
    /// Human-readable reason.
    pub message: String,
    /// Byte offset into the statement text.
    pub position: usize,
}

impl SyntaxError {
    /// Creates a syntax error at `position`.
    pub fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

/// Turns statement text into an intermediate tree.
pub trait StatementParser: Send + Sync {
    /// Parses one statement.
    fn parse(&self, sql: &str) -> Result<Element, SyntaxError>;
}

/// Element and attribute names used in intermediate trees.
pub mod names {
    /// Root of a SELECT statement.
    pub const SELECT: &str = "select";
    /// Root of an INSERT statement.
    pub const INSERT: &str = "insert";
    /// Root of an UPDATE statement.
    pub const UPDATE: &str = "update";
    /// Root of a DELETE statement.
    pub const DELETE: &str = "delete";
    /// Display columns of a select, or assigned columns of DML.
    pub const COLUMNS: &str = "columns";
    /// One assigned column of an insert or update.
    pub const COLUMN: &str = "column";
    /// Parameter slot list.
    pub const PARAMETERS: &str = "parameters";
    /// One parameter slot.
    pub const PARAMETER: &str = "parameter";
    /// FROM list.
    pub const TABLESCANS: &str = "tablescans";
    /// One FROM entry.
    pub const TABLESCAN: &str = "tablescan";
    /// WHERE clause (JOIN ... ON folded in).
    pub const QUERYCONDITION: &str = "querycondition";
    /// GROUP BY list.
    pub const GROUPCOLUMNS: &str = "groupcolumns";
    /// ORDER BY list.
    pub const ORDERCOLUMNS: &str = "ordercolumns";
    /// One ORDER BY term.
    pub const ORDERBY: &str = "orderby";
    /// Column reference.
    pub const COLUMNREF: &str = "columnref";
    /// Literal or parameter marker.
    pub const VALUE: &str = "value";
    /// Operator application.
    pub const OPERATION: &str = "operation";
    /// Aggregate call.
    pub const AGGREGATION: &str = "aggregation";
    /// `*` or `t.*` in a select list.
    pub const STAR: &str = "star";

    /// Marks a `value` element as a parameter slot.
    pub const ATTR_ISPARAM: &str = "isparam";
    /// Slot index of a parameter marker.
    pub const ATTR_INDEX: &str = "index";
    /// Literal kind of a `value` element.
    pub const ATTR_VALUETYPE: &str = "valuetype";
    /// Literal text of a `value` element.
    pub const ATTR_VALUE: &str = "value";
    /// Table name or qualifier.
    pub const ATTR_TABLE: &str = "table";
    /// Table alias or output column alias.
    pub const ATTR_ALIAS: &str = "alias";
    /// Column name.
    pub const ATTR_COLUMN: &str = "column";
    /// Assigned column name of DML.
    pub const ATTR_NAME: &str = "name";
    /// Operator or aggregate function.
    pub const ATTR_OPTYPE: &str = "optype";
    /// DISTINCT flag on selects and aggregates.
    pub const ATTR_DISTINCT: &str = "distinct";
    /// `COUNT(*)` marker on aggregates.
    pub const ATTR_STAR: &str = "star";
    /// Descending flag on ORDER BY terms.
    pub const ATTR_DESC: &str = "desc";
    /// LIMIT row count.
    pub const ATTR_LIMIT: &str = "limit";
    /// OFFSET row count.
    pub const ATTR_OFFSET: &str = "offset";
}
