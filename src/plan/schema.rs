use serde::Serialize;

use super::expr::ColumnRef;
use crate::value::ValueType;

/// One output column of a plan node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SchemaColumn {
    /// Base table name; empty for derived columns.
    pub table: String,
    /// Table alias; empty for derived columns.
    pub table_alias: String,
    /// Column name (derived columns use their output name).
    pub column: String,
    /// Output alias.
    pub alias: String,
    /// Column type.
    pub ty: ValueType,
}

impl SchemaColumn {
    /// Column read straight from a table; its alias is the column name.
    pub fn table_column(
        table: impl Into<String>,
        table_alias: impl Into<String>,
        column: impl Into<String>,
        ty: ValueType,
    ) -> Self {
        let column = column.into();
        Self {
            table: table.into(),
            table_alias: table_alias.into(),
            alias: column.clone(),
            column,
            ty,
        }
    }

    /// Column computed by a node, e.g. an aggregate or an expression.
    pub fn derived(name: impl Into<String>, ty: ValueType) -> Self {
        let name = name.into();
        Self {
            table: String::new(),
            table_alias: String::new(),
            column: name.clone(),
            alias: name,
            ty,
        }
    }

    /// Replaces the output alias.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    /// Reference to this column for nodes that consume it.
    pub fn to_ref(&self) -> ColumnRef {
        ColumnRef::new(&self.table, &self.table_alias, &self.column, self.ty)
    }
}

/// Ordered output columns of a plan node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct NodeSchema {
    columns: Vec<SchemaColumn>,
}

impl NodeSchema {
    /// Wraps columns.
    pub fn new(columns: Vec<SchemaColumn>) -> Self {
        Self { columns }
    }

    /// Columns in order.
    pub fn columns(&self) -> &[SchemaColumn] {
        &self.columns
    }

    /// Column at `index`.
    pub fn get(&self, index: usize) -> Option<&SchemaColumn> {
        self.columns.get(index)
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True when the schema has no column.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Left columns followed by right columns, as a join produces them.
    pub fn join(&self, right: &NodeSchema) -> NodeSchema {
        let mut columns = self.columns.clone();
        columns.extend(right.columns.iter().cloned());
        NodeSchema { columns }
    }

    /// Locates a display column, trying the most specific match first:
    /// all four names, then table + alias + column, then table + column,
    /// then output alias alone.
    pub fn find(&self, table: &str, table_alias: &str, column: &str, alias: &str) -> Option<usize> {
        let tiers: [&dyn Fn(&SchemaColumn) -> bool; 4] = [
            &|c| {
                c.table == table && c.table_alias == table_alias && c.column == column && c.alias == alias
            },
            &|c| c.table == table && c.table_alias == table_alias && c.column == column,
            &|c| c.table == table && c.column == column,
            &|c| c.alias == alias,
        ];
        tiers
            .iter()
            .find_map(|matches| self.columns.iter().position(|c| matches(c)))
    }

    /// Position of the column a reference names. Unqualified references
    /// fall back to output aliases; several distinct matches are ambiguous.
    pub fn resolve(&self, reference: &ColumnRef) -> Result<usize, String> {
        let mut candidates: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| {
                c.column == reference.column
                    && (reference.table.is_empty() || c.table == reference.table)
                    && (reference.alias.is_empty() || c.table_alias == reference.alias)
            })
            .map(|(i, _)| i)
            .collect();
        if candidates.is_empty() && reference.table.is_empty() && reference.alias.is_empty() {
            candidates = self
                .columns
                .iter()
                .enumerate()
                .filter(|(_, c)| c.alias == reference.column)
                .map(|(i, _)| i)
                .collect();
        }
        let first = match candidates.first() {
            Some(first) => *first,
            None => return Err(format!("column {} is not produced by the input", describe(reference))),
        };
        let head = &self.columns[first];
        let ambiguous = candidates[1..].iter().any(|&i| {
            let other = &self.columns[i];
            other.table != head.table || other.table_alias != head.table_alias || other.column != head.column
        });
        if ambiguous {
            return Err(format!("column {} is ambiguous in the input", describe(reference)));
        }
        Ok(first)
    }
}

fn describe(reference: &ColumnRef) -> String {
    if reference.alias.is_empty() {
        reference.column.clone()
    } else {
        format!("{}.{}", reference.alias, reference.column)
    }
}
