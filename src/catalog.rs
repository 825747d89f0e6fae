//! Schema catalog consulted by the modeler, assembler and cost model.
//!
//! Table, column and index names are stored upper-cased, matching the
//! identifiers the parser produces.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::{read_file, ConfigError};
use crate::value::ValueType;

/// Row estimate used when a catalog entry does not provide one.
pub const DEFAULT_ESTIMATED_ROWS: u64 = 1_000;

/// Read-only view of the schema.
pub trait CatalogProvider: Send + Sync {
    /// Looks up a table by (upper-case) name.
    fn table(&self, name: &str) -> Option<&TableDef>;
    /// All table names in sorted order.
    fn table_names(&self) -> Vec<String>;
}

/// Column definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Declared type.
    #[serde(rename = "type")]
    pub ty: ValueType,
    /// Whether NULL may be stored.
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

/// Secondary or primary index over a prefix of columns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexDef {
    /// Index name.
    pub name: String,
    /// Indexed columns, most significant first.
    pub columns: Vec<String>,
    /// Whether the full key identifies at most one row.
    #[serde(default)]
    pub unique: bool,
}

/// Table definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    /// Table name.
    pub name: String,
    /// Columns in storage order.
    pub columns: Vec<ColumnDef>,
    /// Partitioning column; `None` for replicated tables.
    #[serde(default)]
    pub partition_column: Option<String>,
    /// Indexes available for access path selection.
    #[serde(default)]
    pub indexes: Vec<IndexDef>,
    /// Row count estimate for costing.
    #[serde(default = "default_estimated_rows")]
    pub estimated_rows: u64,
}

fn default_nullable() -> bool {
    true
}

fn default_estimated_rows() -> u64 {
    DEFAULT_ESTIMATED_ROWS
}

impl TableDef {
    /// Creates an empty replicated table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().to_ascii_uppercase(),
            columns: Vec::new(),
            partition_column: None,
            indexes: Vec::new(),
            estimated_rows: DEFAULT_ESTIMATED_ROWS,
        }
    }

    /// Appends a nullable column.
    pub fn with_column(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        self.columns.push(ColumnDef {
            name: name.into().to_ascii_uppercase(),
            ty,
            nullable: true,
        });
        self
    }

    /// Appends a NOT NULL column.
    pub fn with_required_column(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        self.columns.push(ColumnDef {
            name: name.into().to_ascii_uppercase(),
            ty,
            nullable: false,
        });
        self
    }

    /// Partitions the table on `column`.
    pub fn partitioned_on(mut self, column: impl Into<String>) -> Self {
        self.partition_column = Some(column.into().to_ascii_uppercase());
        self
    }

    /// Registers an index.
    pub fn with_index<I, S>(mut self, name: impl Into<String>, columns: I, unique: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indexes.push(IndexDef {
            name: name.into().to_ascii_uppercase(),
            columns: columns
                .into_iter()
                .map(|c| c.into().to_ascii_uppercase())
                .collect(),
            unique,
        });
        self
    }

    /// Sets the row estimate.
    pub fn with_estimated_rows(mut self, rows: u64) -> Self {
        self.estimated_rows = rows;
        self
    }

    /// Position and definition of a column.
    pub fn column(&self, name: &str) -> Option<(usize, &ColumnDef)> {
        self.columns.iter().enumerate().find(|(_, c)| c.name == name)
    }

    /// Index definition by name.
    pub fn index(&self, name: &str) -> Option<&IndexDef> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// True when every partition holds a full copy.
    pub fn is_replicated(&self) -> bool {
        self.partition_column.is_none()
    }

    /// Position of the partitioning column.
    pub fn partition_column_index(&self) -> Option<usize> {
        let name = self.partition_column.as_deref()?;
        self.column(name).map(|(idx, _)| idx)
    }

    fn normalize(&mut self) {
        self.name = self.name.to_ascii_uppercase();
        for column in &mut self.columns {
            column.name = column.name.to_ascii_uppercase();
        }
        if let Some(col) = self.partition_column.as_mut() {
            *col = col.to_ascii_uppercase();
        }
        for index in &mut self.indexes {
            index.name = index.name.to_ascii_uppercase();
            for col in &mut index.columns {
                *col = col.to_ascii_uppercase();
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.columns.is_empty() {
            return Err(ConfigError::Catalog(format!("table {} has no columns", self.name)));
        }
        for (i, column) in self.columns.iter().enumerate() {
            if self.columns[..i].iter().any(|c| c.name == column.name) {
                return Err(ConfigError::Catalog(format!(
                    "table {} declares column {} twice",
                    self.name, column.name
                )));
            }
        }
        if let Some(col) = &self.partition_column {
            if self.column(col).is_none() {
                return Err(ConfigError::Catalog(format!(
                    "table {} is partitioned on unknown column {col}",
                    self.name
                )));
            }
        }
        for index in &self.indexes {
            if index.columns.is_empty() {
                return Err(ConfigError::Catalog(format!(
                    "index {} on {} has no columns",
                    index.name, self.name
                )));
            }
            if let Some(missing) = index.columns.iter().find(|c| self.column(c).is_none()) {
                return Err(ConfigError::Catalog(format!(
                    "index {} references unknown column {}.{missing}",
                    index.name, self.name
                )));
            }
        }
        Ok(())
    }
}

/// Catalog held in memory, built fluently or loaded from TOML.
#[derive(Clone, Debug, Default)]
pub struct InMemoryCatalog {
    tables: BTreeMap<String, TableDef>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCatalog {
    tables: Vec<TableDef>,
}

impl InMemoryCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table, replacing one with the same name.
    pub fn with_table(mut self, mut table: TableDef) -> Self {
        table.normalize();
        self.tables.insert(table.name.clone(), table);
        self
    }

    /// Parses a catalog document of `[[tables]]` entries.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Self::parse(source, "<string>")
    }

    /// Reads and parses a catalog file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = read_file(path)?;
        Self::parse(&contents, &path.display().to_string())
    }

    fn parse(source: &str, origin: &str) -> Result<Self, ConfigError> {
        let raw: RawCatalog = toml::from_str(source).map_err(|source| ConfigError::Parse {
            origin: origin.to_string(),
            source,
        })?;
        let mut catalog = Self::new();
        for mut table in raw.tables {
            table.normalize();
            table.validate()?;
            if catalog.tables.contains_key(&table.name) {
                return Err(ConfigError::Catalog(format!(
                    "table {} declared twice",
                    table.name
                )));
            }
            catalog.tables.insert(table.name.clone(), table);
        }
        Ok(catalog)
    }

    /// Number of tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// True when no table is registered.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl CatalogProvider for InMemoryCatalog {
    fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.get(name)
    }

    fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"
[[tables]]
name = "orders"
partition_column = "o_id"
estimated_rows = 50000
columns = [
  { name = "o_id", type = "integer", nullable = false },
  { name = "cust", type = "varchar" },
]
indexes = [{ name = "orders_pk", columns = ["o_id"], unique = true }]

[[tables]]
name = "regions"
columns = [{ name = "r_id", type = "smallint" }]
"#;

    #[test]
    fn toml_catalog_is_normalized() {
        let catalog = InMemoryCatalog::from_toml_str(CATALOG).expect("catalog parses");
        assert_eq!(catalog.table_names(), ["ORDERS", "REGIONS"]);
        let orders = catalog.table("ORDERS").expect("orders");
        assert_eq!(orders.partition_column.as_deref(), Some("O_ID"));
        assert_eq!(orders.partition_column_index(), Some(0));
        assert_eq!(orders.estimated_rows, 50_000);
        assert!(!orders.columns[0].nullable);
        assert_eq!(orders.index("ORDERS_PK").map(|i| i.unique), Some(true));
        let regions = catalog.table("REGIONS").expect("regions");
        assert!(regions.is_replicated());
        assert_eq!(regions.estimated_rows, DEFAULT_ESTIMATED_ROWS);
    }

    #[test]
    fn inconsistent_catalogs_are_rejected() {
        let bad_partition = r#"
[[tables]]
name = "t"
partition_column = "nope"
columns = [{ name = "a", type = "integer" }]
"#;
        assert!(matches!(
            InMemoryCatalog::from_toml_str(bad_partition),
            Err(ConfigError::Catalog(_))
        ));
        let bad_type = r#"
[[tables]]
name = "t"
columns = [{ name = "a", type = "quaternion" }]
"#;
        assert!(matches!(
            InMemoryCatalog::from_toml_str(bad_type),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn builder_upper_cases_names() {
        let catalog = InMemoryCatalog::new().with_table(
            TableDef::new("t")
                .with_column("a", ValueType::Integer)
                .partitioned_on("a")
                .with_index("t_a", ["a"], false),
        );
        let table = catalog.table("T").expect("table");
        assert_eq!(table.column("A").map(|(i, _)| i), Some(0));
        assert_eq!(table.indexes[0].columns, ["A"]);
    }
}
