//! Reference evaluator for compiled plans.
//!
//! Runs plans over small in-memory partitioned datasets so a fragmented
//! plan can be checked against its unfragmented form. It favours
//! obviousness over speed and never mutates the dataset: DML nodes report
//! the number of rows they would modify.

mod exec;
mod scalar;

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;
use tracing::trace;
use xxhash_rust::xxh64::xxh64;

use crate::catalog::{CatalogProvider, TableDef};
use crate::compiled::CompiledPlan;
use crate::fragment::FragmentSite;
use crate::ids::{PartitionId, PlanNodeId};
use crate::param::ParameterSet;
use crate::plan::PlanNode;
use crate::value::Value;

use exec::{Executor, FragmentInputs, ScanScope};

/// One tuple, positionally matching its producer's output schema.
pub type Row = Vec<Value>;

/// Seed of the partition hash.
pub const PARTITION_HASH_SEED: u64 = 0;

/// Evaluation failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// Scan of a table the dataset does not hold.
    #[error("unknown table '{0}'")]
    UnknownTable(String),
    /// Index scan over an index the table does not define.
    #[error("unknown index '{0}'")]
    UnknownIndex(String),
    /// Row width differs from the table definition.
    #[error("row for {table} has {found} values, expected {expected}")]
    Arity {
        /// Table name.
        table: String,
        /// Column count.
        expected: usize,
        /// Values supplied.
        found: usize,
    },
    /// Column reference without a usable position.
    #[error("unresolved column {0}")]
    UnresolvedColumn(String),
    /// Parameter slot without a value.
    #[error("no value for parameter {0}")]
    MissingParameter(usize),
    /// Cut `Receive` whose producer has not run.
    #[error("no input for RECEIVE node {0}")]
    MissingInput(PlanNodeId),
    /// Integer overflow.
    #[error("integer overflow")]
    Overflow,
    /// Integer division by zero.
    #[error("division by zero")]
    DivisionByZero,
    /// Operand of the wrong type.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    /// Plan shape the evaluator cannot run.
    #[error("malformed plan: {0}")]
    MalformedPlan(String),
}

struct TableData {
    def: TableDef,
    /// One vector per partition; replicated tables keep a single copy.
    partitions: Vec<Vec<Row>>,
}

/// Rows per table, hash-partitioned on each table's partition column.
pub struct Dataset {
    partition_count: u32,
    tables: BTreeMap<String, TableData>,
}

impl Dataset {
    /// Empty dataset over `partition_count` partitions (at least one).
    pub fn new(partition_count: u32) -> Self {
        Self {
            partition_count: partition_count.max(1),
            tables: BTreeMap::new(),
        }
    }

    /// Registers every table of `catalog` with no rows.
    pub fn with_catalog(partition_count: u32, catalog: &dyn CatalogProvider) -> Self {
        let mut data = Self::new(partition_count);
        for name in catalog.table_names() {
            if let Some(def) = catalog.table(&name) {
                data.register(def);
            }
        }
        data
    }

    /// Number of partitions.
    pub fn partition_count(&self) -> u32 {
        self.partition_count
    }

    /// Registers `def` if it is not known yet.
    pub fn register(&mut self, def: &TableDef) {
        let slots = if def.is_replicated() {
            1
        } else {
            self.partition_count as usize
        };
        self.tables.entry(def.name.clone()).or_insert_with(|| TableData {
            def: def.clone(),
            partitions: vec![Vec::new(); slots],
        });
    }

    /// Adds rows to `def`'s table, routing each by its partition column.
    pub fn insert_rows<I>(&mut self, def: &TableDef, rows: I) -> Result<(), EvalError>
    where
        I: IntoIterator<Item = Row>,
    {
        self.register(def);
        let partition_column = def.partition_column_index();
        let expected = def.columns.len();
        let count = self.partition_count;
        let data = self
            .tables
            .get_mut(&def.name)
            .ok_or_else(|| EvalError::UnknownTable(def.name.clone()))?;
        for row in rows {
            if row.len() != expected {
                return Err(EvalError::Arity {
                    table: def.name.clone(),
                    expected,
                    found: row.len(),
                });
            }
            let slot = match partition_column {
                Some(pos) => hash_partition(count, &row[pos]).0 as usize,
                None => 0,
            };
            data.partitions[slot].push(row);
        }
        Ok(())
    }

    /// Partition holding rows whose partition column equals `value`.
    pub fn partition_for(&self, value: &Value) -> PartitionId {
        hash_partition(self.partition_count, value)
    }

    /// Rows of `table` stored on `partition`; all rows of a replicated
    /// table.
    pub fn rows_on(&self, table: &str, partition: PartitionId) -> Result<Vec<Row>, EvalError> {
        self.scan(table, ScanScope::Partition(partition))
    }

    fn table_def(&self, table: &str) -> Result<&TableDef, EvalError> {
        self.tables
            .get(table)
            .map(|t| &t.def)
            .ok_or_else(|| EvalError::UnknownTable(table.to_string()))
    }

    fn scan(&self, table: &str, scope: ScanScope) -> Result<Vec<Row>, EvalError> {
        let data = self
            .tables
            .get(table)
            .ok_or_else(|| EvalError::UnknownTable(table.to_string()))?;
        if data.def.is_replicated() {
            return Ok(data.partitions.concat());
        }
        Ok(match scope {
            ScanScope::AllPartitions => data.partitions.concat(),
            ScanScope::Partition(p) => data.partitions.get(p.0 as usize).cloned().unwrap_or_default(),
        })
    }
}

fn hash_partition(count: u32, value: &Value) -> PartitionId {
    let hash = xxh64(&value.key_bytes(), PARTITION_HASH_SEED);
    PartitionId((hash % u64::from(count.max(1))) as u32)
}

/// Runs an unfragmented plan: scans read every partition and `Send` /
/// `Receive` pass rows through.
pub fn evaluate_plan(root: &PlanNode, data: &Dataset, params: &ParameterSet) -> Result<Vec<Row>, EvalError> {
    Executor {
        data,
        params,
        scope: ScanScope::AllPartitions,
        inputs: None,
    }
    .run(root)
}

/// Runs a compiled plan fragment by fragment, producers first.
///
/// `AllPartitions` fragments run once per partition and their outputs are
/// concatenated in partition order. A `SinglePartition` fragment runs on
/// the partition its key routes to, or partition 0 when the plan has no
/// key.
pub fn evaluate_fragments(plan: &CompiledPlan, data: &Dataset, params: &ParameterSet) -> Result<Vec<Row>, EvalError> {
    let graph = &plan.fragments;
    let mut outputs: HashMap<_, Vec<Row>> = HashMap::new();
    for id in graph.dependency_order() {
        let fragment = graph
            .fragment(id)
            .ok_or_else(|| EvalError::MalformedPlan(format!("fragment {id} is missing")))?;
        let run = |scope: ScanScope| {
            Executor {
                data,
                params,
                scope,
                inputs: Some(FragmentInputs {
                    graph,
                    outputs: &outputs,
                }),
            }
            .run(&fragment.root)
        };
        let rows = match fragment.site {
            FragmentSite::AllPartitions => {
                let mut rows = Vec::new();
                for p in 0..data.partition_count() {
                    rows.extend(run(ScanScope::Partition(PartitionId(p)))?);
                }
                rows
            }
            FragmentSite::SinglePartition => {
                let partition = match &plan.partition_key {
                    Some(key) => data.partition_for(&scalar::eval(key, &[], params)?),
                    None => PartitionId(0),
                };
                run(ScanScope::Partition(partition))?
            }
            FragmentSite::Coordinator => run(ScanScope::AllPartitions)?,
        };
        trace!(fragment = %id, rows = rows.len(), "eval.fragment.completed");
        outputs.insert(id, rows);
    }
    let root = graph
        .root_fragment()
        .ok_or_else(|| EvalError::MalformedPlan("plan has no fragments".into()))?;
    outputs
        .remove(&root.id)
        .ok_or_else(|| EvalError::MalformedPlan("root fragment produced no output".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueType;

    fn partitioned() -> TableDef {
        TableDef::new("P")
            .with_required_column("ID", ValueType::Integer)
            .with_column("V", ValueType::Varchar)
            .partitioned_on("ID")
    }

    #[test]
    fn rows_land_on_their_hash_partition() {
        let def = partitioned();
        let mut data = Dataset::new(4);
        let rows: Vec<Row> = (0..20).map(|i| vec![Value::Int(i), Value::from("x")]).collect();
        data.insert_rows(&def, rows).expect("inserts");
        let mut total = 0;
        for p in 0..4 {
            let on_partition = data.rows_on("P", PartitionId(p)).expect("scans");
            for row in &on_partition {
                assert_eq!(data.partition_for(&row[0]), PartitionId(p));
            }
            total += on_partition.len();
        }
        assert_eq!(total, 20);
    }

    #[test]
    fn replicated_rows_are_visible_everywhere() {
        let def = TableDef::new("R").with_column("A", ValueType::Integer);
        let mut data = Dataset::new(3);
        data.insert_rows(&def, vec![vec![Value::Int(1)], vec![Value::Int(2)]])
            .expect("inserts");
        for p in 0..3 {
            assert_eq!(data.rows_on("R", PartitionId(p)).expect("scans").len(), 2);
        }
    }

    #[test]
    fn arity_is_checked() {
        let mut data = Dataset::new(2);
        let err = data
            .insert_rows(&partitioned(), vec![vec![Value::Int(1)]])
            .expect_err("short row");
        assert!(matches!(err, EvalError::Arity { expected: 2, found: 1, .. }));
        assert!(matches!(data.rows_on("NOPE", PartitionId(0)), Err(EvalError::UnknownTable(_))));
    }
}
