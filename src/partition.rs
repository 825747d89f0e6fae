//! Partition routing: decides whether a statement runs on one partition or
//! on all of them, and which expression picks the partition.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::catalog::CatalogProvider;
use crate::logical::{LogicalStatement, StatementKind};
use crate::plan::{CmpOp, Expr};
use crate::value::Value;

/// Caller's constraint on routing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionMode {
    /// Route from the statement's predicates and tables.
    #[default]
    Infer,
    /// The caller runs the statement on one partition.
    SinglePartition,
    /// The caller runs the statement on every partition.
    MultiPartition,
}

/// Partitioning inputs shared by every attempt of one statement.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PartitioningContext {
    /// Routing constraint.
    pub mode: PartitionMode,
}

impl PartitioningContext {
    /// Routing inferred from the statement.
    pub fn infer() -> Self {
        Self {
            mode: PartitionMode::Infer,
        }
    }

    /// Single-partition execution regardless of predicates.
    pub fn force_single() -> Self {
        Self {
            mode: PartitionMode::SinglePartition,
        }
    }

    /// Multi-partition execution regardless of predicates.
    pub fn force_multi() -> Self {
        Self {
            mode: PartitionMode::MultiPartition,
        }
    }
}

/// Where a statement executes.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Routing {
    /// One partition, chosen by `key` when present.
    SinglePartition {
        /// Constant or parameter equal to the partition column.
        key: Option<Expr>,
    },
    /// Every partition, coordinated by one site.
    MultiPartition,
}

impl Routing {
    /// True for single-partition routing.
    pub fn is_single_partition(&self) -> bool {
        matches!(self, Routing::SinglePartition { .. })
    }

    /// Partition key expression, if any.
    pub fn key(&self) -> Option<&Expr> {
        match self {
            Routing::SinglePartition { key } => key.as_ref(),
            Routing::MultiPartition => None,
        }
    }
}

/// Error text when partitioned tables are not joined on their partition
/// columns.
pub const INSUFFICIENT_JOIN_CRITERIA: &str =
    "Join of multiple partitioned tables has insufficient join criteria.";

/// Computes the routing of `stmt`.
pub fn analyze_routing(
    stmt: &LogicalStatement,
    catalog: &dyn CatalogProvider,
    ctx: &PartitioningContext,
) -> Result<Routing, String> {
    let partitioned: Vec<(String, String)> = stmt
        .tables
        .iter()
        .filter_map(|t| {
            let def = catalog.table(&t.table)?;
            def.partition_column
                .clone()
                .map(|column| (t.alias.clone(), column))
        })
        .collect();

    let routing = match stmt.kind {
        StatementKind::Select => route_read(stmt, &partitioned, ctx)?,
        StatementKind::Insert => route_insert(stmt, &partitioned)?,
        StatementKind::Update | StatementKind::Delete => route_write(stmt, &partitioned, ctx)?,
    };
    trace!(
        partitioned = partitioned.len(),
        single = routing.is_single_partition(),
        "partition.routing.analyzed"
    );
    Ok(routing)
}

fn route_read(
    stmt: &LogicalStatement,
    partitioned: &[(String, String)],
    ctx: &PartitioningContext,
) -> Result<Routing, String> {
    if partitioned.is_empty() {
        return Ok(Routing::SinglePartition { key: None });
    }
    if ctx.mode == PartitionMode::SinglePartition {
        return Ok(Routing::SinglePartition {
            key: find_partition_key(&stmt.predicates, partitioned),
        });
    }
    if partitioned.len() > 1 && !partition_columns_connected(&stmt.predicates, partitioned) {
        return Err(INSUFFICIENT_JOIN_CRITERIA.to_string());
    }
    if ctx.mode == PartitionMode::MultiPartition {
        return Ok(Routing::MultiPartition);
    }
    Ok(match find_partition_key(&stmt.predicates, partitioned) {
        Some(key) => Routing::SinglePartition { key: Some(key) },
        None => Routing::MultiPartition,
    })
}

fn route_insert(stmt: &LogicalStatement, partitioned: &[(String, String)]) -> Result<Routing, String> {
    let Some((_, column)) = partitioned.first() else {
        return Ok(Routing::MultiPartition);
    };
    let value = stmt
        .assignments
        .iter()
        .find(|a| &a.column == column)
        .map(|a| &a.value)
        .ok_or_else(|| format!("insert provides no value for partitioning column {column}"))?;
    match value {
        Expr::Literal(Value::Null) => Err(format!("partitioning column {column} cannot be NULL")),
        Expr::Literal(_) | Expr::Param { .. } => Ok(Routing::SinglePartition {
            key: Some(value.clone()),
        }),
        _ => Err(format!(
            "value for partitioning column {column} must be a constant or parameter"
        )),
    }
}

fn route_write(
    stmt: &LogicalStatement,
    partitioned: &[(String, String)],
    ctx: &PartitioningContext,
) -> Result<Routing, String> {
    if partitioned.is_empty() {
        if ctx.mode == PartitionMode::SinglePartition {
            return Err("replicated table cannot be modified on a single partition".to_string());
        }
        return Ok(Routing::MultiPartition);
    }
    let key = find_partition_key(&stmt.predicates, partitioned);
    Ok(match (ctx.mode, key) {
        (PartitionMode::MultiPartition, _) => Routing::MultiPartition,
        (PartitionMode::SinglePartition, key) => Routing::SinglePartition { key },
        (PartitionMode::Infer, Some(key)) => Routing::SinglePartition { key: Some(key) },
        (PartitionMode::Infer, None) => Routing::MultiPartition,
    })
}

fn is_partition_column(expr: &Expr, partitioned: &[(String, String)]) -> bool {
    match expr {
        Expr::Column(c) => partitioned
            .iter()
            .any(|(alias, column)| &c.alias == alias && &c.column == column),
        _ => false,
    }
}

/// First `partition column = constant` conjunct, as the constant side.
fn find_partition_key(predicates: &[Expr], partitioned: &[(String, String)]) -> Option<Expr> {
    predicates.iter().find_map(|p| {
        let Expr::Compare {
            op: CmpOp::Eq,
            left,
            right,
        } = p
        else {
            return None;
        };
        let key_side = |column: &Expr, other: &Expr| {
            let constant = matches!(other, Expr::Param { .. })
                || matches!(other, Expr::Literal(v) if !v.is_null());
            (is_partition_column(column, partitioned) && constant).then(|| other.clone())
        };
        key_side(left, right).or_else(|| key_side(right, left))
    })
}

/// True when equality conjuncts between partition columns link every
/// partitioned table in scope.
fn partition_columns_connected(predicates: &[Expr], partitioned: &[(String, String)]) -> bool {
    let mut parent: Vec<usize> = (0..partitioned.len()).collect();
    fn root(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }
    let position = |expr: &Expr| match expr {
        Expr::Column(c) => partitioned
            .iter()
            .position(|(alias, column)| &c.alias == alias && &c.column == column),
        _ => None,
    };
    for predicate in predicates {
        if let Expr::Compare {
            op: CmpOp::Eq,
            left,
            right,
        } = predicate
        {
            if let (Some(a), Some(b)) = (position(left), position(right)) {
                let (ra, rb) = (root(&mut parent, a), root(&mut parent, b));
                parent[ra] = rb;
            }
        }
    }
    let first = root(&mut parent, 0);
    (1..partitioned.len()).all(|i| root(&mut parent, i) == first)
}
