use std::fmt::Write as _;

use serde::Serialize;

use super::expr::{AggFunc, Expr};
use super::schema::{NodeSchema, SchemaColumn};
use crate::catalog::CatalogProvider;
use crate::ids::{PlanNodeId, PlanNodeIdAllocator};
use crate::value::ValueType;

/// Output column of every DML node.
pub const MODIFIED_TUPLES: &str = "MODIFIED_TUPLES";

/// Where an aggregate node sits relative to the distribution boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AggregatePhase {
    /// Whole aggregation in one node.
    Single,
    /// Per-partition pre-aggregation below a `Send`.
    Partial,
    /// Coordinator-side combination of partial results.
    Final,
}

/// Aggregate computed by an aggregate node.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AggregateColumn {
    /// Function.
    pub func: AggFunc,
    /// Argument; `None` for `COUNT(*)`.
    pub arg: Option<Expr>,
    /// `DISTINCT` inside the call.
    pub distinct: bool,
    /// Output column name.
    pub output: String,
    /// Result type.
    pub ty: ValueType,
}

/// Expression computed by a projection, with the column it produces.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProjectedColumn {
    /// Value.
    pub expr: Expr,
    /// Produced column.
    pub column: SchemaColumn,
}

/// One ordering term.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SortKey {
    /// Sort expression.
    pub expr: Expr,
    /// Descending when set.
    pub descending: bool,
}

/// Column assignment of an INSERT or UPDATE.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ColumnAssignment {
    /// Column name.
    pub column: String,
    /// Column position in the table.
    pub position: usize,
    /// Assigned value.
    pub value: Expr,
}

/// Operator of a plan node.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum PlanNodeKind {
    /// Full scan of a table with an optional filter.
    SeqScan {
        /// Table name.
        table: String,
        /// Alias in scope.
        alias: String,
        /// Residual filter.
        predicate: Option<Expr>,
    },
    /// Equality lookup on a prefix of an index.
    IndexScan {
        /// Table name.
        table: String,
        /// Alias in scope.
        alias: String,
        /// Index name.
        index: String,
        /// Key values for the leading index columns.
        keys: Vec<Expr>,
        /// Residual filter.
        predicate: Option<Expr>,
    },
    /// Nested-loop inner join of its two children.
    NestLoop {
        /// Join filter over the concatenated row.
        predicate: Option<Expr>,
    },
    /// Grouped or scalar aggregation.
    Aggregate {
        /// Position relative to the distribution boundary.
        phase: AggregatePhase,
        /// Grouping columns.
        group_by: Vec<Expr>,
        /// Aggregates, in output order after the grouping columns.
        aggregates: Vec<AggregateColumn>,
    },
    /// Computes the display columns.
    Projection {
        /// Output expressions.
        columns: Vec<ProjectedColumn>,
    },
    /// Sorts its input.
    OrderBy {
        /// Sort terms, most significant first.
        keys: Vec<SortKey>,
    },
    /// Skips `offset` rows then passes at most `limit` rows.
    Limit {
        /// Maximum rows; `None` for no cap.
        limit: Option<u64>,
        /// Rows to skip.
        offset: u64,
    },
    /// Removes duplicate rows.
    Distinct,
    /// Ships its input to the consumer fragment.
    Send,
    /// Collects rows from a producer fragment.
    Receive,
    /// Inserts one row.
    Insert {
        /// Target table.
        table: String,
        /// Value per table column, in column order.
        values: Vec<Expr>,
    },
    /// Updates the rows its child produces.
    Update {
        /// Target table.
        table: String,
        /// Alias of the scanned table.
        alias: String,
        /// Assigned columns.
        assignments: Vec<ColumnAssignment>,
    },
    /// Deletes the rows its child produces.
    Delete {
        /// Target table.
        table: String,
    },
}

/// Node of a physical plan.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlanNode {
    /// Attempt-local identifier.
    pub id: PlanNodeId,
    /// Operator.
    pub kind: PlanNodeKind,
    /// Inputs.
    pub children: Vec<PlanNode>,
    /// Output schema; set once by resolution.
    pub output_schema: Option<NodeSchema>,
}

impl PlanNode {
    /// Leaf node with a fresh id.
    pub fn leaf(ids: &mut PlanNodeIdAllocator, kind: PlanNodeKind) -> Self {
        Self::with_children(ids, kind, Vec::new())
    }

    /// Node over `child` with a fresh id.
    pub fn unary(ids: &mut PlanNodeIdAllocator, kind: PlanNodeKind, child: PlanNode) -> Self {
        Self::with_children(ids, kind, vec![child])
    }

    /// Node with a fresh id.
    pub fn with_children(
        ids: &mut PlanNodeIdAllocator,
        kind: PlanNodeKind,
        children: Vec<PlanNode>,
    ) -> Self {
        Self {
            id: ids.next_id(),
            kind,
            children,
            output_schema: None,
        }
    }

    /// Upper-case operator name.
    pub fn op_name(&self) -> &'static str {
        match self.kind {
            PlanNodeKind::SeqScan { .. } => "SEQSCAN",
            PlanNodeKind::IndexScan { .. } => "INDEXSCAN",
            PlanNodeKind::NestLoop { .. } => "NESTLOOP",
            PlanNodeKind::Aggregate { .. } => "AGGREGATE",
            PlanNodeKind::Projection { .. } => "PROJECTION",
            PlanNodeKind::OrderBy { .. } => "ORDERBY",
            PlanNodeKind::Limit { .. } => "LIMIT",
            PlanNodeKind::Distinct => "DISTINCT",
            PlanNodeKind::Send => "SEND",
            PlanNodeKind::Receive => "RECEIVE",
            PlanNodeKind::Insert { .. } => "INSERT",
            PlanNodeKind::Update { .. } => "UPDATE",
            PlanNodeKind::Delete { .. } => "DELETE",
        }
    }

    /// True for INSERT / UPDATE / DELETE.
    pub fn is_dml(&self) -> bool {
        matches!(
            self.kind,
            PlanNodeKind::Insert { .. } | PlanNodeKind::Update { .. } | PlanNodeKind::Delete { .. }
        )
    }

    /// True when no node of the tree modifies data.
    pub fn is_read_only(&self) -> bool {
        let mut read_only = true;
        self.walk(&mut |n| read_only &= !n.is_dml());
        read_only
    }

    /// Pre-order visit.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a PlanNode)) {
        f(self);
        for child in &self.children {
            child.walk(f);
        }
    }

    /// Ids in pre-order.
    pub fn node_ids(&self) -> Vec<PlanNodeId> {
        let mut ids = Vec::new();
        self.walk(&mut |n| ids.push(n.id));
        ids
    }

    /// Node with the given id.
    pub fn find(&self, id: PlanNodeId) -> Option<&PlanNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }

    /// Reassigns ids in pre-order from `ids`.
    pub fn renumber(&mut self, ids: &mut PlanNodeIdAllocator) {
        self.id = ids.next_id();
        for child in &mut self.children {
            child.renumber(ids);
        }
    }

    /// Operator skeleton, e.g. `SEND(PROJECTION(SEQSCAN[T]))`. Expressions
    /// and ids are left out, so a plan and its parameterized twin share a
    /// shape.
    pub fn shape(&self) -> String {
        let mut out = String::new();
        self.write_shape(&mut out);
        out
    }

    fn write_shape(&self, out: &mut String) {
        out.push_str(self.op_name());
        match &self.kind {
            PlanNodeKind::SeqScan { table, alias, .. } => {
                let _ = write!(out, "[{table} {alias}]");
            }
            PlanNodeKind::IndexScan {
                table,
                alias,
                index,
                keys,
                ..
            } => {
                let _ = write!(out, "[{table} {alias} {index}/{}]", keys.len());
            }
            PlanNodeKind::Aggregate { phase, .. } => {
                let _ = write!(out, "[{phase:?}]");
            }
            PlanNodeKind::Insert { table, .. }
            | PlanNodeKind::Update { table, .. }
            | PlanNodeKind::Delete { table } => {
                let _ = write!(out, "[{table}]");
            }
            _ => {}
        }
        if !self.children.is_empty() {
            out.push('(');
            for (i, child) in self.children.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                child.write_shape(out);
            }
            out.push(')');
        }
    }

    /// Output schema; `None` before resolution.
    pub fn output_schema(&self) -> Option<&NodeSchema> {
        self.output_schema.as_ref()
    }

    fn child_schema(&self, index: usize) -> Result<&NodeSchema, String> {
        let child = self
            .children
            .get(index)
            .ok_or_else(|| format!("{} node {} is missing input {index}", self.op_name(), self.id))?;
        child
            .output_schema
            .as_ref()
            .ok_or_else(|| format!("input of {} node {} has no schema", self.op_name(), self.id))
    }

    /// Derives this node's output schema from its children's schemas and
    /// its own semantics. Children must already carry schemas.
    pub(crate) fn generate_output_schema(&mut self, catalog: &dyn CatalogProvider) -> Result<(), String> {
        let schema = match &self.kind {
            PlanNodeKind::SeqScan { table, alias, .. } | PlanNodeKind::IndexScan { table, alias, .. } => {
                let def = catalog
                    .table(table)
                    .ok_or_else(|| format!("scan of unknown table {table}"))?;
                NodeSchema::new(
                    def.columns
                        .iter()
                        .map(|c| SchemaColumn::table_column(table.as_str(), alias.as_str(), c.name.as_str(), c.ty))
                        .collect(),
                )
            }
            PlanNodeKind::NestLoop { .. } => self.child_schema(0)?.join(self.child_schema(1)?),
            PlanNodeKind::Aggregate {
                group_by,
                aggregates,
                ..
            } => {
                let input = self.child_schema(0)?;
                let mut columns = Vec::with_capacity(group_by.len() + aggregates.len());
                for expr in group_by {
                    let Expr::Column(reference) = expr else {
                        return Err(format!("group by term {expr} is not a column"));
                    };
                    let position = input.resolve(reference)?;
                    columns.push(input.columns()[position].clone());
                }
                for agg in aggregates {
                    columns.push(SchemaColumn::derived(agg.output.as_str(), agg.ty));
                }
                NodeSchema::new(columns)
            }
            PlanNodeKind::Projection { columns } => {
                NodeSchema::new(columns.iter().map(|c| c.column.clone()).collect())
            }
            PlanNodeKind::OrderBy { .. }
            | PlanNodeKind::Limit { .. }
            | PlanNodeKind::Distinct
            | PlanNodeKind::Send
            | PlanNodeKind::Receive => self.child_schema(0)?.clone(),
            PlanNodeKind::Insert { .. } | PlanNodeKind::Update { .. } | PlanNodeKind::Delete { .. } => {
                NodeSchema::new(vec![SchemaColumn::derived(MODIFIED_TUPLES, ValueType::BigInt)])
            }
        };
        self.output_schema = Some(schema);
        Ok(())
    }

    /// Binds every column reference held by this node to a position in the
    /// schema it reads: its own schema for scans and joins, its input's
    /// schema otherwise.
    pub(crate) fn resolve_column_indexes(&mut self) -> Result<(), String> {
        let PlanNode {
            kind,
            children,
            output_schema,
            ..
        } = self;
        let own = output_schema.as_ref();
        let input = children.first().and_then(|c| c.output_schema.as_ref());
        let need = |schema: Option<&NodeSchema>| {
            schema.cloned().ok_or_else(|| "column resolution ran before schema generation".to_string())
        };
        match kind {
            PlanNodeKind::SeqScan { predicate, .. } | PlanNodeKind::NestLoop { predicate } => {
                if let Some(predicate) = predicate {
                    predicate.resolve_indexes(&need(own)?)?;
                }
            }
            PlanNodeKind::IndexScan { keys, predicate, .. } => {
                let schema = need(own)?;
                for key in keys {
                    key.resolve_indexes(&schema)?;
                }
                if let Some(predicate) = predicate {
                    predicate.resolve_indexes(&schema)?;
                }
            }
            PlanNodeKind::Aggregate {
                group_by,
                aggregates,
                ..
            } => {
                let schema = need(input)?;
                for expr in group_by {
                    expr.resolve_indexes(&schema)?;
                }
                for agg in aggregates {
                    if let Some(arg) = agg.arg.as_mut() {
                        arg.resolve_indexes(&schema)?;
                    }
                }
            }
            PlanNodeKind::Projection { columns } => {
                let schema = need(input)?;
                for column in columns {
                    column.expr.resolve_indexes(&schema)?;
                }
            }
            PlanNodeKind::OrderBy { keys } => {
                let schema = need(input)?;
                for key in keys {
                    key.expr.resolve_indexes(&schema)?;
                }
            }
            PlanNodeKind::Update { assignments, .. } => {
                let schema = need(input)?;
                for assignment in assignments {
                    assignment.value.resolve_indexes(&schema)?;
                }
            }
            PlanNodeKind::Insert { values, .. } => {
                let empty = NodeSchema::default();
                for value in values {
                    value.resolve_indexes(&empty)?;
                }
            }
            PlanNodeKind::Limit { .. }
            | PlanNodeKind::Distinct
            | PlanNodeKind::Send
            | PlanNodeKind::Receive
            | PlanNodeKind::Delete { .. } => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{InMemoryCatalog, TableDef};
    use crate::plan::expr::CmpOp;
    use crate::value::Value;

    fn catalog() -> InMemoryCatalog {
        InMemoryCatalog::new()
            .with_table(
                TableDef::new("T")
                    .with_column("A", ValueType::Integer)
                    .with_column("B", ValueType::Varchar),
            )
            .with_table(TableDef::new("U").with_column("A", ValueType::Integer))
    }

    fn scan(ids: &mut PlanNodeIdAllocator, table: &str, predicate: Option<Expr>) -> PlanNode {
        PlanNode::leaf(
            ids,
            PlanNodeKind::SeqScan {
                table: table.into(),
                alias: table.into(),
                predicate,
            },
        )
    }

    fn resolve_all(node: &mut PlanNode, catalog: &dyn CatalogProvider) -> Result<(), String> {
        for child in &mut node.children {
            resolve_all(child, catalog)?;
        }
        node.generate_output_schema(catalog)?;
        node.resolve_column_indexes()
    }

    #[test]
    fn join_schema_concatenates_and_predicate_resolves() {
        let catalog = catalog();
        let mut ids = PlanNodeIdAllocator::new();
        let pred = Expr::compare(
            CmpOp::Eq,
            Expr::column("T", "T", "A", ValueType::Integer),
            Expr::column("U", "U", "A", ValueType::Integer),
        );
        let left = scan(&mut ids, "T", None);
        let right = scan(&mut ids, "U", None);
        let mut join = PlanNode::with_children(
            &mut ids,
            PlanNodeKind::NestLoop {
                predicate: Some(pred),
            },
            vec![left, right],
        );
        resolve_all(&mut join, &catalog).expect("resolves");
        assert_eq!(join.output_schema().map(NodeSchema::len), Some(3));
        let PlanNodeKind::NestLoop { predicate: Some(pred) } = &join.kind else {
            panic!("unexpected kind: {:?}", join.kind);
        };
        let indexes: Vec<_> = pred.column_refs().iter().map(|c| c.index).collect();
        assert_eq!(indexes, [Some(0), Some(2)]);
    }

    #[test]
    fn aggregate_keeps_group_column_identity() {
        let catalog = catalog();
        let mut ids = PlanNodeIdAllocator::new();
        let input = scan(&mut ids, "T", None);
        let mut agg = PlanNode::unary(
            &mut ids,
            PlanNodeKind::Aggregate {
                phase: AggregatePhase::Single,
                group_by: vec![Expr::column("T", "T", "B", ValueType::Varchar)],
                aggregates: vec![AggregateColumn {
                    func: AggFunc::CountStar,
                    arg: None,
                    distinct: false,
                    output: "$AGG0".into(),
                    ty: ValueType::BigInt,
                }],
            },
            input,
        );
        resolve_all(&mut agg, &catalog).expect("resolves");
        let schema = agg.output_schema().expect("schema");
        assert_eq!(schema.columns()[0].column, "B");
        assert_eq!(schema.columns()[0].table_alias, "T");
        assert_eq!(schema.columns()[1].column, "$AGG0");
    }

    #[test]
    fn unknown_columns_fail_resolution() {
        let catalog = catalog();
        let mut ids = PlanNodeIdAllocator::new();
        let pred = Expr::compare(
            CmpOp::Eq,
            Expr::column("T", "T", "Z", ValueType::Integer),
            Expr::Literal(Value::Int(1)),
        );
        let mut node = scan(&mut ids, "T", Some(pred));
        assert!(resolve_all(&mut node, &catalog).is_err());
    }

    #[test]
    fn renumber_is_pre_order_and_shape_ignores_ids() {
        let mut ids = PlanNodeIdAllocator::new();
        let left = scan(&mut ids, "T", None);
        let right = scan(&mut ids, "U", None);
        let join = PlanNode::with_children(&mut ids, PlanNodeKind::NestLoop { predicate: None }, vec![left, right]);
        let mut root = PlanNode::unary(&mut ids, PlanNodeKind::Send, join);
        let before = root.shape();
        root.renumber(&mut PlanNodeIdAllocator::new());
        assert_eq!(root.node_ids(), [PlanNodeId(1), PlanNodeId(2), PlanNodeId(3), PlanNodeId(4)]);
        assert_eq!(root.shape(), before);
        assert_eq!(before, "SEND(NESTLOOP(SEQSCAN[T T],SEQSCAN[U U]))");
        assert!(root.is_read_only());
    }
}
