//! Exhaustive cost-based search over join orders, access paths and
//! distribution strategies.

use std::collections::BTreeSet;

use tracing::trace;

use super::{AssemblyContext, AssemblyFailure, CandidatePlan, PlanAssembler, PlanSelector};
use crate::ids::PlanNodeIdAllocator;
use crate::logical::{LogicalStatement, StatementKind, TableRef};
use crate::partition::{analyze_routing, Routing};
use crate::plan::{
    AggFunc, AggregateColumn, AggregatePhase, CmpOp, ColumnRef, Expr, PlanNode, PlanNodeKind,
    ProjectedColumn, SchemaColumn, SortKey, MODIFIED_TUPLES,
};
use crate::value::{Value, ValueType};

/// Reference assembler: enumerates every join order (or the manual one),
/// every sequential/index access path and, for multi-partition plans, both
/// one- and two-phase aggregation and LIMIT pushdown.
#[derive(Clone, Copy, Debug, Default)]
pub struct CostBasedAssembler;

impl PlanAssembler for CostBasedAssembler {
    fn best_cost_plan(
        &self,
        stmt: &LogicalStatement,
        ctx: &mut AssemblyContext<'_>,
        mut selector: PlanSelector,
    ) -> Result<CandidatePlan, AssemblyFailure> {
        let routing = analyze_routing(stmt, ctx.catalog, ctx.partitioning).map_err(AssemblyFailure::new)?;
        let roots = match stmt.kind {
            StatementKind::Select => select_plans(stmt, ctx, &routing)?,
            StatementKind::Insert => vec![insert_plan(stmt, ctx, &routing)?],
            StatementKind::Update | StatementKind::Delete => write_plans(stmt, ctx, &routing)?,
        };
        trace!(
            candidates = roots.len(),
            single_partition = routing.is_single_partition(),
            "assemble.candidates.built"
        );
        let shaping = Shaping::of(stmt);
        for root in roots {
            let estimate = ctx.cost_model.estimate(&root, ctx.catalog, ctx.hints);
            let read_only = root.is_read_only();
            let deterministic_order = order_is_deterministic(stmt, &shaping, &routing, &root);
            selector.consider(CandidatePlan {
                root,
                read_only,
                cost: estimate.cost,
                deterministic_order,
                routing: routing.clone(),
            });
        }
        selector.finish().ok_or_else(AssemblyFailure::unknown)
    }
}

/// Join orders to try, as positions into `stmt.tables`. Without a manual
/// order every permutation is tried in lexicographic order, so FROM order
/// comes first and wins ties.
fn join_orders(stmt: &LogicalStatement) -> Result<Vec<Vec<usize>>, AssemblyFailure> {
    if let Some(order) = &stmt.join_order {
        let positions = order
            .iter()
            .map(|alias| {
                stmt.tables
                    .iter()
                    .position(|t| &t.alias == alias)
                    .ok_or_else(|| AssemblyFailure::new(format!("join order names unknown table {alias}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(vec![positions]);
    }
    let mut current: Vec<usize> = (0..stmt.tables.len()).collect();
    let mut orders = vec![current.clone()];
    while next_permutation(&mut current) {
        orders.push(current.clone());
    }
    Ok(orders)
}

fn next_permutation(v: &mut [usize]) -> bool {
    if v.len() < 2 {
        return false;
    }
    let mut i = v.len() - 1;
    while i > 0 && v[i - 1] >= v[i] {
        i -= 1;
    }
    if i == 0 {
        return false;
    }
    let mut j = v.len() - 1;
    while v[j] <= v[i - 1] {
        j -= 1;
    }
    v.swap(i - 1, j);
    v[i..].reverse();
    true
}

/// Left-deep join trees for one order, one per combination of access
/// paths. Each conjunct lands on the lowest node binding all its tables.
fn join_trees(stmt: &LogicalStatement, order: &[usize], ctx: &mut AssemblyContext<'_>) -> Vec<PlanNode> {
    let mut remaining = stmt.predicates.clone();
    let mut bound: BTreeSet<String> = BTreeSet::new();
    let mut trees: Vec<PlanNode> = Vec::new();
    for (step, &position) in order.iter().enumerate() {
        let table = &stmt.tables[position];
        let (local, rest): (Vec<Expr>, Vec<Expr>) = remaining.into_iter().partition(|p| {
            let aliases = p.table_aliases();
            (aliases.is_empty() && step == 0) || (aliases.len() == 1 && aliases.contains(&table.alias))
        });
        remaining = rest;
        let accesses = access_paths(table, &local, ctx);
        bound.insert(table.alias.clone());
        if step == 0 {
            trees = accesses;
            continue;
        }
        let (join_terms, rest): (Vec<Expr>, Vec<Expr>) = remaining
            .into_iter()
            .partition(|p| p.table_aliases().is_subset(&bound));
        remaining = rest;
        let predicate = Expr::and_all(join_terms);
        let mut joined = Vec::with_capacity(trees.len() * accesses.len());
        for left in &trees {
            for right in &accesses {
                joined.push(PlanNode::with_children(
                    ctx.ids,
                    PlanNodeKind::NestLoop {
                        predicate: predicate.clone(),
                    },
                    vec![left.clone(), right.clone()],
                ));
            }
        }
        trees = joined;
    }
    trees
}

/// Sequential scan plus one index scan per index whose leading columns are
/// all compared for equality with a constant or parameter.
fn access_paths(table: &TableRef, local: &[Expr], ctx: &mut AssemblyContext<'_>) -> Vec<PlanNode> {
    let catalog = ctx.catalog;
    let mut paths = vec![PlanNode::leaf(
        ctx.ids,
        PlanNodeKind::SeqScan {
            table: table.table.clone(),
            alias: table.alias.clone(),
            predicate: Expr::and_all(local.to_vec()),
        },
    )];
    let Some(def) = catalog.table(&table.table) else {
        return paths;
    };
    for index in &def.indexes {
        let mut used: Vec<usize> = Vec::new();
        let mut keys = Vec::new();
        for column in &index.columns {
            let hit = local
                .iter()
                .enumerate()
                .filter(|(i, _)| !used.contains(i))
                .find_map(|(i, p)| equality_key(p, &table.alias, column).map(|key| (i, key)));
            match hit {
                Some((i, key)) => {
                    used.push(i);
                    keys.push(key);
                }
                None => break,
            }
        }
        if keys.is_empty() {
            continue;
        }
        let residual = local
            .iter()
            .enumerate()
            .filter(|(i, _)| !used.contains(i))
            .map(|(_, p)| p.clone())
            .collect();
        paths.push(PlanNode::leaf(
            ctx.ids,
            PlanNodeKind::IndexScan {
                table: table.table.clone(),
                alias: table.alias.clone(),
                index: index.name.clone(),
                keys,
                predicate: Expr::and_all(residual),
            },
        ));
    }
    paths
}

/// Constant side of `alias.column = constant`.
fn equality_key(predicate: &Expr, alias: &str, column: &str) -> Option<Expr> {
    let Expr::Compare {
        op: CmpOp::Eq,
        left,
        right,
    } = predicate
    else {
        return None;
    };
    let is_column = |e: &Expr| matches!(e, Expr::Column(c) if c.alias == alias && c.column == column);
    let usable = |e: &Expr| e.is_constant() && !matches!(e, Expr::Literal(Value::Null));
    if is_column(left) && usable(right) {
        Some((**right).clone())
    } else if is_column(right) && usable(left) {
        Some((**left).clone())
    } else {
        None
    }
}

/// True when every run of `root` returns rows in the same order. A
/// multi-partition read qualifies only when the coordinator sorts on every
/// display column or the result is a single aggregate row.
fn order_is_deterministic(stmt: &LogicalStatement, shaping: &Shaping, routing: &Routing, root: &PlanNode) -> bool {
    if !stmt.is_read_only() || routing.is_single_partition() {
        return true;
    }
    if shaping.aggregates.is_some() && stmt.group_by.is_empty() {
        return true;
    }
    let sorted_on_all = stmt
        .display_columns
        .iter()
        .all(|d| stmt.order_by.iter().any(|k| k.expr == d.expr));
    sorted_on_all
        || coordinator_sort(root).is_some_and(|keys| {
            shaping
                .display
                .iter()
                .all(|d| keys.iter().any(|k| &k.expr == d))
        })
}

/// Sort keys of the topmost `OrderBy` above the first exchange.
fn coordinator_sort(root: &PlanNode) -> Option<&[SortKey]> {
    let mut node = root;
    loop {
        match &node.kind {
            PlanNodeKind::OrderBy { keys } => return Some(keys.as_slice()),
            PlanNodeKind::Receive | PlanNodeKind::Send => return None,
            _ => node = node.children.first()?,
        }
    }
}

/// Display and ORDER BY expressions with aggregate calls replaced by
/// references to aggregate node outputs.
#[derive(Clone)]
struct Shaping {
    aggregates: Option<Vec<AggregateColumn>>,
    display: Vec<Expr>,
    order: Vec<SortKey>,
}

impl Shaping {
    fn of(stmt: &LogicalStatement) -> Self {
        if !stmt.has_aggregation() {
            return Self {
                aggregates: None,
                display: stmt.display_columns.iter().map(|c| c.expr.clone()).collect(),
                order: stmt.order_by.clone(),
            };
        }
        let mut columns = Vec::new();
        let display = stmt
            .display_columns
            .iter()
            .map(|c| extract_aggregates(&c.expr, &mut columns))
            .collect();
        let order = stmt
            .order_by
            .iter()
            .map(|k| SortKey {
                expr: extract_aggregates(&k.expr, &mut columns),
                descending: k.descending,
            })
            .collect();
        Self {
            aggregates: Some(columns),
            display,
            order,
        }
    }

    /// The ORDER BY extended with ascending keys on every display column it
    /// leaves out, or `None` when it already names them all.
    fn totally_ordered(&self) -> Option<Self> {
        let missing: Vec<SortKey> = self
            .display
            .iter()
            .filter(|d| !self.order.iter().any(|k| &k.expr == *d))
            .map(|d| SortKey {
                expr: d.clone(),
                descending: false,
            })
            .collect();
        if missing.is_empty() {
            return None;
        }
        let mut total = self.clone();
        total.order.extend(missing);
        Some(total)
    }
}

fn extract_aggregates(expr: &Expr, columns: &mut Vec<AggregateColumn>) -> Expr {
    let mut out = expr.clone();
    out.visit_mut(&mut |e| {
        let Expr::Aggregate { func, arg, distinct } = e else {
            return;
        };
        let func = *func;
        let distinct = *distinct;
        let arg = arg.as_deref().cloned();
        let position = match columns
            .iter()
            .position(|c| c.func == func && c.arg == arg && c.distinct == distinct)
        {
            Some(position) => position,
            None => {
                let ty = func.result_type(arg.as_ref().map(Expr::value_type));
                columns.push(AggregateColumn {
                    func,
                    arg,
                    distinct,
                    output: format!("$AGG{}", columns.len()),
                    ty,
                });
                columns.len() - 1
            }
        };
        let column = &columns[position];
        *e = Expr::Column(ColumnRef::derived(column.output.as_str(), column.ty));
    });
    out
}

/// Coordinator-side combination of per-partition aggregates, or `None`
/// when some aggregate cannot be split.
fn final_aggregates(partials: &[AggregateColumn]) -> Option<Vec<AggregateColumn>> {
    partials
        .iter()
        .map(|c| {
            if c.distinct {
                return None;
            }
            let combiner = c.func.combiner()?;
            Some(AggregateColumn {
                func: combiner,
                arg: Some(Expr::Column(ColumnRef::derived(c.output.as_str(), c.ty))),
                distinct: false,
                output: c.output.clone(),
                ty: combiner.result_type(Some(c.ty)),
            })
        })
        .collect()
}

fn aggregate(
    ids: &mut PlanNodeIdAllocator,
    phase: AggregatePhase,
    stmt: &LogicalStatement,
    aggregates: Vec<AggregateColumn>,
    input: PlanNode,
) -> PlanNode {
    PlanNode::unary(
        ids,
        PlanNodeKind::Aggregate {
            phase,
            group_by: stmt.group_by.clone(),
            aggregates,
        },
        input,
    )
}

fn exchange(ids: &mut PlanNodeIdAllocator, input: PlanNode) -> PlanNode {
    let send = PlanNode::unary(ids, PlanNodeKind::Send, input);
    PlanNode::unary(ids, PlanNodeKind::Receive, send)
}

fn limit_kind(stmt: &LogicalStatement) -> Option<PlanNodeKind> {
    (stmt.limit.is_some() || stmt.offset.is_some()).then(|| PlanNodeKind::Limit {
        limit: stmt.limit,
        offset: stmt.offset.unwrap_or(0),
    })
}

fn select_plans(
    stmt: &LogicalStatement,
    ctx: &mut AssemblyContext<'_>,
    routing: &Routing,
) -> Result<Vec<PlanNode>, AssemblyFailure> {
    if stmt.tables.is_empty() {
        return Err(AssemblyFailure::new("select has no tables"));
    }
    let shaping = Shaping::of(stmt);
    let mut roots = Vec::new();
    for order in join_orders(stmt)? {
        for join in join_trees(stmt, &order, ctx) {
            let ids = &mut *ctx.ids;
            if routing.is_single_partition() {
                let input = match &shaping.aggregates {
                    Some(columns) => aggregate(ids, AggregatePhase::Single, stmt, columns.clone(), join),
                    None => join,
                };
                roots.push(finish_select(ids, stmt, &shaping, input));
                continue;
            }
            match &shaping.aggregates {
                Some(columns) => {
                    let gathered = exchange(ids, join.clone());
                    let single = aggregate(ids, AggregatePhase::Single, stmt, columns.clone(), gathered);
                    roots.push(finish_select(ids, stmt, &shaping, single));
                    if let Some(finals) = final_aggregates(columns) {
                        let partial = aggregate(ids, AggregatePhase::Partial, stmt, columns.clone(), join);
                        let gathered = exchange(ids, partial);
                        let combined = aggregate(ids, AggregatePhase::Final, stmt, finals, gathered);
                        roots.push(finish_select(ids, stmt, &shaping, combined));
                    }
                }
                None => {
                    gathered_selects(ids, stmt, &shaping, &join, &mut roots);
                    // A LIMIT over an arbitrary order keeps arbitrary rows;
                    // sorting on every display column pins them down.
                    if stmt.limit.is_some() && !stmt.distinct {
                        if let Some(total) = shaping.totally_ordered() {
                            gathered_selects(ids, stmt, &total, &join, &mut roots);
                        }
                    }
                }
            }
        }
    }
    Ok(roots)
}

/// Multi-partition reads without aggregation: gather everything, and with
/// a LIMIT also sort and limit each partition below the exchange.
fn gathered_selects(
    ids: &mut PlanNodeIdAllocator,
    stmt: &LogicalStatement,
    shaping: &Shaping,
    join: &PlanNode,
    roots: &mut Vec<PlanNode>,
) {
    let gathered = exchange(ids, join.clone());
    roots.push(finish_select(ids, stmt, shaping, gathered));
    let (Some(limit), false) = (stmt.limit, stmt.distinct) else {
        return;
    };
    let mut local = join.clone();
    if !shaping.order.is_empty() {
        local = PlanNode::unary(
            ids,
            PlanNodeKind::OrderBy {
                keys: shaping.order.clone(),
            },
            local,
        );
    }
    local = PlanNode::unary(
        ids,
        PlanNodeKind::Limit {
            limit: Some(limit.saturating_add(stmt.offset.unwrap_or(0))),
            offset: 0,
        },
        local,
    );
    let gathered = exchange(ids, local);
    roots.push(finish_select(ids, stmt, shaping, gathered));
}

/// Adds projection, DISTINCT, ORDER BY and LIMIT over `input`. DISTINCT
/// sorts and limits the projected rows; otherwise sorting and limiting
/// happen before the projection.
fn finish_select(
    ids: &mut PlanNodeIdAllocator,
    stmt: &LogicalStatement,
    shaping: &Shaping,
    input: PlanNode,
) -> PlanNode {
    let columns: Vec<ProjectedColumn> = stmt
        .display_columns
        .iter()
        .zip(&shaping.display)
        .map(|(d, expr)| ProjectedColumn {
            expr: expr.clone(),
            column: SchemaColumn {
                table: d.table_name.clone(),
                table_alias: d.table_alias.clone(),
                column: d.column_name.clone(),
                alias: d.alias.clone(),
                ty: d.expr.value_type(),
            },
        })
        .collect();

    if stmt.distinct {
        let keys: Vec<SortKey> = stmt
            .order_by
            .iter()
            .zip(&shaping.order)
            .map(|(original, rewritten)| {
                let expr = stmt
                    .display_columns
                    .iter()
                    .position(|d| d.expr == original.expr)
                    .map(|j| Expr::Column(columns[j].column.to_ref()))
                    .unwrap_or_else(|| rewritten.expr.clone());
                SortKey {
                    expr,
                    descending: original.descending,
                }
            })
            .collect();
        let mut node = PlanNode::unary(ids, PlanNodeKind::Projection { columns }, input);
        node = PlanNode::unary(ids, PlanNodeKind::Distinct, node);
        if !keys.is_empty() {
            node = PlanNode::unary(ids, PlanNodeKind::OrderBy { keys }, node);
        }
        if let Some(limit) = limit_kind(stmt) {
            node = PlanNode::unary(ids, limit, node);
        }
        return node;
    }

    let mut node = input;
    if !shaping.order.is_empty() {
        node = PlanNode::unary(
            ids,
            PlanNodeKind::OrderBy {
                keys: shaping.order.clone(),
            },
            node,
        );
    }
    if let Some(limit) = limit_kind(stmt) {
        node = PlanNode::unary(ids, limit, node);
    }
    PlanNode::unary(ids, PlanNodeKind::Projection { columns }, node)
}

fn insert_plan(
    stmt: &LogicalStatement,
    ctx: &mut AssemblyContext<'_>,
    routing: &Routing,
) -> Result<PlanNode, AssemblyFailure> {
    let table = stmt
        .target()
        .ok_or_else(|| AssemblyFailure::new("insert has no target table"))?;
    let mut assignments = stmt.assignments.clone();
    assignments.sort_by_key(|a| a.position);
    let insert = PlanNode::leaf(
        ctx.ids,
        PlanNodeKind::Insert {
            table: table.table.clone(),
            values: assignments.into_iter().map(|a| a.value).collect(),
        },
    );
    Ok(distribute_write(ctx.ids, insert, routing, true))
}

fn write_plans(
    stmt: &LogicalStatement,
    ctx: &mut AssemblyContext<'_>,
    routing: &Routing,
) -> Result<Vec<PlanNode>, AssemblyFailure> {
    let table = stmt
        .target()
        .ok_or_else(|| AssemblyFailure::new("statement has no target table"))?;
    let replicated = ctx
        .catalog
        .table(&table.table)
        .map(|d| d.is_replicated())
        .unwrap_or(true);
    let mut roots = Vec::new();
    for scan in access_paths(table, &stmt.predicates, ctx) {
        let kind = match stmt.kind {
            StatementKind::Update => PlanNodeKind::Update {
                table: table.table.clone(),
                alias: table.alias.clone(),
                assignments: stmt.assignments.clone(),
            },
            _ => PlanNodeKind::Delete {
                table: table.table.clone(),
            },
        };
        let write = PlanNode::unary(ctx.ids, kind, scan);
        roots.push(distribute_write(ctx.ids, write, routing, replicated));
    }
    Ok(roots)
}

/// Tops a DML node with its `Send`. Multi-partition writes gather the
/// per-partition counts: a replicated table keeps one of them, a
/// partitioned table sums them.
fn distribute_write(
    ids: &mut PlanNodeIdAllocator,
    write: PlanNode,
    routing: &Routing,
    replicated: bool,
) -> PlanNode {
    if routing.is_single_partition() {
        return PlanNode::unary(ids, PlanNodeKind::Send, write);
    }
    let gathered = exchange(ids, write);
    let combined = if replicated {
        PlanNode::unary(
            ids,
            PlanNodeKind::Limit {
                limit: Some(1),
                offset: 0,
            },
            gathered,
        )
    } else {
        PlanNode::unary(
            ids,
            PlanNodeKind::Aggregate {
                phase: AggregatePhase::Final,
                group_by: Vec::new(),
                aggregates: vec![AggregateColumn {
                    func: AggFunc::Sum,
                    arg: Some(Expr::Column(ColumnRef::derived(MODIFIED_TUPLES, ValueType::BigInt))),
                    distinct: false,
                    output: MODIFIED_TUPLES.to_string(),
                    ty: ValueType::BigInt,
                }],
            },
            gathered,
        )
    };
    PlanNode::unary(ids, PlanNodeKind::Send, combined)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::assemble::{NoopPlanTrace, StatementLabel};
    use crate::catalog::{InMemoryCatalog, TableDef};
    use crate::config::DeterminismMode;
    use crate::cost::DefaultCostModel;
    use crate::model::{parse_join_order, CatalogModeler, ModelRequest, StatementModeler};
    use crate::partition::PartitioningContext;
    use crate::sql::{SqlParser, StatementParser};

    fn catalog() -> InMemoryCatalog {
        InMemoryCatalog::new()
            .with_table(
                TableDef::new("P")
                    .with_required_column("ID", ValueType::Integer)
                    .with_column("V", ValueType::Integer)
                    .partitioned_on("ID"),
            )
            .with_table(
                TableDef::new("R")
                    .with_column("ID", ValueType::Integer)
                    .with_column("NAME", ValueType::Varchar)
                    .with_index("R_ID", ["ID"], true),
            )
            .with_table(TableDef::new("S").with_column("ID", ValueType::Integer))
    }

    fn best(sql: &str, join_order: Option<&str>) -> Result<CandidatePlan, AssemblyFailure> {
        best_in(sql, join_order, DeterminismMode::Faster)
    }

    fn best_in(sql: &str, join_order: Option<&str>, mode: DeterminismMode) -> Result<CandidatePlan, AssemblyFailure> {
        let catalog = catalog();
        let tree = SqlParser.parse(sql).expect("parse succeeds");
        let mut stmt = CatalogModeler
            .model(&ModelRequest {
                sql,
                tree: &tree,
                literals: None,
                catalog: &catalog,
                join_order: None,
            })
            .expect("models");
        if let Some(order) = join_order {
            stmt.join_order = Some(parse_join_order(order, &stmt.tables).expect("valid order"));
        }
        let partitioning = PartitioningContext::infer();
        let mut ids = PlanNodeIdAllocator::new();
        let mut ctx = AssemblyContext {
            catalog: &catalog,
            partitioning: &partitioning,
            cost_model: &DefaultCostModel,
            hints: &[],
            ids: &mut ids,
        };
        let selector = PlanSelector::new(
            Arc::new(StatementLabel::default()),
            Arc::new(NoopPlanTrace),
            mode,
        );
        CostBasedAssembler.best_cost_plan(&stmt, &mut ctx, selector)
    }

    fn shape(sql: &str) -> String {
        best(sql, None).expect("plans").root.shape()
    }

    #[test]
    fn single_partition_read_has_no_exchange() {
        assert_eq!(shape("SELECT V FROM P WHERE ID = 3"), "PROJECTION(SEQSCAN[P P])");
    }

    #[test]
    fn unique_index_lookup_is_chosen() {
        assert_eq!(
            shape("SELECT * FROM R WHERE ID = 5"),
            "PROJECTION(INDEXSCAN[R R R_ID/1])"
        );
    }

    #[test]
    fn multi_partition_count_is_two_phase() {
        assert_eq!(
            shape("SELECT COUNT(*) FROM P"),
            "PROJECTION(AGGREGATE[Final](RECEIVE(SEND(AGGREGATE[Partial](SEQSCAN[P P])))))"
        );
        assert_eq!(
            shape("SELECT AVG(V) FROM P"),
            "PROJECTION(AGGREGATE[Single](RECEIVE(SEND(SEQSCAN[P P]))))"
        );
    }

    #[test]
    fn limit_is_pushed_below_send() {
        assert_eq!(
            shape("SELECT V FROM P ORDER BY V LIMIT 3"),
            "PROJECTION(LIMIT(ORDERBY(RECEIVE(SEND(LIMIT(ORDERBY(SEQSCAN[P P])))))))"
        );
    }

    #[test]
    fn safer_mode_sorts_an_unordered_limit() {
        let fast = best_in("SELECT V FROM P LIMIT 3", None, DeterminismMode::Faster).expect("plans");
        assert_eq!(fast.root.shape(), "PROJECTION(LIMIT(RECEIVE(SEND(LIMIT(SEQSCAN[P P])))))");
        assert!(!fast.deterministic_order);

        let safe = best_in("SELECT V FROM P LIMIT 3", None, DeterminismMode::Safer).expect("plans");
        assert_eq!(
            safe.root.shape(),
            "PROJECTION(LIMIT(ORDERBY(RECEIVE(SEND(LIMIT(ORDERBY(SEQSCAN[P P])))))))"
        );
        assert!(safe.deterministic_order);
        assert!(safe.cost > fast.cost);
    }

    #[test]
    fn determinism_is_judged_per_candidate() {
        assert!(best("SELECT V FROM P WHERE ID = 1", None).expect("plans").deterministic_order);
        assert!(best("SELECT COUNT(*) FROM P", None).expect("plans").deterministic_order);
        assert!(best("SELECT ID, V FROM P ORDER BY V, ID", None).expect("plans").deterministic_order);
        assert!(!best("SELECT ID, V FROM P ORDER BY V", None).expect("plans").deterministic_order);
        assert!(best("DELETE FROM P", None).expect("plans").deterministic_order);
    }

    #[test]
    fn writes_carry_their_own_send() {
        assert_eq!(
            shape("DELETE FROM P WHERE V = 1"),
            "SEND(AGGREGATE[Final](RECEIVE(SEND(DELETE[P](SEQSCAN[P P])))))"
        );
        assert_eq!(shape("INSERT INTO R VALUES (1, 'a')"), "SEND(LIMIT(RECEIVE(SEND(INSERT[R]))))");
        assert_eq!(shape("INSERT INTO P VALUES (1, 2)"), "SEND(INSERT[P])");
    }

    #[test]
    fn manual_join_order_is_followed() {
        let plan = best("SELECT R.NAME FROM R, S WHERE R.ID = S.ID", Some("S,R")).expect("plans");
        assert_eq!(plan.root.shape(), "PROJECTION(NESTLOOP(SEQSCAN[S S],SEQSCAN[R R]))");
    }

    #[test]
    fn permutations_are_lexicographic() {
        let mut v = vec![0, 1, 2];
        let mut seen = vec![v.clone()];
        while next_permutation(&mut v) {
            seen.push(v.clone());
        }
        assert_eq!(seen.len(), 6);
        assert_eq!(seen[1], [0, 2, 1]);
        assert_eq!(seen[5], [2, 1, 0]);
    }
}
