//! Cost estimation for candidate plans.
//!
//! Numbers are relative: the assembler only compares candidates of one
//! statement. A literal and the parameter that replaces it estimate the
//! same, so a parameterized plan costs what its raw twin costs.

use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogProvider, DEFAULT_ESTIMATED_ROWS};
use crate::plan::{CmpOp, Expr, PlanNode, PlanNodeKind};

const DEFAULT_EQ_SELECTIVITY: f64 = 0.05;
const DEFAULT_RANGE_SELECTIVITY: f64 = 0.3;
const DEFAULT_FILTER_SELECTIVITY: f64 = 0.25;
const MIN_SELECTIVITY: f64 = 1e-6;
const GROUP_REDUCTION: f64 = 0.1;
const TRANSFER_COST_PER_ROW: f64 = 1.0;

/// Caller-provided hint about a parameter slot's value distribution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScalarValueHint {
    /// Fraction of rows an equality on this parameter keeps.
    pub selectivity: Option<f64>,
}

/// Output cardinality and cumulative cost of a subtree.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PlanEstimate {
    /// Estimated output rows.
    pub rows: f64,
    /// Cumulative cost.
    pub cost: f64,
}

/// Estimates plan cost.
pub trait CostModel: Send + Sync {
    /// Estimates `node` and its inputs.
    fn estimate(&self, node: &PlanNode, catalog: &dyn CatalogProvider, hints: &[ScalarValueHint]) -> PlanEstimate;
}

/// Row-count based cost model.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultCostModel;

impl CostModel for DefaultCostModel {
    fn estimate(&self, node: &PlanNode, catalog: &dyn CatalogProvider, hints: &[ScalarValueHint]) -> PlanEstimate {
        let input = |i: usize| {
            node.children
                .get(i)
                .map(|c| self.estimate(c, catalog, hints))
                .unwrap_or_default()
        };
        let table_rows = |table: &str| {
            catalog
                .table(table)
                .map(|t| t.estimated_rows)
                .unwrap_or(DEFAULT_ESTIMATED_ROWS)
                .max(1) as f64
        };
        match &node.kind {
            PlanNodeKind::SeqScan { table, predicate, .. } => {
                let n = table_rows(table);
                PlanEstimate {
                    rows: n * selectivity(predicate.as_ref(), hints),
                    cost: n,
                }
            }
            PlanNodeKind::IndexScan {
                table,
                index,
                keys,
                predicate,
                ..
            } => {
                let n = table_rows(table);
                let full_unique = catalog
                    .table(table)
                    .and_then(|t| t.index(index))
                    .map(|i| i.unique && i.columns.len() == keys.len())
                    .unwrap_or(false);
                let matched = if full_unique {
                    1.0
                } else {
                    let per_key: f64 = keys
                        .iter()
                        .map(|k| param_hint(k, hints).unwrap_or(DEFAULT_EQ_SELECTIVITY))
                        .product();
                    (n * per_key).max(1.0)
                };
                PlanEstimate {
                    rows: matched * selectivity(predicate.as_ref(), hints),
                    cost: (n + 1.0).log2() + matched,
                }
            }
            PlanNodeKind::NestLoop { predicate } => {
                let (l, r) = (input(0), input(1));
                let rows = l.rows * r.rows * selectivity(predicate.as_ref(), hints);
                PlanEstimate {
                    rows,
                    cost: l.cost + l.rows * r.cost + rows,
                }
            }
            PlanNodeKind::Aggregate { group_by, .. } => {
                let i = input(0);
                let rows = if group_by.is_empty() {
                    1.0
                } else {
                    (i.rows * GROUP_REDUCTION).max(1.0)
                };
                PlanEstimate {
                    rows,
                    cost: i.cost + i.rows,
                }
            }
            PlanNodeKind::Projection { .. } | PlanNodeKind::Receive => input(0),
            PlanNodeKind::Distinct => {
                let i = input(0);
                PlanEstimate {
                    rows: i.rows,
                    cost: i.cost + i.rows,
                }
            }
            PlanNodeKind::OrderBy { .. } => {
                let i = input(0);
                PlanEstimate {
                    rows: i.rows,
                    cost: i.cost + i.rows * (i.rows + 1.0).log2(),
                }
            }
            PlanNodeKind::Limit { limit, offset } => {
                let i = input(0);
                let rows = (i.rows - *offset as f64).max(0.0);
                PlanEstimate {
                    rows: limit.map(|l| rows.min(l as f64)).unwrap_or(rows),
                    cost: i.cost,
                }
            }
            PlanNodeKind::Send => {
                let i = input(0);
                PlanEstimate {
                    rows: i.rows,
                    cost: i.cost + i.rows * TRANSFER_COST_PER_ROW,
                }
            }
            PlanNodeKind::Insert { .. } => PlanEstimate { rows: 1.0, cost: 1.0 },
            PlanNodeKind::Update { .. } | PlanNodeKind::Delete { .. } => {
                let i = input(0);
                PlanEstimate {
                    rows: 1.0,
                    cost: i.cost + i.rows,
                }
            }
        }
    }
}

fn param_hint(expr: &Expr, hints: &[ScalarValueHint]) -> Option<f64> {
    match expr {
        Expr::Param { index, .. } => hints.get(*index).and_then(|h| h.selectivity),
        _ => None,
    }
}

/// Fraction of rows a predicate keeps.
pub fn selectivity(predicate: Option<&Expr>, hints: &[ScalarValueHint]) -> f64 {
    let Some(predicate) = predicate else {
        return 1.0;
    };
    let s = match predicate {
        Expr::Compare { op: CmpOp::Eq, left, right } => param_hint(right, hints)
            .or_else(|| param_hint(left, hints))
            .unwrap_or(DEFAULT_EQ_SELECTIVITY),
        Expr::Compare { op: CmpOp::NotEq, .. } => 1.0 - DEFAULT_EQ_SELECTIVITY,
        Expr::Compare { .. } => DEFAULT_RANGE_SELECTIVITY,
        Expr::And(terms) => terms.iter().map(|t| selectivity(Some(t), hints)).product(),
        Expr::Or(terms) => terms.iter().map(|t| selectivity(Some(t), hints)).sum::<f64>(),
        Expr::Not(inner) => 1.0 - selectivity(Some(inner), hints),
        _ => DEFAULT_FILTER_SELECTIVITY,
    };
    s.clamp(MIN_SELECTIVITY, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{InMemoryCatalog, TableDef};
    use crate::ids::PlanNodeIdAllocator;
    use crate::value::{Value, ValueType};

    fn catalog() -> InMemoryCatalog {
        InMemoryCatalog::new().with_table(
            TableDef::new("T")
                .with_column("A", ValueType::Integer)
                .with_index("T_A", ["A"], true)
                .with_estimated_rows(10_000),
        )
    }

    fn eq_a(rhs: Expr) -> Expr {
        Expr::compare(CmpOp::Eq, Expr::column("T", "T", "A", ValueType::Integer), rhs)
    }

    #[test]
    fn literal_and_parameter_estimate_alike() {
        let literal = selectivity(Some(&eq_a(Expr::Literal(Value::Int(1)))), &[]);
        let param = selectivity(
            Some(&eq_a(Expr::Param {
                index: 0,
                ty: ValueType::Integer,
            })),
            &[],
        );
        assert_eq!(literal, param);
        let hinted = selectivity(
            Some(&eq_a(Expr::Param {
                index: 0,
                ty: ValueType::Integer,
            })),
            &[ScalarValueHint {
                selectivity: Some(0.5),
            }],
        );
        assert_eq!(hinted, 0.5);
    }

    #[test]
    fn unique_index_lookup_beats_scan() {
        let catalog = catalog();
        let mut ids = PlanNodeIdAllocator::new();
        let seq = PlanNode::leaf(
            &mut ids,
            PlanNodeKind::SeqScan {
                table: "T".into(),
                alias: "T".into(),
                predicate: Some(eq_a(Expr::Literal(Value::Int(1)))),
            },
        );
        let idx = PlanNode::leaf(
            &mut ids,
            PlanNodeKind::IndexScan {
                table: "T".into(),
                alias: "T".into(),
                index: "T_A".into(),
                keys: vec![Expr::Literal(Value::Int(1))],
                predicate: None,
            },
        );
        let seq = DefaultCostModel.estimate(&seq, &catalog, &[]);
        let idx = DefaultCostModel.estimate(&idx, &catalog, &[]);
        assert!(idx.cost < seq.cost);
        assert_eq!(idx.rows, 1.0);
    }
}
