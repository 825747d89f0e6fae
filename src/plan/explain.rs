use std::fmt;
use std::hash::Hasher;

use serde::Serialize;
use xxhash_rust::xxh64::Xxh64;

use super::node::{PlanNode, PlanNodeKind};

/// Explain node representing an operator with its properties.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExplainNode {
    /// Operator name.
    pub op: String,
    /// Plan node id.
    pub id: u32,
    /// Properties describing the operator.
    pub props: Vec<ExplainProp>,
    /// Input operators.
    pub inputs: Vec<ExplainNode>,
}

impl ExplainNode {
    /// Creates an explain node for an operator.
    pub fn new(op: impl Into<String>, id: u32) -> Self {
        Self {
            op: op.into(),
            id,
            props: Vec::new(),
            inputs: Vec::new(),
        }
    }

    /// Value of the first property named `key`.
    pub fn prop(&self, key: &str) -> Option<&str> {
        self.props
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.value.as_str())
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        write!(f, "{:width$}{} #{}", "", self.op, self.id, width = depth * 2)?;
        for prop in &self.props {
            write!(f, " {}={}", prop.key, prop.value)?;
        }
        writeln!(f)?;
        for input in &self.inputs {
            input.fmt_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for ExplainNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}

/// Single property associated with an [`ExplainNode`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExplainProp {
    /// Property key.
    pub key: String,
    /// Property value serialized for display.
    pub value: String,
    /// Whether this property contains literal data that may be redacted.
    pub redactable: bool,
}

impl ExplainProp {
    fn plain(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            redactable: false,
        }
    }

    fn literal(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            redactable: true,
        }
    }
}

/// Builds the explain tree of a plan.
pub fn build_explain_tree(node: &PlanNode) -> ExplainNode {
    let mut explain = ExplainNode::new(node.op_name(), node.id.0);
    explain.props = op_props(&node.kind);
    explain.inputs = node.children.iter().map(build_explain_tree).collect();
    explain
}

/// Deterministic hash of operators and their properties.
pub fn plan_hash(node: &PlanNode) -> u64 {
    let mut hasher = Xxh64::new(0);
    hash_plan_node(node, &mut hasher);
    hasher.finish()
}

fn hash_plan_node(node: &PlanNode, hasher: &mut Xxh64) {
    hasher.write(node.op_name().as_bytes());
    for prop in op_props(&node.kind) {
        hasher.write(prop.key.as_bytes());
        hasher.write(prop.value.as_bytes());
    }
    hasher.write_u64(node.children.len() as u64);
    for child in &node.children {
        hash_plan_node(child, hasher);
    }
}

fn op_props(kind: &PlanNodeKind) -> Vec<ExplainProp> {
    match kind {
        PlanNodeKind::SeqScan {
            table,
            alias,
            predicate,
        } => {
            let mut props = vec![
                ExplainProp::plain("table", table.clone()),
                ExplainProp::plain("as", alias.clone()),
            ];
            if let Some(pred) = predicate {
                props.push(ExplainProp::literal("predicate", pred.to_string()));
            }
            props
        }
        PlanNodeKind::IndexScan {
            table,
            alias,
            index,
            keys,
            predicate,
        } => {
            let mut props = vec![
                ExplainProp::plain("table", table.clone()),
                ExplainProp::plain("as", alias.clone()),
                ExplainProp::plain("index", index.clone()),
                ExplainProp::literal("keys", join(keys.iter().map(|k| k.to_string()))),
            ];
            if let Some(pred) = predicate {
                props.push(ExplainProp::literal("predicate", pred.to_string()));
            }
            props
        }
        PlanNodeKind::NestLoop { predicate } => predicate
            .iter()
            .map(|p| ExplainProp::literal("predicate", p.to_string()))
            .collect(),
        PlanNodeKind::Aggregate {
            phase,
            group_by,
            aggregates,
        } => {
            let mut props = vec![ExplainProp::plain("phase", format!("{phase:?}").to_lowercase())];
            if !group_by.is_empty() {
                props.push(ExplainProp::plain(
                    "group_by",
                    join(group_by.iter().map(|g| g.to_string())),
                ));
            }
            props.push(ExplainProp::plain(
                "aggregates",
                join(aggregates.iter().map(|a| {
                    let arg = match &a.arg {
                        Some(arg) if a.distinct => format!("DISTINCT {arg}"),
                        Some(arg) => arg.to_string(),
                        None => "*".to_string(),
                    };
                    format!("{}={}({arg})", a.output, a.func.name())
                })),
            ));
            props
        }
        PlanNodeKind::Projection { columns } => vec![ExplainProp::literal(
            "columns",
            join(columns.iter().map(|c| {
                let rendered = c.expr.to_string();
                if rendered == c.column.alias {
                    rendered
                } else {
                    format!("{rendered} AS {}", c.column.alias)
                }
            })),
        )],
        PlanNodeKind::OrderBy { keys } => vec![ExplainProp::plain(
            "keys",
            join(keys.iter().map(|k| {
                format!("{} {}", k.expr, if k.descending { "DESC" } else { "ASC" })
            })),
        )],
        PlanNodeKind::Limit { limit, offset } => {
            let mut props = Vec::new();
            if let Some(limit) = limit {
                props.push(ExplainProp::plain("limit", limit.to_string()));
            }
            if *offset > 0 {
                props.push(ExplainProp::plain("offset", offset.to_string()));
            }
            props
        }
        PlanNodeKind::Distinct | PlanNodeKind::Send | PlanNodeKind::Receive => Vec::new(),
        PlanNodeKind::Insert { table, values } => vec![
            ExplainProp::plain("table", table.clone()),
            ExplainProp::literal("values", join(values.iter().map(|v| v.to_string()))),
        ],
        PlanNodeKind::Update {
            table, assignments, ..
        } => vec![
            ExplainProp::plain("table", table.clone()),
            ExplainProp::literal(
                "set",
                join(
                    assignments
                        .iter()
                        .map(|a| format!("{} = {}", a.column, a.value)),
                ),
            ),
        ],
        PlanNodeKind::Delete { table } => vec![ExplainProp::plain("table", table.clone())],
    }
}

fn join(items: impl Iterator<Item = String>) -> String {
    format!("[{}]", items.collect::<Vec<_>>().join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::PlanNodeIdAllocator;
    use crate::plan::expr::{CmpOp, Expr};
    use crate::value::{Value, ValueType};

    fn scan_with(value: Expr) -> PlanNode {
        let mut ids = PlanNodeIdAllocator::new();
        let scan = PlanNode::leaf(
            &mut ids,
            PlanNodeKind::SeqScan {
                table: "T".into(),
                alias: "T".into(),
                predicate: Some(Expr::compare(
                    CmpOp::Eq,
                    Expr::column("T", "T", "A", ValueType::Integer),
                    value,
                )),
            },
        );
        PlanNode::unary(&mut ids, PlanNodeKind::Send, scan)
    }

    #[test]
    fn explain_lists_props_and_inputs() {
        let plan = scan_with(Expr::Param {
            index: 0,
            ty: ValueType::Integer,
        });
        let explain = build_explain_tree(&plan);
        assert_eq!(explain.op, "SEND");
        assert_eq!(explain.inputs[0].prop("table"), Some("T"));
        assert_eq!(explain.inputs[0].prop("predicate"), Some("(T.A = ?0)"));
        let text = explain.to_string();
        assert!(text.starts_with("SEND #2\n  SEQSCAN #1 table=T"), "{text}");
    }

    #[test]
    fn hash_tracks_predicates() {
        let a = scan_with(Expr::Literal(Value::Int(1)));
        let b = scan_with(Expr::Literal(Value::Int(2)));
        assert_eq!(plan_hash(&a), plan_hash(&a.clone()));
        assert_ne!(plan_hash(&a), plan_hash(&b));
    }
}
