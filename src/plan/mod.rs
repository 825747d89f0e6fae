//! Physical plan representation.
//!
//! A plan is a tree of [`PlanNode`]s whose operator is a closed
//! [`PlanNodeKind`] enum. Output schemas and column positions are filled in
//! exactly once, after assembly, by [`crate::resolve`].

#![forbid(unsafe_code)]

/// Explain trees and plan hashing.
pub mod explain;
/// Scalar expressions.
pub mod expr;
/// Plan nodes and per-operator schema rules.
pub mod node;
/// Output schemas.
pub mod schema;

pub use explain::{build_explain_tree, plan_hash, ExplainNode, ExplainProp};
pub use expr::{AggFunc, ArithOp, CmpOp, ColumnRef, Expr};
pub use node::{
    AggregateColumn, AggregatePhase, ColumnAssignment, PlanNode, PlanNodeKind, ProjectedColumn,
    SortKey, MODIFIED_TUPLES,
};
pub use schema::{NodeSchema, SchemaColumn};
