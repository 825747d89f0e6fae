//! Final artifact of a successful planning attempt.

use serde::Serialize;

use crate::fragment::FragmentGraph;
use crate::plan::{build_explain_tree, ExplainNode, Expr, NodeSchema, PlanNode};
use crate::value::ValueType;

pub use crate::param::ParameterSet;

/// Resolved plan, fragments and everything a caller needs to run it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CompiledPlan {
    /// Statement text.
    pub sql: String,
    /// Unfragmented plan root.
    pub root: PlanNode,
    /// Executable fragments.
    pub fragments: FragmentGraph,
    /// Output schema of the root.
    pub columns: NodeSchema,
    /// True when nothing in the plan modifies data.
    pub read_only: bool,
    /// Estimated cost.
    pub cost: f64,
    /// True when the plan runs on one partition.
    pub single_partition: bool,
    /// Expression choosing the partition of a single-partition plan.
    pub partition_key: Option<Expr>,
    /// Type of every parameter slot.
    pub parameter_types: Vec<ValueType>,
    /// True when compiled from the parameterized tree.
    pub from_parameterized: bool,
    /// Extracted literals bound to `parameter_types`; only present on the
    /// parameterized path.
    pub extracted_params: Option<ParameterSet>,
    /// Hash of the plan's operators and properties.
    pub plan_hash: u64,
    /// True when output order is guaranteed.
    pub deterministic_order: bool,
}

impl CompiledPlan {
    /// Parameter slot types.
    pub fn parameter_types(&self) -> &[ValueType] {
        &self.parameter_types
    }

    /// Number of parameter slots.
    pub fn parameter_count(&self) -> usize {
        self.parameter_types.len()
    }

    /// Explain tree of the unfragmented plan.
    pub fn explain(&self) -> ExplainNode {
        build_explain_tree(&self.root)
    }

    /// Operator skeleton of the unfragmented plan.
    pub fn shape(&self) -> String {
        self.root.shape()
    }
}
