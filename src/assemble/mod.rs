//! Plan assembly: turns a logical statement into the cheapest physical
//! plan the search can find.
//!
//! The assembler only searches. It never adds the top `Send` of a read
//! plan and never resolves schemas; the orchestrator does both once the
//! winner is known.

#![forbid(unsafe_code)]

mod cost_based;
mod selector;
mod trace;

use std::fmt;

use serde::Serialize;

pub use cost_based::CostBasedAssembler;
pub use selector::{PlanSelector, StatementLabel};
pub use trace::{NoopPlanTrace, PlanTrace, RecordingPlanTrace, TraceEvent, TracingPlanTrace};

use crate::catalog::CatalogProvider;
use crate::cost::{CostModel, ScalarValueHint};
use crate::ids::PlanNodeIdAllocator;
use crate::logical::LogicalStatement;
use crate::partition::{PartitioningContext, Routing};
use crate::plan::PlanNode;

/// Message used when an assembler fails without a diagnostic.
pub const UNKNOWN_ASSEMBLY_FAILURE: &str = "Unable to plan for statement. Error unknown.";

/// A complete plan offered to the selector.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CandidatePlan {
    /// Plan root.
    pub root: PlanNode,
    /// True when nothing in the plan modifies data.
    pub read_only: bool,
    /// Estimated cost.
    pub cost: f64,
    /// True when the plan's output order is guaranteed.
    pub deterministic_order: bool,
    /// Where the plan runs.
    pub routing: Routing,
}

/// Assembly produced no plan.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssemblyFailure {
    /// Diagnostic, when the assembler has one.
    pub message: Option<String>,
}

impl AssemblyFailure {
    /// Failure with a diagnostic.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }

    /// Failure without a diagnostic.
    pub fn unknown() -> Self {
        Self { message: None }
    }
}

impl fmt::Display for AssemblyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message.as_deref().unwrap_or(UNKNOWN_ASSEMBLY_FAILURE))
    }
}

/// Read-only inputs of one assembly attempt plus its node id allocator.
pub struct AssemblyContext<'a> {
    /// Schema.
    pub catalog: &'a dyn CatalogProvider,
    /// Routing constraint.
    pub partitioning: &'a PartitioningContext,
    /// Cost model.
    pub cost_model: &'a dyn CostModel,
    /// Per-parameter hints for the cost model.
    pub hints: &'a [ScalarValueHint],
    /// Attempt-scoped ids.
    pub ids: &'a mut PlanNodeIdAllocator,
}

/// Searches for the best plan of a statement.
pub trait PlanAssembler: Send + Sync {
    /// Offers every candidate to `selector` and returns its winner.
    fn best_cost_plan(
        &self,
        stmt: &LogicalStatement,
        ctx: &mut AssemblyContext<'_>,
        selector: PlanSelector,
    ) -> Result<CandidatePlan, AssemblyFailure>;
}
