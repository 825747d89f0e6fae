//! Post-assembly schema resolution.
//!
//! [`UnresolvedPlan::resolve`] consumes the selected candidate, adds the
//! top `Send` of a read plan, generates every output schema bottom-up,
//! binds every column reference to a position and checks that the plan
//! produces exactly the statement's display columns. The result is a
//! [`ResolvedPlan`], which has no way back to the unresolved state.

use tracing::trace;

use crate::assemble::CandidatePlan;
use crate::catalog::CatalogProvider;
use crate::error::{PlannerError, Result};
use crate::ids::PlanNodeIdAllocator;
use crate::logical::LogicalStatement;
use crate::partition::Routing;
use crate::plan::{NodeSchema, PlanNode, PlanNodeKind};

/// Diagnostic of a failed leakage check.
pub const LEAKAGE_MESSAGE: &str = "Mismatched plan output cols to parsed display columns";

/// Winning candidate awaiting resolution.
#[derive(Debug)]
pub struct UnresolvedPlan {
    candidate: CandidatePlan,
}

impl UnresolvedPlan {
    /// Wraps the selector's winner.
    pub fn new(candidate: CandidatePlan) -> Self {
        Self { candidate }
    }

    /// Renumbers nodes in pre-order from 1, then resolves schemas and
    /// column positions and runs the leakage check for reads.
    pub fn resolve(self, stmt: &LogicalStatement, catalog: &dyn CatalogProvider) -> Result<ResolvedPlan> {
        let CandidatePlan {
            mut root,
            read_only,
            cost,
            deterministic_order,
            routing,
        } = self.candidate;
        if read_only {
            root = PlanNode::unary(&mut PlanNodeIdAllocator::new(), PlanNodeKind::Send, root);
        }
        // Before resolving, so diagnostics name each node unambiguously.
        root.renumber(&mut PlanNodeIdAllocator::new());
        resolve_subtree(&mut root, catalog).map_err(PlannerError::internal)?;
        if read_only {
            check_display_columns(&root, stmt)?;
        }
        let columns = root
            .output_schema()
            .cloned()
            .ok_or_else(|| PlannerError::internal("resolved plan root has no output schema"))?;
        trace!(
            columns = columns.len(),
            nodes = root.node_ids().len(),
            "resolve.plan.resolved"
        );
        Ok(ResolvedPlan {
            root,
            columns,
            read_only,
            cost,
            deterministic_order,
            routing,
        })
    }
}

fn resolve_subtree(node: &mut PlanNode, catalog: &dyn CatalogProvider) -> std::result::Result<(), String> {
    for child in &mut node.children {
        resolve_subtree(child, catalog)?;
    }
    node.generate_output_schema(catalog)?;
    node.resolve_column_indexes()
}

/// The plan must output one column per display column, each locatable by
/// its names.
fn check_display_columns(root: &PlanNode, stmt: &LogicalStatement) -> Result<()> {
    let schema = root
        .output_schema()
        .ok_or_else(|| PlannerError::internal("plan root has no output schema"))?;
    if schema.len() != stmt.display_columns.len() {
        return Err(PlannerError::internal(format!(
            "{LEAKAGE_MESSAGE}: plan has {} columns, statement displays {}",
            schema.len(),
            stmt.display_columns.len()
        )));
    }
    for column in &stmt.display_columns {
        if schema
            .find(&column.table_name, &column.table_alias, &column.column_name, &column.alias)
            .is_none()
        {
            return Err(PlannerError::internal(format!(
                "{LEAKAGE_MESSAGE}: {} is missing",
                column.alias
            )));
        }
    }
    Ok(())
}

/// Plan with every schema generated and every column reference bound.
#[derive(Clone, Debug)]
pub struct ResolvedPlan {
    root: PlanNode,
    columns: NodeSchema,
    read_only: bool,
    cost: f64,
    deterministic_order: bool,
    routing: Routing,
}

impl ResolvedPlan {
    /// Plan root, always a `Send`.
    pub fn root(&self) -> &PlanNode {
        &self.root
    }

    /// Output schema of the root.
    pub fn columns(&self) -> &NodeSchema {
        &self.columns
    }

    /// True when nothing in the plan modifies data.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Estimated cost.
    pub fn cost(&self) -> f64 {
        self.cost
    }

    /// True when output order is guaranteed.
    pub fn deterministic_order(&self) -> bool {
        self.deterministic_order
    }

    /// Where the plan runs.
    pub fn routing(&self) -> &Routing {
        &self.routing
    }

    /// Gives up the root.
    pub fn into_root(self) -> PlanNode {
        self.root
    }
}
