//! Stage notifications emitted while a statement is planned.

use parking_lot::Mutex;
use tracing::debug;

use super::{CandidatePlan, StatementLabel};
use crate::compiled::CompiledPlan;
use crate::logical::LogicalStatement;
use crate::sql::Element;
use crate::value::LiteralToken;

/// Receives planner stage notifications. Every hook defaults to a no-op.
pub trait PlanTrace: Send + Sync {
    /// Statement text was parsed into a tree.
    fn parsed(&self, _label: &StatementLabel, _tree: &Element) {}

    /// Literals were extracted from the tree.
    fn parameterized(&self, _label: &StatementLabel, _tree: &Element, _literals: &[LiteralToken]) {}

    /// A logical statement was built for one attempt.
    fn modeled(&self, _label: &StatementLabel, _stmt: &LogicalStatement) {}

    /// The assembler offered a candidate; `ordinal` counts from 1.
    fn candidate(&self, _label: &StatementLabel, _ordinal: usize, _plan: &CandidatePlan) {}

    /// The selector settled on its best candidate.
    fn best_plan(&self, _label: &StatementLabel, _plan: &CandidatePlan, _considered: usize) {}

    /// An attempt produced its final plan.
    fn compiled(&self, _label: &StatementLabel, _plan: &CompiledPlan) {}
}

/// Trace sink that drops every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopPlanTrace;

impl PlanTrace for NoopPlanTrace {}

/// Emits every stage as a `tracing` debug event unless suppressed.
#[derive(Clone, Copy, Debug)]
pub struct TracingPlanTrace {
    suppress: bool,
}

impl TracingPlanTrace {
    /// Sink that is silent when `suppress` is set.
    pub fn new(suppress: bool) -> Self {
        Self { suppress }
    }
}

impl PlanTrace for TracingPlanTrace {
    fn parsed(&self, label: &StatementLabel, tree: &Element) {
        if self.suppress {
            return;
        }
        debug!(stmt = %label, tree = %tree.to_min_string(), "planner.trace.parsed");
    }

    fn parameterized(&self, label: &StatementLabel, tree: &Element, literals: &[LiteralToken]) {
        if self.suppress {
            return;
        }
        debug!(
            stmt = %label,
            tree = %tree.to_min_string(),
            literals = literals.len(),
            "planner.trace.parameterized"
        );
    }

    fn modeled(&self, label: &StatementLabel, stmt: &LogicalStatement) {
        if self.suppress {
            return;
        }
        debug!(
            stmt = %label,
            kind = ?stmt.kind,
            tables = stmt.tables.len(),
            params = stmt.param_types.len(),
            "planner.trace.modeled"
        );
    }

    fn candidate(&self, label: &StatementLabel, ordinal: usize, plan: &CandidatePlan) {
        if self.suppress {
            return;
        }
        debug!(
            stmt = %label,
            ordinal,
            cost = plan.cost,
            shape = %plan.root.shape(),
            "planner.trace.candidate"
        );
    }

    fn best_plan(&self, label: &StatementLabel, plan: &CandidatePlan, considered: usize) {
        if self.suppress {
            return;
        }
        debug!(
            stmt = %label,
            considered,
            cost = plan.cost,
            shape = %plan.root.shape(),
            "planner.trace.best_plan"
        );
    }

    fn compiled(&self, label: &StatementLabel, plan: &CompiledPlan) {
        if self.suppress {
            return;
        }
        debug!(
            stmt = %label,
            from_parameterized = plan.from_parameterized,
            plan_hash = plan.plan_hash,
            fragments = plan.fragments.len(),
            "planner.trace.compiled"
        );
    }
}

/// One recorded notification.
#[derive(Clone, Debug, PartialEq)]
pub enum TraceEvent {
    /// See [`PlanTrace::parsed`].
    Parsed,
    /// See [`PlanTrace::parameterized`].
    Parameterized {
        /// Extracted literal count.
        literals: usize,
    },
    /// See [`PlanTrace::modeled`].
    Modeled {
        /// Parameter slots of the statement.
        params: usize,
    },
    /// See [`PlanTrace::candidate`].
    Candidate {
        /// Candidate ordinal.
        ordinal: usize,
        /// Candidate cost.
        cost: f64,
    },
    /// See [`PlanTrace::best_plan`].
    BestPlan {
        /// Candidates considered.
        considered: usize,
        /// Winning cost.
        cost: f64,
    },
    /// See [`PlanTrace::compiled`].
    Compiled {
        /// Whether the plan came from the parameterized attempt.
        from_parameterized: bool,
    },
}

/// Keeps every notification in memory.
#[derive(Debug, Default)]
pub struct RecordingPlanTrace {
    events: Mutex<Vec<TraceEvent>>,
}

impl RecordingPlanTrace {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Events so far, oldest first.
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().clone()
    }

    fn record(&self, event: TraceEvent) {
        self.events.lock().push(event);
    }
}

impl PlanTrace for RecordingPlanTrace {
    fn parsed(&self, _label: &StatementLabel, _tree: &Element) {
        self.record(TraceEvent::Parsed);
    }

    fn parameterized(&self, _label: &StatementLabel, _tree: &Element, literals: &[LiteralToken]) {
        self.record(TraceEvent::Parameterized {
            literals: literals.len(),
        });
    }

    fn modeled(&self, _label: &StatementLabel, stmt: &LogicalStatement) {
        self.record(TraceEvent::Modeled {
            params: stmt.param_types.len(),
        });
    }

    fn candidate(&self, _label: &StatementLabel, ordinal: usize, plan: &CandidatePlan) {
        self.record(TraceEvent::Candidate {
            ordinal,
            cost: plan.cost,
        });
    }

    fn best_plan(&self, _label: &StatementLabel, plan: &CandidatePlan, considered: usize) {
        self.record(TraceEvent::BestPlan {
            considered,
            cost: plan.cost,
        });
    }

    fn compiled(&self, _label: &StatementLabel, plan: &CompiledPlan) {
        self.record(TraceEvent::Compiled {
            from_parameterized: plan.from_parameterized,
        });
    }
}
