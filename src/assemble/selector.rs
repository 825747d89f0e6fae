use std::fmt;
use std::sync::Arc;

use super::{CandidatePlan, PlanTrace};
use crate::config::DeterminismMode;

/// Names a statement in trace output.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatementLabel {
    /// Statement name.
    pub stmt_name: String,
    /// Owning procedure name.
    pub proc_name: String,
    /// Statement text.
    pub sql: String,
}

impl fmt::Display for StatementLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.proc_name.is_empty(), self.stmt_name.is_empty()) {
            (true, true) => f.write_str(&self.sql),
            (true, false) => f.write_str(&self.stmt_name),
            (false, true) => write!(f, "{}", self.proc_name),
            (false, false) => write!(f, "{}.{}", self.proc_name, self.stmt_name),
        }
    }
}

/// Keeps the best candidate of one assembly attempt.
///
/// A selector is built fresh for every attempt and moved into the
/// assembler, so nothing it saw leaks into the next attempt.
pub struct PlanSelector {
    label: Arc<StatementLabel>,
    trace: Arc<dyn PlanTrace>,
    determinism: DeterminismMode,
    best: Option<CandidatePlan>,
    considered: usize,
}

impl PlanSelector {
    /// Empty selector.
    pub fn new(label: Arc<StatementLabel>, trace: Arc<dyn PlanTrace>, determinism: DeterminismMode) -> Self {
        Self {
            label,
            trace,
            determinism,
            best: None,
            considered: 0,
        }
    }

    /// Offers a candidate. Lower cost wins and ties keep the earlier
    /// candidate; in [`DeterminismMode::Safer`] an order-deterministic
    /// candidate beats any nondeterministic one.
    pub fn consider(&mut self, candidate: CandidatePlan) {
        self.considered += 1;
        self.trace.candidate(&self.label, self.considered, &candidate);
        let replace = match &self.best {
            None => true,
            Some(best) => self.beats(&candidate, best),
        };
        if replace {
            self.best = Some(candidate);
        }
    }

    fn beats(&self, candidate: &CandidatePlan, best: &CandidatePlan) -> bool {
        if self.determinism == DeterminismMode::Safer
            && candidate.deterministic_order != best.deterministic_order
        {
            return candidate.deterministic_order;
        }
        candidate.cost < best.cost
    }

    /// Current best candidate.
    pub fn best(&self) -> Option<&CandidatePlan> {
        self.best.as_ref()
    }

    /// Number of candidates offered.
    pub fn considered(&self) -> usize {
        self.considered
    }

    /// Consumes the selector, reporting and returning the winner.
    pub fn finish(self) -> Option<CandidatePlan> {
        if let Some(best) = &self.best {
            self.trace.best_plan(&self.label, best, self.considered);
        }
        self.best
    }
}
