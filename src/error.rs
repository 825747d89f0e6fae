use thiserror::Error;

use crate::model::ModelError;
use crate::param::BindError;
use crate::sql::SyntaxError;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, PlannerError>;

/// Prefix carried by every [`PlannerError::Internal`] message.
pub const INTERNAL_ERROR_PREFIX: &str = "internal planner error";

/// Errors surfaced by the planning pipeline.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlannerError {
    /// Statement text was rejected by the parser.
    #[error("{0}")]
    Syntax(#[from] SyntaxError),
    /// Logical statement could not be built from the tree.
    #[error("{}", .0.with_code())]
    Modeling(#[from] ModelError),
    /// Too many tables were joined without a manual join order.
    #[error("{message}")]
    JoinComplexity {
        /// Full diagnostic, including the statement text.
        message: String,
    },
    /// The assembler found no plan.
    #[error("{0}")]
    Assembly(String),
    /// A literal could not be bound to its parameter type.
    #[error("{0}")]
    Binding(#[from] BindError),
    /// Plan consistency defect: leakage, unresolvable columns, malformed
    /// fragments.
    #[error("internal planner error: {0}")]
    Internal(String),
    /// The planner was driven out of order.
    #[error("planner used out of order: {0}")]
    InvalidState(&'static str),
}

impl PlannerError {
    /// Builds a [`PlannerError::Internal`].
    pub fn internal(message: impl Into<String>) -> Self {
        PlannerError::Internal(message.into())
    }

    /// True for errors that a parameterized attempt may discard before
    /// retrying on the original statement.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            PlannerError::Internal(_) | PlannerError::InvalidState(_)
        )
    }

    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            PlannerError::Syntax(_) => "Syntax",
            PlannerError::Modeling(err) => err.code(),
            PlannerError::JoinComplexity { .. } => "JoinComplexity",
            PlannerError::Assembly(_) => "Assembly",
            PlannerError::Binding(_) => "Binding",
            PlannerError::Internal(_) => "Internal",
            PlannerError::InvalidState(_) => "InvalidState",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_are_not_recoverable() {
        let err = PlannerError::internal("Mismatched plan output cols to parsed display columns");
        assert!(!err.is_recoverable());
        assert!(err.to_string().starts_with(INTERNAL_ERROR_PREFIX));
        assert!(PlannerError::Assembly("no plan".into()).is_recoverable());
    }

    #[test]
    fn modeling_errors_render_with_code() {
        let err = PlannerError::from(ModelError::UnknownTable {
            table: "NOPE".into(),
        });
        assert_eq!(err.to_string(), "[UnknownTable] unknown table 'NOPE'");
        assert_eq!(err.code(), "UnknownTable");
    }
}
