//! Literal auto-parameterization.
//!
//! Rewrites every non-NULL literal of a statement tree into a positional
//! parameter marker so structurally identical statements share one cached
//! plan. The extracted literals stay as unbound [`LiteralToken`]s until the
//! compiled plan tells us which type each slot has.

#![forbid(unsafe_code)]

use serde::Serialize;
use thiserror::Error;

use crate::sql::names::*;
use crate::sql::Element;
use crate::value::{LiteralKind, LiteralToken, Value, ValueType};

/// Failure to bind literal tokens to parameter types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BindError {
    /// The plan expects a different number of parameters.
    #[error("expected {expected} parameter values, found {found}")]
    CountMismatch {
        /// Slots in the plan.
        expected: usize,
        /// Literal tokens available.
        found: usize,
    },
    /// A literal cannot be represented in its slot's type.
    #[error("parameter {slot}: cannot convert {literal} to {target}")]
    Incompatible {
        /// Zero-based slot.
        slot: usize,
        /// Literal as written.
        literal: String,
        /// Slot type.
        target: ValueType,
    },
}

/// Values bound to the parameter slots of a compiled plan, in slot order.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ParameterSet(Vec<Value>);

impl ParameterSet {
    /// Wraps already-typed values.
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// Value of slot `index`.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// All values in slot order.
    pub fn values(&self) -> &[Value] {
        &self.0
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no slot is bound.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Value>> for ParameterSet {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

/// Parameterized tree plus the literals lifted out of it.
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterizationInfo {
    parameterized: Element,
    literals: Vec<LiteralToken>,
}

impl ParameterizationInfo {
    /// Rewrites `tree`, or returns `None` when parameterization does not
    /// apply: the statement kind is not cacheable, the statement already
    /// carries user `?` parameters, or it has no non-NULL literal.
    pub fn parameterize(tree: &Element) -> Option<Self> {
        if !matches!(tree.name.as_str(), SELECT | INSERT | UPDATE | DELETE) {
            return None;
        }
        if find_user_parameters(tree) > 0 {
            return None;
        }
        let mut parameterized = tree.clone();
        let mut literals = Vec::new();
        parameterized.walk_mut(&mut |element| {
            if element.name != VALUE || element.flag(ATTR_ISPARAM) {
                return;
            }
            let kind = match element.attr(ATTR_VALUETYPE).and_then(LiteralKind::parse) {
                Some(LiteralKind::Null) | None => return,
                Some(kind) => kind,
            };
            let Some(text) = element.remove_attr(ATTR_VALUE) else {
                return;
            };
            element.set_attr(ATTR_ISPARAM, "true");
            element.set_attr(ATTR_INDEX, literals.len().to_string());
            literals.push(LiteralToken::new(kind, text));
        });
        if literals.is_empty() {
            return None;
        }
        if let Some(parameters) = parameterized.child_mut(PARAMETERS) {
            for (index, token) in literals.iter().enumerate() {
                parameters.push(
                    Element::new(PARAMETER)
                        .with_attr(ATTR_INDEX, index.to_string())
                        .with_attr(ATTR_VALUETYPE, token.kind.as_str()),
                );
            }
        }
        Some(Self {
            parameterized,
            literals,
        })
    }

    /// The rewritten tree.
    pub fn parameterized_tree(&self) -> &Element {
        &self.parameterized
    }

    /// Extracted literals in slot order.
    pub fn literal_values(&self) -> &[LiteralToken] {
        &self.literals
    }

    /// Binds every literal to the type of its slot.
    pub fn extracted_param_values(&self, types: &[ValueType]) -> Result<ParameterSet, BindError> {
        bind_literals(&self.literals, types)
    }

    /// Substitutes the literals back, reproducing the original tree.
    pub fn restore(&self) -> Element {
        let mut tree = self.parameterized.clone();
        tree.walk_mut(&mut |element| {
            if element.name != VALUE || !element.flag(ATTR_ISPARAM) {
                return;
            }
            let slot = element
                .attr(ATTR_INDEX)
                .and_then(|index| index.parse::<usize>().ok())
                .and_then(|index| self.literals.get(index));
            if let Some(token) = slot {
                let text = token.text.clone();
                element.remove_attr(ATTR_ISPARAM);
                element.remove_attr(ATTR_INDEX);
                element.set_attr(ATTR_VALUE, text);
            }
        });
        if let Some(parameters) = tree.child_mut(PARAMETERS) {
            parameters.children.clear();
        }
        tree
    }
}

/// Counts the user `?` markers already present in a tree.
pub fn find_user_parameters(tree: &Element) -> usize {
    let mut count = 0;
    tree.walk(&mut |element| {
        if element.name == VALUE && element.flag(ATTR_ISPARAM) {
            count += 1;
        }
    });
    count
}

/// Coerces each token to the type at the same position.
pub fn bind_literals(literals: &[LiteralToken], types: &[ValueType]) -> Result<ParameterSet, BindError> {
    if literals.len() != types.len() {
        return Err(BindError::CountMismatch {
            expected: types.len(),
            found: literals.len(),
        });
    }
    literals
        .iter()
        .zip(types)
        .enumerate()
        .map(|(slot, (token, ty))| {
            token.coerce(*ty).ok_or_else(|| BindError::Incompatible {
                slot,
                literal: token.to_string(),
                target: *ty,
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(ParameterSet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::{SqlParser, StatementParser};

    fn parse(sql: &str) -> Element {
        SqlParser.parse(sql).expect("parse succeeds")
    }

    #[test]
    fn literals_become_markers_in_order() {
        let tree = parse("SELECT * FROM T WHERE a = 5 AND b = 'x'");
        let info = ParameterizationInfo::parameterize(&tree).expect("applies");
        assert_eq!(
            info.literal_values(),
            &[
                LiteralToken::new(LiteralKind::Integer, "5"),
                LiteralToken::new(LiteralKind::String, "x"),
            ]
        );
        assert_eq!(find_user_parameters(info.parameterized_tree()), 2);
        let params = info
            .parameterized_tree()
            .child(PARAMETERS)
            .expect("parameters");
        assert_eq!(params.children.len(), 2);
        assert_eq!(params.children[1].attr(ATTR_VALUETYPE), Some("string"));
        assert_eq!(info.restore(), tree);
    }

    #[test]
    fn original_tree_is_untouched() {
        let tree = parse("SELECT a FROM t WHERE a = 1");
        let before = tree.clone();
        let _ = ParameterizationInfo::parameterize(&tree);
        assert_eq!(tree, before);
    }

    #[test]
    fn null_literals_and_user_parameters_opt_out() {
        assert!(ParameterizationInfo::parameterize(&parse("SELECT a FROM t WHERE a IS NULL")).is_none());
        assert!(ParameterizationInfo::parameterize(&parse("UPDATE t SET a = NULL")).is_none());
        assert!(ParameterizationInfo::parameterize(&parse("SELECT a FROM t WHERE a = ? AND b = 2")).is_none());
        assert!(ParameterizationInfo::parameterize(&Element::new("explain")).is_none());
    }

    #[test]
    fn null_literals_stay_inline() {
        let tree = parse("INSERT INTO t VALUES (1, NULL)");
        let info = ParameterizationInfo::parameterize(&tree).expect("applies");
        assert_eq!(info.literal_values().len(), 1);
        assert_eq!(info.restore(), tree);
    }

    #[test]
    fn binding_checks_count_and_types() {
        let info = ParameterizationInfo::parameterize(&parse("SELECT a FROM t WHERE a = 300 AND b = 'q'"))
            .expect("applies");
        let bound = info
            .extracted_param_values(&[ValueType::Integer, ValueType::Varchar])
            .expect("binds");
        assert_eq!(bound.values(), &[Value::Int(300), Value::from("q")]);

        let err = info
            .extracted_param_values(&[ValueType::TinyInt, ValueType::Varchar])
            .expect_err("out of range");
        assert!(matches!(err, BindError::Incompatible { slot: 0, .. }));
        let err = info
            .extracted_param_values(&[ValueType::Integer])
            .expect_err("count");
        assert_eq!(err, BindError::CountMismatch { expected: 1, found: 2 });
    }
}
