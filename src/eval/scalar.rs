//! Scalar expression evaluation with SQL three-valued logic.

use std::cmp::Ordering;

use super::{EvalError, Row};
use crate::param::ParameterSet;
use crate::plan::{ArithOp, CmpOp, Expr};
use crate::value::Value;

/// Evaluates `expr` against `row`. Columns are read by resolved index only.
pub(crate) fn eval(expr: &Expr, row: &[Value], params: &ParameterSet) -> Result<Value, EvalError> {
    match expr {
        Expr::Column(c) => {
            let index = c
                .index
                .ok_or_else(|| EvalError::UnresolvedColumn(c.column.clone()))?;
            row.get(index)
                .cloned()
                .ok_or_else(|| EvalError::UnresolvedColumn(format!("{} at {index}", c.column)))
        }
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Param { index, .. } => params
            .get(*index)
            .cloned()
            .ok_or(EvalError::MissingParameter(*index)),
        Expr::Compare { op, left, right } => {
            let l = eval(left, row, params)?;
            let r = eval(right, row, params)?;
            Ok(compare(*op, &l, &r))
        }
        Expr::And(terms) => {
            let mut saw_null = false;
            for term in terms {
                match truth(&eval(term, row, params)?)? {
                    Some(false) => return Ok(Value::Bool(false)),
                    None => saw_null = true,
                    Some(true) => {}
                }
            }
            Ok(if saw_null { Value::Null } else { Value::Bool(true) })
        }
        Expr::Or(terms) => {
            let mut saw_null = false;
            for term in terms {
                match truth(&eval(term, row, params)?)? {
                    Some(true) => return Ok(Value::Bool(true)),
                    None => saw_null = true,
                    Some(false) => {}
                }
            }
            Ok(if saw_null { Value::Null } else { Value::Bool(false) })
        }
        Expr::Not(inner) => Ok(match truth(&eval(inner, row, params)?)? {
            Some(b) => Value::Bool(!b),
            None => Value::Null,
        }),
        Expr::IsNull(inner) => Ok(Value::Bool(eval(inner, row, params)?.is_null())),
        Expr::Arith { op, left, right } => {
            let l = eval(left, row, params)?;
            let r = eval(right, row, params)?;
            arith(*op, &l, &r)
        }
        Expr::Negate(inner) => match eval(inner, row, params)? {
            Value::Null => Ok(Value::Null),
            Value::Int(v) => v.checked_neg().map(Value::Int).ok_or(EvalError::Overflow),
            Value::Float(v) => Ok(Value::Float(-v)),
            other => Err(EvalError::TypeMismatch(format!("cannot negate {other}"))),
        },
        Expr::Aggregate { .. } => Err(EvalError::MalformedPlan(format!(
            "aggregate {expr} outside an aggregate node"
        ))),
    }
}

/// True only when the predicate evaluates to TRUE.
pub(crate) fn passes(predicate: Option<&Expr>, row: &[Value], params: &ParameterSet) -> Result<bool, EvalError> {
    match predicate {
        None => Ok(true),
        Some(p) => Ok(truth(&eval(p, row, params)?)? == Some(true)),
    }
}

fn truth(value: &Value) -> Result<Option<bool>, EvalError> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(*b)),
        other => Err(EvalError::TypeMismatch(format!("{other} is not a boolean"))),
    }
}

fn compare(op: CmpOp, l: &Value, r: &Value) -> Value {
    let Some(ord) = l.sql_cmp(r) else {
        return Value::Null;
    };
    Value::Bool(match op {
        CmpOp::Eq => ord == Ordering::Equal,
        CmpOp::NotEq => ord != Ordering::Equal,
        CmpOp::Lt => ord == Ordering::Less,
        CmpOp::LtEq => ord != Ordering::Greater,
        CmpOp::Gt => ord == Ordering::Greater,
        CmpOp::GtEq => ord != Ordering::Less,
    })
}

pub(crate) fn arith(op: ArithOp, l: &Value, r: &Value) -> Result<Value, EvalError> {
    match (l, r) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Int(a), Value::Int(b)) => {
            let result = match op {
                ArithOp::Add => a.checked_add(*b),
                ArithOp::Sub => a.checked_sub(*b),
                ArithOp::Mul => a.checked_mul(*b),
                ArithOp::Div => {
                    if *b == 0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    a.checked_div(*b)
                }
            };
            result.map(Value::Int).ok_or(EvalError::Overflow)
        }
        _ => {
            let (Some(a), Some(b)) = (as_f64(l), as_f64(r)) else {
                return Err(EvalError::TypeMismatch(format!(
                    "{l} {} {r} is not numeric",
                    op.symbol()
                )));
            };
            Ok(Value::Float(match op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
                ArithOp::Mul => a * b,
                ArithOp::Div => a / b,
            }))
        }
    }
}

pub(crate) fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Int(v) => Some(*v as f64),
        Value::Float(v) => Some(*v),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::ColumnRef;
    use crate::value::ValueType;

    fn col(index: usize) -> Expr {
        let mut c = ColumnRef::new("T", "T", format!("C{index}"), ValueType::Integer);
        c.index = Some(index);
        Expr::Column(c)
    }

    #[test]
    fn null_comparisons_are_unknown() {
        let row = vec![Value::Null, Value::Int(3)];
        let params = ParameterSet::default();
        let eq = Expr::compare(CmpOp::Eq, col(0), col(1));
        assert_eq!(eval(&eq, &row, &params), Ok(Value::Null));
        assert!(!passes(Some(&eq), &row, &params).expect("evaluates"));

        let either = Expr::Or(vec![eq.clone(), Expr::compare(CmpOp::Gt, col(1), Expr::Literal(Value::Int(1)))]);
        assert_eq!(eval(&either, &row, &params), Ok(Value::Bool(true)));
        let both = Expr::And(vec![eq, Expr::Literal(Value::Bool(true))]);
        assert_eq!(eval(&both, &row, &params), Ok(Value::Null));
    }

    #[test]
    fn arithmetic_is_checked() {
        assert_eq!(
            arith(ArithOp::Add, &Value::Int(i64::MAX), &Value::Int(1)),
            Err(EvalError::Overflow)
        );
        assert_eq!(
            arith(ArithOp::Div, &Value::Int(1), &Value::Int(0)),
            Err(EvalError::DivisionByZero)
        );
        assert_eq!(
            arith(ArithOp::Mul, &Value::Int(2), &Value::Float(1.5)),
            Ok(Value::Float(3.0))
        );
    }

    #[test]
    fn parameters_and_unresolved_columns() {
        let params = ParameterSet::new(vec![Value::Int(9)]);
        let param = Expr::Param {
            index: 0,
            ty: ValueType::Integer,
        };
        assert_eq!(eval(&param, &[], &params), Ok(Value::Int(9)));
        let missing = Expr::Param {
            index: 1,
            ty: ValueType::Integer,
        };
        assert_eq!(eval(&missing, &[], &params), Err(EvalError::MissingParameter(1)));
        let unresolved = Expr::column("T", "T", "A", ValueType::Integer);
        assert!(matches!(
            eval(&unresolved, &[Value::Int(1)], &params),
            Err(EvalError::UnresolvedColumn(_))
        ));
    }
}
