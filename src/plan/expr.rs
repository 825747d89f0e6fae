use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use super::schema::NodeSchema;
use crate::value::{Value, ValueType};

/// Reference to a column of a table (or of a derived output) that is
/// resolved to a position in the child schema after assembly.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ColumnRef {
    /// Base table name; empty for derived columns.
    pub table: String,
    /// Table alias in scope; empty for derived columns.
    pub alias: String,
    /// Column name (or derived output name).
    pub column: String,
    /// Column type.
    pub ty: ValueType,
    /// Position in the input schema, set by resolution.
    pub index: Option<usize>,
}

impl ColumnRef {
    /// Reference to `alias.column` of `table`.
    pub fn new(
        table: impl Into<String>,
        alias: impl Into<String>,
        column: impl Into<String>,
        ty: ValueType,
    ) -> Self {
        Self {
            table: table.into(),
            alias: alias.into(),
            column: column.into(),
            ty,
            index: None,
        }
    }

    /// Reference to a derived output column such as an aggregate result.
    pub fn derived(column: impl Into<String>, ty: ValueType) -> Self {
        Self::new("", "", column, ty)
    }

    /// True when both name the same column, ignoring resolution.
    pub fn same_column(&self, other: &ColumnRef) -> bool {
        self.table == other.table && self.alias == other.alias && self.column == other.column
    }
}

/// Comparison operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CmpOp {
    /// `=`
    Eq,
    /// `<>`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
}

impl CmpOp {
    /// SQL spelling.
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::NotEq => "<>",
            CmpOp::Lt => "<",
            CmpOp::LtEq => "<=",
            CmpOp::Gt => ">",
            CmpOp::GtEq => ">=",
        }
    }

    /// Operator with its operands swapped.
    pub fn flip(self) -> Self {
        match self {
            CmpOp::Lt => CmpOp::Gt,
            CmpOp::LtEq => CmpOp::GtEq,
            CmpOp::Gt => CmpOp::Lt,
            CmpOp::GtEq => CmpOp::LtEq,
            other => other,
        }
    }
}

/// Arithmetic operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ArithOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
}

impl ArithOp {
    /// SQL spelling.
    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        }
    }
}

/// Aggregate functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AggFunc {
    /// `COUNT(*)`
    CountStar,
    /// `COUNT(e)`
    Count,
    /// `SUM(e)`
    Sum,
    /// `MIN(e)`
    Min,
    /// `MAX(e)`
    Max,
    /// `AVG(e)`
    Avg,
}

impl AggFunc {
    /// SQL spelling.
    pub fn name(self) -> &'static str {
        match self {
            AggFunc::CountStar | AggFunc::Count => "COUNT",
            AggFunc::Sum => "SUM",
            AggFunc::Min => "MIN",
            AggFunc::Max => "MAX",
            AggFunc::Avg => "AVG",
        }
    }

    /// Result type for an argument of type `arg`.
    pub fn result_type(self, arg: Option<ValueType>) -> ValueType {
        match self {
            AggFunc::CountStar | AggFunc::Count => ValueType::BigInt,
            AggFunc::Avg => ValueType::Float,
            AggFunc::Sum => match arg {
                Some(ValueType::Float) => ValueType::Float,
                _ => ValueType::BigInt,
            },
            AggFunc::Min | AggFunc::Max => arg.unwrap_or(ValueType::BigInt),
        }
    }

    /// Function that combines per-partition partial results, when the
    /// aggregate can be split in two phases.
    pub fn combiner(self) -> Option<AggFunc> {
        match self {
            AggFunc::CountStar | AggFunc::Count | AggFunc::Sum => Some(AggFunc::Sum),
            AggFunc::Min => Some(AggFunc::Min),
            AggFunc::Max => Some(AggFunc::Max),
            AggFunc::Avg => None,
        }
    }
}

/// Scalar expression evaluated against one input row.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Expr {
    /// Column of the input row.
    Column(ColumnRef),
    /// Inline constant.
    Literal(Value),
    /// Parameter slot.
    Param {
        /// Zero-based slot.
        index: usize,
        /// Slot type.
        ty: ValueType,
    },
    /// Binary comparison.
    Compare {
        /// Operator.
        op: CmpOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Conjunction.
    And(Vec<Expr>),
    /// Disjunction.
    Or(Vec<Expr>),
    /// Negation.
    Not(Box<Expr>),
    /// `e IS NULL`.
    IsNull(Box<Expr>),
    /// Binary arithmetic.
    Arith {
        /// Operator.
        op: ArithOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Unary minus.
    Negate(Box<Expr>),
    /// Aggregate call. Only appears in logical statements; the assembler
    /// replaces it with a column of an aggregate node.
    Aggregate {
        /// Function.
        func: AggFunc,
        /// Argument, absent for `COUNT(*)`.
        arg: Option<Box<Expr>>,
        /// `DISTINCT` inside the call.
        distinct: bool,
    },
}

impl Expr {
    /// Column expression.
    pub fn column(
        table: impl Into<String>,
        alias: impl Into<String>,
        column: impl Into<String>,
        ty: ValueType,
    ) -> Self {
        Expr::Column(ColumnRef::new(table, alias, column, ty))
    }

    /// Comparison expression.
    pub fn compare(op: CmpOp, left: Expr, right: Expr) -> Self {
        Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Joins conjuncts back into one predicate.
    pub fn and_all(mut terms: Vec<Expr>) -> Option<Expr> {
        match terms.len() {
            0 => None,
            1 => terms.pop(),
            _ => Some(Expr::And(terms)),
        }
    }

    /// Splits a predicate into its top-level conjuncts.
    pub fn into_conjuncts(self) -> Vec<Expr> {
        match self {
            Expr::And(terms) => terms.into_iter().flat_map(Expr::into_conjuncts).collect(),
            other => vec![other],
        }
    }

    /// Immediate operands.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Column(_) | Expr::Literal(_) | Expr::Param { .. } => Vec::new(),
            Expr::Compare { left, right, .. } | Expr::Arith { left, right, .. } => {
                vec![left.as_ref(), right.as_ref()]
            }
            Expr::And(terms) | Expr::Or(terms) => terms.iter().collect(),
            Expr::Not(inner) | Expr::IsNull(inner) | Expr::Negate(inner) => vec![inner.as_ref()],
            Expr::Aggregate { arg, .. } => arg.iter().map(|a| a.as_ref()).collect(),
        }
    }

    /// Pre-order visit.
    pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        f(self);
        for child in self.children() {
            child.visit(f);
        }
    }

    /// Post-order mutable visit.
    pub fn visit_mut(&mut self, f: &mut impl FnMut(&mut Expr)) {
        match self {
            Expr::Column(_) | Expr::Literal(_) | Expr::Param { .. } => {}
            Expr::Compare { left, right, .. } | Expr::Arith { left, right, .. } => {
                left.visit_mut(f);
                right.visit_mut(f);
            }
            Expr::And(terms) | Expr::Or(terms) => {
                for term in terms {
                    term.visit_mut(f);
                }
            }
            Expr::Not(inner) | Expr::IsNull(inner) | Expr::Negate(inner) => inner.visit_mut(f),
            Expr::Aggregate { arg, .. } => {
                if let Some(arg) = arg {
                    arg.visit_mut(f);
                }
            }
        }
        f(self);
    }

    /// Column references in pre-order.
    pub fn column_refs(&self) -> Vec<&ColumnRef> {
        let mut refs = Vec::new();
        self.visit(&mut |e| {
            if let Expr::Column(c) = e {
                refs.push(c);
            }
        });
        refs
    }

    /// Table aliases the expression reads.
    pub fn table_aliases(&self) -> BTreeSet<String> {
        self.column_refs()
            .into_iter()
            .filter(|c| !c.alias.is_empty())
            .map(|c| c.alias.clone())
            .collect()
    }

    /// True when an aggregate call appears anywhere inside.
    pub fn contains_aggregate(&self) -> bool {
        let mut found = false;
        self.visit(&mut |e| found |= matches!(e, Expr::Aggregate { .. }));
        found
    }

    /// True for literals and parameters.
    pub fn is_constant(&self) -> bool {
        matches!(self, Expr::Literal(_) | Expr::Param { .. })
    }

    /// Parameter slots referenced, in pre-order.
    pub fn param_indexes(&self) -> Vec<usize> {
        let mut slots = Vec::new();
        self.visit(&mut |e| {
            if let Expr::Param { index, .. } = e {
                slots.push(*index);
            }
        });
        slots
    }

    /// Result type.
    pub fn value_type(&self) -> ValueType {
        match self {
            Expr::Column(c) => c.ty,
            Expr::Literal(v) => v.value_type().unwrap_or(ValueType::BigInt),
            Expr::Param { ty, .. } => *ty,
            Expr::Compare { .. } | Expr::And(_) | Expr::Or(_) | Expr::Not(_) | Expr::IsNull(_) => {
                ValueType::Boolean
            }
            Expr::Arith { left, right, .. } => {
                if left.value_type() == ValueType::Float || right.value_type() == ValueType::Float {
                    ValueType::Float
                } else {
                    ValueType::BigInt
                }
            }
            Expr::Negate(inner) => inner.value_type(),
            Expr::Aggregate { func, arg, .. } => {
                func.result_type(arg.as_ref().map(|a| a.value_type()))
            }
        }
    }

    /// Binds every column reference to its position in `schema`.
    pub fn resolve_indexes(&mut self, schema: &NodeSchema) -> Result<(), String> {
        let mut failure = None;
        self.visit_mut(&mut |e| {
            if failure.is_some() {
                return;
            }
            match e {
                Expr::Column(c) => match schema.resolve(c) {
                    Ok(index) => c.index = Some(index),
                    Err(err) => failure = Some(err),
                },
                Expr::Aggregate { .. } => {
                    failure = Some(format!("aggregate {e} was not planned into an aggregate node"));
                }
                _ => {}
            }
        });
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(c) if c.alias.is_empty() => write!(f, "{}", c.column),
            Expr::Column(c) => write!(f, "{}.{}", c.alias, c.column),
            Expr::Literal(v) => write!(f, "{v}"),
            Expr::Param { index, .. } => write!(f, "?{index}"),
            Expr::Compare { op, left, right } => write!(f, "({left} {} {right})", op.symbol()),
            Expr::Arith { op, left, right } => write!(f, "({left} {} {right})", op.symbol()),
            Expr::And(terms) | Expr::Or(terms) => {
                let sep = if matches!(self, Expr::And(_)) { " AND " } else { " OR " };
                f.write_str("(")?;
                for (i, term) in terms.iter().enumerate() {
                    if i > 0 {
                        f.write_str(sep)?;
                    }
                    write!(f, "{term}")?;
                }
                f.write_str(")")
            }
            Expr::Not(inner) => write!(f, "NOT {inner}"),
            Expr::IsNull(inner) => write!(f, "{inner} IS NULL"),
            Expr::Negate(inner) => write!(f, "-{inner}"),
            Expr::Aggregate {
                func: AggFunc::CountStar,
                ..
            } => f.write_str("COUNT(*)"),
            Expr::Aggregate {
                func,
                arg,
                distinct,
            } => {
                write!(f, "{}(", func.name())?;
                if *distinct {
                    f.write_str("DISTINCT ")?;
                }
                if let Some(arg) = arg {
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}
