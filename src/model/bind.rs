//! Name resolution and expression lowering for one statement.

use super::errors::ModelError;
use crate::catalog::TableDef;
use crate::logical::TableRef;
use crate::plan::{AggFunc, ArithOp, CmpOp, ColumnRef, Expr};
use crate::sql::names::*;
use crate::sql::Element;
use crate::value::{LiteralKind, LiteralToken, Value, ValueType};

/// Tables visible to column references.
pub(crate) struct Scope<'a> {
    tables: Vec<(TableRef, &'a TableDef)>,
}

impl<'a> Scope<'a> {
    pub(crate) fn new() -> Self {
        Self { tables: Vec::new() }
    }

    pub(crate) fn push(&mut self, table: TableRef, def: &'a TableDef) -> Result<(), ModelError> {
        if self.tables.iter().any(|(t, _)| t.alias == table.alias) {
            return Err(ModelError::DuplicateTableAlias { alias: table.alias });
        }
        self.tables.push((table, def));
        Ok(())
    }

    pub(crate) fn tables(&self) -> impl Iterator<Item = &(TableRef, &'a TableDef)> {
        self.tables.iter()
    }

    /// Entries a qualifier names: an alias first, then a table name.
    pub(crate) fn qualified(&self, qualifier: &str) -> Vec<&(TableRef, &'a TableDef)> {
        let by_alias: Vec<_> = self.tables.iter().filter(|(t, _)| t.alias == qualifier).collect();
        if !by_alias.is_empty() {
            return by_alias;
        }
        self.tables.iter().filter(|(t, _)| t.table == qualifier).collect()
    }

    pub(crate) fn resolve_column(&self, qualifier: Option<&str>, column: &str) -> Result<ColumnRef, ModelError> {
        let candidates: Vec<&(TableRef, &TableDef)> = match qualifier {
            Some(q) => {
                let entries = self.qualified(q);
                if entries.is_empty() {
                    return Err(ModelError::UnknownTable { table: q.to_string() });
                }
                entries
            }
            None => self.tables.iter().collect(),
        };
        let display = match qualifier {
            Some(q) => format!("{q}.{column}"),
            None => column.to_string(),
        };
        let mut found = candidates
            .into_iter()
            .filter_map(|(table, def)| def.column(column).map(|(_, c)| (table, c)));
        let Some((table, def)) = found.next() else {
            return Err(ModelError::UnknownColumn { column: display });
        };
        if found.next().is_some() {
            return Err(ModelError::AmbiguousColumn { column: display });
        }
        Ok(ColumnRef::new(&table.table, &table.alias, &def.name, def.ty))
    }
}

/// Lowers tree expressions into [`Expr`]s, collecting parameter types from
/// the contexts parameters appear in.
pub(crate) struct Binder<'s, 'a> {
    scope: &'s Scope<'a>,
    literals: Option<&'s [LiteralToken]>,
    slots: Vec<Option<ValueType>>,
}

impl<'s, 'a> Binder<'s, 'a> {
    pub(crate) fn new(scope: &'s Scope<'a>, literals: Option<&'s [LiteralToken]>, slot_count: usize) -> Self {
        Self {
            scope,
            literals,
            slots: vec![None; slot_count],
        }
    }

    pub(crate) fn scope(&self) -> &Scope<'a> {
        self.scope
    }

    /// Lowers an expression element; `expected` is the type its context
    /// demands, used to type literals and parameters.
    pub(crate) fn lower(&mut self, element: &Element, expected: Option<ValueType>) -> Result<Expr, ModelError> {
        match element.name.as_str() {
            COLUMNREF => {
                let column = element
                    .attr(ATTR_COLUMN)
                    .ok_or_else(|| ModelError::malformed("columnref without column"))?;
                self.scope
                    .resolve_column(element.attr(ATTR_TABLE), column)
                    .map(Expr::Column)
            }
            VALUE if element.flag(ATTR_ISPARAM) => {
                let index = slot_index(element)?;
                let slot = self
                    .slots
                    .get_mut(index)
                    .ok_or_else(|| ModelError::malformed(format!("parameter {index} has no slot")))?;
                if slot.is_none() {
                    *slot = expected;
                }
                Ok(Expr::Param {
                    index,
                    ty: expected.unwrap_or(ValueType::BigInt),
                })
            }
            VALUE => {
                let kind = element
                    .attr(ATTR_VALUETYPE)
                    .and_then(LiteralKind::parse)
                    .ok_or_else(|| ModelError::malformed("value without a known valuetype"))?;
                if kind == LiteralKind::Null {
                    return Ok(Expr::Literal(Value::Null));
                }
                let text = element
                    .attr(ATTR_VALUE)
                    .ok_or_else(|| ModelError::malformed("literal without text"))?;
                let token = LiteralToken::new(kind, text);
                let value = match expected {
                    Some(ty) => token.coerce(ty).ok_or_else(|| {
                        ModelError::type_mismatch(format!("{token} is not a valid {ty}"))
                    })?,
                    None => token
                        .to_value()
                        .ok_or_else(|| ModelError::type_mismatch(format!("{token} is out of range")))?,
                };
                Ok(Expr::Literal(value))
            }
            OPERATION => self.lower_operation(element),
            AGGREGATION => self.lower_aggregate(element),
            other => Err(ModelError::malformed(format!("unexpected element '{other}' in expression"))),
        }
    }

    fn lower_operation(&mut self, element: &Element) -> Result<Expr, ModelError> {
        let optype = element
            .attr(ATTR_OPTYPE)
            .ok_or_else(|| ModelError::malformed("operation without optype"))?;
        let operands = &element.children;
        let arity = |n: usize| {
            if operands.len() == n {
                Ok(())
            } else {
                Err(ModelError::malformed(format!(
                    "operation '{optype}' expects {n} operands, got {}",
                    operands.len()
                )))
            }
        };
        let cmp = match optype {
            "equal" => Some(CmpOp::Eq),
            "notequal" => Some(CmpOp::NotEq),
            "lessthan" => Some(CmpOp::Lt),
            "lessthanorequalto" => Some(CmpOp::LtEq),
            "greaterthan" => Some(CmpOp::Gt),
            "greaterthanorequalto" => Some(CmpOp::GtEq),
            _ => None,
        };
        if let Some(op) = cmp {
            arity(2)?;
            let (left, right) = self.lower_pair(&operands[0], &operands[1])?;
            return Ok(Expr::compare(op, left, right));
        }
        let arith = match optype {
            "add" => Some(ArithOp::Add),
            "subtract" => Some(ArithOp::Sub),
            "multiply" => Some(ArithOp::Mul),
            "divide" => Some(ArithOp::Div),
            _ => None,
        };
        if let Some(op) = arith {
            arity(2)?;
            let (left, right) = self.lower_arith_pair(&operands[0], &operands[1])?;
            for side in [&left, &right] {
                let ty = side.value_type();
                if !ty.is_numeric() {
                    return Err(ModelError::type_mismatch(format!(
                        "arithmetic on {ty} operand {side}"
                    )));
                }
            }
            return Ok(Expr::Arith {
                op,
                left: Box::new(left),
                right: Box::new(right),
            });
        }
        match optype {
            "and" | "or" => {
                let mut terms = Vec::with_capacity(operands.len());
                for operand in operands {
                    terms.push(self.lower(operand, Some(ValueType::Boolean))?);
                }
                Ok(if optype == "and" {
                    Expr::And(terms)
                } else {
                    Expr::Or(terms)
                })
            }
            "not" => {
                arity(1)?;
                Ok(Expr::Not(Box::new(self.lower(&operands[0], Some(ValueType::Boolean))?)))
            }
            "isnull" => {
                arity(1)?;
                Ok(Expr::IsNull(Box::new(self.lower(&operands[0], None)?)))
            }
            "negate" => {
                arity(1)?;
                let inner = self.lower(&operands[0], None)?;
                if !inner.value_type().is_numeric() {
                    return Err(ModelError::type_mismatch(format!("cannot negate {inner}")));
                }
                Ok(Expr::Negate(Box::new(inner)))
            }
            other => Err(ModelError::malformed(format!("unknown operation '{other}'"))),
        }
    }

    /// Lowers two operands so a constant side takes the type of the other.
    fn lower_pair(&mut self, left_el: &Element, right_el: &Element) -> Result<(Expr, Expr), ModelError> {
        let mut left = self.lower(left_el, None)?;
        let mut right = self.lower(right_el, None)?;
        if !left.is_constant() && right.is_constant() {
            right = self.lower(right_el, Some(left.value_type()))?;
        } else if left.is_constant() && !right.is_constant() {
            left = self.lower(left_el, Some(right.value_type()))?;
        }
        Ok((left, right))
    }

    /// Arithmetic keeps literals at their natural type; only a user `?`
    /// takes the type of the other operand.
    fn lower_arith_pair(&mut self, left_el: &Element, right_el: &Element) -> Result<(Expr, Expr), ModelError> {
        let mut left = self.lower(left_el, None)?;
        let mut right = self.lower(right_el, None)?;
        if self.literals.is_none() {
            if matches!(right, Expr::Param { .. }) && !left.is_constant() {
                right = self.lower(right_el, Some(left.value_type()))?;
            } else if matches!(left, Expr::Param { .. }) && !right.is_constant() {
                left = self.lower(left_el, Some(right.value_type()))?;
            }
        }
        Ok((left, right))
    }

    fn lower_aggregate(&mut self, element: &Element) -> Result<Expr, ModelError> {
        let optype = element
            .attr(ATTR_OPTYPE)
            .ok_or_else(|| ModelError::malformed("aggregation without optype"))?;
        let func = match optype {
            "count" if element.flag(ATTR_STAR) => AggFunc::CountStar,
            "count" => AggFunc::Count,
            "sum" => AggFunc::Sum,
            "min" => AggFunc::Min,
            "max" => AggFunc::Max,
            "avg" => AggFunc::Avg,
            other => return Err(ModelError::malformed(format!("unknown aggregate '{other}'"))),
        };
        let arg = match (func, element.children.first()) {
            (AggFunc::CountStar, _) => None,
            (_, Some(arg)) => Some(self.lower(arg, None)?),
            (_, None) => return Err(ModelError::malformed("aggregate without argument")),
        };
        if let Some(arg) = &arg {
            if arg.contains_aggregate() {
                return Err(ModelError::NestedAggregate);
            }
            let ty = arg.value_type();
            if matches!(func, AggFunc::Sum | AggFunc::Avg) && !ty.is_numeric() {
                return Err(ModelError::NonNumericAggregate {
                    func: func.name(),
                    found: ty,
                });
            }
        }
        Ok(Expr::Aggregate {
            func,
            arg: arg.map(Box::new),
            distinct: element.flag(ATTR_DISTINCT),
        })
    }

    /// Final type of every slot: the context type, else the extracted
    /// literal's natural type.
    pub(crate) fn finish(self) -> Result<Vec<ValueType>, ModelError> {
        let literals = self.literals;
        self.slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.or_else(|| {
                    literals
                        .and_then(|l| l.get(index))
                        .and_then(|token| token.kind.default_type())
                })
                .ok_or(ModelError::UntypedParameter { index })
            })
            .collect()
    }
}

fn slot_index(element: &Element) -> Result<usize, ModelError> {
    element
        .attr(ATTR_INDEX)
        .and_then(|i| i.parse::<usize>().ok())
        .ok_or_else(|| ModelError::malformed("parameter marker without index"))
}

/// Rewrites every parameter in `expr` to carry its final slot type.
pub(crate) fn apply_param_types(expr: &mut Expr, types: &[ValueType]) {
    expr.visit_mut(&mut |e| {
        if let Expr::Param { index, ty } = e {
            if let Some(final_ty) = types.get(*index) {
                *ty = *final_ty;
            }
        }
    });
}
