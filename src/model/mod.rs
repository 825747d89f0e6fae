//! Statement modeling: binds an intermediate tree to the catalog and
//! produces a [`LogicalStatement`].
//!
//! The same modeler handles raw trees and parameterized trees. For the
//! latter, the extracted literal tokens are supplied so parameter slots
//! that no context types fall back to the literal's natural type.

#![forbid(unsafe_code)]

mod bind;
mod errors;

use tracing::trace;

pub use errors::{ModelError, ModelErrorWithCode};

use bind::{apply_param_types, Binder, Scope};
use crate::catalog::CatalogProvider;
use crate::logical::{DisplayColumn, LogicalStatement, StatementKind, TableRef};
use crate::plan::{ColumnAssignment, Expr, SortKey};
use crate::sql::names::*;
use crate::sql::Element;
use crate::value::{LiteralToken, Value, ValueType};

/// Everything a modeler needs for one attempt.
#[derive(Clone, Copy)]
pub struct ModelRequest<'a> {
    /// Statement text, carried into the logical statement.
    pub sql: &'a str,
    /// Raw or parameterized tree.
    pub tree: &'a Element,
    /// Extracted literals when `tree` is parameterized.
    pub literals: Option<&'a [LiteralToken]>,
    /// Schema.
    pub catalog: &'a dyn CatalogProvider,
    /// Comma-separated table names or aliases.
    pub join_order: Option<&'a str>,
}

/// Builds logical statements from intermediate trees.
pub trait StatementModeler: Send + Sync {
    /// Binds one statement.
    fn model(&self, request: &ModelRequest<'_>) -> Result<LogicalStatement, ModelError>;
}

/// Reference modeler resolving names against a [`CatalogProvider`].
#[derive(Clone, Copy, Debug, Default)]
pub struct CatalogModeler;

impl StatementModeler for CatalogModeler {
    fn model(&self, request: &ModelRequest<'_>) -> Result<LogicalStatement, ModelError> {
        let tree = request.tree;
        let kind = match tree.name.as_str() {
            SELECT => StatementKind::Select,
            INSERT => StatementKind::Insert,
            UPDATE => StatementKind::Update,
            DELETE => StatementKind::Delete,
            other => {
                return Err(ModelError::UnsupportedStatement {
                    kind: other.to_string(),
                })
            }
        };
        let slot_count = tree
            .child(PARAMETERS)
            .map(|p| p.children_named(PARAMETER).count())
            .unwrap_or(0);
        if let Some(literals) = request.literals {
            if literals.len() != slot_count {
                return Err(ModelError::malformed(format!(
                    "{} literal values for {slot_count} parameter slots",
                    literals.len()
                )));
            }
        }

        let mut stmt = LogicalStatement {
            sql: request.sql.to_string(),
            kind,
            tables: Vec::new(),
            join_order: None,
            display_columns: Vec::new(),
            predicates: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            distinct: false,
            assignments: Vec::new(),
            param_types: Vec::new(),
        };

        let mut scope = Scope::new();
        match kind {
            StatementKind::Select => {
                let scans = tree
                    .child(TABLESCANS)
                    .ok_or_else(|| ModelError::malformed("select without tablescans"))?;
                for scan in scans.children_named(TABLESCAN) {
                    let table = scan
                        .attr(ATTR_TABLE)
                        .ok_or_else(|| ModelError::malformed("tablescan without table"))?;
                    let alias = scan.attr(ATTR_ALIAS).unwrap_or(table);
                    add_table(&mut scope, request.catalog, table, alias)?;
                }
                if scope.tables().next().is_none() {
                    return Err(ModelError::malformed("select without tables"));
                }
            }
            _ => {
                let table = tree
                    .attr(ATTR_TABLE)
                    .ok_or_else(|| ModelError::malformed("statement without target table"))?;
                add_table(&mut scope, request.catalog, table, table)?;
            }
        }
        stmt.tables = scope.tables().map(|(t, _)| t.clone()).collect();

        let mut binder = Binder::new(&scope, request.literals, slot_count);
        match kind {
            StatementKind::Select => model_select(&mut binder, tree, &mut stmt)?,
            StatementKind::Insert => model_insert(&mut binder, tree, &mut stmt)?,
            StatementKind::Update => model_update(&mut binder, tree, &mut stmt)?,
            StatementKind::Delete => {}
        }
        if let Some(condition) = tree.child(QUERYCONDITION) {
            for element in &condition.children {
                let predicate = binder.lower(element, Some(ValueType::Boolean))?;
                if predicate.contains_aggregate() {
                    return Err(ModelError::AggregateInWhere);
                }
                stmt.predicates.extend(predicate.into_conjuncts());
            }
        }
        stmt.param_types = binder.finish()?;
        apply_all_param_types(&mut stmt);

        if let Some(order) = request.join_order {
            stmt.join_order = Some(parse_join_order(order, &stmt.tables)?);
        }

        trace!(
            kind = ?stmt.kind,
            tables = stmt.tables.len(),
            params = stmt.param_types.len(),
            "model.statement.bound"
        );
        Ok(stmt)
    }
}

fn add_table<'a>(
    scope: &mut Scope<'a>,
    catalog: &'a dyn CatalogProvider,
    table: &str,
    alias: &str,
) -> Result<(), ModelError> {
    let def = catalog.table(table).ok_or_else(|| ModelError::UnknownTable {
        table: table.to_string(),
    })?;
    scope.push(
        TableRef {
            table: def.name.clone(),
            alias: alias.to_string(),
        },
        def,
    )
}

fn model_select(binder: &mut Binder<'_, '_>, tree: &Element, stmt: &mut LogicalStatement) -> Result<(), ModelError> {
    stmt.distinct = tree.flag(ATTR_DISTINCT);
    stmt.limit = parse_count(tree, ATTR_LIMIT)?;
    stmt.offset = parse_count(tree, ATTR_OFFSET)?;

    let columns = tree
        .child(COLUMNS)
        .ok_or_else(|| ModelError::malformed("select without columns"))?;
    for (position, item) in columns.children.iter().enumerate() {
        if item.name == STAR {
            expand_star(binder, item.attr(ATTR_TABLE), &mut stmt.display_columns)?;
            continue;
        }
        let expr = binder.lower(item, None)?;
        let alias = item.attr(ATTR_ALIAS).map(str::to_string);
        let column = match &expr {
            Expr::Column(c) => DisplayColumn {
                table_name: c.table.clone(),
                table_alias: c.alias.clone(),
                column_name: c.column.clone(),
                alias: alias.unwrap_or_else(|| c.column.clone()),
                expr,
            },
            _ => {
                let alias = alias.unwrap_or_else(|| format!("C{}", position + 1));
                DisplayColumn {
                    table_name: String::new(),
                    table_alias: String::new(),
                    column_name: alias.clone(),
                    alias,
                    expr,
                }
            }
        };
        stmt.display_columns.push(column);
    }

    if let Some(group) = tree.child(GROUPCOLUMNS) {
        for element in &group.children {
            let expr = binder.lower(element, None)?;
            if !matches!(expr, Expr::Column(_)) {
                return Err(ModelError::UnsupportedGroupBy {
                    term: expr.to_string(),
                });
            }
            stmt.group_by.push(expr);
        }
    }

    if let Some(order) = tree.child(ORDERCOLUMNS) {
        for term in order.children_named(ORDERBY) {
            let element = term
                .children
                .first()
                .ok_or_else(|| ModelError::malformed("orderby without expression"))?;
            let expr = match display_alias_target(element, &stmt.display_columns) {
                Some(expr) => expr,
                None => binder.lower(element, None)?,
            };
            stmt.order_by.push(SortKey {
                expr,
                descending: term.flag(ATTR_DESC),
            });
        }
    }

    if stmt.has_aggregation() {
        for column in &stmt.display_columns {
            check_grouped(&column.expr, &stmt.group_by)?;
        }
        for key in &stmt.order_by {
            check_grouped(&key.expr, &stmt.group_by)?;
        }
    }
    if stmt.distinct {
        for key in &stmt.order_by {
            if !stmt.display_columns.iter().any(|c| c.expr == key.expr) {
                return Err(ModelError::OrderByNotInSelect {
                    term: key.expr.to_string(),
                });
            }
        }
    }
    Ok(())
}

fn expand_star(
    binder: &Binder<'_, '_>,
    qualifier: Option<&str>,
    out: &mut Vec<DisplayColumn>,
) -> Result<(), ModelError> {
    let scope = binder.scope();
    let tables = match qualifier {
        Some(q) => {
            let entries = scope.qualified(q);
            if entries.is_empty() {
                return Err(ModelError::UnknownTable { table: q.to_string() });
            }
            entries
        }
        None => scope.tables().collect(),
    };
    for (table, def) in tables {
        for column in &def.columns {
            out.push(DisplayColumn {
                table_name: table.table.clone(),
                table_alias: table.alias.clone(),
                column_name: column.name.clone(),
                alias: column.name.clone(),
                expr: Expr::column(&table.table, &table.alias, &column.name, column.ty),
            });
        }
    }
    Ok(())
}

/// ORDER BY of a bare name that matches an output alias sorts by that
/// display column.
fn display_alias_target(element: &Element, display: &[DisplayColumn]) -> Option<Expr> {
    if element.name != COLUMNREF || element.attr(ATTR_TABLE).is_some() {
        return None;
    }
    let name = element.attr(ATTR_COLUMN)?;
    display
        .iter()
        .find(|c| c.alias == name)
        .map(|c| c.expr.clone())
}

fn check_grouped(expr: &Expr, group_by: &[Expr]) -> Result<(), ModelError> {
    match expr {
        Expr::Aggregate { .. } => Ok(()),
        Expr::Column(c) => {
            let grouped = group_by
                .iter()
                .any(|g| matches!(g, Expr::Column(gc) if gc.same_column(c)));
            if grouped {
                Ok(())
            } else {
                Err(ModelError::NonGroupedColumn {
                    column: expr.to_string(),
                })
            }
        }
        other => other
            .children()
            .into_iter()
            .try_for_each(|child| check_grouped(child, group_by)),
    }
}

fn model_insert(binder: &mut Binder<'_, '_>, tree: &Element, stmt: &mut LogicalStatement) -> Result<(), ModelError> {
    let def = binder
        .scope()
        .tables()
        .next()
        .map(|(_, d)| *d)
        .ok_or_else(|| ModelError::malformed("insert without target"))?;
    let columns = tree
        .child(COLUMNS)
        .ok_or_else(|| ModelError::malformed("insert without columns"))?;
    let items: Vec<&Element> = columns.children_named(COLUMN).collect();
    let named = items.iter().any(|c| c.attr(ATTR_NAME).is_some());
    if !named && items.len() != def.columns.len() {
        return Err(ModelError::ColumnCountMismatch {
            table: def.name.clone(),
            expected: def.columns.len(),
            found: items.len(),
        });
    }

    let mut provided: Vec<Option<&Element>> = vec![None; def.columns.len()];
    for (i, item) in items.iter().enumerate() {
        let position = if named {
            let name = item
                .attr(ATTR_NAME)
                .ok_or_else(|| ModelError::malformed("insert mixes named and positional columns"))?;
            def.column(name)
                .map(|(p, _)| p)
                .ok_or_else(|| ModelError::UnknownColumn {
                    column: format!("{}.{name}", def.name),
                })?
        } else {
            i
        };
        if provided[position].is_some() {
            return Err(ModelError::DuplicateColumn {
                column: def.columns[position].name.clone(),
            });
        }
        let value = item
            .children
            .first()
            .ok_or_else(|| ModelError::malformed("insert column without value"))?;
        provided[position] = Some(value);
    }

    for (position, column) in def.columns.iter().enumerate() {
        let value = match provided[position] {
            Some(element) => binder.lower(element, Some(column.ty))?,
            None if column.nullable && def.partition_column.as_deref() != Some(column.name.as_str()) => {
                Expr::Literal(Value::Null)
            }
            None => {
                return Err(ModelError::MissingColumnValue {
                    column: column.name.clone(),
                })
            }
        };
        if !column.nullable && value == Expr::Literal(Value::Null) {
            return Err(ModelError::NullNotAllowed {
                column: column.name.clone(),
            });
        }
        stmt.assignments.push(ColumnAssignment {
            column: column.name.clone(),
            position,
            value,
        });
    }
    Ok(())
}

fn model_update(binder: &mut Binder<'_, '_>, tree: &Element, stmt: &mut LogicalStatement) -> Result<(), ModelError> {
    let def = binder
        .scope()
        .tables()
        .next()
        .map(|(_, d)| *d)
        .ok_or_else(|| ModelError::malformed("update without target"))?;
    let columns = tree
        .child(COLUMNS)
        .ok_or_else(|| ModelError::malformed("update without SET list"))?;
    for item in columns.children_named(COLUMN) {
        let name = item
            .attr(ATTR_NAME)
            .ok_or_else(|| ModelError::malformed("SET column without name"))?;
        let (position, column) = def.column(name).ok_or_else(|| ModelError::UnknownColumn {
            column: format!("{}.{name}", def.name),
        })?;
        if def.partition_column.as_deref() == Some(column.name.as_str()) {
            return Err(ModelError::PartitionColumnUpdate {
                table: def.name.clone(),
                column: column.name.clone(),
            });
        }
        if stmt.assignments.iter().any(|a| a.position == position) {
            return Err(ModelError::DuplicateColumn {
                column: column.name.clone(),
            });
        }
        let element = item
            .children
            .first()
            .ok_or_else(|| ModelError::malformed("SET column without value"))?;
        let value = binder.lower(element, Some(column.ty))?;
        if value.contains_aggregate() {
            return Err(ModelError::type_mismatch("aggregate in SET list"));
        }
        if !column.nullable && value == Expr::Literal(Value::Null) {
            return Err(ModelError::NullNotAllowed {
                column: column.name.clone(),
            });
        }
        stmt.assignments.push(ColumnAssignment {
            column: column.name.clone(),
            position,
            value,
        });
    }
    Ok(())
}

fn parse_count(tree: &Element, attr: &str) -> Result<Option<u64>, ModelError> {
    tree.attr(attr)
        .map(|text| {
            text.parse::<u64>()
                .map_err(|_| ModelError::malformed(format!("{attr} '{text}' is not a row count")))
        })
        .transpose()
}

fn apply_all_param_types(stmt: &mut LogicalStatement) {
    let types = stmt.param_types.clone();
    for column in &mut stmt.display_columns {
        apply_param_types(&mut column.expr, &types);
    }
    for expr in stmt.predicates.iter_mut().chain(stmt.group_by.iter_mut()) {
        apply_param_types(expr, &types);
    }
    for key in &mut stmt.order_by {
        apply_param_types(&mut key.expr, &types);
    }
    for assignment in &mut stmt.assignments {
        apply_param_types(&mut assignment.value, &types);
    }
}

/// Maps a comma-separated join order onto table aliases. Every table must be
/// named exactly once, by alias or (when unambiguous) by table name.
pub fn parse_join_order(order: &str, tables: &[TableRef]) -> Result<Vec<String>, ModelError> {
    let invalid = |detail: String| ModelError::InvalidJoinOrder {
        order: order.to_string(),
        detail,
    };
    let mut aliases: Vec<String> = Vec::new();
    for name in order.split(',').map(|n| n.trim().to_ascii_uppercase()) {
        if name.is_empty() {
            return Err(invalid("empty table name".into()));
        }
        let alias = match tables.iter().find(|t| t.alias == name) {
            Some(t) => t.alias.clone(),
            None => {
                let matches: Vec<_> = tables.iter().filter(|t| t.table == name).collect();
                match matches.as_slice() {
                    [only] => only.alias.clone(),
                    [] => return Err(invalid(format!("{name} is not in the FROM clause"))),
                    _ => return Err(invalid(format!("{name} is ambiguous; use an alias"))),
                }
            }
        };
        if aliases.contains(&alias) {
            return Err(invalid(format!("{name} appears more than once")));
        }
        aliases.push(alias);
    }
    if aliases.len() != tables.len() {
        return Err(invalid(format!(
            "names {} of {} tables",
            aliases.len(),
            tables.len()
        )));
    }
    Ok(aliases)
}
