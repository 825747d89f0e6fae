//! Operator-at-a-time execution of plan trees over a [`Dataset`].

use std::collections::{HashMap, HashSet};

use super::scalar::{arith, as_f64, eval, passes};
use super::{Dataset, EvalError, Row};
use crate::fragment::FragmentGraph;
use crate::ids::{FragmentId, PartitionId};
use crate::param::ParameterSet;
use crate::plan::{AggFunc, AggregateColumn, ArithOp, Expr, PlanNode, PlanNodeKind, SortKey};
use crate::value::Value;

/// Partitions a scan reads.
#[derive(Clone, Copy, Debug)]
pub(crate) enum ScanScope {
    /// Every partition, in partition order.
    AllPartitions,
    /// One partition.
    Partition(PartitionId),
}

/// Outputs of fragments that already ran, for cut `Receive` nodes.
pub(crate) struct FragmentInputs<'a> {
    pub(crate) graph: &'a FragmentGraph,
    pub(crate) outputs: &'a HashMap<FragmentId, Vec<Row>>,
}

pub(crate) struct Executor<'a> {
    pub(crate) data: &'a Dataset,
    pub(crate) params: &'a ParameterSet,
    pub(crate) scope: ScanScope,
    pub(crate) inputs: Option<FragmentInputs<'a>>,
}

impl Executor<'_> {
    pub(crate) fn run(&self, node: &PlanNode) -> Result<Vec<Row>, EvalError> {
        match &node.kind {
            PlanNodeKind::SeqScan { table, predicate, .. } => {
                let rows = self.data.scan(table, self.scope)?;
                self.filter(rows, predicate.as_ref())
            }
            PlanNodeKind::IndexScan {
                table,
                index,
                keys,
                predicate,
                ..
            } => {
                let def = self.data.table_def(table)?;
                let index_def = def.index(index).ok_or_else(|| EvalError::UnknownIndex(index.clone()))?;
                let positions = index_def
                    .columns
                    .iter()
                    .take(keys.len())
                    .map(|name| {
                        def.column(name)
                            .map(|(pos, _)| pos)
                            .ok_or_else(|| EvalError::MalformedPlan(format!("index column {name} is not in {table}")))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                if positions.len() != keys.len() {
                    return Err(EvalError::MalformedPlan(format!(
                        "index {index} has fewer columns than lookup keys"
                    )));
                }
                let mut out = Vec::new();
                for row in self.data.scan(table, self.scope)? {
                    if self.key_matches(&row, &positions, keys)? && passes(predicate.as_ref(), &row, self.params)? {
                        out.push(row);
                    }
                }
                Ok(out)
            }
            PlanNodeKind::NestLoop { predicate } => {
                let outer = self.child(node, 0)?;
                let inner = self.child(node, 1)?;
                let mut out = Vec::new();
                for left in &outer {
                    for right in &inner {
                        let mut joined = Vec::with_capacity(left.len() + right.len());
                        joined.extend_from_slice(left);
                        joined.extend_from_slice(right);
                        if passes(predicate.as_ref(), &joined, self.params)? {
                            out.push(joined);
                        }
                    }
                }
                Ok(out)
            }
            PlanNodeKind::Aggregate {
                group_by,
                aggregates,
                ..
            } => {
                let input = self.child(node, 0)?;
                self.aggregate(group_by, aggregates, input)
            }
            PlanNodeKind::Projection { columns } => self
                .child(node, 0)?
                .iter()
                .map(|row| {
                    columns
                        .iter()
                        .map(|c| eval(&c.expr, row, self.params))
                        .collect::<Result<Row, _>>()
                })
                .collect(),
            PlanNodeKind::OrderBy { keys } => {
                let input = self.child(node, 0)?;
                self.sort(keys, input)
            }
            PlanNodeKind::Limit { limit, offset } => {
                let skip = usize::try_from(*offset).unwrap_or(usize::MAX);
                let take = limit.map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
                Ok(self.child(node, 0)?.into_iter().skip(skip).take(take).collect())
            }
            PlanNodeKind::Distinct => {
                let mut seen = HashSet::new();
                Ok(self
                    .child(node, 0)?
                    .into_iter()
                    .filter(|row| seen.insert(row_key(row)))
                    .collect())
            }
            PlanNodeKind::Send => self.child(node, 0),
            PlanNodeKind::Receive if !node.children.is_empty() => self.child(node, 0),
            PlanNodeKind::Receive => {
                let inputs = self.inputs.as_ref().ok_or(EvalError::MissingInput(node.id))?;
                let producer = inputs
                    .graph
                    .edge_into(node.id)
                    .ok_or(EvalError::MissingInput(node.id))?
                    .producer;
                inputs
                    .outputs
                    .get(&producer)
                    .cloned()
                    .ok_or(EvalError::MissingInput(node.id))
            }
            PlanNodeKind::Insert { values, .. } => {
                for value in values {
                    eval(value, &[], self.params)?;
                }
                Ok(vec![vec![Value::Int(1)]])
            }
            PlanNodeKind::Update { assignments, .. } => {
                let input = self.child(node, 0)?;
                for row in &input {
                    for assignment in assignments {
                        eval(&assignment.value, row, self.params)?;
                    }
                }
                Ok(vec![vec![count_value(input.len())]])
            }
            PlanNodeKind::Delete { .. } => {
                let input = self.child(node, 0)?;
                Ok(vec![vec![count_value(input.len())]])
            }
        }
    }

    fn child(&self, node: &PlanNode, index: usize) -> Result<Vec<Row>, EvalError> {
        let child = node.children.get(index).ok_or_else(|| {
            EvalError::MalformedPlan(format!("{} node {} is missing input {index}", node.op_name(), node.id))
        })?;
        self.run(child)
    }

    fn filter(&self, rows: Vec<Row>, predicate: Option<&Expr>) -> Result<Vec<Row>, EvalError> {
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            if passes(predicate, &row, self.params)? {
                out.push(row);
            }
        }
        Ok(out)
    }

    fn key_matches(&self, row: &[Value], positions: &[usize], keys: &[Expr]) -> Result<bool, EvalError> {
        for (&pos, key) in positions.iter().zip(keys) {
            let wanted = eval(key, row, self.params)?;
            let matched = row
                .get(pos)
                .and_then(|actual| actual.sql_cmp(&wanted))
                .is_some_and(|ord| ord.is_eq());
            if !matched {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn aggregate(
        &self,
        group_by: &[Expr],
        aggregates: &[AggregateColumn],
        input: Vec<Row>,
    ) -> Result<Vec<Row>, EvalError> {
        let mut groups: Vec<(Row, Vec<Accumulator>)> = Vec::new();
        let mut slots: HashMap<Vec<u8>, usize> = HashMap::new();
        for row in &input {
            let keys = group_by
                .iter()
                .map(|e| eval(e, row, self.params))
                .collect::<Result<Row, _>>()?;
            let slot = *slots.entry(row_key(&keys)).or_insert_with(|| {
                groups.push((keys, aggregates.iter().map(Accumulator::new).collect()));
                groups.len() - 1
            });
            for (acc, agg) in groups[slot].1.iter_mut().zip(aggregates) {
                let value = agg.arg.as_ref().map(|arg| eval(arg, row, self.params)).transpose()?;
                acc.add(value);
            }
        }
        if groups.is_empty() && group_by.is_empty() {
            groups.push((Vec::new(), aggregates.iter().map(Accumulator::new).collect()));
        }
        groups
            .into_iter()
            .map(|(mut row, accumulators)| {
                for acc in accumulators {
                    row.push(acc.finish()?);
                }
                Ok(row)
            })
            .collect()
    }

    fn sort(&self, keys: &[SortKey], input: Vec<Row>) -> Result<Vec<Row>, EvalError> {
        let mut keyed = input
            .into_iter()
            .map(|row| {
                let sort_values = keys
                    .iter()
                    .map(|k| eval(&k.expr, &row, self.params))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((sort_values, row))
            })
            .collect::<Result<Vec<_>, EvalError>>()?;
        keyed.sort_by(|(a, _), (b, _)| {
            for ((x, y), key) in a.iter().zip(b).zip(keys) {
                let ord = x.sort_cmp(y);
                let ord = if key.descending { ord.reverse() } else { ord };
                if !ord.is_eq() {
                    return ord;
                }
            }
            std::cmp::Ordering::Equal
        });
        Ok(keyed.into_iter().map(|(_, row)| row).collect())
    }
}

fn count_value(n: usize) -> Value {
    Value::Int(i64::try_from(n).unwrap_or(i64::MAX))
}

/// Grouping and deduplication key of a row.
fn row_key(row: &[Value]) -> Vec<u8> {
    let mut key = Vec::new();
    for value in row {
        let bytes = value.key_bytes();
        key.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        key.extend_from_slice(&bytes);
    }
    key
}

struct Accumulator {
    func: AggFunc,
    distinct: bool,
    rows: usize,
    values: Vec<Value>,
    seen: HashSet<Vec<u8>>,
}

impl Accumulator {
    fn new(column: &AggregateColumn) -> Self {
        Self {
            func: column.func,
            distinct: column.distinct,
            rows: 0,
            values: Vec::new(),
            seen: HashSet::new(),
        }
    }

    fn add(&mut self, value: Option<Value>) {
        self.rows += 1;
        let Some(value) = value else {
            return;
        };
        if value.is_null() {
            return;
        }
        if self.distinct && !self.seen.insert(value.key_bytes()) {
            return;
        }
        self.values.push(value);
    }

    fn finish(self) -> Result<Value, EvalError> {
        match self.func {
            AggFunc::CountStar => Ok(count_value(self.rows)),
            AggFunc::Count => Ok(count_value(self.values.len())),
            AggFunc::Sum => self.sum(),
            AggFunc::Min | AggFunc::Max => {
                let want_max = self.func == AggFunc::Max;
                let mut best: Option<Value> = None;
                for value in self.values {
                    let better = match &best {
                        None => true,
                        Some(current) => {
                            let ord = value.sort_cmp(current);
                            if want_max {
                                ord.is_gt()
                            } else {
                                ord.is_lt()
                            }
                        }
                    };
                    if better {
                        best = Some(value);
                    }
                }
                Ok(best.unwrap_or(Value::Null))
            }
            AggFunc::Avg => {
                if self.values.is_empty() {
                    return Ok(Value::Null);
                }
                let mut total = 0.0;
                for value in &self.values {
                    total += as_f64(value)
                        .ok_or_else(|| EvalError::TypeMismatch(format!("AVG of {value}")))?;
                }
                Ok(Value::Float(total / self.values.len() as f64))
            }
        }
    }

    fn sum(self) -> Result<Value, EvalError> {
        let mut total: Option<Value> = None;
        for value in self.values {
            total = Some(match total {
                None => {
                    if as_f64(&value).is_none() {
                        return Err(EvalError::TypeMismatch(format!("SUM of {value}")));
                    }
                    value
                }
                Some(acc) => arith(ArithOp::Add, &acc, &value)?,
            });
        }
        Ok(total.unwrap_or(Value::Null))
    }
}
