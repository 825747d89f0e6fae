//! Statement planning orchestrator.
//!
//! A [`QueryPlanner`] drives one statement through
//! `Unparsed -> Parsed -> (Parameterized | Unparameterized) -> Compiled`.
//! When literals were extracted, [`QueryPlanner::plan`] first compiles the
//! parameterized tree; any recoverable failure of that attempt (or a plan
//! with too many parameters, or literals that do not bind) is discarded and
//! the original tree is compiled instead. Internal consistency errors end
//! planning immediately on either path.

use std::sync::Arc;

use tracing::debug;

use crate::assemble::{
    AssemblyContext, CostBasedAssembler, PlanAssembler, PlanSelector, PlanTrace, StatementLabel,
    TracingPlanTrace,
};
use crate::catalog::CatalogProvider;
use crate::compiled::CompiledPlan;
use crate::config::{DeterminismMode, PlannerConfig};
use crate::cost::{CostModel, DefaultCostModel, ScalarValueHint};
use crate::error::{PlannerError, Result};
use crate::fragment::Fragmentizer;
use crate::ids::PlanNodeIdAllocator;
use crate::model::{CatalogModeler, ModelRequest, StatementModeler};
use crate::param::{bind_literals, find_user_parameters, ParameterSet, ParameterizationInfo};
use crate::partition::PartitioningContext;
use crate::plan::plan_hash;
use crate::resolve::UnresolvedPlan;
use crate::sql::{Element, SqlParser, StatementParser};
use crate::value::{LiteralToken, ValueType};

/// Lifecycle position of a [`QueryPlanner`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlannerStage {
    /// Nothing parsed yet.
    Unparsed,
    /// Tree available; parameterization not attempted.
    Parsed,
    /// Literals were extracted.
    Parameterized,
    /// Parameterization did not apply.
    Unparameterized,
    /// A plan was produced.
    Compiled,
}

/// Collaborators and inputs that stay fixed for the planner's lifetime.
struct Pipeline {
    sql: String,
    label: Arc<StatementLabel>,
    catalog: Arc<dyn CatalogProvider>,
    parser: Arc<dyn StatementParser>,
    modeler: Arc<dyn StatementModeler>,
    assembler: Arc<dyn PlanAssembler>,
    cost_model: Arc<dyn CostModel>,
    trace: Arc<dyn PlanTrace>,
    partitioning: PartitioningContext,
    config: PlannerConfig,
    hints: Vec<ScalarValueHint>,
    join_order: Option<String>,
}

impl Pipeline {
    /// One compile attempt over `tree`. Node ids restart for every attempt.
    fn compile(
        &self,
        ids: &mut PlanNodeIdAllocator,
        tree: &Element,
        literals: Option<&[LiteralToken]>,
    ) -> Result<CompiledPlan> {
        ids.reset();
        let stmt = self.modeler.model(&ModelRequest {
            sql: &self.sql,
            tree,
            literals,
            catalog: self.catalog.as_ref(),
            join_order: self.join_order.as_deref(),
        })?;
        self.trace.modeled(&self.label, &stmt);

        let max_tables = self.config.max_tables_per_join;
        if self.join_order.is_none() && stmt.table_count() > max_tables {
            return Err(PlannerError::JoinComplexity {
                message: format!(
                    "Failed to parse SQL statement: {} because a join of > {max_tables} tables was \
                     requested without specifying a join order. See documentation for instructions \
                     on manually specifying a join order",
                    self.sql
                ),
            });
        }

        // Hints describe the caller's `?` slots; slots holding extracted
        // literals estimate like the literals they replace.
        let hints: &[ScalarValueHint] = if literals.is_some() { &[] } else { &self.hints };
        let selector = PlanSelector::new(self.label.clone(), self.trace.clone(), self.config.determinism);
        let mut ctx = AssemblyContext {
            catalog: self.catalog.as_ref(),
            partitioning: &self.partitioning,
            cost_model: self.cost_model.as_ref(),
            hints,
            ids,
        };
        let candidate = self
            .assembler
            .best_cost_plan(&stmt, &mut ctx, selector)
            .map_err(|failure| PlannerError::Assembly(failure.to_string()))?;

        let resolved = UnresolvedPlan::new(candidate).resolve(&stmt, self.catalog.as_ref())?;
        let single_partition = resolved.routing().is_single_partition();
        let fragments = Fragmentizer.fragmentize(resolved.root(), single_partition)?;
        let partition_key = resolved.routing().key().cloned();
        let columns = resolved.columns().clone();
        let (read_only, cost, deterministic_order) =
            (resolved.is_read_only(), resolved.cost(), resolved.deterministic_order());
        let root = resolved.into_root();
        Ok(CompiledPlan {
            sql: self.sql.clone(),
            plan_hash: plan_hash(&root),
            root,
            fragments,
            columns,
            read_only,
            cost,
            single_partition,
            partition_key,
            parameter_types: stmt.param_types,
            from_parameterized: false,
            extracted_params: None,
            deterministic_order,
        })
    }
}

/// Plans one SQL statement.
pub struct QueryPlanner {
    pipeline: Pipeline,
    ids: PlanNodeIdAllocator,
    stage: PlannerStage,
    tree: Option<Element>,
    param_info: Option<ParameterizationInfo>,
    user_params: usize,
    bad_parameterized: bool,
    compiled_parameterized: bool,
}

impl QueryPlanner {
    /// Starts configuring a planner for `sql` against `catalog`.
    pub fn builder(sql: impl Into<String>, catalog: Arc<dyn CatalogProvider>) -> QueryPlannerBuilder {
        QueryPlannerBuilder::new(sql.into(), catalog)
    }

    /// Current stage.
    pub fn stage(&self) -> PlannerStage {
        self.stage
    }

    /// Statement text.
    pub fn sql(&self) -> &str {
        &self.pipeline.sql
    }

    /// Settings in effect.
    pub fn config(&self) -> &PlannerConfig {
        &self.pipeline.config
    }

    /// Parses the statement, discarding any earlier attempt.
    pub fn parse(&mut self) -> Result<()> {
        self.ids.reset();
        self.stage = PlannerStage::Unparsed;
        self.tree = None;
        self.param_info = None;
        self.user_params = 0;
        self.bad_parameterized = false;
        self.compiled_parameterized = false;

        let tree = self.pipeline.parser.parse(&self.pipeline.sql)?;
        self.pipeline.trace.parsed(&self.pipeline.label, &tree);
        self.tree = Some(tree);
        self.stage = PlannerStage::Parsed;
        Ok(())
    }

    /// Extracts literals and returns the cache token: the canonical form of
    /// the parameterized tree, or of the parsed tree when parameterization
    /// does not apply.
    pub fn parameterize(&mut self) -> Result<String> {
        if self.stage != PlannerStage::Parsed {
            return Err(PlannerError::InvalidState(
                "parameterize() must follow parse() and run at most once",
            ));
        }
        let tree = self
            .tree
            .as_ref()
            .ok_or(PlannerError::InvalidState("parameterize() called without a parsed tree"))?;
        self.user_params = find_user_parameters(tree);
        let info = ParameterizationInfo::parameterize(tree);
        let token = match &info {
            Some(info) => {
                self.pipeline.trace.parameterized(
                    &self.pipeline.label,
                    info.parameterized_tree(),
                    info.literal_values(),
                );
                info.parameterized_tree().to_min_string()
            }
            None => tree.to_min_string(),
        };
        self.stage = if info.is_some() {
            PlannerStage::Parameterized
        } else {
            PlannerStage::Unparameterized
        };
        self.param_info = info;
        Ok(token)
    }

    /// Literals extracted by [`parameterize`](Self::parameterize).
    pub fn extracted_param_literal_values(&self) -> &[LiteralToken] {
        self.param_info
            .as_ref()
            .map(ParameterizationInfo::literal_values)
            .unwrap_or(&[])
    }

    /// Binds the extracted literals to `types`.
    pub fn extracted_param_values(&self, types: &[ValueType]) -> Result<ParameterSet> {
        let bound = match &self.param_info {
            Some(info) => info.extracted_param_values(types),
            None => bind_literals(&[], types),
        };
        Ok(bound?)
    }

    /// Compiles the statement.
    pub fn plan(&mut self) -> Result<CompiledPlan> {
        match self.stage {
            PlannerStage::Unparsed => {
                return Err(PlannerError::InvalidState("plan() called before parse()"))
            }
            PlannerStage::Compiled => {
                return Err(PlannerError::InvalidState(
                    "plan() already produced a plan; parse() again to replan",
                ))
            }
            _ => {}
        }
        let tree = self
            .tree
            .as_ref()
            .ok_or(PlannerError::InvalidState("plan() called without a parsed tree"))?;
        self.bad_parameterized = false;
        self.compiled_parameterized = false;
        let pipeline = &self.pipeline;

        if let Some(info) = &self.param_info {
            match pipeline.compile(&mut self.ids, info.parameterized_tree(), Some(info.literal_values())) {
                Ok(mut plan) => {
                    let max_params = pipeline.config.max_param_count;
                    if plan.parameter_count() > max_params {
                        debug!(
                            stmt = %pipeline.label,
                            params = plan.parameter_count(),
                            max_params,
                            "planner.plan.parameterized_fallback"
                        );
                    } else {
                        match info.extracted_param_values(&plan.parameter_types) {
                            Ok(params) => {
                                plan.extracted_params = Some(params);
                                plan.from_parameterized = true;
                                self.compiled_parameterized = true;
                                self.stage = PlannerStage::Compiled;
                                pipeline.trace.compiled(&pipeline.label, &plan);
                                debug!(
                                    stmt = %pipeline.label,
                                    cost = plan.cost,
                                    params = plan.parameter_count(),
                                    "planner.plan.compiled_parameterized"
                                );
                                return Ok(plan);
                            }
                            Err(err) => {
                                debug!(
                                    stmt = %pipeline.label,
                                    error = %err,
                                    "planner.plan.parameterized_fallback"
                                );
                            }
                        }
                    }
                }
                Err(err) if err.is_recoverable() => {
                    debug!(
                        stmt = %pipeline.label,
                        code = err.code(),
                        error = %err,
                        "planner.plan.parameterized_fallback"
                    );
                }
                Err(err) => return Err(err),
            }
            self.bad_parameterized = true;
        }

        let plan = pipeline.compile(&mut self.ids, tree, None)?;
        self.stage = PlannerStage::Compiled;
        pipeline.trace.compiled(&pipeline.label, &plan);
        debug!(
            stmt = %pipeline.label,
            cost = plan.cost,
            bad_parameterized = self.bad_parameterized,
            "planner.plan.compiled"
        );
        Ok(plan)
    }

    /// Parses, optionally parameterizes, and plans in one call.
    pub fn compile(&mut self, parameterize: bool) -> Result<CompiledPlan> {
        self.parse()?;
        if parameterize {
            self.parameterize()?;
        }
        self.plan()
    }

    /// True when the last plan came from the parameterized attempt.
    pub fn compiled_as_parameterized_plan(&self) -> bool {
        self.compiled_parameterized
    }

    /// True when the parameterized attempt was discarded.
    pub fn was_bad_parameterized(&self) -> bool {
        self.bad_parameterized
    }

    /// Number of `?` markers the statement text carried, counted by
    /// [`parameterize`](Self::parameterize).
    pub fn adhoc_user_params_count(&self) -> usize {
        self.user_params
    }
}

/// Configures a [`QueryPlanner`].
pub struct QueryPlannerBuilder {
    sql: String,
    catalog: Arc<dyn CatalogProvider>,
    stmt_name: String,
    proc_name: String,
    partitioning: PartitioningContext,
    config: PlannerConfig,
    cost_model: Arc<dyn CostModel>,
    hints: Vec<ScalarValueHint>,
    join_order: Option<String>,
    parser: Arc<dyn StatementParser>,
    modeler: Arc<dyn StatementModeler>,
    assembler: Arc<dyn PlanAssembler>,
    trace: Option<Arc<dyn PlanTrace>>,
}

impl QueryPlannerBuilder {
    fn new(sql: String, catalog: Arc<dyn CatalogProvider>) -> Self {
        Self {
            sql,
            catalog,
            stmt_name: String::new(),
            proc_name: String::new(),
            partitioning: PartitioningContext::default(),
            config: PlannerConfig::default(),
            cost_model: Arc::new(DefaultCostModel),
            hints: Vec::new(),
            join_order: None,
            parser: Arc::new(SqlParser),
            modeler: Arc::new(CatalogModeler),
            assembler: Arc::new(CostBasedAssembler),
            trace: None,
        }
    }

    /// Statement name used in traces.
    pub fn statement_name(mut self, name: impl Into<String>) -> Self {
        self.stmt_name = name.into();
        self
    }

    /// Procedure name used in traces.
    pub fn procedure_name(mut self, name: impl Into<String>) -> Self {
        self.proc_name = name.into();
        self
    }

    /// Routing constraint.
    pub fn partitioning(mut self, partitioning: PartitioningContext) -> Self {
        self.partitioning = partitioning;
        self
    }

    /// Replaces every tunable at once.
    pub fn config(mut self, config: PlannerConfig) -> Self {
        self.config = config;
        self
    }

    /// Join size accepted without a manual join order.
    pub fn max_tables_per_join(mut self, max: usize) -> Self {
        self.config.max_tables_per_join = max;
        self
    }

    /// Parameter limit of parameterized plans.
    pub fn max_param_count(mut self, max: usize) -> Self {
        self.config.max_param_count = max;
        self
    }

    /// Selector policy.
    pub fn determinism(mut self, mode: DeterminismMode) -> Self {
        self.config.determinism = mode;
        self
    }

    /// Silences the default trace sink.
    pub fn suppress_debug_output(mut self, suppress: bool) -> Self {
        self.config.suppress_debug_output = suppress;
        self
    }

    /// Cost model.
    pub fn cost_model(mut self, model: Arc<dyn CostModel>) -> Self {
        self.cost_model = model;
        self
    }

    /// Per-parameter cost hints.
    pub fn param_hints(mut self, hints: Vec<ScalarValueHint>) -> Self {
        self.hints = hints;
        self
    }

    /// Manual join order: comma-separated table names or aliases.
    pub fn join_order(mut self, order: impl Into<String>) -> Self {
        self.join_order = Some(order.into());
        self
    }

    /// Statement parser.
    pub fn parser(mut self, parser: Arc<dyn StatementParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Statement modeler.
    pub fn modeler(mut self, modeler: Arc<dyn StatementModeler>) -> Self {
        self.modeler = modeler;
        self
    }

    /// Plan assembler.
    pub fn assembler(mut self, assembler: Arc<dyn PlanAssembler>) -> Self {
        self.assembler = assembler;
        self
    }

    /// Trace sink; defaults to [`TracingPlanTrace`].
    pub fn trace(mut self, trace: Arc<dyn PlanTrace>) -> Self {
        self.trace = Some(trace);
        self
    }

    /// Finishes configuration.
    pub fn build(self) -> QueryPlanner {
        let suppress = self.config.suppress_debug_output;
        let trace = self
            .trace
            .unwrap_or_else(|| Arc::new(TracingPlanTrace::new(suppress)));
        let label = Arc::new(StatementLabel {
            stmt_name: self.stmt_name,
            proc_name: self.proc_name,
            sql: self.sql.clone(),
        });
        QueryPlanner {
            pipeline: Pipeline {
                sql: self.sql,
                label,
                catalog: self.catalog,
                parser: self.parser,
                modeler: self.modeler,
                assembler: self.assembler,
                cost_model: self.cost_model,
                trace,
                partitioning: self.partitioning,
                config: self.config,
                hints: self.hints,
                join_order: self.join_order,
            },
            ids: PlanNodeIdAllocator::new(),
            stage: PlannerStage::Unparsed,
            tree: None,
            param_info: None,
            user_params: 0,
            bad_parameterized: false,
            compiled_parameterized: false,
        }
    }
}
