//! Command-line front end: plans or parameterizes one statement against a
//! TOML catalog.
#![forbid(unsafe_code)]

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use keel::{
    logging::{init_logging, resolve_filter},
    plan::ExplainNode,
    value::LiteralToken,
    CompiledPlan, InMemoryCatalog, ParameterSet, PartitioningContext, PlannerConfig, QueryPlanner,
    ValueType,
};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(
    name = "keel",
    version,
    about = "Compile SQL statements into partition-aware plans",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(long, global = true, value_name = "FILE", help = "TOML catalog of [[tables]]")]
    catalog: Option<PathBuf>,

    #[arg(long, global = true, value_name = "FILE", help = "TOML file with a [planner] table")]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[arg(
        long,
        global = true,
        env = "KEEL_LOG",
        help = "Log filter directive (falls back to RUST_LOG, then warn)"
    )]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Plan a statement and print the result")]
    Plan(PlanCmd),

    #[command(about = "Show the cache token and the literals extracted from a statement")]
    Parameterize {
        #[arg(value_name = "SQL")]
        sql: String,
    },
}

#[derive(Args, Debug)]
struct PlanCmd {
    #[arg(value_name = "SQL")]
    sql: String,

    #[arg(long, value_name = "T1,T2", help = "Manual join order")]
    join_order: Option<String>,

    #[arg(long, help = "Plan the statement as written, without literal extraction")]
    no_parameterize: bool,

    #[arg(long, value_enum, default_value_t = PartitioningArg::Infer, help = "Routing constraint")]
    partitioning: PartitioningArg,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum PartitioningArg {
    Infer,
    Single,
    Multi,
}

impl From<PartitioningArg> for PartitioningContext {
    fn from(arg: PartitioningArg) -> Self {
        match arg {
            PartitioningArg::Infer => PartitioningContext::infer(),
            PartitioningArg::Single => PartitioningContext::force_single(),
            PartitioningArg::Multi => PartitioningContext::force_multi(),
        }
    }
}

#[derive(Serialize)]
struct PlanReport<'a> {
    sql: &'a str,
    shape: String,
    cost: f64,
    single_partition: bool,
    partition_key: Option<String>,
    read_only: bool,
    deterministic_order: bool,
    from_parameterized: bool,
    bad_parameterized: bool,
    parameter_types: &'a [ValueType],
    extracted_params: Option<&'a ParameterSet>,
    columns: Vec<String>,
    fragments: usize,
    plan_hash: String,
    explain: ExplainNode,
}

#[derive(Serialize)]
struct ParameterizeReport<'a> {
    sql: &'a str,
    token: String,
    literals: &'a [LiteralToken],
    user_params: usize,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(&resolve_filter(cli.log_level.as_deref()))?;

    let config = match &cli.config {
        Some(path) => PlannerConfig::load(path)?,
        None => PlannerConfig::default(),
    };
    let catalog = match &cli.catalog {
        Some(path) => InMemoryCatalog::load(path)?,
        None => InMemoryCatalog::new(),
    };
    let catalog = Arc::new(catalog);

    match cli.command {
        Command::Plan(cmd) => {
            let mut builder = QueryPlanner::builder(cmd.sql.as_str(), catalog)
                .config(config)
                .partitioning(cmd.partitioning.into());
            if let Some(order) = &cmd.join_order {
                builder = builder.join_order(order.as_str());
            }
            let mut planner = builder.build();
            let plan = planner.compile(!cmd.no_parameterize)?;
            let report = plan_report(&plan, planner.was_bad_parameterized());
            emit(cli.format, &report, || print_plan_text(&report))?;
        }
        Command::Parameterize { sql } => {
            let mut planner = QueryPlanner::builder(sql.as_str(), catalog).config(config).build();
            planner.parse()?;
            let token = planner.parameterize()?;
            let report = ParameterizeReport {
                sql: &sql,
                token,
                literals: planner.extracted_param_literal_values(),
                user_params: planner.adhoc_user_params_count(),
            };
            emit(cli.format, &report, || print_parameterize_text(&report))?;
        }
    }
    Ok(())
}

fn plan_report(plan: &CompiledPlan, bad_parameterized: bool) -> PlanReport<'_> {
    PlanReport {
        sql: &plan.sql,
        shape: plan.shape(),
        cost: plan.cost,
        single_partition: plan.single_partition,
        partition_key: plan.partition_key.as_ref().map(ToString::to_string),
        read_only: plan.read_only,
        deterministic_order: plan.deterministic_order,
        from_parameterized: plan.from_parameterized,
        bad_parameterized,
        parameter_types: plan.parameter_types(),
        extracted_params: plan.extracted_params.as_ref(),
        columns: plan.columns.columns().iter().map(|c| c.alias.clone()).collect(),
        fragments: plan.fragments.len(),
        plan_hash: hex::encode(plan.plan_hash.to_be_bytes()),
        explain: plan.explain(),
    }
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: Serialize,
    F: Fn(),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(),
    }
    Ok(())
}

fn print_plan_text(report: &PlanReport<'_>) {
    println!("Plan: {}", report.shape);
    let routing = if report.single_partition {
        match &report.partition_key {
            Some(key) => format!("single-partition (key {key})"),
            None => "single-partition".to_string(),
        }
    } else {
        "multi-partition".to_string()
    };
    println!(
        "  routing={routing} cost={:.2} read_only={} deterministic_order={}",
        report.cost, report.read_only, report.deterministic_order
    );
    println!(
        "  parameterized={} fallback={} fragments={} hash={}",
        report.from_parameterized, report.bad_parameterized, report.fragments, report.plan_hash
    );
    if !report.parameter_types.is_empty() {
        let types: Vec<&str> = report.parameter_types.iter().map(|t| t.name()).collect();
        println!("  parameters: {}", types.join(", "));
    }
    println!("  columns: {}", report.columns.join(", "));
    println!();
    print!("{}", report.explain);
}

fn print_parameterize_text(report: &ParameterizeReport<'_>) {
    println!("Token: {}", report.token);
    if report.literals.is_empty() {
        println!("  no literals extracted (user parameters: {})", report.user_params);
    } else {
        let literals: Vec<String> = report.literals.iter().map(ToString::to_string).collect();
        println!("  literals: {}", literals.join(", "));
    }
}
