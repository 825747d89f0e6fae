//! Statement-to-plan compiler for a partitioned SQL engine.
//!
//! A [`QueryPlanner`] takes one SQL statement through parsing, literal
//! auto-parameterization, logical modeling, cost-based plan assembly,
//! schema resolution and fragmentation, producing a [`CompiledPlan`] whose
//! fragments run on a coordinator or on data partitions. A [`PlanCache`]
//! shares parameterized plans between statements that differ only in
//! literals, and the [`eval`] module runs plans over in-memory data for
//! verification.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod assemble;
pub mod cache;
pub mod catalog;
pub mod compiled;
pub mod config;
pub mod cost;
pub mod error;
pub mod eval;
pub mod fragment;
pub mod ids;
pub mod logging;
pub mod logical;
pub mod model;
pub mod param;
pub mod partition;
pub mod plan;
pub mod planner;
pub mod resolve;
pub mod sql;
pub mod value;

pub use cache::{CacheOutcome, CacheStats, CachedPlan, PlanCache};
pub use catalog::{CatalogProvider, InMemoryCatalog, TableDef};
pub use compiled::CompiledPlan;
pub use config::{ConfigError, DeterminismMode, PlannerConfig};
pub use error::{PlannerError, Result};
pub use param::ParameterSet;
pub use partition::{PartitionMode, PartitioningContext};
pub use planner::{PlannerStage, QueryPlanner, QueryPlannerBuilder};
pub use value::{Value, ValueType};
