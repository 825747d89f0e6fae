//! Plan cache keyed by the parameterized statement token.
//!
//! Only plans compiled from a parameterized tree are cached: their
//! parameter slots carry the literals, so one entry serves every statement
//! that differs from it only in literal values.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, trace};

use crate::compiled::CompiledPlan;
use crate::config::PlannerConfig;
use crate::error::Result;
use crate::param::ParameterSet;
use crate::planner::QueryPlanner;

/// Whether a lookup was served from the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CacheOutcome {
    /// Reused a cached plan.
    Hit,
    /// Planned from scratch.
    Miss,
}

/// Plan plus the values to run it with.
#[derive(Clone, Debug)]
pub struct CachedPlan {
    /// Compiled plan, possibly shared with other statements.
    pub plan: Arc<CompiledPlan>,
    /// Extracted literals bound to the plan's slots; `None` when the plan
    /// was not parameterized.
    pub params: Option<ParameterSet>,
    /// How the plan was obtained.
    pub outcome: CacheOutcome,
}

/// Counters since construction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups that planned.
    pub misses: u64,
    /// Plans stored.
    pub inserts: u64,
    /// Entries currently held.
    pub entries: usize,
}

/// Bounded LRU of compiled plans.
pub struct PlanCache {
    entries: Mutex<LruCache<String, Arc<CompiledPlan>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
}

impl PlanCache {
    /// Creates a cache holding up to `capacity` plans; zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            inserts: AtomicU64::new(0),
        }
    }

    /// Creates a cache sized by `plan_cache_capacity`.
    pub fn from_config(config: &PlannerConfig) -> Self {
        Self::new(config.plan_cache_capacity)
    }

    /// Looks the statement up by its parameterized token, planning on a
    /// miss. A cached plan whose slots the new literals cannot fill is
    /// treated as a miss.
    pub fn compile_with_cache(&self, planner: &mut QueryPlanner) -> Result<CachedPlan> {
        planner.parse()?;
        let token = planner.parameterize()?;

        let cached = self.entries.lock().get(&token).cloned();
        if let Some(plan) = cached {
            match planner.extracted_param_values(plan.parameter_types()) {
                Ok(params) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    trace!(sql = planner.sql(), "cache.plan.hit");
                    let params = plan.from_parameterized.then_some(params);
                    return Ok(CachedPlan {
                        plan,
                        params,
                        outcome: CacheOutcome::Hit,
                    });
                }
                Err(err) => {
                    debug!(sql = planner.sql(), error = %err, "cache.plan.rebind_failed");
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let plan = planner.plan()?;
        let params = plan.extracted_params.clone();
        let plan = Arc::new(plan);
        if plan.from_parameterized {
            self.entries.lock().put(token, plan.clone());
            self.inserts.fetch_add(1, Ordering::Relaxed);
            trace!(sql = planner.sql(), "cache.plan.inserted");
        }
        Ok(CachedPlan {
            plan,
            params,
            outcome: CacheOutcome::Miss,
        })
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    /// Entries currently held.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry; counters are kept.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Default for PlanCache {
    fn default() -> Self {
        Self::from_config(&PlannerConfig::default())
    }
}
