#![allow(missing_docs)]

use std::sync::Arc;
use std::thread;

use keel::{
    catalog::CatalogProvider,
    eval::{evaluate_plan, Dataset},
    CacheOutcome, InMemoryCatalog, PlanCache, PlannerConfig, QueryPlanner, TableDef, Value,
    ValueType,
};

fn catalog() -> Arc<InMemoryCatalog> {
    Arc::new(
        InMemoryCatalog::new().with_table(
            TableDef::new("ORDERS")
                .with_required_column("O_ID", ValueType::Integer)
                .with_column("CUST", ValueType::Varchar)
                .partitioned_on("O_ID")
                .with_index("ORDERS_PK", ["O_ID"], true),
        ),
    )
}

fn planner(catalog: &Arc<InMemoryCatalog>, sql: &str) -> QueryPlanner {
    let provider: Arc<dyn CatalogProvider> = catalog.clone();
    QueryPlanner::builder(sql, provider).build()
}

#[test]
fn hits_rebind_the_new_literals() {
    let catalog = catalog();
    let cache = PlanCache::new(8);

    let first = cache
        .compile_with_cache(&mut planner(&catalog, "SELECT CUST FROM ORDERS WHERE O_ID = 5"))
        .expect("first plan");
    assert_eq!(first.outcome, CacheOutcome::Miss);
    assert_eq!(first.params.as_ref().map(|p| p.values().to_vec()), Some(vec![Value::Int(5)]));

    let second = cache
        .compile_with_cache(&mut planner(&catalog, "SELECT CUST FROM ORDERS WHERE O_ID = 9"))
        .expect("second plan");
    assert_eq!(second.outcome, CacheOutcome::Hit);
    assert!(Arc::ptr_eq(&first.plan, &second.plan));
    assert_eq!(second.params.as_ref().map(|p| p.values().to_vec()), Some(vec![Value::Int(9)]));
}

#[test]
fn cached_plans_run_with_rebound_parameters() {
    let catalog = catalog();
    let mut data = Dataset::with_catalog(3, catalog.as_ref());
    let def = catalog.table("ORDERS").expect("orders").clone();
    data.insert_rows(
        &def,
        (1..=12).map(|id| vec![Value::Int(id), Value::from(format!("c{id}"))]),
    )
    .expect("rows");

    let cache = PlanCache::new(8);
    for id in [3, 11, 7] {
        let cached = cache
            .compile_with_cache(&mut planner(
                &catalog,
                &format!("SELECT CUST FROM ORDERS WHERE O_ID = {id}"),
            ))
            .expect("plans");
        let params = cached.params.expect("bound literals");
        let rows = evaluate_plan(&cached.plan.root, &data, &params).expect("runs");
        assert_eq!(rows, vec![vec![Value::from(format!("c{id}"))]]);
    }
    let stats = cache.stats();
    assert_eq!((stats.hits, stats.misses, stats.entries), (2, 1, 1));
}

#[test]
fn different_statements_get_their_own_entries() {
    let catalog = catalog();
    let cache = PlanCache::new(8);
    for sql in [
        "SELECT CUST FROM ORDERS WHERE O_ID = 1",
        "SELECT O_ID FROM ORDERS WHERE CUST = 'a'",
        "SELECT CUST FROM ORDERS WHERE O_ID = 2",
        "SELECT O_ID FROM ORDERS WHERE CUST = 'b'",
    ] {
        cache
            .compile_with_cache(&mut planner(&catalog, sql))
            .expect("plans");
    }
    let stats = cache.stats();
    assert_eq!((stats.hits, stats.misses, stats.entries), (2, 2, 2));
    cache.clear();
    assert!(cache.is_empty());
}

#[test]
fn capacity_comes_from_config() {
    let config = PlannerConfig::from_toml_str("[planner]\nplan_cache_capacity = 1\n")
        .expect("config");
    let catalog = catalog();
    let cache = PlanCache::from_config(&config);
    cache
        .compile_with_cache(&mut planner(&catalog, "SELECT CUST FROM ORDERS WHERE O_ID = 1"))
        .expect("plans");
    cache
        .compile_with_cache(&mut planner(&catalog, "SELECT O_ID FROM ORDERS WHERE CUST = 'a'"))
        .expect("plans");
    assert_eq!(cache.len(), 1);
    let again = cache
        .compile_with_cache(&mut planner(&catalog, "SELECT CUST FROM ORDERS WHERE O_ID = 4"))
        .expect("plans");
    assert_eq!(again.outcome, CacheOutcome::Miss);
}

#[test]
fn concurrent_planners_share_one_entry() {
    let catalog = catalog();
    let cache = PlanCache::new(8);
    thread::scope(|scope| {
        for worker in 0..4i64 {
            let cache = &cache;
            let catalog = &catalog;
            scope.spawn(move || {
                for i in 0..10 {
                    let sql = format!("SELECT CUST FROM ORDERS WHERE O_ID = {}", worker * 100 + i);
                    let cached = cache
                        .compile_with_cache(&mut planner(catalog, &sql))
                        .expect("plans");
                    let params = cached.params.expect("bound literals");
                    assert_eq!(params.values(), &[Value::Int(worker * 100 + i)]);
                }
            });
        }
    });
    let stats = cache.stats();
    assert_eq!(stats.hits + stats.misses, 40);
    assert_eq!(stats.inserts, stats.misses);
    assert_eq!(stats.entries, 1);
}
