#![allow(missing_docs)]

use std::cmp::Ordering;
use std::sync::Arc;

use keel::{
    catalog::CatalogProvider,
    eval::{evaluate_fragments, evaluate_plan, Dataset, Row},
    fragment::FragmentSite,
    CompiledPlan, InMemoryCatalog, QueryPlanner, TableDef, Value, ValueType,
};

const PARTITIONS: u32 = 4;
const CUSTOMERS: [&str; 3] = ["cy", "ann", "bob"];

fn catalog() -> Arc<InMemoryCatalog> {
    Arc::new(
        InMemoryCatalog::new()
            .with_table(
                TableDef::new("ORDERS")
                    .with_required_column("O_ID", ValueType::Integer)
                    .with_column("CUST", ValueType::Varchar)
                    .with_column("AMOUNT", ValueType::Float)
                    .partitioned_on("O_ID")
                    .with_index("ORDERS_PK", ["O_ID"], true),
            )
            .with_table(
                TableDef::new("ITEMS")
                    .with_required_column("O_ID", ValueType::Integer)
                    .with_column("QTY", ValueType::Integer)
                    .partitioned_on("O_ID"),
            )
            .with_table(
                TableDef::new("REGIONS")
                    .with_column("R_ID", ValueType::Integer)
                    .with_column("NAME", ValueType::Varchar),
            ),
    )
}

fn order_row(id: i64) -> Row {
    vec![
        Value::Int(id),
        Value::from(CUSTOMERS[(id % 3) as usize]),
        Value::Float(id as f64 * 1.5),
    ]
}

fn item_rows() -> Vec<Row> {
    let mut rows = Vec::new();
    for id in 1..=30 {
        rows.push(vec![Value::Int(id), Value::Int(id % 4)]);
        if id % 5 == 0 {
            rows.push(vec![Value::Int(id), Value::Int(10)]);
        }
    }
    rows
}

fn dataset(catalog: &InMemoryCatalog) -> Dataset {
    let mut data = Dataset::with_catalog(PARTITIONS, catalog);
    let table = |name: &str| catalog.table(name).expect("table").clone();
    data.insert_rows(&table("ORDERS"), (1..=30).map(order_row))
        .expect("orders");
    data.insert_rows(&table("ITEMS"), item_rows()).expect("items");
    data.insert_rows(
        &table("REGIONS"),
        vec![
            vec![Value::Int(1), Value::from("north")],
            vec![Value::Int(2), Value::from("south")],
        ],
    )
    .expect("regions");
    data
}

fn compile(catalog: &Arc<InMemoryCatalog>, sql: &str) -> CompiledPlan {
    let provider: Arc<dyn CatalogProvider> = catalog.clone();
    QueryPlanner::builder(sql, provider)
        .build()
        .compile(true)
        .unwrap_or_else(|err| panic!("{sql}: {err}"))
}

fn cmp_rows(a: &Row, b: &Row) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.sort_cmp(y))
        .find(|o| o.is_ne())
        .unwrap_or_else(|| a.len().cmp(&b.len()))
}

fn sorted(mut rows: Vec<Row>) -> Vec<Row> {
    rows.sort_by(cmp_rows);
    rows
}

/// Runs `sql` whole and fragment by fragment; returns the fragmented
/// result after checking both agree.
fn run(sql: &str, ordered: bool) -> Vec<Row> {
    let catalog = catalog();
    let data = dataset(&catalog);
    let plan = compile(&catalog, sql);
    let params = plan.extracted_params.clone().unwrap_or_default();
    let whole = evaluate_plan(&plan.root, &data, &params).expect("whole plan runs");
    let fragmented = evaluate_fragments(&plan, &data, &params).expect("fragments run");
    if ordered {
        assert_eq!(whole, fragmented, "{sql}");
    } else {
        assert_eq!(sorted(whole), sorted(fragmented.clone()), "{sql}");
    }
    fragmented
}

#[test]
fn multi_partition_scan() {
    let rows = run("SELECT O_ID, CUST FROM ORDERS WHERE AMOUNT > 30.0", false);
    let expected: Vec<Row> = (21..=30)
        .map(|id| vec![Value::Int(id), Value::from(CUSTOMERS[(id % 3) as usize])])
        .collect();
    assert_eq!(sorted(rows), expected);
}

#[test]
fn single_partition_lookup_runs_on_the_key_partition() {
    let catalog = catalog();
    let plan = compile(&catalog, "SELECT CUST FROM ORDERS WHERE O_ID = 7");
    assert!(plan.single_partition);
    assert_eq!(plan.fragments.len(), 1);
    assert_eq!(
        plan.fragments.root_fragment().map(|f| f.site),
        Some(FragmentSite::SinglePartition)
    );
    assert_eq!(
        run("SELECT CUST FROM ORDERS WHERE O_ID = 7", true),
        vec![vec![Value::from("ann")]]
    );
}

#[test]
fn co_partitioned_join() {
    let rows = run(
        "SELECT O.O_ID, I.QTY FROM ORDERS O JOIN ITEMS I ON O.O_ID = I.O_ID WHERE O.CUST = 'ann'",
        false,
    );
    let expected: Vec<Row> = item_rows()
        .into_iter()
        .filter(|item| matches!(item[0], Value::Int(id) if id % 3 == 1))
        .collect();
    assert_eq!(sorted(rows), sorted(expected));
}

#[test]
fn join_with_replicated_table() {
    let rows = run(
        "SELECT O.O_ID, R.NAME FROM ORDERS O, REGIONS R WHERE R.R_ID = 1 AND O.O_ID < 4",
        false,
    );
    let expected: Vec<Row> = (1..4).map(|id| vec![Value::Int(id), Value::from("north")]).collect();
    assert_eq!(sorted(rows), expected);
}

#[test]
fn scalar_aggregates_combine_across_partitions() {
    let catalog = catalog();
    let plan = compile(&catalog, "SELECT COUNT(*), SUM(O_ID), MAX(AMOUNT) FROM ORDERS");
    assert!(plan.shape().contains("AGGREGATE[Partial]"));
    assert_eq!(plan.fragments.len(), 2);
    assert_eq!(
        run("SELECT COUNT(*), SUM(O_ID), MAX(AMOUNT) FROM ORDERS", true),
        vec![vec![Value::Int(30), Value::Int(465), Value::Float(45.0)]]
    );
    assert_eq!(
        run("SELECT AVG(AMOUNT) FROM ORDERS", true),
        vec![vec![Value::Float(23.25)]]
    );
}

#[test]
fn grouped_aggregate() {
    let rows = run("SELECT CUST, COUNT(*) FROM ORDERS GROUP BY CUST", false);
    assert_eq!(
        sorted(rows),
        vec![
            vec![Value::from("ann"), Value::Int(10)],
            vec![Value::from("bob"), Value::Int(10)],
            vec![Value::from("cy"), Value::Int(10)],
        ]
    );
}

#[test]
fn ordered_limit_with_pushdown() {
    assert_eq!(
        run("SELECT O_ID FROM ORDERS ORDER BY O_ID DESC LIMIT 3 OFFSET 1", true),
        vec![vec![Value::Int(29)], vec![Value::Int(28)], vec![Value::Int(27)]]
    );
    assert_eq!(
        run("SELECT DISTINCT CUST FROM ORDERS ORDER BY CUST", true),
        vec![vec![Value::from("ann")], vec![Value::from("bob")], vec![Value::from("cy")]]
    );
}

#[test]
fn writes_report_modified_tuples() {
    assert_eq!(
        run("DELETE FROM ORDERS WHERE AMOUNT < 6.0", true),
        vec![vec![Value::Int(3)]]
    );
    assert_eq!(
        run("UPDATE REGIONS SET NAME = 'west'", true),
        vec![vec![Value::Int(2)]]
    );
    assert_eq!(
        run("INSERT INTO ORDERS VALUES (99, 'zed', 1.0)", true),
        vec![vec![Value::Int(1)]]
    );
}
