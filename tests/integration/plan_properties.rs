#![allow(missing_docs)]

use std::sync::Arc;

use keel::{
    catalog::CatalogProvider,
    eval::{evaluate_fragments, Dataset, Row},
    CompiledPlan, InMemoryCatalog, QueryPlanner, TableDef, Value, ValueType,
};
use proptest::prelude::*;
use proptest::sample::subsequence;

fn catalog() -> Arc<InMemoryCatalog> {
    Arc::new(
        InMemoryCatalog::new().with_table(
            TableDef::new("ORDERS")
                .with_required_column("O_ID", ValueType::Integer)
                .with_column("CUST", ValueType::Varchar)
                .with_column("AMOUNT", ValueType::Float)
                .partitioned_on("O_ID")
                .with_index("ORDERS_PK", ["O_ID"], true),
        ),
    )
}

fn planner(sql: &str) -> QueryPlanner {
    let provider: Arc<dyn CatalogProvider> = catalog();
    QueryPlanner::builder(sql, provider).build()
}

fn compile(sql: &str, parameterize: bool) -> CompiledPlan {
    planner(sql)
        .compile(parameterize)
        .unwrap_or_else(|err| panic!("{sql}: {err}"))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn literals_never_change_the_plan(id in 0i64..100_000, cust in "[a-z]{1,8}", amount in 0u32..1000) {
        let sql = format!(
            "SELECT CUST FROM ORDERS WHERE O_ID = {id} AND CUST = '{cust}' AND AMOUNT > {amount}.5"
        );
        let parameterized = compile(&sql, true);
        let direct = compile(&sql, false);
        prop_assert!(parameterized.from_parameterized);
        prop_assert_eq!(parameterized.shape(), direct.shape());
        prop_assert!((parameterized.cost - direct.cost).abs() < 1e-9);
        let params = parameterized.extracted_params.expect("bound");
        prop_assert_eq!(
            params.values(),
            &[Value::Int(id), Value::from(cust.as_str()), Value::Float(f64::from(amount) + 0.5)]
        );
    }

    #[test]
    fn literal_variants_share_a_token(a in 0i64..1000, b in 0i64..1000) {
        let token = |id: i64| {
            let mut planner = planner(&format!("SELECT AMOUNT FROM ORDERS WHERE O_ID = {id}"));
            planner.parse().expect("parses");
            planner.parameterize().expect("parameterizes")
        };
        prop_assert_eq!(token(a), token(b));
    }

    #[test]
    fn output_columns_follow_the_select_list(
        columns in subsequence(vec!["O_ID", "CUST", "AMOUNT"], 1..=3).prop_shuffle(),
        limit in proptest::option::of(1u64..20),
    ) {
        let mut sql = format!("SELECT {} FROM ORDERS", columns.join(", "));
        if let Some(limit) = limit {
            sql.push_str(&format!(" ORDER BY {} LIMIT {limit}", columns[0]));
        }
        let plan = compile(&sql, true);
        let aliases: Vec<&str> = plan.columns.columns().iter().map(|c| c.alias.as_str()).collect();
        prop_assert_eq!(aliases, columns);
        let ids: Vec<u32> = plan.root.node_ids().iter().map(|id| id.0).collect();
        let expected: Vec<u32> = (1..=ids.len() as u32).collect();
        prop_assert_eq!(ids, expected);
    }

    #[test]
    fn fragmented_scan_returns_exactly_the_matching_rows(threshold in 0i64..40, partitions in 1u32..6) {
        let catalog = catalog();
        let def = catalog.table("ORDERS").expect("orders").clone();
        let mut data = Dataset::new(partitions);
        data.insert_rows(
            &def,
            (1..=30).map(|id| vec![Value::Int(id), Value::from("c"), Value::Float(1.0)]),
        )
        .expect("rows");
        let plan = compile(&format!("SELECT O_ID FROM ORDERS WHERE O_ID < {threshold}"), true);
        let params = plan.extracted_params.clone().unwrap_or_default();
        let mut rows = evaluate_fragments(&plan, &data, &params).expect("runs");
        rows.sort_by(|a, b| a[0].sort_cmp(&b[0]));
        let expected: Vec<Row> = (1..threshold.min(31)).map(|id| vec![Value::Int(id)]).collect();
        prop_assert_eq!(rows, expected);
    }
}
