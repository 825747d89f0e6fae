#![allow(missing_docs)]

use std::sync::Arc;

use keel::{
    assemble::{RecordingPlanTrace, TraceEvent},
    catalog::CatalogProvider,
    param::ParameterizationInfo,
    sql::{SqlParser, StatementParser},
    value::{LiteralKind, LiteralToken},
    CompiledPlan, DeterminismMode, InMemoryCatalog, PlannerError, PlannerStage, QueryPlanner, TableDef, Value,
    ValueType,
};

fn catalog() -> Arc<dyn CatalogProvider> {
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

fn compile(sql: &str, parameterize: bool) -> CompiledPlan {
    QueryPlanner::builder(sql, catalog())
        .build()
        .compile(parameterize)
        .unwrap_or_else(|err| panic!("{sql}: {err}"))
}

#[test]
fn parameterized_plans_match_direct_compilation() {
    let statements = [
        "SELECT CUST FROM ORDERS WHERE O_ID = 10",
        "SELECT CUST, AMOUNT FROM ORDERS WHERE AMOUNT > 2.5 ORDER BY AMOUNT LIMIT 5",
        "SELECT COUNT(*) FROM ORDERS WHERE CUST = 'bob'",
        "SELECT NAME FROM REGIONS WHERE R_ID = 1",
        "UPDATE ORDERS SET AMOUNT = 1.5 WHERE O_ID = 3",
        "DELETE FROM ITEMS WHERE QTY > 100",
        "INSERT INTO ITEMS VALUES (4, 2)",
    ];
    for sql in statements {
        let parameterized = compile(sql, true);
        let direct = compile(sql, false);
        assert!(parameterized.from_parameterized, "{sql}");
        assert!(!direct.from_parameterized, "{sql}");
        assert_eq!(parameterized.shape(), direct.shape(), "{sql}");
        assert!((parameterized.cost - direct.cost).abs() < 1e-9, "{sql}");
        assert_eq!(parameterized.single_partition, direct.single_partition, "{sql}");
        assert_eq!(parameterized.columns, direct.columns, "{sql}");
        let params = parameterized.extracted_params.as_ref().expect("bound literals");
        assert_eq!(params.len(), parameterized.parameter_count(), "{sql}");
        assert_eq!(direct.extracted_params, None, "{sql}");
    }
}

#[test]
fn determinism_mode_changes_the_chosen_plan() {
    let sql = "SELECT CUST FROM ORDERS LIMIT 3";
    let plan_in = |mode| {
        QueryPlanner::builder(sql, catalog())
            .determinism(mode)
            .build()
            .compile(true)
            .unwrap_or_else(|err| panic!("{sql}: {err}"))
    };
    let fast = plan_in(DeterminismMode::Faster);
    let safe = plan_in(DeterminismMode::Safer);
    assert_eq!(
        fast.shape(),
        "SEND(PROJECTION(LIMIT(RECEIVE(SEND(LIMIT(SEQSCAN[ORDERS ORDERS]))))))"
    );
    assert!(!fast.deterministic_order);
    assert_eq!(
        safe.shape(),
        "SEND(PROJECTION(LIMIT(ORDERBY(RECEIVE(SEND(LIMIT(ORDERBY(SEQSCAN[ORDERS ORDERS]))))))))"
    );
    assert!(safe.deterministic_order);
    assert!(safe.cost > fast.cost);
}

#[test]
fn bound_literals_take_their_slot_types() {
    let plan = compile("SELECT CUST FROM ORDERS WHERE O_ID = 10 AND AMOUNT < 3", true);
    assert_eq!(plan.parameter_types(), [ValueType::Integer, ValueType::Float]);
    let params = plan.extracted_params.as_ref().expect("bound literals");
    assert_eq!(params.values(), &[Value::Int(10), Value::Float(3.0)]);
    assert!(plan.single_partition);
    assert!(plan.shape().contains("INDEXSCAN[ORDERS ORDERS ORDERS_PK/1]"));
}

#[test]
fn parameter_overflow_falls_back_to_the_original_statement() {
    let sql = "SELECT CUST FROM ORDERS WHERE O_ID = 1 AND AMOUNT = 2.0";
    let mut planner = QueryPlanner::builder(sql, catalog()).max_param_count(1).build();
    planner.parse().expect("parses");
    planner.parameterize().expect("parameterizes");
    assert_eq!(planner.stage(), PlannerStage::Parameterized);
    let plan = planner.plan().expect("falls back");
    assert!(planner.was_bad_parameterized());
    assert!(!planner.compiled_as_parameterized_plan());
    assert_eq!(plan.extracted_params, None);
    assert_eq!(plan, compile(sql, false));
}

#[test]
fn join_limit_requires_manual_order() {
    let sql = "SELECT ORDERS.CUST FROM ORDERS, ITEMS, REGIONS WHERE ORDERS.O_ID = ITEMS.O_ID";
    let err = QueryPlanner::builder(sql, catalog())
        .max_tables_per_join(2)
        .build()
        .compile(true)
        .expect_err("too many tables");
    assert!(matches!(err, PlannerError::JoinComplexity { .. }));
    let message = err.to_string();
    assert!(message.starts_with("Failed to parse SQL statement: SELECT ORDERS.CUST"));
    assert!(message.contains("because a join of > 2 tables was requested without specifying a join order"));

    let plan = QueryPlanner::builder(sql, catalog())
        .max_tables_per_join(2)
        .join_order("REGIONS,ORDERS,ITEMS")
        .build()
        .compile(true)
        .expect("manual order plans");
    assert!(!plan.single_partition);
    assert!(plan
        .shape()
        .contains("NESTLOOP(NESTLOOP(SEQSCAN[REGIONS REGIONS],SEQSCAN[ORDERS ORDERS]),SEQSCAN[ITEMS ITEMS])"));
}

#[test]
fn join_without_partition_equality_is_rejected() {
    let err = QueryPlanner::builder("SELECT ORDERS.CUST FROM ORDERS, ITEMS", catalog())
        .build()
        .compile(true)
        .expect_err("partitioned tables must join on their partition columns");
    assert_eq!(err.code(), "Assembly");
}

#[test]
fn read_plans_output_exactly_their_display_columns() {
    let cases: [(&str, &[&str]); 5] = [
        ("SELECT CUST AS C, AMOUNT FROM ORDERS", &["C", "AMOUNT"]),
        ("SELECT * FROM ITEMS WHERE QTY = 2", &["O_ID", "QTY"]),
        ("SELECT CUST, COUNT(*) FROM ORDERS GROUP BY CUST", &["CUST", "C2"]),
        ("SELECT DISTINCT CUST FROM ORDERS ORDER BY CUST", &["CUST"]),
        (
            "SELECT O.CUST, I.QTY FROM ORDERS O JOIN ITEMS I ON O.O_ID = I.O_ID WHERE I.QTY > 1",
            &["CUST", "QTY"],
        ),
    ];
    for (sql, expected) in cases {
        for parameterize in [true, false] {
            let plan = compile(sql, parameterize);
            let aliases: Vec<&str> = plan.columns.columns().iter().map(|c| c.alias.as_str()).collect();
            assert_eq!(aliases, expected, "{sql}");
            assert!(plan.read_only);
            assert_eq!(plan.shape().split('(').next(), Some("SEND"), "{sql}");
        }
    }
}

#[test]
fn node_numbering_is_identical_across_fresh_planners() {
    let sql = "SELECT CUST, SUM(AMOUNT) FROM ORDERS WHERE AMOUNT > 1.0 GROUP BY CUST ORDER BY CUST";
    let first = compile(sql, true);
    let second = compile(sql, true);
    assert_eq!(first, second);
    let ids: Vec<u32> = first.root.node_ids().iter().map(|id| id.0).collect();
    let expected: Vec<u32> = (1..=ids.len() as u32).collect();
    assert_eq!(ids, expected);
}

#[test]
fn literal_variants_share_a_token() {
    let token = |sql: &str| {
        let mut planner = QueryPlanner::builder(sql, catalog()).build();
        planner.parse().expect("parses");
        planner.parameterize().expect("parameterizes")
    };
    assert_eq!(
        token("SELECT CUST FROM ORDERS WHERE O_ID = 1"),
        token("SELECT CUST FROM ORDERS WHERE O_ID = 99")
    );
    assert_ne!(
        token("SELECT CUST FROM ORDERS WHERE O_ID = 1"),
        token("SELECT CUST FROM ORDERS WHERE O_ID = ?")
    );
}

#[test]
fn parameterization_is_reversible() {
    let tree = SqlParser
        .parse("SELECT * FROM T WHERE a = 5 AND b = 'x'")
        .expect("parses");
    let info = ParameterizationInfo::parameterize(&tree).expect("applies");
    assert_eq!(
        info.literal_values(),
        &[
            LiteralToken::new(LiteralKind::Integer, "5"),
            LiteralToken::new(LiteralKind::String, "x"),
        ]
    );
    let mut markers = 0;
    info.parameterized_tree().walk(&mut |e| {
        if e.name == "value" && e.flag("isparam") {
            markers += 1;
        }
    });
    assert_eq!(markers, 2);
    assert_eq!(info.restore(), tree);
}

#[test]
fn syntax_errors_do_not_fall_back() {
    let mut planner = QueryPlanner::builder("SELECT FROM", catalog()).build();
    let err = planner.compile(true).expect_err("syntax");
    assert_eq!(err.code(), "Syntax");
    assert!(!planner.was_bad_parameterized());
}

#[test]
fn modeling_errors_carry_their_code() {
    let err = QueryPlanner::builder("SELECT NOPE FROM ORDERS WHERE O_ID = 1", catalog())
        .build()
        .compile(true)
        .expect_err("unknown column");
    assert_eq!(err.code(), "UnknownColumn");
    assert!(err.to_string().starts_with("[UnknownColumn]"));
}

#[test]
fn trace_sees_every_stage() {
    let trace = Arc::new(RecordingPlanTrace::new());
    QueryPlanner::builder("SELECT CUST FROM ORDERS WHERE CUST = 'x'", catalog())
        .trace(trace.clone())
        .build()
        .compile(true)
        .expect("plans");
    let events = trace.events();
    assert!(matches!(events[0], TraceEvent::Parsed));
    assert!(matches!(events[1], TraceEvent::Parameterized { literals: 1 }));
    assert!(matches!(events[2], TraceEvent::Modeled { params: 1 }));
    assert!(events.iter().any(|e| matches!(e, TraceEvent::Candidate { .. })));
    assert!(events.iter().any(|e| matches!(e, TraceEvent::BestPlan { .. })));
    assert!(matches!(
        events.last(),
        Some(TraceEvent::Compiled {
            from_parameterized: true
        })
    ));
}
