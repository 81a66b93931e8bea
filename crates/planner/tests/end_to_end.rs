#[path = "support/mod.rs"]
mod support;

use arrow_schema::DataType;
use rill_common::RillError;
use rill_planner::{AggregateExpressionRewriter, BuiltinFunctionRegistry, PlanNode};

#[test]
fn count_by_key_plans_project_over_aggregate_over_source() {
    let plan = support::builder()
        .build_logical_plan(include_str!("queries/count_by_col1.sql"))
        .expect("plan");

    let PlanNode::Project { exprs, input, schema } = &plan else {
        panic!("expected Project root, got {}", plan.name());
    };
    let names: Vec<_> = exprs.iter().map(|(_, n)| n.as_str()).collect();
    assert_eq!(names, vec!["col1", "KSQL_COL_1"]);

    let PlanNode::Aggregate {
        group_keys,
        aggregates,
        window,
        input,
        ..
    } = input.as_ref()
    else {
        panic!("expected Aggregate under Project");
    };
    assert_eq!(group_keys.len(), 1);
    assert_eq!(group_keys[0].to_string(), "col1");
    assert_eq!(aggregates.len(), 1);
    assert_eq!(aggregates[0].call.to_string(), "COUNT(*)");
    assert!(window.is_none());

    let PlanNode::Source { name, alias, .. } = input.as_ref() else {
        panic!("expected Source under Aggregate");
    };
    assert_eq!(name, "stream1");
    assert!(alias.is_none());

    let out: Vec<_> = schema
        .fields()
        .iter()
        .map(|f| (f.name.as_str(), f.data_type.clone()))
        .collect();
    assert_eq!(
        out,
        vec![("col1", DataType::Utf8), ("KSQL_COL_1", DataType::Int64)]
    );
}

#[test]
fn unknown_column_is_reported_by_name() {
    let err = support::builder()
        .build_logical_plan("SELECT nosuchcol FROM stream1")
        .expect_err("unknown column");
    match err.kind() {
        RillError::UnknownColumn { name, location } => {
            assert_eq!(name, "nosuchcol");
            assert_eq!((location.line, location.column), (1, 8));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(err.to_string().contains("nosuchcol"), "err={err}");
}

#[test]
fn error_locations_point_at_the_identifier_token() {
    let err = support::builder()
        .compile("SELECT col1 FROM stream1;\nSELECT 'nosuchcol' AS s, nosuchcol FROM stream1")
        .expect_err("unknown column");
    match err.kind() {
        RillError::UnknownColumn { name, location } => {
            assert_eq!(name, "nosuchcol");
            assert_eq!((location.line, location.column), (2, 26));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn final_select_list_lines_up_with_select_list() {
    let compiled = support::builder()
        .compile(
            "SELECT col1, SUM(col2) * 2, col3 + 1, COUNT(*), SUM(col2) \
             FROM stream1 GROUP BY col1, col3",
        )
        .expect("compile");
    let c = &compiled[0];
    let select = c.analysis.select_expressions();
    let finals = c.aggregates.final_select_expressions();
    assert_eq!(select.len(), finals.len());

    let finals: Vec<_> = finals.iter().map(|e| e.to_string()).collect();
    assert_eq!(
        finals,
        vec![
            "col1",
            "(KSQL_AGG_VARIABLE_0 * 2)",
            "(col3 + 1)",
            "KSQL_AGG_VARIABLE_1",
            "KSQL_AGG_VARIABLE_0",
        ]
    );

    // Items without aggregates pass through untouched.
    let non_agg: Vec<_> = c
        .aggregates
        .non_aggregate_columns()
        .iter()
        .map(|e| e.to_string())
        .collect();
    assert_eq!(non_agg, vec!["col1", "(col3 + 1)"]);
    assert_eq!(&c.aggregates.non_aggregate_columns()[1], &select[2]);
}

#[test]
fn rewriting_is_pure_and_stable() {
    let builder = support::builder();
    let compiled = builder
        .compile("SELECT col1, UCASE(col1), SUM(col2) + col2 FROM stream1 GROUP BY col1, col2")
        .expect("compile");
    let c = &compiled[0];
    let registry = BuiltinFunctionRegistry::new();

    for (original, rewritten) in c
        .analysis
        .select_expressions()
        .iter()
        .zip(c.aggregates.final_select_expressions())
    {
        let snapshot = original.clone();
        let again = AggregateExpressionRewriter::new(&registry, &c.aggregates, builder.config())
            .rewrite(rewritten)
            .expect("rewrite");
        assert_eq!(&again, rewritten);
        assert_eq!(original, &snapshot);
    }
}

#[test]
fn group_by_covariance() {
    let builder = support::builder();
    builder
        .build_logical_plan("SELECT col1, col2, MAX(col3) FROM stream1 GROUP BY col1, col2")
        .expect("all keys grouped");

    let err = builder
        .build_logical_plan("SELECT col1, col2, MAX(col3) FROM stream1 GROUP BY col1")
        .expect_err("col2 not grouped");
    match err.kind() {
        RillError::NonAggregateColumnNotInGroupBy { column, location } => {
            assert_eq!(column, "col2");
            assert_eq!(location.column, 14);
        }
        other => panic!("unexpected error {other:?}"),
    }

    let err = builder
        .build_logical_plan("SELECT col1, COUNT(*) FROM stream1")
        .expect_err("no group by");
    assert!(
        matches!(err.kind(), RillError::NonAggregateColumnNotInGroupBy { .. }),
        "err={err}"
    );
}

#[test]
fn plans_survive_a_json_round_trip() {
    let plan = support::builder()
        .build_logical_plan(include_str!("queries/windowed_totals.sql"))
        .expect("plan");
    let json = serde_json::to_string(&plan).expect("serialize");
    let back: PlanNode = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back, plan);
}

#[test]
fn planning_is_deterministic() {
    let builder = support::builder();
    let sql = include_str!("queries/enrich_orders.sql");
    let a = builder.build_logical_plan(sql).expect("plan");
    let b = builder.build_logical_plan(sql).expect("plan");
    assert_eq!(a, b);
}
