use std::sync::Arc;

use serde_json::{json, Value};
use tabflow_core::connector::RuntimeFn;
use tabflow_core::{Connector, ConnectorError, ConnectorRegistry, DataType, FlowError, MemoryConnector, Pipeline, Row, Schema, TabularKind};
use tabflow_steps::{build_pipeline, EngineDefaults, PipelineDocument};

fn schema() -> Schema {
    Schema::new().with_column("id", DataType::Integer)
                 .with_column("label", DataType::Varchar)
}

fn rows(from: i64, n: i64) -> Vec<Row> { (from..from + n).map(|i| vec![json!(i), json!(format!("row {i}"))]).collect() }

fn setup() -> (Arc<MemoryConnector>, Arc<ConnectorRegistry>) {
    let mem = MemoryConnector::new("mem");
    let registry = Arc::new(ConnectorRegistry::new().with(mem.clone()));
    (mem, registry)
}

fn pipeline(document: Value, registry: Arc<ConnectorRegistry>) -> Pipeline {
    let document: PipelineDocument = serde_json::from_value(document).expect("document");
    build_pipeline(&document, registry, &EngineDefaults::default()).expect("pipeline")
}

fn uris(resources: &[tabflow_core::ResourceRef]) -> Vec<String> { resources.iter().map(|r| r.uri()).collect() }

#[test]
fn fan_out_transfer_copies_each_selected_table() {
    let (mem, registry) = setup();
    mem.create_table("stage_a", schema(), rows(0, 3)).expect("stage_a");
    mem.create_table("stage_b", schema(), rows(10, 5)).expect("stage_b");
    mem.create_table("other", schema(), rows(0, 1)).expect("other");
    let mut pipeline = pipeline(json!({
                                    "name": "fan-out",
                                    "steps": [
                                        {"operation": "select", "args": {"dataSelectors": "stage_*"}},
                                        {"operation": "transfer", "args": {"targetUri": "dw_${input_logical_name}", "batchSize": 2}}
                                    ]
                                }),
                                registry);
    let result = pipeline.run().expect("run");
    assert!(result.is_success());
    assert_eq!(result.cycles, 2);
    assert_eq!(uris(&result.downstream), vec!["dw_stage_a@mem", "dw_stage_b@mem"]);
    assert_eq!(mem.rows("dw_stage_a"), rows(0, 3));
    assert_eq!(mem.rows("dw_stage_b"), rows(10, 5));
    assert!(!mem.contains("dw_other"));
}

#[test]
fn concat_transfer_loads_every_input_into_one_target() {
    let (mem, registry) = setup();
    mem.create_table("part_1", schema(), rows(0, 2)).expect("part_1");
    mem.create_table("part_2", schema(), rows(2, 4)).expect("part_2");
    let mut pipeline = pipeline(json!({
                                    "name": "concat",
                                    "steps": [
                                        {"operation": "select", "args": {"dataSelectors": ["part_1", "part_2"]}},
                                        {"operation": "transfer", "args": {"targetUri": "parts"}}
                                    ]
                                }),
                                registry);
    let result = pipeline.run().expect("run");
    assert_eq!(uris(&result.downstream), vec!["parts@mem"]);
    assert_eq!(mem.rows("parts"), rows(0, 6));
    assert_eq!(result.exit_status, 0);
}

#[test]
fn list_keeps_the_input_order() {
    let (mem, registry) = setup();
    mem.create_table("gamma", schema(), rows(0, 1)).expect("gamma");
    mem.create_table("alpha", schema(), rows(0, 3)).expect("alpha");
    mem.create_table("beta", schema(), vec![]).expect("beta");
    let mut pipeline = pipeline(json!({
                                    "name": "inventory",
                                    "steps": [
                                        {"operation": "define", "args": {"dataUri": ["gamma", "alpha", "beta"]}},
                                        {"operation": "list", "args": {"attributes": ["uri", "count"], "targetUri": "inventory"}}
                                    ]
                                }),
                                registry);
    let result = pipeline.run().expect("run");
    assert_eq!(uris(&result.downstream), vec!["inventory@mem"]);
    assert_eq!(mem.rows("inventory"),
               vec![vec![json!("gamma@mem"), json!(1)], vec![json!("alpha@mem"), json!(3)], vec![json!("beta@mem"), json!(0)]]);
}

#[test]
fn execute_records_failures_and_sets_the_exit_status() {
    let (mem, registry) = setup();
    let ok: RuntimeFn = Arc::new(|| Ok((Schema::new().with_column("n", DataType::Integer), vec![vec![json!(1)], vec![json!(2)]])));
    let broken: RuntimeFn = Arc::new(|| Err(ConnectorError::defect("division by zero")));
    mem.register_runtime("job_1", TabularKind::Query, Some("select 1"), ok).expect("job_1");
    mem.register_runtime("job_2", TabularKind::Query, Some("select 1/0"), broken).expect("job_2");
    let mut pipeline = pipeline(json!({
                                    "name": "jobs",
                                    "steps": [
                                        {"operation": "select", "args": {"dataSelectors": "job_*"}},
                                        {"operation": "execute"}
                                    ]
                                }),
                                registry);
    let result = pipeline.run().expect("run");
    assert_eq!(result.exit_status, 1);
    assert_eq!(result.downstream.len(), 1);
    let rows = mem.rows(result.downstream[0].address());
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][0], json!("job_1@mem"));
    assert_eq!(rows[0][1], json!(0));
    assert_eq!(rows[1][1], json!(1));
    assert!(mem.contains("job_2_error"));
}

#[test]
fn streamed_executions_accumulate_in_a_fixed_target() {
    let (mem, registry) = setup();
    let ok: RuntimeFn = Arc::new(|| Ok((Schema::new().with_column("n", DataType::Integer), vec![vec![json!(1)]])));
    mem.register_runtime("job_1", TabularKind::Query, None, ok.clone()).expect("job_1");
    mem.register_runtime("job_2", TabularKind::Query, None, ok).expect("job_2");
    let mut pipeline = pipeline(json!({
                                    "name": "stream-jobs",
                                    "steps": [
                                        {"operation": "define", "args": {"dataUri": ["job_1", "job_2"]}},
                                        {"operation": "execute", "args": {"processingType": "stream", "targetUri": "runs"}}
                                    ]
                                }),
                                registry);
    let result = pipeline.run().expect("run");
    assert_eq!(uris(&result.downstream), vec!["runs@mem", "runs@mem"]);
    let runs: Vec<Value> = mem.rows("runs").into_iter().map(|r| r[0].clone()).collect();
    assert_eq!(runs, vec![json!("job_1@mem"), json!("job_2@mem")]);
}

#[test]
fn strict_execution_stops_the_pipeline() {
    let (mem, registry) = setup();
    let broken: RuntimeFn = Arc::new(|| Err(ConnectorError::defect("boom")));
    mem.register_runtime("job", TabularKind::Query, None, broken).expect("job");
    let mut pipeline = pipeline(json!({
                                    "name": "strict-jobs",
                                    "steps": [
                                        {"operation": "define", "args": {"dataUri": "job"}},
                                        {"operation": "execute", "args": {"strictExecution": true}}
                                    ]
                                }),
                                registry);
    assert!(matches!(pipeline.run(), Err(FlowError::Execution { .. })));
}

#[test]
fn diff_reports_changed_rows_and_fails_the_run() {
    let (mem, registry) = setup();
    let keyed = Schema::from_columns(vec![tabflow_core::Column::new("id", DataType::Integer).primary_key(),
                                          tabflow_core::Column::new("label", DataType::Varchar)]);
    mem.create_table("current", keyed.clone(), rows(0, 3)).expect("current");
    let mut baseline = rows(0, 3);
    baseline[1][1] = json!("renamed");
    mem.create_table("baseline", keyed, baseline).expect("baseline");
    let mut pipeline = pipeline(json!({
                                    "name": "compare",
                                    "steps": [
                                        {"operation": "define", "args": {"dataUri": "current"}},
                                        {"operation": "diff", "args": {"targetUri": "baseline", "reportUri": "changes", "reportDensity": "sparse"}}
                                    ]
                                }),
                                registry);
    let result = pipeline.run().expect("run");
    assert_eq!(result.exit_status, 1);
    assert_eq!(uris(&result.downstream), vec!["changes@mem"]);
    assert_eq!(mem.rows("changes"),
               vec![vec![json!("changed"), json!(1), json!("row 1")], vec![json!("changed"), json!(1), json!("renamed")]]);
}

#[test]
fn drop_removes_children_before_parents() {
    let (mem, registry) = setup();
    for name in ["a", "b", "c"] {
        mem.create_table(name, schema(), vec![]).expect("table");
    }
    mem.add_reference("b", "a").expect("b -> a");
    mem.add_reference("c", "b").expect("c -> b");
    let mut pipeline = pipeline(json!({
                                    "name": "cleanup",
                                    "steps": [
                                        {"operation": "define", "args": {"dataUri": ["a", "b", "c"]}},
                                        {"operation": "drop"}
                                    ]
                                }),
                                registry);
    let result = pipeline.run().expect("run");
    assert_eq!(uris(&result.downstream), vec!["c@mem", "b@mem", "a@mem"]);
    assert!(mem.list("*").expect("list").is_empty());
}

#[test]
fn dependencies_follow_their_dependent() {
    let (mem, registry) = setup();
    mem.create_table("base", schema(), rows(0, 2)).expect("base");
    mem.create_view("report", schema(), &["base"]).expect("report");
    let mut pipeline = pipeline(json!({
                                    "name": "lineage",
                                    "steps": [
                                        {"operation": "define", "args": {"dataUri": "report"}},
                                        {"operation": "dependencies"},
                                        {"operation": "list", "args": {"attributes": ["uri", "kind"]}}
                                    ]
                                }),
                                registry);
    let result = pipeline.run().expect("run");
    assert_eq!(uris(&result.downstream), vec!["data_resource_list@mem"]);
    let listed: Vec<Value> = mem.rows("data_resource_list").into_iter().map(|r| r[0].clone()).collect();
    assert_eq!(listed, vec![json!("report@mem"), json!("base@mem")]);
}

#[test]
fn reset_makes_runs_repeatable() {
    let (mem, registry) = setup();
    mem.create_table("t1", schema(), rows(0, 1)).expect("t1");
    mem.create_table("t2", schema(), rows(0, 2)).expect("t2");
    let mut pipeline = pipeline(json!({
                                    "name": "repeat",
                                    "steps": [
                                        {"operation": "select", "args": {"dataSelectors": ["t*", "t1"]}},
                                        {"operation": "distinct"},
                                        {"operation": "summary", "args": {"targetUri": "stats"}}
                                    ]
                                }),
                                registry);
    let first = pipeline.run().expect("first run");
    let first_rows = mem.rows("stats");
    pipeline.reset().expect("reset");
    let second = pipeline.run().expect("second run");
    assert_eq!(first.cycles, second.cycles);
    assert_eq!(uris(&first.downstream), uris(&second.downstream));
    assert_eq!(first_rows, mem.rows("stats"));
    assert_eq!(first_rows[0][0], json!(2));
}

#[test]
fn configuration_errors_surface_before_running() {
    let (_mem, registry) = setup();
    let invalid = [json!({"name": "p", "steps": [{"operation": "select"}]}),
                   json!({"name": "p", "steps": [{"operation": "select", "args": {"dataSelectors": "x"}},
                                                 {"operation": "transfer", "args": {"target": "y"}}]}),
                   json!({"name": "p", "mode": "sometimes", "steps": [{"operation": "define", "args": {"dataUri": "x"}}]}),
                   json!({"name": "p", "steps": [{"operation": "define", "args": {"dataUri": "x"}},
                                                 {"operation": "list", "args": {"targetUri": "list_${input_name}"}}]})];
    for document in invalid {
        let document: PipelineDocument = serde_json::from_value(document).expect("document");
        assert!(build_pipeline(&document, registry.clone(), &EngineDefaults::default()).is_err(),
                "{} should be rejected",
                document.name);
    }
}
