use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use flowdesk::config::{EngineConfig, WorkflowDefinition};
use flowdesk::engine::{RunStatus, StepPhase, StepStatus, WorkflowEngine};
use flowdesk::error::{ActionError, ConfigError};
use serde_json::{Value, json};

fn workflow_path(file: &str) -> String {
    format!("{}/workflows/{}", env!("CARGO_MANIFEST_DIR"), file)
}

fn engine_with_confidence(confidence: f64) -> WorkflowEngine {
    let engine = WorkflowEngine::default();
    engine
        .register_action("set_confidence", move |_input: Value| async move {
            Ok::<_, ActionError>(json!(confidence))
        })
        .expect("Failed to register action");
    engine
}

#[test]
fn test_load_example_workflow() {
    let workflow = WorkflowDefinition::from_file(workflow_path("customer-message.toml"))
        .expect("Failed to load workflow");

    assert_eq!(workflow.name(), "customer-message");
    assert_eq!(workflow.version(), Some("1.0.0"));
    assert_eq!(workflow.trigger().kind, "im_message");

    let names: Vec<&str> = workflow.steps().iter().map(|s| s.name()).collect();
    assert_eq!(names, vec!["classify", "enrich", "review", "notify"]);
    assert_eq!(workflow.steps()[1].steps().len(), 2);
    assert_eq!(workflow.on_error().len(), 1);
    assert_eq!(workflow.on_complete().len(), 1);
}

#[test]
fn test_workflow_roundtrip_with_real_file() {
    let original = WorkflowDefinition::from_file(workflow_path("customer-message.toml"))
        .expect("Failed to load workflow");

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("roundtrip.toml");
    original.to_file(&path).expect("Failed to write");
    let restored = WorkflowDefinition::from_file(&path).expect("Failed to parse");

    assert_eq!(restored.name(), original.name());
    assert_eq!(restored.description(), original.description());
    assert_eq!(restored.trigger(), original.trigger());
    assert_eq!(restored.all_steps().len(), original.all_steps().len());
    assert_eq!(restored.steps()[2].fallback(), original.steps()[2].fallback());
}

#[tokio::test]
async fn test_cond_flow_high_confidence() {
    let engine = engine_with_confidence(0.9);
    engine.load_workflow_file(workflow_path("cond-flow.toml")).unwrap();

    let run = engine.execute("cond-flow", json!({})).await.unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.step("high").unwrap().status, StepStatus::Completed);
    assert_eq!(run.output["confidence"], json!(0.9));
    assert!(run.output.contains_key("done"));
}

#[tokio::test]
async fn test_cond_flow_low_confidence() {
    let engine = engine_with_confidence(0.4);
    engine.load_workflow_file(workflow_path("cond-flow.toml")).unwrap();

    let run = engine.execute("cond-flow", json!({})).await.unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    let high = run.step("high").unwrap();
    assert_eq!(high.status, StepStatus::Skipped);
    assert!(high.output.is_none());
    assert!(!run.output.contains_key("high"));
    assert!(run.output.contains_key("done"));
}

#[tokio::test]
async fn test_loop_collects_results_in_order() {
    let engine = WorkflowEngine::default();
    engine
        .register_action("double", |input: Value| async move {
            match input["n"].as_i64() {
                Some(n) => Ok(json!(n * 2)),
                None => Err(ActionError::new("n must be an integer")),
            }
        })
        .unwrap();
    engine
        .load_workflow_str(
            r#"
[workflow]
name = "loop"

[[steps]]
name = "double-all"
action = "double"
loop = "$trigger.numbers"
input = { n = "$item" }
output = "doubled"

[[steps]]
name = "count"
action = "echo"
input = "$doubled.length"
output = "count"
"#,
        )
        .unwrap();

    let run = engine.execute("loop", json!({"numbers": [1, 2, 3]})).await.unwrap();
    assert_eq!(run.output["doubled"], json!([2, 4, 6]));
    assert_eq!(run.output["count"], json!(3));

    let run = engine.execute("loop", json!({})).await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.output["doubled"], json!([]));
}

const SLOW_WORKFLOW: &str = r#"
[workflow]
name = "slow"

[[steps]]
name = "fetch"
action = "slow"
timeout = 50
fallback = { source = "fallback" }
output = "data"

[[steps]]
name = "strict"
action = "slow"
timeout = 50
output = "strict"

[[steps]]
name = "after"
action = "echo"
output = "after"
"#;

#[tokio::test(start_paused = true)]
async fn test_timeout_uses_fallback_or_fails() {
    let engine = WorkflowEngine::default();
    engine
        .register_action("slow", |_input: Value| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, ActionError>(json!("too late"))
        })
        .unwrap();
    engine.load_workflow_str(SLOW_WORKFLOW).unwrap();

    let run = engine.execute("slow", json!({})).await.unwrap();

    assert_eq!(run.step("fetch").unwrap().status, StepStatus::Completed);
    assert_eq!(run.output["data"], json!({"source": "fallback"}));

    let strict = run.step("strict").unwrap();
    assert_eq!(strict.status, StepStatus::Timeout);
    assert!(strict.error.is_some());
    assert!(run.step("after").is_none());

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.error.as_ref().map(|e| e.step.as_str()), Some("strict"));
}

#[tokio::test(start_paused = true)]
async fn test_default_action_timeout_from_config() {
    let config = EngineConfig::default().with_default_action_timeout(Duration::from_millis(20));
    let engine = WorkflowEngine::new(config);
    engine
        .register_action("slow", |_input: Value| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, ActionError>(Value::Null)
        })
        .unwrap();
    engine
        .load_workflow_str("[workflow]\nname = \"d\"\n\n[[steps]]\nname = \"s\"\naction = \"slow\"\n")
        .unwrap();

    let run = engine.execute("d", json!({})).await.unwrap();
    assert_eq!(run.step("s").unwrap().status, StepStatus::Timeout);
}

#[tokio::test]
async fn test_parallel_group_degrades_failed_sub_step() {
    let engine = WorkflowEngine::default();
    engine
        .register_action("boom", |_input: Value| async {
            Err::<Value, _>(ActionError::new("backend unavailable"))
        })
        .unwrap();
    engine
        .load_workflow_str(
            r#"
[workflow]
name = "fan-out"

[[steps]]
name = "group"
type = "parallel"
output = "group"

[[steps.steps]]
name = "a"
action = "echo"
input = "A"
output = "a"

[[steps.steps]]
name = "b"
action = "echo"
input = "B"
output = "b"

[[steps.steps]]
name = "broken"
action = "boom"
output = "broken"
"#,
        )
        .unwrap();

    let run = engine.execute("fan-out", json!({})).await.unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.steps.len(), 1);
    assert_eq!(run.output["group"], json!({"a": "A", "b": "B", "broken": null}));
    assert_eq!(run.output["a"], json!("A"));
    assert_eq!(run.output["b"], json!("B"));
}

#[tokio::test]
async fn test_failure_runs_on_error_then_on_complete() {
    let engine = WorkflowEngine::default();
    engine
        .register_action("boom", |_input: Value| async {
            Err::<Value, _>(ActionError::new("classification service down"))
        })
        .unwrap();
    engine
        .load_workflow_str(
            r#"
[workflow]
name = "failing"

[[steps]]
name = "classify"
action = "boom"
output = "classification"

[[steps]]
name = "never"
action = "echo"
output = "never"

[[on_error]]
name = "report"
action = "echo"
input = { failed = true }
output = "report"

[[on_complete]]
name = "cleanup"
action = "echo"
output = "cleanup"
"#,
        )
        .unwrap();

    let run = engine.execute("failing", json!({})).await.unwrap();

    assert_eq!(run.status, RunStatus::Failed);
    let error = run.error.as_ref().unwrap();
    assert_eq!(error.step, "classify");
    assert!(error.message.contains("classification service down"));

    let order: Vec<(&str, StepPhase)> = run.steps.iter().map(|s| (s.step_name.as_str(), s.phase)).collect();
    assert_eq!(
        order,
        vec![
            ("classify", StepPhase::Main),
            ("report", StepPhase::OnError),
            ("cleanup", StepPhase::OnComplete),
        ]
    );
    assert_eq!(run.output["report"], json!({"failed": true}));
    assert!(!run.output.contains_key("never"));

    let json: Value = serde_json::from_str(&run.to_json().unwrap()).unwrap();
    assert_eq!(json["status"], "failed");
    assert_eq!(json["steps"][0]["status"], "failed");
}

#[test]
fn test_load_workflows_from_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::copy(workflow_path("cond-flow.toml"), dir.path().join("cond-flow.toml")).unwrap();
    std::fs::write(
        dir.path().join("echo.toml"),
        "[workflow]\nname = \"echo\"\n\n[[steps]]\nname = \"e\"\naction = \"echo\"\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("README.md"), "not a workflow").unwrap();

    let engine = WorkflowEngine::new(EngineConfig::default().with_workflows_dir(dir.path()));
    engine
        .register_action("set_confidence", |_input: Value| async { Ok::<_, ActionError>(json!(1.0)) })
        .unwrap();

    let loaded = engine.load_workflows_from_directory().unwrap();
    assert_eq!(loaded, vec!["cond-flow".to_string(), "echo".to_string()]);
    assert_eq!(engine.workflow_names(), loaded);
}

#[test]
fn test_load_workflows_from_directory_propagates_bad_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("bad.toml"), "[workflow]\nname = \"bad\"\n").unwrap();

    let engine = WorkflowEngine::new(EngineConfig::default().with_workflows_dir(dir.path()));
    let err = engine.load_workflows_from_directory().unwrap_err();
    assert!(matches!(err, ConfigError::Validation(_)));
}

#[test]
fn test_missing_workflows_dir_is_not_fatal() {
    let engine = WorkflowEngine::new(EngineConfig::default().with_workflows_dir("/nonexistent/flowdesk"));
    assert!(engine.load_workflows_from_directory().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_loop_iteration_timeout_records_timeout_status() {
    let engine = WorkflowEngine::default();
    engine
        .register_action("maybe_slow", |input: Value| async move {
            if input == json!(2) {
                tokio::time::sleep(Duration::from_secs(10)).await;
            }
            Ok::<_, ActionError>(input)
        })
        .unwrap();
    engine
        .load_workflow_str(
            r#"
[workflow]
name = "loop-timeout"

[[steps]]
name = "with-fallback"
action = "maybe_slow"
loop = "$trigger.items"
input = "$item"
timeout = 50
fallback = "fb"
output = "lenient"

[[steps]]
name = "strict"
action = "maybe_slow"
loop = "$trigger.items"
input = "$item"
timeout = 50
output = "strict"
"#,
        )
        .unwrap();

    let run = engine.execute("loop-timeout", json!({"items": [1, 2, 3]})).await.unwrap();

    assert_eq!(run.output["lenient"], json!([1, "fb", 3]));
    assert_eq!(run.step("strict").unwrap().status, StepStatus::Timeout);
    assert!(!run.output.contains_key("strict"));
    assert_eq!(run.status, RunStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_parallel_batches_respect_max_parallel_steps() {
    let engine = WorkflowEngine::new(EngineConfig::default().with_max_parallel_steps(2));
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let log = Arc::new(Mutex::new(Vec::new()));
    {
        let (in_flight, peak, log) = (Arc::clone(&in_flight), Arc::clone(&peak), Arc::clone(&log));
        engine
            .register_action("tracked", move |input: Value| {
                let (in_flight, peak, log) = (Arc::clone(&in_flight), Arc::clone(&peak), Arc::clone(&log));
                async move {
                    let name = input.as_str().unwrap_or_default().to_string();
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    log.lock().unwrap().push(format!("start {}", name));

                    tokio::time::sleep(Duration::from_millis(100)).await;

                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    log.lock().unwrap().push(format!("end {}", name));
                    Ok::<_, ActionError>(input)
                }
            })
            .unwrap();
    }
    engine
        .load_workflow_str(
            r#"
[workflow]
name = "batched"

[[steps]]
name = "group"
type = "parallel"
output = "group"

[[steps.steps]]
name = "a"
action = "tracked"
input = "a"

[[steps.steps]]
name = "b"
action = "tracked"
input = "b"

[[steps.steps]]
name = "c"
action = "tracked"
input = "c"
"#,
        )
        .unwrap();

    let run = engine.execute("batched", json!({})).await.unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.output["group"], json!({"a": "a", "b": "b", "c": "c"}));
    assert_eq!(peak.load(Ordering::SeqCst), 2);

    let log = log.lock().unwrap().clone();
    let position = |entry: &str| log.iter().position(|e| e == entry).unwrap();
    assert!(position("start c") > position("end a"));
    assert!(position("start c") > position("end b"));
}
