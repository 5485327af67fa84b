//! Failure isolation and admission control

use dump_manager::store::LAST_LINK;
use std::sync::Arc;
use test_utils::{RecordingPipeline, ResultAssertions, RunSpec, RunState, StaticInventory, TestContext};

#[test]
fn test_failed_schema_does_not_affect_siblings() {
    let ctx = TestContext::new();
    let inventory = Arc::new(
        StaticInventory::new()
            .with_schema("a", 100)
            .with_schema("b", 100)
            .with_schema("c", 100),
    );
    let pipeline = Arc::new(RecordingPipeline::new().fail_on("b"));

    let outcome = ctx.run(&inventory, &pipeline, &RunSpec::default().parallelism(3));

    assert_eq!(outcome.state, RunState::Finalized);
    let result = outcome.result.assert_ok();
    assert_eq!(result.total, 3);
    assert_eq!(result.successful, 2);
    assert_eq!(result.failed, 1);
    assert!(result.is_success());
    assert_eq!(pipeline.call_count(), 3);

    let current = outcome.store.current();
    assert!(current.artifact_path("a").is_file());
    assert!(current.artifact_path("c").is_file());
    assert!(!current.artifact_path("b").exists());
    assert!(!current.timestamp_path("b").exists());
    assert!(ctx.backup_dir().join(LAST_LINK).exists());
}

#[test]
fn test_failed_schema_is_dumped_again_next_run() {
    let ctx = TestContext::new();
    let inventory = Arc::new(
        StaticInventory::new()
            .with_schema("a", 100)
            .with_schema("b", 100),
    );
    let spec = RunSpec::default().versions(2).skip_unchanged();

    let failing = Arc::new(RecordingPipeline::new().fail_on("b"));
    ctx.run(&inventory, &failing, &spec).result.assert_ok();

    let healthy = Arc::new(RecordingPipeline::new());
    let result = ctx.run(&inventory, &healthy, &spec).result.assert_ok();

    assert_eq!(healthy.calls(), vec!["b"]);
    assert_eq!(result.successful, 2);
    assert_eq!(result.reused, 1);
}

#[test]
fn test_all_schemas_failing_is_overall_failure() {
    let ctx = TestContext::new();
    let inventory = Arc::new(
        StaticInventory::new()
            .with_schema("a", 100)
            .with_schema("b", 100),
    );
    let pipeline = Arc::new(RecordingPipeline::new().fail_on("a").fail_on("b"));

    let result = ctx.run(&inventory, &pipeline, &RunSpec::default()).result.assert_ok();

    assert_eq!(result.successful, 0);
    assert_eq!(result.failed, 2);
    assert!(!result.is_success());
}

#[test]
fn test_insufficient_space_aborts_before_any_task() {
    let ctx = TestContext::new();
    let inventory = Arc::new(
        StaticInventory::new()
            .with_schema("small", 100)
            .with_schema("huge", 1 << 62),
    );
    let pipeline = Arc::new(RecordingPipeline::new());

    let outcome = ctx.run(&inventory, &pipeline, &RunSpec::default());

    assert_eq!(outcome.state, RunState::Aborted);
    let err = outcome.result.unwrap_err();
    assert!(err.is_admission_failure());
    assert!(err.to_string().contains("Not enough free space"));

    assert_eq!(pipeline.call_count(), 0);
    assert!(!ctx.backup_dir().join(LAST_LINK).exists());
    let entries = std::fs::read_dir(outcome.store.current().path()).unwrap().count();
    assert_eq!(entries, 0);
}

#[test]
fn test_excluded_huge_schema_does_not_count_against_space() {
    let ctx = TestContext::new();
    let inventory = Arc::new(
        StaticInventory::new()
            .with_schema("small", 100)
            .with_schema("huge", 1 << 62),
    );
    let pipeline = Arc::new(RecordingPipeline::new());
    let spec = RunSpec::default().selection(test_utils::SchemaSelection::Exclude(vec![
        "huge".to_string(),
    ]));

    let result = ctx.run(&inventory, &pipeline, &spec).result.assert_ok();

    assert_eq!(result.successful, 1);
    assert_eq!(result.skipped, 1);
}
