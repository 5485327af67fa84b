//! Generation rotation and change detection across consecutive runs

use dump_manager::store::LAST_LINK;
use std::fs;
use std::sync::Arc;
use test_utils::{RecordingPipeline, ResultAssertions, RunSpec, RunState, StaticInventory, TestContext};

fn three_schemas() -> Arc<StaticInventory> {
    Arc::new(
        StaticInventory::new()
            .with_schema("a", 1024)
            .with_schema("b", 2048)
            .with_schema("c", 4096),
    )
}

#[test]
fn test_unchanged_schemas_are_reused_on_later_runs() {
    let ctx = TestContext::new();
    let inventory = three_schemas();
    let pipeline = Arc::new(RecordingPipeline::new());
    let spec = RunSpec::default().versions(3).parallelism(2).skip_unchanged();

    let first = ctx.run(&inventory, &pipeline, &spec).result.assert_ok();
    assert_eq!(first.total, 3);
    assert_eq!(first.successful, 3);
    assert_eq!(first.reused, 0);
    assert_eq!(pipeline.call_count(), 3);

    for _ in 0..3 {
        pipeline.reset();
        let outcome = ctx.run(&inventory, &pipeline, &spec);

        assert_eq!(outcome.state, RunState::Finalized);
        let result = outcome.result.assert_ok();
        assert_eq!(result.successful, 3);
        assert_eq!(result.reused, 3);
        assert_eq!(result.fresh_dumps(), 0);
        assert_eq!(result.failed, 0);
        assert!(result.is_success());
        assert_eq!(pipeline.call_count(), 0);
    }

    let generations = ctx.generations();
    assert_eq!(generations.len(), 3);

    let newest = generations.last().unwrap();
    for schema in ["a", "b", "c"] {
        assert!(newest.join(format!("{}.sql.gz", schema)).is_file());
        assert!(newest.join(format!("{}.timestamp", schema)).is_file());
    }
    assert_eq!(
        fs::canonicalize(ctx.backup_dir().join(LAST_LINK)).unwrap(),
        fs::canonicalize(newest).unwrap()
    );
}

#[test]
fn test_modified_schema_is_dumped_again() {
    let ctx = TestContext::new();
    let inventory = three_schemas();
    let pipeline = Arc::new(RecordingPipeline::new());
    let spec = RunSpec::default().versions(2).skip_unchanged();

    ctx.run(&inventory, &pipeline, &spec).result.assert_ok();
    pipeline.reset();

    inventory.touch("b");
    let result = ctx.run(&inventory, &pipeline, &spec).result.assert_ok();

    assert_eq!(pipeline.calls(), vec!["b"]);
    assert_eq!(result.successful, 3);
    assert_eq!(result.reused, 2);
    assert_eq!(result.fresh_dumps(), 1);
}

#[test]
fn test_without_change_detection_everything_is_dumped() {
    let ctx = TestContext::new();
    let inventory = three_schemas();
    let pipeline = Arc::new(RecordingPipeline::new());
    let spec = RunSpec::default().versions(2);

    ctx.run(&inventory, &pipeline, &spec).result.assert_ok();
    let result = ctx.run(&inventory, &pipeline, &spec).result.assert_ok();

    assert_eq!(result.reused, 0);
    assert_eq!(pipeline.call_count(), 6);
}

#[test]
fn test_retention_after_run() {
    let ctx = TestContext::new();
    let inventory = three_schemas();
    let pipeline = Arc::new(RecordingPipeline::new());
    let spec = RunSpec::default().versions(2);

    let mut names = Vec::new();
    for _ in 0..4 {
        let outcome = ctx.run(&inventory, &pipeline, &spec);
        names.push(outcome.store.current().path().to_path_buf());
    }

    assert_eq!(ctx.generations(), names[2..].to_vec());
}

#[test]
fn test_retention_before_run() {
    let ctx = TestContext::new();
    let inventory = three_schemas();
    let pipeline = Arc::new(RecordingPipeline::new());
    let spec = RunSpec::default().versions(2).delete_before();

    let mut names = Vec::new();
    for _ in 0..4 {
        let outcome = ctx.run(&inventory, &pipeline, &spec);
        outcome.result.assert_ok();
        names.push(outcome.store.current().path().to_path_buf());
    }

    assert_eq!(ctx.generations(), names[2..].to_vec());
}

#[test]
fn test_compression_ratio_carries_to_next_run() {
    let ctx = TestContext::new();
    let inventory = three_schemas();
    let pipeline = Arc::new(RecordingPipeline::new());
    let spec = RunSpec::default().versions(2);

    let first = ctx.run(&inventory, &pipeline, &spec);
    first.result.assert_ok();

    let second = ctx.run(&inventory, &pipeline, &spec);
    second.result.assert_ok();

    let info = second.store.get_backup_info();
    assert_eq!(info.source_bytes, 1024 + 2048 + 4096);
    assert!(info.backup_bytes > 0);
    assert!(info.compression_ratio < 1.0);
}

#[test]
fn test_backup_time_is_recorded_before_dump_or_reuse() {
    let ctx = TestContext::new();
    let inventory = three_schemas();
    let pipeline = Arc::new(RecordingPipeline::new());
    let spec = RunSpec::default().versions(2).skip_unchanged().symbolic_links();

    ctx.run(&inventory, &pipeline, &spec).result.assert_ok();
    assert_eq!(pipeline.call_count(), 3);
    assert!(pipeline.dumps_without_timestamp().is_empty());

    pipeline.reset();
    inventory.touch("c");
    let outcome = ctx.run(&inventory, &pipeline, &spec);
    assert_eq!(outcome.result.assert_ok().reused, 2);
    assert_eq!(pipeline.calls(), vec!["c"]);
    assert!(pipeline.dumps_without_timestamp().is_empty());

    let current = outcome.store.current();
    for schema in ["a", "b"] {
        let recorded = fs::metadata(current.timestamp_path(schema))
            .unwrap()
            .modified()
            .unwrap();
        let linked = fs::symlink_metadata(current.artifact_path(schema))
            .unwrap()
            .modified()
            .unwrap();
        assert!(recorded <= linked, "backup time of '{}' written after reuse", schema);
    }
}
