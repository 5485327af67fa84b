//! Schema selection: include and exclude lists

use std::sync::Arc;
use test_utils::{RecordingPipeline, ResultAssertions, RunSpec, SchemaSelection, StaticInventory, TestContext};

fn inventory() -> Arc<StaticInventory> {
    Arc::new(
        StaticInventory::new()
            .with_schema("crm", 10)
            .with_schema("shop", 10)
            .with_schema("wiki", 10),
    )
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_include_list_limits_the_run() {
    let ctx = TestContext::new();
    let pipeline = Arc::new(RecordingPipeline::new());
    let spec = RunSpec::default().selection(SchemaSelection::Include(names(&["shop"])));

    let result = ctx.run(&inventory(), &pipeline, &spec).result.assert_ok();

    assert_eq!(pipeline.calls(), vec!["shop"]);
    assert_eq!(result.total, 3);
    assert_eq!(result.successful, 1);
    assert_eq!(result.skipped, 2);
    assert_eq!(result.failed, 0);
}

#[test]
fn test_exclude_list_skips_named_schemas() {
    let ctx = TestContext::new();
    let pipeline = Arc::new(RecordingPipeline::new());
    let spec = RunSpec::default().selection(SchemaSelection::Exclude(names(&["wiki"])));

    let result = ctx.run(&inventory(), &pipeline, &spec).result.assert_ok();

    let mut calls = pipeline.calls();
    calls.sort();
    assert_eq!(calls, vec!["crm", "shop"]);
    assert_eq!(result.skipped, 1);
    assert_eq!(result.successful, 2);
}

#[test]
fn test_unknown_names_are_ignored() {
    let ctx = TestContext::new();
    let pipeline = Arc::new(RecordingPipeline::new());
    let spec = RunSpec::default().selection(SchemaSelection::Include(names(&["shop", "ghost"])));

    let result = ctx.run(&inventory(), &pipeline, &spec).result.assert_ok();

    assert_eq!(pipeline.calls(), vec!["shop"]);
    assert_eq!(result.successful, 1);
    assert_eq!(result.failed, 0);
    assert_eq!(result.skipped, 2);
}

#[test]
fn test_empty_inventory_is_a_successful_run() {
    let ctx = TestContext::new();
    let pipeline = Arc::new(RecordingPipeline::new());

    let result = ctx
        .run(&Arc::new(StaticInventory::new()), &pipeline, &RunSpec::default())
        .result
        .assert_ok();

    assert_eq!(result.total, 0);
    assert!(result.is_success());
    assert_eq!(ctx.generations().len(), 1);
}
