//! Worker-pool bounds

use rstest::rstest;
use std::sync::Arc;
use std::time::Duration;
use test_utils::{RecordingPipeline, ResultAssertions, RunSpec, StaticInventory, TestContext};

fn many_schemas(count: usize) -> Arc<StaticInventory> {
    let inventory = (0..count).fold(StaticInventory::new(), |inv, i| {
        inv.with_schema(&format!("db{:02}", i), 10)
    });
    Arc::new(inventory)
}

#[rstest]
#[case::serial(1)]
#[case::pair(2)]
#[case::wide(4)]
fn test_parallelism_is_never_exceeded(#[case] parallelism: usize) {
    let ctx = TestContext::new();
    let pipeline = Arc::new(RecordingPipeline::new().with_delay(Duration::from_millis(50)));
    let spec = RunSpec::default().parallelism(parallelism);

    let result = ctx.run(&many_schemas(8), &pipeline, &spec).result.assert_ok();

    assert_eq!(result.successful, 8);
    assert_eq!(pipeline.call_count(), 8);
    assert!(pipeline.max_concurrency() <= parallelism);
    assert!(pipeline.max_concurrency() >= 1);
}

#[test]
fn test_parallel_workers_overlap() {
    let ctx = TestContext::new();
    let pipeline = Arc::new(RecordingPipeline::new().with_delay(Duration::from_millis(200)));

    ctx.run(&many_schemas(4), &pipeline, &RunSpec::default().parallelism(4))
        .result
        .assert_ok();

    assert!(pipeline.max_concurrency() > 1);
}
