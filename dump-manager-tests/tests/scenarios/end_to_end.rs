//! Full runs with the real inventory and pipeline against fake MySQL tools

use dump_manager::inventory::{MysqlInventory, SchemaInventory};
use dump_manager::pipeline::{DumpPipeline, MysqldumpPipeline};
use dump_manager::scheduler::{DumpScheduler, SchedulerOptions};
use dump_manager::store::{GenerationStore, LinkStrategy, LAST_LINK};
use dump_manager::utils::{CommandExecutor, RealExecutor};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use test_utils::{
    fake_data_dir, fake_mysql, fake_mysqldump, FakeDump, SchemaSelection, TestContext,
    COMPLETION_LINE,
};

struct Tools {
    inventory: Arc<dyn SchemaInventory>,
    pipeline: Arc<dyn DumpPipeline>,
}

fn tools(ctx: &TestContext, behaviour: FakeDump) -> Tools {
    let bin_dir = ctx.temp_dir().join("bin");
    std::fs::create_dir_all(&bin_dir).unwrap();

    let data_dir = fake_data_dir(ctx.temp_dir(), &[("shop", 4096), ("crm-eu", 2048)]);
    let mysql = fake_mysql(&bin_dir, &data_dir, &["shop", "crm-eu"]);
    let mysqldump = fake_mysqldump(&bin_dir, behaviour);

    let executor: Arc<dyn CommandExecutor> = Arc::new(RealExecutor::new());
    let inventory = MysqlInventory::connect(executor, &mysql.display().to_string()).unwrap();
    let pipeline = MysqldumpPipeline::new(mysqldump.display().to_string(), vec![]);

    Tools {
        inventory: Arc::new(inventory),
        pipeline: Arc::new(pipeline),
    }
}

fn options(skip_unchanged: bool) -> SchedulerOptions {
    SchedulerOptions {
        selection: SchemaSelection::default(),
        parallelism: 2,
        skip_unchanged,
    }
}

fn read_artifact(path: &Path) -> String {
    let mut content = String::new();
    GzDecoder::new(File::open(path).unwrap())
        .read_to_string(&mut content)
        .unwrap();
    content
}

#[test]
fn test_inventory_reads_fake_server() {
    let ctx = TestContext::new();
    let tools = tools(&ctx, FakeDump::Complete);

    assert_eq!(tools.inventory.list_schemas().unwrap(), vec!["shop", "crm-eu"]);
    assert_eq!(tools.inventory.schema_bytes_used("shop").unwrap(), 4096);
    assert_eq!(tools.inventory.schema_bytes_used("crm-eu").unwrap(), 2048);
}

#[test]
fn test_complete_run_produces_verified_artifacts() {
    let ctx = TestContext::new();
    let tools = tools(&ctx, FakeDump::Complete);
    let store = GenerationStore::open(ctx.backup_dir(), LinkStrategy::Hard).unwrap();

    let mut scheduler = DumpScheduler::new(tools.inventory, tools.pipeline, options(false));
    let result = scheduler.execute(&store).unwrap();

    assert_eq!(result.total, 2);
    assert_eq!(result.successful, 2);
    for schema in ["shop", "crm-eu"] {
        let content = read_artifact(&store.current().artifact_path(schema));
        assert!(content.contains(&format!("-- MySQL dump of {}", schema)));
        assert!(content.trim_end().ends_with(COMPLETION_LINE));
    }
    assert!(store.current().metadata_path().is_file());
    assert!(ctx.backup_dir().join(LAST_LINK).exists());
}

#[test]
fn test_truncated_dumps_are_counted_as_failed() {
    let ctx = TestContext::new();
    let tools = tools(&ctx, FakeDump::Truncated);
    let store = GenerationStore::open(ctx.backup_dir(), LinkStrategy::Hard).unwrap();

    let mut scheduler = DumpScheduler::new(tools.inventory, tools.pipeline, options(false));
    let result = scheduler.execute(&store).unwrap();

    assert_eq!(result.successful, 0);
    assert_eq!(result.failed, 2);
    assert!(!result.is_success());
    assert!(!store.current().artifact_path("shop").exists());
    assert!(!store.current().timestamp_path("shop").exists());
}

#[test]
fn test_second_run_reuses_untouched_data_dir() {
    let ctx = TestContext::new();
    let tools = tools(&ctx, FakeDump::Complete);
    // Data files must be strictly older than the first backup timestamps
    thread::sleep(Duration::from_millis(20));

    let first = GenerationStore::open(ctx.backup_dir(), LinkStrategy::Hard).unwrap();
    let mut scheduler = DumpScheduler::new(
        Arc::clone(&tools.inventory),
        Arc::clone(&tools.pipeline),
        options(true),
    );
    assert_eq!(scheduler.execute(&first).unwrap().reused, 0);

    let second = GenerationStore::open(ctx.backup_dir(), LinkStrategy::Hard).unwrap();
    let mut scheduler = DumpScheduler::new(tools.inventory, tools.pipeline, options(true));
    let result = scheduler.execute(&second).unwrap();

    assert_eq!(result.successful, 2);
    assert_eq!(result.reused, 2);
}
