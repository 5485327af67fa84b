//! Test context and harness for scenario testing
//!
//! Provides a backup root in a temporary directory and drives complete runs
//! (prune, schedule, finalize) against it, the same way the binary does.

use crate::fixtures::{RecordingPipeline, StaticInventory};
use anyhow::Result;
use dump_manager::config::SchemaSelection;
use dump_manager::scheduler::{BackupResult, DumpScheduler, RunState, SchedulerError, SchedulerOptions};
use dump_manager::store::{list_generations, GenerationStore, LinkStrategy};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Settings of one simulated run
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub versions: usize,
    pub delete_before: bool,
    pub link_strategy: LinkStrategy,
    pub options: SchedulerOptions,
}

impl Default for RunSpec {
    fn default() -> Self {
        Self {
            versions: 1,
            delete_before: false,
            link_strategy: LinkStrategy::Hard,
            options: SchedulerOptions {
                selection: SchemaSelection::default(),
                parallelism: 2,
                skip_unchanged: false,
            },
        }
    }
}

impl RunSpec {
    pub fn versions(mut self, versions: usize) -> Self {
        self.versions = versions;
        self
    }

    pub fn parallelism(mut self, parallelism: usize) -> Self {
        self.options.parallelism = parallelism;
        self
    }

    pub fn skip_unchanged(mut self) -> Self {
        self.options.skip_unchanged = true;
        self
    }

    pub fn delete_before(mut self) -> Self {
        self.delete_before = true;
        self
    }

    pub fn symbolic_links(mut self) -> Self {
        self.link_strategy = LinkStrategy::Symbolic;
        self
    }

    pub fn selection(mut self, selection: SchemaSelection) -> Self {
        self.options.selection = selection;
        self
    }
}

/// Outcome of one simulated run
pub struct RunOutcome {
    pub result: std::result::Result<BackupResult, SchedulerError>,
    pub state: RunState,
    pub store: GenerationStore,
}

/// Test context that manages a backup root and provides common utilities
pub struct TestContext {
    /// Temporary directory for test files
    temp_dir: TempDir,
    backup_dir: PathBuf,
}

impl TestContext {
    /// Create a new test context with an empty backup root
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let backup_dir = temp_dir.path().join("backups");
        std::fs::create_dir_all(&backup_dir).expect("Failed to create backup dir");

        Self {
            temp_dir,
            backup_dir,
        }
    }

    /// Get the temporary directory path
    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Generation directories on disk, oldest first
    pub fn generations(&self) -> Vec<PathBuf> {
        list_generations(&self.backup_dir).expect("Failed to list generations")
    }

    /// Run once: prune (before or after), schedule, finalize
    pub fn run(
        &self,
        inventory: &Arc<StaticInventory>,
        pipeline: &Arc<RecordingPipeline>,
        spec: &RunSpec,
    ) -> RunOutcome {
        let mut store =
            GenerationStore::open(&self.backup_dir, spec.link_strategy).expect("Failed to open store");

        if spec.delete_before {
            store
                .cleanup_before(spec.versions)
                .expect("Failed to prune before run");
        }

        let mut scheduler = DumpScheduler::new(
            Arc::clone(inventory) as Arc<dyn dump_manager::inventory::SchemaInventory>,
            Arc::clone(pipeline) as Arc<dyn dump_manager::pipeline::DumpPipeline>,
            spec.options.clone(),
        );
        let result = scheduler.execute(&store);

        if result.is_ok() && !spec.delete_before {
            store
                .cleanup_after(spec.versions)
                .expect("Failed to prune after run");
        }

        RunOutcome {
            result,
            state: scheduler.state(),
            store,
        }
    }

    /// Read a file from the temp directory
    pub fn read_file(&self, name: &str) -> Result<String> {
        let path = self.temp_dir.path().join(name);
        Ok(std::fs::read_to_string(path)?)
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Extension trait for assertion helpers
pub trait ResultAssertions<T> {
    /// Assert that the result is Ok and return the value
    fn assert_ok(self) -> T;

    /// Assert that the result is Ok with a custom message
    fn assert_ok_msg(self, msg: &str) -> T;

    /// Assert that the result is Err
    fn assert_err(self);

    /// Assert that the result is Err and the error message contains the given string
    fn assert_err_contains(self, needle: &str);
}

impl<T: std::fmt::Debug, E: std::fmt::Debug> ResultAssertions<T> for std::result::Result<T, E> {
    fn assert_ok(self) -> T {
        match self {
            Ok(v) => v,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    }

    fn assert_ok_msg(self, msg: &str) -> T {
        match self {
            Ok(v) => v,
            Err(e) => panic!("{}: {:?}", msg, e),
        }
    }

    fn assert_err(self) {
        if let Ok(v) = self {
            panic!("Expected Err, got Ok: {:?}", v);
        }
    }

    fn assert_err_contains(self, needle: &str) {
        match self {
            Ok(v) => panic!("Expected Err containing '{}', got Ok: {:?}", needle, v),
            Err(e) => {
                let err_msg = format!("{:?}", e);
                assert!(
                    err_msg.contains(needle),
                    "Error '{}' does not contain '{}'",
                    err_msg,
                    needle
                );
            }
        }
    }
}
