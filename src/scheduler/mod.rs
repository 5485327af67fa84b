//! Dump scheduler - admission control and bounded parallel fan-out
//!
//! One run walks `NotStarted -> Admitted -> Dispatching -> AwaitingCompletion
//! -> Finalized`, or goes straight to `Aborted` when the target volume cannot
//! hold the forecast backup size. Every selected schema becomes one task;
//! a task either links the previous artifact (unchanged schema) or runs the
//! dump pipeline. A failed task is logged and counted, its siblings carry on.

mod result;

pub use result::{BackupResult, DumpOutcome, RunState};

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::{MainConfig, SchemaSelection};
use crate::inventory::SchemaInventory;
use crate::pipeline::{DumpPipeline, PipelineError};
use crate::store::{GenerationStore, StoreError};
use crate::utils::format_bytes;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Not enough free space: {required} bytes required, {available} bytes available")]
    InsufficientSpace { required: u64, available: u64 },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Schema inventory failed: {0:#}")]
    Inventory(anyhow::Error),

    #[error("Failed to start worker pool: {0}")]
    Runtime(std::io::Error),
}

impl SchedulerError {
    /// The run was refused before any task started
    pub fn is_admission_failure(&self) -> bool {
        matches!(self, SchedulerError::InsufficientSpace { .. })
    }
}

/// Failure of a single schema task
#[derive(Debug, thiserror::Error)]
enum TaskError {
    #[error("{0:#}")]
    Inventory(anyhow::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Scheduler settings taken from `[main]`
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub selection: SchemaSelection,
    pub parallelism: usize,
    pub skip_unchanged: bool,
}

impl SchedulerOptions {
    pub fn from_config(main: &MainConfig) -> Self {
        Self {
            selection: main.selection(),
            parallelism: main.effective_parallelism(),
            skip_unchanged: main.skip_unchanged_dbs,
        }
    }
}

/// Split the inventory into the schemas to back up and the number left out
///
/// Names in the selection list that the inventory does not know are
/// reported and otherwise ignored.
pub fn select_schemas(inventory: &[String], selection: &SchemaSelection) -> (Vec<String>, usize) {
    let known: HashSet<&str> = inventory.iter().map(String::as_str).collect();

    let (listed, include) = match selection {
        SchemaSelection::Include(names) => (names, true),
        SchemaSelection::Exclude(names) => (names, false),
    };

    for name in listed {
        if !known.contains(name.as_str()) {
            if include {
                warn!("Database to be included '{}' does not exist.", name);
            } else {
                warn!("Database to be excluded '{}' does not exist.", name);
            }
        }
    }

    if !include && !listed.is_empty() {
        info!("Excluding databases {:?} from backup job.", listed);
    }
    if include {
        info!("Only backing up databases {:?}.", listed);
    }

    let selected: Vec<String> = inventory
        .iter()
        .filter(|schema| listed.contains(schema) == include)
        .cloned()
        .collect();
    let skipped = inventory.len() - selected.len();

    (selected, skipped)
}

/// Everything one schema task needs, owned so it can move onto a worker
struct SchemaTask {
    schema: String,
    store: Arc<GenerationStore>,
    inventory: Arc<dyn SchemaInventory>,
    pipeline: Arc<dyn DumpPipeline>,
    skip_unchanged: bool,
}

impl SchemaTask {
    fn run(self) -> DumpOutcome {
        match self.backup() {
            Ok(outcome) => outcome,
            Err(e) => DumpOutcome::Failed(e.to_string()),
        }
    }

    fn backup(&self) -> Result<DumpOutcome, TaskError> {
        let schema = self.schema.as_str();

        if self.skip_unchanged {
            let last_change = self
                .inventory
                .schema_last_modified(schema)
                .map_err(TaskError::Inventory)?;
            let previous_backup = self.store.get_database_backup_time(schema);
            debug!("DB '{}' last change: {}", schema, last_change);
            debug!("DB '{}' previous backup: {}", schema, previous_backup);

            if previous_backup > last_change {
                self.store.store_database_backup_time(schema)?;
                info!(
                    "DB '{}': Backup is newer than last database change. Reusing previous backup",
                    schema
                );
                match self.store.reuse_previous_backup(schema) {
                    Ok(_) => return Ok(DumpOutcome::Reused),
                    Err(StoreError::NoPreviousArtifact { .. }) => {
                        warn!("DB '{}': Previous backup file is missing, dumping again", schema);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        self.store.store_database_backup_time(schema)?;
        let artifact = self.store.current().artifact_path(schema);
        self.pipeline.dump(schema, &artifact)?;
        info!("Database dump completed successfully: {}", artifact.display());

        Ok(DumpOutcome::Dumped)
    }
}

/// Drives one run against a [`GenerationStore`]
pub struct DumpScheduler {
    inventory: Arc<dyn SchemaInventory>,
    pipeline: Arc<dyn DumpPipeline>,
    options: SchedulerOptions,
    state: RunState,
}

impl DumpScheduler {
    pub fn new(
        inventory: Arc<dyn SchemaInventory>,
        pipeline: Arc<dyn DumpPipeline>,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            inventory,
            pipeline,
            options,
            state: RunState::NotStarted,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Back up the selected schemas into the store's current generation.
    ///
    /// On success the generation is finalized: its metadata is written and
    /// `last` points at it. An admission failure leaves the generation empty.
    pub fn execute(&mut self, store: &GenerationStore) -> Result<BackupResult, SchedulerError> {
        let schemas = self
            .inventory
            .list_schemas()
            .map_err(SchedulerError::Inventory)?;
        info!("Skip unchanged databases: {}", self.options.skip_unchanged);

        let (selected, skipped) = select_schemas(&schemas, &self.options.selection);
        let source_bytes = selected
            .iter()
            .map(|schema| self.inventory.schema_bytes_used(schema))
            .sum::<anyhow::Result<u64>>()
            .map_err(SchedulerError::Inventory)?;

        self.admit(store, source_bytes)?;

        let parallelism = self.options.parallelism.max(1);
        info!(
            "Will start {} parallel mysqldump processes",
            parallelism
        );

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(parallelism)
            .thread_name("dump-worker")
            .enable_all()
            .build()
            .map_err(SchedulerError::Runtime)?;

        let shared = Arc::new(store.clone());
        let outcomes = runtime.block_on(self.dispatch(shared, selected.clone(), parallelism));
        drop(runtime);

        let mut result = BackupResult {
            total: schemas.len(),
            skipped,
            ..BackupResult::default()
        };
        for (schema, outcome) in &outcomes {
            match outcome {
                DumpOutcome::Dumped => {
                    info!("DB '{}': Backup successfully", schema);
                    result.successful += 1;
                }
                DumpOutcome::Reused => {
                    info!("DB '{}': Backup successfully", schema);
                    result.successful += 1;
                    result.reused += 1;
                }
                DumpOutcome::Failed(reason) => {
                    error!("DB '{}': Backup failed: {}", schema, reason);
                    store.discard_database_backup(schema)?;
                }
            }
        }
        // Tasks that never reported back count as failed too
        result.failed = selected.len() - result.successful;

        if result.failed == 0 {
            info!(
                "Successfully dumped {} of {}, failed {} databases",
                result.successful, result.total, result.failed
            );
        } else {
            error!(
                "Backing up all databases: Expected {}, got {}",
                selected.len(),
                result.successful
            );
        }

        store.store_backup_info(source_bytes)?;
        store.link_to_last_dir()?;
        self.state = RunState::Finalized;

        Ok(result)
    }

    fn admit(&mut self, store: &GenerationStore, source_bytes: u64) -> Result<(), SchedulerError> {
        let required = store.get_backup_info().required_bytes(source_bytes);
        let available = store.current().bytes_free();

        info!(
            "Backup will require {}. Having {} free.",
            format_bytes(required),
            format_bytes(available)
        );

        if required > available {
            error!("Not enough free space in target directory.");
            self.state = RunState::Aborted;
            return Err(SchedulerError::InsufficientSpace {
                required,
                available,
            });
        }

        self.state = RunState::Admitted;
        Ok(())
    }

    async fn dispatch(
        &mut self,
        store: Arc<GenerationStore>,
        schemas: Vec<String>,
        parallelism: usize,
    ) -> Vec<(String, DumpOutcome)> {
        self.state = RunState::Dispatching;

        let semaphore = Arc::new(Semaphore::new(parallelism));
        let mut tasks = JoinSet::new();

        for schema in schemas {
            let semaphore = Arc::clone(&semaphore);
            let task = SchemaTask {
                schema: schema.clone(),
                store: Arc::clone(&store),
                inventory: Arc::clone(&self.inventory),
                pipeline: Arc::clone(&self.pipeline),
                skip_unchanged: self.options.skip_unchanged,
            };

            tasks.spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => tokio::task::spawn_blocking(move || task.run())
                        .await
                        .unwrap_or_else(|e| DumpOutcome::Failed(format!("Task panicked: {}", e))),
                    Err(e) => DumpOutcome::Failed(format!("Worker pool closed: {}", e)),
                };
                (schema, outcome)
            });
        }

        self.state = RunState::AwaitingCompletion;

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(done) => outcomes.push(done),
                Err(e) => error!("Dump task panicked: {}", e),
            }
        }
        outcomes
    }
}
