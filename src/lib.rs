//! Dump Manager Library
//!
//! Space-aware, versioned mysqldump backups: every run writes one generation
//! directory, unchanged schemas are linked from the previous generation, and
//! only a bounded number of generations is kept.

pub mod config;
pub mod inventory;
pub mod managers;
pub mod pipeline;
pub mod scheduler;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use config::{load_config, Config, ConfigError};
pub use inventory::{MysqlInventory, SchemaInventory};
pub use managers::logging::{init_console_logging, init_logging, LoggingConfig};
pub use pipeline::{DumpPipeline, MysqldumpPipeline, PipelineError};
pub use scheduler::{BackupResult, DumpOutcome, DumpScheduler, RunState, SchedulerError, SchedulerOptions};
pub use store::{GenerationStore, LinkStrategy, StoreError};
