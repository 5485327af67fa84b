//! Test utilities for dump-manager
//!
//! This crate provides shared test utilities, fake collaborators,
//! and helper functions for testing the dump-manager application.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use test_utils::{RecordingPipeline, RunSpec, StaticInventory, TestContext};
//!
//! #[test]
//! fn my_test() {
//!     let ctx = TestContext::new();
//!     let inventory = Arc::new(StaticInventory::new().with_schema("shop", 1024));
//!     let pipeline = Arc::new(RecordingPipeline::new());
//!     let outcome = ctx.run(&inventory, &pipeline, &RunSpec::default().versions(3));
//!     // ... assertions
//! }
//! ```

pub mod config_builder;
pub mod fixtures;
pub mod test_context;

// Re-export commonly used items
pub use config_builder::ConfigBuilder;
pub use fixtures::*;
pub use test_context::{ResultAssertions, RunOutcome, RunSpec, TestContext};

// Re-export types from the main crate for convenience
pub use dump_manager::config::{Config, ConditionsConfig, MainConfig, SchemaSelection, ZabbixConfig};
pub use dump_manager::scheduler::{BackupResult, DumpScheduler, RunState, SchedulerOptions};
pub use dump_manager::store::{GenerationStore, LinkStrategy};

// Re-export mock implementations from the main crate
pub use dump_manager::utils::executor::mock::{MockExecutor, MockResponse};
pub use dump_manager::utils::executor::CommandExecutor;

/// Common test result type
pub type TestResult<T = ()> = anyhow::Result<T>;
