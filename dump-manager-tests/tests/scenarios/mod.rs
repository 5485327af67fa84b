//! Scenario tests for dump-manager
//!
//! Each test drives complete runs (prune, schedule, finalize) against a
//! temporary backup root using fake inventories and pipelines. The
//! `end_to_end` module uses shell-script stand-ins for `mysql` and
//! `mysqldump` instead.

mod concurrency;
mod end_to_end;
mod failures;
mod rotation;
mod selection;
