//! Test fixtures and fake collaborators
//!
//! Stand-ins for the database server: an in-memory schema inventory, a
//! pipeline that records what it was asked to dump, and shell scripts that
//! behave like `mysqldump` / `mysql` for binary-level tests.

use anyhow::{bail, Result};
use chrono::{DateTime, Duration, Local};
use dump_manager::inventory::SchemaInventory;
use dump_manager::pipeline::{DumpPipeline, PipelineError};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

/// Final line mysqldump prints after a complete dump
pub const COMPLETION_LINE: &str = "-- Dump completed on 2026-10-18  2:00:13";

#[derive(Debug, Clone, Copy)]
struct SchemaStats {
    bytes_used: u64,
    last_modified: DateTime<Local>,
}

/// In-memory inventory; schemas start out unchanged for an hour
#[derive(Default)]
pub struct StaticInventory {
    schemas: Mutex<BTreeMap<String, SchemaStats>>,
}

impl StaticInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a schema last modified an hour ago
    pub fn with_schema(self, name: &str, bytes_used: u64) -> Self {
        self.schemas.lock().insert(
            name.to_string(),
            SchemaStats {
                bytes_used,
                last_modified: Local::now() - Duration::hours(1),
            },
        );
        self
    }

    /// Mark a schema as modified right now
    pub fn touch(&self, name: &str) {
        if let Some(stats) = self.schemas.lock().get_mut(name) {
            stats.last_modified = Local::now();
        }
    }

    pub fn set_bytes_used(&self, name: &str, bytes_used: u64) {
        if let Some(stats) = self.schemas.lock().get_mut(name) {
            stats.bytes_used = bytes_used;
        }
    }

    fn stats(&self, name: &str) -> Result<SchemaStats> {
        match self.schemas.lock().get(name) {
            Some(stats) => Ok(*stats),
            None => bail!("Unknown schema '{}'", name),
        }
    }
}

impl SchemaInventory for StaticInventory {
    fn list_schemas(&self) -> Result<Vec<String>> {
        Ok(self.schemas.lock().keys().cloned().collect())
    }

    fn schema_bytes_used(&self, schema: &str) -> Result<u64> {
        Ok(self.stats(schema)?.bytes_used)
    }

    fn schema_last_modified(&self, schema: &str) -> Result<DateTime<Local>> {
        Ok(self.stats(schema)?.last_modified)
    }
}

/// Pipeline that writes a small fake artifact and records every call
#[derive(Default)]
pub struct RecordingPipeline {
    calls: Mutex<Vec<String>>,
    untimed: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
    delay: Option<std::time::Duration>,
}

impl RecordingPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every dump for `delay`, so concurrent tasks overlap
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make dumps of `schema` fail like a non-zero mysqldump exit
    pub fn fail_on(self, schema: &str) -> Self {
        self.failing.lock().insert(schema.to_string());
        self
    }

    /// Schemas dumped so far, in completion order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Schemas whose backup time was not yet recorded when the dump started
    pub fn dumps_without_timestamp(&self) -> Vec<String> {
        self.untimed.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Highest number of dumps that ran at the same time
    pub fn max_concurrency(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.calls.lock().clear();
        self.untimed.lock().clear();
    }
}

impl DumpPipeline for RecordingPipeline {
    fn dump(&self, schema: &str, artifact: &Path) -> Result<(), PipelineError> {
        if !artifact.with_file_name(format!("{}.timestamp", schema)).exists() {
            self.untimed.lock().push(schema.to_string());
        }

        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }

        let failing = self.failing.lock().contains(schema);
        let content = if failing {
            format!("-- dump of {}\nINSERT INTO t VALUES", schema)
        } else {
            format!("-- dump of {}\n{}\n", schema, COMPLETION_LINE)
        };
        let written = fs::write(artifact, content).map_err(|source| PipelineError::Io {
            context: "Failed to write fake artifact",
            source,
        });

        self.running.fetch_sub(1, Ordering::SeqCst);
        self.calls.lock().push(schema.to_string());
        written?;

        if failing {
            return Err(PipelineError::ExitStatus {
                code: Some(2),
                stderr: format!("mysqldump: Got error: 1049: Unknown database '{}'", schema),
            });
        }
        Ok(())
    }
}

/// How a fake `mysqldump` script behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeDump {
    /// Prints a small dump ending in the completion line
    Complete,
    /// Prints to stderr and exits with the given code
    Fails(i32),
    /// Exits 0 but stops mid-statement
    Truncated,
}

fn write_script(path: &Path, body: &str) -> PathBuf {
    fs::write(path, format!("#!/bin/sh\n{}\n", body)).expect("Failed to write script");
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .expect("Failed to make script executable");
    path.to_path_buf()
}

/// Write an executable `mysqldump` stand-in into `dir`
pub fn fake_mysqldump(dir: &Path, behaviour: FakeDump) -> PathBuf {
    let body = match behaviour {
        FakeDump::Complete => format!(
            "echo \"-- MySQL dump of $1\"\necho 'CREATE TABLE t (id int);'\necho '{}'",
            COMPLETION_LINE
        ),
        FakeDump::Fails(code) => format!("echo \"mysqldump: Got error on $1\" >&2\nexit {}", code),
        FakeDump::Truncated => "echo \"-- MySQL dump of $1\"\necho 'INSERT INTO t VALUES'".to_string(),
    };
    write_script(&dir.join("mysqldump"), &body)
}

/// Write an executable `mysql` stand-in answering the inventory queries.
///
/// `SELECT @@datadir` prints `data_dir`; `show databases` prints `schemas`
/// plus the schemas the inventory filters out.
pub fn fake_mysql(dir: &Path, data_dir: &Path, schemas: &[&str]) -> PathBuf {
    let listing: String = ["information_schema", "performance_schema", "sys"]
        .iter()
        .chain(schemas.iter())
        .map(|s| format!("echo '{}'\n", s))
        .collect();
    let body = format!(
        "case \"$*\" in\n  *datadir*) echo '{}/' ;;\n  *)\n{}  ;;\nesac",
        data_dir.display(),
        listing
    );
    write_script(&dir.join("mysql"), &body)
}

/// Create a fake MySQL data directory with one table file per schema
pub fn fake_data_dir(dir: &Path, schemas: &[(&str, usize)]) -> PathBuf {
    let data_dir = dir.join("mysql-data");
    for (schema, bytes) in schemas {
        let schema_dir = data_dir.join(dump_manager::inventory::encode_database_name(schema));
        fs::create_dir_all(&schema_dir).expect("Failed to create schema dir");
        fs::write(schema_dir.join("t.ibd"), vec![0u8; *bytes]).expect("Failed to write table file");
    }
    data_dir
}

/// Minimal valid config TOML template
pub fn minimal_config_toml() -> &'static str {
    r#"
[main]
backup_dir = "{backup_dir}"
"#
}

/// Config using every table
pub fn full_config_toml() -> &'static str {
    r#"
[main]
backup_dir = "{backup_dir}"
parallelism = 4
versions = 7
delete_before = true
mysqldump_bin = "/usr/bin/mysqldump"
mysql_bin = "/usr/bin/mysql"
mysqldump_options = ["--single-transaction", "--routines"]
exclude_databases = ["mysql"]
log_level = "debug"
skip_unchanged_dbs = true
link_strategy = "symbolic"

[zabbix]
item_key = "mysql.backup.report"
sender_bin = "/usr/bin/zabbix_sender"
agent_conf = "/etc/zabbix/zabbix_agent2.conf"

[conditions]
skip = ["test -f /run/maintenance"]
run = ["systemctl is-active mysql"]
terminate = ["rsync -a $DUMP_MANAGER_CURRENT_DIR backup-host:/srv/"]
timeout_seconds = 30
"#
}

/// Fill `{backup_dir}` in a template
pub fn render_config(template: &str, backup_dir: &Path) -> String {
    template.replace("{backup_dir}", &backup_dir.display().to_string())
}
