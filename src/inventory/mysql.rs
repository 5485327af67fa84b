//! MySQL inventory read from the server's data directory

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::SchemaInventory;
use crate::utils::CommandExecutor;

/// Schemas that are never backed up
pub const SYSTEM_SCHEMAS: &[&str] = &["information_schema", "performance_schema", "sys"];

const QUERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Encode a schema name the way MySQL names its directory on disk
///
/// `my-shop` is stored as `my@002dshop`.
pub fn encode_database_name(name: &str) -> String {
    let mut encoded = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '-' | '.' | ' ' | '$' | '!' | '#' | '%' | '&' | '(' | ')' | '*' | '+' | ',' | '/'
            | ':' | ';' | '<' | '=' | '>' | '?' | '@' | '[' | '\\' | ']' | '^' | '{' | '|'
            | '}' | '~' => encoded.push_str(&format!("@{:04x}", c as u32)),
            _ => encoded.push(c),
        }
    }
    encoded
}

/// Size and newest modification time of a directory tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirUsage {
    pub bytes_used: u64,
    pub last_modified: SystemTime,
}

impl DirUsage {
    /// Walk `root`, counting regular files and the newest mtime of any entry
    pub fn scan(root: &Path) -> std::io::Result<Self> {
        let mut usage = DirUsage {
            bytes_used: 0,
            last_modified: SystemTime::UNIX_EPOCH,
        };

        for entry in WalkDir::new(root).follow_links(false) {
            let entry = entry.map_err(std::io::Error::from)?;
            let metadata = entry.metadata().map_err(std::io::Error::from)?;

            if metadata.is_file() {
                usage.bytes_used += metadata.len();
            }
            if let Ok(modified) = metadata.modified() {
                usage.last_modified = usage.last_modified.max(modified);
            }
        }

        Ok(usage)
    }
}

/// Inventory backed by the `mysql` client and the server's data directory
pub struct MysqlInventory {
    data_dir: PathBuf,
    schemas: Vec<String>,
}

impl MysqlInventory {
    /// Ask the server for its data directory and schema list
    pub fn connect(executor: Arc<dyn CommandExecutor>, mysql_bin: &str) -> Result<Self> {
        let data_dir = executor
            .run_command_stdout(mysql_bin, &["-N", "-e", "SELECT @@datadir"], Some(QUERY_TIMEOUT))
            .context("Failed to query MySQL data directory")?;
        let data_dir = PathBuf::from(data_dir.trim());

        let listing = executor
            .run_command_stdout(mysql_bin, &["-e", "show databases", "-N"], Some(QUERY_TIMEOUT))
            .context("Failed to list MySQL databases")?;
        let schemas = parse_schema_list(&listing);

        debug!("MySQL data directory: {:?}", data_dir);
        debug!("Found {} databases: {}", schemas.len(), schemas.join(", "));

        Ok(Self { data_dir, schemas })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn schema_dir(&self, schema: &str) -> PathBuf {
        self.data_dir.join(encode_database_name(schema))
    }

    /// Usage of a schema directory; `None` when it does not exist
    fn usage(&self, schema: &str) -> Result<Option<DirUsage>> {
        let dir = self.schema_dir(schema);
        match DirUsage::scan(&dir) {
            Ok(usage) => Ok(Some(usage)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("DB '{}': Data directory {:?} not found", schema, dir);
                Ok(None)
            }
            Err(e) => Err(e).with_context(|| format!("Failed to scan {:?}", dir)),
        }
    }
}

impl SchemaInventory for MysqlInventory {
    fn list_schemas(&self) -> Result<Vec<String>> {
        Ok(self.schemas.clone())
    }

    fn schema_bytes_used(&self, schema: &str) -> Result<u64> {
        Ok(self.usage(schema)?.map_or(0, |u| u.bytes_used))
    }

    fn schema_last_modified(&self, schema: &str) -> Result<DateTime<Local>> {
        // Unknown means changed
        Ok(self
            .usage(schema)?
            .map_or_else(Local::now, |u| DateTime::<Local>::from(u.last_modified)))
    }
}

fn parse_schema_list(listing: &str) -> Vec<String> {
    listing
        .lines()
        .map(str::trim)
        .filter(|name| !name.is_empty() && !SYSTEM_SCHEMAS.contains(name))
        .map(String::from)
        .collect()
}
