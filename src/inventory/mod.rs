//! Schema inventory - what the database server has and how it changed

mod mysql;

pub use mysql::{encode_database_name, DirUsage, MysqlInventory, SYSTEM_SCHEMAS};

use anyhow::Result;
use chrono::{DateTime, Local};

/// Source of schema names, sizes and last-change times
pub trait SchemaInventory: Send + Sync {
    /// All user schemas, system schemas excluded
    fn list_schemas(&self) -> Result<Vec<String>>;

    /// On-disk size of a schema in bytes
    fn schema_bytes_used(&self, schema: &str) -> Result<u64>;

    /// When the schema's files were last modified
    fn schema_last_modified(&self, schema: &str) -> Result<DateTime<Local>>;
}
