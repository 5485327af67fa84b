use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::store::LinkStrategy;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub main: MainConfig,
    #[serde(default)]
    pub zabbix: ZabbixConfig,
    #[serde(default)]
    pub conditions: ConditionsConfig,
}

/// Settings for the dump run itself
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MainConfig {
    /// Root directory holding all generations
    pub backup_dir: PathBuf,

    /// Worker-pool size (defaults to the physical core count)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallelism: Option<usize>,

    /// Number of generations to keep
    #[serde(default = "default_versions")]
    pub versions: usize,

    /// Prune old generations before the dump instead of after it
    #[serde(default)]
    pub delete_before: bool,

    /// Binaries
    #[serde(default = "default_mysqldump_bin")]
    pub mysqldump_bin: String,
    #[serde(default = "default_mysql_bin")]
    pub mysql_bin: String,

    /// Extra arguments passed to every mysqldump invocation
    #[serde(default)]
    pub mysqldump_options: Vec<String>,

    /// Schema selection (mutually exclusive)
    #[serde(default)]
    pub exclude_databases: Vec<String>,
    #[serde(default)]
    pub include_databases: Vec<String>,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Reuse the previous artifact when a schema did not change
    #[serde(default)]
    pub skip_unchanged_dbs: bool,

    #[serde(default)]
    pub link_strategy: LinkStrategy,
}

impl MainConfig {
    /// Configured parallelism, or the number of physical cores
    pub fn effective_parallelism(&self) -> usize {
        self.parallelism.unwrap_or_else(num_cpus::get_physical)
    }

    pub fn selection(&self) -> SchemaSelection {
        if !self.include_databases.is_empty() {
            SchemaSelection::Include(self.include_databases.clone())
        } else {
            SchemaSelection::Exclude(self.exclude_databases.clone())
        }
    }
}

/// Which schemas a run covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaSelection {
    /// Back up exactly these schemas
    Include(Vec<String>),
    /// Back up everything except these schemas
    Exclude(Vec<String>),
}

impl Default for SchemaSelection {
    fn default() -> Self {
        SchemaSelection::Exclude(Vec::new())
    }
}

/// Zabbix sender settings; an empty item key disables sending
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ZabbixConfig {
    #[serde(default)]
    pub item_key: String,
    #[serde(default = "default_sender_bin")]
    pub sender_bin: String,
    #[serde(default = "default_agent_conf")]
    pub agent_conf: PathBuf,
}

impl Default for ZabbixConfig {
    fn default() -> Self {
        Self {
            item_key: String::new(),
            sender_bin: default_sender_bin(),
            agent_conf: default_agent_conf(),
        }
    }
}

/// Shell commands deciding whether a run happens at all
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConditionsConfig {
    /// Any of these exiting 0 skips the run (successfully)
    #[serde(default)]
    pub skip: Vec<String>,

    /// All of these must exit 0 for the run to start
    #[serde(default)]
    pub run: Vec<String>,

    /// Executed after the run with DUMP_MANAGER_CURRENT_DIR set
    #[serde(default)]
    pub terminate: Vec<String>,

    #[serde(default = "default_condition_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ConditionsConfig {
    fn default() -> Self {
        Self {
            skip: Vec::new(),
            run: Vec::new(),
            terminate: Vec::new(),
            timeout_seconds: default_condition_timeout(),
        }
    }
}

// Default value functions

fn default_versions() -> usize { 1 }
fn default_mysqldump_bin() -> String { "mysqldump".to_string() }
fn default_mysql_bin() -> String { "mysql".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_sender_bin() -> String { "zabbix_sender".to_string() }
fn default_agent_conf() -> PathBuf { PathBuf::from("/etc/zabbix/zabbix_agentd.conf") }
fn default_condition_timeout() -> u64 { 60 }
