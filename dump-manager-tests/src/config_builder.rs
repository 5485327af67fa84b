//! Fluent API for building test configurations
//!
//! Provides a builder pattern for creating test configurations with sensible defaults.

use dump_manager::config::{ConditionsConfig, Config, MainConfig, ZabbixConfig};
use dump_manager::store::LinkStrategy;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Builder for creating test configurations
pub struct ConfigBuilder {
    temp_dir: TempDir,
    main: MainConfig,
    zabbix: ZabbixConfig,
    conditions: ConditionsConfig,
}

impl ConfigBuilder {
    /// Create a new ConfigBuilder with an existing, empty backup directory
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let backup_dir = temp_dir.path().join("backups");
        fs::create_dir_all(&backup_dir).expect("Failed to create backup dir");

        let main = MainConfig {
            backup_dir,
            parallelism: Some(2),
            versions: 1,
            delete_before: false,
            mysqldump_bin: "mysqldump".to_string(),
            mysql_bin: "mysql".to_string(),
            mysqldump_options: vec![],
            exclude_databases: vec![],
            include_databases: vec![],
            log_level: "info".to_string(),
            skip_unchanged_dbs: false,
            link_strategy: LinkStrategy::Hard,
        };

        Self {
            temp_dir,
            main,
            zabbix: ZabbixConfig::default(),
            conditions: ConditionsConfig::default(),
        }
    }

    /// Set the backup root
    pub fn with_backup_dir(mut self, path: &Path) -> Self {
        self.main.backup_dir = path.to_path_buf();
        self
    }

    pub fn with_versions(mut self, versions: usize) -> Self {
        self.main.versions = versions;
        self
    }

    pub fn with_parallelism(mut self, parallelism: Option<usize>) -> Self {
        self.main.parallelism = parallelism;
        self
    }

    pub fn delete_before(mut self, enabled: bool) -> Self {
        self.main.delete_before = enabled;
        self
    }

    pub fn skip_unchanged(mut self, enabled: bool) -> Self {
        self.main.skip_unchanged_dbs = enabled;
        self
    }

    pub fn with_link_strategy(mut self, strategy: LinkStrategy) -> Self {
        self.main.link_strategy = strategy;
        self
    }

    pub fn with_mysqldump_bin(mut self, bin: &Path) -> Self {
        self.main.mysqldump_bin = bin.display().to_string();
        self
    }

    pub fn with_mysql_bin(mut self, bin: &Path) -> Self {
        self.main.mysql_bin = bin.display().to_string();
        self
    }

    pub fn exclude(mut self, schemas: &[&str]) -> Self {
        self.main.exclude_databases = schemas.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn include(mut self, schemas: &[&str]) -> Self {
        self.main.include_databases = schemas.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_zabbix(mut self, config: ZabbixConfig) -> Self {
        self.zabbix = config;
        self
    }

    pub fn with_conditions(mut self, config: ConditionsConfig) -> Self {
        self.conditions = config;
        self
    }

    /// Get the temp directory path
    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Get the backup root
    pub fn backup_dir(&self) -> &Path {
        &self.main.backup_dir
    }

    /// Build the Config
    pub fn build(self) -> Config {
        self.persist().0
    }

    /// Keep the temp directory (don't delete on drop)
    pub fn persist(self) -> (Config, TempDir) {
        let config = Config {
            main: self.main,
            zabbix: self.zabbix,
            conditions: self.conditions,
        };
        (config, self.temp_dir)
    }

    /// Write the config as TOML next to the backup root
    pub fn write(self) -> (PathBuf, TempDir) {
        let (config, temp_dir) = self.persist();
        let path = temp_dir.path().join("dump-manager.toml");
        let toml_str = toml::to_string_pretty(&config).expect("Failed to serialize config");
        fs::write(&path, toml_str).expect("Failed to write config");
        (path, temp_dir)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
