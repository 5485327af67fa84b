//! Unit tests for configuration loading and validation

use dump_manager::config::{load_config, ConfigError, SchemaSelection};
use rstest::rstest;
use std::fs;
use test_utils::{full_config_toml, minimal_config_toml, render_config, ConfigBuilder, LinkStrategy};

fn write_config(dir: &std::path::Path, content: &str) -> std::path::PathBuf {
    let path = dir.join("dump-manager.toml");
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_minimal_config_uses_defaults() {
    let builder = ConfigBuilder::new();
    let path = write_config(
        builder.temp_dir(),
        &render_config(minimal_config_toml(), builder.backup_dir()),
    );

    let config = load_config(&path).unwrap();
    assert_eq!(config.main.versions, 1);
    assert!(!config.main.delete_before);
    assert_eq!(config.main.mysqldump_bin, "mysqldump");
    assert_eq!(config.main.link_strategy, LinkStrategy::Hard);
    assert_eq!(config.main.selection(), SchemaSelection::Exclude(vec![]));
    assert!(config.zabbix.item_key.is_empty());
    assert!(config.conditions.skip.is_empty());
}

#[test]
fn test_full_config() {
    let builder = ConfigBuilder::new();
    let path = write_config(
        builder.temp_dir(),
        &render_config(full_config_toml(), builder.backup_dir()),
    );

    let config = load_config(&path).unwrap();
    assert_eq!(config.main.parallelism, Some(4));
    assert_eq!(config.main.effective_parallelism(), 4);
    assert_eq!(config.main.versions, 7);
    assert!(config.main.delete_before);
    assert!(config.main.skip_unchanged_dbs);
    assert_eq!(config.main.link_strategy, LinkStrategy::Symbolic);
    assert_eq!(
        config.main.mysqldump_options,
        vec!["--single-transaction", "--routines"]
    );
    assert_eq!(
        config.main.selection(),
        SchemaSelection::Exclude(vec!["mysql".to_string()])
    );
    assert_eq!(config.zabbix.item_key, "mysql.backup.report");
    assert_eq!(config.conditions.run, vec!["systemctl is-active mysql"]);
    assert_eq!(config.conditions.timeout_seconds, 30);
}

#[test]
fn test_include_list_becomes_selection() {
    let (path, _temp_dir) = ConfigBuilder::new().include(&["shop", "crm"]).write();

    let config = load_config(&path).unwrap();
    assert_eq!(
        config.main.selection(),
        SchemaSelection::Include(vec!["shop".to_string(), "crm".to_string()])
    );
}

#[test]
fn test_invalid_toml_is_parse_error() {
    let builder = ConfigBuilder::new();
    let path = write_config(builder.temp_dir(), "[main\nbackup_dir = ");

    assert!(matches!(load_config(&path), Err(ConfigError::ParseError(_))));
}

#[test]
fn test_missing_file_is_read_error() {
    let builder = ConfigBuilder::new();
    let path = builder.temp_dir().join("missing.toml");

    assert!(matches!(load_config(&path), Err(ConfigError::ReadError(_))));
}

#[test]
fn test_missing_backup_dir_rejected() {
    let builder = ConfigBuilder::new();
    let missing = builder.temp_dir().join("does-not-exist");
    let (path, _temp_dir) = builder.with_backup_dir(&missing).write();

    let err = load_config(&path).unwrap_err();
    assert!(err.to_string().contains("Backup directory does not exist"));
}

#[test]
fn test_include_and_exclude_are_exclusive() {
    let (path, _temp_dir) = ConfigBuilder::new()
        .include(&["shop"])
        .exclude(&["mysql"])
        .write();

    let err = load_config(&path).unwrap_err();
    assert!(matches!(err, ConfigError::ValidationError(_)));
    assert!(err.to_string().contains("Mutually exclusive"));
}

#[rstest]
#[case::zero_versions(0, Some(2))]
#[case::zero_parallelism(3, Some(0))]
fn test_zero_values_rejected(#[case] versions: usize, #[case] parallelism: Option<usize>) {
    let (path, _temp_dir) = ConfigBuilder::new()
        .with_versions(versions)
        .with_parallelism(parallelism)
        .write();

    assert!(matches!(
        load_config(&path),
        Err(ConfigError::ValidationError(_))
    ));
}

#[test]
fn test_unset_parallelism_falls_back_to_cores() {
    let (path, _temp_dir) = ConfigBuilder::new().with_parallelism(None).write();

    let config = load_config(&path).unwrap();
    assert_eq!(config.main.parallelism, None);
    assert!(config.main.effective_parallelism() >= 1);
}
