use super::types::*;
use std::fs;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Load and validate configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let contents = fs::read_to_string(path)?;
    let mut config: Config = toml::from_str(&contents)?;
    config.main.backup_dir = super::expand_tilde(&config.main.backup_dir);
    validate_config(&config)?;
    Ok(config)
}

/// Validate the configuration
pub fn validate_config(config: &Config) -> Result<()> {
    let main = &config.main;

    if !main.backup_dir.is_dir() {
        return Err(ConfigError::ValidationError(format!(
            "Backup directory does not exist: {:?}",
            main.backup_dir
        )));
    }

    if main.parallelism == Some(0) {
        return Err(ConfigError::ValidationError(
            "Parallelism cannot be zero".to_string(),
        ));
    }

    if main.versions == 0 {
        return Err(ConfigError::ValidationError(
            "At least one version must be kept".to_string(),
        ));
    }

    if !main.include_databases.is_empty() && !main.exclude_databases.is_empty() {
        return Err(ConfigError::ValidationError(
            "Mutually exclusive values: cannot specify both 'include_databases' and 'exclude_databases'"
                .to_string(),
        ));
    }

    Ok(())
}
