//! Configuration module for dump-manager
//!
//! This module handles loading and validating configuration from TOML files.
//!
//! ## Example Usage
//!
//! ```no_run
//! use dump_manager::config;
//!
//! let config = config::load_config("/etc/dump-manager/dump-manager.toml")?;
//! println!("Keeping {} generations in {:?}", config.main.versions, config.main.backup_dir);
//! # Ok::<(), config::ConfigError>(())
//! ```

mod loader;
mod types;

pub use loader::{load_config, validate_config, ConfigError, Result};
pub use types::*;

/// Expand tilde (~) in path
pub fn expand_tilde(path: &std::path::Path) -> std::path::PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}
