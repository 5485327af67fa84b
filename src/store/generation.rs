//! Generation directories: naming, discovery and free-space inspection

use super::{io_error, StoreError};
use chrono::{Duration, Local, NaiveDateTime};
use std::fs;
use std::path::{Path, PathBuf};

/// Prefix shared by every generation directory
pub const GENERATION_PREFIX: &str = "dump_";

/// Log file written into every generation
pub const LOG_FILE_NAME: &str = "dump-manager.log";

/// Persisted per-generation metadata
pub const METADATA_FILE_NAME: &str = "backup.json";

const NAME_FORMAT: &str = "%Y%m%d-%H%M%S-%6f";

/// Snapshot of one generation directory.
///
/// This is a plain value: it is never updated in place. Whenever something
/// could invalidate it (pruning frees space on the same volume), the store
/// inspects the directory again and replaces the value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    name: String,
    path: PathBuf,
    bytes_free: u64,
}

impl Generation {
    /// Read name and free space of an existing generation directory
    pub fn inspect(path: &Path) -> Result<Self, StoreError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let bytes_free = free_bytes(path)?;

        Ok(Self {
            name,
            path: path.to_path_buf(),
            bytes_free,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Free bytes on the volume holding this generation, as of inspection
    pub fn bytes_free(&self) -> u64 {
        self.bytes_free
    }

    pub fn artifact_path(&self, schema: &str) -> PathBuf {
        self.path.join(format!("{}.sql.gz", schema))
    }

    pub fn timestamp_path(&self, schema: &str) -> PathBuf {
        self.path.join(format!("{}.timestamp", schema))
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.path.join(METADATA_FILE_NAME)
    }

    pub fn log_path(&self) -> PathBuf {
        self.path.join(LOG_FILE_NAME)
    }
}

/// Directory name for a generation started at `at`
pub fn generation_name(at: NaiveDateTime) -> String {
    format!("{}{}", GENERATION_PREFIX, at.format(NAME_FORMAT))
}

/// Inverse of [`generation_name`]; `None` for anything that is not a generation
pub fn parse_generation_name(name: &str) -> Option<NaiveDateTime> {
    let stamp = name.strip_prefix(GENERATION_PREFIX)?;
    NaiveDateTime::parse_from_str(stamp, NAME_FORMAT).ok()
}

/// Name for a new generation that sorts after every existing one.
///
/// Normally this is simply "now". If the clock went backwards, or two
/// generations are created within the same microsecond, the newest existing
/// timestamp is bumped by one microsecond instead.
pub fn next_generation_name(newest: Option<&str>) -> String {
    let now = Local::now().naive_local();
    let at = match newest.and_then(parse_generation_name) {
        Some(last) if now <= last => last + Duration::microseconds(1),
        _ => now,
    };
    generation_name(at)
}

/// All generation directories under `root`, oldest first.
///
/// Symlinks (such as `last`) and anything whose name does not parse as a
/// generation are ignored.
pub fn list_generations(root: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let entries = fs::read_dir(root).map_err(io_error("Failed to list backup directory", root))?;

    let mut generations: Vec<(String, PathBuf)> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .file_type()
                .map(|t| t.is_dir() && !t.is_symlink())
                .unwrap_or(false)
        })
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            parse_generation_name(&name).map(|_| (name, entry.path()))
        })
        .collect();

    generations.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(generations.into_iter().map(|(_, path)| path).collect())
}

/// Bytes available to unprivileged users on the volume holding `path`
pub fn free_bytes(path: &Path) -> Result<u64, StoreError> {
    let stat = nix::sys::statvfs::statvfs(path)
        .map_err(|errno| io_error("Failed to stat filesystem of", path)(errno.into()))?;
    Ok((stat.blocks_available() as u64).saturating_mul(stat.fragment_size() as u64))
}
