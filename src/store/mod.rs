//! Generation store - owns the versioned backup directory tree
//!
//! Layout under the backup root:
//!
//! ```text
//! <root>/
//!   dump_20261018-020000-123456/   one generation per run
//!     <schema>.sql.gz
//!     <schema>.timestamp
//!     backup.json
//!     dump-manager.log
//!   last -> dump_20261018-020000-123456
//!   last.log
//! ```
//!
//! `last` is only repointed once a run is completely finalized.

mod generation;
mod metadata;

pub use generation::{
    free_bytes, generation_name, list_generations, next_generation_name, parse_generation_name,
    Generation, GENERATION_PREFIX, LOG_FILE_NAME, METADATA_FILE_NAME,
};
pub use metadata::{format_timestamp, never_backed_up, parse_timestamp, BackupMetadata};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Symlink at the backup root pointing to the newest finalized generation
pub const LAST_LINK: &str = "last";

/// Log of the newest run, kept even when no generation survived
pub const LAST_LOG: &str = "last.log";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{context} {path:?}: {source}")]
    Io {
        context: &'static str,
        path: PathBuf,
        source: io::Error,
    },

    #[error("No previous backup of '{schema}' to reuse")]
    NoPreviousArtifact { schema: String },

    #[error("Invalid timestamp in {path:?}: {value:?}")]
    InvalidTimestamp { path: PathBuf, value: String },

    #[error("Invalid backup metadata in {path:?}: {source}")]
    Metadata {
        path: PathBuf,
        source: serde_json::Error,
    },
}

pub(crate) fn io_error<'a>(
    context: &'static str,
    path: &'a Path,
) -> impl FnOnce(io::Error) -> StoreError + 'a {
    move |source| StoreError::Io {
        context,
        path: path.to_path_buf(),
        source,
    }
}

/// How an unchanged schema's previous artifact is carried into the new generation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStrategy {
    /// Hard link: shares the inode, survives pruning of the older generation
    #[default]
    Hard,
    /// Symbolic link to the previous artifact's absolute path
    Symbolic,
}

/// The versioned directory tree of one backup root
#[derive(Debug, Clone)]
pub struct GenerationStore {
    root: PathBuf,
    link_strategy: LinkStrategy,
    current: Generation,
    previous: Option<Generation>,
}

impl GenerationStore {
    /// Create a new current generation under `root` and locate the previous one
    pub fn open(root: impl AsRef<Path>, link_strategy: LinkStrategy) -> Result<Self, StoreError> {
        let root = root.as_ref();
        let root = fs::canonicalize(root).map_err(io_error("Failed to resolve backup directory", root))?;

        let existing = list_generations(&root)?;
        let newest = existing
            .last()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned());

        let current_path = root.join(next_generation_name(newest.as_deref()));
        fs::create_dir(&current_path)
            .map_err(io_error("Failed to create generation directory", &current_path))?;

        let current = Generation::inspect(&current_path)?;
        let previous = existing.last().map(|p| Generation::inspect(p)).transpose()?;

        debug!(
            "Current generation: {}, previous: {}",
            current.name(),
            previous.as_ref().map(Generation::name).unwrap_or("<none>")
        );

        Ok(Self {
            root,
            link_strategy,
            current,
            previous,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn current(&self) -> &Generation {
        &self.current
    }

    pub fn previous(&self) -> Option<&Generation> {
        self.previous.as_ref()
    }

    pub fn link_strategy(&self) -> LinkStrategy {
        self.link_strategy
    }

    /// Re-read current and previous generations from disk
    pub fn refresh(&mut self) -> Result<(), StoreError> {
        let current = Generation::inspect(self.current.path())?;
        let previous = list_generations(&self.root)?
            .into_iter()
            .filter(|p| {
                p.file_name()
                    .is_some_and(|n| &*n.to_string_lossy() < current.name())
            })
            .last()
            .map(|p| Generation::inspect(&p))
            .transpose()?;

        self.current = current;
        self.previous = previous;
        Ok(())
    }

    /// Metadata of the previous generation, or a neutral default.
    ///
    /// Never fails: a missing or unreadable record only makes the next space
    /// estimate more conservative.
    pub fn get_backup_info(&self) -> BackupMetadata {
        let Some(previous) = &self.previous else {
            debug!("No previous generation, assuming compression ratio 1.0");
            return BackupMetadata::neutral();
        };

        match BackupMetadata::load(&previous.metadata_path()) {
            Ok(Some(metadata)) => metadata,
            Ok(None) => BackupMetadata::neutral(),
            Err(e) => {
                warn!("Ignoring previous backup metadata: {}", e);
                BackupMetadata::neutral()
            }
        }
    }

    /// Persist the compression ratio of the current generation for the next run
    pub fn store_backup_info(&self, source_bytes: u64) -> Result<BackupMetadata, StoreError> {
        let backup_bytes = self.artifact_bytes()?;
        let metadata = BackupMetadata::measured(source_bytes, backup_bytes);
        metadata.save(&self.current.metadata_path())?;

        debug!(
            "Stored backup info: {} source bytes, {} backup bytes, ratio {:.4}",
            source_bytes, backup_bytes, metadata.compression_ratio
        );
        Ok(metadata)
    }

    /// Total size of the artifacts in the current generation (links followed)
    fn artifact_bytes(&self) -> Result<u64, StoreError> {
        let dir = self.current.path();
        let entries = fs::read_dir(dir).map_err(io_error("Failed to list generation", dir))?;

        let mut total = 0;
        for entry in entries.filter_map(|e| e.ok()) {
            if !entry.file_name().to_string_lossy().ends_with(".sql.gz") {
                continue;
            }
            let path = entry.path();
            let metadata = fs::metadata(&path).map_err(io_error("Failed to stat artifact", &path))?;
            total += metadata.len();
        }
        Ok(total)
    }

    /// Point `last` (and `last.log`) at the current generation
    pub fn link_to_last_dir(&self) -> Result<(), StoreError> {
        let name = Path::new(self.current.name());
        replace_symlink(&self.root.join(LAST_LINK), name)?;
        replace_symlink(&self.root.join(LAST_LOG), &name.join(LOG_FILE_NAME))?;

        info!("Linked {} to {}", LAST_LINK, self.current.name());
        Ok(())
    }

    /// When `schema` was last backed up, according to the previous generation
    pub fn get_database_backup_time(&self, schema: &str) -> DateTime<Local> {
        let Some(previous) = &self.previous else {
            return never_backed_up();
        };

        match metadata::read_timestamp(&previous.timestamp_path(schema)) {
            Ok(Some(at)) => at,
            Ok(None) => never_backed_up(),
            Err(e) => {
                warn!("DB '{}': {}", schema, e);
                never_backed_up()
            }
        }
    }

    /// Record "now" as the backup time of `schema` in the current generation.
    ///
    /// Written before the dump runs, so it marks the intent to back up the
    /// schema rather than a confirmed completion.
    pub fn store_database_backup_time(&self, schema: &str) -> Result<(), StoreError> {
        metadata::write_timestamp(&self.current.timestamp_path(schema), Local::now())
    }

    /// Forget a failed backup of `schema` in the current generation.
    ///
    /// Removes its timestamp and any partial artifact so the next run never
    /// mistakes the failed attempt for a usable backup.
    pub fn discard_database_backup(&self, schema: &str) -> Result<(), StoreError> {
        for path in [
            self.current.timestamp_path(schema),
            self.current.artifact_path(schema),
        ] {
            match fs::remove_file(&path) {
                Ok(()) => debug!("Removed {:?}", path),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(io_error("Failed to remove", &path)(e)),
            }
        }
        Ok(())
    }

    /// Link the previous generation's artifact of `schema` into the current one
    pub fn reuse_previous_backup(&self, schema: &str) -> Result<PathBuf, StoreError> {
        let no_artifact = || StoreError::NoPreviousArtifact {
            schema: schema.to_string(),
        };
        let previous = self.previous.as_ref().ok_or_else(no_artifact)?;

        let mut source = previous.artifact_path(schema);
        match fs::symlink_metadata(&source) {
            Ok(meta) if meta.file_type().is_symlink() => {
                source = match fs::canonicalize(&source) {
                    Ok(resolved) => resolved,
                    Err(e) if e.kind() == ErrorKind::NotFound => {
                        warn!("DB '{}': Previous backup {:?} is a dangling link", schema, source);
                        return Err(no_artifact());
                    }
                    Err(e) => {
                        return Err(io_error("Failed to resolve previous artifact", &source)(e))
                    }
                };
            }
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(no_artifact()),
            Err(e) => return Err(io_error("Failed to stat previous artifact", &source)(e)),
        }

        let target = self.current.artifact_path(schema);
        let linked = match self.link_strategy {
            LinkStrategy::Hard => fs::hard_link(&source, &target),
            LinkStrategy::Symbolic => std::os::unix::fs::symlink(&source, &target),
        };
        linked.map_err(io_error("Failed to link previous artifact to", &target))?;

        debug!("Linked {:?} -> {:?} ({:?})", target, source, self.link_strategy);
        Ok(target)
    }

    /// Prune old generations before the run
    pub fn cleanup_before(&mut self, retain: usize) -> Result<Vec<PathBuf>, StoreError> {
        self.cleanup(retain)
    }

    /// Prune old generations after the run
    pub fn cleanup_after(&mut self, retain: usize) -> Result<Vec<PathBuf>, StoreError> {
        self.cleanup(retain)
    }

    /// Keep the `retain` newest generations (the current one included)
    fn cleanup(&mut self, retain: usize) -> Result<Vec<PathBuf>, StoreError> {
        let mut kept = list_generations(&self.root)?;
        let excess = kept.len().saturating_sub(retain);
        let pruned: Vec<PathBuf> = kept
            .drain(..excess)
            .filter(|path| path != self.current.path())
            .collect();
        if pruned.is_empty() {
            return Ok(Vec::new());
        }

        rescue_linked_artifacts(&pruned, &kept)?;

        let mut removed = Vec::new();
        for path in pruned {
            fs::remove_dir_all(&path).map_err(io_error("Failed to remove generation", &path))?;
            debug!("Removed generation {:?}", path);
            removed.push(path);
        }

        if !removed.is_empty() {
            self.refresh()?;
        }
        Ok(removed)
    }

    /// Drop the current generation of a run that intentionally did nothing.
    ///
    /// Its log is appended to `last.log`, then the directory is deleted.
    pub fn remove_skipped(self) -> Result<(), StoreError> {
        let last_log = self.root.join(LAST_LOG);

        let mut merged = read_if_exists(&last_log)?;
        merged.extend(read_if_exists(&self.current.log_path())?);
        metadata::write_atomically(&last_log, &merged)?;

        fs::remove_dir_all(self.current.path())
            .map_err(io_error("Failed to remove skipped generation", self.current.path()))?;

        Ok(())
    }
}

/// Keep artifacts that surviving generations still link to symbolically.
///
/// Each such artifact is moved over the oldest surviving link to it, and the
/// newer links are repointed at its new location.
fn rescue_linked_artifacts(pruned: &[PathBuf], kept: &[PathBuf]) -> Result<(), StoreError> {
    let mut moved: HashMap<PathBuf, PathBuf> = HashMap::new();

    for generation in kept {
        let entries =
            fs::read_dir(generation).map_err(io_error("Failed to list generation", generation))?;

        let mut links: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_symlink()).unwrap_or(false))
            .filter(|e| e.file_name().to_string_lossy().ends_with(".sql.gz"))
            .map(|e| e.path())
            .collect();
        links.sort();

        for link in links {
            let target = fs::read_link(&link).map_err(io_error("Failed to read link", &link))?;
            let target = match link.parent() {
                Some(dir) if target.is_relative() => dir.join(target),
                _ => target,
            };
            if !target.parent().is_some_and(|dir| pruned.iter().any(|p| p == dir)) {
                continue;
            }

            if let Some(new_home) = moved.get(&target) {
                replace_symlink(&link, new_home)?;
                debug!("Repointed {:?} -> {:?}", link, new_home);
                continue;
            }

            match fs::rename(&target, &link) {
                Ok(()) => {
                    info!("Moved {:?} to {:?} before pruning", target, link);
                    moved.insert(target, link);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    warn!("Linked artifact {:?} is already missing", target);
                }
                Err(e) => return Err(io_error("Failed to move linked artifact to", &link)(e)),
            }
        }
    }

    Ok(())
}

fn read_if_exists(path: &Path) -> Result<Vec<u8>, StoreError> {
    match fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(io_error("Failed to read", path)(e)),
    }
}

/// Atomically (re)point the symlink `link` at `target`
fn replace_symlink(link: &Path, target: &Path) -> Result<(), StoreError> {
    let file_name = link
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = link.with_file_name(format!(".{}.tmp", file_name));

    match fs::remove_file(&tmp) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(io_error("Failed to remove stale link", &tmp)(e)),
    }

    std::os::unix::fs::symlink(target, &tmp).map_err(io_error("Failed to create link", &tmp))?;
    fs::rename(&tmp, link).map_err(io_error("Failed to replace link", link))
}
