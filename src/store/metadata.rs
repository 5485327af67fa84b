//! Persisted per-generation records: backup metadata and schema timestamps

use super::{io_error, StoreError};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// Space forecast data carried from one run to the next
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupMetadata {
    /// Compressed artifact bytes divided by source bytes
    pub compression_ratio: f64,
    #[serde(default)]
    pub source_bytes: u64,
    #[serde(default)]
    pub backup_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Local>>,
}

impl BackupMetadata {
    /// Metadata used when no previous run left any: assume no compression
    pub fn neutral() -> Self {
        Self {
            compression_ratio: 1.0,
            source_bytes: 0,
            backup_bytes: 0,
            created_at: None,
        }
    }

    pub fn measured(source_bytes: u64, backup_bytes: u64) -> Self {
        let compression_ratio = if source_bytes == 0 || backup_bytes == 0 {
            1.0
        } else {
            backup_bytes as f64 / source_bytes as f64
        };

        Self {
            compression_ratio,
            source_bytes,
            backup_bytes,
            created_at: Some(Local::now()),
        }
    }

    /// Bytes a run over `source_bytes` is expected to need
    pub fn required_bytes(&self, source_bytes: u64) -> u64 {
        (source_bytes as f64 * self.compression_ratio).ceil() as u64
    }

    /// `Ok(None)` when the file does not exist
    pub fn load(path: &Path) -> Result<Option<Self>, StoreError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error("Failed to read backup metadata", path)(e)),
        };

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| StoreError::Metadata {
                path: path.to_path_buf(),
                source,
            })
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(self).map_err(|source| StoreError::Metadata {
            path: path.to_path_buf(),
            source,
        })?;
        write_atomically(path, json.as_bytes())
    }
}

/// Timestamp returned for schemas that were never backed up.
///
/// Far enough in the past that any real modification time is newer.
pub fn never_backed_up() -> DateTime<Local> {
    let naive = NaiveDate::from_ymd_opt(1900, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default();
    Local.from_utc_datetime(&naive)
}

pub fn format_timestamp(at: DateTime<Local>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Accepts RFC 3339, or a naive ISO-8601 value taken as local time
pub fn parse_timestamp(value: &str) -> Option<DateTime<Local>> {
    let value = value.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Some(at.with_timezone(&Local));
    }

    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
}

/// `Ok(None)` when the timestamp file does not exist
pub fn read_timestamp(path: &Path) -> Result<Option<DateTime<Local>>, StoreError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_error("Failed to read timestamp", path)(e)),
    };

    parse_timestamp(&contents)
        .map(Some)
        .ok_or_else(|| StoreError::InvalidTimestamp {
            path: path.to_path_buf(),
            value: contents.trim().to_string(),
        })
}

pub fn write_timestamp(path: &Path, at: DateTime<Local>) -> Result<(), StoreError> {
    fs::write(path, format_timestamp(at)).map_err(io_error("Failed to write timestamp", path))
}

/// Write to a sibling temporary file, then rename over `path`
pub(crate) fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));

    fs::write(&tmp, contents).map_err(io_error("Failed to write", &tmp))?;
    fs::rename(&tmp, path).map_err(io_error("Failed to rename into place", path))
}
