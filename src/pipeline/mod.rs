//! Pipeline executor - one dump-and-compress run for one schema
//!
//! The dump tool's stdout is gzip-compressed into the artifact while its
//! final line is teed to a small scratch file. A dump only counts as
//! complete when the tool exits 0 *and* that final line carries the
//! completion marker, which catches truncated output a clean exit would hide.

pub mod decode;

use flate2::write::GzEncoder;
use flate2::Compression;
use regex::Regex;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::OnceLock;
use std::thread;
use tracing::{debug, error};

/// Longest prefix of the final line that is kept for verification
const MAX_LINE_BYTES: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Failed to start {program}: {source}")]
    Spawn { program: String, source: io::Error },

    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        source: io::Error,
    },

    #[error("mysqldump pipeline failed with exit code {code:?}: {stderr}")]
    ExitStatus { code: Option<i32>, stderr: String },

    #[error("mysqldump did not complete successfully: no completion message found (last line: {last_line:?})")]
    MissingCompletionMarker { last_line: String },

    #[error("Dump output could not be decoded")]
    Undecodable,
}

fn io_error(context: &'static str) -> impl FnOnce(io::Error) -> PipelineError {
    move |source| PipelineError::Io { context, source }
}

/// Produces the compressed artifact of one schema
pub trait DumpPipeline: Send + Sync {
    fn dump(&self, schema: &str, artifact: &Path) -> Result<(), PipelineError>;
}

/// `-- Dump completed on 2026-10-18 02:00:13`
pub fn is_completion_marker(line: &str) -> bool {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER
        .get_or_init(|| {
            Regex::new(r"^-- Dump completed on \d{4}-\d{2}-\d{2}\s+\d+:\d{2}:\d{2}")
                .expect("valid completion marker pattern")
        })
        .is_match(line.trim())
}

/// Runs mysqldump and gzips its output natively
#[derive(Debug, Clone)]
pub struct MysqldumpPipeline {
    mysqldump_bin: String,
    options: Vec<String>,
    scratch_dir: Option<PathBuf>,
}

impl MysqldumpPipeline {
    pub fn new(mysqldump_bin: impl Into<String>, options: Vec<String>) -> Self {
        Self {
            mysqldump_bin: mysqldump_bin.into(),
            options,
            scratch_dir: None,
        }
    }

    /// Place scratch files here instead of the system temp directory
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    fn scratch_file(&self) -> Result<tempfile::NamedTempFile, PipelineError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("dump-manager-").suffix(".lastline");
        match &self.scratch_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(io_error("Failed to create scratch file"))
    }

    /// Copy stdout into the compressed artifact, teeing its final line to `scratch`
    fn stream(child: &mut Child, artifact: &Path, scratch: &mut File) -> Result<(), PipelineError> {
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| io_error("Dump tool has no stdout")(io::ErrorKind::BrokenPipe.into()))?;

        let file = File::create(artifact).map_err(io_error("Failed to create artifact"))?;
        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());

        let mut tail = LastLine::default();
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = match stdout.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(io_error("Failed to read dump output")(e)),
            };
            encoder
                .write_all(&buf[..n])
                .map_err(io_error("Failed to write artifact"))?;
            tail.feed(&buf[..n]);
            tail.write_to(scratch)
                .map_err(io_error("Failed to write scratch file"))?;
        }

        let mut writer = encoder.finish().map_err(io_error("Failed to finish artifact"))?;
        writer.flush().map_err(io_error("Failed to flush artifact"))
    }
}

impl DumpPipeline for MysqldumpPipeline {
    fn dump(&self, schema: &str, artifact: &Path) -> Result<(), PipelineError> {
        // Removed on drop, whichever way this function returns
        let mut scratch = self.scratch_file()?;

        debug!(
            "Executing command: {} {} {} | gzip -c > {}",
            self.mysqldump_bin,
            schema,
            self.options.join(" "),
            artifact.display()
        );

        let mut child = Command::new(&self.mysqldump_bin)
            .arg(schema)
            .args(&self.options)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| PipelineError::Spawn {
                program: self.mysqldump_bin.clone(),
                source,
            })?;

        // Drained concurrently so a chatty stderr cannot block stdout
        let stderr_reader = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut bytes = Vec::new();
                let _ = stderr.read_to_end(&mut bytes);
                bytes
            })
        });

        if let Err(e) = Self::stream(&mut child, artifact, scratch.as_file_mut()) {
            let _ = child.kill();
            let _ = child.wait();
            return Err(e);
        }

        let status = child.wait().map_err(io_error("Failed to wait for dump tool"))?;
        let stderr = stderr_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if !status.success() {
            let stderr = decode::decode_text(&stderr)
                .unwrap_or_else(|| String::from_utf8_lossy(&stderr).into_owned());
            error!(
                "mysqldump failed with return code {:?}: {}",
                status.code(),
                stderr.trim()
            );
            return Err(PipelineError::ExitStatus {
                code: status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        let last_bytes = fs::read(scratch.path()).map_err(io_error("Failed to read scratch file"))?;
        let last_line = decode::decode_text(&last_bytes).ok_or(PipelineError::Undecodable)?;

        if !is_completion_marker(&last_line) {
            error!("Completion message not found. Last line: {}", last_line.trim());
            return Err(PipelineError::MissingCompletionMarker {
                last_line: last_line.trim().to_string(),
            });
        }

        Ok(())
    }
}

/// Tracks the final line of a byte stream, like `tail -n 1`
#[derive(Debug, Default)]
struct LastLine {
    current: Vec<u8>,
    complete: Vec<u8>,
}

impl LastLine {
    fn feed(&mut self, chunk: &[u8]) {
        let Some(end) = chunk.iter().rposition(|&b| b == b'\n') else {
            self.push(chunk);
            return;
        };

        let head = &chunk[..end];
        match head.iter().rposition(|&b| b == b'\n') {
            Some(start) => {
                self.current.clear();
                self.push(&head[start + 1..]);
            }
            None => self.push(head),
        }
        self.complete = std::mem::take(&mut self.current);
        self.push(&chunk[end + 1..]);
    }

    fn push(&mut self, bytes: &[u8]) {
        let room = MAX_LINE_BYTES.saturating_sub(self.current.len());
        self.current.extend_from_slice(&bytes[..bytes.len().min(room)]);
    }

    /// Replace the content of `file` with the current final line
    fn write_to(&self, file: &mut File) -> io::Result<()> {
        file.set_len(0)?;
        file.rewind()?;
        file.write_all(self.last())
    }

    fn last(&self) -> &[u8] {
        if self.current.is_empty() {
            &self.complete
        } else {
            &self.current
        }
    }
}
