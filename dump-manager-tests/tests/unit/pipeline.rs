//! Unit tests for the mysqldump pipeline, driven by fake dump scripts

use dump_manager::pipeline::{DumpPipeline, MysqldumpPipeline, PipelineError};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::Read;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tempfile::TempDir;
use test_utils::{fake_mysqldump, FakeDump, COMPLETION_LINE};

fn read_artifact(path: &Path) -> String {
    let mut content = String::new();
    GzDecoder::new(File::open(path).unwrap())
        .read_to_string(&mut content)
        .unwrap();
    content
}

fn pipeline_for(dir: &TempDir, behaviour: FakeDump) -> MysqldumpPipeline {
    let bin = fake_mysqldump(dir.path(), behaviour);
    let scratch = dir.path().join("scratch");
    fs::create_dir_all(&scratch).unwrap();
    MysqldumpPipeline::new(bin.display().to_string(), vec!["--single-transaction".to_string()])
        .with_scratch_dir(scratch)
}

fn scratch_is_empty(dir: &TempDir) -> bool {
    fs::read_dir(dir.path().join("scratch")).unwrap().next().is_none()
}

#[test]
fn test_complete_dump_is_compressed() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline_for(&dir, FakeDump::Complete);
    let artifact = dir.path().join("shop.sql.gz");

    pipeline.dump("shop", &artifact).unwrap();

    let content = read_artifact(&artifact);
    assert!(content.starts_with("-- MySQL dump of shop"));
    assert!(content.trim_end().ends_with(COMPLETION_LINE));
    assert!(scratch_is_empty(&dir));
}

#[test]
fn test_non_zero_exit_fails_with_stderr() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline_for(&dir, FakeDump::Fails(3));
    let artifact = dir.path().join("shop.sql.gz");

    let err = pipeline.dump("shop", &artifact).unwrap_err();

    match err {
        PipelineError::ExitStatus { code, stderr } => {
            assert_eq!(code, Some(3));
            assert!(stderr.contains("Got error on shop"));
        }
        other => panic!("Expected ExitStatus, got {:?}", other),
    }
    assert!(scratch_is_empty(&dir));
}

#[test]
fn test_truncated_dump_fails_despite_clean_exit() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline_for(&dir, FakeDump::Truncated);
    let artifact = dir.path().join("shop.sql.gz");

    let err = pipeline.dump("shop", &artifact).unwrap_err();

    match err {
        PipelineError::MissingCompletionMarker { last_line } => {
            assert_eq!(last_line, "INSERT INTO t VALUES");
        }
        other => panic!("Expected MissingCompletionMarker, got {:?}", other),
    }
    assert!(scratch_is_empty(&dir));
}

#[test]
fn test_marker_found_after_large_output() {
    let dir = TempDir::new().unwrap();
    let bin = dir.path().join("mysqldump");
    fs::write(
        &bin,
        format!(
            "#!/bin/sh\ni=0\nwhile [ $i -lt 20000 ]; do\n  echo \"INSERT INTO t VALUES ($i);\"\n  i=$((i+1))\ndone\necho '{}'\n",
            COMPLETION_LINE
        ),
    )
    .unwrap();
    fs::set_permissions(&bin, fs::Permissions::from_mode(0o755)).unwrap();

    let pipeline = MysqldumpPipeline::new(bin.display().to_string(), vec![]);
    let artifact = dir.path().join("big.sql.gz");
    pipeline.dump("big", &artifact).unwrap();

    let content = read_artifact(&artifact);
    assert_eq!(content.lines().count(), 20001);
    assert!(fs::metadata(&artifact).unwrap().len() < content.len() as u64);
}
