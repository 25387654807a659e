mod common;

use std::fs;

use common::{RecordingSink, init_test_logging};
use tempfile::TempDir;
use tput_core::{IoMode, MeasureConfig, MeasureError, measure};
use tracing::info;

const BLOCK: u64 = 64 * 1024;

fn file_config(mode: IoMode, threads: usize) -> MeasureConfig {
    MeasureConfig::new()
        .with_block_size(BLOCK)
        .with_count(5)
        .with_stdev_percent(1000.0)
        .with_threads(threads)
        .with_mode(mode)
        .with_direct_io(false)
}

fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i.wrapping_mul(31) % 253) as u8).collect()
}

#[test]
fn test_write_run_preserves_existing_file() {
    init_test_logging();
    info!(test = "test_write_run_preserves_existing_file", phase = "setup");

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("user-data.bin");
    let original = patterned(4 * BLOCK as usize + 123);
    fs::write(&path, &original).unwrap();

    let summary = measure(&path, &file_config(IoMode::Write, 0), &()).unwrap();
    info!(
        test = "test_write_run_preserves_existing_file",
        phase = "assert",
        samples = summary.samples,
        mean = summary.mean
    );

    assert_eq!(summary.samples, 5);
    assert!(summary.mean > 0.0);
    assert_eq!(fs::read(&path).unwrap(), original);
}

#[test]
fn test_concurrent_write_run_preserves_existing_file() {
    init_test_logging();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("shared.bin");
    let original = patterned(2 * BLOCK as usize);
    fs::write(&path, &original).unwrap();

    let sink = RecordingSink::default();
    let summary = measure(&path, &file_config(IoMode::Write, 3).with_count(12), &sink).unwrap();

    assert!(summary.samples >= 12 && summary.samples < 15);
    assert_eq!(summary.threads, 3);
    let workers: std::collections::BTreeSet<usize> =
        sink.take().iter().map(|p| p.worker).collect();
    assert!(workers.iter().all(|w| *w < 3));
    assert_eq!(fs::read(&path).unwrap(), original);
}

#[test]
fn test_read_run_on_short_file_extends_without_losing_data() {
    init_test_logging();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("short.bin");
    fs::write(&path, b"keep me").unwrap();

    let summary = measure(&path, &file_config(IoMode::Read, 0), &()).unwrap();
    assert_eq!(summary.samples, 5);

    let contents = fs::read(&path).unwrap();
    assert_eq!(contents.len(), BLOCK as usize);
    assert_eq!(&contents[..7], b"keep me");
}

#[test]
fn test_directory_target_leaves_no_files() {
    init_test_logging();

    let dir = TempDir::new().unwrap();
    for mode in [IoMode::Read, IoMode::Write] {
        let summary = measure(dir.path(), &file_config(mode, 2), &()).unwrap();
        assert!(summary.samples >= 5);
    }
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_fresh_path_is_removed_after_run() {
    init_test_logging();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scratch");
    let summary = measure(&path, &file_config(IoMode::Write, 0), &()).unwrap();

    assert_eq!(summary.target, path.display().to_string());
    assert!(!path.exists());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_unopenable_target_fails_before_sampling() {
    init_test_logging();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing-dir").join("scratch");
    let sink = RecordingSink::default();

    let err = measure(&path, &file_config(IoMode::Write, 0), &sink).unwrap_err();
    assert!(matches!(err, MeasureError::Open { .. }));
    assert!(err.is_fatal());
    assert!(sink.take().is_empty());
}

#[test]
fn test_invalid_config_is_rejected() {
    init_test_logging();

    let dir = TempDir::new().unwrap();
    let config = file_config(IoMode::Read, 0).with_block_size(0);
    let err = measure(dir.path(), &config, &()).unwrap_err();
    assert!(matches!(err, MeasureError::InvalidConfig(_)));
}
