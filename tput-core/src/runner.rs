//! Timed sample execution.
//!
//! A runner performs exactly one operation of the configured block size
//! and returns how long it took, including the flush to stable storage.
//! - [`FileRunner`] does real positional I/O at offset 0 of an open file
//! - [`SyntheticRunner`] draws elapsed times from a Gaussian throughput
//!   distribution, for exercising the statistics without hardware

use std::f64::consts::PI;
use std::fs::File;
use std::os::unix::fs::FileExt;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use tracing::warn;

use crate::config::{IoMode, SyntheticProfile};
use crate::error::MeasureError;

/// Anything that can produce one timed sample.
///
/// Runners are shared by reference across all workers of a session, so a
/// single sample call must be safe to issue concurrently.
pub trait SampleRunner: Sync {
    /// Bytes moved by one sample.
    fn block_size(&self) -> u64;

    /// Length of the per-worker scratch buffer [`Self::run_sample`] needs,
    /// or 0 when it needs none.
    fn scratch_len(&self) -> usize;

    /// Perform one operation and return its elapsed time in seconds.
    fn run_sample(&self, scratch: &mut [u8]) -> Result<f64, MeasureError>;
}

/// Real I/O against an open file or block device.
///
/// Every sample targets the same block at offset 0. Writes all source one
/// shared buffer; reads land in the calling worker's scratch buffer,
/// whose contents are discarded.
#[derive(Debug)]
pub struct FileRunner<'a> {
    file: &'a File,
    mode: IoMode,
    block: &'a [u8],
    target: &'a str,
}

impl<'a> FileRunner<'a> {
    /// `block` is the write source and fixes the block size for both modes.
    pub fn new(file: &'a File, mode: IoMode, block: &'a [u8], target: &'a str) -> Self {
        Self {
            file,
            mode,
            block,
            target,
        }
    }
}

impl SampleRunner for FileRunner<'_> {
    fn block_size(&self) -> u64 {
        self.block.len() as u64
    }

    fn scratch_len(&self) -> usize {
        match self.mode {
            IoMode::Read => self.block.len(),
            IoMode::Write => 0,
        }
    }

    fn run_sample(&self, scratch: &mut [u8]) -> Result<f64, MeasureError> {
        let expected = self.block.len();
        let op = self.mode.op_name();

        let start = Instant::now();
        let transferred = match self.mode {
            IoMode::Write => self.file.write_at(self.block, 0),
            IoMode::Read => {
                let dest = scratch
                    .get_mut(..expected)
                    .ok_or(MeasureError::Allocation { size: expected })?;
                self.file.read_at(dest, 0)
            }
        }
        .map_err(|e| MeasureError::io(op, e))?;

        if transferred != expected {
            return Err(MeasureError::ShortTransfer {
                op,
                expected,
                actual: transferred,
            });
        }

        // Sync explicitly instead of opening with O_DSYNC so the barrier
        // is inside the timed window and its failures are visible.
        if let Err(err) = self.file.sync_data() {
            warn!(
                op = "fdatasync",
                errno = err.raw_os_error(),
                target_path = self.target,
                error = %err,
                "Durability barrier failed, sample still counted"
            );
        }

        Ok(start.elapsed().as_secs_f64())
    }
}

/// Gaussian stand-in for real storage.
#[derive(Debug)]
pub struct SyntheticRunner {
    block_size: u64,
    profile: SyntheticProfile,
    rng: Mutex<fastrand::Rng>,
}

impl SyntheticRunner {
    pub fn new(block_size: u64, profile: SyntheticProfile) -> Self {
        let rng = match profile.seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };
        Self {
            block_size,
            profile,
            rng: Mutex::new(rng),
        }
    }

    /// Draw one throughput value in bytes per second.
    ///
    /// Clamped to a small positive floor so a far tail draw cannot yield
    /// a zero or negative elapsed time.
    pub fn draw_throughput(&self) -> f64 {
        let z = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            standard_normal(&mut rng)
        };
        let floor = self.profile.mean_throughput * 1e-3;
        (self.profile.mean_throughput + z * self.profile.stdev_throughput).max(floor)
    }
}

impl SampleRunner for SyntheticRunner {
    fn block_size(&self) -> u64 {
        self.block_size
    }

    fn scratch_len(&self) -> usize {
        0
    }

    fn run_sample(&self, _scratch: &mut [u8]) -> Result<f64, MeasureError> {
        Ok(self.block_size as f64 / self.draw_throughput())
    }
}

/// Box-Muller transform over two uniform draws.
fn standard_normal(rng: &mut fastrand::Rng) -> f64 {
    // 1 - [0, 1) keeps the logarithm finite.
    let u1 = 1.0 - rng.f64();
    let u2 = rng.f64();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::RunningStatistics;
    use std::fs::OpenOptions;
    use tempfile::NamedTempFile;

    const MIB: f64 = 1024.0 * 1024.0;

    fn open_rw(path: &std::path::Path) -> File {
        OpenOptions::new().read(true).write(true).open(path).unwrap()
    }

    #[test]
    fn test_write_sample_writes_block_at_offset_zero() {
        let tmp = NamedTempFile::new().unwrap();
        let file = open_rw(tmp.path());
        let block = vec![0xAB_u8; 8192];

        let runner = FileRunner::new(&file, IoMode::Write, &block, "test");
        assert_eq!(runner.scratch_len(), 0);
        let elapsed = runner.run_sample(&mut []).unwrap();
        let elapsed_again = runner.run_sample(&mut []).unwrap();

        assert!(elapsed > 0.0);
        assert!(elapsed_again > 0.0);
        let contents = std::fs::read(tmp.path()).unwrap();
        assert_eq!(contents.len(), 8192);
        assert!(contents.iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn test_read_sample_fills_scratch() {
        let tmp = NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), vec![7_u8; 4096]).unwrap();
        let file = File::open(tmp.path()).unwrap();
        let block = vec![0_u8; 4096];

        let runner = FileRunner::new(&file, IoMode::Read, &block, "test");
        let mut scratch = vec![0_u8; runner.scratch_len()];
        let elapsed = runner.run_sample(&mut scratch).unwrap();

        assert!(elapsed > 0.0);
        assert!(scratch.iter().all(|&b| b == 7));
    }

    #[test]
    fn test_short_read_is_fatal() {
        let tmp = NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), vec![1_u8; 1000]).unwrap();
        let file = File::open(tmp.path()).unwrap();
        let block = vec![0_u8; 4096];

        let runner = FileRunner::new(&file, IoMode::Read, &block, "test");
        let mut scratch = vec![0_u8; 4096];
        let err = runner.run_sample(&mut scratch).unwrap_err();

        match err {
            MeasureError::ShortTransfer {
                op,
                expected,
                actual,
            } => {
                assert_eq!(op, "pread");
                assert_eq!(expected, 4096);
                assert_eq!(actual, 1000);
            }
            other => panic!("expected ShortTransfer, got {other:?}"),
        }
        assert!(runner.run_sample(&mut scratch).unwrap_err().is_fatal());
    }

    #[test]
    fn test_write_to_read_only_handle_is_io_error() {
        let tmp = NamedTempFile::new().unwrap();
        let file = File::open(tmp.path()).unwrap();
        let block = vec![0_u8; 512];

        let runner = FileRunner::new(&file, IoMode::Write, &block, "test");
        let err = runner.run_sample(&mut []).unwrap_err();
        assert!(matches!(err, MeasureError::Io { op: "pwrite", .. }));
    }

    #[derive(Clone, Default)]
    struct CapturedLog(std::sync::Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLog {
        type Writer = CapturedLog;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_failed_barrier_is_logged_and_sample_counts() {
        // /dev/null accepts writes but has no fsync, so fdatasync fails.
        let file = OpenOptions::new().write(true).open("/dev/null").unwrap();
        assert!(file.sync_data().is_err());
        let block = vec![0_u8; 512];
        let runner = FileRunner::new(&file, IoMode::Write, &block, "/dev/null");

        let log = CapturedLog::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(log.clone())
            .with_ansi(false)
            .finish();
        let elapsed = tracing::subscriber::with_default(subscriber, || runner.run_sample(&mut []))
            .unwrap();

        assert!(elapsed >= 0.0);
        let text = String::from_utf8(log.0.lock().unwrap().clone()).unwrap();
        assert!(text.contains("WARN"), "log: {text}");
        assert!(text.contains("Durability barrier failed"), "log: {text}");
        assert!(text.contains("fdatasync"), "log: {text}");
    }

    #[test]
    fn test_synthetic_is_reproducible_with_seed() {
        let profile = SyntheticProfile::default().with_seed(42);
        let a = SyntheticRunner::new(1 << 20, profile);
        let b = SyntheticRunner::new(1 << 20, profile);
        for _ in 0..20 {
            assert_eq!(a.run_sample(&mut []).unwrap(), b.run_sample(&mut []).unwrap());
        }
    }

    #[test]
    fn test_synthetic_distribution_matches_profile() {
        let profile = SyntheticProfile::default().with_seed(1234);
        let runner = SyntheticRunner::new(1 << 20, profile);

        let mut stats = RunningStatistics::new();
        for _ in 0..20_000 {
            stats.add(runner.draw_throughput());
        }

        let mean = stats.mean().unwrap();
        let sd = stats.standard_deviation().unwrap();
        assert!((mean - 100.0 * MIB).abs() < 0.5 * MIB, "mean {mean}");
        assert!((sd - 10.0 * MIB).abs() < 0.5 * MIB, "sd {sd}");
    }

    #[test]
    fn test_synthetic_zero_spread_is_exact() {
        let profile = SyntheticProfile {
            mean_throughput: 1000.0,
            stdev_throughput: 0.0,
            seed: Some(1),
        };
        let runner = SyntheticRunner::new(500, profile);
        assert_eq!(runner.run_sample(&mut []).unwrap(), 0.5);
    }

    #[test]
    fn test_synthetic_throughput_is_always_positive() {
        let profile = SyntheticProfile {
            mean_throughput: 10.0,
            stdev_throughput: 100.0,
            seed: Some(9),
        };
        let runner = SyntheticRunner::new(1, profile);
        for _ in 0..1000 {
            assert!(runner.draw_throughput() > 0.0);
        }
    }
}
