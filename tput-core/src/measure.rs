//! One complete measurement run against a single target.

use std::path::Path;

use tracing::info;

use crate::buffer::AlignedBuffer;
use crate::config::MeasureConfig;
use crate::coordinator::ThreadCoordinator;
use crate::error::MeasureError;
use crate::runner::{FileRunner, SampleRunner, SyntheticRunner};
use crate::session::{MeasurementSession, ProgressSink, SessionSummary};
use crate::target::OpenTarget;

/// Measure `path` until the stopping policy says the mean is stable.
///
/// Setup failures (configuration, buffer allocation, opening or locking
/// the target) are reported before any sample is taken. The target is
/// torn down only after every worker has been joined.
pub fn measure(
    path: &Path,
    config: &MeasureConfig,
    sink: &dyn ProgressSink,
) -> Result<SessionSummary, MeasureError> {
    config.validate()?;
    let shown = path.display().to_string();

    if let Some(profile) = config.selftest {
        info!(
            target_path = %shown,
            block_size = config.block_size,
            mean_throughput = profile.mean_throughput,
            stdev_throughput = profile.stdev_throughput,
            "Starting synthetic self-test"
        );
        let runner = SyntheticRunner::new(config.block_size, profile);
        return drive(runner, shown, config, sink);
    }

    let mut buffer = AlignedBuffer::zeroed(config.block_len()?)?;
    let target = OpenTarget::open(path, config)?;
    target.load_block(buffer.as_mut_slice())?;

    info!(
        target_path = %shown,
        kind = ?target.kind(),
        mode = %config.mode,
        block_size = config.block_size,
        threads = config.threads,
        count = config.count,
        stdev_percent = config.stdev_percent,
        "Starting measurement"
    );

    let runner = FileRunner::new(
        target.file(),
        config.mode,
        buffer.as_slice(),
        target.display_name(),
    );
    let summary = drive(runner, shown, config, sink)?;
    target.close()?;
    Ok(summary)
}

fn drive<R: SampleRunner>(
    runner: R,
    shown: String,
    config: &MeasureConfig,
    sink: &dyn ProgressSink,
) -> Result<SessionSummary, MeasureError> {
    let session = MeasurementSession::new(runner, shown, config, sink);
    let taken = ThreadCoordinator::new(config.threads).run(&session)?;
    let summary = session.summary();

    info!(
        target_path = %summary.target,
        samples = summary.samples,
        per_worker = ?taken,
        mean = summary.mean,
        relative_stderr = summary.relative_stderr(),
        stop_reason = ?summary.stop_reason,
        "Measurement complete"
    );
    Ok(summary)
}
