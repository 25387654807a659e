//! Worker thread management.
//!
//! Workers are plain OS threads scoped to the run: they borrow the session
//! (and through it the file handle and buffer) and are all joined before
//! the caller can tear the target down.

use std::thread;

use tracing::{debug, error};

use crate::buffer::AlignedBuffer;
use crate::error::MeasureError;
use crate::runner::SampleRunner;
use crate::session::MeasurementSession;

/// Runs a session's sampling loop on `threads` workers.
#[derive(Debug, Clone, Copy)]
pub struct ThreadCoordinator {
    threads: usize,
}

impl ThreadCoordinator {
    /// 0 runs a single worker inline on the calling thread.
    pub fn new(threads: usize) -> Self {
        Self { threads }
    }

    /// Drive `session` to completion.
    ///
    /// Every worker's scratch buffer is allocated before the first sample,
    /// so an allocation failure never interrupts a running measurement.
    /// Returns the number of samples each worker took. The first fatal
    /// error from any worker stops the others and is returned once all of
    /// them have been joined.
    pub fn run<R: SampleRunner>(
        &self,
        session: &MeasurementSession<'_, R>,
    ) -> Result<Vec<u64>, MeasureError> {
        if self.threads == 0 {
            let mut scratch = AlignedBuffer::zeroed(session.scratch_len())?;
            return session
                .run_worker(0, scratch.as_mut_slice())
                .map(|taken| vec![taken]);
        }

        let buffers = (0..self.threads)
            .map(|_| AlignedBuffer::zeroed(session.scratch_len()))
            .collect::<Result<Vec<_>, _>>()?;

        thread::scope(|scope| {
            let mut first_error: Option<MeasureError> = None;
            let mut handles = Vec::with_capacity(self.threads);

            for (worker, mut scratch) in buffers.into_iter().enumerate() {
                let spawned = thread::Builder::new()
                    .name(format!("tput-worker-{worker}"))
                    .spawn_scoped(scope, move || {
                        let _stop = StopOnUnwind(session);
                        session.run_worker(worker, scratch.as_mut_slice())
                    });
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(source) => {
                        error!(worker, error = %source, "Failed to spawn worker");
                        session.abort();
                        first_error = Some(MeasureError::io("spawn", source));
                        break;
                    }
                }
            }
            debug!(
                target_path = session.target(),
                workers = handles.len(),
                "Workers started"
            );

            let mut taken = Vec::with_capacity(handles.len());
            for (worker, handle) in handles.into_iter().enumerate() {
                match handle.join() {
                    Ok(Ok(count)) => taken.push(count),
                    Ok(Err(err)) => {
                        error!(worker, error = %err, "Worker failed");
                        first_error.get_or_insert(err);
                    }
                    Err(_) => {
                        error!(worker, "Worker panicked");
                        session.abort();
                        first_error.get_or_insert(MeasureError::WorkerPanicked);
                    }
                }
            }

            match first_error {
                Some(err) => Err(err),
                None => Ok(taken),
            }
        })
    }
}

/// Ends the session when a worker unwinds, so its siblings stop sampling
/// even while the coordinator is still blocked joining an earlier worker.
struct StopOnUnwind<'s, 'a, R: SampleRunner>(&'s MeasurementSession<'a, R>);

impl<R: SampleRunner> Drop for StopOnUnwind<'_, '_, R> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.abort();
        }
    }
}
