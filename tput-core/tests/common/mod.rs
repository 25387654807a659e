use std::sync::{Mutex, Once};
use tput_core::{ProgressSink, SampleProgress};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_test_writer()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_thread_ids(true)
                    .json(),
            )
            .with(filter)
            .init();
    });
}

/// Collects every progress event a session publishes.
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<SampleProgress>>,
}

impl RecordingSink {
    #[allow(dead_code)]
    pub fn take(&self) -> Vec<SampleProgress> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

impl ProgressSink for RecordingSink {
    fn on_sample(&self, progress: &SampleProgress) {
        self.events.lock().unwrap().push(*progress);
    }
}
