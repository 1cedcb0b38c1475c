//! The logger collaborator. Samplers hold an explicit `Arc<dyn Log>` rather than
//! writing to the process-wide logger directly, so tests can capture output.

use log::{Level, Log, Metadata, Record};
use std::fmt;
use std::sync::Arc;

pub type SharedLogger = Arc<dyn Log>;

/// Forwards every record to whichever `log` backend the process installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalLogger;

impl Log for GlobalLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level() && log::logger().enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            log::logger().log(record);
        }
    }

    fn flush(&self) {
        log::logger().flush();
    }
}

pub fn default_logger() -> SharedLogger {
    Arc::new(GlobalLogger)
}

pub(crate) fn info(logger: &dyn Log, args: fmt::Arguments) {
    let record = Record::builder()
        .args(args)
        .level(Level::Info)
        .target(module_path!())
        .module_path_static(Some(module_path!()))
        .build();
    if logger.enabled(record.metadata()) {
        logger.log(&record);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Collects formatted messages in memory.
    #[derive(Debug, Default)]
    pub struct CaptureLogger {
        pub lines: Mutex<Vec<String>>,
    }

    impl CaptureLogger {
        pub fn lines(&self) -> Vec<String> {
            self.lines.lock().map(|l| l.clone()).unwrap_or_default()
        }
    }

    impl Log for CaptureLogger {
        fn enabled(&self, _metadata: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            if let Ok(mut lines) = self.lines.lock() {
                lines.push(record.args().to_string());
            }
        }

        fn flush(&self) {}
    }
}
