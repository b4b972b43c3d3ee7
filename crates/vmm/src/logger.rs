//! Stderr logger for host-side tools and tests.
//!
//! Routes `log` records to stderr as `[LEVEL target] message`.

use std::io::Write;

use gvm_utils::Once;
use log::{LevelFilter, Metadata, Record};

static LOGGER: StderrLogger = StderrLogger;

/// Whether our logger won the race for `log::set_logger`.
static INSTALLED: Once<bool> = Once::new();

struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut err = std::io::stderr().lock();
        // Nothing sensible to do if stderr is gone
        let _ = writeln!(err, "{}", format_record(record));
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

fn format_record(record: &Record) -> String {
    format!("[{} {}] {}", record.level(), record.target(), record.args())
}

/// Install the logger and set the maximum level.
///
/// Safe to call more than once: the logger is registered on the first call,
/// later calls only change the level. Returns `false` if a different logger
/// was already installed by someone else.
pub fn init(max_level: LevelFilter) -> bool {
    let installed = *INSTALLED.call_once(|| log::set_logger(&LOGGER).is_ok());
    log::set_max_level(max_level);
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let first = init(LevelFilter::Debug);
        let second = init(LevelFilter::Trace);
        assert_eq!(first, second);
        assert_eq!(log::max_level(), LevelFilter::Trace);
        log::trace!("logger ready");
    }

    #[test]
    fn test_record_format() {
        let line = format_record(
            &Record::builder()
                .args(format_args!("PML4 at {:#x}", 0x1000))
                .level(log::Level::Debug)
                .target("gvm_paging::builder")
                .build(),
        );
        assert_eq!(line, "[DEBUG gvm_paging::builder] PML4 at 0x1000");
    }
}
