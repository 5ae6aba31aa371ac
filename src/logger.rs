//! Serial sink for the `log` facade.
//!
//! Records go out over COM1 through the crate's `println!` path. The sink is
//! only installed by the boot path; host tests never call [`init`], so log
//! records there are discarded by the facade.

use log::{Level, LevelFilter, Metadata, Record};

struct SerialLogger;

static LOGGER: SerialLogger = SerialLogger;

impl log::Log for SerialLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let level = match record.level() {
            Level::Error => "\x1b[31mERROR\x1b[0m",
            Level::Warn => "\x1b[33mWARN\x1b[0m",
            Level::Info => "\x1b[32mINFO\x1b[0m",
            Level::Debug => "\x1b[90mDEBUG\x1b[0m",
            Level::Trace => "\x1b[90mTRACE\x1b[0m",
        };

        crate::println!("[{}] {}: {}", level, record.target(), record.args());
    }

    fn flush(&self) {}
}

/// Install the serial logger. A second call leaves the first logger in place.
pub fn init(level: LevelFilter) {
    #[cfg(target_os = "none")]
    crate::SERIAL.lock().init();
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}
