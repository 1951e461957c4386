// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Logger for firmware builds, writing to whatever console the platform provides and optionally
//! to a log file as well.

use crate::options::PrintLevel;
use core::fmt::{Arguments, Write};
#[cfg(not(test))]
use core::option_env;
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::{Once, mutex::SpinMutex};

static LOGGER: Once<Logger> = Once::new();

struct Logger {
    sink: &'static (dyn LogSink + Send + Sync),
    log_file: Option<&'static (dyn LogSink + Send + Sync)>,
}

impl Logger {
    fn write_record(sink: &(dyn LogSink + Send + Sync), record: &Record) {
        // Test progress and results are printed as they are.
        if record.level() == Level::Info {
            writeln!(sink, "{}", record.args());
        } else {
            writeln!(sink, "{}: {}", record.level(), record.args());
        }
    }
}

impl Log for Logger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        Self::write_record(self.sink, record);
        if let Some(log_file) = self.log_file {
            Self::write_record(log_file, record);
        }
    }

    fn flush(&self) {}
}

/// Initialises the logger. Every record goes to `sink`, and also to `log_file` if the user asked
/// for one with `-f`. The maximum level comes from the print level if one is given, otherwise
/// from the build.
pub fn init(
    sink: &'static (dyn LogSink + Send + Sync),
    log_file: Option<&'static (dyn LogSink + Send + Sync)>,
    print_level: Option<PrintLevel>,
) -> Result<(), SetLoggerError> {
    let logger = LOGGER.call_once(|| Logger { sink, log_file });
    log::set_logger(logger)?;
    log::set_max_level(print_level.map_or_else(build_time_log_level, PrintLevel::level_filter));
    Ok(())
}

/// Returns the logging [`LevelFilter`] set by the build-time environment variable `LOG_LEVEL`.
/// `LOG_LEVEL` can have the lower-case string values "off", "error", "warn", "info", "debug", or
/// "trace", corresponding to the named values of [`LevelFilter`]. If `LOG_LEVEL` is absent or has
/// some other value, this function returns `LevelFilter::Debug` for debug builds, otherwise
/// `LevelFilter::Info`.
pub const fn build_time_log_level() -> LevelFilter {
    let level = match option_env!("LOG_LEVEL") {
        Some(level) => level,
        None => "",
    };
    match level.as_bytes() {
        b"off" => LevelFilter::Off,
        b"error" => LevelFilter::Error,
        b"warn" => LevelFilter::Warn,
        b"info" => LevelFilter::Info,
        b"debug" => LevelFilter::Debug,
        b"trace" => LevelFilter::Trace,
        _ => {
            if cfg!(debug_assertions) {
                LevelFilter::Debug
            } else {
                LevelFilter::Info
            }
        }
    }
}

/// Something to which logs can be sent.
///
/// Note that unlike `core::fmt::Write`, the `write_fmt` method on this trait takes `&self` rather
/// than `&mut self`. This means that the implementation is responsible for handling locking if
/// necessary, or can be made lock-free.
pub trait LogSink {
    /// Writes the given format arguments to the log sink.
    fn write_fmt(&self, args: Arguments);
}

/// An implementation of `LogSink` that wraps around any implementation of `core::fmt::Write`.
///
/// This wraps the given writer in a spin mutex, so that PEs running payloads at the same time
/// write whole lines rather than interleaving characters.
pub struct LockedWriter<W: Write> {
    writer: SpinMutex<W>,
}

impl<W: Write> LockedWriter<W> {
    /// Creates a new `LockedWriter` wrapping the given [`Write`] implementation.
    pub const fn new(writer: W) -> Self {
        Self {
            writer: SpinMutex::new(writer),
        }
    }

    /// Consumes the `LockedWriter` and returns the wrapped writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write> LogSink for LockedWriter<W> {
    fn write_fmt(&self, args: Arguments) {
        // Ignore errors.
        let _ = self.writer.lock().write_fmt(args);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{boxed::Box, string::String};

    fn leak_writer() -> &'static LockedWriter<String> {
        Box::leak(Box::new(LockedWriter::new(String::new())))
    }

    #[test]
    fn locked_writer_writes_whole_lines() {
        let sink = LockedWriter::new(String::new());
        writeln!(sink, "{:4} : {}", 1, "Check for number of PE");
        writeln!(sink, "       : Result:  PASS");
        assert_eq!(
            sink.into_inner(),
            "   1 : Check for number of PE\n       : Result:  PASS\n"
        );
    }

    #[test]
    fn records_go_to_console_and_log_file() {
        let console = leak_writer();
        let log_file = leak_writer();
        let logger = Logger {
            sink: console,
            log_file: Some(log_file),
        };
        logger.log(
            &Record::builder()
                .level(Level::Info)
                .args(format_args!("  31 : Check PE granule support"))
                .build(),
        );
        logger.log(
            &Record::builder()
                .level(Level::Error)
                .args(format_args!("Failed to power on PE 2"))
                .build(),
        );
        let expected = "  31 : Check PE granule support\nERROR: Failed to power on PE 2\n";
        assert_eq!(console.writer.lock().as_str(), expected);
        assert_eq!(log_file.writer.lock().as_str(), expected);
    }

    #[test]
    fn console_only_without_log_file() {
        let console = leak_writer();
        let logger = Logger {
            sink: console,
            log_file: None,
        };
        logger.log(
            &Record::builder()
                .level(Level::Warn)
                .args(format_args!("MPIDR 0x300 is not in the PE info table"))
                .build(),
        );
        assert_eq!(
            console.writer.lock().as_str(),
            "WARN: MPIDR 0x300 is not in the PE info table\n"
        );
    }

    #[test]
    fn print_level_overrides_build_level() {
        assert_eq!(
            Some(PrintLevel::ERROR).map_or_else(build_time_log_level, PrintLevel::level_filter),
            LevelFilter::Error
        );
    }
}
