//! Logger plumbing.
//!
//! The library never logs through the process-global `log` logger. Every
//! record goes to the logger object owned or borrowed by the [`Instance`],
//! so two instances in one process can report to different sinks.
//!
//! [`Instance`]: crate::instance::Instance

use log::{Level, Log, Record};
use std::fmt;
use std::sync::Arc;

/// Logger handle passed to an instance and to the platform handles it opens.
pub type Logger = Arc<dyn Log>;

pub const LOG_TARGET: &str = "biggrant";

/// Environment variable holding the filter of the default logger.
pub const LOG_ENV: &str = "BIGGRANT_LOG";

/// Builds the logger an instance uses when the caller supplies none.
pub fn default_logger() -> Logger {
    let logger = env_logger::Builder::from_env(env_logger::Env::new().filter_or(LOG_ENV, "info"))
        .build();
    Arc::new(logger)
}

pub(crate) fn emit(logger: &Logger, level: Level, args: fmt::Arguments<'_>) {
    let record = Record::builder()
        .args(args)
        .level(level)
        .target(LOG_TARGET)
        .build();
    if logger.enabled(record.metadata()) {
        logger.log(&record);
    }
}

macro_rules! log_error {
    ($logger:expr, $($arg:tt)+) => {
        $crate::logging::emit($logger, ::log::Level::Error, format_args!($($arg)+))
    };
}

macro_rules! log_warn {
    ($logger:expr, $($arg:tt)+) => {
        $crate::logging::emit($logger, ::log::Level::Warn, format_args!($($arg)+))
    };
}

macro_rules! log_debug {
    ($logger:expr, $($arg:tt)+) => {
        $crate::logging::emit($logger, ::log::Level::Debug, format_args!($($arg)+))
    };
}

macro_rules! log_trace {
    ($logger:expr, $($arg:tt)+) => {
        $crate::logging::emit($logger, ::log::Level::Trace, format_args!($($arg)+))
    };
}

pub(crate) use {log_debug, log_error, log_trace, log_warn};
