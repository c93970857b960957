#![deny(missing_docs)]
//! Shared logging utilities for the curator workspace.
//!
//! This crate provides the `curator_*` logging macros used across the codebase,
//! the logger initialisation used by binaries, and a minimal test initializer
//! for the global logger.
//!
//! Every line is prefixed with the reconciliation cycle that was current on the
//! emitting thread, so interleaved cycles can be told apart in a single log.

use std::cell::Cell;
use std::fs::File;
use std::path::{Path, PathBuf};

#[doc(hidden)]
pub use log;
pub use log::LevelFilter;

use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

thread_local! {
    /// Thread-local storage for the reconciliation cycle currently running.
    static CYCLE: Cell<u64> = const { Cell::new(0) };
}

/// Sets the reconciliation cycle for the current thread.
/// The reconciler calls this once when a cycle enters `Scanning`.
pub fn set_cycle(cycle: u64) {
    CYCLE.with(|v| v.set(cycle));
}

/// Retrieves the reconciliation cycle for the current thread.
/// Returns 0 before the first cycle started.
pub fn current_cycle() -> u64 {
    CYCLE.with(|v| v.get())
}

/// Logs a trace-level message tagged with the current cycle.
#[macro_export]
macro_rules! curator_trace {
    ($($arg:tt)*) => {{
        $crate::log::trace!("[c{}] {}", $crate::current_cycle(), format_args!($($arg)*));
    }};
}

/// Logs a debug-level message tagged with the current cycle.
#[macro_export]
macro_rules! curator_debug {
    ($($arg:tt)*) => {{
        $crate::log::debug!("[c{}] {}", $crate::current_cycle(), format_args!($($arg)*));
    }};
}

/// Logs an info-level message tagged with the current cycle.
#[macro_export]
macro_rules! curator_info {
    ($($arg:tt)*) => {{
        $crate::log::info!("[c{}] {}", $crate::current_cycle(), format_args!($($arg)*));
    }};
}

/// Logs a warn-level message tagged with the current cycle.
#[macro_export]
macro_rules! curator_warn {
    ($($arg:tt)*) => {{
        $crate::log::warn!("[c{}] {}", $crate::current_cycle(), format_args!($($arg)*));
    }};
}

/// Logs an error-level message tagged with the current cycle.
#[macro_export]
macro_rules! curator_error {
    ($($arg:tt)*) => {{
        $crate::log::error!("[c{}] {}", $crate::current_cycle(), format_args!($($arg)*));
    }};
}

/// Destination for log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogDestination {
    /// Write to `./curator.log` in the current directory.
    File,
    /// Write to the terminal.
    Terminal,
    /// Write to both file and terminal.
    Both,
}

/// Default log file, relative to the current working directory.
pub const DEFAULT_LOG_FILE: &str = "./curator.log";

/// Initialize the global logger with the specified destination and level.
///
/// For `LogDestination::File` or `Both`, creates [`DEFAULT_LOG_FILE`]. A file
/// that cannot be created degrades to whatever loggers remain; this never
/// fails the caller.
pub fn initialize(destination: LogDestination, level: LevelFilter) {
    initialize_with_path(destination, level, Path::new(DEFAULT_LOG_FILE));
}

/// Same as [`initialize`], writing file output to `log_path`.
pub fn initialize_with_path(destination: LogDestination, level: LevelFilter, log_path: &Path) {
    let config = build_config();

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    if matches!(destination, LogDestination::Terminal | LogDestination::Both) {
        loggers.push(TermLogger::new(
            level,
            config.clone(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ));
    }
    if matches!(destination, LogDestination::File | LogDestination::Both) {
        if let Some(file_logger) = create_file_logger(level, config, log_path) {
            loggers.push(file_logger);
        }
    }
    if loggers.is_empty() {
        return;
    }

    let _ = CombinedLogger::init(loggers);
}

/// Initializes a simple terminal logger for use in tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    // Use debug level in debug builds, info in release builds.
    let level = if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    // Ignore the error if a logger was already set by another test.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}

fn build_config() -> Config {
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        .build()
}

fn create_file_logger(
    level: LevelFilter,
    config: Config,
    log_path: &Path,
) -> Option<Box<WriteLogger<File>>> {
    let log_path = PathBuf::from(log_path);
    match File::create(&log_path) {
        Ok(file) => Some(WriteLogger::new(level, config, file)),
        Err(err) => {
            eprintln!("Warning: Could not create log file at {:?}: {}", log_path, err);
            None
        }
    }
}
