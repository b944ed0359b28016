// nomadbase-core/src/logging.rs
// Embedded-friendly logging for NomadBase (no env_logger dependency).
//
// Stateless host runs are short-lived, so the logger is a single atomic
// level plus eprintln - nothing to flush, nothing to tear down. The level
// can be seeded once from the NOMADBASE_LOG environment variable.

use std::sync::atomic::{AtomicU8, Ordering};

/// Log levels (ordered by severity, Off silences everything)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    /// Nothing is emitted
    Off = 0,
    /// Critical failures that prevent operations
    Error = 1,
    /// Potential issues that don't stop execution (expired locks, conflict resolutions)
    Warn = 2,
    /// High-level operational information (commits, collection lifecycle)
    Info = 3,
    /// Detailed diagnostic information (lock attempts, token comparisons)
    Debug = 4,
    /// Extremely verbose, every engine evaluation logged
    Trace = 5,
}

impl LogLevel {
    /// Parse log level from string (case-insensitive)
    pub fn parse(s: &str) -> Option<LogLevel> {
        match s.to_uppercase().as_str() {
            "OFF" => Some(LogLevel::Off),
            "ERROR" => Some(LogLevel::Error),
            "WARN" => Some(LogLevel::Warn),
            "INFO" => Some(LogLevel::Info),
            "DEBUG" => Some(LogLevel::Debug),
            "TRACE" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Off => "OFF",
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }
}

// Global log level (default: WARN for production)
static GLOBAL_LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Warn as u8);

/// Set the global log level
pub fn set_log_level(level: LogLevel) {
    GLOBAL_LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Get the current global log level
pub fn get_log_level() -> LogLevel {
    match GLOBAL_LOG_LEVEL.load(Ordering::Relaxed) {
        0 => LogLevel::Off,
        1 => LogLevel::Error,
        2 => LogLevel::Warn,
        3 => LogLevel::Info,
        4 => LogLevel::Debug,
        5 => LogLevel::Trace,
        _ => LogLevel::Warn, // Fallback
    }
}

/// Seed the global level from NOMADBASE_LOG, if set and valid.
/// Unknown values are ignored rather than erroring - logging must never
/// take a run down.
pub fn init_from_env() {
    if let Ok(value) = std::env::var("NOMADBASE_LOG") {
        if let Some(level) = LogLevel::parse(&value) {
            set_log_level(level);
        }
    }
}

/// Check if a message at the given level should be logged
#[inline]
pub fn should_log(level: LogLevel) -> bool {
    level != LogLevel::Off && level <= get_log_level()
}

/// Internal logging function
#[doc(hidden)]
pub fn log_message(level: LogLevel, module: &str, message: &str) {
    if should_log(level) {
        let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");
        eprintln!("{} [{}] {}: {}", ts, level.as_str(), module, message);
    }
}

/// Log an error message
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::logging::log_message(
            $crate::logging::LogLevel::Error,
            module_path!(),
            &format!($($arg)*)
        )
    };
}

/// Log a warning message
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logging::log_message(
            $crate::logging::LogLevel::Warn,
            module_path!(),
            &format!($($arg)*)
        )
    };
}

/// Log an info message
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logging::log_message(
            $crate::logging::LogLevel::Info,
            module_path!(),
            &format!($($arg)*)
        )
    };
}

/// Log a debug message
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::logging::log_message(
            $crate::logging::LogLevel::Debug,
            module_path!(),
            &format!($($arg)*)
        )
    };
}

/// Log a trace message
#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => {
        $crate::logging::log_message(
            $crate::logging::LogLevel::Trace,
            module_path!(),
            &format!($($arg)*)
        )
    };
}
