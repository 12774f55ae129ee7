//! Logging for the presentation core and its backends
//!
//! - Pluggable sink through the [`Logger`] trait
//! - Severity levels (Trace, Debug, Info, Warn, Error)
//! - Colored console output by default
//! - file:line details on ERROR entries

use colored::*;
use std::time::SystemTime;
use chrono::{DateTime, Local};

/// Logger trait for custom logging implementations
///
/// # Example
///
/// ```no_run
/// use video_presenter::vpresent::log::{Logger, LogEntry};
///
/// struct FrameTimingLogger;
///
/// impl Logger for FrameTimingLogger {
///     fn log(&self, entry: &LogEntry) {
///         // Forward to a file, a ring buffer, ...
///     }
/// }
/// ```
pub trait Logger: Send + Sync {
    /// Log an entry
    fn log(&self, entry: &LogEntry);
}

/// One log record
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub severity: LogSeverity,

    pub timestamp: SystemTime,

    /// Emitting component (e.g. "vpresent::FramePresenter", "vpresent::vulkan")
    pub source: String,

    pub message: String,

    /// Source file (only for detailed ERROR logs)
    pub file: Option<&'static str>,

    /// Source line (only for detailed ERROR logs)
    pub line: Option<u32>,
}

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogSeverity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogSeverity {
    /// Fixed-width label used by the console output
    pub fn label(self) -> &'static str {
        match self {
            LogSeverity::Trace => "TRACE",
            LogSeverity::Debug => "DEBUG",
            LogSeverity::Info => "INFO ",
            LogSeverity::Warn => "WARN ",
            LogSeverity::Error => "ERROR",
        }
    }
}

/// Console logger
///
/// Format:
/// - Normal: `[timestamp] [SEVERITY] [source] message`
/// - Error: `[timestamp] [ERROR] [source] message (file:line)`
pub struct DefaultLogger;

impl DefaultLogger {
    /// Plain (uncolored) rendering of an entry
    pub fn format(entry: &LogEntry) -> String {
        let datetime: DateTime<Local> = entry.timestamp.into();
        let timestamp = datetime.format("%Y-%m-%d %H:%M:%S%.3f");

        match (entry.file, entry.line) {
            (Some(file), Some(line)) => format!(
                "[{}] [{}] [{}] {} ({}:{})",
                timestamp,
                entry.severity.label(),
                entry.source,
                entry.message,
                file,
                line
            ),
            _ => format!(
                "[{}] [{}] [{}] {}",
                timestamp,
                entry.severity.label(),
                entry.source,
                entry.message
            ),
        }
    }
}

impl Logger for DefaultLogger {
    fn log(&self, entry: &LogEntry) {
        let datetime: DateTime<Local> = entry.timestamp.into();
        let timestamp = datetime.format("%Y-%m-%d %H:%M:%S%.3f").to_string();

        let label = entry.severity.label();
        let severity_str = match entry.severity {
            LogSeverity::Trace => label.bright_black(),
            LogSeverity::Debug => label.cyan(),
            LogSeverity::Info => label.green(),
            LogSeverity::Warn => label.yellow(),
            LogSeverity::Error => label.red().bold(),
        };

        let source = entry.source.bright_blue();

        if let (Some(file), Some(line)) = (entry.file, entry.line) {
            println!(
                "[{}] [{}] [{}] {} ({}:{})",
                timestamp, severity_str, source, entry.message, file, line
            );
        } else {
            println!("[{}] [{}] [{}] {}", timestamp, severity_str, source, entry.message);
        }
    }
}

// ===== LOGGING MACROS =====

/// Log a TRACE message
///
/// ```no_run
/// video_presenter::vp_trace!("vpresent::CommandRecorder", "Recording draw of {} vertices", 4);
/// ```
#[macro_export]
macro_rules! vp_trace {
    ($source:expr, $($arg:tt)*) => {
        $crate::vpresent::Runtime::log(
            $crate::vpresent::log::LogSeverity::Trace,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log a DEBUG message
#[macro_export]
macro_rules! vp_debug {
    ($source:expr, $($arg:tt)*) => {
        $crate::vpresent::Runtime::log(
            $crate::vpresent::log::LogSeverity::Debug,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log an INFO message
#[macro_export]
macro_rules! vp_info {
    ($source:expr, $($arg:tt)*) => {
        $crate::vpresent::Runtime::log(
            $crate::vpresent::log::LogSeverity::Info,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log a WARN message
#[macro_export]
macro_rules! vp_warn {
    ($source:expr, $($arg:tt)*) => {
        $crate::vpresent::Runtime::log(
            $crate::vpresent::log::LogSeverity::Warn,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log an ERROR message with file:line information
#[macro_export]
macro_rules! vp_error {
    ($source:expr, $($arg:tt)*) => {
        $crate::vpresent::Runtime::log_detailed(
            $crate::vpresent::log::LogSeverity::Error,
            $source,
            format!($($arg)*),
            file!(),
            line!()
        )
    };
}

/// Log an ERROR and evaluate to the matching [`Error`](crate::vpresent::Error) value
///
/// ```no_run
/// # use video_presenter::vpresent::Error;
/// let err: Error = video_presenter::vp_err!("vpresent::vulkan", BackendError, "vkCreateFence failed: {}", -4);
/// ```
#[macro_export]
macro_rules! vp_err {
    ($source:expr, $kind:ident, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::vp_error!($source, "{}", message);
        $crate::vpresent::Error::$kind(message)
    }};
}

/// Log a WARN and evaluate to the matching error value (expected, recoverable failures)
#[macro_export]
macro_rules! vp_warn_err {
    ($source:expr, $kind:ident, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::vp_warn!($source, "{}", message);
        $crate::vpresent::Error::$kind(message)
    }};
}

/// Log an ERROR and return it from the enclosing function
#[macro_export]
macro_rules! vp_bail {
    ($source:expr, $kind:ident, $($arg:tt)*) => {
        return Err($crate::vp_err!($source, $kind, $($arg)*))
    };
}

/// Log a WARN and return the error from the enclosing function
#[macro_export]
macro_rules! vp_bail_warn {
    ($source:expr, $kind:ident, $($arg:tt)*) => {
        return Err($crate::vp_warn_err!($source, $kind, $($arg)*))
    };
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
