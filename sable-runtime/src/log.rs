//! Logging Infrastructure
//!
//! A small leveled logger owned by the runtime itself. The runtime is linked
//! into code-generator output, so it cannot assume a logging facade is
//! installed in the final binary; it carries its own.
//!
//! Log records go to stderr by default. Tests can swap in a capture sink to
//! assert on output. Nothing on the per-call fast paths (bump allocation,
//! share/erase) logs; only slow paths (segment allocation, stack duplication,
//! faults) do.

use std::fmt::Write as _;
use std::io::Write as _;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::OnceLock;

use parking_lot::Mutex;

/// Log level enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LogLevel {
    /// Trace level (most verbose).
    Trace = 0,
    /// Debug level.
    Debug = 1,
    /// Informational messages.
    Info = 2,
    /// Warnings (default).
    Warn = 3,
    /// Errors only.
    Error = 4,
    /// No logging.
    Off = 5,
}

impl LogLevel {
    /// Parse a log level from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" | "err" => Some(LogLevel::Error),
            "off" | "none" => Some(LogLevel::Off),
            _ => None,
        }
    }

    /// Level name as it appears in log output.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Off => "OFF",
        }
    }

    fn from_u8(v: u8) -> LogLevel {
        match v {
            0 => LogLevel::Trace,
            1 => LogLevel::Debug,
            2 => LogLevel::Info,
            3 => LogLevel::Warn,
            4 => LogLevel::Error,
            _ => LogLevel::Off,
        }
    }
}

/// Minimum level that will be emitted.
static MIN_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Warn as u8);

/// Global logging on/off switch.
static ENABLED: AtomicBool = AtomicBool::new(true);

/// Where log output goes.
pub enum LogSink {
    /// Write to standard error (the default).
    Stderr,
    /// Append to an in-memory buffer. Used by tests.
    Capture(Vec<String>),
}

static SINK: OnceLock<Mutex<LogSink>> = OnceLock::new();

fn sink() -> &'static Mutex<LogSink> {
    SINK.get_or_init(|| Mutex::new(LogSink::Stderr))
}

/// Set the minimum log level.
pub fn set_level(level: LogLevel) {
    MIN_LEVEL.store(level as u8, Ordering::SeqCst);
}

/// Get the current minimum log level.
pub fn level() -> LogLevel {
    LogLevel::from_u8(MIN_LEVEL.load(Ordering::SeqCst))
}

/// Enable or disable logging entirely.
pub fn set_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::SeqCst);
}

/// Check whether a record at `level` would be emitted.
pub fn would_log(level: LogLevel) -> bool {
    ENABLED.load(Ordering::SeqCst) && level != LogLevel::Off && level >= self::level()
}

/// Replace the sink with an in-memory capture buffer, returning the
/// previously captured lines (if the sink was already capturing).
pub fn capture() -> Vec<String> {
    let mut guard = sink().lock();
    match std::mem::replace(&mut *guard, LogSink::Capture(Vec::new())) {
        LogSink::Capture(lines) => lines,
        LogSink::Stderr => Vec::new(),
    }
}

/// Take the captured lines and restore the stderr sink.
pub fn take_captured() -> Vec<String> {
    let mut guard = sink().lock();
    match std::mem::replace(&mut *guard, LogSink::Stderr) {
        LogSink::Capture(lines) => lines,
        LogSink::Stderr => Vec::new(),
    }
}

fn emit(level: LogLevel, target: &str, message: &str, fields: &[(&str, FieldValue)]) {
    if !would_log(level) {
        return;
    }
    let mut line = String::with_capacity(64);
    let _ = write!(line, "{:5} [{}] {}", level.as_str(), target, message);
    for (key, value) in fields {
        let _ = write!(line, " {}={}", key, value);
    }
    let mut guard = sink().lock();
    match &mut *guard {
        LogSink::Stderr => {
            let _ = writeln!(std::io::stderr(), "{}", line);
        }
        LogSink::Capture(lines) => lines.push(line),
    }
}

/// A structured log field value.
#[derive(Debug, Clone)]
pub enum FieldValue {
    /// Integer field.
    Int(i64),
    /// Unsigned field (prompts, sizes).
    Uint(u64),
    /// String field.
    Str(String),
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Uint(v) => write!(f, "{}", v),
            FieldValue::Str(v) => write!(f, "{}", v),
        }
    }
}

/// Builder for structured log records.
///
/// ```rust,ignore
/// LogBuilder::new(LogLevel::Debug, "stack")
///     .message("reset")
///     .field_uint("prompt", prompt)
///     .emit();
/// ```
pub struct LogBuilder {
    level: LogLevel,
    target: &'static str,
    message: String,
    fields: Vec<(&'static str, FieldValue)>,
}

impl LogBuilder {
    /// Create a builder for a record at `level` under `target`.
    pub fn new(level: LogLevel, target: &'static str) -> Self {
        Self {
            level,
            target,
            message: String::new(),
            fields: Vec::new(),
        }
    }

    /// Set the record message.
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = msg.into();
        self
    }

    /// Attach an integer field.
    pub fn field_int(mut self, key: &'static str, value: i64) -> Self {
        self.fields.push((key, FieldValue::Int(value)));
        self
    }

    /// Attach an unsigned field.
    pub fn field_uint(mut self, key: &'static str, value: u64) -> Self {
        self.fields.push((key, FieldValue::Uint(value)));
        self
    }

    /// Attach a string field.
    pub fn field_str(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.fields.push((key, FieldValue::Str(value.into())));
        self
    }

    /// Emit the record.
    pub fn emit(self) {
        let fields: Vec<(&str, FieldValue)> =
            self.fields.iter().map(|(k, v)| (*k, v.clone())).collect();
        emit(self.level, self.target, &self.message, &fields);
    }
}

/// Log a message at trace level.
pub fn trace(target: &str, message: impl AsRef<str>) {
    emit(LogLevel::Trace, target, message.as_ref(), &[]);
}

/// Log a message at debug level.
pub fn debug(target: &str, message: impl AsRef<str>) {
    emit(LogLevel::Debug, target, message.as_ref(), &[]);
}

/// Log a message at info level.
pub fn info(target: &str, message: impl AsRef<str>) {
    emit(LogLevel::Info, target, message.as_ref(), &[]);
}

/// Log a message at warn level.
pub fn warn(target: &str, message: impl AsRef<str>) {
    emit(LogLevel::Warn, target, message.as_ref(), &[]);
}

/// Log a message at error level.
pub fn error(target: &str, message: impl AsRef<str>) {
    emit(LogLevel::Error, target, message.as_ref(), &[]);
}
