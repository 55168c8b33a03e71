// Level-filtered logger with a pluggable sink, injected into each map via its config.
use std::fmt;
use std::io::Write;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "off" | "none" => Ok(LogLevel::Off),
            _ => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("unknown log level '{value}'"))
                .with_hint("Use one of: trace, debug, info, warn, error, off.")),
        }
    }
}

pub type LogSink = Arc<dyn Fn(LogLevel, &str) + Send + Sync>;

static DEFAULT_SINK_LOCK: Mutex<()> = Mutex::new(());

/// Writes warnings and errors to stderr and everything else to stdout.
pub fn default_sink() -> LogSink {
    Arc::new(|level: LogLevel, message: &str| {
        let _guard = DEFAULT_SINK_LOCK
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match level {
            LogLevel::Error | LogLevel::Warn => {
                let _ = writeln!(std::io::stderr(), "{message}");
            }
            _ => {
                let _ = writeln!(std::io::stdout(), "{message}");
            }
        }
    })
}

/// Forwards messages to `tracing` events at the matching level.
pub fn tracing_sink() -> LogSink {
    Arc::new(|level: LogLevel, message: &str| match level {
        LogLevel::Trace => tracing::trace!(target: "sqlitemap", "{message}"),
        LogLevel::Debug => tracing::debug!(target: "sqlitemap", "{message}"),
        LogLevel::Info => tracing::info!(target: "sqlitemap", "{message}"),
        LogLevel::Warn => tracing::warn!(target: "sqlitemap", "{message}"),
        LogLevel::Error => tracing::error!(target: "sqlitemap", "{message}"),
        LogLevel::Off => {}
    })
}

#[derive(Clone)]
pub struct Logger {
    level: LogLevel,
    sink: LogSink,
}

impl Logger {
    pub fn new(level: LogLevel, sink: Option<LogSink>) -> Self {
        Self {
            level,
            sink: sink.unwrap_or_else(default_sink),
        }
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        level != LogLevel::Off && level >= self.level
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        if self.enabled(level) {
            (self.sink)(level, message);
        }
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn trace(&self, message: &str) {
        self.log(LogLevel::Trace, message);
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(LogLevel::Off, None)
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}
