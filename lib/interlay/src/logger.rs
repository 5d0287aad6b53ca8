//! Logger capability shared by the middlewares.
//!
//! Middlewares hold an optional [`SharedLogger`]; when none is configured they
//! stay silent. [`TracingLogger`] forwards entries to `tracing`.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::Error;

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    /// Diagnostic detail.
    Debug,
    /// Routine events (cache hits and stores, request/response lines).
    #[default]
    Info,
    /// Recoverable anomalies (retries).
    Warn,
    /// Failures absorbed by the pipeline (cache store errors).
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warning",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(Error::configuration(format!("unknown log level: {other}"))),
        }
    }
}

/// Sink for middleware log entries.
///
/// Must be safe to call from many in-flight requests at once.
pub trait Logger: Send + Sync + 'static {
    /// Emit one entry with its structured context.
    fn log(&self, level: LogLevel, message: &str, context: &[(&'static str, String)]);
}

/// Logger shared between middlewares.
pub type SharedLogger = Arc<dyn Logger>;

/// [`Logger`] that emits `tracing` events under the `interlay` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl TracingLogger {
    /// Shared handle to a tracing logger.
    #[must_use]
    pub fn shared() -> SharedLogger {
        Arc::new(Self)
    }
}

fn render_context(context: &[(&'static str, String)]) -> String {
    context
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(" ")
}

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, message: &str, context: &[(&'static str, String)]) {
        let context = render_context(context);
        match level {
            LogLevel::Debug => debug!(target: "interlay", context = %context, "{message}"),
            LogLevel::Info => info!(target: "interlay", context = %context, "{message}"),
            LogLevel::Warn => warn!(target: "interlay", context = %context, "{message}"),
            LogLevel::Error => error!(target: "interlay", context = %context, "{message}"),
        }
    }
}

/// Log through `logger` if one is configured.
pub(crate) fn emit(
    logger: Option<&SharedLogger>,
    level: LogLevel,
    message: &str,
    context: &[(&'static str, String)],
) {
    if let Some(logger) = logger {
        logger.log(level, message, context);
    }
}
