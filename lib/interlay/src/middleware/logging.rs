//! Request/response logging middleware.
//!
//! Every completed exchange produces one entry rendered by a
//! [`MessageFormatter`], so configured credentials never reach the logger.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use tower::{Layer, Service};
use tracing::{Instrument, Level, span};

use crate::formatter::MessageFormatter;
use crate::logger::{LogLevel, SharedLogger};
use crate::{Error, Request, Response, Result};

/// Configuration for the logging middleware.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogConfig {
    /// Level used for successful exchanges. Failures always log at error.
    pub level: LogLevel,
    /// Log full request and response messages instead of a compact line.
    pub debug: bool,
    /// Literal values masked in every entry.
    pub credentials: Vec<String>,
}

impl LogConfig {
    /// Set the success level.
    #[must_use]
    pub const fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Select the debug template.
    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Add values to mask.
    #[must_use]
    pub fn with_credentials<I, S>(mut self, credentials: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.credentials
            .extend(credentials.into_iter().map(Into::into));
        self
    }

    /// Formatter described by this configuration.
    pub fn formatter(&self) -> Result<MessageFormatter> {
        MessageFormatter::new(&self.credentials, self.debug)
    }
}

/// Layer that adds request/response logging.
///
/// # Example
///
/// ```ignore
/// use interlay::middleware::{LogConfig, LogLayer};
/// use interlay::TracingLogger;
/// use tower::ServiceBuilder;
///
/// let layer = LogLayer::from_config(&LogConfig::default(), TracingLogger::shared())?;
/// let service = ServiceBuilder::new().layer(layer).service(transport);
/// ```
#[derive(Clone)]
pub struct LogLayer {
    formatter: Arc<MessageFormatter>,
    logger: SharedLogger,
    level: LogLevel,
}

impl std::fmt::Debug for LogLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogLayer")
            .field("template", &self.formatter.template())
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}

impl LogLayer {
    /// Create a logging layer writing to `logger` at info level.
    #[must_use]
    pub fn new(formatter: MessageFormatter, logger: SharedLogger) -> Self {
        Self {
            formatter: Arc::new(formatter),
            logger,
            level: LogLevel::default(),
        }
    }

    /// Create a logging layer from its configuration.
    pub fn from_config(config: &LogConfig, logger: SharedLogger) -> Result<Self> {
        Ok(Self::new(config.formatter()?, logger).with_level(config.level))
    }

    /// Set the level used for successful exchanges.
    #[must_use]
    pub const fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }
}

impl<S> Layer<S> for LogLayer {
    type Service = Log<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Log {
            inner,
            formatter: Arc::clone(&self.formatter),
            logger: Arc::clone(&self.logger),
            level: self.level,
        }
    }
}

/// Service that logs requests and responses.
#[derive(Clone)]
pub struct Log<S> {
    inner: S,
    formatter: Arc<MessageFormatter>,
    logger: SharedLogger,
    level: LogLevel,
}

impl<S: std::fmt::Debug> std::fmt::Debug for Log<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Log")
            .field("inner", &self.inner)
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}

impl<S> Service<Request> for Log<S>
where
    S: Service<Request, Response = Response, Error = Error> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let method = request.method();
        let url = self.formatter.redact(request.url().as_str()).into_owned();
        let span = span!(Level::DEBUG, "http_request", %method, %url);

        let formatter = Arc::clone(&self.formatter);
        let logger = Arc::clone(&self.logger);
        let level = self.level;
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(
            async move {
                let start = Instant::now();
                let sent = request.clone();

                let result = inner.call(request).await;

                // Saturating conversion to u64
                let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
                let context = [("elapsed_ms", elapsed_ms.to_string())];

                match &result {
                    Ok(response) => {
                        let message = formatter.format(&sent, Some(response), None);
                        logger.log(level, &message, &context);
                    }
                    Err(err) => {
                        let message = formatter.format(&sent, None, Some(err));
                        logger.log(LogLevel::Error, &message, &context);
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}
