//! Retry middleware for HTTP requests.
//!
//! [`RetryDecider`] holds the decision: retry while the budget lasts and the
//! attempt either failed at the transport level or got a status of 500 or
//! above. [`RetryPolicy`] plugs it into tower's retry loop and waits between
//! attempts according to [`RetryConfig`].

use std::cmp::min;
use std::future::{self, Future};
use std::pin::Pin;
use std::time::Duration;

use tower::retry::Policy;

use crate::logger::{LogLevel, SharedLogger, emit};
use crate::{Error, Request, Response};

/// Default retry budget.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Lowest status treated as a retryable server failure.
pub const SERVER_ERROR_THRESHOLD: u16 = 500;

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every retry.
    Constant,
    /// `base_delay * n` before retry `n`.
    Linear,
    /// `base_delay * 2^(n-1)` before retry `n`.
    #[default]
    Exponential,
}

/// Configuration for the retry middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of re-attempts; total attempts never exceed this plus one.
    pub max_retries: u32,
    /// Delay growth.
    pub backoff: Backoff,
    /// Delay unit; zero disables waiting.
    pub base_delay: Duration,
    /// Upper bound on a single delay.
    pub max_delay: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: Backoff::Exponential,
            base_delay: Duration::from_secs(1),
            max_delay: None,
        }
    }
}

impl RetryConfig {
    /// Set the retry budget.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the backoff shape.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the base delay.
    #[must_use]
    pub const fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Cap each delay.
    #[must_use]
    pub const fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Retry immediately, without waiting.
    #[must_use]
    pub const fn without_delay(self) -> Self {
        self.with_base_delay(Duration::ZERO)
    }

    /// Delay before retry number `retry` (1-based).
    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        if self.base_delay.is_zero() || retry == 0 {
            return Duration::ZERO;
        }
        let delay = match self.backoff {
            Backoff::Constant => self.base_delay,
            Backoff::Linear => self.base_delay.saturating_mul(retry),
            Backoff::Exponential => {
                let factor = 2u32.checked_pow(retry - 1).unwrap_or(u32::MAX);
                self.base_delay.saturating_mul(factor)
            }
        };
        self.max_delay.map_or(delay, |max| min(delay, max))
    }
}

/// Decides whether an attempt should be re-issued.
#[derive(Clone)]
pub struct RetryDecider {
    max_retries: u32,
    logger: Option<SharedLogger>,
}

impl std::fmt::Debug for RetryDecider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryDecider")
            .field("max_retries", &self.max_retries)
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

impl RetryDecider {
    /// Create a decider with the given budget.
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            logger: None,
        }
    }

    /// Log a warning for every retry taken.
    #[must_use]
    pub fn with_logger(mut self, logger: Option<SharedLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Retry budget.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Returns `true` if the attempt numbered `retries` (0-based) should be
    /// followed by another one.
    ///
    /// Logs a warning with status (`0` without response), URI and method
    /// whenever it says yes.
    pub fn decide(
        &self,
        retries: u32,
        request: &Request,
        outcome: Result<&Response, &Error>,
    ) -> bool {
        let status = outcome.map_or(0, Response::status);
        let retryable = match outcome {
            Ok(response) => response.status() >= SERVER_ERROR_THRESHOLD,
            Err(error) => error.is_transport(),
        };
        let retry_needed = retries < self.max_retries && retryable;

        if retry_needed {
            emit(
                self.logger.as_ref(),
                LogLevel::Warn,
                &format!("Request retry ({retries})"),
                &[
                    ("status", status.to_string()),
                    ("uri", request.url().to_string()),
                    ("method", request.method().to_string()),
                ],
            );
        }

        retry_needed
    }
}

/// Retry policy for tower's [`RetryLayer`](tower::retry::RetryLayer).
///
/// # Example
///
/// ```ignore
/// use interlay::middleware::{RetryConfig, RetryPolicy};
/// use tower::retry::RetryLayer;
/// use tower::ServiceBuilder;
///
/// let service = ServiceBuilder::new()
///     .layer(RetryLayer::new(RetryPolicy::new(RetryConfig::default())))
///     .service(transport);
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    decider: RetryDecider,
    config: RetryConfig,
    retries: u32,
}

impl RetryPolicy {
    /// Create a new retry policy.
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self {
            decider: RetryDecider::new(config.max_retries),
            config,
            retries: 0,
        }
    }

    /// Log retries to `logger`.
    #[must_use]
    pub fn with_logger(mut self, logger: Option<SharedLogger>) -> Self {
        self.decider = self.decider.with_logger(logger);
        self
    }
}

impl Policy<Request, Response, Error> for RetryPolicy {
    type Future = Pin<Box<dyn Future<Output = ()> + Send>>;

    fn retry(
        &mut self,
        req: &mut Request,
        result: &mut Result<Response, Error>,
    ) -> Option<Self::Future> {
        if !self.decider.decide(self.retries, req, result.as_ref()) {
            return None;
        }

        self.retries += 1;
        let delay = self.config.delay(self.retries);
        if delay.is_zero() {
            Some(Box::pin(future::ready(())))
        } else {
            Some(Box::pin(tokio::time::sleep(delay)))
        }
    }

    fn clone_request(&mut self, req: &Request) -> Option<Request> {
        Some(req.clone())
    }
}
