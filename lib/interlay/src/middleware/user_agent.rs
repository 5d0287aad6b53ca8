//! User-agent rotation middleware.
//!
//! Each request gets a `User-Agent` drawn uniformly at random from a fixed
//! pool, replacing whatever value the caller set.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use tower::{Layer, Service};

use crate::{Error, Request, Result};

/// Header set by [`UserAgent`].
pub const USER_AGENT_HEADER: &str = "User-Agent";

/// Source of pool indices.
///
/// Not cryptographically secure; only used to spread traffic across agents.
#[derive(Clone, Default)]
pub enum RandomSource {
    /// Process-wide `fastrand` generator.
    #[default]
    Real,
    /// Dedicated generator with a fixed seed; repeatable across runs.
    Seeded(Arc<Mutex<fastrand::Rng>>),
    /// Caller-supplied picker receiving the pool length.
    Function(Arc<dyn Fn(usize) -> usize + Send + Sync>),
}

impl fmt::Debug for RandomSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Real => write!(f, "Real"),
            Self::Seeded(_) => write!(f, "Seeded"),
            Self::Function(_) => write!(f, "Function"),
        }
    }
}

impl RandomSource {
    /// Deterministic source seeded with `seed`.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self::Seeded(Arc::new(Mutex::new(fastrand::Rng::with_seed(seed))))
    }

    /// Source delegating to `pick`. Out-of-range picks are clamped to the
    /// last index.
    pub fn from_fn<F>(pick: F) -> Self
    where
        F: Fn(usize) -> usize + Send + Sync + 'static,
    {
        Self::Function(Arc::new(pick))
    }

    /// Index in `0..len`; `0` when `len` is zero.
    #[must_use]
    pub fn index(&self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        match self {
            Self::Real => fastrand::usize(..len),
            Self::Seeded(rng) => rng
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .usize(..len),
            Self::Function(pick) => pick(len).min(len - 1),
        }
    }
}

/// Layer that rotates the `User-Agent` header.
///
/// # Example
///
/// ```ignore
/// use interlay::middleware::UserAgentLayer;
/// use tower::ServiceBuilder;
///
/// let service = ServiceBuilder::new()
///     .layer(UserAgentLayer::new(["agent/1", "agent/2"])?)
///     .service(transport);
/// ```
#[derive(Debug, Clone)]
pub struct UserAgentLayer {
    pool: Arc<[String]>,
    random: RandomSource,
}

impl UserAgentLayer {
    /// Create a layer drawing from `pool`.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if `pool` is empty.
    pub fn new<I, S>(pool: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pool: Arc<[String]> = pool.into_iter().map(Into::into).collect();
        if pool.is_empty() {
            return Err(Error::configuration("user agent pool is empty"));
        }
        Ok(Self {
            pool,
            random: RandomSource::default(),
        })
    }

    /// Replace the random source.
    #[must_use]
    pub fn with_random(mut self, random: RandomSource) -> Self {
        self.random = random;
        self
    }

    /// Configured agents.
    #[must_use]
    pub fn pool(&self) -> &[String] {
        &self.pool
    }
}

impl<S> Layer<S> for UserAgentLayer {
    type Service = UserAgent<S>;

    fn layer(&self, inner: S) -> Self::Service {
        UserAgent {
            inner,
            pool: Arc::clone(&self.pool),
            random: self.random.clone(),
        }
    }
}

/// Service that sets a random `User-Agent` on every request.
#[derive(Debug, Clone)]
pub struct UserAgent<S> {
    inner: S,
    pool: Arc<[String]>,
    random: RandomSource,
}

impl<S> Service<Request> for UserAgent<S>
where
    S: Service<Request>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request) -> Self::Future {
        let index = self.random.index(self.pool.len());
        if let Some(agent) = self.pool.get(index) {
            request
                .headers_mut()
                .insert(USER_AGENT_HEADER, agent.as_str());
        }
        self.inner.call(request)
    }
}
