//! Middleware pipeline around a transport.
//!
//! A [`Pipeline`] is built from layers registered on a [`PipelineBuilder`].
//! The first registered layer is the outermost one: it sees the request
//! first and the outcome last. The transport sits innermost.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use interlay_core::CacheStore;
use tower::util::BoxCloneService;
use tower::retry::RetryLayer;
use tower::{Layer, Service, ServiceExt};

use crate::logger::SharedLogger;
use crate::middleware::{
    CacheConfig, CacheLayer, LogConfig, LogLayer, RetryConfig, RetryPolicy, UserAgentLayer,
};
use crate::{Error, HttpClient, Request, Response, Result};

#[cfg(feature = "hyper-transport")]
use crate::{config::TransportConfig, transport::HyperTransport};

// ============================================================================
// Type-Erased Service for Middleware Composition
// ============================================================================

/// Type-erased handler.
///
/// Lets the builder stack arbitrary tower layers without exposing their
/// nested generic types.
pub type BoxedService = BoxCloneService<Request, Response, Error>;

/// Future returned by a [`Pipeline`] call.
pub type ServiceFuture = Pin<Box<dyn Future<Output = Result<Response>> + Send + 'static>>;

type LayerFn = Arc<dyn Fn(BoxedService) -> BoxedService + Send + Sync>;

/// Thread-safe wrapper for `BoxedService`.
///
/// The mutex only guards cloning. Each call drives its own clone to
/// readiness before sending.
#[derive(Clone)]
struct SyncService {
    inner: Arc<Mutex<BoxedService>>,
}

impl SyncService {
    fn new(service: BoxedService) -> Self {
        Self {
            inner: Arc::new(Mutex::new(service)),
        }
    }

    fn call(&self, request: Request) -> ServiceFuture {
        // Lock, clone the service, and release the lock immediately
        let mut service = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();

        Box::pin(async move { service.ready().await?.call(request).await })
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Composed handler: every registered middleware around a transport.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use interlay::prelude::*;
///
/// let pipeline = Pipeline::builder()
///     .logger(TracingLogger::shared())
///     .with_logging(LogConfig::default().with_credentials(["s3cr3t"]))?
///     .with_retry(RetryConfig::default())
///     .with_cache(Arc::new(MemoryStore::new()), CacheConfig::default())
///     .build_hyper();
///
/// let response = pipeline.execute(request).await?;
/// ```
#[derive(Clone)]
pub struct Pipeline {
    service: SyncService,
    layers: usize,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("layers", &self.layers)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Create a new pipeline builder.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Number of middlewares around the transport.
    #[must_use]
    pub const fn layers(&self) -> usize {
        self.layers
    }
}

impl HttpClient for Pipeline {
    async fn execute(&self, request: Request) -> Result<Response> {
        self.service.call(request).await
    }
}

impl Service<Request> for Pipeline {
    type Response = Response;
    type Error = Error;
    type Future = ServiceFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        self.service.call(request)
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`Pipeline`].
///
/// Layers are applied in registration order, outermost first. The optional
/// logger is handed to every middleware built by the `with_*` helpers.
#[derive(Default)]
pub struct PipelineBuilder {
    layers: Vec<LayerFn>,
    logger: Option<SharedLogger>,
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("layers", &self.layers.len())
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

impl PipelineBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Logger used by the middlewares added afterwards.
    #[must_use]
    pub fn logger(mut self, logger: SharedLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Add a custom tower layer.
    ///
    /// The layer must produce a service with matching request/response
    /// types that is `Clone + Send + 'static`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use tower::limit::ConcurrencyLimitLayer;
    ///
    /// let pipeline = Pipeline::builder()
    ///     .layer(ConcurrencyLimitLayer::new(10))
    ///     .build_hyper();
    /// ```
    #[must_use]
    pub fn layer<L>(mut self, layer: L) -> Self
    where
        L: Layer<BoxedService> + Send + Sync + 'static,
        L::Service: Service<Request, Response = Response, Error = Error> + Clone + Send + 'static,
        <L::Service as Service<Request>>::Future: Send + 'static,
    {
        self.layers.push(Arc::new(move |service: BoxedService| {
            BoxCloneService::new(layer.layer(service))
        }));
        self
    }

    /// Add the response cache middleware backed by `store`.
    #[must_use]
    pub fn with_cache<St: CacheStore>(self, store: Arc<St>, config: CacheConfig) -> Self {
        let layer = CacheLayer::new(store)
            .with_config(config)
            .with_logger(self.logger.clone());
        self.layer(layer)
    }

    /// Add the retry middleware.
    #[must_use]
    pub fn with_retry(self, config: RetryConfig) -> Self {
        let policy = RetryPolicy::new(config).with_logger(self.logger.clone());
        self.layer(RetryLayer::new(policy))
    }

    /// Add the logging middleware.
    ///
    /// Without a logger the pipeline is left unchanged.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if the credential table cannot be compiled.
    pub fn with_logging(self, config: LogConfig) -> Result<Self> {
        let Some(logger) = self.logger.clone() else {
            return Ok(self);
        };
        let layer = LogLayer::from_config(&config, logger)?;
        Ok(self.layer(layer))
    }

    /// Add the user-agent rotation middleware.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if `pool` is empty.
    pub fn with_user_agents<I, S>(self, pool: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(self.layer(UserAgentLayer::new(pool)?))
    }

    /// Wrap `transport` with every registered layer.
    #[must_use]
    pub fn build<T>(self, transport: T) -> Pipeline
    where
        T: Service<Request, Response = Response, Error = Error> + Clone + Send + 'static,
        T::Future: Send + 'static,
    {
        let layers = self.layers.len();
        let mut service: BoxedService = BoxCloneService::new(transport);

        // Wrap innermost first so the first registered layer ends up outermost
        for layer_fn in self.layers.iter().rev() {
            service = layer_fn(service);
        }

        Pipeline {
            service: SyncService::new(service),
            layers,
        }
    }

    /// Build around a [`HyperTransport`] with default settings.
    #[cfg(feature = "hyper-transport")]
    #[must_use]
    pub fn build_hyper(self) -> Pipeline {
        self.build(HyperTransport::default())
    }

    /// Build around a [`HyperTransport`] with `config`.
    #[cfg(feature = "hyper-transport")]
    #[must_use]
    pub fn build_hyper_with_config(self, config: TransportConfig) -> Pipeline {
        self.build(HyperTransport::new(config))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert2::check;
    use interlay_core::Headers;
    use tower::limit::ConcurrencyLimitLayer;

    use super::*;
    use crate::MemoryStore;
    use crate::logger::LogLevel;
    use crate::middleware::DEBUG_HEADER;
    use crate::test_support::{RecordingLogger, ScriptedTransport, get};

    /// Appends its name to an `X-Trace` header on the way in and to the
    /// response's `X-Trace` on the way out.
    #[derive(Clone)]
    struct Tag(&'static str);

    impl<S> Layer<S> for Tag {
        type Service = Tagged<S>;

        fn layer(&self, inner: S) -> Self::Service {
            Tagged { inner, name: self.0 }
        }
    }

    #[derive(Clone)]
    struct Tagged<S> {
        inner: S,
        name: &'static str,
    }

    impl<S> Service<Request> for Tagged<S>
    where
        S: Service<Request, Response = Response, Error = Error> + Clone + Send + 'static,
        S::Future: Send,
    {
        type Response = Response;
        type Error = Error;
        type Future = ServiceFuture;

        fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
            self.inner.poll_ready(cx)
        }

        fn call(&mut self, mut request: Request) -> Self::Future {
            let name = self.name;
            request.headers_mut().append("X-Trace", name);
            let clone = self.inner.clone();
            let mut inner = std::mem::replace(&mut self.inner, clone);
            Box::pin(async move {
                let mut response = inner.call(request).await?;
                response.headers_mut().append("X-Trace", name);
                Ok(response)
            })
        }
    }

    fn ok() -> Result<Response> {
        Ok(Response::new(200, Headers::new(), "ok"))
    }

    #[tokio::test]
    async fn first_registered_layer_is_outermost() {
        let transport = ScriptedTransport::new([ok()]);
        let pipeline = Pipeline::builder()
            .layer(Tag("outer"))
            .layer(Tag("middle"))
            .layer(Tag("inner"))
            .build(transport.clone());

        let response = pipeline.execute(get("https://example.com/")).await.expect("response");

        let sent = transport.requests();
        let inbound = sent.first().map(|r| r.headers().get_all("X-Trace").to_vec());
        check!(inbound == Some(vec!["outer".to_string(), "middle".to_string(), "inner".to_string()]));
        check!(response.headers().get_all("X-Trace") == ["inner", "middle", "outer"]);
        check!(pipeline.layers() == 3);
    }

    #[tokio::test]
    async fn empty_pipeline_is_the_transport() {
        let transport = ScriptedTransport::new([ok()]);
        let pipeline = Pipeline::builder().build(transport.clone());

        let response = pipeline.execute(get("https://example.com/")).await.expect("response");

        check!(response.body().as_ref() == b"ok");
        check!(transport.calls() == 1);
        check!(pipeline.layers() == 0);
    }

    #[tokio::test]
    async fn logging_without_logger_adds_nothing() {
        let pipeline = Pipeline::builder()
            .with_logging(LogConfig::default())
            .expect("logging")
            .build(ScriptedTransport::new([ok()]));

        check!(pipeline.layers() == 0);
    }

    #[test]
    fn empty_user_agent_pool_fails_at_build_time() {
        let result = Pipeline::builder().with_user_agents(Vec::<String>::new());
        check!(matches!(result, Err(Error::Configuration(_))));
    }

    #[tokio::test]
    async fn cache_outside_retry_stores_the_final_outcome() {
        let transport = ScriptedTransport::new([
            Ok(Response::new(503, Headers::new(), "")),
            ok(),
        ]);
        let logger = RecordingLogger::shared();
        let shared: SharedLogger = logger.clone();
        let pipeline = Pipeline::builder()
            .logger(shared)
            .with_cache(
                Arc::new(MemoryStore::new()),
                CacheConfig::default().with_debug(true),
            )
            .with_retry(RetryConfig::default().with_base_delay(Duration::ZERO))
            .build(transport.clone());

        let first = pipeline.execute(get("https://example.com/")).await.expect("first");
        let second = pipeline.execute(get("https://example.com/")).await.expect("second");

        check!(first.status() == 200);
        check!(first.header(DEBUG_HEADER) == Some("MISS"));
        check!(second.header(DEBUG_HEADER) == Some("HIT"));
        check!(transport.calls() == 2);
        check!(logger.count(LogLevel::Warn) == 1);
    }

    #[tokio::test]
    async fn concurrent_calls_are_isolated() {
        let transport = ScriptedTransport::new([]);
        let pipeline = Pipeline::builder()
            .with_user_agents(["a", "b"])
            .expect("agents")
            .build(transport.clone());

        let calls = (0..8).map(|i| {
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                pipeline
                    .execute(get(&format!("https://example.com/{i}")))
                    .await
            })
        });
        for handle in calls {
            let response = handle.await.expect("join").expect("response");
            check!(response.status() == 200);
        }

        check!(transport.calls() == 8);
    }

    #[tokio::test]
    async fn concurrency_limit_layer_composes_with_middlewares() {
        let transport = ScriptedTransport::new([]);
        let logger = RecordingLogger::shared();
        let shared: SharedLogger = logger.clone();
        let pipeline = Pipeline::builder()
            .logger(shared)
            .with_logging(LogConfig::default())
            .expect("logging")
            .with_cache(Arc::new(MemoryStore::new()), CacheConfig::default())
            .layer(ConcurrencyLimitLayer::new(1))
            .build(transport.clone());

        let calls = (0..4).map(|i| {
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                pipeline
                    .execute(get(&format!("https://example.com/{i}")))
                    .await
            })
        });
        for handle in calls {
            let response = handle.await.expect("join").expect("response");
            check!(response.status() == 200);
        }

        let again = pipeline.execute(get("https://example.com/0")).await.expect("hit");
        check!(again.status() == 200);
        check!(transport.calls() == 4);
        check!(pipeline.layers() == 3);
    }
}
