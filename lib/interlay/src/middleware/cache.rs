//! Response cache middleware.
//!
//! Looks up a [`CacheStore`] before calling the inner service and serves the
//! stored response on a hit. On a miss the real response is stored with the
//! configured TTL. Store failures are logged and never reach the caller.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use interlay_core::{CacheEntry, CacheStore};
use tower::{Layer, Service};

use crate::cache_key::cache_key;
use crate::logger::{LogLevel, SharedLogger, emit};
use crate::{Error, Request, Response, Result, ttl};

/// Debug header telling whether a response came from the cache.
pub const DEBUG_HEADER: &str = "X-Guzzle-Cache";
/// [`DEBUG_HEADER`] value on a cache hit.
pub const DEBUG_HEADER_HIT: &str = "HIT";
/// [`DEBUG_HEADER`] value on a miss that was stored.
pub const DEBUG_HEADER_MISS: &str = "MISS";

/// Default entry lifetime: one hour (`PT1H`).
pub const DEFAULT_TTL: Duration = Duration::from_secs(3_600);

/// Configuration for the cache middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Lifetime of stored entries, turned into an absolute expiry at write time.
    pub ttl: Duration,
    /// Attach [`DEBUG_HEADER`] to responses.
    pub debug: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            debug: false,
        }
    }
}

impl CacheConfig {
    /// Set the entry lifetime.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the entry lifetime from an ISO-8601 duration such as `"PT1H"`.
    pub fn with_iso8601_ttl(self, ttl: &str) -> Result<Self> {
        Ok(self.with_ttl(ttl::parse_iso8601(ttl)?))
    }

    /// Enable or disable the debug header.
    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    fn expiry_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        TimeDelta::from_std(self.ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Layer that adds response caching.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use interlay::middleware::{CacheConfig, CacheLayer};
/// use interlay::MemoryStore;
/// use tower::ServiceBuilder;
///
/// let service = ServiceBuilder::new()
///     .layer(CacheLayer::new(Arc::new(MemoryStore::new())).with_config(CacheConfig::default()))
///     .service(transport);
/// ```
pub struct CacheLayer<St> {
    store: Arc<St>,
    config: CacheConfig,
    logger: Option<SharedLogger>,
}

impl<St> CacheLayer<St> {
    /// Create a cache layer over `store` with the default configuration.
    pub fn new(store: Arc<St>) -> Self {
        Self {
            store,
            config: CacheConfig::default(),
            logger: None,
        }
    }

    /// Replace the configuration.
    #[must_use]
    pub fn with_config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Log cache events to `logger`.
    #[must_use]
    pub fn with_logger(mut self, logger: Option<SharedLogger>) -> Self {
        self.logger = logger;
        self
    }
}

impl<St> Clone for CacheLayer<St> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config,
            logger: self.logger.clone(),
        }
    }
}

impl<St> fmt::Debug for CacheLayer<St> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheLayer")
            .field("config", &self.config)
            .field("logger", &self.logger.is_some())
            .finish_non_exhaustive()
    }
}

impl<S, St> Layer<S> for CacheLayer<St> {
    type Service = Cache<S, St>;

    fn layer(&self, inner: S) -> Self::Service {
        Cache {
            inner,
            store: Arc::clone(&self.store),
            config: self.config,
            logger: self.logger.clone(),
        }
    }
}

/// Service that serves and stores responses through a [`CacheStore`].
pub struct Cache<S, St> {
    inner: S,
    store: Arc<St>,
    config: CacheConfig,
    logger: Option<SharedLogger>,
}

impl<S: Clone, St> Clone for Cache<S, St> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            store: Arc::clone(&self.store),
            config: self.config,
            logger: self.logger.clone(),
        }
    }
}

impl<S, St> fmt::Debug for Cache<S, St> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Attach the debug header when enabled. A rejected header leaves the
/// response as it was.
fn mark(
    mut response: Response,
    value: &str,
    debug: bool,
    logger: Option<&SharedLogger>,
) -> Response {
    if !debug {
        return response;
    }
    if let Err(err) = response.headers_mut().try_insert(DEBUG_HEADER, value) {
        emit(logger, LogLevel::Error, &err.to_string(), &[]);
    }
    response
}

impl<S, St> Service<Request> for Cache<S, St>
where
    S: Service<Request, Response = Response, Error = Error> + Clone + Send + 'static,
    S::Future: Send,
    St: CacheStore,
{
    type Response = Response;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        // Keep the readied service for this call
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        if !request.options().cache {
            return Box::pin(async move { inner.call(request).await });
        }

        let store = Arc::clone(&self.store);
        let config = self.config;
        let logger = self.logger.clone();

        Box::pin(async move {
            let logger = logger.as_ref();
            let key = cache_key(&request);
            let uri = request.url().to_string();

            match store.get(&key).await {
                Ok(Some(entry)) if !entry.is_expired() => {
                    emit(
                        logger,
                        LogLevel::Info,
                        "Request result is taken from cache",
                        &[("uri", uri)],
                    );
                    return Ok(mark(
                        entry.into_response(),
                        DEBUG_HEADER_HIT,
                        config.debug,
                        logger,
                    ));
                }
                Ok(_) => {}
                Err(err) => {
                    emit(logger, LogLevel::Error, &err.to_string(), &[("uri", uri)]);
                    return inner.call(request).await;
                }
            }

            let response = inner.call(request).await?;

            let entry = CacheEntry::from_response(&response, config.expiry_from(Utc::now()));
            match store.put(&key, entry).await {
                Ok(()) => {
                    emit(
                        logger,
                        LogLevel::Info,
                        "Request result is saved to cache",
                        &[("uri", uri)],
                    );
                    Ok(mark(response, DEBUG_HEADER_MISS, config.debug, logger))
                }
                Err(err) => {
                    emit(logger, LogLevel::Error, &err.to_string(), &[("uri", uri)]);
                    Ok(response)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use assert2::check;
    use interlay_core::{Headers, StoreError};
    use tower::ServiceExt;
    use tower::limit::ConcurrencyLimitLayer;

    use super::*;
    use crate::MemoryStore;
    use crate::test_support::{FlakyStore, RecordingLogger, ScriptedTransport, get};

    fn ok(body: &'static str) -> Result<Response> {
        let headers: Headers = [("Content-Type", "text/plain")].into_iter().collect();
        Ok(Response::new(200, headers, body))
    }

    fn cached<St: CacheStore>(
        store: Arc<St>,
        config: CacheConfig,
        transport: &ScriptedTransport,
        logger: Option<SharedLogger>,
    ) -> Cache<ScriptedTransport, St> {
        CacheLayer::new(store)
            .with_config(config)
            .with_logger(logger)
            .layer(transport.clone())
    }

    #[test]
    fn default_config() {
        let config = CacheConfig::default();
        check!(config.ttl == Duration::from_secs(3_600));
        check!(!config.debug);
    }

    #[test]
    fn iso8601_ttl() {
        let config = CacheConfig::default().with_iso8601_ttl("PT5M").expect("ttl");
        check!(config.ttl == Duration::from_secs(300));
        check!(CacheConfig::default().with_iso8601_ttl("5 minutes").is_err());
    }

    #[test]
    fn expiry_saturates() {
        let config = CacheConfig::default().with_ttl(Duration::MAX);
        check!(config.expiry_from(Utc::now()) == DateTime::<Utc>::MAX_UTC);
    }

    #[tokio::test]
    async fn second_call_is_served_from_cache() {
        let transport = ScriptedTransport::new([ok("first"), ok("second")]);
        let store = Arc::new(MemoryStore::new());
        let mut service = cached(Arc::clone(&store), CacheConfig::default(), &transport, None);

        let first = service.call(get("https://example.com/a")).await.expect("first");
        let second = service.call(get("https://example.com/a")).await.expect("second");

        check!(transport.calls() == 1);
        check!(second == first);
        check!(second.body().as_ref() == b"first");
        check!(store.len() == 1);
    }

    #[tokio::test]
    async fn hit_restores_every_field() {
        let headers: Headers = [("Set-Cookie", "a=1"), ("Set-Cookie", "b=2")]
            .into_iter()
            .collect();
        let original = Response::new(418, headers, "teapot")
            .with_reason("Short And Stout")
            .with_version("2");
        let transport = ScriptedTransport::new([Ok(original.clone())]);
        let mut service = cached(
            Arc::new(MemoryStore::new()),
            CacheConfig::default(),
            &transport,
            None,
        );

        let _ = service.call(get("https://example.com/tea")).await.expect("miss");
        let hit = service.call(get("https://example.com/tea")).await.expect("hit");

        check!(hit == original);
    }

    #[tokio::test]
    async fn distinct_requests_do_not_share_entries() {
        let transport = ScriptedTransport::new([ok("a"), ok("b")]);
        let mut service = cached(
            Arc::new(MemoryStore::new()),
            CacheConfig::default(),
            &transport,
            None,
        );

        let a = service.call(get("https://example.com/a")).await.expect("a");
        let b = service.call(get("https://example.com/b")).await.expect("b");

        check!(transport.calls() == 2);
        check!(a.body().as_ref() == b"a");
        check!(b.body().as_ref() == b"b");
    }

    #[tokio::test]
    async fn opt_out_bypasses_store() {
        let transport = ScriptedTransport::new([ok("1"), ok("2")]);
        let store = Arc::new(MemoryStore::new());
        let mut service = cached(
            Arc::clone(&store),
            CacheConfig::default().with_debug(true),
            &transport,
            None,
        );

        let mut request = get("https://example.com/a");
        request.options_mut().cache = false;
        let first = service.call(request.clone()).await.expect("first");
        let second = service.call(request).await.expect("second");

        check!(transport.calls() == 2);
        check!(store.is_empty());
        check!(first.header(DEBUG_HEADER).is_none());
        check!(second.body().as_ref() == b"2");
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss() {
        let transport = ScriptedTransport::new([ok("fresh")]);
        let store = Arc::new(MemoryStore::new());
        let request = get("https://example.com/a");
        let stale = CacheEntry::from_response(
            &Response::new(200, Headers::new(), "stale"),
            Utc::now() - TimeDelta::seconds(1),
        );
        store.put(&cache_key(&request), stale).await.expect("seed");

        let mut service = cached(Arc::clone(&store), CacheConfig::default(), &transport, None);
        let response = service.call(request).await.expect("response");

        check!(transport.calls() == 1);
        check!(response.body().as_ref() == b"fresh");
    }

    #[tokio::test]
    async fn expired_entry_returned_by_store_is_a_miss() {
        let transport = ScriptedTransport::new([ok("fresh")]);
        let stale = CacheEntry::from_response(
            &Response::new(200, Headers::new(), "stale"),
            Utc::now() - TimeDelta::seconds(1),
        );
        let store = Arc::new(FlakyStore::serving(stale));
        let mut service = cached(store, CacheConfig::default(), &transport, None);

        let response = service.call(get("https://example.com/a")).await.expect("response");

        check!(transport.calls() == 1);
        check!(response.body().as_ref() == b"fresh");
    }

    #[tokio::test]
    async fn debug_headers_mark_hit_and_miss() {
        let transport = ScriptedTransport::new([ok("body")]);
        let mut service = cached(
            Arc::new(MemoryStore::new()),
            CacheConfig::default().with_debug(true),
            &transport,
            None,
        );

        let miss = service.call(get("https://example.com/a")).await.expect("miss");
        let hit = service.call(get("https://example.com/a")).await.expect("hit");

        check!(miss.header(DEBUG_HEADER) == Some(DEBUG_HEADER_MISS));
        check!(hit.header(DEBUG_HEADER) == Some(DEBUG_HEADER_HIT));
    }

    #[tokio::test]
    async fn no_debug_headers_by_default() {
        let transport = ScriptedTransport::new([ok("body")]);
        let mut service = cached(
            Arc::new(MemoryStore::new()),
            CacheConfig::default(),
            &transport,
            None,
        );

        let miss = service.call(get("https://example.com/a")).await.expect("miss");
        let hit = service.call(get("https://example.com/a")).await.expect("hit");

        check!(miss.header(DEBUG_HEADER).is_none());
        check!(hit.header(DEBUG_HEADER).is_none());
    }

    #[tokio::test]
    async fn write_failure_returns_response_unmodified() {
        let transport = ScriptedTransport::new([ok("real")]);
        let logger = RecordingLogger::shared();
        let store = Arc::new(FlakyStore::failing_writes());
        let mut service = cached(
            store,
            CacheConfig::default().with_debug(true),
            &transport,
            Some(logger.clone()),
        );

        let response = service.call(get("https://example.com/a")).await.expect("response");

        check!(response.body().as_ref() == b"real");
        check!(response.header(DEBUG_HEADER).is_none());
        check!(logger.count(LogLevel::Error) == 1);
        check!(logger.count(LogLevel::Info) == 0);
    }

    #[tokio::test]
    async fn lookup_failure_passes_through() {
        let transport = ScriptedTransport::new([ok("real"), ok("again")]);
        let logger = RecordingLogger::shared();
        let store = Arc::new(FlakyStore::failing_reads());
        let mut service = cached(
            Arc::clone(&store),
            CacheConfig::default().with_debug(true),
            &transport,
            Some(logger.clone()),
        );

        let first = service.call(get("https://example.com/a")).await.expect("first");
        let second = service.call(get("https://example.com/a")).await.expect("second");

        check!(transport.calls() == 2);
        check!(first.body().as_ref() == b"real");
        check!(second.body().as_ref() == b"again");
        check!(first.header(DEBUG_HEADER).is_none());
        check!(store.writes() == 0);
        check!(logger.count(LogLevel::Error) == 2);
    }

    #[tokio::test]
    async fn transport_failure_is_not_cached() {
        let transport = ScriptedTransport::new([Err(Error::connection("refused")), ok("later")]);
        let store = Arc::new(MemoryStore::new());
        let mut service = cached(Arc::clone(&store), CacheConfig::default(), &transport, None);

        let failed = service.call(get("https://example.com/a")).await;
        check!(matches!(failed, Err(Error::Connection(_))));
        check!(store.is_empty());

        let response = service.call(get("https://example.com/a")).await.expect("response");
        check!(response.body().as_ref() == b"later");
    }

    #[tokio::test]
    async fn hit_and_store_are_logged_with_uri() {
        let transport = ScriptedTransport::new([ok("body")]);
        let logger = RecordingLogger::shared();
        let mut service = cached(
            Arc::new(MemoryStore::new()),
            CacheConfig::default(),
            &transport,
            Some(logger.clone()),
        );

        let _ = service.call(get("https://example.com/a")).await.expect("miss");
        let _ = service.call(get("https://example.com/a")).await.expect("hit");

        let records = logger.records();
        check!(records.len() == 2);
        check!(records.iter().all(|r| r.level == LogLevel::Info));
        check!(records.iter().all(|r| r.context_value("uri") == Some("https://example.com/a")));
        check!(records.first().map(|r| r.message.as_str()) == Some("Request result is saved to cache"));
        check!(records.get(1).map(|r| r.message.as_str()) == Some("Request result is taken from cache"));
    }

    #[tokio::test]
    async fn calls_reach_a_readiness_gated_inner_service() {
        let transport = ScriptedTransport::new([ok("limited"), ok("fresh")]);
        let inner = ConcurrencyLimitLayer::new(1).layer(transport.clone());
        let mut service = CacheLayer::new(Arc::new(MemoryStore::new())).layer(inner);

        for _ in 0..2 {
            let response = service
                .ready()
                .await
                .expect("ready")
                .call(get("https://example.com/a"))
                .await
                .expect("response");
            check!(response.body().as_ref() == b"limited");
        }

        let url = url::Url::parse("https://example.com/a").expect("url");
        let bypass = Request::builder(crate::Method::Get, url).cache(false).build();
        let response = service.ready().await.expect("ready").call(bypass).await.expect("bypass");

        check!(response.body().as_ref() == b"fresh");
        check!(transport.calls() == 2);
    }

    #[test]
    fn store_error_message_is_logged_verbatim() {
        let logger = RecordingLogger::shared();
        let shared: SharedLogger = logger.clone();
        let err = StoreError::unavailable("redis down");
        emit(Some(&shared), LogLevel::Error, &err.to_string(), &[]);

        check!(logger.records().first().map(|r| r.message.clone()) == Some("cache store unavailable: redis down".to_string()));
    }
}
