//! HTTP transport using hyper-util.
//!
//! [`HyperTransport`] is the innermost handler of a pipeline: it turns a
//! [`Request`] into a wire exchange and maps every failure onto [`Error`].

use std::error::Error as StdError;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use tower_service::Service;

use crate::{
    Error, Headers, Request, Response, Result, config::TransportConfig,
    connector::https_connector,
};

/// Pooled HTTP/1.1 and HTTP/2 client with rustls.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct HyperTransport {
    inner: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    config: TransportConfig,
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransport")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}

impl HyperTransport {
    /// Create a transport with the given configuration.
    #[must_use]
    pub fn new(config: TransportConfig) -> Self {
        let connector = https_connector(config.connect_timeout);

        let inner = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_idle_per_host)
            .build(connector);

        Self { inner, config }
    }

    /// Get the transport configuration.
    #[must_use]
    pub const fn config(&self) -> &TransportConfig {
        &self.config
    }

    fn build_hyper_request(request: Request) -> Result<http::Request<Full<Bytes>>> {
        let (method, url, headers, body) = request.into_parts();

        let method = http::Method::from_bytes(method.as_str().as_bytes())
            .map_err(|e| Error::invalid_request(e.to_string()))?;
        let mut builder = http::Request::builder().method(method).uri(url.as_str());

        for (name, values) in headers.iter() {
            for value in values {
                builder = builder.header(name, value.as_str());
            }
        }

        builder
            .body(Full::new(body))
            .map_err(|e| Error::invalid_request(e.to_string()))
    }

    async fn execute(&self, request: Request) -> Result<Response> {
        let hyper_request = Self::build_hyper_request(request)?;
        let timeout = self.config.timeout;

        let exchange = async {
            let response = self
                .inner
                .request(hyper_request)
                .await
                .map_err(map_hyper_error)?;

            let status = response.status();
            let version = version_label(response.version());
            let headers = Headers::from(response.headers());
            let reason = reason_phrase(response.extensions());

            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|e| Error::connection(e.to_string()))?
                .to_bytes();

            let mut response = Response::new(status.as_u16(), headers, body).with_version(version);
            if let Some(reason) = reason {
                response = response.with_reason(reason);
            }
            Ok::<_, Error>(response)
        };

        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| Error::Timeout)?
    }
}

/// Reason phrase sent by the server when it differs from the canonical one.
///
/// Non UTF-8 phrases are ignored.
fn reason_phrase(extensions: &http::Extensions) -> Option<String> {
    let reason = extensions.get::<hyper::ext::ReasonPhrase>()?;
    std::str::from_utf8(reason.as_bytes()).ok().map(str::to_string)
}

/// Protocol version as written after `HTTP/`.
fn version_label(version: http::Version) -> &'static str {
    match version {
        http::Version::HTTP_09 => "0.9",
        http::Version::HTTP_10 => "1.0",
        http::Version::HTTP_2 => "2",
        http::Version::HTTP_3 => "3",
        _ => "1.1",
    }
}

fn is_timed_out(err: &(dyn StdError + 'static)) -> bool {
    let mut source = Some(err);
    while let Some(current) = source {
        if current
            .downcast_ref::<io::Error>()
            .is_some_and(|io| io.kind() == io::ErrorKind::TimedOut)
        {
            return true;
        }
        source = current.source();
    }
    false
}

#[allow(clippy::needless_pass_by_value)]
fn map_hyper_error(err: hyper_util::client::legacy::Error) -> Error {
    let msg = match err.source() {
        Some(source) => format!("{err}: {source}"),
        None => err.to_string(),
    };

    if is_timed_out(&err) {
        return Error::Timeout;
    }

    let lower = msg.to_ascii_lowercase();
    if lower.contains("ssl") || lower.contains("tls") || lower.contains("certificate") {
        return Error::tls(msg);
    }

    Error::connection(msg)
}

impl Service<Request> for HyperTransport {
    type Response = Response;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send + 'static>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let transport = self.clone();
        Box::pin(async move { transport.execute(request).await })
    }
}
