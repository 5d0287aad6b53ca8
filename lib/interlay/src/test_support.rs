//! Test doubles shared by the unit tests.

use std::collections::VecDeque;
use std::future::{Future, Ready, ready};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use interlay_core::{CacheEntry, CacheStore, Headers, StoreError};
use tower::Service;

use crate::logger::{LogLevel, Logger};
use crate::{Error, Method, Request, Response, Result};

/// GET request for `url`.
pub(crate) fn get(url: &str) -> Request {
    Request::builder(Method::Get, url::Url::parse(url).expect("test url")).build()
}

/// Innermost handler replaying a fixed script of outcomes.
///
/// Once the script runs out every call answers `200` with an empty body.
#[derive(Clone, Default)]
pub(crate) struct ScriptedTransport {
    script: Arc<Mutex<VecDeque<Result<Response>>>>,
    requests: Arc<Mutex<Vec<Request>>>,
}

impl ScriptedTransport {
    pub(crate) fn new(script: impl IntoIterator<Item = Result<Response>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into_iter().collect())),
            requests: Arc::default(),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.requests.lock().expect("requests").len()
    }

    pub(crate) fn requests(&self) -> Vec<Request> {
        self.requests.lock().expect("requests").clone()
    }
}

impl Service<Request> for ScriptedTransport {
    type Response = Response;
    type Error = Error;
    type Future = Ready<Result<Response>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        self.requests.lock().expect("requests").push(request);
        let outcome = self
            .script
            .lock()
            .expect("script")
            .pop_front()
            .unwrap_or_else(|| Ok(Response::new(200, Headers::new(), "")));
        ready(outcome)
    }
}

/// One entry captured by [`RecordingLogger`].
#[derive(Debug, Clone)]
pub(crate) struct Record {
    pub(crate) level: LogLevel,
    pub(crate) message: String,
    pub(crate) context: Vec<(&'static str, String)>,
}

impl Record {
    pub(crate) fn context_value(&self, key: &str) -> Option<&str> {
        self.context
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Logger keeping every entry in memory.
#[derive(Debug, Default)]
pub(crate) struct RecordingLogger {
    records: Mutex<Vec<Record>>,
}

impl RecordingLogger {
    pub(crate) fn shared() -> Arc<Self> {
        Arc::default()
    }

    pub(crate) fn records(&self) -> Vec<Record> {
        self.records.lock().expect("records").clone()
    }

    pub(crate) fn count(&self, level: LogLevel) -> usize {
        self.records()
            .iter()
            .filter(|record| record.level == level)
            .count()
    }
}

impl Logger for RecordingLogger {
    fn log(&self, level: LogLevel, message: &str, context: &[(&'static str, String)]) {
        self.records.lock().expect("records").push(Record {
            level,
            message: message.to_string(),
            context: context.to_vec(),
        });
    }
}

#[derive(Debug)]
enum Mode {
    Serving(CacheEntry),
    FailingReads,
    FailingWrites,
}

/// Store with scripted behavior and a write counter.
#[derive(Debug)]
pub(crate) struct FlakyStore {
    mode: Mode,
    writes: AtomicUsize,
}

impl FlakyStore {
    fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            writes: AtomicUsize::new(0),
        }
    }

    /// Always returns `entry`, accepts every write.
    pub(crate) fn serving(entry: CacheEntry) -> Self {
        Self::with_mode(Mode::Serving(entry))
    }

    /// Every lookup fails.
    pub(crate) fn failing_reads() -> Self {
        Self::with_mode(Mode::FailingReads)
    }

    /// Lookups miss, every write fails.
    pub(crate) fn failing_writes() -> Self {
        Self::with_mode(Mode::FailingWrites)
    }

    /// Number of write attempts.
    pub(crate) fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl CacheStore for FlakyStore {
    fn get(
        &self,
        _key: &str,
    ) -> impl Future<Output = std::result::Result<Option<CacheEntry>, StoreError>> + Send {
        let outcome = match &self.mode {
            Mode::Serving(entry) => Ok(Some(entry.clone())),
            Mode::FailingReads => Err(StoreError::unavailable("read refused")),
            Mode::FailingWrites => Ok(None),
        };
        ready(outcome)
    }

    fn put(
        &self,
        _key: &str,
        _entry: CacheEntry,
    ) -> impl Future<Output = std::result::Result<(), StoreError>> + Send {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let outcome = match self.mode {
            Mode::FailingWrites => Err(StoreError::unavailable("write refused")),
            Mode::Serving(_) | Mode::FailingReads => Ok(()),
        };
        ready(outcome)
    }
}
