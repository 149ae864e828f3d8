//! Per-call dispatching: routing to registered APIs and deadline enforcement.
//!
//! Every inbound call goes through [`Deadline`] before it reaches a service. The layer resolves
//! the call's [`ApiKind`] from the registry built at construction time, rejects calls to APIs
//! that aren't registered, and bounds the handler with a single deadline: the lower of the
//! server timeout and the client's `grpc-timeout`. When the deadline passes the handler future is
//! dropped and the client gets `DEADLINE_EXCEEDED`.
//!
//! The client's `grpc-timeout` is shortened by a small margin before it is used: tonic's own
//! timers on both ends start before [`Deadline`] sees the call, and when one of them fires first
//! the client gets `CANCELLED`. A call whose deadline has already passed when it arrives is
//! answered without reaching its handler.
//!
//! The deadline is also handed to the handler as a [`CallDeadline`] request extension, so that
//! streaming handlers can bound the production of their stream.
//!
//! Calls are counted per API through the `metrics` facade, under the `grpc_server.calls` scope.

use std::collections::BTreeSet;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Future;
use http::HeaderMap;
use metrics::{
    describe_counter, describe_gauge, register_counter, register_gauge, Counter, Gauge, Label,
};
use tokio::time::Instant;
use tonic::body::BoxBody;
use tonic::Status;
use tower::{Layer, Service};
use tracing::{debug, trace, warn};

use crate::config::DEFAULT_DEADLINE_MARGIN_MILLIS;
use crate::error;
use crate::protos::{BLOCK_SERVICE, BROADCAST_SERVICE};

/// Header carrying the client's deadline.
pub const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

/// The logical APIs a server can expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ApiKind {
    /// Transaction broadcast.
    Broadcast,
    /// Committed block queries.
    Block,
}

impl ApiKind {
    /// Fully qualified gRPC service name.
    pub const fn service_name(&self) -> &'static str {
        match self {
            Self::Broadcast => BROADCAST_SERVICE,
            Self::Block => BLOCK_SERVICE,
        }
    }

    /// Methods whose calls may outlive the server timeout. Only a client deadline bounds them.
    pub const fn long_lived_methods(&self) -> &'static [&'static str] {
        match self {
            Self::Broadcast => &[],
            Self::Block => &["WatchLatestHeight"],
        }
    }

    fn from_service_name(name: &str) -> Option<Self> {
        [Self::Broadcast, Self::Block].into_iter().find(|kind| kind.service_name() == name)
    }
}

impl fmt::Display for ApiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Broadcast => f.write_str("broadcast"),
            Self::Block => f.write_str("block"),
        }
    }
}

/// The set of APIs registered on a server, fixed once the server is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiRegistry {
    apis: BTreeSet<ApiKind>,
}

impl ApiRegistry {
    /// Registers an API. Returns `false` if it was already registered.
    pub fn register(&mut self, kind: ApiKind) -> bool {
        self.apis.insert(kind)
    }

    pub fn contains(&self, kind: ApiKind) -> bool {
        self.apis.contains(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.apis.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ApiKind> + '_ {
        self.apis.iter().copied()
    }

    /// Resolves the route of a call from its request path, ie. `/<package>.<Service>/<Method>`.
    pub fn resolve(&self, path: &str) -> Option<Route> {
        let (service, method) = path.strip_prefix('/')?.split_once('/')?;
        let api = ApiKind::from_service_name(service).filter(|kind| self.contains(*kind))?;
        let long_lived = api.long_lived_methods().contains(&method);
        Some(Route { api, long_lived })
    }
}

/// Where a call is dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub api: ApiKind,
    /// Whether the server timeout is waived for the call.
    pub long_lived: bool,
}

/// The instant at which the current call must be done. Inserted into the request extensions of
/// every call that has a deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallDeadline(pub Instant);

impl CallDeadline {
    pub fn instant(&self) -> Instant {
        self.0
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.0
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid grpc-timeout header: {0:?}")]
pub struct InvalidTimeout(String);

/// Parses the client deadline from the `grpc-timeout` header.
///
/// The value is at most 8 ASCII digits followed by a unit: `H`, `M`, `S`, `m` (milliseconds),
/// `u` (microseconds) or `n` (nanoseconds).
pub fn parse_grpc_timeout(headers: &HeaderMap) -> Result<Option<Duration>, InvalidTimeout> {
    let Some(value) = headers.get(GRPC_TIMEOUT_HEADER) else { return Ok(None) };

    let invalid = || InvalidTimeout(String::from_utf8_lossy(value.as_bytes()).into_owned());
    let value = value.to_str().map_err(|_| invalid())?;

    if value.len() < 2 || value.len() > 9 {
        return Err(invalid());
    }

    let (digits, unit) = value.split_at(value.len() - 1);
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let amount: u64 = digits.parse().map_err(|_| invalid())?;

    let timeout = match unit {
        "H" => Duration::from_secs(amount * 60 * 60),
        "M" => Duration::from_secs(amount * 60),
        "S" => Duration::from_secs(amount),
        "m" => Duration::from_millis(amount),
        "u" => Duration::from_micros(amount),
        "n" => Duration::from_nanos(amount),
        _ => return Err(invalid()),
    };

    Ok(Some(timeout))
}

/// Scope of the metrics recorded by the dispatcher.
const METRICS_SCOPE: &str = "grpc_server.calls";

/// A counter reported to the installed [`metrics`] recorder that also keeps its own total, so that
/// the server can report its calls when no recorder is installed.
struct TrackedCounter {
    total: AtomicU64,
    recorded: Counter,
}

impl TrackedCounter {
    fn register(name: &str, labels: Vec<Label>) -> Self {
        let recorded = register_counter!(format!("{METRICS_SCOPE}.{name}"), labels);
        Self { total: AtomicU64::new(0), recorded }
    }

    fn increment(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.recorded.increment(1);
    }

    fn get(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

/// Metrics of the calls to one API.
struct CallMetrics {
    /// The number of calls dispatched
    started: TrackedCounter,
    /// The number of calls that produced a response
    completed: TrackedCounter,
    /// The number of calls dropped before producing a response
    cancelled: TrackedCounter,
    /// The number of calls cut short by their deadline
    deadline_exceeded: TrackedCounter,
    /// The number of calls in flight
    active: Gauge,
}

impl CallMetrics {
    fn new(api: ApiKind) -> Self {
        let labels = || vec![Label::new("api", api.to_string())];
        Self {
            started: TrackedCounter::register("started", labels()),
            completed: TrackedCounter::register("completed", labels()),
            cancelled: TrackedCounter::register("cancelled", labels()),
            deadline_exceeded: TrackedCounter::register("deadline_exceeded", labels()),
            active: register_gauge!(format!("{METRICS_SCOPE}.active"), labels()),
        }
    }

    fn begin(self: &Arc<Self>, path: String) -> CallGuard {
        self.started.increment();
        self.active.increment(1.0);
        trace!(target: "grpc", %path, "Call started.");
        CallGuard { metrics: Arc::clone(self), path, state: CallState::Active }
    }
}

/// Metrics of the calls seen by the dispatcher, recorded through the [`metrics`] facade with an
/// `api` label.
pub struct DispatcherMetrics {
    broadcast: Arc<CallMetrics>,
    block: Arc<CallMetrics>,
    /// Calls to an API that isn't registered. They carry no `api` label.
    unimplemented: TrackedCounter,
}

/// A point-in-time copy of the [`DispatcherMetrics`] totals, summed over all APIs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Calls currently in flight.
    pub active: u64,
    pub completed: u64,
    /// Calls whose future was dropped before completing, eg. because the client went away.
    pub cancelled: u64,
    pub deadline_exceeded: u64,
    /// Calls to an API that isn't registered.
    pub unimplemented: u64,
}

impl DispatcherMetrics {
    pub fn new() -> Self {
        describe_counter!(format!("{METRICS_SCOPE}.started"), "The number of calls dispatched");
        describe_counter!(
            format!("{METRICS_SCOPE}.completed"),
            "The number of calls that produced a response"
        );
        describe_counter!(
            format!("{METRICS_SCOPE}.cancelled"),
            "The number of calls dropped before producing a response"
        );
        describe_counter!(
            format!("{METRICS_SCOPE}.deadline_exceeded"),
            "The number of calls cut short by their deadline"
        );
        describe_counter!(
            format!("{METRICS_SCOPE}.unimplemented"),
            "The number of calls to an API the server doesn't expose"
        );
        describe_gauge!(format!("{METRICS_SCOPE}.active"), "The number of calls in flight");

        Self {
            broadcast: Arc::new(CallMetrics::new(ApiKind::Broadcast)),
            block: Arc::new(CallMetrics::new(ApiKind::Block)),
            unimplemented: TrackedCounter::register("unimplemented", Vec::new()),
        }
    }

    fn calls(&self, api: ApiKind) -> &Arc<CallMetrics> {
        match api {
            ApiKind::Broadcast => &self.broadcast,
            ApiKind::Block => &self.block,
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let mut snapshot =
            StatsSnapshot { unimplemented: self.unimplemented.get(), ..Default::default() };

        for calls in [&self.broadcast, &self.block] {
            let completed = calls.completed.get();
            let cancelled = calls.cancelled.get();
            let deadline_exceeded = calls.deadline_exceeded.get();
            let finished = completed + cancelled + deadline_exceeded;

            snapshot.active += calls.started.get().saturating_sub(finished);
            snapshot.completed += completed;
            snapshot.cancelled += cancelled;
            snapshot.deadline_exceeded += deadline_exceeded;
        }

        snapshot
    }
}

impl Default for DispatcherMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DispatcherMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherMetrics").field("totals", &self.snapshot()).finish()
    }
}

/// Lifecycle of a single call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallState {
    Active,
    Idle,
    Cancelled,
    DeadlineExceeded,
}

/// Tracks one call from the moment it is dispatched. A guard dropped while the call is still
/// active means the call's future was dropped, ie. the call was cancelled.
struct CallGuard {
    metrics: Arc<CallMetrics>,
    path: String,
    state: CallState,
}

impl CallGuard {
    fn finish(&mut self, state: CallState) {
        debug_assert_eq!(self.state, CallState::Active);
        self.state = state;
        self.metrics.active.decrement(1.0);

        let path = &self.path;
        match state {
            CallState::Idle => {
                self.metrics.completed.increment();
                trace!(target: "grpc", %path, "Call completed.");
            }
            CallState::DeadlineExceeded => {
                self.metrics.deadline_exceeded.increment();
                warn!(target: "grpc", %path, "Call exceeded its deadline.");
            }
            CallState::Cancelled => {
                self.metrics.cancelled.increment();
                debug!(target: "grpc", %path, "Call cancelled.");
            }
            CallState::Active => {}
        }
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        if self.state == CallState::Active {
            self.finish(CallState::Cancelled);
        }
    }
}

/// Layer applying [`Deadline`] to the server's routes.
#[derive(Debug, Clone)]
pub struct DeadlineLayer {
    timeout: Duration,
    client_margin: Duration,
    registry: Arc<ApiRegistry>,
    metrics: Arc<DispatcherMetrics>,
}

impl DeadlineLayer {
    pub fn new(timeout: Duration, registry: ApiRegistry, metrics: Arc<DispatcherMetrics>) -> Self {
        Self {
            timeout,
            client_margin: Duration::from_millis(DEFAULT_DEADLINE_MARGIN_MILLIS),
            registry: Arc::new(registry),
            metrics,
        }
    }

    /// Sets how much earlier than the client's `grpc-timeout` a call is cut short.
    pub fn with_client_margin(mut self, margin: Duration) -> Self {
        self.client_margin = margin;
        self
    }
}

impl<S> Layer<S> for DeadlineLayer {
    type Service = Deadline<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Deadline {
            inner,
            timeout: self.timeout,
            client_margin: self.client_margin,
            registry: Arc::clone(&self.registry),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

/// Middleware that routes calls to registered APIs only and enforces their deadline.
#[derive(Debug, Clone)]
pub struct Deadline<S> {
    inner: S,
    timeout: Duration,
    client_margin: Duration,
    registry: Arc<ApiRegistry>,
    metrics: Arc<DispatcherMetrics>,
}

impl<S> Deadline<S> {
    /// The deadline of a call on `route`, given the client's timeout.
    ///
    /// The client's timeout is shortened by the margin, so that the answer reaches the client
    /// before its own timer gives up on the call.
    fn deadline(&self, route: Route, client: Option<Duration>) -> Option<Instant> {
        let client = client.map(|timeout| timeout.saturating_sub(self.client_margin));
        let timeout = match (route.long_lived, client) {
            (true, client) => client,
            (false, Some(client)) => Some(client.min(self.timeout)),
            (false, None) => Some(self.timeout),
        };
        timeout.map(|timeout| Instant::now() + timeout)
    }
}

impl<S, ReqBody> Service<http::Request<ReqBody>> for Deadline<S>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<BoxBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ReqBody: Send + 'static,
{
    type Response = http::Response<BoxBody>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: http::Request<ReqBody>) -> Self::Future {
        let path = req.uri().path().to_string();

        let Some(route) = self.registry.resolve(&path) else {
            self.metrics.unimplemented.increment();
            debug!(target: "grpc", %path, "Call to an unregistered API.");
            let response = Status::unimplemented(format!("no registered API serves {path}"));
            return Box::pin(futures::future::ready(Ok(response.to_http())));
        };

        let client_timeout = match parse_grpc_timeout(req.headers()) {
            Ok(timeout) => timeout,
            Err(error) => {
                debug!(target: "grpc", %path, %error, "Ignoring client deadline.");
                None
            }
        };

        let deadline = self.deadline(route, client_timeout);
        let mut guard = self.metrics.calls(route.api).begin(path);

        if let Some(deadline) = deadline {
            // never dispatched, so the handler can't have had any effect
            if deadline <= Instant::now() {
                guard.finish(CallState::DeadlineExceeded);
                let response = error::deadline_exceeded("call deadline passed before dispatch");
                return Box::pin(futures::future::ready(Ok(response.to_http())));
            }
            req.extensions_mut().insert(CallDeadline(deadline));
        }

        // the service that was polled ready must be the one that is called
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let call = inner.call(req);

            let Some(deadline) = deadline else {
                let response = call.await;
                guard.finish(CallState::Idle);
                return response;
            };

            match tokio::time::timeout_at(deadline, call).await {
                Ok(response) => {
                    guard.finish(CallState::Idle);
                    response
                }
                Err(_) => {
                    guard.finish(CallState::DeadlineExceeded);
                    Ok(error::deadline_exceeded("call exceeded its deadline").to_http())
                }
            }
        })
    }
}
