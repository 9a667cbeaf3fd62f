// Pooled, queued execution of REST commands.
//
// Commands wait on a fair semaphore (FIFO by submission) for one of
// `pool_size` slots, then run through the transport with a per-attempt
// timeout. Idempotent commands are replayed on transient failures with
// exponential backoff; everything else goes to the wire exactly once.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::{AuthMode, Credentials, session_cookie};
use crate::command::{QueuedCommand, RenderedCommand};
use crate::error::Error;
use crate::transport::{HttpRequest, Response, Transport};

/// What `shutdown` does to commands already on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrainPolicy {
    /// Abort in-flight exchanges; their callers resolve with `Cancelled`.
    #[default]
    CancelInFlight,
    /// Let in-flight exchanges complete; only queued commands are cancelled.
    FinishInFlight,
}

/// Dispatcher tuning.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Maximum concurrently executing commands.
    pub pool_size: usize,
    /// Maximum commands waiting for a slot before `QueueSaturated`.
    pub queue_depth: usize,
    /// Per-attempt timeout unless the command overrides it.
    pub timeout: Duration,
    /// Replays allowed for idempotent commands.
    pub max_retries: u32,
    /// First backoff delay; doubles on every replay.
    pub retry_base_delay: Duration,
    pub drain: DrainPolicy,
    pub auth_mode: AuthMode,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            pool_size: 10,
            queue_depth: 64,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(100),
            drain: DrainPolicy::CancelInFlight,
            auth_mode: AuthMode::None,
        }
    }
}

/// Point-in-time counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    pub pool_size: usize,
    pub queue_depth: usize,
    pub queued: usize,
    pub in_flight: usize,
    pub peak_in_flight: usize,
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub closed: bool,
}

#[derive(Default)]
struct Counters {
    queued: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Pooled HTTPS client for one device instance.
///
/// Holds the session cookie the device handed out at login and attaches it
/// to every request. Shared behind an `Arc` by the session manager and the
/// device facade.
pub struct RequestDispatcher {
    transport: Arc<dyn Transport>,
    base_url: Url,
    config: DispatcherConfig,
    credentials: Option<Credentials>,
    slots: Arc<Semaphore>,
    counters: Counters,
    session_cookie: RwLock<Option<String>>,
    verbose: AtomicBool,
    closed: AtomicBool,
    cancel: CancellationToken,
}

impl RequestDispatcher {
    pub fn new(transport: Arc<dyn Transport>, base_url: Url, config: DispatcherConfig) -> Self {
        let pool_size = config.pool_size.max(1);
        Self {
            transport,
            base_url,
            config: DispatcherConfig { pool_size, ..config },
            credentials: None,
            slots: Arc::new(Semaphore::new(pool_size)),
            counters: Counters::default(),
            session_cookie: RwLock::new(None),
            verbose: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    /// Credentials used for HTTP Basic auth when `AuthMode::Basic` is set.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    // ── Session cookie ───────────────────────────────────────────────

    pub fn set_session_cookie(&self, session_id: &str) {
        let mut guard = self
            .session_cookie
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = Some(session_cookie(session_id));
    }

    pub fn clear_session_cookie(&self) {
        let mut guard = self
            .session_cookie
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = None;
    }

    pub fn has_session_cookie(&self) -> bool {
        self.session_cookie
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .is_some()
    }

    fn current_cookie(&self) -> Option<String> {
        self.session_cookie
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Log every response at `info` instead of `debug`.
    pub fn set_verbose(&self, verbose: bool) {
        self.verbose.store(verbose, Ordering::Relaxed);
    }

    // ── Submission ───────────────────────────────────────────────────

    /// Queue a command and wait for its response.
    ///
    /// Resolves once a pool slot frees up and the exchange (plus any
    /// replays) finishes. Fails fast with `QueueSaturated` when
    /// `queue_depth` commands are already waiting, and with `NotConnected`
    /// after [`shutdown`](Self::shutdown).
    pub async fn submit(&self, cmd: QueuedCommand) -> Result<Response, Error> {
        if self.is_closed() {
            return Err(Error::NotConnected);
        }
        let rendered = cmd.render(&self.base_url)?;

        let waiting = self.counters.queued.fetch_add(1, Ordering::AcqRel);
        if waiting >= self.config.queue_depth {
            self.counters.queued.fetch_sub(1, Ordering::AcqRel);
            warn!(
                correlation_id = %cmd.correlation_id,
                depth = self.config.queue_depth,
                "command queue saturated"
            );
            return Err(Error::QueueSaturated {
                depth: self.config.queue_depth,
            });
        }
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);

        let permit = {
            let _queued = CountGuard(&self.counters.queued);
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => Err(Error::Cancelled),
                permit = Arc::clone(&self.slots).acquire_owned() => permit.map_err(|_| Error::Cancelled),
            }
        };
        let permit = match permit {
            Ok(permit) => self.occupy(permit),
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                debug!(correlation_id = %cmd.correlation_id, "command cancelled while queued");
                return Err(e);
            }
        };

        let result = match self.config.drain {
            DrainPolicy::CancelInFlight => {
                tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => Err(Error::Cancelled),
                    r = self.execute_with_retry(&cmd, &rendered) => r,
                }
            }
            DrainPolicy::FinishInFlight => self.execute_with_retry(&cmd, &rendered).await,
        };
        drop(permit);

        match &result {
            Ok(_) => self.counters.completed.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.counters.failed.fetch_add(1, Ordering::Relaxed),
        };
        result
    }

    fn occupy(&self, permit: OwnedSemaphorePermit) -> SlotPermit<'_> {
        let current = self.counters.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.counters
            .peak_in_flight
            .fetch_max(current, Ordering::AcqRel);
        SlotPermit {
            _permit: permit,
            in_flight: &self.counters.in_flight,
        }
    }

    async fn execute_with_retry(
        &self,
        cmd: &QueuedCommand,
        rendered: &RenderedCommand,
    ) -> Result<Response, Error> {
        let idempotent = cmd.is_idempotent();
        let timeout = cmd.timeout.unwrap_or(self.config.timeout);
        let mut attempt: u32 = 0;

        loop {
            let outcome = self.execute_once(cmd, rendered, timeout).await;
            let retryable = match &outcome {
                Ok(resp) => is_retryable_status(resp.status),
                Err(e) => e.is_transient(),
            };

            if !retryable || !idempotent {
                return outcome;
            }
            if attempt >= self.config.max_retries {
                return exhausted(outcome, attempt + 1, timeout);
            }

            let delay = self.config.retry_base_delay * 2u32.saturating_pow(attempt);
            warn!(
                correlation_id = %cmd.correlation_id,
                attempt = attempt + 1,
                delay_ms = delay.as_millis(),
                "transient failure, retrying"
            );
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(Error::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    async fn execute_once(
        &self,
        cmd: &QueuedCommand,
        rendered: &RenderedCommand,
        timeout: Duration,
    ) -> Result<Response, Error> {
        let request = self.build_request(cmd, rendered);
        let started = Instant::now();
        let timeout_secs = timeout.as_secs();

        let result = match tokio::time::timeout(timeout, self.transport.execute(request)).await {
            Err(_) | Ok(Err(Error::Timeout { .. })) => Err(Error::Timeout { timeout_secs }),
            Ok(r) => r,
        };

        let elapsed_ms = started.elapsed().as_millis();
        match &result {
            Ok(resp) if self.verbose.load(Ordering::Relaxed) => info!(
                correlation_id = %cmd.correlation_id,
                method = %cmd.method,
                url = %rendered.url,
                status = resp.status,
                elapsed_ms,
                body = %resp.body,
                "response"
            ),
            Ok(resp) => debug!(
                correlation_id = %cmd.correlation_id,
                method = %cmd.method,
                url = %rendered.url,
                status = resp.status,
                elapsed_ms,
                "response"
            ),
            Err(e) => debug!(
                correlation_id = %cmd.correlation_id,
                method = %cmd.method,
                url = %rendered.url,
                error = %e,
                elapsed_ms,
                "request failed"
            ),
        }
        result
    }

    fn build_request(&self, cmd: &QueuedCommand, rendered: &RenderedCommand) -> HttpRequest {
        let mut headers = vec![("Accept".to_owned(), "application/json".to_owned())];
        if let Some(content_type) = rendered.content_type {
            headers.push(("Content-Type".to_owned(), content_type.to_owned()));
        }
        if let Some(cookie) = self.current_cookie() {
            headers.push(("Cookie".to_owned(), cookie));
        }

        let basic_auth = match (self.config.auth_mode, &self.credentials) {
            (AuthMode::Basic, Some(creds)) => Some((creds.username.clone(), creds.password.clone())),
            _ => None,
        };

        HttpRequest {
            method: cmd.method.clone(),
            url: rendered.url.clone(),
            headers,
            body: rendered.body.clone(),
            basic_auth,
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Stop accepting commands and cancel the queue.
    ///
    /// Queued commands resolve with `Cancelled`; in-flight ones follow the
    /// configured [`DrainPolicy`]. Idempotent.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(
            queued = self.counters.queued.load(Ordering::Acquire),
            in_flight = self.counters.in_flight.load(Ordering::Acquire),
            drain = ?self.config.drain,
            "dispatcher shutting down"
        );
        self.cancel.cancel();
        self.slots.close();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            pool_size: self.config.pool_size,
            queue_depth: self.config.queue_depth,
            queued: self.counters.queued.load(Ordering::Acquire),
            in_flight: self.counters.in_flight.load(Ordering::Acquire),
            peak_in_flight: self.counters.peak_in_flight.load(Ordering::Acquire),
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            closed: self.is_closed(),
        }
    }
}

/// 5xx plus the two timeout statuses.
fn is_retryable_status(status: u16) -> bool {
    status == 408 || (500..600).contains(&status)
}

fn exhausted(outcome: Result<Response, Error>, attempts: u32, timeout: Duration) -> Result<Response, Error> {
    match outcome {
        Ok(resp) if matches!(resp.status, 408 | 504) => Err(Error::Timeout {
            timeout_secs: timeout.as_secs(),
        }),
        Ok(resp) if resp.status >= 500 => Err(Error::ServerError {
            status: resp.status,
            attempts,
        }),
        other => other,
    }
}

/// Decrements a counter when dropped.
struct CountGuard<'a>(&'a AtomicUsize);

impl Drop for CountGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A held pool slot. Releases the slot and the in-flight count on drop.
struct SlotPermit<'a> {
    _permit: OwnedSemaphorePermit,
    in_flight: &'a AtomicUsize,
}

impl Drop for SlotPermit<'_> {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use futures_util::future::{BoxFuture, join_all};
    use pretty_assertions::assert_eq;
    use reqwest::Method;

    use super::*;
    use crate::command::{CommandKind, InputFormat};

    #[derive(Clone, Copy)]
    enum Step {
        Status(u16),
        TimeoutErr,
    }

    struct FakeTransport {
        latency: Duration,
        script: Mutex<VecDeque<Step>>,
        fallback: u16,
        calls: AtomicUsize,
        active: AtomicUsize,
        max_active: AtomicUsize,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl FakeTransport {
        fn new(latency: Duration, fallback: u16) -> Arc<Self> {
            Arc::new(Self {
                latency,
                script: Mutex::new(VecDeque::new()),
                fallback,
                calls: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn scripted(latency: Duration, fallback: u16, steps: &[Step]) -> Arc<Self> {
            let t = Self::new(latency, fallback);
            t.script.lock().unwrap().extend(steps.iter().copied());
            t
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn paths(&self) -> Vec<String> {
            self.seen
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.url.path().to_owned())
                .collect()
        }
    }

    impl Transport for FakeTransport {
        fn execute(&self, request: HttpRequest) -> BoxFuture<'_, Result<Response, Error>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_active.fetch_max(now, Ordering::SeqCst);
                let url = request.url.to_string();
                self.seen.lock().unwrap().push(request);

                tokio::time::sleep(self.latency).await;
                self.active.fetch_sub(1, Ordering::SeqCst);

                let step = self.script.lock().unwrap().pop_front();
                match step.unwrap_or(Step::Status(self.fallback)) {
                    Step::Status(status) => Ok(Response {
                        status,
                        headers: Vec::new(),
                        body: "{}".into(),
                        url,
                    }),
                    Step::TimeoutErr => Err(Error::Timeout { timeout_secs: 0 }),
                }
            })
        }
    }

    fn dispatcher(transport: Arc<FakeTransport>, config: DispatcherConfig) -> Arc<RequestDispatcher> {
        let base = Url::parse("https://codec.test").unwrap();
        Arc::new(RequestDispatcher::new(transport, base, config))
    }

    fn status_query() -> QueuedCommand {
        QueuedCommand::new(CommandKind::SystemModeStatus)
    }

    // ── Pool bound and ordering ──────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_pool_size() {
        let transport = FakeTransport::new(Duration::from_millis(50), 200);
        let d = dispatcher(
            Arc::clone(&transport),
            DispatcherConfig {
                pool_size: 2,
                ..DispatcherConfig::default()
            },
        );

        let results = join_all((0..7).map(|_| d.submit(status_query()))).await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(transport.max_active.load(Ordering::SeqCst), 2);
        let stats = d.stats();
        assert_eq!(stats.peak_in_flight, 2);
        assert_eq!(stats.completed, 7);
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.queued, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dequeues_in_submission_order() {
        let transport = FakeTransport::new(Duration::from_millis(10), 200);
        let d = dispatcher(
            Arc::clone(&transport),
            DispatcherConfig {
                pool_size: 1,
                ..DispatcherConfig::default()
            },
        );

        let cmds = ["a", "b", "c", "d"]
            .map(|p| QueuedCommand::raw(Method::GET, format!("order/{p}"), InputFormat::None));
        join_all(cmds.into_iter().map(|c| d.submit(c))).await;

        assert_eq!(
            transport.paths(),
            vec!["/rest/order/a", "/rest/order/b", "/rest/order/c", "/rest/order/d"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn saturated_queue_fails_fast() {
        let transport = FakeTransport::new(Duration::from_secs(1), 200);
        let d = dispatcher(
            Arc::clone(&transport),
            DispatcherConfig {
                pool_size: 1,
                queue_depth: 1,
                ..DispatcherConfig::default()
            },
        );

        let running = tokio::spawn({
            let d = Arc::clone(&d);
            async move { d.submit(status_query()).await }
        });
        tokio::time::sleep(Duration::from_millis(1)).await;
        let waiting = tokio::spawn({
            let d = Arc::clone(&d);
            async move { d.submit(status_query()).await }
        });
        tokio::time::sleep(Duration::from_millis(1)).await;

        let err = d.submit(status_query()).await.unwrap_err();
        assert!(matches!(err, Error::QueueSaturated { depth: 1 }));

        assert!(running.await.unwrap().is_ok());
        assert!(waiting.await.unwrap().is_ok());
        assert_eq!(transport.calls(), 2);
    }

    // ── Retry policy ─────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn idempotent_503_retries_with_backoff() {
        let transport = FakeTransport::new(Duration::ZERO, 503);
        let d = dispatcher(Arc::clone(&transport), DispatcherConfig::default());

        let started = tokio::time::Instant::now();
        let err = d.submit(status_query()).await.unwrap_err();

        assert!(matches!(err, Error::ServerError { status: 503, attempts: 4 }));
        assert_eq!(transport.calls(), 4);
        // 100 + 200 + 400 ms of backoff
        assert!(started.elapsed() >= Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn non_idempotent_is_sent_once() {
        let transport = FakeTransport::new(Duration::ZERO, 503);
        let d = dispatcher(Arc::clone(&transport), DispatcherConfig::default());

        let resp = d.submit(QueuedCommand::new(CommandKind::Reboot)).await.unwrap();

        assert_eq!(resp.status, 503);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_error_recovers() {
        let transport = FakeTransport::scripted(
            Duration::ZERO,
            200,
            &[Step::TimeoutErr, Step::Status(502)],
        );
        let d = dispatcher(Arc::clone(&transport), DispatcherConfig::default());

        let resp = d.submit(status_query()).await.unwrap();

        assert_eq!(resp.status, 200);
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_504_is_a_timeout() {
        let transport = FakeTransport::new(Duration::ZERO, 504);
        let d = dispatcher(
            Arc::clone(&transport),
            DispatcherConfig {
                max_retries: 1,
                ..DispatcherConfig::default()
            },
        );

        let err = d.submit(status_query()).await.unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_exchange_times_out() {
        let transport = FakeTransport::new(Duration::from_secs(10), 200);
        let d = dispatcher(
            Arc::clone(&transport),
            DispatcherConfig {
                timeout: Duration::from_secs(1),
                ..DispatcherConfig::default()
            },
        );

        let err = d.submit(QueuedCommand::new(CommandKind::Reboot)).await.unwrap_err();
        assert!(matches!(err, Error::Timeout { timeout_secs: 1 }));
        assert_eq!(transport.calls(), 1);
    }

    // ── Request shape ────────────────────────────────────────────────

    #[tokio::test]
    async fn session_cookie_is_attached() {
        let transport = FakeTransport::new(Duration::ZERO, 200);
        let d = dispatcher(Arc::clone(&transport), DispatcherConfig::default());

        d.set_session_cookie("abc123");
        d.submit(status_query()).await.unwrap();
        d.clear_session_cookie();
        d.submit(status_query()).await.unwrap();

        let seen = transport.seen.lock().unwrap();
        let cookie = |r: &HttpRequest| {
            r.headers
                .iter()
                .find(|(k, _)| k == "Cookie")
                .map(|(_, v)| v.clone())
        };
        assert_eq!(cookie(&seen[0]).as_deref(), Some("session_id=abc123"));
        assert_eq!(cookie(&seen[1]), None);
    }

    #[tokio::test]
    async fn basic_auth_only_when_enabled() {
        let transport = FakeTransport::new(Duration::ZERO, 200);
        let base = Url::parse("https://codec.test").unwrap();
        let d = RequestDispatcher::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            base,
            DispatcherConfig {
                auth_mode: AuthMode::Basic,
                ..DispatcherConfig::default()
            },
        )
        .with_credentials(Credentials::new("admin", "pw"));

        d.submit(status_query()).await.unwrap();
        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].basic_auth.as_ref().map(|(u, _)| u.as_str()), Some("admin"));
    }

    #[tokio::test]
    async fn invalid_command_never_reaches_transport() {
        let transport = FakeTransport::new(Duration::ZERO, 200);
        let d = dispatcher(Arc::clone(&transport), DispatcherConfig::default());

        let cmd = QueuedCommand::raw(Method::POST, "x", InputFormat::BodyJson);
        assert!(matches!(d.submit(cmd).await, Err(Error::InvalidCommand(_))));
        assert_eq!(transport.calls(), 0);
        assert_eq!(d.stats().submitted, 0);
    }

    // ── Shutdown ─────────────────────────────────────────────────────

    async fn dispose_scenario(drain: DrainPolicy) -> Vec<Result<Response, Error>> {
        let transport = FakeTransport::new(Duration::from_secs(5), 200);
        let d = dispatcher(
            Arc::clone(&transport),
            DispatcherConfig {
                pool_size: 1,
                drain,
                ..DispatcherConfig::default()
            },
        );

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let d = Arc::clone(&d);
                tokio::spawn(async move { d.submit(status_query()).await })
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(d.stats().in_flight, 1);
        assert_eq!(d.stats().queued, 2);

        d.shutdown();
        d.shutdown();

        let mut results = Vec::new();
        for h in handles {
            results.push(h.await.unwrap());
        }
        assert!(matches!(d.submit(status_query()).await, Err(Error::NotConnected)));
        assert_eq!(transport.calls(), 1);
        results
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_queue_and_in_flight() {
        let results = dispose_scenario(DrainPolicy::CancelInFlight).await;
        assert!(results.iter().all(|r| matches!(r, Err(Error::Cancelled))));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_can_let_in_flight_finish() {
        let results = dispose_scenario(DrainPolicy::FinishInFlight).await;
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(Error::Cancelled)))
                .count(),
            2
        );
    }
}
