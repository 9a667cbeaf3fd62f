// ── Device facade ──
//
// The single entry point for a host. Wires one dispatcher, one session
// manager and one event bus together, and owns the current snapshots.
// Cheaply cloneable via `Arc<DeviceInner>`.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info, info_span, warn};

use videoos_api::{
    CommandKind, DispatcherStats, HttpsTransport, MappedResponse, QueuedCommand,
    RequestDispatcher, StatusClass, Transport, classify_status, map_response,
};

use crate::config::DeviceConfig;
use crate::error::CoreError;
use crate::events::{EventBus, EventKey, FeedbackEvent, FeedbackValue, KeyFilter, SubscriptionHandle};
use crate::model::{Session, SessionState, SystemMode};
use crate::session::SessionManager;

const EXPIRED: &str = "session expired";

/// One VideoOS endpoint.
///
/// Does NOT connect on construction -- call [`connect()`](Self::connect).
/// Every mutating operation other than `connect`/`disconnect` fails with
/// [`CoreError::NotConnected`] unless the session is `LoggedIn`.
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

struct DeviceInner {
    config: DeviceConfig,
    dispatcher: Arc<RequestDispatcher>,
    session: Arc<SessionManager>,
    bus: Arc<EventBus>,
    system_mode: ArcSwapOption<SystemMode>,
    debug: AtomicBool,
    disposed: AtomicBool,
    cancel: CancellationToken,
    /// Token of the running poller, if any. Replaced on each login.
    poll_cancel: Mutex<Option<CancellationToken>>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
    span: RwLock<Span>,
}

impl Device {
    /// Build a device over the HTTPS transport described by `config`.
    pub fn new(config: DeviceConfig) -> Result<Self, CoreError> {
        let transport = HttpsTransport::new(&config.transport_config())?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Build a device over a caller-supplied transport.
    pub fn with_transport(
        config: DeviceConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, CoreError> {
        let base_url = config.base_url()?;
        let dispatcher = Arc::new(
            RequestDispatcher::new(transport, base_url, config.dispatcher_config())
                .with_credentials(config.credentials.clone()),
        );
        dispatcher.set_verbose(config.debug);

        let bus = Arc::new(EventBus::new());
        let session = SessionManager::new(
            Arc::clone(&dispatcher),
            Arc::clone(&bus),
            config.lockout_threshold,
            config.lockout_cooldown,
        );
        let span = info_span!("device", host = %config.host);

        Ok(Self {
            inner: Arc::new(DeviceInner {
                debug: AtomicBool::new(config.debug),
                config,
                dispatcher,
                session,
                bus,
                system_mode: ArcSwapOption::empty(),
                disposed: AtomicBool::new(false),
                cancel: CancellationToken::new(),
                poll_cancel: Mutex::new(None),
                task_handles: Mutex::new(Vec::new()),
                span: RwLock::new(span),
            }),
        })
    }

    /// Replace the tracing span every operation runs in.
    pub fn with_span(self, span: Span) -> Self {
        *self
            .inner
            .span
            .write()
            .unwrap_or_else(PoisonError::into_inner) = span;
        self
    }

    fn span(&self) -> Span {
        self.inner
            .span
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.inner.config
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// Log in (or join a login in flight), run a first mode query and
    /// start status polling.
    pub async fn connect(&self) -> Result<Session, CoreError> {
        self.ensure_live()?;
        let login = self
            .inner
            .session
            .connect(&self.inner.config.credentials)
            .instrument(self.span())
            .await;
        self.after_login(login).await
    }

    /// Like [`connect`](Self::connect) but fails with `AlreadyInProgress`
    /// instead of waiting on a login in flight.
    pub async fn try_connect(&self) -> Result<Session, CoreError> {
        self.ensure_live()?;
        let login = self
            .inner
            .session
            .try_connect(&self.inner.config.credentials)
            .instrument(self.span())
            .await;
        self.after_login(login).await
    }

    async fn after_login(&self, login: Result<Session, CoreError>) -> Result<Session, CoreError> {
        login?;
        if let Err(e) = self.refresh_system_mode().await {
            warn!(parent: &self.span(), error = %e, "initial mode query failed");
        }
        self.start_polling().await;
        if self.debug() {
            self.print_debug_state();
        }
        Ok(self.session())
    }

    /// Stop polling and log out. A no-op when already logged out.
    pub async fn disconnect(&self) -> Result<(), CoreError> {
        self.stop_polling().await;
        self.inner
            .session
            .disconnect()
            .instrument(self.span())
            .await
    }

    /// Release everything: cancel polling, cancel queued and in-flight
    /// commands, and drop to `LoggedOut` without a logout round-trip.
    /// Safe to call more than once.
    pub async fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let span = self.span();
        info!(parent: &span, "disposing device");

        self.inner.cancel.cancel();
        self.inner.session.close("disposed");
        self.inner.dispatcher.shutdown();

        let handles: Vec<_> = self.inner.task_handles.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        *self.inner.poll_cancel.lock().await = None;
        self.inner.system_mode.store(None);
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    // ── Operations ───────────────────────────────────────────────────

    pub async fn reboot(&self) -> Result<(), CoreError> {
        self.run(CommandKind::Reboot).await?;
        info!(parent: &self.span(), "reboot requested");
        Ok(())
    }

    /// Switch the endpoint into USB camera (device) mode.
    pub async fn start_device_mode(&self) -> Result<(), CoreError> {
        self.run(CommandKind::StartDeviceMode).await?;
        if let Err(e) = self.refresh_system_mode().await {
            debug!(parent: &self.span(), error = %e, "mode refresh after start failed");
        }
        Ok(())
    }

    pub async fn stop_device_mode(&self) -> Result<(), CoreError> {
        self.run(CommandKind::StopDeviceMode).await?;
        if let Err(e) = self.refresh_system_mode().await {
            debug!(parent: &self.span(), error = %e, "mode refresh after stop failed");
        }
        Ok(())
    }

    /// Query the system mode and replace the snapshot.
    ///
    /// A body that does not parse leaves the previous snapshot in place and
    /// fails with `MalformedResponse`.
    pub async fn refresh_system_mode(&self) -> Result<SystemMode, CoreError> {
        let mapped = self
            .run(CommandKind::SystemModeStatus)
            .await?
            .into_system_mode()
            .ok_or_else(|| CoreError::MalformedResponse {
                message: "mode query mapped to no system mode".into(),
            })?;
        let body = mapped.object.raw_content.clone();
        let object = match mapped.into_result(&body) {
            Ok(object) => object,
            Err(e) => {
                let err = CoreError::from(e);
                warn!(parent: &self.span(), error = %err, body = %body, "unusable system mode");
                self.report_error(&err);
                return Err(err);
            }
        };

        let mode = SystemMode::from(object);
        let enabled = mode.device_mode_enabled();
        self.inner.system_mode.store(Some(Arc::new(mode.clone())));
        self.inner
            .bus
            .observe(EventKey::DeviceMode, FeedbackValue::Integer(i64::from(enabled)));
        self.inner
            .bus
            .observe(EventKey::Error, FeedbackValue::String(String::new()));
        Ok(mode)
    }

    /// Submit one command against a live session, check its status and
    /// map the body by the command's kind.
    async fn run(&self, kind: CommandKind) -> Result<MappedResponse, CoreError> {
        self.require_logged_in()?;
        let span = self.span();
        let resp = match self
            .inner
            .dispatcher
            .submit(QueuedCommand::new(kind))
            .instrument(span.clone())
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                let err = CoreError::from(e);
                if !matches!(err, CoreError::Cancelled) {
                    self.report_error(&err);
                }
                return Err(err);
            }
        };

        let err = match classify_status(resp.status) {
            StatusClass::Success => return Ok(map_response(kind, &resp)),
            StatusClass::AuthFailure => {
                self.inner.session.invalidate(EXPIRED).instrument(span).await;
                return Err(CoreError::SessionExpired);
            }
            StatusClass::Timeout => CoreError::Timeout {
                timeout_secs: self.inner.config.timeout.as_secs(),
            },
            StatusClass::ClientError | StatusClass::ServerError | StatusClass::Unexpected => {
                CoreError::Api {
                    status: resp.status,
                }
            }
        };
        warn!(parent: &self.span(), ?kind, status = resp.status, "command failed");
        self.report_error(&err);
        Err(err)
    }

    fn report_error(&self, err: &CoreError) {
        self.inner
            .bus
            .observe(EventKey::Error, FeedbackValue::String(err.to_string()));
    }

    fn ensure_live(&self) -> Result<(), CoreError> {
        if self.is_disposed() {
            return Err(CoreError::NotConnected);
        }
        Ok(())
    }

    fn require_logged_in(&self) -> Result<(), CoreError> {
        self.ensure_live()?;
        if self.inner.session.state() != SessionState::LoggedIn {
            return Err(CoreError::NotConnected);
        }
        Ok(())
    }

    // ── Polling ──────────────────────────────────────────────────────

    async fn start_polling(&self) {
        let interval = self.inner.config.polling_interval;
        if interval.is_zero() || self.is_disposed() {
            return;
        }
        let mut slot = self.inner.poll_cancel.lock().await;
        if slot.as_ref().is_some_and(|t| !t.is_cancelled()) {
            return;
        }
        let token = self.inner.cancel.child_token();
        *slot = Some(token.clone());
        drop(slot);

        let handle = tokio::spawn(
            poll_task(Arc::downgrade(&self.inner), interval, token).instrument(self.span()),
        );
        let mut handles = self.inner.task_handles.lock().await;
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    async fn stop_polling(&self) {
        if let Some(token) = self.inner.poll_cancel.lock().await.take() {
            token.cancel();
        }
        let handles: Vec<_> = self.inner.task_handles.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }

    pub async fn is_polling(&self) -> bool {
        self.inner
            .poll_cancel
            .lock()
            .await
            .as_ref()
            .is_some_and(|t| !t.is_cancelled())
    }

    // ── Snapshots ────────────────────────────────────────────────────

    pub fn session(&self) -> Session {
        self.inner.session.current()
    }

    pub fn system_mode(&self) -> Option<SystemMode> {
        self.inner.system_mode.load_full().map(|m| SystemMode::clone(&m))
    }

    /// `true` while the session is `LoggedIn`.
    pub fn is_connected(&self) -> bool {
        self.inner.session.state() == SessionState::LoggedIn
    }

    pub fn stats(&self) -> DispatcherStats {
        self.inner.dispatcher.stats()
    }

    // ── Events ───────────────────────────────────────────────────────

    pub fn subscribe<F>(&self, filter: impl Into<KeyFilter>, callback: F) -> SubscriptionHandle
    where
        F: Fn(&FeedbackEvent) + Send + Sync + 'static,
    {
        self.inner.bus.subscribe(filter, callback)
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.inner.bus.unsubscribe(handle)
    }

    // ── Diagnostics ──────────────────────────────────────────────────

    pub fn set_debug(&self, enabled: bool) {
        self.inner.debug.store(enabled, Ordering::Relaxed);
        self.inner.dispatcher.set_verbose(enabled);
        if enabled {
            self.print_debug_state();
        }
    }

    pub fn debug(&self) -> bool {
        self.inner.debug.load(Ordering::Relaxed)
    }

    /// Best-effort snapshot of everything the device knows. Never fails
    /// and never mutates state; also logged at `info`.
    pub fn print_debug_state(&self) -> DebugState {
        let state = DebugState {
            host: self.inner.config.host.clone(),
            session: self.session(),
            system_mode: self.system_mode(),
            dispatcher: self.stats(),
            session_cookie: self.inner.dispatcher.has_session_cookie(),
            subscribers: self.inner.bus.subscriber_count(),
            debug: self.debug(),
            disposed: self.is_disposed(),
        };
        info!(parent: &self.span(), "{state}");
        state
    }
}

impl Drop for DeviceInner {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.dispatcher.shutdown();
    }
}

/// Poll the system mode while the session stays logged in.
async fn poll_task(device: Weak<DeviceInner>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick is immediate; connect already ran the initial query.
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let Some(inner) = device.upgrade() else { break };
                let device = Device { inner };
                if !device.is_connected() {
                    debug!("poll: session no longer logged in, stopping");
                    break;
                }
                let result = tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    r = device.refresh_system_mode() => r,
                };
                match result {
                    Ok(_) => {}
                    Err(CoreError::SessionExpired | CoreError::Cancelled | CoreError::NotConnected) => {
                        debug!("poll: stopping");
                        break;
                    }
                    Err(e) => debug!(error = %e, "poll: mode query failed"),
                }
            }
        }
    }
    cancel.cancel();
}

// ── Debug state ──────────────────────────────────────────────────────

/// Output of [`Device::print_debug_state`].
#[derive(Debug, Clone, Serialize)]
pub struct DebugState {
    pub host: String,
    pub session: Session,
    pub system_mode: Option<SystemMode>,
    pub dispatcher: DispatcherStats,
    /// Whether requests currently carry a `session_id` cookie.
    pub session_cookie: bool,
    pub subscribers: usize,
    pub debug: bool,
    pub disposed: bool,
}

impl fmt::Display for DebugState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.session;
        writeln!(f, "device {}", self.host)?;
        writeln!(
            f,
            "  session:     {} (code {}) id={} failed_logins={} version={}",
            s.label(),
            s.state.code(),
            s.session_id.as_deref().map_or_else(|| "-".to_owned(), mask),
            s.failed_login_count,
            s.version,
        )?;
        if !s.reason.is_empty() {
            writeln!(f, "  reason:      {}", s.reason)?;
        }
        match &self.system_mode {
            Some(m) => writeln!(
                f,
                "  system mode: persona={} app={} mode={} eco={} device_mode={}",
                m.active_persona,
                m.app,
                m.mode,
                m.eco_mode,
                if m.device_mode_enabled() { "on" } else { "off" },
            )?,
            None => writeln!(f, "  system mode: unknown")?,
        }
        let d = &self.dispatcher;
        writeln!(
            f,
            "  dispatcher:  pool={} queued={} in_flight={} peak={} submitted={} completed={} failed={}{}",
            d.pool_size,
            d.queued,
            d.in_flight,
            d.peak_in_flight,
            d.submitted,
            d.completed,
            d.failed,
            if d.closed { " (closed)" } else { "" },
        )?;
        write!(
            f,
            "  subscribers: {}  cookie: {}  debug: {}  disposed: {}",
            self.subscribers,
            if self.session_cookie { "set" } else { "none" },
            self.debug,
            self.disposed
        )
    }
}

fn mask(id: &str) -> String {
    let head: String = id.chars().take(4).collect();
    format!("{head}…")
}
