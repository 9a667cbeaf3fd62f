// ── Session manager ──
//
// Owns the authenticated-session state machine:
//
//   LoggedOut ─connect─▶ LoggingIn ─▶ LoggedIn | InvalidCredentials | LockedOut | LoginError
//   LoggedIn ─disconnect─▶ LoggedOut          (any failure state ─connect─▶ LoggingIn)
//
// At most one login is on the wire per instance. The login runs on its own
// task and publishes its outcome on a watch channel; every `connect` made
// while it is pending (including the one that started it) waits on that
// channel instead of submitting again. Connect and disconnect serialize
// on `inner`. Snapshots live in an `ArcSwap` so reads never block.
//
// `close` marks the manager closed and bumps `generation` under
// `transition_lock`. A login starts, and later applies its outcome, only
// under the same lock after checking both, so a closed session can never
// be left logged in.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::Utc;
use tokio::sync::{Mutex, watch};
use tokio::time::Instant;
use tracing::{Instrument, debug, info, warn};

use videoos_api::{
    CommandKind, Credentials, LoginOutcome, QueuedCommand, RequestDispatcher, Response,
    SessionStateObject, StatusClass, map_response,
};

use crate::error::CoreError;
use crate::events::{EventBus, EventKey, FeedbackValue};
use crate::model::{Session, SessionState};

type LoginResult = Result<Session, CoreError>;

/// Device reasons carried on HTTP 400 session answers.
mod reason {
    pub const ALREADY_ACTIVE: &str = "SessionAlreadyActive";
    pub const REQUEST_INVALID: &str = "SessionRequestInvalid";
    pub const PORT_LOCKOUT: &str = "SessionPortLockout";
    pub const NO_ACTIVE_SESSION: &str = "SessionNoActiveSession";
}

struct Inner {
    pending: Option<watch::Receiver<Option<LoginResult>>>,
    locked_out_at: Option<Instant>,
    /// Id of the most recent session this instance held.
    last_session_id: Option<String>,
}

pub struct SessionManager {
    dispatcher: Arc<RequestDispatcher>,
    bus: Arc<EventBus>,
    snapshot: ArcSwap<Session>,
    inner: Mutex<Inner>,
    transition_lock: StdMutex<()>,
    /// Bumped by `close`; a login that started under an older generation
    /// does not apply its outcome.
    generation: AtomicU64,
    closed: AtomicBool,
    lockout_threshold: u32,
    lockout_cooldown: Duration,
}

impl SessionManager {
    pub fn new(
        dispatcher: Arc<RequestDispatcher>,
        bus: Arc<EventBus>,
        lockout_threshold: u32,
        lockout_cooldown: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            dispatcher,
            bus,
            snapshot: ArcSwap::from_pointee(Session::default()),
            inner: Mutex::new(Inner {
                pending: None,
                locked_out_at: None,
                last_session_id: None,
            }),
            transition_lock: StdMutex::new(()),
            generation: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            lockout_threshold,
            lockout_cooldown,
        })
    }

    /// Current session snapshot. Never blocks.
    pub fn current(&self) -> Session {
        Session::clone(&self.snapshot.load())
    }

    pub fn state(&self) -> SessionState {
        self.snapshot.load().state
    }

    // ── Connect ──────────────────────────────────────────────────────

    /// Log in, or join the login already in flight.
    ///
    /// Resolves `Ok` only when the session ends up `LoggedIn`; every other
    /// outcome is reported as an error while the snapshot carries the
    /// terminal state. While locked out and inside the cooldown, the cached
    /// lock-out is returned without touching the device.
    pub async fn connect(self: &Arc<Self>, credentials: &Credentials) -> LoginResult {
        let mut rx = {
            let mut inner = self.inner.lock().await;
            let in_flight = inner
                .pending
                .as_ref()
                .filter(|rx| rx.has_changed().is_ok())
                .cloned();
            match in_flight {
                Some(rx) => {
                    debug!("login already in flight, waiting on its outcome");
                    rx
                }
                None => {
                    let current = self.snapshot.load_full();
                    match current.state {
                        SessionState::LoggedIn => return Ok(Session::clone(&current)),
                        SessionState::LockedOut
                            if inner
                                .locked_out_at
                                .is_some_and(|at| at.elapsed() < self.lockout_cooldown) =>
                        {
                            debug!("lock-out cooldown active, serving cached state");
                            return Err(CoreError::AccountLocked {
                                failed_logins: current.failed_login_count,
                            });
                        }
                        _ => {}
                    }
                    if !credentials.is_valid() {
                        return Err(CoreError::Config {
                            message: "username and password are required".into(),
                        });
                    }
                    self.begin_login(&mut inner, &current, credentials)?
                }
            }
        };

        let outcome = {
            let guard = rx
                .wait_for(Option::is_some)
                .await
                .map_err(|_| CoreError::Cancelled)?;
            (*guard).clone()
        };
        outcome.unwrap_or(Err(CoreError::Cancelled))
    }

    /// Like [`connect`](Self::connect), but refuses to wait on a login
    /// that is already in flight.
    pub async fn try_connect(self: &Arc<Self>, credentials: &Credentials) -> LoginResult {
        if self.state() == SessionState::LoggingIn {
            return Err(CoreError::AlreadyInProgress);
        }
        self.connect(credentials).await
    }

    fn begin_login(
        self: &Arc<Self>,
        inner: &mut Inner,
        current: &Session,
        credentials: &Credentials,
    ) -> Result<watch::Receiver<Option<LoginResult>>, CoreError> {
        let generation = {
            let serial = self.lock_transitions();
            if self.closed.load(Ordering::Acquire) {
                return Err(CoreError::NotConnected);
            }
            self.dispatcher.clear_session_cookie();
            self.transition_locked(
                &serial,
                Session {
                    reason: "logging in".into(),
                    failed_login_count: current.failed_login_count,
                    last_client_type: current.last_client_type.clone(),
                    last_client_label: current.last_client_label.clone(),
                    ..Session::without_id(SessionState::LoggingIn, "")
                },
            );
            self.generation.load(Ordering::Acquire)
        };
        let (tx, rx) = watch::channel(None);
        inner.pending = Some(rx.clone());

        let this = Arc::clone(self);
        let credentials = credentials.clone();
        tokio::spawn(
            async move { this.run_login(credentials, generation, tx).await }
                .instrument(tracing::Span::current()),
        );
        Ok(rx)
    }

    async fn run_login(
        self: Arc<Self>,
        credentials: Credentials,
        generation: u64,
        tx: watch::Sender<Option<LoginResult>>,
    ) {
        debug!(user = %credentials.username, "submitting login");
        let outcome = self.dispatcher.submit(QueuedCommand::login(&credentials)).await;

        let mut inner = self.inner.lock().await;
        inner.pending = None;

        let Classified { session, error } = classify_login(
            outcome,
            inner.last_session_id.as_deref(),
            self.lockout_threshold,
        );

        let applied = {
            let serial = self.lock_transitions();
            if self.generation.load(Ordering::Acquire) == generation {
                match (&session.state, &session.session_id) {
                    (SessionState::LoggedIn, Some(id)) => {
                        self.dispatcher.set_session_cookie(id);
                        inner.last_session_id = Some(id.clone());
                        inner.locked_out_at = None;
                    }
                    (SessionState::LockedOut, _) => {
                        self.dispatcher.clear_session_cookie();
                        inner.locked_out_at = Some(Instant::now());
                    }
                    _ => self.dispatcher.clear_session_cookie(),
                }
                Some(self.transition_locked(&serial, session))
            } else {
                None
            }
        };
        let Some(applied) = applied else {
            debug!("session was reset during login, discarding outcome");
            tx.send_replace(Some(Err(CoreError::Cancelled)));
            return;
        };

        if applied.is_logged_in() {
            info!(failed_logins = applied.failed_login_count, "logged in");
            self.bus
                .observe(EventKey::Error, FeedbackValue::String(String::new()));
        } else {
            warn!(state = %applied.state, reason = %applied.reason, "login failed");
            self.bus
                .observe(EventKey::Error, FeedbackValue::String(applied.reason.clone()));
        }

        let result = match error {
            None => Ok(applied),
            Some(e) => Err(e),
        };
        tx.send_replace(Some(result));
    }

    // ── Disconnect ───────────────────────────────────────────────────

    /// Log out. A no-op when already logged out.
    ///
    /// Waits for any login in flight first. The logout command is best
    /// effort: its failure never blocks the move to `LoggedOut`.
    pub async fn disconnect(&self) -> Result<(), CoreError> {
        let mut inner = loop {
            let inner = self.inner.lock().await;
            let Some(mut rx) = inner.pending.clone() else {
                break inner;
            };
            drop(inner);
            if rx.wait_for(Option::is_some).await.is_err() {
                self.inner.lock().await.pending = None;
            }
        };

        let current = self.snapshot.load_full();
        match current.state {
            SessionState::LoggedOut => return Ok(()),
            SessionState::LoggedIn => {
                match self.dispatcher.submit(QueuedCommand::new(CommandKind::Logout)).await {
                    Ok(resp) if resp.is_success() => debug!("logged out"),
                    Ok(resp) => warn!(status = resp.status, "logout rejected (non-fatal)"),
                    Err(e) => warn!(error = %e, "logout failed (non-fatal)"),
                }
            }
            _ => {}
        }

        self.dispatcher.clear_session_cookie();
        inner.last_session_id = None;
        inner.locked_out_at = None;
        self.transition(Session::without_id(SessionState::LoggedOut, "logged out"));
        Ok(())
    }

    /// Drop a session the device no longer honours. Returns whether the
    /// session was logged in.
    pub async fn invalidate(&self, why: &str) -> bool {
        let mut inner = self.inner.lock().await;
        if self.state() != SessionState::LoggedIn {
            return false;
        }
        self.dispatcher.clear_session_cookie();
        inner.last_session_id = None;
        warn!(reason = why, "session invalidated");
        self.transition(Session::without_id(SessionState::LoggedOut, why));
        self.bus
            .observe(EventKey::Error, FeedbackValue::String(why.to_owned()));
        true
    }

    /// Move to `LoggedOut` immediately, without a logout round-trip, and
    /// refuse every later login. Any login in flight is disowned.
    pub fn close(&self, why: &str) {
        let serial = self.lock_transitions();
        self.closed.store(true, Ordering::Release);
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.dispatcher.clear_session_cookie();
        if self.state() != SessionState::LoggedOut {
            self.transition_locked(&serial, Session::without_id(SessionState::LoggedOut, why));
        }
    }

    // ── Transitions ──────────────────────────────────────────────────

    fn lock_transitions(&self) -> MutexGuard<'_, ()> {
        self.transition_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, next: Session) -> Session {
        let serial = self.lock_transitions();
        self.transition_locked(&serial, next)
    }

    /// Publish `next`. The caller holds `transition_lock`.
    fn transition_locked(&self, _serial: &MutexGuard<'_, ()>, next: Session) -> Session {
        let previous = self.snapshot.load_full();
        let session = Session {
            version: previous.version + 1,
            updated_at: Utc::now(),
            ..next
        };
        self.snapshot.store(Arc::new(session.clone()));

        if previous.state != session.state {
            info!(
                from = %previous.state,
                to = %session.state,
                version = session.version,
                "session state changed"
            );
        }
        self.bus.observe_with(
            EventKey::SessionState,
            FeedbackValue::Integer(i64::from(session.state.code())),
            session.session_id.clone(),
        );
        session
    }
}

// ── Login classification ─────────────────────────────────────────────

struct Classified {
    session: Session,
    error: Option<CoreError>,
}

impl Classified {
    fn logged_in(id: String, reason: &str) -> Self {
        Self {
            session: Session {
                reason: reason.to_owned(),
                ..Session::logged_in(id)
            },
            error: None,
        }
    }

    fn failed(state: SessionState, reason: impl Into<String>, error: CoreError) -> Self {
        Self {
            session: Session::without_id(state, reason),
            error: Some(error),
        }
    }

    fn with_device_counters(mut self, obj: &SessionStateObject) -> Self {
        self.session.failed_login_count = obj.failed_logins();
        self.session.last_client_type = obj.last_client_type().map(str::to_owned);
        self.session.last_client_label = obj.last_client_label().map(str::to_owned);
        if let Some(CoreError::AccountLocked { failed_logins }) = &mut self.error {
            *failed_logins = self.session.failed_login_count;
        }
        self
    }
}

/// Turn a login exchange into a session. Ambiguous answers become
/// `LoginError`, never `LoggedIn`.
fn classify_login(
    outcome: Result<Response, videoos_api::Error>,
    known_session: Option<&str>,
    lockout_threshold: u32,
) -> Classified {
    let resp = match outcome {
        Ok(resp) => resp,
        Err(e) => {
            let reason = e.to_string();
            return Classified::failed(SessionState::LoginError, reason, CoreError::from(e));
        }
    };

    let Some(mapped) = map_response(CommandKind::Login, &resp).into_session() else {
        return Classified::failed(
            SessionState::LoginError,
            "login response mapped to no session",
            CoreError::MalformedResponse {
                message: "no session object for login".into(),
            },
        );
    };
    let obj = &mapped.object;
    let invalid = || {
        Classified::failed(
            SessionState::InvalidCredentials,
            obj.reason().unwrap_or("credentials rejected"),
            CoreError::AuthRejected,
        )
    };
    let locked = || {
        Classified::failed(
            SessionState::LockedOut,
            obj.reason().unwrap_or("account locked out"),
            CoreError::AccountLocked { failed_logins: 0 },
        )
    };

    let classified = match mapped.class {
        StatusClass::Success => {
            if let Some(message) = &mapped.parse_error {
                Classified::failed(
                    SessionState::LoginError,
                    format!("malformed login response: {message}"),
                    CoreError::MalformedResponse {
                        message: message.clone(),
                    },
                )
            } else if let Some(id) = obj
                .success
                .then(|| obj.session_id().map(str::to_owned).or_else(|| cookie_session_id(&resp)))
                .flatten()
            {
                Classified::logged_in(id, obj.reason().unwrap_or("logged in"))
            } else {
                match obj.login_outcome() {
                    Some(LoginOutcome::LockedOut) => locked(),
                    Some(LoginOutcome::InvalidCredentials) => invalid(),
                    _ => Classified::failed(
                        SessionState::LoginError,
                        "login response carried no session",
                        CoreError::MalformedResponse {
                            message: "no session id in login response".into(),
                        },
                    ),
                }
            }
        }
        StatusClass::ClientError if resp.status == 400 => match obj.reason() {
            Some(reason::ALREADY_ACTIVE) => match known_session {
                Some(id) => Classified::logged_in(id.to_owned(), reason::ALREADY_ACTIVE),
                None => Classified::failed(
                    SessionState::LoginError,
                    reason::ALREADY_ACTIVE,
                    CoreError::Api { status: 400 },
                ),
            },
            Some(reason::REQUEST_INVALID) => invalid(),
            Some(reason::PORT_LOCKOUT) => locked(),
            Some(reason::NO_ACTIVE_SESSION) => Classified::failed(
                SessionState::LoggedOut,
                reason::NO_ACTIVE_SESSION,
                CoreError::Api { status: 400 },
            ),
            other => Classified::failed(
                SessionState::LoginError,
                other.unwrap_or("login request rejected (HTTP 400)"),
                CoreError::Api { status: 400 },
            ),
        },
        StatusClass::AuthFailure => {
            let lockout = obj.login_outcome() == Some(LoginOutcome::LockedOut)
                || obj.reason() == Some(reason::PORT_LOCKOUT)
                || obj.failed_logins() >= lockout_threshold;
            if lockout { locked() } else { invalid() }
        }
        StatusClass::Timeout => Classified::failed(
            SessionState::LoginError,
            format!("login timed out (HTTP {})", resp.status),
            CoreError::Timeout { timeout_secs: 0 },
        ),
        StatusClass::ClientError | StatusClass::ServerError | StatusClass::Unexpected => {
            Classified::failed(
                SessionState::LoginError,
                format!("login failed (HTTP {})", resp.status),
                CoreError::Api {
                    status: resp.status,
                },
            )
        }
    };

    classified.with_device_counters(obj)
}

/// `session_id` from a `Set-Cookie` header, for devices that only send it there.
fn cookie_session_id(resp: &Response) -> Option<String> {
    resp.headers
        .iter()
        .filter(|(name, _)| name.eq_ignore_ascii_case("set-cookie"))
        .find_map(|(_, value)| {
            value
                .split(';')
                .next()?
                .trim()
                .strip_prefix("session_id=")
                .filter(|id| !id.is_empty())
                .map(str::to_owned)
        })
}
