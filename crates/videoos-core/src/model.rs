// ── Domain model ──
//
// Immutable snapshots handed to consumers. The session manager and the
// device facade replace them wholesale; nothing outside this crate can
// mutate one in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use videoos_api::SystemModeObject;

/// Authentication session state.
///
/// The numeric codes are part of the host integration contract and must
/// stay exactly as listed.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    #[default]
    LoggedOut,
    LoggingIn,
    LoggedIn,
    InvalidCredentials,
    LockedOut,
    LoginError,
}

impl SessionState {
    pub fn code(self) -> u16 {
        match self {
            Self::LoggedOut => 0,
            Self::LoggedIn => 1,
            Self::LoggingIn => 3,
            Self::InvalidCredentials => 10,
            Self::LockedOut => 11,
            Self::LoginError => 20,
        }
    }

    /// Human-readable label for operator displays.
    pub fn label(self) -> &'static str {
        match self {
            Self::LoggedOut => "Logged Out",
            Self::LoggingIn => "Logging In",
            Self::LoggedIn => "Logged In",
            Self::InvalidCredentials => "Invalid Credentials",
            Self::LockedOut => "Locked Out",
            Self::LoginError => "Login Error",
        }
    }
}

impl TryFrom<u16> for SessionState {
    type Error = u16;

    fn try_from(code: u16) -> Result<Self, u16> {
        match code {
            0 => Ok(Self::LoggedOut),
            1 => Ok(Self::LoggedIn),
            3 => Ok(Self::LoggingIn),
            10 => Ok(Self::InvalidCredentials),
            11 => Ok(Self::LockedOut),
            20 => Ok(Self::LoginError),
            other => Err(other),
        }
    }
}

/// Snapshot of the authentication session.
///
/// `session_id` is `Some` (and non-empty) exactly when `state` is
/// `LoggedIn`. Construct through [`Session::logged_in`] /
/// [`Session::without_id`] to keep that true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub state: SessionState,
    pub session_id: Option<String>,
    pub reason: String,
    pub failed_login_count: u32,
    pub last_client_type: Option<String>,
    pub last_client_label: Option<String>,
    /// Bumped on every transition.
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            state: SessionState::LoggedOut,
            session_id: None,
            reason: String::new(),
            failed_login_count: 0,
            last_client_type: None,
            last_client_label: None,
            version: 0,
            updated_at: Utc::now(),
        }
    }
}

impl Session {
    pub(crate) fn logged_in(session_id: String) -> Self {
        debug_assert!(!session_id.is_empty());
        Self {
            state: SessionState::LoggedIn,
            session_id: Some(session_id),
            ..Self::default()
        }
    }

    /// Any state but `LoggedIn`; the id is always dropped.
    pub(crate) fn without_id(state: SessionState, reason: impl Into<String>) -> Self {
        debug_assert!(state != SessionState::LoggedIn);
        Self {
            state,
            session_id: None,
            reason: reason.into(),
            ..Self::default()
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.state == SessionState::LoggedIn
    }

    pub fn label(&self) -> &'static str {
        self.state.label()
    }
}

/// Last-observed operating mode of the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemMode {
    pub active_persona: String,
    pub app: String,
    pub app_locked: bool,
    pub app_persona: String,
    pub eco_mode: String,
    pub mode: String,
    pub poly_call_control: bool,
    /// Body the snapshot was parsed from.
    pub raw_content: String,
    pub observed_at: DateTime<Utc>,
}

impl SystemMode {
    /// USB camera (device) mode.
    pub fn device_mode_enabled(&self) -> bool {
        self.active_persona
            .eq_ignore_ascii_case(SystemModeObject::DEVICE_MODE_PERSONA)
    }
}

impl From<SystemModeObject> for SystemMode {
    fn from(obj: SystemModeObject) -> Self {
        Self {
            active_persona: obj.active_persona,
            app: obj.app,
            app_locked: obj.app_locked,
            app_persona: obj.app_persona,
            eco_mode: obj.eco_mode,
            mode: obj.mode,
            poly_call_control: obj.poly_call_control,
            raw_content: obj.raw_content,
            observed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn codes_round_trip() {
        for state in SessionState::iter() {
            assert_eq!(SessionState::try_from(state.code()), Ok(state));
        }
        assert_eq!(SessionState::try_from(2), Err(2));
    }

    #[test]
    fn wire_codes_are_fixed() {
        assert_eq!(SessionState::LoggedOut.code(), 0);
        assert_eq!(SessionState::LoggedIn.code(), 1);
        assert_eq!(SessionState::LoggingIn.code(), 3);
        assert_eq!(SessionState::InvalidCredentials.code(), 10);
        assert_eq!(SessionState::LockedOut.code(), 11);
        assert_eq!(SessionState::LoginError.code(), 20);
    }

    #[test]
    fn state_names() {
        assert_eq!(SessionState::LockedOut.to_string(), "LOCKED_OUT");
        assert_eq!("LOGGED_IN".parse::<SessionState>().unwrap(), SessionState::LoggedIn);
        assert_eq!(SessionState::LoggedIn.label(), "Logged In");
    }

    #[test]
    fn only_logged_in_carries_an_id() {
        let s = Session::logged_in("abc".into());
        assert!(s.is_logged_in());
        assert_eq!(s.session_id.as_deref(), Some("abc"));

        let s = Session::without_id(SessionState::LockedOut, "locked");
        assert_eq!(s.session_id, None);
    }
}
