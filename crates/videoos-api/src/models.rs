// Wire objects returned by the device.
//
// Every field defaults, so a partial body still deserializes. Devices in
// the field disagree on where the login outcome lives: some nest it under
// `loginStatus`, others flatten `LoginResult`/`failedLoginCount` to the top
// level. Both shapes are accepted and the flattened one wins.

use serde::{Deserialize, Serialize};

/// Body of `POST /rest/session` (and of its error answers).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionStateObject {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_status: Option<LoginStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionInfo>,
    /// Flattened login result (`LoginResult` or `loginResult`).
    #[serde(rename = "LoginResult", alias = "loginResult", skip_serializing_if = "Option::is_none")]
    pub login_result: Option<String>,
    /// Flattened failure counter (`failedLoginCount` or `failedLogins`).
    #[serde(alias = "failedLogins", skip_serializing_if = "Option::is_none")]
    pub failed_login_count: Option<u32>,
    /// Original body; populated by the mapper, never sent.
    #[serde(skip)]
    pub raw_content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginStatus {
    pub failed_logins: u32,
    pub is_password_age_limit_reached: bool,
    pub last_login_client: Option<String>,
    pub last_login_client_type: Option<String>,
    pub last_login_time: i64,
    pub login_result: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionInfo {
    pub client_type: Option<String>,
    pub creation_time: i64,
    pub is_authenticated: bool,
    pub is_connected: bool,
    pub is_new: bool,
    pub is_stale: bool,
    pub location: Option<String>,
    pub role: Option<String>,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
}

/// Coarse reading of a device login-result string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    Success,
    InvalidCredentials,
    LockedOut,
    Unknown,
}

impl LoginOutcome {
    pub fn parse(raw: &str) -> Self {
        let upper = raw.trim().to_ascii_uppercase();
        if upper.contains("LOCK") {
            Self::LockedOut
        } else if upper.contains("INVALID") || upper.contains("CREDENTIAL") || upper.contains("DENIED") {
            Self::InvalidCredentials
        } else if matches!(upper.as_str(), "SUCCESS" | "LOGIN_SUCCESS" | "LOGGED_IN" | "OK") {
            Self::Success
        } else {
            Self::Unknown
        }
    }
}

impl SessionStateObject {
    /// Login result, preferring the flattened field.
    pub fn login_result(&self) -> Option<&str> {
        self.login_result
            .as_deref()
            .or_else(|| self.login_status.as_ref()?.login_result.as_deref())
            .filter(|s| !s.is_empty())
    }

    pub fn login_outcome(&self) -> Option<LoginOutcome> {
        self.login_result().map(LoginOutcome::parse)
    }

    /// Failed-login counter, preferring the flattened field.
    pub fn failed_logins(&self) -> u32 {
        self.failed_login_count
            .or_else(|| self.login_status.as_ref().map(|s| s.failed_logins))
            .unwrap_or(0)
    }

    /// Non-empty session id, if the device issued one.
    pub fn session_id(&self) -> Option<&str> {
        self.session
            .as_ref()?
            .session_id
            .as_deref()
            .filter(|id| !id.is_empty())
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref().filter(|r| !r.is_empty())
    }

    pub fn last_client_type(&self) -> Option<&str> {
        self.login_status.as_ref()?.last_login_client_type.as_deref()
    }

    pub fn last_client_label(&self) -> Option<&str> {
        self.login_status.as_ref()?.last_login_client.as_deref()
    }
}

/// Body of `GET /rest/system/mode`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SystemModeObject {
    pub active_persona: String,
    pub app: String,
    pub app_locked: bool,
    pub app_persona: String,
    pub eco_mode: String,
    pub mode: String,
    pub poly_call_control: bool,
    /// Original body, kept for diagnostics.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub raw_content: String,
}

impl SystemModeObject {
    /// Persona the device reports while acting as a USB camera.
    pub const DEVICE_MODE_PERSONA: &'static str = "camuvc";

    pub fn device_mode_enabled(&self) -> bool {
        self.active_persona
            .eq_ignore_ascii_case(Self::DEVICE_MODE_PERSONA)
    }
}
