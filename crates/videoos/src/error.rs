//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use videoos_config::ConfigError;
use videoos_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the device: {reason}")]
    #[diagnostic(
        code(videoos::connection_failed),
        help(
            "Check that the endpoint is powered on and reachable.\n\
             Self-signed certificate? Try: videoos status --insecure"
        )
    )]
    ConnectionFailed { reason: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Login rejected by the device")]
    #[diagnostic(
        code(videoos::auth_failed),
        help(
            "Verify the username and password for this profile.\n\
             The password is read from VIDEOOS_PASSWORD, the profile, or the system keyring."
        )
    )]
    AuthFailed,

    #[error("Account locked out after {failed_logins} failed login(s)")]
    #[diagnostic(
        code(videoos::locked_out),
        help("Wait for the device lock-out period to pass before retrying.")
    )]
    LockedOut { failed_logins: u32 },

    #[error("Session expired")]
    #[diagnostic(code(videoos::session_expired), help("Run the command again to log in."))]
    SessionExpired,

    #[error("No credentials configured for profile '{profile}'")]
    #[diagnostic(
        code(videoos::no_credentials),
        help(
            "Pass --username and set VIDEOOS_PASSWORD,\n\
             or add username/password to the profile in your config file."
        )
    )]
    NoCredentials { profile: String },

    // ── Device ───────────────────────────────────────────────────────
    #[error("Device error: {message}")]
    #[diagnostic(code(videoos::device))]
    Device { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(videoos::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(videoos::profile_not_found),
        help("Available profiles: {available}")
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No device configured")]
    #[diagnostic(
        code(videoos::no_config),
        help(
            "Pass --host, or add a profile to the config file.\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(code(videoos::config))]
    Config { message: String },

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(videoos::timeout),
        help("Increase timeout with --timeout or check device responsiveness.")
    )]
    Timeout { seconds: u64 },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render output: {0}")]
    #[diagnostic(code(videoos::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed
            | Self::LockedOut { .. }
            | Self::SessionExpired
            | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Transport { message } => Self::ConnectionFailed { reason: message },
            CoreError::Timeout { timeout_secs } => Self::Timeout {
                seconds: timeout_secs,
            },
            CoreError::AuthRejected => Self::AuthFailed,
            CoreError::AccountLocked { failed_logins } => Self::LockedOut { failed_logins },
            CoreError::SessionExpired => Self::SessionExpired,
            CoreError::Config { message } => Self::Validation {
                field: "device".into(),
                reason: message,
            },
            other @ (CoreError::AlreadyInProgress
            | CoreError::NotConnected
            | CoreError::MalformedResponse { .. }
            | CoreError::Api { .. }
            | CoreError::QueueSaturated { .. }
            | CoreError::Cancelled) => Self::Device {
                message: other.to_string(),
            },
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => Self::NoCredentials { profile },
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::UnknownProfile { profile } => Self::ProfileNotFound {
                name: profile,
                available: String::new(),
            },
            ConfigError::Io(e) => Self::Io(e),
            other @ (ConfigError::Serialization(_) | ConfigError::Figment(_)) => Self::Config {
                message: other.to_string(),
            },
        }
    }
}
