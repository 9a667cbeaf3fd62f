// ── Core error types ──
//
// User-facing errors from videoos-core. Consumers never see reqwest or
// serde errors directly; the `From<videoos_api::Error>` impl folds
// transport-layer failures into this taxonomy.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Transport ────────────────────────────────────────────────────
    #[error("Cannot reach device: {message}")]
    Transport { message: String },

    #[error("Device request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Session ──────────────────────────────────────────────────────
    #[error("Credentials rejected by device")]
    AuthRejected,

    #[error("Account locked out after {failed_logins} failed login(s)")]
    AccountLocked { failed_logins: u32 },

    #[error("Session expired -- login required")]
    SessionExpired,

    #[error("A login is already in progress")]
    AlreadyInProgress,

    #[error("Not connected -- operation requires an active session")]
    NotConnected,

    // ── Data ─────────────────────────────────────────────────────────
    #[error("Malformed response from device: {message}")]
    MalformedResponse { message: String },

    #[error("Device answered HTTP {status}")]
    Api { status: u16 },

    // ── Dispatcher ───────────────────────────────────────────────────
    #[error("Command queue saturated ({depth} waiting)")]
    QueueSaturated { depth: usize },

    #[error("Operation cancelled")]
    Cancelled,

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<videoos_api::Error> for CoreError {
    fn from(err: videoos_api::Error) -> Self {
        match err {
            videoos_api::Error::Transport(e) => {
                if e.is_timeout() {
                    Self::Timeout { timeout_secs: 0 }
                } else {
                    Self::Transport {
                        message: e.to_string(),
                    }
                }
            }
            videoos_api::Error::ServerError { status, attempts } => Self::Transport {
                message: format!("server error HTTP {status} after {attempts} attempt(s)"),
            },
            videoos_api::Error::Tls(message) => Self::Transport {
                message: format!("TLS: {message}"),
            },
            videoos_api::Error::Timeout { timeout_secs } => Self::Timeout { timeout_secs },
            videoos_api::Error::InvalidUrl(e) => Self::Config {
                message: format!("invalid URL: {e}"),
            },
            videoos_api::Error::InvalidCommand(message) => Self::Config { message },
            videoos_api::Error::QueueSaturated { depth } => Self::QueueSaturated { depth },
            videoos_api::Error::Cancelled => Self::Cancelled,
            videoos_api::Error::NotConnected => Self::NotConnected,
            videoos_api::Error::Deserialization { message, .. } => {
                Self::MalformedResponse { message }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_error_is_a_transport_error() {
        let err = CoreError::from(videoos_api::Error::ServerError {
            status: 503,
            attempts: 4,
        });
        assert!(matches!(err, CoreError::Transport { .. }));
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn dispatcher_lifecycle_errors_pass_through() {
        assert!(matches!(
            CoreError::from(videoos_api::Error::Cancelled),
            CoreError::Cancelled
        ));
        assert!(matches!(
            CoreError::from(videoos_api::Error::NotConnected),
            CoreError::NotConnected
        ));
        assert!(matches!(
            CoreError::from(videoos_api::Error::QueueSaturated { depth: 3 }),
            CoreError::QueueSaturated { depth: 3 }
        ));
    }
}
