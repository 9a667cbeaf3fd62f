// ── Runtime device configuration ──
//
// Describes *how* to reach one endpoint and how hard to push it. Carries
// credential data and tuning, but never touches disk: the host builds a
// `DeviceConfig` and hands it to `Device::new`.

use std::time::Duration;

use url::Url;
use videoos_api::{AuthMode, Credentials, DispatcherConfig, DrainPolicy, TlsMode, TransportConfig};

use crate::error::CoreError;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification. Endpoints ship self-signed certificates.
    #[default]
    DangerAcceptInvalid,
}

impl From<&TlsVerification> for TlsMode {
    fn from(tls: &TlsVerification) -> Self {
        match tls {
            TlsVerification::SystemDefaults => Self::System,
            TlsVerification::CustomCa(path) => Self::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => Self::DangerAcceptInvalid,
        }
    }
}

/// Configuration for one device instance.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Hostname, IP, or full `http(s)://` base URL.
    pub host: String,
    pub credentials: Credentials,
    pub tls: TlsVerification,
    /// HTTP-level auth on top of the session cookie.
    pub auth_mode: AuthMode,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Concurrent in-flight requests.
    pub pool_size: usize,
    /// Commands allowed to wait for a pool slot.
    pub queue_depth: usize,
    /// Replays for idempotent commands.
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub drain: DrainPolicy,
    /// Status poll period while logged in. Zero disables polling.
    pub polling_interval: Duration,
    /// Failed-login count at which a rejected login is read as a lock-out.
    pub lockout_threshold: u32,
    /// How long a lock-out is served from cache before logging in again.
    pub lockout_cooldown: Duration,
    pub debug: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            credentials: Credentials::default(),
            tls: TlsVerification::default(),
            auth_mode: AuthMode::None,
            timeout: Duration::from_secs(5),
            pool_size: 10,
            queue_depth: 64,
            max_retries: 3,
            retry_base_delay: Duration::from_millis(100),
            drain: DrainPolicy::CancelInFlight,
            polling_interval: Duration::from_secs(2),
            lockout_threshold: 5,
            lockout_cooldown: Duration::from_secs(120),
            debug: false,
        }
    }
}

impl DeviceConfig {
    pub fn new(host: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            host: host.into(),
            credentials,
            ..Self::default()
        }
    }

    /// Base URL of the device. Bare hosts get `https://`.
    pub fn base_url(&self) -> Result<Url, CoreError> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(CoreError::Config {
                message: "device host is empty".into(),
            });
        }
        let raw = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_owned()
        } else {
            format!("https://{host}")
        };
        Url::parse(&raw).map_err(|e| CoreError::Config {
            message: format!("invalid device host `{host}`: {e}"),
        })
    }

    pub(crate) fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            tls: TlsMode::from(&self.tls),
            timeout: self.timeout,
            pool_size: self.pool_size,
        }
    }

    pub(crate) fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            pool_size: self.pool_size,
            queue_depth: self.queue_depth,
            timeout: self.timeout,
            max_retries: self.max_retries,
            retry_base_delay: self.retry_base_delay,
            drain: self.drain,
            auth_mode: self.auth_mode,
        }
    }
}
