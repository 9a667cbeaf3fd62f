//! Shared configuration for VideoOS tools.
//!
//! TOML profiles, credential resolution (env + plaintext + keyring),
//! and translation to `videoos_core::DeviceConfig`. The CLI layers its
//! flag overrides on top of what this crate resolves.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use videoos_core::{AuthMode, Credentials, DeviceConfig, TlsVerification};

const KEYRING_SERVICE: &str = "videoos";
const ENV_PREFIX: &str = "VIDEOOS_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{profile}' not found")]
    UnknownProfile { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named device profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Name of the profile to use: explicit override, then `default_profile`.
    pub fn active_profile_name(&self, requested: Option<&str>) -> String {
        requested
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into())
    }

    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.into(),
            })
    }
}

/// Values applied to every profile that does not override them.
#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    /// Endpoints ship self-signed certificates.
    #[serde(default = "default_insecure")]
    pub insecure: bool,

    /// Per-request timeout, seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_polling_interval_ms")]
    pub polling_interval_ms: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            insecure: default_insecure(),
            timeout: default_timeout(),
            polling_interval_ms: default_polling_interval_ms(),
        }
    }
}

fn default_insecure() -> bool {
    true
}
fn default_timeout() -> u64 {
    5
}
fn default_polling_interval_ms() -> u64 {
    2000
}

/// A named device profile.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Hostname, IP, or base URL (e.g., "https://10.0.0.20").
    pub host: String,

    pub username: Option<String>,

    /// Plaintext password (prefer keyring or `VIDEOOS_PASSWORD`).
    pub password: Option<String>,

    /// HTTP-level auth: "none" or "basic".
    #[serde(default = "default_auth_mode")]
    pub auth_mode: String,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Override timeout, seconds.
    pub timeout: Option<u64>,

    pub pool_size: Option<usize>,

    pub queue_depth: Option<usize>,

    pub max_retries: Option<u32>,

    /// Override status poll period; 0 disables polling.
    pub polling_interval_ms: Option<u64>,

    #[serde(default)]
    pub debug: bool,
}

fn default_auth_mode() -> String {
    "none".into()
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "videoos", "videoos").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("videoos");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_at(&config_path())
}

/// Load the full Config from `path` + environment. A missing file is
/// not an error.
pub fn load_config_at(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading config");
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));
    Ok(figment.extract()?)
}

/// Load config, returning a default if the file doesn't parse.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve username + password without CLI flags.
///
/// Username: profile, then `VIDEOOS_USERNAME`. Password: `VIDEOOS_PASSWORD`,
/// then the profile's plaintext value, then the system keyring entry
/// `videoos / <profile>/password`.
pub fn resolve_credentials(
    profile: &Profile,
    profile_name: &str,
) -> Result<Credentials, ConfigError> {
    let username = profile
        .username
        .clone()
        .or_else(|| std::env::var(format!("{ENV_PREFIX}USERNAME")).ok())
        .ok_or_else(|| ConfigError::NoCredentials {
            profile: profile_name.into(),
        })?;

    let password = resolve_password(profile, profile_name)?;
    Ok(Credentials { username, password })
}

fn resolve_password(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Env var
    if let Ok(pw) = std::env::var(format!("{ENV_PREFIX}PASSWORD")) {
        return Ok(SecretString::from(pw));
    }

    // 2. Plaintext in config
    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }

    // 3. Keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password")) {
        if let Ok(pw) = entry.get_password() {
            return Ok(SecretString::from(pw));
        }
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

fn parse_auth_mode(raw: &str) -> Result<AuthMode, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "none" | "" => Ok(AuthMode::None),
        "basic" => Ok(AuthMode::Basic),
        other => Err(ConfigError::Validation {
            field: "auth_mode".into(),
            reason: format!("expected 'none' or 'basic', got '{other}'"),
        }),
    }
}

/// Pick the TLS mode: an explicit `insecure` wins, then a CA file, then the
/// default `insecure` setting.
fn resolve_tls(profile: &Profile, defaults: &Defaults) -> TlsVerification {
    match (profile.insecure, &profile.ca_cert) {
        (Some(true), _) => TlsVerification::DangerAcceptInvalid,
        (_, Some(ca)) => TlsVerification::CustomCa(ca.clone()),
        (Some(false), None) => TlsVerification::SystemDefaults,
        (None, None) if defaults.insecure => TlsVerification::DangerAcceptInvalid,
        (None, None) => TlsVerification::SystemDefaults,
    }
}

/// Build a `DeviceConfig` from a profile and the global defaults. No CLI
/// overrides, credentials not resolved.
pub fn profile_to_device_config_with(
    profile: &Profile,
    defaults: &Defaults,
    credentials: Credentials,
) -> Result<DeviceConfig, ConfigError> {
    if profile.host.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: "host".into(),
            reason: "must not be empty".into(),
        });
    }
    let base = DeviceConfig::default();
    let pool_size = profile.pool_size.unwrap_or(base.pool_size);
    if pool_size == 0 {
        return Err(ConfigError::Validation {
            field: "pool_size".into(),
            reason: "must be at least 1".into(),
        });
    }

    Ok(DeviceConfig {
        host: profile.host.clone(),
        credentials,
        tls: resolve_tls(profile, defaults),
        auth_mode: parse_auth_mode(&profile.auth_mode)?,
        timeout: Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)),
        pool_size,
        queue_depth: profile.queue_depth.unwrap_or(base.queue_depth),
        max_retries: profile.max_retries.unwrap_or(base.max_retries),
        polling_interval: Duration::from_millis(
            profile
                .polling_interval_ms
                .unwrap_or(defaults.polling_interval_ms),
        ),
        debug: profile.debug,
        ..base
    })
}

/// Build a `DeviceConfig` from a profile, resolving its credentials.
pub fn profile_to_device_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<DeviceConfig, ConfigError> {
    let credentials = resolve_credentials(profile, profile_name)?;
    profile_to_device_config_with(profile, defaults, credentials)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    const SAMPLE: &str = r#"
        default_profile = "studio"

        [defaults]
        timeout = 8

        [profiles.studio]
        host = "10.0.0.20"
        username = "admin"
        password = "plain"
        polling_interval_ms = 0

        [profiles.lab]
        host = "https://lab.example"
        ca_cert = "/etc/ssl/lab.pem"
        auth_mode = "basic"
        timeout = 15
        pool_size = 4
    "#;

    fn parse(toml: &str) -> Config {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::string(toml))
            .extract()
            .unwrap()
    }

    #[test]
    fn parses_profiles_and_defaults() {
        let cfg = parse(SAMPLE);
        assert_eq!(cfg.active_profile_name(None), "studio");
        assert_eq!(cfg.active_profile_name(Some("lab")), "lab");
        assert_eq!(cfg.defaults.timeout, 8);
        assert_eq!(cfg.defaults.polling_interval_ms, 2000);
        assert!(cfg.defaults.insecure);
        assert_eq!(cfg.profile("lab").unwrap().auth_mode, "basic");
        assert!(matches!(
            cfg.profile("nope"),
            Err(ConfigError::UnknownProfile { .. })
        ));
    }

    #[test]
    fn profile_translates_to_device_config() {
        let cfg = parse(SAMPLE);
        let creds = Credentials::new("admin", "pw");

        let studio =
            profile_to_device_config_with(cfg.profile("studio").unwrap(), &cfg.defaults, creds.clone())
                .unwrap();
        assert_eq!(studio.host, "10.0.0.20");
        assert_eq!(studio.timeout, Duration::from_secs(8));
        assert_eq!(studio.polling_interval, Duration::ZERO);
        assert_eq!(studio.tls, TlsVerification::DangerAcceptInvalid);
        assert_eq!(studio.auth_mode, AuthMode::None);
        assert_eq!(studio.pool_size, 10);

        let lab = profile_to_device_config_with(cfg.profile("lab").unwrap(), &cfg.defaults, creds)
            .unwrap();
        assert_eq!(lab.timeout, Duration::from_secs(15));
        assert_eq!(lab.pool_size, 4);
        assert_eq!(lab.auth_mode, AuthMode::Basic);
        assert_eq!(lab.tls, TlsVerification::CustomCa("/etc/ssl/lab.pem".into()));
        assert_eq!(lab.polling_interval, Duration::from_secs(2));
    }

    #[test]
    fn tls_precedence() {
        let defaults = Defaults::default();
        let mut p = Profile {
            ca_cert: Some("/ca.pem".into()),
            insecure: Some(true),
            ..Profile::default()
        };
        assert_eq!(resolve_tls(&p, &defaults), TlsVerification::DangerAcceptInvalid);
        p.insecure = None;
        assert_eq!(resolve_tls(&p, &defaults), TlsVerification::CustomCa("/ca.pem".into()));
        p.ca_cert = None;
        p.insecure = Some(false);
        assert_eq!(resolve_tls(&p, &defaults), TlsVerification::SystemDefaults);
    }

    #[test]
    fn rejects_bad_values() {
        let defaults = Defaults::default();
        let creds = Credentials::new("a", "b");
        let empty = Profile::default();
        assert!(matches!(
            profile_to_device_config_with(&empty, &defaults, creds.clone()),
            Err(ConfigError::Validation { ref field, .. }) if field == "host"
        ));

        let bad_auth = Profile {
            host: "h".into(),
            auth_mode: "digest".into(),
            ..Profile::default()
        };
        assert!(matches!(
            profile_to_device_config_with(&bad_auth, &defaults, creds.clone()),
            Err(ConfigError::Validation { ref field, .. }) if field == "auth_mode"
        ));

        let no_pool = Profile {
            host: "h".into(),
            pool_size: Some(0),
            ..Profile::default()
        };
        assert!(profile_to_device_config_with(&no_pool, &defaults, creds).is_err());
    }

    #[test]
    fn plaintext_password_is_used() {
        if std::env::var("VIDEOOS_PASSWORD").is_ok() {
            return;
        }
        let p = Profile {
            host: "h".into(),
            username: Some("admin".into()),
            password: Some("plain".into()),
            ..Profile::default()
        };
        let creds = resolve_credentials(&p, "studio").unwrap();
        assert_eq!(creds.username, "admin");
        assert_eq!(creds.password.expose_secret(), "plain");
    }

    #[test]
    fn loads_profiles_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let loaded = load_config_at(&path).unwrap();
        assert_eq!(loaded.default_profile.as_deref(), Some("studio"));
        assert_eq!(loaded.profiles.len(), 2);
        assert_eq!(loaded.profile("lab").unwrap().pool_size, Some(4));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_at(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.default_profile.as_deref(), Some("default"));
        assert!(cfg.profiles.is_empty());
    }
}
