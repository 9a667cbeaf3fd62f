// Transport configuration and the HTTP seam used by the dispatcher.
//
// `TransportConfig` builds the pooled `reqwest::Client`; `Transport` is the
// object-safe trait the dispatcher drives, so tests can substitute a fake
// without a socket.

use std::path::PathBuf;
use std::time::Duration;

use futures_util::future::BoxFuture;
use secrecy::{ExposeSecret, SecretString};
use tracing::trace;
use url::Url;

use crate::error::Error;

/// TLS verification mode (api-level mirror of core's `TlsVerification`).
#[derive(Debug, Clone)]
pub enum TlsMode {
    /// Use the system certificate store.
    System,
    /// Use a custom CA certificate from the given PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate (codecs ship self-signed).
    DangerAcceptInvalid,
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    pub timeout: Duration,
    /// Upper bound on idle pooled connections per host.
    pub pool_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::DangerAcceptInvalid,
            timeout: Duration::from_secs(30),
            pool_size: 10,
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .pool_max_idle_per_host(self.pool_size)
            .user_agent(concat!("videoos/", env!("CARGO_PKG_VERSION")));

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => {
                let cert_pem = std::fs::read(path)
                    .map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?;
                let cert = reqwest::Certificate::from_pem(&cert_pem)
                    .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }
}

// ── Request / response ───────────────────────────────────────────────

/// A fully rendered HTTP exchange, ready for the wire.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: reqwest::Method,
    pub url: Url,
    /// Ordered header list; duplicates are sent as-is.
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    /// Basic-auth pair, applied by the transport.
    pub basic_auth: Option<(String, SecretString)>,
}

/// Raw HTTP response handed back to the caller of `submit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    /// Ordered header list as received.
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub url: String,
}

impl Response {
    /// First header value matching `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The HTTP seam the dispatcher executes commands through.
pub trait Transport: Send + Sync {
    fn execute(&self, request: HttpRequest) -> BoxFuture<'_, Result<Response, Error>>;
}

// ── reqwest-backed transport ─────────────────────────────────────────

/// Production transport over a pooled `reqwest::Client`.
pub struct HttpsTransport {
    http: reqwest::Client,
}

impl HttpsTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: config.build_client()?,
        })
    }

    /// Wrap a pre-built client (tests, custom TLS setups).
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl Transport for HttpsTransport {
    fn execute(&self, request: HttpRequest) -> BoxFuture<'_, Result<Response, Error>> {
        Box::pin(async move {
            let HttpRequest {
                method,
                url,
                headers,
                body,
                basic_auth,
            } = request;

            let mut builder = self.http.request(method, url);
            for (name, value) in &headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if let Some((user, password)) = basic_auth {
                builder = builder.basic_auth(user, Some(password.expose_secret()));
            }
            if let Some(body) = body {
                builder = builder.body(body);
            }

            let resp = builder.send().await.map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout { timeout_secs: 0 }
                } else {
                    Error::Transport(e)
                }
            })?;

            let status = resp.status().as_u16();
            let url = resp.url().to_string();
            let headers = resp
                .headers()
                .iter()
                .map(|(k, v)| {
                    (
                        k.as_str().to_owned(),
                        String::from_utf8_lossy(v.as_bytes()).into_owned(),
                    )
                })
                .collect();
            let body = resp.text().await.map_err(Error::Transport)?;
            trace!(status, %url, "response received");

            Ok(Response {
                status,
                headers,
                body,
                url,
            })
        })
    }
}
