use thiserror::Error;

/// Top-level error type for the `videoos-api` crate.
///
/// Covers every failure a queued command can resolve with: transport,
/// dispatcher backpressure and lifecycle, command rendering, and body
/// decoding. `videoos-core` maps these into the session-level taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The device kept answering with a server error until the retry
    /// budget ran out.
    #[error("Server error (HTTP {status}) after {attempts} attempt(s)")]
    ServerError { status: u16, attempts: u32 },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Dispatcher ──────────────────────────────────────────────────
    /// Too many commands are already waiting for a pool slot.
    #[error("Command queue saturated ({depth} commands waiting)")]
    QueueSaturated { depth: usize },

    /// The command was cancelled before it completed (dispatcher shutdown).
    #[error("Command cancelled")]
    Cancelled,

    /// The dispatcher has been shut down and accepts no more commands.
    #[error("Not connected -- dispatcher has been shut down")]
    NotConnected,

    // ── Commands ────────────────────────────────────────────────────
    /// The command's payload does not fit its input format.
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying
    /// (for idempotent commands only).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Timeout { .. } | Self::ServerError { .. } => true,
            _ => false,
        }
    }
}
