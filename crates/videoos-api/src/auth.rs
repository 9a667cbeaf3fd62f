use secrecy::{ExposeSecret, SecretString};

/// How outbound requests authenticate at the HTTP layer.
///
/// Independent of the session login: `Basic` adds an `Authorization`
/// header built from the configured credentials to every request, on top
/// of the session cookie the device hands out after login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    /// No HTTP-level authentication header.
    #[default]
    None,
    /// HTTP Basic authentication from username/password.
    Basic,
}

/// Username/password pair for logging into the device.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// Both fields must be non-empty before a login is attempted.
    pub fn is_valid(&self) -> bool {
        !self.username.is_empty() && !self.password.expose_secret().is_empty()
    }

    /// JSON body for `POST /rest/session`.
    pub(crate) fn login_body(&self) -> serde_json::Value {
        serde_json::json!({
            "user": self.username,
            "password": self.password.expose_secret(),
        })
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: SecretString::from(String::new()),
        }
    }
}

/// Format the session cookie the device expects on authenticated requests.
pub fn session_cookie(session_id: &str) -> String {
    format!("session_id={session_id}")
}
