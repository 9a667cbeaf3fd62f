// Queued REST commands and their wire rendering.
//
// A `QueuedCommand` carries everything the dispatcher needs to put one
// request on the wire: verb, path template, input binding, payload, and
// bookkeeping (correlation id, submission time). Rendering is pure and
// happens before any network I/O, so a payload that doesn't fit its
// binding fails with `InvalidCommand` without touching the device.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::Value;
use url::Url;
use uuid::Uuid;

use crate::auth::Credentials;
use crate::error::Error;

/// Base path every device endpoint lives under.
pub const REST_BASE: &str = "/rest";

/// How a command's payload is bound onto the HTTP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputFormat {
    /// No payload; no body.
    None,
    /// Substituted into `{name}` placeholders (or appended as segments).
    Path,
    /// Encoded as query-string pairs.
    Query,
    /// Serialized as the JSON body.
    BodyJson,
    /// Sent as a `text/plain` body.
    BodyText,
}

impl InputFormat {
    fn content_type(self) -> Option<&'static str> {
        match self {
            Self::BodyJson => Some("application/json"),
            Self::BodyText => Some("text/plain"),
            Self::None | Self::Path | Self::Query => None,
        }
    }
}

/// Semantic kind of a command. Decides the REST route and, on the way
/// back, which typed object the response is mapped into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Login,
    Logout,
    SystemModeStatus,
    StartDeviceMode,
    StopDeviceMode,
    Reboot,
    /// Caller-built request with its own route; mapped as a plain ack.
    Raw,
}

impl CommandKind {
    /// Route relative to [`REST_BASE`].
    pub fn path(self) -> &'static str {
        match self {
            Self::Login | Self::Logout => "session",
            Self::SystemModeStatus => "system/mode",
            Self::StartDeviceMode | Self::StopDeviceMode => "system/mode/device",
            Self::Reboot => "system/reboot",
            Self::Raw => "",
        }
    }

    pub fn method(self) -> Method {
        match self {
            Self::Login | Self::StartDeviceMode | Self::Reboot => Method::POST,
            Self::Logout | Self::StopDeviceMode => Method::DELETE,
            Self::SystemModeStatus | Self::Raw => Method::GET,
        }
    }

    pub fn input_format(self) -> InputFormat {
        match self {
            Self::Login => InputFormat::BodyJson,
            _ => InputFormat::None,
        }
    }
}

/// One REST call awaiting execution by the dispatcher.
#[derive(Clone)]
pub struct QueuedCommand {
    pub kind: CommandKind,
    pub method: Method,
    pub path_template: String,
    pub input_format: InputFormat,
    pub payload: Option<Value>,
    pub correlation_id: Uuid,
    pub submitted_at: DateTime<Utc>,
    /// Per-command override of the dispatcher timeout.
    pub timeout: Option<Duration>,
    /// Payload carries secrets; never logged.
    sensitive: bool,
}

impl QueuedCommand {
    /// A command for one of the device's fixed routes.
    pub fn new(kind: CommandKind) -> Self {
        Self {
            kind,
            method: kind.method(),
            path_template: kind.path().to_owned(),
            input_format: kind.input_format(),
            payload: None,
            correlation_id: Uuid::new_v4(),
            submitted_at: Utc::now(),
            timeout: None,
            sensitive: false,
        }
    }

    /// A caller-routed command (`CommandKind::Raw`).
    pub fn raw(method: Method, path_template: impl Into<String>, input_format: InputFormat) -> Self {
        Self {
            method,
            path_template: path_template.into(),
            input_format,
            ..Self::new(CommandKind::Raw)
        }
    }

    /// `POST /rest/session` with the credential body.
    pub fn login(credentials: &Credentials) -> Self {
        let mut cmd = Self::new(CommandKind::Login).with_payload(credentials.login_body());
        cmd.sensitive = true;
        cmd
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Safe to replay: GET-style verbs only, and never a login.
    pub fn is_idempotent(&self) -> bool {
        self.kind != CommandKind::Login
            && matches!(self.method, Method::GET | Method::HEAD | Method::OPTIONS)
    }

    /// Full request path, always rooted at `/rest`.
    pub fn full_path(&self) -> String {
        let sub = self.path_template.trim_start_matches('/');
        let rooted = self
            .path_template
            .strip_prefix(REST_BASE)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'));
        if rooted {
            self.path_template.clone()
        } else if sub.is_empty() {
            REST_BASE.to_owned()
        } else {
            format!("{REST_BASE}/{sub}")
        }
    }

    /// Bind the payload and produce the concrete URL and body.
    pub fn render(&self, base: &Url) -> Result<RenderedCommand, Error> {
        let mut url = base.clone();
        url.set_query(None);
        url.set_fragment(None);

        let path = self.full_path();
        let payload = self.payload.as_ref().filter(|v| !v.is_null());
        let mut consumed_by_placeholder = false;

        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| Error::InvalidCommand(format!("base URL {base} cannot carry a path")))?;
            segments.pop_if_empty();

            for segment in path.split('/').filter(|s| !s.is_empty()) {
                match placeholder_name(segment) {
                    Some(name) => {
                        if self.input_format != InputFormat::Path {
                            return Err(Error::InvalidCommand(format!(
                                "placeholder {{{name}}} in {path} needs Path input"
                            )));
                        }
                        let value = payload
                            .and_then(|p| p.get(name))
                            .ok_or_else(|| {
                                Error::InvalidCommand(format!("missing path value for {{{name}}}"))
                            })
                            .and_then(|v| scalar_text(v, name))?;
                        segments.push(&value);
                        consumed_by_placeholder = true;
                    }
                    None => {
                        segments.push(segment);
                    }
                }
            }

            if self.input_format == InputFormat::Path && !consumed_by_placeholder {
                if let Some(payload) = payload {
                    for value in extra_segments(payload)? {
                        segments.push(&value);
                    }
                }
            }
        }

        let mut body = None;
        match self.input_format {
            InputFormat::None | InputFormat::Path => {}
            InputFormat::Query => {
                if let Some(payload) = payload {
                    let Value::Object(map) = payload else {
                        return Err(Error::InvalidCommand(
                            "query payload must be a JSON object".into(),
                        ));
                    };
                    let mut pairs = url.query_pairs_mut();
                    for (key, value) in map {
                        pairs.append_pair(key, &scalar_text(value, key)?);
                    }
                }
            }
            InputFormat::BodyJson => {
                let payload = payload.ok_or_else(|| {
                    Error::InvalidCommand("JSON body command has no payload".into())
                })?;
                body = Some(payload.to_string());
            }
            InputFormat::BodyText => {
                body = Some(match payload {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => {
                        return Err(Error::InvalidCommand(
                            "text body command has no payload".into(),
                        ));
                    }
                });
            }
        }

        Ok(RenderedCommand {
            url,
            body,
            content_type: self.input_format.content_type(),
        })
    }
}

impl fmt::Debug for QueuedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let payload: &dyn fmt::Debug = match (&self.payload, self.sensitive) {
            (Some(_), true) => &"<redacted>",
            (payload, _) => payload,
        };
        f.debug_struct("QueuedCommand")
            .field("kind", &self.kind)
            .field("method", &self.method)
            .field("path_template", &self.path_template)
            .field("input_format", &self.input_format)
            .field("payload", payload)
            .field("correlation_id", &self.correlation_id)
            .field("submitted_at", &self.submitted_at)
            .finish_non_exhaustive()
    }
}

/// Output of [`QueuedCommand::render`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCommand {
    pub url: Url,
    pub body: Option<String>,
    pub content_type: Option<&'static str>,
}

fn placeholder_name(segment: &str) -> Option<&str> {
    segment.strip_prefix('{')?.strip_suffix('}')
}

fn scalar_text(value: &Value, name: &str) -> Result<String, Error> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => Err(Error::InvalidCommand(format!(
            "value for `{name}` must be a scalar"
        ))),
    }
}

fn extra_segments(payload: &Value) -> Result<Vec<String>, Error> {
    match payload {
        Value::Array(items) => items.iter().map(|v| scalar_text(v, "path")).collect(),
        Value::Object(map) => map.iter().map(|(k, v)| scalar_text(v, k)).collect(),
        scalar => Ok(vec![scalar_text(scalar, "path")?]),
    }
}
