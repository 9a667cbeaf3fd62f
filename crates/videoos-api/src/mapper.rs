// Response mapping: raw `Response` -> typed object.
//
// The target type comes from the originating command's kind, never from
// the body. A body that fails to parse yields a degraded object carrying
// only `raw_content`, alongside the parse error, so callers can decide
// whether partial data is acceptable. Status classification is independent
// of whether the body parsed.

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::command::CommandKind;
use crate::error::Error;
use crate::models::{SessionStateObject, SystemModeObject};
use crate::transport::Response;

/// Coarse HTTP status taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusClass {
    /// 2xx
    Success,
    /// 401, 403
    AuthFailure,
    /// 408, 504
    Timeout,
    /// Other 4xx
    ClientError,
    /// Other 5xx
    ServerError,
    /// 1xx, 3xx, or out of range
    Unexpected,
}

pub fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        401 | 403 => StatusClass::AuthFailure,
        408 | 504 => StatusClass::Timeout,
        400..=499 => StatusClass::ClientError,
        500..=599 => StatusClass::ServerError,
        _ => StatusClass::Unexpected,
    }
}

/// A mapped object plus what the mapper learned on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Mapped<T> {
    pub object: T,
    pub status: u16,
    pub class: StatusClass,
    /// Set when the body did not parse; `object` is then degraded.
    pub parse_error: Option<String>,
}

impl<T> Mapped<T> {
    /// The object, or a `Deserialization` error if it is degraded.
    pub fn into_result(self, body: &str) -> Result<T, Error> {
        match self.parse_error {
            None => Ok(self.object),
            Some(message) => Err(Error::Deserialization {
                message,
                body: body.to_owned(),
            }),
        }
    }
}

/// Typed result of mapping one response.
#[derive(Debug, Clone, PartialEq)]
pub enum MappedResponse {
    Session(Mapped<SessionStateObject>),
    SystemMode(Mapped<SystemModeObject>),
    /// Commands whose body carries nothing the client models.
    Ack { status: u16, class: StatusClass },
}

impl MappedResponse {
    pub fn into_session(self) -> Option<Mapped<SessionStateObject>> {
        match self {
            Self::Session(mapped) => Some(mapped),
            Self::SystemMode(_) | Self::Ack { .. } => None,
        }
    }

    pub fn into_system_mode(self) -> Option<Mapped<SystemModeObject>> {
        match self {
            Self::SystemMode(mapped) => Some(mapped),
            Self::Session(_) | Self::Ack { .. } => None,
        }
    }
}

/// Objects that remember the body they were parsed from.
pub trait RawContent: Default + DeserializeOwned {
    fn set_raw_content(&mut self, raw: String);
}

impl RawContent for SessionStateObject {
    fn set_raw_content(&mut self, raw: String) {
        self.raw_content = raw;
    }
}

impl RawContent for SystemModeObject {
    fn set_raw_content(&mut self, raw: String) {
        self.raw_content = raw;
    }
}

/// Parse `resp` into `T`, degrading on any parse failure.
pub fn map_body<T: RawContent>(resp: &Response) -> Mapped<T> {
    let class = classify_status(resp.status);
    let parsed = if resp.body.trim().is_empty() {
        Err("empty body".to_owned())
    } else {
        serde_json::from_str::<T>(&resp.body).map_err(|e| e.to_string())
    };

    let (mut object, parse_error) = match parsed {
        Ok(object) => (object, None),
        Err(message) => {
            debug!(status = resp.status, error = %message, "degraded response body");
            (T::default(), Some(message))
        }
    };
    object.set_raw_content(resp.body.clone());

    Mapped {
        object,
        status: resp.status,
        class,
        parse_error,
    }
}

/// Map a response according to the command kind that produced it.
pub fn map_response(kind: CommandKind, resp: &Response) -> MappedResponse {
    match kind {
        CommandKind::Login | CommandKind::Logout => MappedResponse::Session(map_body(resp)),
        CommandKind::SystemModeStatus => MappedResponse::SystemMode(map_body(resp)),
        CommandKind::StartDeviceMode
        | CommandKind::StopDeviceMode
        | CommandKind::Reboot
        | CommandKind::Raw => MappedResponse::Ack {
            status: resp.status,
            class: classify_status(resp.status),
        },
    }
}
