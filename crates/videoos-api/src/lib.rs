// videoos-api: Async REST transport for VideoOS collaboration endpoints

pub mod auth;
pub mod command;
pub mod dispatcher;
pub mod error;
pub mod mapper;
pub mod models;
pub mod transport;

pub use auth::{AuthMode, Credentials};
pub use command::{CommandKind, InputFormat, QueuedCommand};
pub use dispatcher::{DispatcherConfig, DispatcherStats, DrainPolicy, RequestDispatcher};
pub use error::Error;
pub use mapper::{Mapped, MappedResponse, StatusClass, classify_status, map_response};
pub use models::{LoginOutcome, SessionStateObject, SystemModeObject};
pub use transport::{HttpRequest, HttpsTransport, Response, TlsMode, Transport, TransportConfig};
