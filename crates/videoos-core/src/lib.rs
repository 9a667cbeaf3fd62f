// videoos-core: Session state machine, event bus, and device facade

pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod model;
pub mod session;

pub use config::{DeviceConfig, TlsVerification};
pub use device::{DebugState, Device};
pub use error::CoreError;
pub use events::{
    EventBus, EventKey, FeedbackEvent, FeedbackValue, KeyFilter, SubscriptionHandle, ValueKind,
};
pub use model::{Session, SessionState, SystemMode};
pub use session::SessionManager;

pub use videoos_api::{AuthMode, Credentials, DispatcherStats, DrainPolicy};
