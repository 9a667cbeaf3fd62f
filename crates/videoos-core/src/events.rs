// ── Event bus ──
//
// Edge-triggered notifications keyed by observable. `observe` records the
// new value and, only if it differs from the last one (or is the first
// one), calls every matching subscriber synchronously in registration
// order. Callbacks run outside the lock against a snapshot of the
// registration table, so they may subscribe or unsubscribe freely; such
// changes apply from the next `observe`.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use crate::model::SessionState;

/// Which observable changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKey {
    SessionState,
    DeviceMode,
    Error,
}

impl EventKey {
    /// Event-type tag reported to the host.
    pub fn tag(self) -> u16 {
        match self {
            Self::SessionState => 1,
            Self::DeviceMode => 2,
            Self::Error => 3,
        }
    }
}

/// Kind of value carried by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Boolean,
    Integer,
    String,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FeedbackValue {
    Boolean(bool),
    Integer(i64),
    String(String),
    None,
}

impl FeedbackValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Boolean(_) => ValueKind::Boolean,
            Self::Integer(_) => ValueKind::Integer,
            Self::String(_) => ValueKind::String,
            Self::None => ValueKind::None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FeedbackValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::String(s) => f.write_str(s),
            Self::None => f.write_str("-"),
        }
    }
}

/// One outward notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackEvent {
    pub key: EventKey,
    pub value: FeedbackValue,
    /// `None` on the first observation of `key`.
    pub previous_value: Option<FeedbackValue>,
    pub initial: bool,
    /// Session id at emission time (`SessionState` events only).
    pub session_id: Option<String>,
}

impl FeedbackEvent {
    pub fn kind(&self) -> ValueKind {
        self.value.kind()
    }

    /// Decoded state for `SessionState` events.
    pub fn session_state(&self) -> Option<SessionState> {
        if self.key != EventKey::SessionState {
            return None;
        }
        let code = u16::try_from(self.value.as_integer()?).ok()?;
        SessionState::try_from(code).ok()
    }

    pub fn label(&self) -> Option<&'static str> {
        self.session_state().map(SessionState::label)
    }

    /// `Error` events: whether an error is currently set.
    pub fn is_error(&self) -> bool {
        self.key == EventKey::Error && self.value.as_str().is_some_and(|s| !s.is_empty())
    }
}

/// Which events a subscriber receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFilter {
    All,
    Key(EventKey),
}

impl KeyFilter {
    fn matches(self, key: EventKey) -> bool {
        match self {
            Self::All => true,
            Self::Key(k) => k == key,
        }
    }
}

impl From<EventKey> for KeyFilter {
    fn from(key: EventKey) -> Self {
        Self::Key(key)
    }
}

/// Opaque registration handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

pub type Callback = Arc<dyn Fn(&FeedbackEvent) + Send + Sync>;

struct Subscriber {
    handle: SubscriptionHandle,
    filter: KeyFilter,
    callback: Callback,
}

#[derive(Default)]
struct BusState {
    last: HashMap<EventKey, FeedbackValue>,
    subscribers: Vec<Arc<Subscriber>>,
    next_handle: u64,
}

#[derive(Default)]
pub struct EventBus {
    state: Mutex<BusState>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe<F>(&self, filter: impl Into<KeyFilter>, callback: F) -> SubscriptionHandle
    where
        F: Fn(&FeedbackEvent) + Send + Sync + 'static,
    {
        let mut state = self.lock();
        state.next_handle += 1;
        let handle = SubscriptionHandle(state.next_handle);
        state.subscribers.push(Arc::new(Subscriber {
            handle,
            filter: filter.into(),
            callback: Arc::new(callback),
        }));
        handle
    }

    /// Returns `false` if the handle was not registered.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut state = self.lock();
        let before = state.subscribers.len();
        state.subscribers.retain(|s| s.handle != handle);
        state.subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Record `value` and notify if it changed. Returns whether an event fired.
    pub fn observe(&self, key: EventKey, value: FeedbackValue) -> bool {
        self.observe_with(key, value, None)
    }

    pub(crate) fn observe_with(
        &self,
        key: EventKey,
        value: FeedbackValue,
        session_id: Option<String>,
    ) -> bool {
        let (event, targets) = {
            let mut state = self.lock();
            let previous = state.last.get(&key).cloned();
            if previous.as_ref() == Some(&value) {
                return false;
            }
            state.last.insert(key, value.clone());

            let targets: Vec<Arc<Subscriber>> = state
                .subscribers
                .iter()
                .filter(|s| s.filter.matches(key))
                .cloned()
                .collect();
            let event = FeedbackEvent {
                key,
                initial: previous.is_none(),
                previous_value: previous,
                value,
                session_id,
            };
            (event, targets)
        };

        for subscriber in targets {
            (subscriber.callback)(&event);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn recorder(bus: &EventBus, filter: KeyFilter) -> Arc<Mutex<Vec<FeedbackEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe(filter, move |e: &FeedbackEvent| sink.lock().unwrap().push(e.clone()));
        seen
    }

    #[test]
    fn repeated_value_fires_once() {
        let bus = EventBus::new();
        let seen = recorder(&bus, KeyFilter::All);

        assert!(bus.observe(EventKey::DeviceMode, FeedbackValue::Integer(1)));
        assert!(!bus.observe(EventKey::DeviceMode, FeedbackValue::Integer(1)));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].initial);
        assert_eq!(seen[0].previous_value, None);
    }

    #[test]
    fn change_carries_previous_value() {
        let bus = EventBus::new();
        let seen = recorder(&bus, EventKey::DeviceMode.into());

        bus.observe(EventKey::DeviceMode, FeedbackValue::Integer(0));
        bus.observe(EventKey::DeviceMode, FeedbackValue::Integer(1));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(!seen[1].initial);
        assert_eq!(seen[1].previous_value, Some(FeedbackValue::Integer(0)));
        assert_eq!(seen[1].value, FeedbackValue::Integer(1));
    }

    #[test]
    fn filter_by_key() {
        let bus = EventBus::new();
        let errors = recorder(&bus, EventKey::Error.into());

        bus.observe(EventKey::DeviceMode, FeedbackValue::Integer(1));
        bus.observe(EventKey::Error, FeedbackValue::String("boom".into()));

        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].is_error());
    }

    #[test]
    fn dispatch_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for n in 0..4 {
            let order = Arc::clone(&order);
            bus.subscribe(KeyFilter::All, move |_: &FeedbackEvent| order.lock().unwrap().push(n));
        }

        bus.observe(EventKey::Error, FeedbackValue::String(String::new()));
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn subscribe_inside_callback_applies_next_time() {
        let bus = Arc::new(EventBus::new());
        let late_hits = Arc::new(Mutex::new(0));

        let bus_in_cb = Arc::clone(&bus);
        let hits = Arc::clone(&late_hits);
        bus.subscribe(KeyFilter::All, move |_: &FeedbackEvent| {
            let hits = Arc::clone(&hits);
            bus_in_cb.subscribe(KeyFilter::All, move |_: &FeedbackEvent| *hits.lock().unwrap() += 1);
        });

        bus.observe(EventKey::DeviceMode, FeedbackValue::Integer(1));
        assert_eq!(*late_hits.lock().unwrap(), 0);

        bus.observe(EventKey::DeviceMode, FeedbackValue::Integer(0));
        assert_eq!(*late_hits.lock().unwrap(), 1);
    }

    #[test]
    fn unsubscribe_inside_callback_applies_next_time() {
        let bus = Arc::new(EventBus::new());
        let hits = Arc::new(Mutex::new(0));
        let handle_slot: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::new(Mutex::new(None));

        let bus_in_cb = Arc::clone(&bus);
        let slot = Arc::clone(&handle_slot);
        bus.subscribe(KeyFilter::All, move |_: &FeedbackEvent| {
            if let Some(h) = *slot.lock().unwrap() {
                bus_in_cb.unsubscribe(h);
            }
        });
        let counter = Arc::clone(&hits);
        let second = bus.subscribe(KeyFilter::All, move |_: &FeedbackEvent| *counter.lock().unwrap() += 1);
        *handle_slot.lock().unwrap() = Some(second);

        // The first pass still reaches the second subscriber.
        bus.observe(EventKey::DeviceMode, FeedbackValue::Integer(1));
        assert_eq!(*hits.lock().unwrap(), 1);

        bus.observe(EventKey::DeviceMode, FeedbackValue::Integer(0));
        assert_eq!(*hits.lock().unwrap(), 1);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn session_state_event_decodes() {
        let bus = EventBus::new();
        let seen = recorder(&bus, KeyFilter::All);
        bus.observe_with(
            EventKey::SessionState,
            FeedbackValue::Integer(i64::from(SessionState::LoggedIn.code())),
            Some("abc".into()),
        );

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].session_state(), Some(SessionState::LoggedIn));
        assert_eq!(seen[0].label(), Some("Logged In"));
        assert_eq!(seen[0].session_id.as_deref(), Some("abc"));
        assert_eq!(seen[0].key.tag(), 1);
    }
}
