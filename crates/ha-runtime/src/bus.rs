//! Event bus with typed subscriptions
//!
//! Each event type gets its own broadcast channel, created lazily on first
//! subscription. Firing an event nobody listens to is a no-op.

use dashmap::DashMap;
use ha_core::{Context, Event, EventData};
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

/// Default channel capacity for event subscriptions
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Central pub/sub broker of the host
pub struct EventBus {
    channels: DashMap<String, broadcast::Sender<Event>>,
    capacity: usize,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new event bus with a custom channel capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity,
        }
    }

    /// Subscribe to raw events of one type
    pub fn subscribe(&self, event_type: &str) -> broadcast::Receiver<Event> {
        trace!(event_type, "Subscribing to event type");
        self.channels
            .entry(event_type.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Subscribe to events whose data deserializes as `T`
    pub fn subscribe_typed<T: EventData + serde::de::DeserializeOwned>(
        &self,
    ) -> TypedEventReceiver<T> {
        TypedEventReceiver {
            rx: self.subscribe(T::event_type()),
            _phantom: std::marker::PhantomData,
        }
    }

    /// Fire an event to all subscribers of its type
    pub fn fire(&self, event: Event) {
        debug!(event_type = %event.event_type, "Firing event");
        if let Some(sender) = self.channels.get(&event.event_type) {
            // A send error only means there is no active receiver
            let _ = sender.send(event);
        }
    }

    /// Fire an event with typed data
    pub fn fire_typed<T: EventData + serde::Serialize>(&self, data: T, context: Context) {
        let event = Event::typed(data, context);
        match serde_json::to_value(&event.data) {
            Ok(json) => self.fire(event.map(|_| json)),
            Err(err) => warn!(event_type = T::event_type(), %err, "Dropping unserializable event"),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver yielding events with parsed data
pub struct TypedEventReceiver<T> {
    rx: broadcast::Receiver<Event>,
    _phantom: std::marker::PhantomData<T>,
}

impl<T: EventData + serde::de::DeserializeOwned> TypedEventReceiver<T> {
    /// Receive the next event whose data parses as `T`
    ///
    /// Events that fail to parse are skipped. A lagging receiver logs how many
    /// events it missed and keeps going.
    pub async fn recv(&mut self) -> Result<Event<T>, broadcast::error::RecvError> {
        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    if let Ok(data) = serde_json::from_value::<T>(event.data.clone()) {
                        return Ok(event.map(|_| data));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, event_type = T::event_type(), "Event receiver lagged");
                }
                Err(err) => return Err(err),
            }
        }
    }
}
