//! Core types for the Home Assistant host
//!
//! The host runtime and every integration share these types: [`EntityId`],
//! [`State`], [`Event`], [`Context`] and [`ServiceCall`].

mod context;
mod entity_id;
mod event;
mod service_call;
mod state;

pub use context::Context;
pub use entity_id::{EntityId, EntityIdError};
pub use event::{Event, EventData};
pub use service_call::ServiceCall;
pub use state::State;

/// State value reported when an entity has no known value
pub const STATE_UNKNOWN: &str = "unknown";

/// State value reported when an entity cannot be reached
pub const STATE_UNAVAILABLE: &str = "unavailable";

/// Attribute holding an entity's unit of measurement
pub const ATTR_UNIT_OF_MEASUREMENT: &str = "unit_of_measurement";

/// Attribute holding an entity's display name
pub const ATTR_FRIENDLY_NAME: &str = "friendly_name";

/// Attribute holding an entity's icon
pub const ATTR_ICON: &str = "icon";

/// Standard event types used by the host
pub mod events {
    use super::*;

    /// Event type for state changes
    pub const STATE_CHANGED: &str = "state_changed";

    /// Data for STATE_CHANGED events
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    pub struct StateChangedData {
        pub entity_id: EntityId,
        pub old_state: Option<State>,
        pub new_state: Option<State>,
    }

    impl EventData for StateChangedData {
        fn event_type() -> &'static str {
            STATE_CHANGED
        }
    }
}
