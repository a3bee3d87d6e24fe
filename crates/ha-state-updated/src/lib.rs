//! State updated integration
//!
//! Watches one entity's state, or one of its attributes, and exposes a binary
//! sensor that turns on when the value changes. The sensor carries the old
//! and new value plus a text rendered from a template, and turns off again
//! after a configurable number of hours or when reset through a service.
//!
//! The change detection itself lives in [`ChangeTracker`]; [`StateUpdated`]
//! wires trackers to the host runtime.

pub mod binary_sensor;
pub mod coordinator;
pub mod entry;
mod error;
pub mod integration;
pub mod listener;
pub mod options;
pub mod services;
pub mod store;
pub mod template;
pub mod tracker;
pub mod value;

pub use binary_sensor::BinarySensor;
pub use coordinator::Coordinator;
pub use entry::{SharedEntry, StateUpdatedEntry};
pub use error::{StateUpdatedError, StateUpdatedResult};
pub use integration::StateUpdated;
pub use options::{entry_title, new_entry_options, OptionsError, StateUpdatedOptions};
pub use store::{ConfigEntrySnapshotStore, SnapshotStore};
pub use template::{TemplateError, TextTemplate};
pub use tracker::{ChangeTracker, ClearOutcome, ObserveOutcome, Snapshot, TrackerSettings};
pub use value::{unit_suffix, TrackedValue, ValueError};

pub const DOMAIN: &str = "state_updated";

pub const CONF_ENTITY_ID: &str = "entity_id";
pub const CONF_ATTRIBUTE: &str = "attribute";
pub const CONF_ICON: &str = "icon";
pub const CONF_DEVICE_ID: &str = "device_id";
pub const CONF_NAME: &str = "name";
pub const CONF_CLEAR_UPDATE_AFTER_HOURS: &str = "clear_update_after_hours";
pub const CONF_TEXT_TEMPLATE: &str = "text_template";

// Snapshot keys, shared by entry options and sensor attributes
pub const CONF_NEW_VALUE: &str = "new_value";
pub const CONF_OLD_VALUE: &str = "old_value";
pub const CONF_UPDATED: &str = "updated";
pub const CONF_LAST_UPDATED: &str = "last_updated";

pub const TRANSLATION_KEY_MISSING_ENTITY: &str = "missing_entity";
pub const TRANSLATION_KEY_TEMPLATE_ERROR: &str = "template_error";
