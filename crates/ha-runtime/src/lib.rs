//! Host runtime for Home Assistant integrations
//!
//! Provides the collaborators an integration talks to: the [`EventBus`], the
//! [`StateMachine`], the [`ServiceRegistry`], persisted [`ConfigEntries`], the
//! [`IssueRegistry`] and a [`Clock`]. [`HomeAssistant`] bundles them.

pub mod bus;
pub mod clock;
pub mod config_entries;
pub mod issues;
pub mod services;
pub mod states;
pub mod storage;

use std::path::Path;
use std::sync::Arc;

pub use bus::{EventBus, TypedEventReceiver};
pub use clock::{Clock, SharedClock, SystemClock};
pub use config_entries::{
    ConfigEntries, ConfigEntriesError, ConfigEntriesResult, ConfigEntry, ConfigEntryChange,
    ConfigEntryUpdate, UpdateContext,
};
pub use issues::{Issue, IssueRegistry, IssueSeverity};
pub use services::{ServiceError, ServiceRegistry, ServiceResult};
pub use states::StateMachine;
pub use storage::{Storable, Storage, StorageError, StorageResult};

/// Everything an integration needs from the host
#[derive(Clone)]
pub struct HomeAssistant {
    pub bus: Arc<EventBus>,
    pub states: Arc<StateMachine>,
    pub services: Arc<ServiceRegistry>,
    pub config_entries: Arc<ConfigEntries>,
    pub issues: Arc<IssueRegistry>,
    pub clock: SharedClock,
}

impl HomeAssistant {
    /// Build a host storing its data under `config_dir/.storage`
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        Self::with_clock(config_dir, Arc::new(SystemClock))
    }

    pub fn with_clock(config_dir: impl AsRef<Path>, clock: SharedClock) -> Self {
        let bus = Arc::new(EventBus::new());
        let storage = Arc::new(Storage::new(config_dir));

        Self {
            states: Arc::new(StateMachine::new(bus.clone())),
            bus,
            services: Arc::new(ServiceRegistry::new()),
            config_entries: Arc::new(ConfigEntries::new(storage)),
            issues: Arc::new(IssueRegistry::new()),
            clock,
        }
    }
}
