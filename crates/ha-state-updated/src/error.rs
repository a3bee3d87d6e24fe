//! Error types for the state updated integration

use ha_core::EntityIdError;
use ha_runtime::ConfigEntriesError;
use thiserror::Error;

use crate::options::OptionsError;

pub type StateUpdatedResult<T> = Result<T, StateUpdatedError>;

#[derive(Debug, Error)]
pub enum StateUpdatedError {
    #[error("invalid options: {0}")]
    Options(#[from] OptionsError),

    #[error("config entry error: {0}")]
    ConfigEntries(#[from] ConfigEntriesError),

    #[error("invalid sensor entity id: {0}")]
    SensorEntityId(#[from] EntityIdError),

    #[error("config entry {0} is not loaded")]
    NotLoaded(String),

    #[error("config entry {0} is already loaded")]
    AlreadyLoaded(String),

    #[error("config entry {entry_id} belongs to {domain}")]
    WrongDomain { entry_id: String, domain: String },
}
