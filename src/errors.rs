//! Error types for volume operations

use crate::storage::EngineError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for volume operations
pub type Result<T> = std::result::Result<T, VolumeError>;

/// Errors that can occur while managing volumes
#[derive(Error, Debug)]
pub enum VolumeError {
    /// Fatal: the plugin cannot start
    #[error("Startup failure: {0}")]
    Startup(String),

    #[error("Volume not found: {0}")]
    NotFound(String),

    #[error("Volume already exists: {0}")]
    AlreadyExists(String),

    #[error("Unsupported option: {0}")]
    UnsupportedOption(String),

    #[error("Invalid volume name: {0:?}")]
    InvalidName(String),

    #[error("Failed to provision dataset {dataset}: {reason}")]
    Provisioning { dataset: String, reason: String },

    #[error("Failed to destroy dataset {dataset}: {reason}")]
    Destroy { dataset: String, reason: String },

    /// The state file could not be written. Never returned by driver operations,
    /// only carried by [`crate::registry::Durability::Degraded`].
    #[error("Cannot persist volume state to {}: {reason}", path.display())]
    Persistence { path: PathBuf, reason: String },

    /// The volume is registered but its dataset no longer exists
    #[error("Dataset {dataset} backing volume {name} is missing")]
    DatasetMissing { name: String, dataset: String },

    #[error("Storage engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl VolumeError {
    /// True for errors caused by the request rather than the host
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            VolumeError::NotFound(_)
                | VolumeError::AlreadyExists(_)
                | VolumeError::UnsupportedOption(_)
                | VolumeError::InvalidName(_)
        )
    }
}
