//! Storage engine capability consumed by the volume driver

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use thiserror::Error;

/// Dataset properties passed to create and clone (`-o key=value`)
pub type DatasetProperties = BTreeMap<String, String>;

/// Result type for storage engine calls
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Errors reported by a storage engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("dataset already exists: {0}")]
    AlreadyExists(String),

    #[error("dataset does not exist: {0}")]
    DoesNotExist(String),

    #[error("{0}")]
    Failed(String),

    #[error("unexpected output: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// A copy-on-write dataset store.
///
/// Every call is synchronous and may block for as long as the underlying
/// storage operation takes. Implementations must be shareable across the
/// request-handling threads.
pub trait DatasetEngine: Send + Sync {
    /// Whether a dataset with this exact identity exists
    fn dataset_exists(&self, dataset: &str) -> EngineResult<bool>;

    /// Create `dataset` and any missing parents, applying `properties`
    fn create_dataset(&self, dataset: &str, properties: &DatasetProperties) -> EngineResult<()>;

    /// Clone `snapshot` into `dataset`, creating missing parents and applying `properties`
    fn clone_snapshot(
        &self,
        snapshot: &str,
        dataset: &str,
        properties: &DatasetProperties,
    ) -> EngineResult<()>;

    fn destroy_dataset(&self, dataset: &str) -> EngineResult<()>;

    /// Mountpoint as seen from this process's mount namespace
    fn mountpoint(&self, dataset: &str) -> EngineResult<String>;

    fn creation_time(&self, dataset: &str) -> EngineResult<DateTime<Utc>>;

    /// Name of the filesystem dataset mounted at `mountpoint`, if any
    fn dataset_mounted_at(&self, mountpoint: &Path) -> EngineResult<Option<String>>;
}
