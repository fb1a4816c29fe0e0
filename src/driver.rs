//! Volume driver: the operations the container engine calls
//!
//! Every volume is either absent or provisioned. `create` is the only way in
//! and `remove` the only way out; the registry is touched only after the
//! storage engine call has fully succeeded.

use crate::config::PluginConfig;
use crate::errors::{Result, VolumeError};
use crate::paths::PathScoper;
use crate::provisioner::{DatasetProvisioner, VolumeOptions};
use crate::registry::{Durability, StateStore, VolumeRecord, VolumeRegistry};
use crate::storage::{DatasetEngine, EngineError};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::sync::Arc;

/// A provisioned volume as reported to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeInfo {
    pub name: String,
    /// Scoped mountpoint, usable from the caller's namespace
    pub mountpoint: String,
    /// `None` when the engine could not report it
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Volumes exist on this host only
    Local,
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Local => write!(f, "local"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub scope: Scope,
}

pub struct VolumeDriver {
    engine: Arc<dyn DatasetEngine>,
    registry: Arc<VolumeRegistry>,
    provisioner: DatasetProvisioner,
    scoper: PathScoper,
}

impl VolumeDriver {
    /// Load the registry and discover the root dataset.
    ///
    /// Fails with [`VolumeError::Startup`] when the state file is corrupt or
    /// no dataset is mounted at the base directory.
    pub fn start(config: PluginConfig, engine: Arc<dyn DatasetEngine>) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(VolumeRegistry::open(StateStore::new(config.state_path()))?);
        let scoper = config.scoper();
        let provisioner = DatasetProvisioner::discover(engine.clone(), registry.clone(), config)?;

        info!(
            "Volume driver ready: {} volume(s), default root {}",
            registry.len(),
            provisioner.default_root()
        );

        Ok(Self::from_parts(engine, registry, provisioner, scoper))
    }

    pub fn from_parts(
        engine: Arc<dyn DatasetEngine>,
        registry: Arc<VolumeRegistry>,
        provisioner: DatasetProvisioner,
        scoper: PathScoper,
    ) -> Self {
        Self {
            engine,
            registry,
            provisioner,
            scoper,
        }
    }

    pub fn registry(&self) -> &VolumeRegistry {
        &self.registry
    }

    pub fn create(&self, name: &str, options: VolumeOptions) -> Result<()> {
        debug!("Create {} {:?}", name, options);
        self.provisioner.provision(name, options).map(|_| ())
    }

    pub fn get(&self, name: &str) -> Result<VolumeInfo> {
        debug!("Get {}", name);
        let record = self.registry.get(name)?;
        self.describe(&record)
    }

    /// All volumes that can be described; the rest are logged and skipped
    pub fn list(&self) -> Vec<VolumeInfo> {
        debug!("List");
        self.registry
            .list()
            .iter()
            .filter_map(|record| match self.describe(record) {
                Ok(info) => Some(info),
                Err(e) => {
                    warn!("Skipping volume {} in listing: {}", record.name, e);
                    None
                }
            })
            .collect()
    }

    pub fn remove(&self, name: &str) -> Result<()> {
        debug!("Remove {}", name);
        let record = self.registry.get(name)?;

        match self.engine.destroy_dataset(&record.dataset) {
            Ok(()) => {}
            Err(EngineError::DoesNotExist(_)) => {
                warn!(
                    "Dataset {} of volume {} was already gone, unregistering",
                    record.dataset, name
                );
            }
            Err(e) => {
                return Err(VolumeError::Destroy {
                    dataset: record.dataset,
                    reason: e.to_string(),
                });
            }
        }

        let (_, durability) = self.registry.remove(name)?;
        if let Durability::Degraded(e) = durability {
            warn!("Volume {} is removed but the state file is stale: {}", name, e);
        }
        info!("Removed volume {} ({})", name, record.dataset);
        Ok(())
    }

    pub fn path(&self, name: &str) -> Result<String> {
        debug!("Path {}", name);
        let record = self.registry.get(name)?;
        self.scoped_mountpoint(&record)
    }

    /// Datasets stay mounted for their whole life, so this only resolves the path
    pub fn mount(&self, name: &str, id: &str) -> Result<String> {
        debug!("Mount {} (id {})", name, id);
        let record = self.registry.get(name)?;
        self.scoped_mountpoint(&record)
    }

    pub fn unmount(&self, name: &str, id: &str) -> Result<()> {
        debug!("Unmount {} (id {})", name, id);
        Ok(())
    }

    pub fn capabilities(&self) -> Capabilities {
        debug!("Capabilities");
        Capabilities {
            scope: Scope::Local,
        }
    }

    fn describe(&self, record: &VolumeRecord) -> Result<VolumeInfo> {
        let mountpoint = self.scoped_mountpoint(record)?;

        let created_at = match self.engine.creation_time(&record.dataset) {
            Ok(ts) => Some(ts),
            Err(e) => {
                warn!(
                    "Cannot read creation time of {} for volume {}: {}",
                    record.dataset, record.name, e
                );
                None
            }
        };

        Ok(VolumeInfo {
            name: record.name.clone(),
            mountpoint,
            created_at,
        })
    }

    fn scoped_mountpoint(&self, record: &VolumeRecord) -> Result<String> {
        match self.engine.mountpoint(&record.dataset) {
            Ok(mountpoint) => Ok(self.scoper.scope(&mountpoint)),
            Err(EngineError::DoesNotExist(_)) => Err(VolumeError::DatasetMissing {
                name: record.name.clone(),
                dataset: record.dataset.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}
