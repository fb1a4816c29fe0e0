//! Dataset provisioning for new volumes
//!
//! Decides where a volume's dataset lives, creates or clones it, then records
//! it in the registry. The dataset-exists pre-check is not atomic with the
//! create call; an "already exists" reported by the engine itself is what
//! settles a dataset conflict. Volume names are claimed for the whole create,
//! so two requests for one name never both reach the engine.

use crate::config::{PluginConfig, VOLUMES_DIR};
use crate::errors::{Result, VolumeError};
use crate::registry::{Durability, VolumeRecord, VolumeRegistry};
use crate::storage::{DatasetEngine, DatasetProperties, EngineError};
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

/// Places the dataset under `<value>/<name>` instead of the default root
pub const ROOT_DATASET_OPTION: &str = "driver_zfsRootDataset";
/// Snapshot to clone the new dataset from
pub const CLONE_SOURCE_OPTION: &str = "from-snapshot";
/// Always rejected: the plugin owns the mountpoint
pub const MOUNTPOINT_OPTION: &str = "mountpoint";

/// Options of a create request, as sent by the container engine
pub type VolumeOptions = HashMap<String, String>;

pub struct DatasetProvisioner {
    engine: Arc<dyn DatasetEngine>,
    registry: Arc<VolumeRegistry>,
    config: PluginConfig,
    default_root: String,
    /// Names with a create in progress
    in_flight: Mutex<HashSet<String>>,
}

/// Exclusive hold on a volume name until the create finishes
struct NameClaim<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    name: String,
}

impl Drop for NameClaim<'_> {
    fn drop(&mut self) {
        lock_names(self.in_flight).remove(&self.name);
    }
}

fn lock_names(names: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    names.lock().unwrap_or_else(|poison| poison.into_inner())
}

impl DatasetProvisioner {
    /// Discover the default root dataset: the one mounted at the base directory
    pub fn discover(
        engine: Arc<dyn DatasetEngine>,
        registry: Arc<VolumeRegistry>,
        config: PluginConfig,
    ) -> Result<Self> {
        let default_root = engine
            .dataset_mounted_at(&config.base_dir)
            .map_err(|e| {
                VolumeError::Startup(format!(
                    "cannot look up dataset mounted at {}: {}",
                    config.base_dir.display(),
                    e
                ))
            })?
            .ok_or_else(|| {
                VolumeError::Startup(format!(
                    "{} does not exist or is not a zfs dataset",
                    config.base_dir.display()
                ))
            })?;

        info!(
            "Using {} (mounted at {}) as default root dataset",
            default_root,
            config.base_dir.display()
        );

        Ok(Self {
            engine,
            registry,
            config,
            default_root,
            in_flight: Mutex::new(HashSet::new()),
        })
    }

    /// Reserve `name` for one create at a time. Fails if the name is
    /// registered or another create holds it.
    fn claim(&self, name: &str) -> Result<NameClaim<'_>> {
        let mut names = lock_names(&self.in_flight);
        if names.contains(name) || self.registry.contains(name) {
            return Err(VolumeError::AlreadyExists(name.to_string()));
        }
        names.insert(name.to_string());
        Ok(NameClaim {
            in_flight: &self.in_flight,
            name: name.to_string(),
        })
    }

    pub fn default_root(&self) -> &str {
        &self.default_root
    }

    /// Dataset identity for `name`, consuming the root override option
    pub fn dataset_identity(&self, name: &str, options: &mut VolumeOptions) -> String {
        match options.remove(ROOT_DATASET_OPTION) {
            Some(root) if !root.is_empty() => {
                format!("{}/{}", root.trim_end_matches('/'), name)
            }
            _ => format!("{}/{}/{}", self.default_root, VOLUMES_DIR, name),
        }
    }

    pub fn provision(&self, name: &str, mut options: VolumeOptions) -> Result<VolumeRecord> {
        validate_name(name)?;

        if options.contains_key(MOUNTPOINT_OPTION) {
            warn!("Refusing to create {}: mountpoint option is not supported", name);
            return Err(VolumeError::UnsupportedOption(MOUNTPOINT_OPTION.to_string()));
        }

        let _claim = self.claim(name)?;

        let dataset = self.dataset_identity(name, &mut options);
        if self.engine.dataset_exists(&dataset)? {
            return Err(VolumeError::AlreadyExists(dataset));
        }

        let clone_source = options
            .remove(CLONE_SOURCE_OPTION)
            .filter(|snapshot| !snapshot.is_empty());

        let mut properties: DatasetProperties = options.into_iter().collect();
        properties.insert(
            MOUNTPOINT_OPTION.to_string(),
            self.config.volume_mountpoint(name),
        );

        let created = match &clone_source {
            Some(snapshot) => {
                debug!("Cloning {} into {} with {:?}", snapshot, dataset, properties);
                self.engine.clone_snapshot(snapshot, &dataset, &properties)
            }
            None => {
                debug!("Creating {} with {:?}", dataset, properties);
                self.engine.create_dataset(&dataset, &properties)
            }
        };

        match created {
            Ok(()) => {}
            Err(EngineError::AlreadyExists(_)) => {
                return Err(VolumeError::AlreadyExists(dataset));
            }
            Err(e) => {
                warn!("Cannot create dataset {} for volume {}: {}", dataset, name, e);
                return Err(VolumeError::Provisioning {
                    dataset,
                    reason: e.to_string(),
                });
            }
        }

        let record = VolumeRecord::new(name, dataset);
        match self.registry.insert_new(record.clone()) {
            Ok(Durability::Persisted) => {}
            Ok(Durability::Degraded(e)) => {
                warn!("Volume {} is live but not yet durable: {}", name, e);
            }
            Err(e) => {
                if let Err(destroy_err) = self.engine.destroy_dataset(&record.dataset) {
                    warn!(
                        "Cannot roll back dataset {} of volume {}: {}",
                        record.dataset, name, destroy_err
                    );
                }
                return Err(e);
            }
        }

        match clone_source {
            Some(snapshot) => info!(
                "Created volume {} ({} cloned from {})",
                name, record.dataset, snapshot
            ),
            None => info!("Created volume {} ({})", name, record.dataset),
        }
        Ok(record)
    }
}

/// Reject names that would escape or corrupt the dataset hierarchy
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name
            .chars()
            .any(|c| matches!(c, '/' | '@' | '#') || c.is_whitespace());

    if invalid {
        return Err(VolumeError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StateStore;
    use crate::storage::MemoryEngine;
    use tempfile::tempdir;

    struct Fixture {
        _dir: tempfile::TempDir,
        engine: Arc<MemoryEngine>,
        registry: Arc<VolumeRegistry>,
        provisioner: DatasetProvisioner,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let engine = Arc::new(MemoryEngine::with_root("tank/docker", "/mnt/base"));
        let registry = Arc::new(
            VolumeRegistry::open(StateStore::new(dir.path().join("state.json"))).unwrap(),
        );
        let provisioner = DatasetProvisioner::discover(
            engine.clone(),
            registry.clone(),
            PluginConfig::with_base_dir("/mnt/base"),
        )
        .unwrap();
        Fixture {
            _dir: dir,
            engine,
            registry,
            provisioner,
        }
    }

    fn opts(pairs: &[(&str, &str)]) -> VolumeOptions {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn discovery_fails_without_base_dataset() {
        let dir = tempdir().unwrap();
        let registry = Arc::new(VolumeRegistry::new(StateStore::new(
            dir.path().join("state.json"),
        )));
        let result = DatasetProvisioner::discover(
            Arc::new(MemoryEngine::with_root("tank", "/tank")),
            registry,
            PluginConfig::with_base_dir("/mnt/base"),
        );
        assert!(matches!(result, Err(VolumeError::Startup(_))));
    }

    #[test]
    fn default_naming_policy() {
        let f = fixture();
        assert_eq!(f.provisioner.default_root(), "tank/docker");

        let record = f.provisioner.provision("v1", VolumeOptions::new()).unwrap();
        assert_eq!(record.dataset, "tank/docker/volumes/v1");
        assert_eq!(f.registry.get("v1").unwrap(), record);
    }

    #[test]
    fn root_override_is_consumed() {
        let f = fixture();
        let record = f
            .provisioner
            .provision("v1", opts(&[(ROOT_DATASET_OPTION, "tank/fast"), ("compression", "lz4")]))
            .unwrap();

        assert_eq!(record.dataset, "tank/fast/v1");
        let props = f.engine.properties("tank/fast/v1").unwrap();
        assert!(!props.contains_key(ROOT_DATASET_OPTION));
        assert_eq!(props["compression"], "lz4");
    }

    #[test]
    fn empty_root_override_falls_back_to_default() {
        let f = fixture();
        let mut options = opts(&[(ROOT_DATASET_OPTION, "")]);
        assert_eq!(
            f.provisioner.dataset_identity("v1", &mut options),
            "tank/docker/volumes/v1"
        );
        assert!(options.is_empty());
    }

    #[test]
    fn mountpoint_is_forced() {
        let f = fixture();
        f.provisioner.provision("v1", VolumeOptions::new()).unwrap();

        let props = f.engine.properties("tank/docker/volumes/v1").unwrap();
        assert_eq!(props[MOUNTPOINT_OPTION], "/mnt/base/volumes/v1");
        assert_eq!(
            f.engine.mountpoint("tank/docker/volumes/v1").unwrap(),
            "/mnt/base/volumes/v1"
        );
    }

    #[test]
    fn explicit_mountpoint_is_rejected_without_side_effects() {
        let f = fixture();
        let result = f
            .provisioner
            .provision("v1", opts(&[(MOUNTPOINT_OPTION, "/srv/v1")]));

        assert!(matches!(result, Err(VolumeError::UnsupportedOption(_))));
        assert!(!f.engine.dataset_exists("tank/docker/volumes/v1").unwrap());
        assert!(!f.registry.contains("v1"));
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let f = fixture();
        f.provisioner.provision("v1", VolumeOptions::new()).unwrap();

        assert!(matches!(
            f.provisioner.provision("v1", VolumeOptions::new()),
            Err(VolumeError::AlreadyExists(_))
        ));
        assert_eq!(f.registry.len(), 1);
    }

    #[test]
    fn name_held_by_a_running_create_is_rejected() {
        let f = fixture();
        let claim = f.provisioner.claim("v1").unwrap();

        let result = f.provisioner.provision(
            "v1",
            opts(&[(ROOT_DATASET_OPTION, "tank/docker/alt")]),
        );
        assert!(matches!(result, Err(VolumeError::AlreadyExists(_))));
        assert!(!f.engine.dataset_exists("tank/docker/alt/v1").unwrap());

        drop(claim);
        f.provisioner.provision("v1", VolumeOptions::new()).unwrap();
    }

    #[test]
    fn failed_create_releases_name() {
        let f = fixture();
        assert!(f
            .provisioner
            .provision("v1", opts(&[(ROOT_DATASET_OPTION, "nopool/volumes")]))
            .is_err());

        f.provisioner.provision("v1", VolumeOptions::new()).unwrap();
        assert_eq!(f.registry.get("v1").unwrap().dataset, "tank/docker/volumes/v1");
    }

    #[test]
    fn existing_dataset_is_rejected() {
        let f = fixture();
        f.engine
            .create_dataset("tank/docker/volumes/taken", &DatasetProperties::new())
            .unwrap();

        assert!(matches!(
            f.provisioner.provision("taken", VolumeOptions::new()),
            Err(VolumeError::AlreadyExists(ds)) if ds == "tank/docker/volumes/taken"
        ));
        assert!(!f.registry.contains("taken"));
    }

    #[test]
    fn clone_path_uses_snapshot_and_consumes_option() {
        let f = fixture();
        f.engine
            .create_dataset("tank/golden", &DatasetProperties::new())
            .unwrap();
        f.engine.add_snapshot("tank/golden@v1").unwrap();

        let record = f
            .provisioner
            .provision("web", opts(&[(CLONE_SOURCE_OPTION, "tank/golden@v1")]))
            .unwrap();

        assert_eq!(record.dataset, "tank/docker/volumes/web");
        assert_eq!(
            f.engine.origin("tank/docker/volumes/web").as_deref(),
            Some("tank/golden@v1")
        );
        let props = f.engine.properties("tank/docker/volumes/web").unwrap();
        assert!(!props.contains_key(CLONE_SOURCE_OPTION));
        assert_eq!(props[MOUNTPOINT_OPTION], "/mnt/base/volumes/web");
    }

    #[test]
    fn empty_clone_source_creates_fresh_dataset() {
        let f = fixture();
        f.provisioner
            .provision("v1", opts(&[(CLONE_SOURCE_OPTION, "")]))
            .unwrap();

        assert_eq!(f.engine.origin("tank/docker/volumes/v1"), None);
        let props = f.engine.properties("tank/docker/volumes/v1").unwrap();
        assert!(!props.contains_key(CLONE_SOURCE_OPTION));
    }

    #[test]
    fn failed_clone_is_provisioning_failure() {
        let f = fixture();
        let result = f
            .provisioner
            .provision("v1", opts(&[(CLONE_SOURCE_OPTION, "tank/missing@snap")]));

        assert!(matches!(result, Err(VolumeError::Provisioning { .. })));
        assert!(!f.registry.contains("v1"));
    }

    #[test]
    fn failed_create_is_provisioning_failure() {
        let f = fixture();
        let result = f
            .provisioner
            .provision("v1", opts(&[(ROOT_DATASET_OPTION, "nopool/volumes")]));

        assert!(matches!(
            result,
            Err(VolumeError::Provisioning { dataset, .. }) if dataset == "nopool/volumes/v1"
        ));
        assert!(!f.registry.contains("v1"));
    }

    #[test]
    fn name_validation() {
        for bad in ["", ".", "..", "a/b", "snap@x", "book#mark", "with space"] {
            assert!(
                matches!(validate_name(bad), Err(VolumeError::InvalidName(_))),
                "{bad:?} should be rejected"
            );
        }
        for good in ["v1", "my-volume", "data_2024.01"] {
            assert!(validate_name(good).is_ok(), "{good:?} should be accepted");
        }
    }
}
