//! In-process `DatasetEngine`.
//!
//! Models the parts of ZFS the driver relies on: a hierarchical dataset
//! namespace, inherited mountpoints, snapshots as clone sources and atomic
//! create-if-absent. Used for dry runs and tests.

use super::engine::{DatasetEngine, DatasetProperties, EngineError, EngineResult};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct Dataset {
    mountpoint: String,
    created: DateTime<Utc>,
    origin: Option<String>,
    properties: DatasetProperties,
}

#[derive(Debug, Default)]
struct Pool {
    datasets: BTreeMap<String, Dataset>,
    snapshots: BTreeSet<String>,
    creation_unavailable: bool,
    refuse_destroy: bool,
}

#[derive(Debug, Default)]
pub struct MemoryEngine {
    pool: Mutex<Pool>,
}

impl MemoryEngine {
    /// Engine holding a single root dataset mounted at `mountpoint`
    pub fn with_root(root: &str, mountpoint: impl AsRef<Path>) -> Self {
        let engine = Self::default();
        engine.lock().datasets.insert(
            root.to_string(),
            Dataset {
                mountpoint: mountpoint.as_ref().display().to_string(),
                created: Utc::now(),
                origin: None,
                properties: DatasetProperties::new(),
            },
        );
        engine
    }

    fn lock(&self) -> MutexGuard<'_, Pool> {
        self.pool.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    /// Register `dataset@name` as a clone source
    pub fn add_snapshot(&self, snapshot: &str) -> EngineResult<()> {
        let mut pool = self.lock();
        let Some((dataset, _)) = snapshot.split_once('@') else {
            return Err(EngineError::Failed(format!(
                "invalid snapshot name: {snapshot}"
            )));
        };
        if !pool.datasets.contains_key(dataset) {
            return Err(EngineError::DoesNotExist(dataset.to_string()));
        }
        pool.snapshots.insert(snapshot.to_string());
        Ok(())
    }

    /// Make every `creation_time` call fail
    pub fn set_creation_unavailable(&self, unavailable: bool) {
        self.lock().creation_unavailable = unavailable;
    }

    /// Make every `destroy_dataset` call fail as if the dataset were busy
    pub fn set_refuse_destroy(&self, refuse: bool) {
        self.lock().refuse_destroy = refuse;
    }

    /// Remove a dataset behind the driver's back
    pub fn remove_out_of_band(&self, dataset: &str) -> bool {
        self.lock().datasets.remove(dataset).is_some()
    }

    pub fn properties(&self, dataset: &str) -> Option<DatasetProperties> {
        self.lock().datasets.get(dataset).map(|d| d.properties.clone())
    }

    pub fn origin(&self, dataset: &str) -> Option<String> {
        self.lock().datasets.get(dataset).and_then(|d| d.origin.clone())
    }

    pub fn datasets(&self) -> Vec<String> {
        self.lock().datasets.keys().cloned().collect()
    }

    fn insert(
        &self,
        dataset: &str,
        origin: Option<&str>,
        properties: &DatasetProperties,
    ) -> EngineResult<()> {
        let mut pool = self.lock();

        if let Some(snapshot) = origin {
            if !pool.snapshots.contains(snapshot) {
                return Err(EngineError::DoesNotExist(snapshot.to_string()));
            }
        }
        if pool.datasets.contains_key(dataset) {
            return Err(EngineError::AlreadyExists(dataset.to_string()));
        }

        let mut missing = Vec::new();
        let mut cursor = dataset;
        while let Some((parent, _)) = cursor.rsplit_once('/') {
            if pool.datasets.contains_key(parent) {
                break;
            }
            missing.push(parent);
            cursor = parent;
        }
        if !cursor.contains('/') && !pool.datasets.contains_key(cursor) {
            return Err(EngineError::Failed(format!("no such pool: {cursor}")));
        }

        for parent in missing.into_iter().rev() {
            let mountpoint = inherited_mountpoint(&pool, parent);
            pool.datasets.insert(
                parent.to_string(),
                Dataset {
                    mountpoint,
                    created: Utc::now(),
                    origin: None,
                    properties: DatasetProperties::new(),
                },
            );
        }

        let mountpoint = properties
            .get("mountpoint")
            .cloned()
            .unwrap_or_else(|| inherited_mountpoint(&pool, dataset));
        pool.datasets.insert(
            dataset.to_string(),
            Dataset {
                mountpoint,
                created: Utc::now(),
                origin: origin.map(str::to_string),
                properties: properties.clone(),
            },
        );
        Ok(())
    }

    fn with_dataset<T>(&self, dataset: &str, f: impl FnOnce(&Dataset) -> T) -> EngineResult<T> {
        self.lock()
            .datasets
            .get(dataset)
            .map(f)
            .ok_or_else(|| EngineError::DoesNotExist(dataset.to_string()))
    }
}

/// Parent mountpoint plus the child's last component
fn inherited_mountpoint(pool: &Pool, dataset: &str) -> String {
    match dataset.rsplit_once('/') {
        Some((parent, leaf)) => match pool.datasets.get(parent) {
            Some(p) => format!("{}/{}", p.mountpoint.trim_end_matches('/'), leaf),
            None => format!("/{dataset}"),
        },
        None => format!("/{dataset}"),
    }
}

impl DatasetEngine for MemoryEngine {
    fn dataset_exists(&self, dataset: &str) -> EngineResult<bool> {
        Ok(self.lock().datasets.contains_key(dataset))
    }

    fn create_dataset(&self, dataset: &str, properties: &DatasetProperties) -> EngineResult<()> {
        self.insert(dataset, None, properties)
    }

    fn clone_snapshot(
        &self,
        snapshot: &str,
        dataset: &str,
        properties: &DatasetProperties,
    ) -> EngineResult<()> {
        self.insert(dataset, Some(snapshot), properties)
    }

    fn destroy_dataset(&self, dataset: &str) -> EngineResult<()> {
        let mut pool = self.lock();
        if !pool.datasets.contains_key(dataset) {
            return Err(EngineError::DoesNotExist(dataset.to_string()));
        }
        if pool.refuse_destroy {
            return Err(EngineError::Failed(format!(
                "cannot destroy '{dataset}': dataset is busy"
            )));
        }
        let prefix = format!("{dataset}/");
        if pool.datasets.keys().any(|name| name.starts_with(&prefix)) {
            return Err(EngineError::Failed(format!(
                "cannot destroy '{dataset}': filesystem has children"
            )));
        }
        pool.datasets.remove(dataset);
        Ok(())
    }

    fn mountpoint(&self, dataset: &str) -> EngineResult<String> {
        self.with_dataset(dataset, |d| d.mountpoint.clone())
    }

    fn creation_time(&self, dataset: &str) -> EngineResult<DateTime<Utc>> {
        if self.lock().creation_unavailable {
            return Err(EngineError::Failed(format!(
                "cannot read creation of {dataset}"
            )));
        }
        self.with_dataset(dataset, |d| d.created)
    }

    fn dataset_mounted_at(&self, mountpoint: &Path) -> EngineResult<Option<String>> {
        Ok(self
            .lock()
            .datasets
            .iter()
            .find(|(_, d)| Path::new(&d.mountpoint) == mountpoint)
            .map(|(name, _)| name.clone()))
    }
}
