//! Volume registry: the set of volumes this plugin manages
//!
//! The in-memory map is authoritative for the running process. Every
//! mutation rewrites the state file while the registry lock is still held,
//! so concurrent mutations never interleave their writes. A failed write
//! leaves the live map updated and is reported as [`Durability::Degraded`].

pub mod state;

pub use state::StateStore;

use crate::errors::{Result, VolumeError};
use log::{debug, error};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// A volume name bound to the dataset that backs it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeRecord {
    pub name: String,
    /// Fully-qualified dataset identity, e.g. `tank/docker/volumes/v1`
    pub dataset: String,
}

impl VolumeRecord {
    pub fn new(name: &str, dataset: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            dataset: dataset.into(),
        }
    }
}

/// Whether a mutation reached the state file
#[derive(Debug)]
#[must_use]
pub enum Durability {
    Persisted,
    /// Live state is correct but the state file is stale until the next
    /// successful write. Always carries [`VolumeError::Persistence`].
    Degraded(VolumeError),
}

impl Durability {
    pub fn is_persisted(&self) -> bool {
        matches!(self, Durability::Persisted)
    }
}

pub struct VolumeRegistry {
    volumes: Mutex<HashMap<String, VolumeRecord>>,
    store: StateStore,
}

impl VolumeRegistry {
    /// Empty registry; call [`VolumeRegistry::load`] to read the state file
    pub fn new(store: StateStore) -> Self {
        Self {
            volumes: Mutex::new(HashMap::new()),
            store,
        }
    }

    /// Create and load from the state file
    pub fn open(store: StateStore) -> Result<Self> {
        let registry = Self::new(store);
        let count = registry.load()?;
        debug!(
            "Loaded {} volume(s) from {}",
            count,
            registry.store.path().display()
        );
        Ok(registry)
    }

    /// Replace the in-memory map with the persisted one, returning its size
    pub fn load(&self) -> Result<usize> {
        let loaded = self.store.load()?;
        let count = loaded.len();
        *self.lock() = loaded;
        Ok(count)
    }

    // Mutations finish before the fallible persist step, so a poisoned map is
    // still consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, VolumeRecord>> {
        self.volumes
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    pub fn get(&self, name: &str) -> Result<VolumeRecord> {
        self.lock()
            .get(name)
            .cloned()
            .ok_or_else(|| VolumeError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    pub fn list(&self) -> Vec<VolumeRecord> {
        self.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert or overwrite, then persist
    pub fn put(&self, record: VolumeRecord) -> Durability {
        let mut volumes = self.lock();
        volumes.insert(record.name.clone(), record);
        self.persist(&volumes)
    }

    /// Insert only if the name is free, then persist
    pub fn insert_new(&self, record: VolumeRecord) -> Result<Durability> {
        let mut volumes = self.lock();
        if volumes.contains_key(&record.name) {
            return Err(VolumeError::AlreadyExists(record.name));
        }
        volumes.insert(record.name.clone(), record);
        Ok(self.persist(&volumes))
    }

    pub fn remove(&self, name: &str) -> Result<(VolumeRecord, Durability)> {
        let mut volumes = self.lock();
        let record = volumes
            .remove(name)
            .ok_or_else(|| VolumeError::NotFound(name.to_string()))?;
        let durability = self.persist(&volumes);
        Ok((record, durability))
    }

    fn persist(&self, volumes: &HashMap<String, VolumeRecord>) -> Durability {
        match self.store.save(volumes) {
            Ok(()) => Durability::Persisted,
            Err(e) => {
                error!(
                    "Cannot save volume state: {} ({} volume(s) in memory)",
                    e,
                    volumes.len()
                );
                Durability::Degraded(e)
            }
        }
    }
}
