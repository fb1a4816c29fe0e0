//! On-disk copy of the volume registry

use super::VolumeRecord;
use crate::errors::{Result, VolumeError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Per-volume entry in the state file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct PersistedVolume {
    #[serde(rename = "datasetFQN", alias = "datasetIdentity")]
    dataset: String,
}

/// Reads and rewrites the JSON state file. Holds no volume state itself.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every record. A missing file is an empty registry.
    pub fn load(&self) -> Result<HashMap<String, VolumeRecord>> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => {
                return Err(VolumeError::Startup(format!(
                    "cannot read state file {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let entries: HashMap<String, PersistedVolume> =
            serde_json::from_slice(&data).map_err(|e| {
                VolumeError::Startup(format!(
                    "corrupt state file {}: {}",
                    self.path.display(),
                    e
                ))
            })?;

        Ok(entries
            .into_iter()
            .map(|(name, entry)| {
                let record = VolumeRecord::new(&name, entry.dataset);
                (name, record)
            })
            .collect())
    }

    /// Rewrite the whole file from `volumes`.
    ///
    /// Writes a sibling temporary file and renames it into place, so readers
    /// see either the old or the new state.
    pub fn save(&self, volumes: &HashMap<String, VolumeRecord>) -> Result<()> {
        let entries: BTreeMap<&str, PersistedVolume> = volumes
            .iter()
            .map(|(name, record)| {
                (
                    name.as_str(),
                    PersistedVolume {
                        dataset: record.dataset.clone(),
                    },
                )
            })
            .collect();

        let data = serde_json::to_vec(&entries).map_err(|e| self.persistence(e))?;

        let tmp = self.tmp_path();
        fs::write(&tmp, data).map_err(|e| self.persistence(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            self.persistence(e)
        })
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "state.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn persistence(&self, err: impl std::fmt::Display) -> VolumeError {
        VolumeError::Persistence {
            path: self.path.clone(),
            reason: err.to_string(),
        }
    }
}
