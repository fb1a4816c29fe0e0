//! Plugin configuration

use crate::errors::{Result, VolumeError};
use crate::paths::{relocation_depth, PathScoper};
use crate::storage::zfs::DEFAULT_ZFS_BINARY;
use std::path::{Path, PathBuf};

/// Where the root dataset is expected to be mounted
pub const DEFAULT_BASE_DIR: &str = "/mnt/docker-zfs-volumes";

/// Where Docker relocates a managed plugin's propagated mount. The hash
/// component varies per install; only its depth matters.
pub const DEFAULT_PROPAGATED_MOUNT: &str = "/var/lib/docker/plugins/pluginHash/propagated-mount/";

pub const STATE_FILE_NAME: &str = "state.json";

/// Subdirectory of the base directory (and dataset of the root dataset)
/// holding the volumes
pub const VOLUMES_DIR: &str = "volumes";

#[derive(Debug, Clone)]
pub struct PluginConfig {
    /// Mountpoint of the root dataset; volumes are mounted under `volumes/`
    pub base_dir: PathBuf,
    /// State file, defaults to `<base_dir>/state.json`
    pub state_file: Option<PathBuf>,
    /// Relocated root the plugin runs under
    pub propagated_mount: String,
    /// Levels to escape, defaults to the depth of `propagated_mount`
    pub escape_depth: Option<usize>,
    pub zfs_binary: PathBuf,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from(DEFAULT_BASE_DIR),
            state_file: None,
            propagated_mount: DEFAULT_PROPAGATED_MOUNT.to_string(),
            escape_depth: None,
            zfs_binary: PathBuf::from(DEFAULT_ZFS_BINARY),
        }
    }
}

impl PluginConfig {
    /// Configuration rooted at `base_dir`, everything else default
    pub fn with_base_dir(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.base_dir.is_absolute() {
            return Err(VolumeError::InvalidConfig(format!(
                "base directory must be absolute: {}",
                self.base_dir.display()
            )));
        }

        if self.zfs_binary.as_os_str().is_empty() {
            return Err(VolumeError::InvalidConfig(
                "zfs binary cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(|| self.base_dir.join(STATE_FILE_NAME))
    }

    /// Mountpoint forced on the dataset of volume `name`
    pub fn volume_mountpoint(&self, name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_dir.display().to_string().trim_end_matches('/'),
            VOLUMES_DIR,
            name
        )
    }

    pub fn escape_depth(&self) -> usize {
        self.escape_depth
            .unwrap_or_else(|| relocation_depth(&self.propagated_mount))
    }

    pub fn scoper(&self) -> PathScoper {
        PathScoper::anchored(&self.propagated_mount, self.escape_depth())
    }
}
