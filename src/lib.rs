//! docker-zfs-plugin: Docker volumes backed by ZFS datasets
//!
//! Each volume is a dataset created (or cloned from a snapshot) under a root
//! dataset, mounted beneath the plugin's base directory, and tracked in a
//! small JSON state file so the plugin can restart without losing volumes.
//!
//! # Modules
//!
//! - **storage**: Dataset engine trait, `zfs` CLI engine, in-process engine
//! - **registry**: Name → dataset index and its state file
//! - **provisioner**: Dataset naming, conflict checks, create or clone
//! - **paths**: Mountpoint scoping out of the plugin's relocated root
//! - **driver**: The volume operations the container engine calls
//! - **config**: Plugin configuration
//!
//! # Example
//!
//! ```ignore
//! use docker_zfs_plugin::{PluginConfig, VolumeDriver, storage::ZfsCli};
//! use std::sync::Arc;
//!
//! let driver = VolumeDriver::start(PluginConfig::default(), Arc::new(ZfsCli::default()))?;
//! driver.create("data", Default::default())?;
//! println!("{}", driver.path("data")?);
//! ```

// Core modules
pub mod config;
pub mod errors;
pub mod paths;

// Layered modules
pub mod provisioner;
pub mod registry;
pub mod storage;

// Operation surface
pub mod driver;

// Public API
pub use config::PluginConfig;
pub use driver::{Capabilities, Scope, VolumeDriver, VolumeInfo};
pub use errors::{Result, VolumeError};
pub use paths::PathScoper;
pub use provisioner::{DatasetProvisioner, VolumeOptions};
pub use registry::{Durability, StateStore, VolumeRecord, VolumeRegistry};
