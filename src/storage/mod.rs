//! Storage layer: the dataset engine the volumes live on
//!
//! # Engines
//!
//! - **ZfsCli**: drives the host `zfs` binary
//! - **MemoryEngine**: in-process pool for dry runs and tests
//!
//! # Examples
//!
//! ```ignore
//! use docker_zfs_plugin::storage::{DatasetEngine, ZfsCli};
//!
//! let zfs = ZfsCli::default();
//! let root = zfs.dataset_mounted_at("/mnt/docker-zfs-volumes".as_ref())?;
//! ```

pub mod engine;
pub mod memory;
pub mod zfs;

pub use engine::{DatasetEngine, DatasetProperties, EngineError, EngineResult};
pub use memory::MemoryEngine;
pub use zfs::ZfsCli;
