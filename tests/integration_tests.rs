//! Integration tests for docker-zfs-plugin
//!
//! These drive `VolumeDriver` end to end against the in-memory engine, with
//! the state file in a temporary directory.

use docker_zfs_plugin::storage::{DatasetEngine, MemoryEngine};
use docker_zfs_plugin::{PluginConfig, Scope, VolumeDriver, VolumeError, VolumeOptions};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const ROOT: &str = "tank/docker";

struct Plugin {
    dir: TempDir,
    engine: Arc<MemoryEngine>,
    driver: VolumeDriver,
}

fn config(base: &Path) -> PluginConfig {
    PluginConfig {
        propagated_mount: String::new(),
        escape_depth: Some(6),
        ..PluginConfig::with_base_dir(base)
    }
}

fn start() -> Plugin {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(MemoryEngine::with_root(ROOT, dir.path()));
    let driver = VolumeDriver::start(config(dir.path()), engine.clone()).unwrap();
    Plugin { dir, engine, driver }
}

/// Start a second driver over the same pool and state file
fn restart(plugin: &Plugin) -> VolumeDriver {
    VolumeDriver::start(config(plugin.dir.path()), plugin.engine.clone()).unwrap()
}

fn opts(pairs: &[(&str, &str)]) -> VolumeOptions {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn scoped(plugin: &Plugin, name: &str) -> String {
    format!(
        "../../../../../..{}/volumes/{}",
        plugin.dir.path().display(),
        name
    )
}

#[test]
fn test_create_get_remove_round_trip() {
    let plugin = start();

    plugin.driver.create("v1", VolumeOptions::new()).unwrap();

    let info = plugin.driver.get("v1").unwrap();
    assert_eq!(info.name, "v1");
    assert_eq!(info.mountpoint, scoped(&plugin, "v1"));
    assert!(info.created_at.is_some());
    assert!(plugin.engine.dataset_exists("tank/docker/volumes/v1").unwrap());

    plugin.driver.remove("v1").unwrap();

    assert!(matches!(
        plugin.driver.get("v1"),
        Err(VolumeError::NotFound(_))
    ));
    assert!(!plugin.engine.dataset_exists("tank/docker/volumes/v1").unwrap());
    assert!(plugin.driver.list().is_empty());
}

#[test]
fn test_path_and_mount_agree() {
    let plugin = start();
    plugin.driver.create("data", VolumeOptions::new()).unwrap();

    let path = plugin.driver.path("data").unwrap();
    let mounted = plugin.driver.mount("data", "c0ffee").unwrap();
    assert_eq!(path, mounted);
    assert_eq!(path, scoped(&plugin, "data"));

    plugin.driver.unmount("data", "c0ffee").unwrap();
    // Unmount does not detach anything
    assert_eq!(plugin.driver.path("data").unwrap(), path);
}

#[test]
fn test_duplicate_create_is_rejected() {
    let plugin = start();
    plugin.driver.create("v1", VolumeOptions::new()).unwrap();

    let err = plugin.driver.create("v1", VolumeOptions::new()).unwrap_err();
    assert!(matches!(err, VolumeError::AlreadyExists(_)));
    assert_eq!(plugin.driver.list().len(), 1);
}

#[test]
fn test_existing_dataset_blocks_create() {
    let plugin = start();
    plugin
        .engine
        .create_dataset("tank/docker/volumes/taken", &Default::default())
        .unwrap();

    let err = plugin
        .driver
        .create("taken", VolumeOptions::new())
        .unwrap_err();
    assert!(matches!(err, VolumeError::AlreadyExists(_)));
    assert!(plugin.driver.registry().is_empty());
}

#[test]
fn test_mountpoint_option_is_rejected() {
    let plugin = start();

    let err = plugin
        .driver
        .create("v1", opts(&[("mountpoint", "/elsewhere")]))
        .unwrap_err();

    assert!(matches!(err, VolumeError::UnsupportedOption(_)));
    assert!(!plugin.engine.dataset_exists("tank/docker/volumes/v1").unwrap());
    assert!(plugin.driver.registry().is_empty());
}

#[test]
fn test_clone_from_snapshot() {
    let plugin = start();
    plugin.driver.create("base", VolumeOptions::new()).unwrap();
    plugin
        .engine
        .add_snapshot("tank/docker/volumes/base@golden")
        .unwrap();

    plugin
        .driver
        .create(
            "copy",
            opts(&[
                ("from-snapshot", "tank/docker/volumes/base@golden"),
                ("compression", "lz4"),
            ]),
        )
        .unwrap();

    assert_eq!(
        plugin.engine.origin("tank/docker/volumes/copy").as_deref(),
        Some("tank/docker/volumes/base@golden")
    );
    let props = plugin.engine.properties("tank/docker/volumes/copy").unwrap();
    assert_eq!(props.get("compression").map(String::as_str), Some("lz4"));
    assert!(!props.contains_key("from-snapshot"));
    assert_eq!(
        plugin.driver.path("copy").unwrap(),
        scoped(&plugin, "copy")
    );
}

#[test]
fn test_root_dataset_override() {
    let plugin = start();
    plugin
        .engine
        .create_dataset("tank/other", &Default::default())
        .unwrap();

    plugin
        .driver
        .create("v2", opts(&[("driver_zfsRootDataset", "tank/other")]))
        .unwrap();

    assert!(plugin.engine.dataset_exists("tank/other/v2").unwrap());
    let props = plugin.engine.properties("tank/other/v2").unwrap();
    assert!(!props.contains_key("driver_zfsRootDataset"));
    // The mountpoint stays under the base directory
    assert_eq!(plugin.driver.path("v2").unwrap(), scoped(&plugin, "v2"));
}

#[test]
fn test_state_survives_restart() {
    let plugin = start();
    plugin.driver.create("keep", VolumeOptions::new()).unwrap();
    plugin.driver.create("drop", VolumeOptions::new()).unwrap();
    plugin.driver.remove("drop").unwrap();

    let restarted = restart(&plugin);

    let names: Vec<String> = restarted.list().into_iter().map(|v| v.name).collect();
    assert_eq!(names, vec!["keep".to_string()]);
    assert_eq!(restarted.path("keep").unwrap(), scoped(&plugin, "keep"));
}

#[test]
fn test_destroy_failure_keeps_volume() {
    let plugin = start();
    plugin.driver.create("busy", VolumeOptions::new()).unwrap();
    plugin.engine.set_refuse_destroy(true);

    let err = plugin.driver.remove("busy").unwrap_err();
    assert!(matches!(err, VolumeError::Destroy { .. }));
    assert!(plugin.driver.get("busy").is_ok());
    assert!(restart(&plugin).get("busy").is_ok());

    plugin.engine.set_refuse_destroy(false);
    plugin.driver.remove("busy").unwrap();
    assert!(matches!(
        restart(&plugin).get("busy"),
        Err(VolumeError::NotFound(_))
    ));
}

#[test]
fn test_dataset_removed_out_of_band() {
    let plugin = start();
    plugin.driver.create("gone", VolumeOptions::new()).unwrap();
    plugin.driver.create("here", VolumeOptions::new()).unwrap();
    assert!(plugin.engine.remove_out_of_band("tank/docker/volumes/gone"));

    assert!(matches!(
        plugin.driver.get("gone"),
        Err(VolumeError::DatasetMissing { .. })
    ));

    let names: Vec<String> = plugin.driver.list().into_iter().map(|v| v.name).collect();
    assert_eq!(names, vec!["here".to_string()]);

    // Removing a stale entry unregisters it
    plugin.driver.remove("gone").unwrap();
    assert!(!plugin.driver.registry().contains("gone"));
}

#[test]
fn test_missing_creation_time_still_describes_volume() {
    let plugin = start();
    plugin.driver.create("v1", VolumeOptions::new()).unwrap();
    plugin.engine.set_creation_unavailable(true);

    let info = plugin.driver.get("v1").unwrap();
    assert!(info.created_at.is_none());
    assert_eq!(info.mountpoint, scoped(&plugin, "v1"));
}

#[test]
fn test_unknown_volume_operations() {
    let plugin = start();

    assert!(matches!(
        plugin.driver.get("nope"),
        Err(VolumeError::NotFound(_))
    ));
    assert!(matches!(
        plugin.driver.path("nope"),
        Err(VolumeError::NotFound(_))
    ));
    assert!(matches!(
        plugin.driver.mount("nope", "id"),
        Err(VolumeError::NotFound(_))
    ));
    assert!(matches!(
        plugin.driver.remove("nope"),
        Err(VolumeError::NotFound(_))
    ));
}

#[test]
fn test_capabilities_are_local() {
    let plugin = start();
    assert_eq!(plugin.driver.capabilities().scope, Scope::Local);
}

#[test]
fn test_start_without_root_dataset_fails() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(MemoryEngine::with_root(ROOT, "/somewhere/else"));

    let result = VolumeDriver::start(config(dir.path()), engine);
    assert!(matches!(result, Err(VolumeError::Startup(_))));
}

#[test]
fn test_start_with_corrupt_state_fails() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("state.json"), "{not json").unwrap();
    let engine = Arc::new(MemoryEngine::with_root(ROOT, dir.path()));

    let result = VolumeDriver::start(config(dir.path()), engine);
    assert!(matches!(result, Err(VolumeError::Startup(_))));
}
