use clap::builder::FalseyValueParser;
use clap::Parser;
use docker_zfs_plugin::config::{DEFAULT_BASE_DIR, DEFAULT_PROPAGATED_MOUNT};
use docker_zfs_plugin::storage::zfs::DEFAULT_ZFS_BINARY;
use docker_zfs_plugin::PluginConfig;
use std::path::PathBuf;

pub const DEFAULT_SOCKET: &str = "/run/docker/plugins/zfs-vol.sock";

#[derive(Parser, Debug)]
#[command(name = "docker-zfs-plugin")]
#[command(version, about = "Docker volume plugin backed by ZFS datasets", long_about = None)]
#[command(after_help = "EXAMPLES:
    # Serve on the default plugin socket
    docker-zfs-plugin

    # Root dataset mounted somewhere else, log to a file
    docker-zfs-plugin --base-dir /tank/docker --log-file /var/log/zfs-plugin.log

    # Try the protocol without touching ZFS
    docker-zfs-plugin --dry-run --socket /tmp/zfs-vol.sock --debug
")]
pub struct Cli {
    /// Unix socket to listen on (ignored under socket activation)
    #[arg(long, value_name = "PATH", env = "ZFS_PLUGIN_SOCKET", default_value = DEFAULT_SOCKET)]
    pub socket: PathBuf,

    /// Mountpoint of the root dataset; volumes are mounted under volumes/
    #[arg(long, value_name = "PATH", env = "ZFS_PLUGIN_BASE_DIR", default_value = DEFAULT_BASE_DIR)]
    pub base_dir: PathBuf,

    /// Volume state file (default: <BASE_DIR>/state.json)
    #[arg(long, value_name = "PATH", env = "ZFS_PLUGIN_STATE_FILE")]
    pub state_file: Option<PathBuf>,

    /// Relocated root Docker runs the plugin under
    #[arg(long, value_name = "PATH", default_value = DEFAULT_PROPAGATED_MOUNT)]
    pub propagated_mount: String,

    /// Levels of relocation to escape (default: depth of --propagated-mount)
    #[arg(long, value_name = "N")]
    pub escape_depth: Option<usize>,

    /// zfs binary
    #[arg(long, value_name = "PATH", default_value = DEFAULT_ZFS_BINARY)]
    pub zfs_binary: PathBuf,

    /// Append logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, env = "DEBUG", value_parser = FalseyValueParser::new())]
    pub debug: bool,

    /// Use an in-memory pool instead of ZFS
    #[arg(long)]
    pub dry_run: bool,
}

impl Cli {
    pub fn plugin_config(&self) -> PluginConfig {
        PluginConfig {
            base_dir: self.base_dir.clone(),
            state_file: self.state_file.clone(),
            propagated_mount: self.propagated_mount.clone(),
            escape_depth: self.escape_depth,
            zfs_binary: self.zfs_binary.clone(),
        }
    }
}
