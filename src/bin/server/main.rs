//! Docker volume plugin daemon - serves ZFS-backed volumes on a unix socket

mod activation;
mod cli;
mod handlers;
mod logging;

use actix_web::{web, App, HttpServer};
use clap::Parser;
use cli::Cli;
use docker_zfs_plugin::storage::{DatasetEngine, MemoryEngine, ZfsCli};
use docker_zfs_plugin::VolumeDriver;
use log::{error, info, warn};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

#[actix_web::main]
async fn main() -> io::Result<()> {
    let cli = Cli::parse();

    if let Err(e) = logging::init_logger(cli.debug, cli.log_file.as_deref()) {
        eprintln!("error: cannot set up logging: {}", e);
        std::process::exit(1);
    }

    let config = cli.plugin_config();
    let engine: Arc<dyn DatasetEngine> = if cli.dry_run {
        warn!("Dry run: volumes live in memory only");
        Arc::new(MemoryEngine::with_root("dry-run", &config.base_dir))
    } else {
        Arc::new(ZfsCli::new(&config.zfs_binary))
    };

    let driver = match VolumeDriver::start(config, engine) {
        Ok(driver) => web::Data::new(driver),
        Err(e) => {
            error!("{}", e);
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    };

    let server = HttpServer::new(move || {
        App::new()
            .app_data(driver.clone())
            .configure(handlers::configure)
    });

    match activation::listener_from_env()? {
        Some(listener) => {
            info!("Launching volume handler on activated socket");
            server.listen_uds(listener)?.run().await
        }
        None => {
            prepare_socket(&cli.socket)?;
            info!("Launching volume handler on {}", cli.socket.display());
            server.bind_uds(&cli.socket)?.run().await
        }
    }
}

/// Create the socket's directory and clear a socket left by a previous run
fn prepare_socket(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
