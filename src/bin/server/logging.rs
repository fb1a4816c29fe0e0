use env_logger::{Builder, Env, Target};
use log::LevelFilter;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

/// Initialize logger: `RUST_LOG` filtering, debug forced by `debug`,
/// appended to `log_file` when given
pub fn init_logger(debug: bool, log_file: Option<&Path>) -> io::Result<()> {
    let env = Env::default().filter_or("RUST_LOG", if debug { "debug" } else { "info" });

    let mut builder = Builder::from_env(env);
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} {:<5} {}: {}",
            buf.timestamp(),
            record.level(),
            record.target(),
            record.args()
        )
    });

    if debug {
        builder.filter_level(LevelFilter::Debug);
    }

    if let Some(path) = log_file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    builder
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
}
