//! `DatasetEngine` backed by the host `zfs` binary.
//!
//! Command execution and output parsing are kept apart so the parsing can be
//! tested against canned output without a pool.

use super::engine::{DatasetEngine, DatasetProperties, EngineError, EngineResult};
use chrono::{DateTime, TimeZone, Utc};
use log::debug;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Default binary name, resolved through `PATH`
pub const DEFAULT_ZFS_BINARY: &str = "zfs";

#[derive(Debug)]
struct Output {
    stdout: String,
    stderr: String,
    status: i32,
}

impl Output {
    fn success(&self) -> bool {
        self.status == 0
    }
}

/// Drives ZFS through its command line interface
#[derive(Debug, Clone)]
pub struct ZfsCli {
    binary: PathBuf,
}

impl Default for ZfsCli {
    fn default() -> Self {
        Self::new(DEFAULT_ZFS_BINARY)
    }
}

impl ZfsCli {
    pub fn new(binary: impl AsRef<Path>) -> Self {
        Self {
            binary: binary.as_ref().to_path_buf(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn run(&self, args: &[String]) -> EngineResult<Output> {
        debug!("{} {}", self.binary.display(), args.join(" "));

        let out = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()?;

        Ok(Output {
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            status: out.status.code().unwrap_or(-1),
        })
    }

    /// Run and turn a non-zero exit into an `EngineError`
    fn run_checked(&self, args: &[String], dataset: &str) -> EngineResult<String> {
        let out = self.run(args)?;
        if out.success() {
            return Ok(out.stdout);
        }
        Err(classify_failure(
            &format!("zfs {}", args.first().map(String::as_str).unwrap_or("")),
            dataset,
            &out,
        ))
    }

    fn get_property(&self, dataset: &str, property: &str, parsable: bool) -> EngineResult<String> {
        let mut args = vec!["get".to_string(), "-H".to_string()];
        if parsable {
            args.push("-p".to_string());
        }
        args.extend(["-o", "value", property, dataset].map(String::from));
        let stdout = self.run_checked(&args, dataset)?;
        parse_single_value(&stdout)
    }
}

impl DatasetEngine for ZfsCli {
    fn dataset_exists(&self, dataset: &str) -> EngineResult<bool> {
        let args = ["list", "-H", "-o", "name", dataset].map(String::from);
        let out = self.run(&args)?;
        if out.success() {
            return Ok(true);
        }
        match classify_failure("zfs list", dataset, &out) {
            EngineError::DoesNotExist(_) => Ok(false),
            err => Err(err),
        }
    }

    fn create_dataset(&self, dataset: &str, properties: &DatasetProperties) -> EngineResult<()> {
        let mut args = vec!["create".to_string(), "-p".to_string()];
        args.extend(property_args(properties));
        args.push(dataset.to_string());
        self.run_checked(&args, dataset).map(|_| ())
    }

    fn clone_snapshot(
        &self,
        snapshot: &str,
        dataset: &str,
        properties: &DatasetProperties,
    ) -> EngineResult<()> {
        let mut args = vec!["clone".to_string(), "-p".to_string()];
        args.extend(property_args(properties));
        args.push(snapshot.to_string());
        args.push(dataset.to_string());
        self.run_checked(&args, dataset).map(|_| ())
    }

    fn destroy_dataset(&self, dataset: &str) -> EngineResult<()> {
        let args = ["destroy", dataset].map(String::from);
        self.run_checked(&args, dataset).map(|_| ())
    }

    fn mountpoint(&self, dataset: &str) -> EngineResult<String> {
        self.get_property(dataset, "mountpoint", false)
    }

    fn creation_time(&self, dataset: &str) -> EngineResult<DateTime<Utc>> {
        let raw = self.get_property(dataset, "creation", true)?;
        parse_creation(&raw)
    }

    fn dataset_mounted_at(&self, mountpoint: &Path) -> EngineResult<Option<String>> {
        let args = [
            "list",
            "-r",
            "-H",
            "-o",
            "name,mountpoint",
            "-t",
            "filesystem",
        ]
        .map(String::from);
        let out = self.run(&args)?;
        if !out.success() {
            return Err(EngineError::Failed(format!(
                "could not list ZFS datasets (exit code {}): {}",
                out.status,
                out.stderr.trim()
            )));
        }
        Ok(find_dataset_by_mountpoint(&out.stdout, mountpoint))
    }
}

fn property_args(properties: &DatasetProperties) -> Vec<String> {
    properties
        .iter()
        .flat_map(|(key, value)| ["-o".to_string(), format!("{key}={value}")])
        .collect()
}

fn classify_failure(command: &str, dataset: &str, out: &Output) -> EngineError {
    let diagnostic = if out.stderr.trim().is_empty() {
        out.stdout.trim()
    } else {
        out.stderr.trim()
    };
    let lower = diagnostic.to_ascii_lowercase();

    if lower.contains("already exists") {
        EngineError::AlreadyExists(dataset.to_string())
    } else if lower.contains("does not exist") {
        EngineError::DoesNotExist(dataset.to_string())
    } else {
        EngineError::Failed(format!(
            "{command} failed for {dataset} (exit code {}): {diagnostic}",
            out.status
        ))
    }
}

fn parse_single_value(stdout: &str) -> EngineResult<String> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
        .ok_or_else(|| EngineError::Parse("empty property value".to_string()))
}

fn parse_creation(raw: &str) -> EngineResult<DateTime<Utc>> {
    let secs: i64 = raw
        .trim()
        .parse()
        .map_err(|_| EngineError::Parse(format!("creation is not a timestamp: {raw:?}")))?;
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| EngineError::Parse(format!("creation out of range: {secs}")))
}

/// Scan `zfs list -H -o name,mountpoint` output for `mountpoint`
fn find_dataset_by_mountpoint(listing: &str, mountpoint: &Path) -> Option<String> {
    listing.lines().find_map(|line| {
        let mut fields = line.split('\t');
        match (fields.next(), fields.next(), fields.next()) {
            (Some(name), Some(mount), None) if Path::new(mount) == mountpoint => {
                Some(name.to_string())
            }
            _ => None,
        }
    })
}
