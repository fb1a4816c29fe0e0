//! systemd socket activation (`sd_listen_fds`)

use std::env;
use std::io;
use std::os::unix::io::{FromRawFd, RawFd};
use std::os::unix::net::UnixListener;
use std::process;

/// First file descriptor passed by systemd
const SD_LISTEN_FDS_START: RawFd = 3;

/// Number of sockets passed to this process, 0 when not socket-activated
fn activated_fd_count(listen_pid: Option<&str>, listen_fds: Option<&str>, own_pid: u32) -> usize {
    let Some(pid) = listen_pid.and_then(|p| p.trim().parse::<u32>().ok()) else {
        return 0;
    };
    if pid != own_pid {
        return 0;
    }
    listen_fds
        .and_then(|n| n.trim().parse::<usize>().ok())
        .unwrap_or(0)
}

/// The listener systemd handed over, if any
pub fn listener_from_env() -> io::Result<Option<UnixListener>> {
    let count = activated_fd_count(
        env::var("LISTEN_PID").ok().as_deref(),
        env::var("LISTEN_FDS").ok().as_deref(),
        process::id(),
    );

    match count {
        0 => Ok(None),
        1 => {
            // SAFETY: systemd passes ownership of fd 3 when LISTEN_PID is ours.
            let listener = unsafe { UnixListener::from_raw_fd(SD_LISTEN_FDS_START) };
            Ok(Some(listener))
        }
        n => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("plugin does not support multiple sockets ({n} passed)"),
        )),
    }
}
