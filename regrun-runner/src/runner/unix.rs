// Copyright (c) The regrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::WorkerCommand;
use crate::{helpers::signal_str, worker::IN_PROCESS_ENV};
use libc::{SIGKILL, SIGTERM};
use std::{
    fs::File,
    io,
    os::{
        fd::{AsRawFd, RawFd},
        unix::{
            net::UnixStream,
            process::{CommandExt, ExitStatusExt},
        },
    },
    process::{Child, Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};
use tracing::debug;

/// Upper bound on how long to sleep between checks while waiting for a terminated worker.
const TERMINATE_POLL: Duration = Duration::from_millis(50);

/// Spawns a worker process.
///
/// The worker inherits `child_end` as the event pipe, and writes both stdout and stderr to
/// `capture`.
pub(super) fn spawn_worker(
    command: &WorkerCommand,
    child_end: &UnixStream,
    capture: &File,
    failfast: bool,
) -> io::Result<Child> {
    let fd = child_end.as_raw_fd();
    let mut cmd = Command::new(command.program());
    cmd.args(command.args())
        .arg("--pipe-fd")
        .arg(fd.to_string())
        .env(IN_PROCESS_ENV, "1")
        .stdin(Stdio::null())
        .stdout(capture.try_clone()?)
        .stderr(capture.try_clone()?);
    if failfast {
        cmd.arg("--failfast");
    }
    // Put the worker in its own process group, so that terminating it also terminates anything
    // the tests spawned.
    cmd.process_group(0);

    // SAFETY: the closure only calls fcntl, which is async-signal-safe.
    unsafe {
        cmd.pre_exec(move || clear_cloexec(fd));
    }

    let child = cmd.spawn()?;
    debug!(pid = child.id(), fd, "spawned worker");
    Ok(child)
}

/// Makes `fd` survive exec. Runs in the forked child, so that the runner's copy stays
/// close-on-exec and no other worker inherits it.
fn clear_cloexec(fd: RawFd) -> io::Result<()> {
    // SAFETY: fcntl with F_GETFD/F_SETFD only manipulates descriptor flags.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: as above.
    if unsafe { libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Terminates a worker and its process group: SIGTERM first, then SIGKILL once `grace_period`
/// has elapsed.
///
/// Always reaps the worker.
pub(super) fn terminate(child: &mut Child, grace_period: Duration) -> io::Result<()> {
    if child.try_wait()?.is_some() {
        return Ok(());
    }
    let Ok(pid) = i32::try_from(child.id()) else {
        child.kill()?;
        child.wait()?;
        return Ok(());
    };

    debug!(pid, "terminating worker with SIGTERM");
    // SAFETY: kill has no memory-safety preconditions. A negative pid signals the process group.
    unsafe { libc::kill(-pid, SIGTERM) };

    let deadline = Instant::now() + grace_period;
    while Instant::now() < deadline {
        if child.try_wait()?.is_some() {
            return Ok(());
        }
        thread::sleep(TERMINATE_POLL.min(grace_period));
    }

    debug!(pid, "worker did not exit within grace period, sending SIGKILL");
    // SAFETY: as above.
    unsafe { libc::kill(-pid, SIGKILL) };
    child.wait()?;
    Ok(())
}

/// Describes how a worker exited.
pub(super) fn exit_message(status: ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("Test process exited with code {code}");
    }
    match status.signal() {
        Some(signal) => match signal_str(signal) {
            Some(name) => format!("Test process killed by signal SIG{name}"),
            None => format!("Test process killed by signal {signal}"),
        },
        None => format!("Test process exited abnormally: {status}"),
    }
}
