// Copyright (c) The regrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The wire protocol between the runner and its workers.
//!
//! Messages are JSON documents, each prefixed with its length as a big-endian `u32`. The runner
//! sends the plan (a list of specifier strings) exactly once; the worker answers with a stream of
//! [`Event`]s. Test output never travels over the pipe: it goes to the capture file, and events
//! carry the position of that file at the time they were sent.

use crate::{TestSpecifier, TestStatus};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{
    io::{self, Read, Write},
    net::Shutdown,
    os::{
        fd::{FromRawFd, OwnedFd, RawFd},
        unix::net::UnixStream,
    },
};

/// Messages larger than this are rejected.
const MAX_MESSAGE_SIZE: u32 = 64 * 1024 * 1024;

/// An event sent from a worker to the runner.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum Event {
    /// A test started running.
    TestStarted {
        /// The test.
        test: TestSpecifier,
        /// The worker's stdout position, or -1 if stdout is not seekable.
        out_pos: i64,
    },
    /// A test produced its result.
    TestResult {
        /// The test.
        test: TestSpecifier,
        /// The worker's stdout position, or -1 if stdout is not seekable.
        out_pos: i64,
        /// The outcome.
        status: TestStatus,
        /// The formatted traceback or skip reason.
        #[serde(default)]
        param: Option<String>,
        /// How long the test took, in seconds.
        #[serde(default)]
        duration: f64,
    },
    /// A test finished running.
    TestStopped {
        /// The test.
        test: TestSpecifier,
        /// The worker's stdout position, or -1 if stdout is not seekable.
        out_pos: i64,
    },
}

/// Writes a single length-prefixed message.
pub fn write_message<T: Serialize>(writer: &mut impl Write, message: &T) -> io::Result<()> {
    let bytes = serde_json::to_vec(message)?;
    let len = u32::try_from(bytes.len())
        .ok()
        .filter(|len| *len <= MAX_MESSAGE_SIZE)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("message of {} bytes is too large", bytes.len()),
            )
        })?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(&bytes)?;
    writer.flush()
}

/// Reads a single length-prefixed message.
///
/// Returns an error of kind [`io::ErrorKind::UnexpectedEof`] if the other side closed the
/// connection.
pub fn read_message<T: DeserializeOwned>(reader: &mut impl Read) -> io::Result<T> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("incoming message of {len} bytes is too large"),
        ));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    Ok(serde_json::from_slice(&buf)?)
}

/// One end of the pipe between the runner and a worker.
#[derive(Debug)]
pub struct Connection {
    stream: UnixStream,
}

impl Connection {
    /// Creates a connected pair: the runner's end, and the raw stream to hand to the worker.
    pub fn pair() -> io::Result<(Connection, UnixStream)> {
        let (ours, theirs) = UnixStream::pair()?;
        Ok((Connection { stream: ours }, theirs))
    }

    /// Takes ownership of a file descriptor inherited from the runner.
    ///
    /// The descriptor is marked close-on-exec again, so processes the tests spawn don't keep the
    /// pipe open.
    pub fn from_inherited_fd(fd: RawFd) -> io::Result<Self> {
        // SAFETY: F_GETFD only inspects the descriptor table.
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: the descriptor is open, and the runner handed it to this process for its sole use.
        let owned = unsafe { OwnedFd::from_raw_fd(fd) };
        // SAFETY: as above, on a descriptor this process now owns.
        if unsafe { libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Connection {
            stream: UnixStream::from(owned),
        })
    }

    /// Sends a message.
    pub fn send<T: Serialize>(&mut self, message: &T) -> io::Result<()> {
        write_message(&mut self.stream, message)
    }

    /// Receives a message, blocking until one arrives.
    pub fn recv<T: DeserializeOwned>(&mut self) -> io::Result<T> {
        read_message(&mut self.stream)
    }

    /// Returns a second handle to the same connection.
    pub fn try_clone(&self) -> io::Result<Connection> {
        Ok(Connection {
            stream: self.stream.try_clone()?,
        })
    }

    /// Shuts down both directions, waking up any thread blocked in [`Self::recv`].
    pub fn shutdown(&self) -> io::Result<()> {
        self.stream.shutdown(Shutdown::Both)
    }
}
