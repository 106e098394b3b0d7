// Copyright (c) The regrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Support for handling signals in regrun.

use crate::{errors::SignalHandlerSetupError, runner::ShutdownHandle};
use signal_hook::{
    consts::TERM_SIGNALS,
    iterator::{Handle, SignalsInfo, exfiltrator::SignalOnly},
    low_level::emulate_default_handler,
};
use std::thread::JoinHandle;
use tracing::debug;

/// The kind of signal handling to set up for a test run.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SignalHandlerKind {
    /// Shut down the run on the first SIGINT, SIGTERM or SIGQUIT, and fall back to the default
    /// behavior for the next one.
    Standard,

    /// Don't handle signals. Useful for tests.
    Noop,
}

impl SignalHandlerKind {
    /// Installs the signal handler, which triggers `shutdown` when a termination signal arrives.
    pub fn install(self, shutdown: ShutdownHandle) -> Result<SignalHandler, SignalHandlerSetupError> {
        match self {
            Self::Standard => SignalHandler::new(shutdown),
            Self::Noop => Ok(SignalHandler {
                handle: None,
                thread: None,
            }),
        }
    }
}

/// A running signal handler thread. Dropping it stops listening for signals.
#[derive(Debug)]
pub struct SignalHandler {
    handle: Option<Handle>,
    thread: Option<JoinHandle<()>>,
}

impl SignalHandler {
    fn new(shutdown: ShutdownHandle) -> Result<Self, SignalHandlerSetupError> {
        let mut signals = SignalsInfo::<SignalOnly>::new(TERM_SIGNALS)?;
        let handle = signals.handle();
        let thread = std::thread::Builder::new()
            .name("regrun-signals".to_owned())
            .spawn(move || {
                let mut term_once = false;
                for signal in &mut signals {
                    if term_once {
                        let _ = emulate_default_handler(signal);
                    } else {
                        term_once = true;
                        debug!(signal, "received termination signal, shutting down");
                        shutdown.shutdown();
                    }
                }
            })?;
        Ok(Self {
            handle: Some(handle),
            thread: Some(thread),
        })
    }
}

impl Drop for SignalHandler {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.close();
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
