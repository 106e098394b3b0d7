// Copyright (c) The regrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::NO_HEADING_TARGET;
use regrun_runner::{errors::*, exit_codes::RegrunExitCode};
use std::error::Error;
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// Note that the #[error()] strings are mostly placeholder messages: the expected way to print out
// errors is with the display_to_stderr method.

/// An error that is expected to happen, and is reported without a backtrace.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("could not determine current directory")]
    CurrentDirFailed {
        #[source]
        err: std::io::Error,
    },
    #[error("current directory is not valid UTF-8")]
    CurrentDirInvalidUtf8 {
        #[source]
        err: camino::FromPathBufError,
    },
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("invalid test specifier")]
    InvalidSpecifier {
        #[from]
        err: SpecifierParseError,
    },
    #[error("root directory error")]
    RootdirError {
        #[from]
        err: RootdirError,
    },
    #[error("no tests matched")]
    NoTestsMatched,
    #[error("signal handler setup error")]
    SignalHandlerSetupError {
        #[from]
        err: SignalHandlerSetupError,
    },
    #[error("test run error")]
    RunError {
        #[from]
        err: RunError,
    },
    #[error("error writing test list")]
    WriteTestListError {
        #[source]
        err: std::io::Error,
    },
    #[error("JSON report write error")]
    JsonReportWriteError {
        #[from]
        err: JsonReportWriteError,
    },
    #[error("worker error")]
    WorkerError {
        #[from]
        err: WorkerError,
    },
}

impl ExpectedError {
    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::InvalidSpecifier { .. } => RegrunExitCode::INVALID_ARGUMENTS,
            Self::CurrentDirFailed { .. }
            | Self::CurrentDirInvalidUtf8 { .. }
            | Self::ConfigParseError { .. }
            | Self::RootdirError { .. }
            | Self::SignalHandlerSetupError { .. }
            | Self::RunError { .. }
            | Self::WriteTestListError { .. }
            | Self::JsonReportWriteError { .. } => RegrunExitCode::SETUP_ERROR,
            Self::NoTestsMatched => RegrunExitCode::NO_TESTS_MATCHED,
            Self::WorkerError { .. } => RegrunExitCode::WORKER_ERROR,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self) {
        let mut next_error = match self {
            Self::CurrentDirFailed { err } => {
                error!("could not determine current directory");
                Some(err as &dyn Error)
            }
            Self::CurrentDirInvalidUtf8 { err } => {
                error!("current directory is not valid UTF-8");
                Some(err as &dyn Error)
            }
            Self::ConfigParseError { err } => {
                error!("{err}");
                err.source()
            }
            Self::InvalidSpecifier { err } => {
                error!("{err}");
                None
            }
            Self::RootdirError { err } => {
                error!("{err}");
                err.source()
            }
            Self::NoTestsMatched => {
                error!("No tests matched");
                None
            }
            Self::SignalHandlerSetupError { err } => {
                error!("error setting up signal handler");
                err.source()
            }
            Self::RunError { err } => {
                error!("{err}");
                err.source()
            }
            Self::WriteTestListError { err } => {
                error!("error writing test list");
                Some(err as &dyn Error)
            }
            Self::JsonReportWriteError { err } => {
                error!("{err}");
                err.source()
            }
            Self::WorkerError { err } => {
                error!("regrun worker failed: {err}");
                err.source()
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
