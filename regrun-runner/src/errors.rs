// Copyright (c) The regrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by regrun.

use camino::Utf8PathBuf;
use config::ConfigError;
use std::{io, os::fd::RawFd};
use thiserror::Error;

/// An error returned while parsing a test specifier.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid test specifier `{input}`: {reason}")]
pub struct SpecifierParseError {
    input: String,
    reason: &'static str,
}

impl SpecifierParseError {
    pub(crate) fn new(input: impl Into<String>, reason: &'static str) -> Self {
        Self {
            input: input.into(),
            reason,
        }
    }

    /// Returns the input that failed to parse.
    pub fn input(&self) -> &str {
        &self.input
    }
}

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse regrun config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    err: ConfigError,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, err: ConfigError) -> Self {
        Self {
            config_file: config_file.into(),
            err,
        }
    }

    /// Returns the config file that failed to parse.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }
}

/// An error that occurred while resolving the root directory that test paths are relative to.
#[derive(Debug, Error)]
#[error("failed to resolve root directory `{rootdir}`")]
pub struct RootdirError {
    rootdir: Utf8PathBuf,
    #[source]
    error: io::Error,
}

impl RootdirError {
    pub(crate) fn new(rootdir: impl Into<Utf8PathBuf>, error: io::Error) -> Self {
        Self {
            rootdir: rootdir.into(),
            error,
        }
    }
}

/// An error that aborted a whole test run.
///
/// Problems with individual tests never surface here: they are turned into test results instead.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunError {
    /// The worker thread pool could not be built.
    #[error("error building worker thread pool")]
    PoolBuild(#[source] rayon::ThreadPoolBuildError),

    /// The current executable could not be determined, and no runtime was configured.
    #[error("error determining the current executable to use as the worker runtime")]
    CurrentExe(#[source] io::Error),

    /// The temporary file capturing a worker's output could not be created.
    #[error("error creating output capture file for `{file}`")]
    CaptureFile {
        /// The test file being run.
        file: String,
        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The pipe between the runner and a worker could not be created.
    #[error("error creating event pipe for `{file}`")]
    PipeSetup {
        /// The test file being run.
        file: String,
        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The worker process could not be started.
    #[error("error spawning worker `{runtime}` for `{file}`")]
    WorkerSpawn {
        /// The runtime that was spawned.
        runtime: Utf8PathBuf,
        /// The test file being run.
        file: String,
        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// Waiting on a worker process failed.
    #[error("error waiting for worker of `{file}`")]
    WorkerWait {
        /// The test file being run.
        file: String,
        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// Writing to the report output failed.
    #[error("error writing test report")]
    ReportWrite(#[source] io::Error),
}

/// An error that occurred inside a worker process.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WorkerError {
    /// The pipe file descriptor passed on the command line is not usable.
    #[error("pipe file descriptor {fd} is not open")]
    InvalidPipeFd {
        /// The file descriptor.
        fd: RawFd,
        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The plan could not be received from the runner.
    #[error("error receiving test plan from runner")]
    ReceivePlan(#[source] io::Error),

    /// The plan contained an invalid specifier.
    #[error("runner sent an invalid test plan")]
    PlanParse(#[source] SpecifierParseError),

    /// The root directory could not be resolved.
    #[error(transparent)]
    Rootdir(#[from] RootdirError),

    /// One or more test files could not be loaded.
    #[error("failed to collect {count} test file(s)")]
    Collection {
        /// The number of files that failed to load.
        count: usize,
    },

    /// An event could not be sent to the runner.
    #[error("error sending events to runner")]
    SendEvent(#[source] io::Error),
}

/// An error that occurred while writing a JSON report.
#[derive(Debug, Error)]
#[error("error writing JSON report to `{path}`")]
pub struct JsonReportWriteError {
    path: Utf8PathBuf,
    #[source]
    error: io::Error,
}

impl JsonReportWriteError {
    pub(crate) fn new(path: impl Into<Utf8PathBuf>, error: io::Error) -> Self {
        Self {
            path: path.into(),
            error,
        }
    }
}

/// An error that occurred while setting up the signal handler.
#[derive(Debug, Error)]
#[error("error setting up signal handler")]
pub struct SignalHandlerSetupError(#[from] io::Error);
