// Copyright (c) The regrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for regrun, a parallel orchestrator for a language runtime's regression
//! suite.
//!
//! The basic flow is:
//!
//! 1. Test specifiers (`file::Class::method`) are parsed into [`TestSpecifier`]s.
//! 2. The [`collect::Collector`] loads each file through the injected
//!    [`framework::TestFramework`] and prunes the loaded tree down to the requested tests.
//! 3. Either the [`runner::SequentialRunner`] runs the tests in-process, or the
//!    [`runner::ParallelRunner`] hands each file to a worker process (see [`worker`]) and
//!    rebuilds results from the events the worker streams back over a pipe.
//! 4. The [`reporter::TestReporter`] accumulates results and renders the final summary.

#[cfg(not(unix))]
compile_error!("regrun relies on file descriptor inheritance and only supports Unix platforms");

pub mod collect;
pub mod config;
pub mod errors;
pub mod exit_codes;
pub mod framework;
mod helpers;
pub mod protocol;
pub mod reporter;
pub mod runner;
pub mod signal;
pub mod sink;
mod specifier;
mod test_result;
#[cfg(test)]
mod test_helpers;
pub mod worker;

pub use specifier::TestSpecifier;
pub use test_result::{StatusCounts, TestResult, TestStatus};
