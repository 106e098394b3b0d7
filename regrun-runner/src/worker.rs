// Copyright (c) The regrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The worker side of the parallel runner.
//!
//! A worker is started with the runner's end of an event pipe as an inherited file descriptor.
//! It receives its plan, collects the tests named in it and runs them, streaming events back
//! through a [`PipeSink`]. It never prints anything itself: whatever ends up on stdout or stderr
//! was written by the tests, and the runner attributes it to them.

use crate::{
    collect::Collector,
    errors::WorkerError,
    framework::TestFramework,
    protocol::Connection,
    sink::{PipeSink, Report, ResultAdapter},
};
use camino::Utf8Path;
use std::os::fd::RawFd;
use tracing::debug;

/// The environment variable that marks a process as a worker, when set to `1`.
pub const IN_PROCESS_ENV: &str = "IN_PROCESS";

/// Runs a worker over the pipe inherited as `fd`.
///
/// With `failfast`, the worker stops after the first failing result.
pub fn run_worker(
    framework: &dyn TestFramework,
    fd: RawFd,
    failfast: bool,
    rootdir: &Utf8Path,
) -> Result<(), WorkerError> {
    let mut conn =
        Connection::from_inherited_fd(fd).map_err(|error| WorkerError::InvalidPipeFd { fd, error })?;
    let plan: Vec<String> = conn.recv().map_err(WorkerError::ReceivePlan)?;
    debug!(tests = plan.len(), "received plan");

    let collector = Collector::new(framework, rootdir)?;
    let collection = collector
        .collect_strings(&plan)
        .map_err(WorkerError::PlanParse)?;
    if !collection.errors.is_empty() {
        return Err(WorkerError::Collection {
            count: collection.errors.len(),
        });
    }

    for file in &collection.files {
        let sink = PipeSink::new(&mut conn, failfast);
        let mut adapter = ResultAdapter::new(file.module.as_str(), framework, sink);
        file.tree.run(&mut adapter);
        let sink = adapter.into_inner();
        let stop = sink.should_stop();
        sink.finish()?;
        if stop {
            debug!(module = %file.module, "stopping early");
            break;
        }
    }
    Ok(())
}
