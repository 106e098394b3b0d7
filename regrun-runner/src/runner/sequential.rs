// Copyright (c) The regrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::ShutdownHandle;
use crate::{
    collect::Collection,
    errors::RunError,
    framework::TestFramework,
    reporter::TestReporter,
    sink::{DirectSink, Report, ResultAdapter},
};
use std::io::Write;
use tracing::debug;

/// Runs tests in the current process, reporting results directly.
pub struct SequentialRunner<'fw> {
    framework: &'fw dyn TestFramework,
    failfast: bool,
    shutdown: ShutdownHandle,
}

impl<'fw> SequentialRunner<'fw> {
    /// Creates a new runner.
    pub fn new(framework: &'fw dyn TestFramework, failfast: bool, shutdown: ShutdownHandle) -> Self {
        Self {
            framework,
            failfast,
            shutdown,
        }
    }

    /// Runs already-collected tests.
    pub fn execute<W: Write>(
        &self,
        collection: &Collection,
        reporter: &mut TestReporter<W>,
    ) -> Result<(), RunError> {
        for error in &collection.errors {
            reporter
                .report_collection_error(error.clone())
                .map_err(RunError::ReportWrite)?;
        }

        for file in &collection.files {
            if self.shutdown.is_shutdown() {
                break;
            }
            debug!(module = %file.module, tests = file.tests.len(), "running test file");
            let sink = DirectSink::new(reporter, &self.shutdown, self.failfast);
            let mut adapter = ResultAdapter::new(file.module.as_str(), self.framework, sink);
            file.tree.run(&mut adapter);
            let sink = adapter.into_inner();
            let stop = sink.should_stop();
            sink.finish()?;
            if stop {
                break;
            }
        }

        // An interrupted run reports nothing further.
        if !self.shutdown.is_shutdown() {
            for file in &collection.files {
                reporter
                    .report_unexecuted(&file.tests)
                    .map_err(RunError::ReportWrite)?;
            }
        }
        Ok(())
    }
}
