// Copyright (c) The regrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Result sinks: the callbacks the framework drives while tests run.
//!
//! The framework calls into a [`ResultSink`]. [`ResultAdapter`] turns those callbacks into
//! [`TestResult`] values and hands them to a [`Report`] implementation:
//!
//! * [`DirectSink`] records results straight into the [`TestReporter`], for in-process runs.
//! * [`PipeSink`] sends them to the parent runner as [`Event`]s, for worker processes.

use crate::{
    TestResult, TestSpecifier, TestStatus,
    errors::{RunError, WorkerError},
    framework::{ExcInfo, TestCase, TestFramework},
    protocol::{Connection, Event},
    reporter::TestReporter,
    runner::ShutdownHandle,
};
use std::{
    io::{self, Write},
    time::Instant,
};
use tracing::warn;

/// The callbacks a test framework drives while running tests.
pub trait ResultSink {
    /// A test is about to run.
    fn start_test(&mut self, test: &dyn TestCase);

    /// A test finished running, whatever its outcome.
    fn stop_test(&mut self, test: &dyn TestCase);

    /// The test passed.
    fn add_success(&mut self, test: &dyn TestCase);

    /// An assertion in the test failed.
    fn add_failure(&mut self, test: &dyn TestCase, err: &ExcInfo);

    /// The test raised an unexpected exception.
    fn add_error(&mut self, test: &dyn TestCase, err: &ExcInfo);

    /// The test was skipped.
    fn add_skip(&mut self, test: &dyn TestCase, reason: &str);

    /// The test failed as expected.
    fn add_expected_failure(&mut self, test: &dyn TestCase, err: &ExcInfo);

    /// The test passed, but was expected to fail.
    fn add_unexpected_success(&mut self, test: &dyn TestCase);

    /// Returns true if no further tests should be run.
    fn should_stop(&self) -> bool {
        false
    }
}

/// Where a [`ResultAdapter`] sends what it learns.
pub trait Report {
    /// A test started.
    fn report_start(&mut self, test_id: &TestSpecifier);

    /// A test produced a result.
    fn report_result(&mut self, result: TestResult);

    /// A test stopped.
    fn report_stop(&mut self, _test_id: &TestSpecifier) {}

    /// Returns true if no further tests should be run.
    fn should_stop(&self) -> bool;
}

/// Adapts framework callbacks to [`TestResult`] values.
pub struct ResultAdapter<'fw, R> {
    file: String,
    framework: &'fw dyn TestFramework,
    start_time: Option<Instant>,
    report: R,
}

impl<'fw, R: Report> ResultAdapter<'fw, R> {
    /// Creates an adapter for tests loaded from `file`, a dotted module name.
    pub fn new(file: impl Into<String>, framework: &'fw dyn TestFramework, report: R) -> Self {
        Self {
            file: file.into(),
            framework,
            start_time: None,
            report,
        }
    }

    /// Returns the underlying report.
    pub fn into_inner(self) -> R {
        self.report
    }

    fn test_id(&self, test: &dyn TestCase) -> Option<TestSpecifier> {
        match TestSpecifier::from_test(&self.file, test) {
            Ok(test_id) => Some(test_id),
            Err(error) => {
                warn!(file = %self.file, %error, "ignoring callback for test with invalid identifier");
                None
            }
        }
    }

    fn format_exc(&self, err: &ExcInfo) -> String {
        err.format(|frame| self.framework.is_internal_frame(frame))
    }

    fn add_result(&mut self, test: &dyn TestCase, status: TestStatus, param: Option<String>) {
        let Some(test_id) = self.test_id(test) else {
            return;
        };
        let duration = self
            .start_time
            .map(|start| start.elapsed())
            .unwrap_or_default();
        let mut result = TestResult::new(test_id, status).with_duration(duration);
        result.param = param;
        self.report.report_result(result);
    }
}

impl<R: Report> ResultSink for ResultAdapter<'_, R> {
    fn start_test(&mut self, test: &dyn TestCase) {
        self.start_time = Some(Instant::now());
        if let Some(test_id) = self.test_id(test) {
            self.report.report_start(&test_id);
        }
    }

    fn stop_test(&mut self, test: &dyn TestCase) {
        if let Some(test_id) = self.test_id(test) {
            self.report.report_stop(&test_id);
        }
    }

    fn add_success(&mut self, test: &dyn TestCase) {
        self.add_result(test, TestStatus::Success, None);
    }

    fn add_failure(&mut self, test: &dyn TestCase, err: &ExcInfo) {
        let param = self.format_exc(err);
        self.add_result(test, TestStatus::Failure, Some(param));
    }

    fn add_error(&mut self, test: &dyn TestCase, err: &ExcInfo) {
        let param = self.format_exc(err);
        self.add_result(test, TestStatus::Error, Some(param));
    }

    fn add_skip(&mut self, test: &dyn TestCase, reason: &str) {
        self.add_result(test, TestStatus::Skipped, Some(reason.to_owned()));
    }

    fn add_expected_failure(&mut self, test: &dyn TestCase, err: &ExcInfo) {
        let param = self.format_exc(err);
        self.add_result(test, TestStatus::ExpectedFailure, Some(param));
    }

    fn add_unexpected_success(&mut self, test: &dyn TestCase) {
        self.add_result(test, TestStatus::UnexpectedSuccess, None);
    }

    fn should_stop(&self) -> bool {
        self.report.should_stop()
    }
}

/// Records results directly into a [`TestReporter`].
pub struct DirectSink<'a, W> {
    reporter: &'a mut TestReporter<W>,
    shutdown: &'a ShutdownHandle,
    failfast: bool,
    failed: bool,
    error: Option<io::Error>,
}

impl<'a, W: Write> DirectSink<'a, W> {
    /// Creates a new sink.
    pub fn new(reporter: &'a mut TestReporter<W>, shutdown: &'a ShutdownHandle, failfast: bool) -> Self {
        Self {
            reporter,
            shutdown,
            failfast,
            failed: false,
            error: None,
        }
    }

    /// Returns the first error hit while writing to the reporter.
    pub fn finish(self) -> Result<(), RunError> {
        match self.error {
            Some(error) => Err(RunError::ReportWrite(error)),
            None => Ok(()),
        }
    }

    fn record(&mut self, res: io::Result<()>) {
        if let Err(error) = res {
            self.error.get_or_insert(error);
        }
    }
}

impl<W: Write> Report for DirectSink<'_, W> {
    fn report_start(&mut self, test_id: &TestSpecifier) {
        let res = self.reporter.report_start(test_id);
        self.record(res);
    }

    fn report_result(&mut self, result: TestResult) {
        if result.status.is_failing() {
            self.failed = true;
        }
        let res = self.reporter.report_result(result);
        self.record(res);
    }

    fn should_stop(&self) -> bool {
        (self.failfast && self.failed) || self.error.is_some() || self.shutdown.is_shutdown()
    }
}

/// Sends results to the parent runner over the event pipe.
pub struct PipeSink<'a> {
    conn: &'a mut Connection,
    failfast: bool,
    failed: bool,
    error: Option<io::Error>,
}

impl<'a> PipeSink<'a> {
    /// Creates a new sink.
    pub fn new(conn: &'a mut Connection, failfast: bool) -> Self {
        Self {
            conn,
            failfast,
            failed: false,
            error: None,
        }
    }

    /// Returns the first error hit while sending events.
    pub fn finish(self) -> Result<(), WorkerError> {
        match self.error {
            Some(error) => Err(WorkerError::SendEvent(error)),
            None => Ok(()),
        }
    }

    fn emit(&mut self, event: Event) {
        if self.error.is_some() {
            return;
        }
        if let Err(error) = self.conn.send(&event) {
            self.error = Some(error);
        }
    }
}

impl Report for PipeSink<'_> {
    fn report_start(&mut self, test_id: &TestSpecifier) {
        self.emit(Event::TestStarted {
            test: test_id.clone(),
            out_pos: out_tell(),
        });
    }

    fn report_result(&mut self, result: TestResult) {
        if result.status.is_failing() {
            self.failed = true;
        }
        self.emit(Event::TestResult {
            test: result.test_id,
            out_pos: out_tell(),
            status: result.status,
            param: result.param,
            duration: result.duration.as_secs_f64(),
        });
    }

    fn report_stop(&mut self, test_id: &TestSpecifier) {
        self.emit(Event::TestStopped {
            test: test_id.clone(),
            out_pos: out_tell(),
        });
    }

    fn should_stop(&self) -> bool {
        (self.failfast && self.failed) || self.error.is_some()
    }
}

/// Returns the current position of stdout, or -1 if stdout is not a regular file.
///
/// stdout and stderr share one open file in a worker, so this is the position of both.
fn out_tell() -> i64 {
    // Buffered output must land in the file before the position is taken.
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();
    // SAFETY: lseek has no memory-safety preconditions.
    let pos = unsafe { libc::lseek(libc::STDOUT_FILENO, 0, libc::SEEK_CUR) };
    if pos < 0 { -1 } else { i64::from(pos) }
}
