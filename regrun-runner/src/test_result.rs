// Copyright (c) The regrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::TestSpecifier;
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

/// The outcome of a single test.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
pub enum TestStatus {
    /// The test passed.
    #[serde(rename = "ok")]
    Success,
    /// An assertion in the test failed.
    #[serde(rename = "FAIL")]
    Failure,
    /// The test raised an unexpected error, or its worker crashed while running it.
    #[serde(rename = "ERROR")]
    Error,
    /// The test was skipped.
    #[serde(rename = "skipped")]
    Skipped,
    /// The test failed, and was marked as expected to fail.
    #[serde(rename = "expected failure")]
    ExpectedFailure,
    /// The test passed, but was marked as expected to fail.
    #[serde(rename = "unexpected success")]
    UnexpectedSuccess,
    /// The test was collected but never ran.
    #[serde(rename = "not executed")]
    NotExecuted,
}

impl TestStatus {
    /// All statuses, in summary order.
    pub const ALL: [TestStatus; 7] = [
        TestStatus::Success,
        TestStatus::Failure,
        TestStatus::Error,
        TestStatus::Skipped,
        TestStatus::ExpectedFailure,
        TestStatus::UnexpectedSuccess,
        TestStatus::NotExecuted,
    ];

    /// Returns the tag used for this status in progress lines and on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            TestStatus::Success => "ok",
            TestStatus::Failure => "FAIL",
            TestStatus::Error => "ERROR",
            TestStatus::Skipped => "skipped",
            TestStatus::ExpectedFailure => "expected failure",
            TestStatus::UnexpectedSuccess => "unexpected success",
            TestStatus::NotExecuted => "not executed",
        }
    }

    /// Returns true if a result with this status makes the run fail.
    pub fn is_failing(self) -> bool {
        matches!(
            self,
            TestStatus::Failure | TestStatus::Error | TestStatus::UnexpectedSuccess
        )
    }

    /// The label used for this status in the failure details of the summary.
    pub fn failure_label(self) -> Option<&'static str> {
        match self {
            TestStatus::Failure => Some("FAIL"),
            TestStatus::Error => Some("ERROR"),
            TestStatus::UnexpectedSuccess => Some("UNEXPECTED SUCCESS"),
            _ => None,
        }
    }

    /// The status recorded for this result in JSON reports.
    pub fn json_report_status(self) -> &'static str {
        match self {
            TestStatus::Success | TestStatus::ExpectedFailure => "PASSED",
            TestStatus::Skipped | TestStatus::NotExecuted => "IGNORED",
            TestStatus::Failure | TestStatus::Error | TestStatus::UnexpectedSuccess => "FAILED",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// The result of a single test.
#[derive(Clone, Debug, PartialEq)]
pub struct TestResult {
    /// The test this result is for.
    pub test_id: TestSpecifier,
    /// The outcome.
    pub status: TestStatus,
    /// The formatted traceback, skip reason or crash message, if any.
    pub param: Option<String>,
    /// Output the test wrote to stdout and stderr while it ran.
    pub output: String,
    /// Wall-clock time the test took.
    pub duration: Duration,
}

impl TestResult {
    /// Creates a new result with no parameter, output or duration.
    pub fn new(test_id: TestSpecifier, status: TestStatus) -> Self {
        Self {
            test_id,
            status,
            param: None,
            output: String::new(),
            duration: Duration::ZERO,
        }
    }

    /// Sets the parameter.
    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.param = Some(param.into());
        self
    }

    /// Sets the captured output.
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    /// Sets the duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// Number of results seen for each status.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct StatusCounts {
    counts: [usize; 7],
}

impl StatusCounts {
    /// Records one result with the given status.
    pub fn add(&mut self, status: TestStatus) {
        self.counts[status.index()] += 1;
    }

    /// Returns the number of results with the given status.
    pub fn get(&self, status: TestStatus) -> usize {
        self.counts[status.index()]
    }

    /// The number of tests that actually ran.
    pub fn executed(&self) -> usize {
        self.total() - self.get(TestStatus::NotExecuted)
    }

    /// The number of results.
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Returns true if any result is in the failing set.
    pub fn has_failing(&self) -> bool {
        TestStatus::ALL
            .iter()
            .any(|status| status.is_failing() && self.get(*status) > 0)
    }

    /// Returns the `name=count` items shown in the verdict line, skipping zero counts.
    pub fn summary_items(&self) -> Vec<String> {
        const ITEMS: [(TestStatus, &str); 6] = [
            (TestStatus::Failure, "failures"),
            (TestStatus::Error, "errors"),
            (TestStatus::Skipped, "skipped"),
            (TestStatus::ExpectedFailure, "expected failures"),
            (TestStatus::UnexpectedSuccess, "unexpected successes"),
            (TestStatus::NotExecuted, "not executed"),
        ];
        ITEMS
            .iter()
            .filter(|(status, _)| self.get(*status) > 0)
            .map(|(status, name)| format!("{name}={}", self.get(*status)))
            .collect()
    }
}

impl FromIterator<TestStatus> for StatusCounts {
    fn from_iter<I: IntoIterator<Item = TestStatus>>(iter: I) -> Self {
        let mut counts = StatusCounts::default();
        for status in iter {
            counts.add(status);
        }
        counts
    }
}
