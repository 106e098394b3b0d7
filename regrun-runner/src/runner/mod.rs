// Copyright (c) The regrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Running collected tests.
//!
//! [`SequentialRunner`] runs tests in-process. [`ParallelRunner`] runs each test file in its own
//! worker process, and survives workers that crash.

mod parallel;
mod sequential;
mod unix;

pub use parallel::{ParallelRunner, WorkerCommand};
pub use sequential::SequentialRunner;

use crate::{StatusCounts, exit_codes::RegrunExitCode};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// A cancellation flag shared by the runner, its tasks and the signal handler.
///
/// Setting it is idempotent. Tasks observe it at their next polling boundary, terminate their
/// workers and report nothing further.
#[derive(Clone, Debug, Default)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Creates a new handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests that the run shut down.
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Returns true if a shutdown was requested.
    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Statistics for a test run.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RunStats {
    /// The number of results with each status.
    pub counts: StatusCounts,

    /// The number of test files that failed to load.
    pub collection_errors: usize,

    /// The number of worker crashes that happened outside of any test.
    pub crashes: usize,

    /// Whether the run was interrupted.
    pub interrupted: bool,
}

impl RunStats {
    /// Returns true if this run is considered a success.
    ///
    /// A run is marked as failed if any of the following are true:
    /// * any result is a failure, an error or an unexpected success
    /// * a test file failed to load
    /// * a worker crashed outside of a test
    /// * the run was interrupted
    pub fn is_success(&self) -> bool {
        !self.counts.has_failing()
            && self.collection_errors == 0
            && self.crashes == 0
            && !self.interrupted
    }

    /// The process exit code for this run.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            RegrunExitCode::OK
        } else {
            RegrunExitCode::TEST_RUN_FAILED
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestStatus;

    #[test]
    fn test_is_success() {
        assert!(RunStats::default().is_success(), "empty run => success");
        assert!(
            RunStats {
                counts: [TestStatus::Success, TestStatus::Skipped, TestStatus::ExpectedFailure]
                    .into_iter()
                    .collect(),
                ..RunStats::default()
            }
            .is_success(),
            "passed, skipped and expected failures => success"
        );
        for status in [TestStatus::Failure, TestStatus::Error, TestStatus::UnexpectedSuccess] {
            let stats = RunStats {
                counts: [status].into_iter().collect(),
                ..RunStats::default()
            };
            assert!(!stats.is_success(), "{status} => failure");
            assert_eq!(stats.exit_code(), RegrunExitCode::TEST_RUN_FAILED);
        }
        assert!(
            !RunStats {
                collection_errors: 1,
                ..RunStats::default()
            }
            .is_success(),
            "collection error => failure"
        );
        assert!(
            !RunStats {
                crashes: 1,
                ..RunStats::default()
            }
            .is_success(),
            "crash outside tests => failure"
        );
        assert!(
            !RunStats {
                interrupted: true,
                ..RunStats::default()
            }
            .is_success(),
            "interrupted => failure"
        );
    }

    #[test]
    fn shutdown_is_shared() {
        let handle = ShutdownHandle::new();
        let clone = handle.clone();
        assert!(!clone.is_shutdown());
        handle.shutdown();
        handle.shutdown();
        assert!(clone.is_shutdown());
    }
}
