// Copyright (c) The regrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Documented exit codes for regrun.

/// Documented exit codes for `regrun` failures.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum RegrunExitCode {}

impl RegrunExitCode {
    /// No errors occurred and every test passed, was skipped or failed as expected.
    pub const OK: i32 = 0;

    /// One or more tests failed, a test file failed to load, a worker crashed outside of a test,
    /// or the run was interrupted.
    pub const TEST_RUN_FAILED: i32 = 1;

    /// A test specifier or command-line argument was invalid.
    pub const INVALID_ARGUMENTS: i32 = 2;

    /// A user issue happened while setting up the run: a bad config file, an unusable root
    /// directory, or a runtime that could not be spawned.
    pub const SETUP_ERROR: i32 = 3;

    /// An error occurred inside a worker process, outside of any test.
    pub const WORKER_ERROR: i32 = 4;

    /// No tests matched the given specifiers.
    pub const NO_TESTS_MATCHED: i32 = 5;
}
