// Copyright (c) The regrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A test framework with a fixed set of modules, used by the `regrun-fixture` binary.
//!
//! Every module is a single class `C`. Some of its tests misbehave on purpose: they write to
//! stdout, abort the process or exit early, so that the parallel runner's crash handling can be
//! exercised end to end.

use regrun_runner::{
    framework::{ExcInfo, Frame, TestCase, TestFramework, TestNode},
    sink::ResultSink,
    worker::IN_PROCESS_ENV,
};
use std::{io::Write, time::Duration};

/// What a fixture test does when it runs.
#[derive(Copy, Clone, Debug)]
pub enum Action {
    Pass,
    Fail,
    Error,
    Skip(&'static str),
    ExpectedFailure,
    UnexpectedSuccess,
    /// Writes to stdout, then fails.
    PrintAndFail(&'static str),
    /// Writes to stderr, then aborts the process.
    Abort,
    /// Exits the process with the given code.
    Exit(i32),
    /// Writes the process ID to [`SLEEPING_PID_FILE`] in the working directory, then sleeps for a
    /// minute and passes.
    Sleep,
}

/// Where [`Action::Sleep`] records the ID of the sleeping process.
pub const SLEEPING_PID_FILE: &str = "regrun-sleeping.pid";

/// The modules the fixture knows about, with the methods of their class `C`.
pub static MODULES: &[(&str, &[(&str, Action)])] = &[
    ("t", &[("test_a", Action::Pass), ("test_b", Action::Fail)]),
    ("skips", &[("test_gpu", Action::Skip("needs gpu"))]),
    (
        "crash",
        &[
            ("test_x", Action::Pass),
            ("test_crash", Action::Abort),
            ("test_z", Action::Pass),
        ],
    ),
    (
        "output",
        &[
            ("test_before", Action::Pass),
            ("test_hello", Action::PrintAndFail("HELLO\n")),
            ("test_after", Action::Pass),
        ],
    ),
    ("exits", &[("test_exit", Action::Exit(3)), ("test_after", Action::Pass)]),
    (
        "mixed",
        &[
            ("test_known_bug", Action::ExpectedFailure),
            ("test_fixed_bug", Action::UnexpectedSuccess),
            ("test_error", Action::Error),
        ],
    ),
    ("startup_crash", &[("test_never", Action::Pass)]),
    ("slow", &[("test_fast", Action::Pass), ("test_sleep", Action::Sleep)]),
];

/// The [`TestFramework`] behind the `regrun-fixture` binary.
#[derive(Copy, Clone, Debug, Default)]
pub struct FixtureFramework;

impl TestFramework for FixtureFramework {
    fn load(&self, module: &str) -> Result<TestNode, ExcInfo> {
        let Some((_, methods)) = MODULES.iter().find(|(name, _)| *name == module) else {
            return Err(
                ExcInfo::new("ModuleNotFoundError", format!("No module named '{module}'"))
                    .with_frame(Frame::new("unittest/loader.py", 154, "loadTestsFromName"))
                    .with_frame(Frame::new(format!("{module}.py"), 1, "<module>")),
            );
        };
        if module == "startup_crash" && std::env::var_os(IN_PROCESS_ENV).is_some() {
            // Only workers crash: the runner itself needs to collect the module.
            std::process::abort();
        }

        let cases = methods
            .iter()
            .map(|&(method, action)| {
                TestNode::case(FixtureCase {
                    file: format!("{module}.py"),
                    method,
                    action,
                })
            })
            .collect();
        Ok(TestNode::suite(module, vec![TestNode::suite("C", cases)]))
    }

    fn is_internal_frame(&self, frame: &Frame) -> bool {
        frame.file.starts_with("unittest/")
    }
}

struct FixtureCase {
    file: String,
    method: &'static str,
    action: Action,
}

impl FixtureCase {
    fn exception(&self, type_name: &str, message: &str) -> ExcInfo {
        ExcInfo::new(type_name, message)
            .with_frame(Frame::new("unittest/case.py", 58, "testPartExecutor"))
            .with_frame(Frame::new(self.file.as_str(), 12, self.method))
    }
}

impl TestCase for FixtureCase {
    fn class_name(&self) -> &str {
        "C"
    }

    fn method_name(&self) -> Option<&str> {
        Some(self.method)
    }

    fn run(&self, sink: &mut dyn ResultSink) {
        sink.start_test(self);
        match self.action {
            Action::Pass => sink.add_success(self),
            Action::Fail => sink.add_failure(self, &self.exception("AssertionError", "assert False")),
            Action::Error => sink.add_error(self, &self.exception("ValueError", "bad value")),
            Action::Skip(reason) => sink.add_skip(self, reason),
            Action::ExpectedFailure => {
                sink.add_expected_failure(self, &self.exception("AssertionError", "known bug"))
            }
            Action::UnexpectedSuccess => sink.add_unexpected_success(self),
            Action::PrintAndFail(text) => {
                let mut stdout = std::io::stdout().lock();
                // A failed write shows up as missing output in the test that checks for it.
                let _ = stdout.write_all(text.as_bytes()).and_then(|()| stdout.flush());
                drop(stdout);
                sink.add_failure(self, &self.exception("AssertionError", "printed"));
            }
            Action::Abort => {
                eprintln!("about to crash");
                std::process::abort();
            }
            Action::Exit(code) => std::process::exit(code),
            Action::Sleep => {
                // Tests waiting on the file time out if it never shows up.
                let _ = std::fs::write(SLEEPING_PID_FILE, std::process::id().to_string());
                std::thread::sleep(Duration::from_secs(60));
                sink.add_success(self);
            }
        }
        sink.stop_test(self);
    }
}
