// Copyright (c) The regrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests
//!
//! These run the `regrun-fixture` binary, which is regrun wired up to the fixture framework in
//! `integration_tests::fixture`. For parallel runs the binary also serves as the worker runtime.

use camino::Utf8Path;
use camino_tempfile::Utf8TempDir;
use integration_tests::regrun_cli::{RegrunCli, RegrunOutput};
use pretty_assertions::assert_eq;
use regrun_runner::exit_codes::RegrunExitCode;

mod parallel;

/// A scratch directory that regrun runs in.
struct TempProject {
    dir: Utf8TempDir,
}

impl TempProject {
    fn new() -> Self {
        let dir = camino_tempfile::Builder::new()
            .prefix("regrun-integration-")
            .tempdir()
            .expect("temp dir created");
        // Path specifiers only resolve to module names for files that exist.
        std::fs::write(dir.path().join("t.py"), "").expect("t.py written");
        Self { dir }
    }

    fn path(&self) -> &Utf8Path {
        self.dir.path()
    }

    fn write_config(&self, contents: &str) {
        std::fs::write(self.path().join("regrun.toml"), contents).expect("config written");
    }

    fn cli(&self) -> RegrunCli {
        let mut cli = RegrunCli::new(env!("CARGO_BIN_EXE_regrun-fixture"));
        cli.dir(self.path());
        cli
    }

    fn run(&self, args: &[&str]) -> RegrunOutput {
        self.cli().args(args.iter().copied()).unchecked(true).output()
    }
}

fn assert_exit_code(output: &RegrunOutput, expected: i32) {
    assert_eq!(output.exit_code(), Some(expected), "unexpected exit code:\n\n{output}");
}

#[test]
fn sequential_pass_and_fail() {
    let p = TempProject::new();
    let output = p.run(&["t.py"]);

    assert_exit_code(&output, RegrunExitCode::TEST_RUN_FAILED);
    assert_eq!(
        output.progress_lines(),
        ["t::C::test_a ... ok", "t::C::test_b ... FAIL"]
    );
    let stdout = output.stdout_as_str();
    assert!(stdout.contains("FAIL: t::C::test_b"), "{output}");
    assert!(stdout.contains("File \"t.py\", line 12, in test_b"), "{output}");
    assert!(stdout.contains("AssertionError: assert False"), "{output}");
    assert!(
        !stdout.contains("unittest/case.py"),
        "framework frames are hidden: {output}"
    );
    assert!(
        stdout.contains("Ran 2 tests\n\nFAILED (failures=1)"),
        "{output}"
    );
}

#[test]
fn selective_run() {
    let p = TempProject::new();
    let output = p.run(&["t.py::C::test_a"]);

    assert_exit_code(&output, RegrunExitCode::OK);
    assert_eq!(output.progress_lines(), ["t::C::test_a ... ok"]);
    assert!(output.stdout_as_str().contains("Ran 1 tests\n\nOK"), "{output}");
}

#[test]
fn skip_reason() {
    let p = TempProject::new();
    let output = p.run(&["skips"]);

    assert_exit_code(&output, RegrunExitCode::OK);
    assert_eq!(
        output.progress_lines(),
        ["skips::C::test_gpu ... skipped 'needs gpu'"]
    );
    assert!(
        output.stdout_as_str().contains("Ran 1 tests\n\nOK (skipped=1)"),
        "{output}"
    );
}

#[test]
fn expected_failures_and_unexpected_successes() {
    let p = TempProject::new();
    let output = p.run(&["mixed"]);

    assert_exit_code(&output, RegrunExitCode::TEST_RUN_FAILED);
    assert_eq!(
        output.progress_lines(),
        [
            "mixed::C::test_known_bug ... expected failure",
            "mixed::C::test_fixed_bug ... unexpected success",
            "mixed::C::test_error ... ERROR",
        ]
    );
    let stdout = output.stdout_as_str();
    assert!(stdout.contains("UNEXPECTED SUCCESS: mixed::C::test_fixed_bug"), "{output}");
    assert!(stdout.contains("ValueError: bad value"), "{output}");
    assert!(
        stdout.contains(
            "FAILED (errors=1, expected failures=1, unexpected successes=1)"
        ),
        "{output}"
    );
}

#[test]
fn collection_error_is_reported_first() {
    let p = TempProject::new();
    let output = p.run(&["t", "nope"]);

    assert_exit_code(&output, RegrunExitCode::TEST_RUN_FAILED);
    assert_eq!(
        output.progress_lines(),
        [
            "nope ... ERROR",
            "t::C::test_a ... ok",
            "t::C::test_b ... FAIL",
        ]
    );
    let stdout = output.stdout_as_str();
    assert!(stdout.contains("ERROR: nope"), "{output}");
    assert!(
        stdout.contains("ModuleNotFoundError: No module named 'nope'"),
        "{output}"
    );
    assert!(stdout.contains("FAILED (failures=1, errors=1)"), "{output}");
}

#[test]
fn failfast_sequential() {
    let p = TempProject::new();
    let output = p.run(&["--failfast", "t", "skips"]);

    assert_exit_code(&output, RegrunExitCode::TEST_RUN_FAILED);
    assert_eq!(
        output.progress_lines(),
        [
            "t::C::test_a ... ok",
            "t::C::test_b ... FAIL",
            "skips::C::test_gpu ... not executed",
        ]
    );
    assert!(
        output
            .stdout_as_str()
            .contains("WARNING: Did not execute all tests because 'failfast' mode is on"),
        "{output}"
    );
}

#[test]
fn collect_only() {
    let p = TempProject::new();
    let output = p.run(&["--collect-only", "t.py", "skips"]);

    assert_exit_code(&output, RegrunExitCode::OK);
    assert_eq!(
        output.stdout_as_str(),
        "t::C::test_a\nt::C::test_b\nskips::C::test_gpu\n"
    );
}

#[test]
fn collect_only_with_load_failure() {
    let p = TempProject::new();
    let output = p.run(&["--collect-only", "t", "nope"]);

    assert_exit_code(&output, RegrunExitCode::TEST_RUN_FAILED);
    assert_eq!(output.stdout_as_str(), "t::C::test_a\nt::C::test_b\n");
    let stderr = output.stderr_as_str();
    assert!(stderr.contains("error: failed to collect nope"), "{output}");
    assert!(
        stderr.contains("ModuleNotFoundError: No module named 'nope'"),
        "{output}"
    );
}

#[test]
fn durations() {
    let p = TempProject::new();
    let output = p.run(&["--durations", "-1", "t"]);

    assert_exit_code(&output, RegrunExitCode::TEST_RUN_FAILED);
    let stdout = output.stdout_as_str();
    let (_, durations) = stdout
        .split_once("Slowest test durations:\n")
        .unwrap_or_else(|| panic!("durations are listed:\n\n{output}"));
    let listed: Vec<_> = durations
        .lines()
        .take_while(|line| line.starts_with("- "))
        .collect();
    assert_eq!(listed.len(), 2, "{output}");
}

#[test]
fn json_report() {
    let p = TempProject::new();
    let report = p.path().join("report.json");
    let output = p.run(&["--json-report", report.as_str(), "t", "skips"]);

    assert_exit_code(&output, RegrunExitCode::TEST_RUN_FAILED);
    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report).expect("report written"))
            .expect("report is JSON");
    let entries: Vec<_> = report
        .as_array()
        .expect("report is an array")
        .iter()
        .map(|entry| {
            (
                entry["name"].as_str().expect("name is a string").to_owned(),
                entry["status"].as_str().expect("status is a string").to_owned(),
            )
        })
        .collect();
    assert_eq!(
        entries,
        [
            ("t::C::test_a".to_owned(), "PASSED".to_owned()),
            ("t::C::test_b".to_owned(), "FAILED".to_owned()),
            ("skips::C::test_gpu".to_owned(), "IGNORED".to_owned()),
        ]
    );
}

#[test]
fn no_tests_matched() {
    let p = TempProject::new();
    let output = p.run(&["t::C::test_missing"]);

    assert_exit_code(&output, RegrunExitCode::NO_TESTS_MATCHED);
    assert!(
        output.stderr_as_str().contains("error: No tests matched"),
        "{output}"
    );
}

#[test]
fn invalid_specifier() {
    let p = TempProject::new();
    let output = p.run(&["t::::test_a"]);

    assert_exit_code(&output, RegrunExitCode::INVALID_ARGUMENTS);
    assert_eq!(output.stdout_as_str(), "");
}

#[test]
fn invalid_config() {
    let p = TempProject::new();
    p.write_config("[runner]\npoll-interval = \"soon\"\n");
    let output = p.run(&["t"]);

    assert_exit_code(&output, RegrunExitCode::SETUP_ERROR);
    assert!(
        output.stderr_as_str().contains("regrun.toml"),
        "error names the config file: {output}"
    );
}
