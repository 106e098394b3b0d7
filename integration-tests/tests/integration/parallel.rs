// Copyright (c) The regrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runs with worker processes.

use crate::{TempProject, assert_exit_code};
use camino::Utf8Path;
use integration_tests::fixture::SLEEPING_PID_FILE;
use pretty_assertions::assert_eq;
use regrun_runner::exit_codes::RegrunExitCode;
use std::{
    thread,
    time::{Duration, Instant},
};

/// Waits for a sleeping fixture test to record its process ID.
fn wait_for_sleeper(dir: &Utf8Path) -> i32 {
    let path = dir.join(SLEEPING_PID_FILE);
    let deadline = Instant::now() + Duration::from_secs(30);
    loop {
        if let Ok(contents) = std::fs::read_to_string(&path)
            && let Ok(pid) = contents.trim().parse()
        {
            return pid;
        }
        assert!(Instant::now() < deadline, "no test started sleeping in {dir}");
        thread::sleep(Duration::from_millis(50));
    }
}

fn process_exists(pid: i32) -> bool {
    // SAFETY: signal 0 only checks whether the process exists.
    unsafe { libc::kill(pid, 0) == 0 }
}

fn assert_process_gone(pid: i32) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while process_exists(pid) {
        assert!(Instant::now() < deadline, "worker {pid} is still running");
        thread::sleep(Duration::from_millis(50));
    }
}

#[test]
fn parallel_matches_sequential() {
    let p = TempProject::new();
    let output = p.run(&["-n", "2", "t.py", "skips"]);

    assert_exit_code(&output, RegrunExitCode::TEST_RUN_FAILED);
    // Files finish in any order, so only compare the sorted lines.
    let mut lines = output.progress_lines();
    lines.sort();
    assert_eq!(
        lines,
        [
            "skips::C::test_gpu ... skipped 'needs gpu'",
            "t::C::test_a ... ok",
            "t::C::test_b ... FAIL",
        ]
    );
    let stdout = output.stdout_as_str();
    assert!(stdout.contains("AssertionError: assert False"), "{output}");
    assert!(
        stdout.contains("Ran 3 tests\n\nFAILED (failures=1, skipped=1)"),
        "{output}"
    );
}

#[test]
fn crash_during_test() {
    let p = TempProject::new();
    let output = p.run(&["-n", "1", "crash"]);

    assert_exit_code(&output, RegrunExitCode::TEST_RUN_FAILED);
    assert_eq!(
        output.progress_lines(),
        [
            "crash::C::test_x ... ok",
            "crash::C::test_crash ... ERROR",
            "crash::C::test_z ... ok",
        ]
    );
    let stdout = output.stdout_as_str();
    assert!(stdout.contains("ERROR: crash::C::test_crash"), "{output}");
    assert!(
        stdout.contains("Test process killed by signal SIGABRT"),
        "{output}"
    );
    assert!(stdout.contains("about to crash"), "output is attributed: {output}");
    assert!(stdout.contains("FAILED (errors=1)"), "{output}");
    assert!(
        !stdout.contains("Internal error"),
        "a crash inside a test is not an internal error: {output}"
    );
}

#[test]
fn captured_output_attribution() {
    let p = TempProject::new();
    let report = p.path().join("report.json");
    let output = p.run(&["-n", "1", "--json-report", report.as_str(), "output"]);

    assert_exit_code(&output, RegrunExitCode::TEST_RUN_FAILED);
    assert_eq!(
        output.progress_lines(),
        [
            "output::C::test_before ... ok",
            "output::C::test_hello ... FAIL",
            "output::C::test_after ... ok",
        ]
    );
    let stdout = output.stdout_as_str();
    assert_eq!(
        stdout.matches("HELLO").count(),
        1,
        "worker output only shows up in the failure report: {output}"
    );
    let (_, failure) = stdout
        .split_once("FAIL: output::C::test_hello\n")
        .unwrap_or_else(|| panic!("failure is reported:\n\n{output}"));
    let (_, captured) = failure
        .split_once("captured output")
        .unwrap_or_else(|| panic!("output is shown:\n\n{output}"));
    assert!(captured.contains("\nHELLO\n"), "{output}");
}

#[test]
fn exit_during_test() {
    let p = TempProject::new();
    let output = p.run(&["-n", "1", "exits"]);

    assert_exit_code(&output, RegrunExitCode::TEST_RUN_FAILED);
    assert_eq!(
        output.progress_lines(),
        [
            "exits::C::test_exit ... ERROR",
            "exits::C::test_after ... ok",
        ]
    );
    assert!(
        output
            .stdout_as_str()
            .contains("Test process exited with code 3"),
        "{output}"
    );
}

#[test]
fn crash_before_any_test() {
    let p = TempProject::new();
    p.write_config("[runner]\nmax-startup-retries = 1\n");
    let output = p.run(&["-n", "1", "startup_crash"]);

    assert_exit_code(&output, RegrunExitCode::TEST_RUN_FAILED);
    assert_eq!(
        output.progress_lines(),
        ["startup_crash::C::test_never ... not executed"]
    );
    let stdout = output.stdout_as_str();
    assert!(
        stdout.contains("Internal error, test worker crashed outside of tests:\nTest process killed by signal SIGABRT"),
        "{output}"
    );
    assert_eq!(
        stdout.matches("Internal error").count(),
        1,
        "the crash is reported once, after retries: {output}"
    );
}

#[test]
fn failfast_in_worker() {
    let p = TempProject::new();
    let output = p.run(&["-n", "1", "--failfast", "mixed"]);

    assert_exit_code(&output, RegrunExitCode::TEST_RUN_FAILED);
    assert_eq!(
        output.progress_lines(),
        [
            "mixed::C::test_known_bug ... expected failure",
            "mixed::C::test_fixed_bug ... unexpected success",
            "mixed::C::test_error ... not executed",
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
fn collection_error_in_parallel_run() {
    let p = TempProject::new();
    let output = p.run(&["-n", "2", "nope", "skips"]);

    assert_exit_code(&output, RegrunExitCode::TEST_RUN_FAILED);
    assert_eq!(
        output.progress_lines(),
        [
            "nope ... ERROR",
            "skips::C::test_gpu ... skipped 'needs gpu'",
        ]
    );
}

#[test]
fn interrupt_during_parallel_run() {
    let p = TempProject::new();
    let handle = p
        .cli()
        .args(["-n", "1", "slow"])
        .start()
        .expect("runner started");
    let worker = wait_for_sleeper(p.path());
    // Let the runner print the result that came before the sleeping test.
    thread::sleep(Duration::from_millis(500));
    let runner = handle
        .pid()
        .and_then(|pid| i32::try_from(pid).ok())
        .expect("runner has a pid");
    // SAFETY: kill has no memory-safety preconditions.
    assert_eq!(unsafe { libc::kill(runner, libc::SIGINT) }, 0, "SIGINT sent");

    let started = Instant::now();
    let output = handle.wait().expect("runner exited");
    assert!(
        started.elapsed() < Duration::from_secs(30),
        "runner didn't wait for the sleeping test: {output}"
    );
    assert_exit_code(&output, RegrunExitCode::TEST_RUN_FAILED);
    assert_eq!(output.progress_lines(), ["slow::C::test_fast ... ok"]);
    let stdout = output.stdout_as_str();
    assert!(
        !stdout.contains("test_sleep"),
        "the in-flight test is not reported: {output}"
    );
    assert!(stdout.ends_with("Interrupted!\n"), "{output}");
    assert_process_gone(worker);
}

#[test]
fn failfast_stops_other_workers() {
    let p = TempProject::new();
    let started = Instant::now();
    let output = p.run(&["-n", "2", "--failfast", "t", "slow"]);
    assert!(
        started.elapsed() < Duration::from_secs(30),
        "the sleeping test was cut short: {output}"
    );

    assert_exit_code(&output, RegrunExitCode::TEST_RUN_FAILED);
    let lines = output.progress_lines();
    for expected in [
        "t::C::test_a ... ok",
        "t::C::test_b ... FAIL",
        "slow::C::test_sleep ... not executed",
    ] {
        assert!(lines.iter().any(|line| line == expected), "{expected:?} missing: {output}");
    }
    // The fast test in the other file may or may not have run before the failure.
    assert!(
        lines.iter().any(|line| line == "slow::C::test_fast ... ok"
            || line == "slow::C::test_fast ... not executed"),
        "{output}"
    );
    assert_eq!(lines.len(), 4, "{output}");
    assert!(
        output
            .stdout_as_str()
            .contains("WARNING: Did not execute all tests because 'failfast' mode is on"),
        "{output}"
    );
    if let Ok(contents) = std::fs::read_to_string(p.path().join(SLEEPING_PID_FILE)) {
        let worker = contents.trim().parse().expect("pid file holds a pid");
        assert_process_gone(worker);
    }
}
