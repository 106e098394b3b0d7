// Copyright (c) The regrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The parallel runner: one worker process per test file.
//!
//! Each file is handled by a task on a rayon thread pool. A task spawns a worker, sends it the
//! plan, and turns the events the worker streams back into [`TestResult`]s, attributing output
//! to tests by slicing the shared capture file between the offsets carried by the events.
//!
//! If the worker dies while a test is in flight, that test is reported as an `ERROR` and the
//! tests that never started are handed to a fresh worker.

use super::{
    ShutdownHandle,
    unix::{exit_message, spawn_worker, terminate},
};
use crate::{
    TestResult, TestSpecifier, TestStatus,
    collect::Collection,
    config::RunnerConfig,
    errors::RunError,
    helpers::read_capture,
    protocol::{Connection, Event},
    reporter::TestReporter,
};
use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::NamedUtf8TempFile;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::{
    fs::File,
    io::Write,
    process::{Child, ExitStatus},
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};
use tracing::{debug, warn};

/// How long to keep reading events once the worker has exited.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// The command used to start worker processes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WorkerCommand {
    program: Utf8PathBuf,
    args: Vec<String>,
}

impl WorkerCommand {
    /// Creates a new worker command. `args` are passed before `--pipe-fd`.
    pub fn new(program: impl Into<Utf8PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Builds the command from the runner configuration, defaulting to the current executable.
    pub fn from_config(config: &RunnerConfig) -> Result<Self, RunError> {
        let program = match &config.runtime {
            Some(runtime) => runtime.clone(),
            None => {
                let exe = std::env::current_exe().map_err(RunError::CurrentExe)?;
                Utf8PathBuf::try_from(exe).map_err(|err| RunError::CurrentExe(err.into_io_error()))?
            }
        };
        Ok(Self::new(program, config.runtime_args.clone()))
    }

    /// The program to run.
    pub fn program(&self) -> &Utf8Path {
        &self.program
    }

    /// Arguments passed before `--pipe-fd`.
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// Runs each test file in its own worker process, several files at a time.
#[derive(Clone, Debug)]
pub struct ParallelRunner {
    num_processes: usize,
    command: WorkerCommand,
    failfast: bool,
    grace_period: Duration,
    poll_interval: Duration,
    max_startup_retries: usize,
    shutdown: ShutdownHandle,
}

impl ParallelRunner {
    /// Creates a new runner with at most `num_processes` workers alive at once.
    pub fn new(
        num_processes: usize,
        command: WorkerCommand,
        config: &RunnerConfig,
        failfast: bool,
        shutdown: ShutdownHandle,
    ) -> Self {
        Self {
            num_processes,
            command,
            failfast,
            grace_period: config.grace_period,
            poll_interval: config.poll_interval,
            max_startup_retries: config.max_startup_retries,
            shutdown,
        }
    }

    /// Runs already-collected tests in worker processes.
    pub fn execute<W: Write + Send>(
        &self,
        collection: &Collection,
        reporter: &mut TestReporter<W>,
    ) -> Result<(), RunError> {
        for error in &collection.errors {
            reporter
                .report_collection_error(error.clone())
                .map_err(RunError::ReportWrite)?;
        }
        if collection.files.is_empty() {
            return Ok(());
        }

        // Loaded trees stay on this thread: tasks only need each file's name and test list.
        let jobs: Vec<(&str, &[TestSpecifier])> = collection
            .files
            .iter()
            .map(|file| (file.module.as_str(), file.tests.as_slice()))
            .collect();
        let num_threads = self.num_processes.clamp(1, jobs.len());
        debug!(num_threads, files = jobs.len(), "starting parallel run");

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|index| format!("regrun-task-{index}"))
            .build()
            .map_err(RunError::PoolBuild)?;

        let first_error = {
            let shared = Shared::new(&mut *reporter);
            pool.scope(|scope| {
                for &(file, tests) in &jobs {
                    let shared = &shared;
                    scope.spawn(move |_| {
                        if let Err(error) = self.run_file(file, tests, shared) {
                            shared.record_error(error);
                        }
                    });
                }
            });
            shared
                .first_error
                .into_inner()
                .unwrap_or_else(PoisonError::into_inner)
        };
        if let Some(error) = first_error {
            return Err(error);
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

    fn is_canceled(&self, shared: &Shared<'_, impl Write>) -> bool {
        self.shutdown.is_shutdown()
            || shared.failfast_stop.load(Ordering::Acquire)
            || shared.aborted.load(Ordering::Acquire)
    }

    /// Runs one file to completion, restarting workers as needed.
    fn run_file<W: Write>(
        &self,
        file: &str,
        tests: &[TestSpecifier],
        shared: &Shared<'_, W>,
    ) -> Result<(), RunError> {
        let capture = camino_tempfile::Builder::new()
            .prefix("regrun-")
            .suffix(".out")
            .tempfile()
            .map_err(|error| RunError::CaptureFile {
                file: file.to_owned(),
                error,
            })?;

        let mut plan = tests.to_vec();
        let mut startup_failures = 0;
        while !plan.is_empty() {
            if self.is_canceled(shared) {
                return Ok(());
            }
            let outcome = self.run_attempt(file, &plan, &capture, shared)?;
            let Some(outcome) = outcome else {
                // Canceled.
                return Ok(());
            };
            let message = exit_message(outcome.status);

            if let Some(test) = outcome.in_flight {
                debug!(%file, %test, %message, "worker crashed during test");
                let output = read_capture(capture.as_file(), outcome.in_flight_start, None);
                shared.with_reporter(|reporter| {
                    reporter.report_result(
                        TestResult::new(test, TestStatus::Error)
                            .with_param(message)
                            .with_output(output),
                    )
                })?;
                if self.failfast {
                    shared.failfast_stop.store(true, Ordering::Release);
                }
                plan = outcome.remaining;
                startup_failures = 0;
            } else if outcome.status.success() {
                // Anything the worker didn't get to (failfast in the worker) was not executed.
                shared.with_reporter(|reporter| reporter.report_unexecuted(&outcome.remaining))?;
                return Ok(());
            } else if outcome.remaining.is_empty() {
                let output = read_capture(capture.as_file(), outcome.attempt_start, None);
                shared.record_crash(message, output);
                return Ok(());
            } else if outcome.progressed {
                debug!(%file, %message, remaining = outcome.remaining.len(), "worker crashed between tests, restarting");
                plan = outcome.remaining;
                startup_failures = 0;
            } else {
                startup_failures += 1;
                if startup_failures > self.max_startup_retries {
                    warn!(%file, %message, "worker keeps crashing before running any test, giving up");
                    let output = read_capture(capture.as_file(), outcome.attempt_start, None);
                    shared.record_crash(message, output);
                    shared.with_reporter(|reporter| reporter.report_unexecuted(&plan))?;
                    return Ok(());
                }
                debug!(%file, %message, attempt = startup_failures, "worker crashed before running any test, retrying");
            }
        }
        Ok(())
    }

    /// Runs a single worker over `plan`. Returns `None` if the run was canceled.
    fn run_attempt<W: Write>(
        &self,
        file: &str,
        plan: &[TestSpecifier],
        capture: &NamedUtf8TempFile,
        shared: &Shared<'_, W>,
    ) -> Result<Option<AttemptOutcome>, RunError> {
        let attempt_start = capture
            .as_file()
            .metadata()
            .map(|metadata| i64::try_from(metadata.len()).unwrap_or(i64::MAX))
            .unwrap_or(0);

        let pipe_error = |error| RunError::PipeSetup {
            file: file.to_owned(),
            error,
        };
        let (mut conn, child_end) = Connection::pair().map_err(pipe_error)?;
        let reader = conn.try_clone().map_err(pipe_error)?;
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let reader_thread = thread::Builder::new()
            .name(format!("regrun-events-{file}"))
            .spawn(move || {
                let mut reader = reader;
                while let Ok(event) = reader.recv::<Event>() {
                    if event_tx.send(event).is_err() {
                        break;
                    }
                }
            })
            .map_err(pipe_error)?;

        let spawned = spawn_worker(&self.command, &child_end, capture.as_file(), self.failfast);
        // The worker holds its own copy; closing ours lets EOF mark its exit.
        drop(child_end);
        let mut child = match spawned {
            Ok(child) => child,
            Err(error) => {
                let _ = conn.shutdown();
                let _ = reader_thread.join();
                return Err(RunError::WorkerSpawn {
                    runtime: self.command.program().to_owned(),
                    file: file.to_owned(),
                    error,
                });
            }
        };

        let plan_strings: Vec<String> = plan.iter().map(|test| test.to_string()).collect();
        if let Err(error) = conn.send(&plan_strings) {
            // The worker died before reading its plan; the exit status tells the story.
            debug!(%file, %error, "failed to send plan to worker");
        }

        let mut state = EventState::new(plan, attempt_start);
        let watched = self.watch(file, &mut child, &event_rx, capture.as_file(), &mut state, shared);
        if watched.is_err() {
            let _ = terminate(&mut child, self.grace_period);
        }

        let _ = conn.shutdown();
        let _ = reader_thread.join();
        let Some(status) = watched? else {
            return Ok(None);
        };
        // Events can still be queued if the drain deadline was hit.
        while let Ok(event) = event_rx.try_recv() {
            state.handle(file, event, capture.as_file(), self.failfast, shared)?;
        }

        Ok(Some(state.into_outcome(status)))
    }

    /// Processes events until the worker has exited and its pipe is drained.
    ///
    /// Returns the worker's exit status, or `None` if the run was canceled and the worker
    /// terminated.
    fn watch<W: Write>(
        &self,
        file: &str,
        child: &mut Child,
        event_rx: &Receiver<Event>,
        capture: &File,
        state: &mut EventState,
        shared: &Shared<'_, W>,
    ) -> Result<Option<ExitStatus>, RunError> {
        let wait_error = |error| RunError::WorkerWait {
            file: file.to_owned(),
            error,
        };
        let mut status = None;
        let mut drain_deadline = None;
        loop {
            match event_rx.recv_timeout(self.poll_interval) {
                Ok(event) => state.handle(file, event, capture, self.failfast, shared)?,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            if self.is_canceled(shared) {
                debug!(%file, "run canceled, terminating worker");
                terminate(child, self.grace_period).map_err(wait_error)?;
                return Ok(None);
            }

            if status.is_none()
                && let Some(exit) = child.try_wait().map_err(wait_error)?
            {
                status = Some(exit);
                drain_deadline = Some(Instant::now() + DRAIN_TIMEOUT);
            }
            if drain_deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                debug!(%file, "worker exited but its pipe is still open, stopping drain");
                break;
            }
        }

        // The pipe closed; wait for the worker itself to go away.
        loop {
            if let Some(status) = status {
                return Ok(Some(status));
            }
            if self.is_canceled(shared) {
                terminate(child, self.grace_period).map_err(wait_error)?;
                return Ok(None);
            }
            status = child.try_wait().map_err(wait_error)?;
            if status.is_none() {
                thread::sleep(self.poll_interval);
            }
        }
    }
}

/// State shared between all tasks of a parallel run.
struct Shared<'a, W> {
    reporter: Mutex<&'a mut TestReporter<W>>,
    failfast_stop: AtomicBool,
    /// Set once any task fails with a [`RunError`]; the other tasks stop their workers.
    aborted: AtomicBool,
    first_error: Mutex<Option<RunError>>,
}

impl<'a, W: Write> Shared<'a, W> {
    fn new(reporter: &'a mut TestReporter<W>) -> Self {
        Self {
            reporter: Mutex::new(reporter),
            failfast_stop: AtomicBool::new(false),
            aborted: AtomicBool::new(false),
            first_error: Mutex::new(None),
        }
    }

    fn with_reporter<T>(
        &self,
        f: impl FnOnce(&mut TestReporter<W>) -> std::io::Result<T>,
    ) -> Result<T, RunError> {
        let mut reporter = self.reporter.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut reporter).map_err(RunError::ReportWrite)
    }

    fn record_crash(&self, message: String, output: String) {
        let mut reporter = self.reporter.lock().unwrap_or_else(PoisonError::into_inner);
        let mut crash = message;
        if !output.is_empty() {
            crash.push('\n');
            crash.push_str(&output);
        }
        reporter.report_crash(crash);
    }

    fn record_error(&self, error: RunError) {
        warn!(%error, "parallel task failed, stopping the run");
        self.first_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert(error);
        self.aborted.store(true, Ordering::Release);
    }
}

/// What happened during a single worker attempt.
#[derive(Debug)]
struct AttemptOutcome {
    status: ExitStatus,
    /// The test that started but never produced a result.
    in_flight: Option<TestSpecifier>,
    /// Where the in-flight test's output starts.
    in_flight_start: i64,
    /// Tests in the plan that never started, in plan order.
    remaining: Vec<TestSpecifier>,
    /// Whether any test started or finished.
    progressed: bool,
    /// Where this attempt's output starts.
    attempt_start: i64,
}

/// Tracks a worker's progress through its plan.
///
/// Stop events are only logged: no output is attributed to a test after its result, so the
/// offset a stop event carries never changes what gets reported.
#[derive(Debug)]
struct EventState {
    remaining: Vec<TestSpecifier>,
    in_flight: Option<TestSpecifier>,
    out_start: i64,
    progressed: bool,
    attempt_start: i64,
}

impl EventState {
    fn new(plan: &[TestSpecifier], attempt_start: i64) -> Self {
        Self {
            remaining: plan.to_vec(),
            in_flight: None,
            out_start: attempt_start,
            progressed: false,
            attempt_start,
        }
    }

    fn take_remaining(&mut self, test: &TestSpecifier) -> bool {
        match self.remaining.iter().position(|t| t == test) {
            Some(index) => {
                self.remaining.remove(index);
                true
            }
            None => false,
        }
    }

    fn handle<W: Write>(
        &mut self,
        file: &str,
        event: Event,
        capture: &File,
        failfast: bool,
        shared: &Shared<'_, W>,
    ) -> Result<(), RunError> {
        match event {
            Event::TestStarted { test, out_pos } => {
                if !self.take_remaining(&test) {
                    warn!(%file, %test, "worker started a test that isn't in its plan, ignoring");
                    return Ok(());
                }
                shared.with_reporter(|reporter| reporter.report_start(&test))?;
                self.in_flight = Some(test);
                self.out_start = out_pos;
                self.progressed = true;
            }
            Event::TestResult {
                test,
                out_pos,
                status,
                param,
                duration,
            } => {
                let known = self.in_flight.as_ref() == Some(&test) || self.take_remaining(&test);
                if !known {
                    warn!(%file, %test, "worker reported a result for a test that isn't in its plan, ignoring");
                    return Ok(());
                }
                let output = read_capture(capture, self.out_start, Some(out_pos));
                self.in_flight = None;
                self.out_start = out_pos;
                self.progressed = true;

                let mut result = TestResult::new(test, status)
                    .with_output(output)
                    .with_duration(Duration::try_from_secs_f64(duration).unwrap_or_default());
                result.param = param;
                shared.with_reporter(|reporter| reporter.report_result(result))?;
                if failfast && status.is_failing() {
                    shared.failfast_stop.store(true, Ordering::Release);
                }
            }
            Event::TestStopped { test, out_pos } => {
                debug!(%file, %test, out_pos, "test stopped");
            }
        }
        Ok(())
    }

    fn into_outcome(self, status: ExitStatus) -> AttemptOutcome {
        AttemptOutcome {
            status,
            in_flight: self.in_flight,
            in_flight_start: self.out_start,
            remaining: self.remaining,
            progressed: self.progressed,
            attempt_start: self.attempt_start,
        }
    }
}
