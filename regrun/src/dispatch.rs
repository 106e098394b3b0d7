// Copyright (c) The regrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    ExpectedError,
    errors::Result,
    output::{NO_HEADING_TARGET, OutputContext, OutputOpts, clap_styles},
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use regrun_runner::{
    TestSpecifier,
    collect::{Collection, Collector},
    config::RegrunConfig,
    errors::RunError,
    exit_codes::RegrunExitCode,
    framework::TestFramework,
    reporter::{ReporterOpts, SlowestDurations, TestReporter},
    runner::{ParallelRunner, SequentialRunner, ShutdownHandle, WorkerCommand},
    signal::SignalHandlerKind,
    worker::{IN_PROCESS_ENV, run_worker},
};
use std::{
    io::{self, IsTerminal, Write},
    num::NonZeroUsize,
    os::fd::RawFd,
};
use tracing::{debug, error, info};

/// Runs regrun with `framework` providing the tests, and returns the process exit code.
///
/// This is the entry point for the runtime under test. If `IN_PROCESS=1` is set, the process is a
/// worker spawned by a parallel run; otherwise it is the command-line runner.
pub fn main_with(framework: &dyn TestFramework) -> i32 {
    if is_worker() {
        return WorkerApp::parse().exec(framework);
    }

    let app = RegrunApp::parse();
    let output = app.output.init();
    match app.exec(framework, output) {
        Ok(code) => code,
        Err(error) => {
            error.display_to_stderr();
            error.process_exit_code()
        }
    }
}

fn is_worker() -> bool {
    std::env::var_os(IN_PROCESS_ENV).is_some_and(|value| value == "1")
}

/// Runs a language runtime's regression tests, in parallel worker processes if requested.
#[derive(Debug, Parser)]
#[command(version, about, styles = clap_styles::style())]
pub struct RegrunApp {
    /// Tests to run: `path/to/file.py[::Class[::method]]` or `dotted.module[::Class[::method]]`
    #[arg(value_name = "SPEC", required = true)]
    specs: Vec<String>,

    /// Run tests in N worker processes, one test file per worker
    #[arg(long, short = 'n', value_name = "N")]
    num_processes: Option<NonZeroUsize>,

    /// Stop after the first failing test
    #[arg(long, short)]
    failfast: bool,

    /// Show the N slowest tests (-1 for all)
    #[arg(long, value_name = "N", allow_negative_numbers = true)]
    durations: Option<i64>,

    /// Print the collected tests without running them
    #[arg(long)]
    collect_only: bool,

    /// Write a JSON report of all results to PATH
    #[arg(long, value_name = "PATH")]
    json_report: Option<Utf8PathBuf>,

    #[command(flatten)]
    config_opts: ConfigOpts,

    #[command(flatten)]
    output: OutputOpts,
}

#[derive(Debug, clap::Args)]
struct ConfigOpts {
    /// Config file [default: ./regrun.toml]
    #[arg(long, value_name = "PATH")]
    config_file: Option<Utf8PathBuf>,

    /// Directory that test file paths are relative to
    #[arg(long, value_name = "DIR")]
    rootdir: Option<Utf8PathBuf>,

    /// Executable used to start workers [default: the current executable]
    #[arg(long, value_name = "PATH")]
    runtime: Option<Utf8PathBuf>,

    /// Argument passed to the runtime before the worker arguments (may be repeated)
    #[arg(long, value_name = "ARG", allow_hyphen_values = true)]
    runtime_args: Vec<String>,
}

impl ConfigOpts {
    fn make_config(&self, cwd: &Utf8Path) -> Result<RegrunConfig> {
        let mut config = RegrunConfig::from_sources(cwd, self.config_file.as_deref())?;
        if let Some(rootdir) = &self.rootdir {
            config.runner.rootdir = rootdir.clone();
        }
        if let Some(runtime) = &self.runtime {
            config.runner.runtime = Some(runtime.clone());
        }
        if !self.runtime_args.is_empty() {
            config.runner.runtime_args = self.runtime_args.clone();
        }
        Ok(config)
    }
}

impl RegrunApp {
    /// Executes the app, returning the exit code of the test run.
    fn exec(self, framework: &dyn TestFramework, output: OutputContext) -> Result<i32> {
        let cwd = std::env::current_dir()
            .map_err(|err| ExpectedError::CurrentDirFailed { err })?;
        let cwd = Utf8PathBuf::try_from(cwd)
            .map_err(|err| ExpectedError::CurrentDirInvalidUtf8 { err })?;
        let config = self.config_opts.make_config(&cwd)?;

        let specifiers = self
            .specs
            .iter()
            .map(|spec| TestSpecifier::from_string(spec))
            .collect::<Result<Vec<_>, _>>()?;
        let collector = Collector::new(framework, &config.runner.rootdir)?;
        let collection = collector.collect(&specifiers);
        if collection.is_empty() {
            return Err(ExpectedError::NoTestsMatched);
        }
        if output.verbose {
            info!(
                "collected {} tests from {} files",
                collection.test_count(),
                collection.files.len()
            );
        }

        if self.collect_only {
            return write_test_list(&collection, &mut io::stdout().lock());
        }

        let shutdown = ShutdownHandle::new();
        let _signal_handler = SignalHandlerKind::Standard.install(shutdown.clone())?;

        let stdout = io::stdout();
        let opts = ReporterOpts {
            failfast: self.failfast,
            durations: self
                .durations
                .map_or(SlowestDurations::Off, SlowestDurations::from_count),
            incomplete_lines: stdout.is_terminal(),
        };
        let mut reporter = TestReporter::new(stdout, opts);
        if output.color.should_colorize(supports_color::Stream::Stdout) {
            reporter.colorize();
        }

        match self.num_processes {
            Some(num_processes) => {
                let command = WorkerCommand::from_config(&config.runner)?;
                debug!(runtime = %command.program(), "using parallel runner");
                ParallelRunner::new(
                    num_processes.get(),
                    command,
                    &config.runner,
                    self.failfast,
                    shutdown.clone(),
                )
                .execute(&collection, &mut reporter)?;
            }
            None => {
                SequentialRunner::new(framework, self.failfast, shutdown.clone())
                    .execute(&collection, &mut reporter)?;
            }
        }

        let stats = reporter
            .write_summary(shutdown.is_shutdown())
            .map_err(|err| ExpectedError::RunError {
                err: RunError::ReportWrite(err),
            })?;
        if let Some(path) = &self.json_report {
            reporter.write_json_report(path)?;
        }
        Ok(stats.exit_code())
    }
}

/// Prints every collected test, and reports files that failed to load.
fn write_test_list(collection: &Collection, writer: &mut impl Write) -> Result<i32> {
    let mut write = || -> io::Result<()> {
        for test in collection.iter_tests() {
            writeln!(writer, "{test}")?;
        }
        writer.flush()
    };
    write().map_err(|err| ExpectedError::WriteTestListError { err })?;

    for error in &collection.errors {
        error!("failed to collect {}", error.test_id);
        if let Some(param) = &error.param {
            error!(target: NO_HEADING_TARGET, "{}", param.trim_end());
        }
    }
    if collection.errors.is_empty() {
        Ok(RegrunExitCode::OK)
    } else {
        Ok(RegrunExitCode::TEST_RUN_FAILED)
    }
}

/// Arguments of a worker process.
#[derive(Debug, Parser)]
#[command(name = "regrun-worker")]
struct WorkerApp {
    /// File descriptor of the inherited event pipe
    #[arg(long, value_name = "FD")]
    pipe_fd: RawFd,

    /// Stop after the first failing test
    #[arg(long)]
    failfast: bool,
}

impl WorkerApp {
    fn exec(self, framework: &dyn TestFramework) -> i32 {
        let _output = OutputContext::worker_init();
        match run_worker(framework, self.pipe_fd, self.failfast, Utf8Path::new(".")) {
            Ok(()) => RegrunExitCode::OK,
            Err(err) => {
                let error = ExpectedError::from(err);
                error.display_to_stderr();
                error.process_exit_code()
            }
        }
    }
}
