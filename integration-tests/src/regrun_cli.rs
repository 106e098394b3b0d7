// Copyright (c) The regrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::{Result, eyre::Context};
use regrun_runner::worker::IN_PROCESS_ENV;
use std::{borrow::Cow, fmt, process::ExitStatus};

/// Runs the `regrun-fixture` binary with a set of arguments.
#[derive(Clone, Debug)]
pub struct RegrunCli {
    bin: Utf8PathBuf,
    args: Vec<String>,
    dir: Option<Utf8PathBuf>,
    unchecked: bool,
}

impl RegrunCli {
    pub fn new(bin: impl Into<Utf8PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            args: Vec::new(),
            dir: None,
            unchecked: false,
        }
    }

    pub fn args(&mut self, args: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory of the runner.
    pub fn dir(&mut self, dir: &Utf8Path) -> &mut Self {
        self.dir = Some(dir.to_owned());
        self
    }

    /// If true, a non-zero exit code doesn't cause [`Self::output`] to panic.
    pub fn unchecked(&mut self, unchecked: bool) -> &mut Self {
        self.unchecked = unchecked;
        self
    }

    /// Converts the command to a [`duct::Expression`].
    pub fn to_expression(&self) -> duct::Expression {
        // Color and worker mode must not leak in from the environment running the tests.
        let mut expression = duct::cmd(self.bin.as_str(), &self.args)
            .env("CARGO_TERM_COLOR", "never")
            .env_remove(IN_PROCESS_ENV)
            .env_remove("REGRUN_LOG");
        if let Some(dir) = &self.dir {
            expression = expression.dir(dir.as_std_path());
        }
        expression
    }

    /// Runs the command and captures its output.
    pub fn try_output(&self) -> Result<RegrunOutput> {
        let output = self
            .to_expression()
            .stdout_capture()
            .stderr_capture()
            .unchecked()
            .run()
            .wrap_err_with(|| format!("failed to execute {}", self.bin))?;
        Ok(RegrunOutput {
            args: self.args.clone(),
            exit_status: output.status,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    /// Starts the command in the background, capturing its output.
    pub fn start(&self) -> Result<RegrunHandle> {
        let handle = self
            .to_expression()
            .stdout_capture()
            .stderr_capture()
            .unchecked()
            .start()
            .wrap_err_with(|| format!("failed to start {}", self.bin))?;
        Ok(RegrunHandle {
            args: self.args.clone(),
            handle,
        })
    }

    /// Runs the command, panicking if it can't be run, or if it fails unless
    /// [`Self::unchecked`] was set.
    pub fn output(&self) -> RegrunOutput {
        let ret = self.try_output().expect("failed to execute");
        if !self.unchecked && !ret.exit_status.success() {
            panic!("command failed:\n\n{ret}");
        }
        ret
    }
}

/// A runner started with [`RegrunCli::start`].
pub struct RegrunHandle {
    args: Vec<String>,
    handle: duct::Handle,
}

impl RegrunHandle {
    /// The runner's process ID.
    pub fn pid(&self) -> Option<u32> {
        self.handle.pids().first().copied()
    }

    /// Waits for the runner to exit and collects its output.
    pub fn wait(self) -> Result<RegrunOutput> {
        let output = self.handle.into_output().wrap_err("failed to wait for runner")?;
        Ok(RegrunOutput {
            args: self.args,
            exit_status: output.status,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

pub struct RegrunOutput {
    pub args: Vec<String>,
    pub exit_status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl RegrunOutput {
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_status.code()
    }

    pub fn stdout_as_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_as_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }

    /// Returns the progress lines (`test ... status`) printed before the summary, in order.
    pub fn progress_lines(&self) -> Vec<String> {
        self.stdout_as_str()
            .lines()
            .take_while(|line| !line.is_empty())
            .filter(|line| line.contains(" ... "))
            .map(str::to_owned)
            .collect()
    }
}

impl fmt::Display for RegrunOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "args: {:?}\nexit code: {:?}\n\
                   --- stdout ---\n{}\n\n--- stderr ---\n{}\n\n",
            self.args,
            self.exit_status.code(),
            String::from_utf8_lossy(&self.stdout),
            String::from_utf8_lossy(&self.stderr)
        )
    }
}

// Make Debug output the same as Display output, so `.unwrap()` and `.expect()` are nicer.
impl fmt::Debug for RegrunOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
