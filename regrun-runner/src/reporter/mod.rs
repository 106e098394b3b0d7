// Copyright (c) The regrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prints results as they come in, and the summary at the end of a run.
//!
//! The main structure in this module is [`TestReporter`].

mod summary;

pub use summary::SlowestDurations;

use crate::{StatusCounts, TestResult, TestSpecifier, TestStatus, runner::RunStats};
use owo_colors::{OwoColorize, Style};
use std::{
    collections::HashSet,
    io::{self, Write},
};

/// Options for a [`TestReporter`].
#[derive(Clone, Debug, Default)]
pub struct ReporterOpts {
    /// Whether the run stops at the first failing test.
    pub failfast: bool,
    /// How many of the slowest tests to list in the summary.
    pub durations: SlowestDurations,
    /// Whether to print an incomplete `<test> ... ` line when a test starts. Only useful on a
    /// terminal, where the result line overwrites it.
    pub incomplete_lines: bool,
}

/// Accumulates test results, prints progress lines and renders the final summary.
pub struct TestReporter<W> {
    writer: W,
    styles: Box<Styles>,
    opts: ReporterOpts,
    incomplete_line: Option<String>,
    results: Vec<TestResult>,
    reported: HashSet<TestSpecifier>,
    counts: StatusCounts,
    collection_errors: usize,
    crashes: Vec<String>,
}

impl<W: Write> TestReporter<W> {
    /// Creates a new reporter writing to `writer`.
    pub fn new(writer: W, opts: ReporterOpts) -> Self {
        Self {
            writer,
            styles: Box::default(),
            opts,
            incomplete_line: None,
            results: Vec::new(),
            reported: HashSet::new(),
            counts: StatusCounts::default(),
            collection_errors: 0,
            crashes: Vec::new(),
        }
    }

    /// Colorizes output.
    pub fn colorize(&mut self) {
        self.styles.colorize();
    }

    /// Reports that a test started.
    pub fn report_start(&mut self, test_id: &TestSpecifier) -> io::Result<()> {
        if !self.opts.incomplete_lines {
            return Ok(());
        }
        let line = format!("{test_id} ... ");
        if self.incomplete_line.is_some() {
            writeln!(self.writer)?;
        }
        write!(self.writer, "{line}")?;
        self.writer.flush()?;
        self.incomplete_line = Some(line);
        Ok(())
    }

    /// Records a result and prints its progress line.
    pub fn report_result(&mut self, result: TestResult) -> io::Result<()> {
        let mut plain_len = format!("{} ... {}", result.test_id, result.status).len();
        let mut line = format!(
            "{} ... {}",
            result.test_id,
            result.status.style(self.styles.status(result.status))
        );
        if result.status == TestStatus::Skipped
            && let Some(reason) = &result.param
        {
            let reason = format!(" '{reason}'");
            plain_len += reason.len();
            line.push_str(&reason);
        }

        match self.incomplete_line.take() {
            Some(incomplete) => {
                let pad = incomplete.len().saturating_sub(plain_len);
                writeln!(self.writer, "\r{line}{:pad$}", "")?;
            }
            None => writeln!(self.writer, "{line}")?,
        }
        self.writer.flush()?;

        self.counts.add(result.status);
        self.reported.insert(result.test_id.clone());
        self.results.push(result);
        Ok(())
    }

    /// Records the error result of a file that failed to load.
    pub fn report_collection_error(&mut self, result: TestResult) -> io::Result<()> {
        self.collection_errors += 1;
        self.report_result(result)
    }

    /// Records a worker crash that happened outside of any test.
    pub fn report_crash(&mut self, message: String) {
        self.crashes.push(message);
    }

    /// Reports every test in `tests` that doesn't have a result yet as not executed.
    pub fn report_unexecuted<'a>(
        &mut self,
        tests: impl IntoIterator<Item = &'a TestSpecifier>,
    ) -> io::Result<()> {
        for test in tests {
            if !self.reported.contains(test) {
                self.report_result(TestResult::new(test.clone(), TestStatus::NotExecuted))?;
            }
        }
        Ok(())
    }

    /// All results recorded so far, in the order they were reported.
    pub fn results(&self) -> &[TestResult] {
        &self.results
    }

    /// The number of results with each status.
    pub fn counts(&self) -> &StatusCounts {
        &self.counts
    }

    /// Statistics for the run so far.
    pub fn run_stats(&self, interrupted: bool) -> RunStats {
        RunStats {
            counts: self.counts,
            collection_errors: self.collection_errors,
            crashes: self.crashes.len(),
            interrupted,
        }
    }

    /// Returns the underlying writer.
    pub fn into_writer(self) -> W {
        self.writer
    }
}

#[derive(Debug, Default)]
struct Styles {
    pass: Style,
    fail: Style,
    skip: Style,
    count: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.pass = Style::new().green().bold();
        self.fail = Style::new().red().bold();
        self.skip = Style::new().yellow().bold();
        self.count = Style::new().bold();
    }

    fn status(&self, status: TestStatus) -> Style {
        match status {
            TestStatus::Success => self.pass,
            TestStatus::Failure | TestStatus::Error | TestStatus::UnexpectedSuccess => self.fail,
            TestStatus::Skipped | TestStatus::ExpectedFailure | TestStatus::NotExecuted => {
                self.skip
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn spec(s: &str) -> TestSpecifier {
        s.parse().expect("valid specifier")
    }

    fn output(reporter: TestReporter<Vec<u8>>) -> String {
        String::from_utf8(reporter.into_writer()).expect("output is UTF-8")
    }

    #[test]
    fn progress_lines() {
        let mut reporter = TestReporter::new(Vec::new(), ReporterOpts::default());
        reporter
            .report_start(&spec("t::C::test_a"))
            .expect("write succeeds");
        reporter
            .report_result(TestResult::new(spec("t::C::test_a"), TestStatus::Success))
            .expect("write succeeds");
        reporter
            .report_result(
                TestResult::new(spec("t::C::test_b"), TestStatus::Skipped).with_param("needs gpu"),
            )
            .expect("write succeeds");
        reporter
            .report_result(
                TestResult::new(spec("t::C::test_c"), TestStatus::Failure).with_param("boom"),
            )
            .expect("write succeeds");
        assert_eq!(
            output(reporter),
            "t::C::test_a ... ok\nt::C::test_b ... skipped 'needs gpu'\nt::C::test_c ... FAIL\n"
        );
    }

    #[test]
    fn incomplete_lines_are_overwritten() {
        let mut reporter = TestReporter::new(
            Vec::new(),
            ReporterOpts {
                incomplete_lines: true,
                ..ReporterOpts::default()
            },
        );
        reporter
            .report_start(&spec("t::C::test_a"))
            .expect("write succeeds");
        reporter
            .report_result(TestResult::new(spec("t::C::test_a"), TestStatus::Success))
            .expect("write succeeds");
        assert_eq!(
            output(reporter),
            "t::C::test_a ... \rt::C::test_a ... ok\n"
        );
    }

    #[test]
    fn unexecuted_fills_gaps() {
        let mut reporter = TestReporter::new(Vec::new(), ReporterOpts::default());
        let tests = [spec("t::C::a"), spec("t::C::b")];
        reporter
            .report_result(TestResult::new(tests[0].clone(), TestStatus::Failure))
            .expect("write succeeds");
        reporter.report_unexecuted(&tests).expect("write succeeds");
        reporter.report_unexecuted(&tests).expect("write succeeds");
        assert_eq!(reporter.counts().get(TestStatus::NotExecuted), 1);
        assert_eq!(reporter.results().len(), 2);
        assert_eq!(reporter.results()[1].test_id, tests[1]);
        assert_eq!(reporter.results()[1].status, TestStatus::NotExecuted);
    }
}
