// Copyright (c) The regrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::TestReporter;
use crate::{TestStatus, errors::JsonReportWriteError, runner::RunStats};
use camino::Utf8Path;
use itertools::Itertools;
use owo_colors::OwoColorize;
use serde::Serialize;
use std::{
    fs::File,
    io::{self, BufWriter, Write},
};

const DOUBLE_RULE: &str =
    "======================================================================";
const SINGLE_RULE: &str =
    "----------------------------------------------------------------------";
const CAPTURED_OUTPUT_RULE: &str =
    "------------------------- captured output ----------------------------";

/// How many of the slowest tests to list in the summary.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum SlowestDurations {
    /// Don't list durations.
    #[default]
    Off,
    /// List every test.
    All,
    /// List this many of the slowest tests.
    Slowest(usize),
}

impl SlowestDurations {
    /// Interprets a `--durations` count: negative lists all tests, zero lists none.
    pub fn from_count(count: i64) -> Self {
        match usize::try_from(count) {
            Ok(0) => SlowestDurations::Off,
            Ok(n) => SlowestDurations::Slowest(n),
            Err(_) => SlowestDurations::All,
        }
    }
}

#[derive(Serialize)]
struct JsonReportEntry<'a> {
    name: String,
    status: &'a str,
    duration: f64,
}

impl<W: Write> TestReporter<W> {
    /// Writes the summary of the run, and returns the final statistics.
    ///
    /// Must only be called once every test has finished.
    pub fn write_summary(&mut self, interrupted: bool) -> io::Result<RunStats> {
        let stats = self.run_stats(interrupted);
        if self.incomplete_line.take().is_some() {
            writeln!(self.writer)?;
        }
        writeln!(self.writer)?;

        self.write_durations()?;

        for result in &self.results {
            let Some(label) = result.status.failure_label() else {
                continue;
            };
            writeln!(self.writer, "{DOUBLE_RULE}")?;
            writeln!(
                self.writer,
                "{}: {}",
                label.style(self.styles.fail),
                result.test_id
            )?;
            writeln!(self.writer, "{SINGLE_RULE}")?;
            if let Some(param) = &result.param {
                writeln!(self.writer, "{}", param.trim_end_matches('\n'))?;
            }
            if !result.output.is_empty() {
                writeln!(self.writer, "{CAPTURED_OUTPUT_RULE}")?;
                writeln!(self.writer, "{}", result.output.trim_end_matches('\n'))?;
            }
            writeln!(self.writer)?;
        }

        writeln!(
            self.writer,
            "Ran {} tests",
            stats.counts.executed().style(self.styles.count)
        )?;
        writeln!(self.writer)?;
        let verdict = if stats.is_success() {
            "OK".style(self.styles.pass)
        } else {
            "FAILED".style(self.styles.fail)
        };
        let items = stats.counts.summary_items();
        if items.is_empty() {
            writeln!(self.writer, "{verdict}")?;
        } else {
            writeln!(self.writer, "{verdict} ({})", items.join(", "))?;
        }

        if self.opts.failfast && stats.counts.get(TestStatus::NotExecuted) > 0 {
            writeln!(self.writer)?;
            writeln!(
                self.writer,
                "WARNING: Did not execute all tests because 'failfast' mode is on"
            )?;
        }

        for crash in &self.crashes {
            writeln!(
                self.writer,
                "{}",
                "Internal error, test worker crashed outside of tests:".style(self.styles.fail)
            )?;
            writeln!(self.writer, "{}", crash.trim_end_matches('\n'))?;
        }

        if interrupted {
            writeln!(self.writer, "Interrupted!")?;
        }
        self.writer.flush()?;
        Ok(stats)
    }

    fn write_durations(&mut self) -> io::Result<()> {
        let limit = match self.opts.durations {
            SlowestDurations::Off => return Ok(()),
            SlowestDurations::All => usize::MAX,
            SlowestDurations::Slowest(n) => n,
        };
        if self.results.is_empty() {
            return Ok(());
        }
        writeln!(self.writer, "Slowest test durations:")?;
        // Stable sort, so ties keep reporting order.
        let slowest = self
            .results
            .iter()
            .sorted_by(|a, b| b.duration.cmp(&a.duration))
            .take(limit);
        for result in slowest {
            writeln!(
                self.writer,
                "- {}: {:.2}s",
                result.test_id,
                result.duration.as_secs_f64()
            )?;
        }
        writeln!(self.writer)
    }

    /// Writes a JSON report of all results to `path`.
    pub fn write_json_report(&self, path: &Utf8Path) -> Result<(), JsonReportWriteError> {
        let entries: Vec<_> = self
            .results
            .iter()
            .map(|result| JsonReportEntry {
                name: result.test_id.to_string(),
                status: result.status.json_report_status(),
                duration: result.duration.as_secs_f64(),
            })
            .collect();
        let write = || -> io::Result<()> {
            let mut writer = BufWriter::new(File::create(path)?);
            serde_json::to_writer(&mut writer, &entries)?;
            writer.flush()
        };
        write().map_err(|error| JsonReportWriteError::new(path, error))
    }
}
