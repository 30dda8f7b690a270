// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reporting of test results.
//!
//! The main structure in this module is [`TestReporter`], which turns [`TestEvent`]s into
//! human-readable output.

pub mod events;

use crate::{
    errors::{DisplayErrorChain, WriteEventError},
    helpers::plural,
};
use events::{RunStats, TestEvent, TestEventKind, TestVerdict};
use owo_colors::{OwoColorize, Style};
use std::{
    io::{self, Write},
    time::Duration,
};
use swrite::{SWrite, swrite};

/// Functionality to report test results to a writer, typically stderr.
pub struct TestReporter<W> {
    writer: W,
    styles: Styles,
    failures: Vec<FailedTest>,
}

/// A failed test, listed again at the end of the run.
struct FailedTest {
    name: String,
    status: &'static str,
    style: Style,
    time_taken: Duration,
}

impl<W: Write> TestReporter<W> {
    /// Creates a new reporter that writes to the given writer, without colors.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            styles: Styles::default(),
            failures: Vec::new(),
        }
    }

    /// Colorizes output.
    pub fn colorize(&mut self) {
        self.styles.colorize();
    }

    /// Report a test event.
    pub fn report_event(&mut self, event: &TestEvent) -> Result<(), WriteEventError> {
        self.write_event(event).map_err(WriteEventError::Io)
    }

    /// Returns the writer, consuming the reporter.
    pub fn into_writer(self) -> W {
        self.writer
    }

    fn write_event(&mut self, event: &TestEvent) -> io::Result<()> {
        match &event.kind {
            TestEventKind::RunStarted { suite, test_count } => {
                writeln!(
                    self.writer,
                    "{:>12} {} {} in suite {}",
                    "Starting".style(self.styles.pass),
                    test_count.style(self.styles.count),
                    plural::tests_str(*test_count),
                    suite.style(self.styles.count),
                )?;
            }
            TestEventKind::TestSkipped { name, .. } => {
                writeln!(
                    self.writer,
                    "{:>12} {:>11} {name}",
                    "SKIP".style(self.styles.skip),
                    "",
                )?;
            }
            TestEventKind::TestStarted { .. } => {}
            TestEventKind::TestFinished {
                name,
                verdict,
                time_taken,
            } => {
                let (status, style) = self.status_str(verdict);
                write!(self.writer, "{:>12} ", status.style(style))?;
                write_duration(*time_taken, &mut self.writer)?;
                writeln!(self.writer, "{name}")?;

                if !verdict.is_success() {
                    self.write_failure_detail(name, status, style, verdict)?;
                    self.failures.push(FailedTest {
                        name: name.clone(),
                        status,
                        style,
                        time_taken: *time_taken,
                    });
                }
            }
            TestEventKind::RunFinished { run_stats, elapsed } => {
                writeln!(self.writer, "------------")?;
                write!(self.writer, "{:>12} ", "Summary".style(self.summary_style(run_stats)))?;
                write_duration(*elapsed, &mut self.writer)?;

                let mut summary = String::new();
                write_summary_str(run_stats, &self.styles, &mut summary);
                writeln!(self.writer, "{summary}")?;

                for failed in &self.failures {
                    write!(self.writer, "{:>12} ", failed.status.style(failed.style))?;
                    write_duration(failed.time_taken, &mut self.writer)?;
                    writeln!(self.writer, "{}", failed.name)?;
                }
            }
        }

        Ok(())
    }

    fn status_str(&self, verdict: &TestVerdict) -> (&'static str, Style) {
        match verdict {
            TestVerdict::Passed => ("PASS", self.styles.pass),
            TestVerdict::FailedExpectedly { .. } => ("XFAIL", self.styles.pass),
            TestVerdict::FailedUnexpectedly(_) => ("FAIL", self.styles.fail),
            TestVerdict::FailedWithLeakedWorkers { .. } => ("LEAK", self.styles.leak),
        }
    }

    fn summary_style(&self, run_stats: &RunStats) -> Style {
        if run_stats.is_success() {
            self.styles.pass
        } else {
            self.styles.fail
        }
    }

    fn write_failure_detail(
        &mut self,
        name: &str,
        status: &str,
        style: Style,
        verdict: &TestVerdict,
    ) -> io::Result<()> {
        let header = format!("--- {status}: {name} ---");
        writeln!(self.writer, "\n{}", header.style(style))?;

        match verdict {
            TestVerdict::Passed | TestVerdict::FailedExpectedly { .. } => {}
            TestVerdict::FailedUnexpectedly(cause) => {
                writeln!(self.writer, "{}", DisplayErrorChain::new(cause))?;
            }
            TestVerdict::FailedWithLeakedWorkers { leaked, other } => {
                writeln!(self.writer, "{leaked}")?;
                if let Some(other) = other {
                    writeln!(
                        self.writer,
                        "\n{}\n{}",
                        "the test also failed:".style(self.styles.fail),
                        DisplayErrorChain::new(other),
                    )?;
                }
            }
        }

        writeln!(self.writer)
    }
}

fn write_duration(duration: Duration, writer: &mut dyn Write) -> io::Result<()> {
    // * > means right-align.
    // * 8 is the number of characters to pad to.
    // * .3 means print three digits after the decimal point.
    write!(writer, "[{:>8.3}s] ", duration.as_secs_f64())
}

fn write_summary_str(run_stats: &RunStats, styles: &Styles, out: &mut String) {
    swrite!(
        out,
        "{} {} run: {} {}",
        run_stats.final_run_count.style(styles.count),
        plural::tests_str(run_stats.final_run_count),
        run_stats.passed.style(styles.count),
        "passed".style(styles.pass),
    );

    if run_stats.expected_failures > 0 {
        swrite!(
            out,
            " ({} {})",
            run_stats.expected_failures.style(styles.count),
            "failed as expected".style(styles.pass),
        );
    }
    swrite!(out, ", ");

    if run_stats.failed > 0 {
        swrite!(
            out,
            "{} {}, ",
            run_stats.failed.style(styles.count),
            "failed".style(styles.fail),
        );
    }

    if run_stats.leaked > 0 {
        swrite!(
            out,
            "{} {}, ",
            run_stats.leaked.style(styles.count),
            "leaked workers".style(styles.leak),
        );
    }

    swrite!(
        out,
        "{} {}",
        run_stats.skipped.style(styles.count),
        "skipped".style(styles.skip),
    );
}

#[derive(Debug, Default)]
struct Styles {
    count: Style,
    pass: Style,
    fail: Style,
    leak: Style,
    skip: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.count = Style::new().bold();
        self.pass = Style::new().green().bold();
        self.fail = Style::new().red().bold();
        self.leak = Style::new().magenta().bold();
        self.skip = Style::new().yellow().bold();
    }
}
