// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8PathBuf;
use color_eyre::eyre::{Result, eyre};
use libtest_mimic::{Failed, Trial};
use std::time::Duration;
use threadwatch_runner::{
    config::RunnerConfig,
    reporter::events::{RunStats, TestEvent, TestEventKind, TestVerdict},
    runner::{TestRunner, TestRunnerBuilder},
    suite::TestSuite,
};

pub(crate) type TestFn = fn() -> Result<()>;

/// The shutdown timeout used unless a test overrides it.
pub(crate) const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

pub(crate) fn init_tracing() {
    // Ignore the error if a subscriber is already set.
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .try_init();
}

pub(crate) fn trial(name: &str, test: TestFn) -> Trial {
    Trial::test(name, move || {
        test().map_err(|error| Failed::from(format!("{error:?}")))
    })
}

pub(crate) fn workspace_root() -> Utf8PathBuf {
    Utf8PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

/// Returns a runner for the default profile, with a short shutdown timeout.
pub(crate) fn runner() -> TestRunner {
    let config = RunnerConfig::default_config(workspace_root());
    runner_for(&config, RunnerConfig::DEFAULT_PROFILE)
        .expect("the default profile always exists")
}

pub(crate) fn runner_for(config: &RunnerConfig, profile: &str) -> Result<TestRunner> {
    let profile = config.profile(profile)?;
    Ok(TestRunnerBuilder::default()
        .set_shutdown_timeout(SHUTDOWN_TIMEOUT)
        .build(&profile))
}

/// The events produced by a run, along with its statistics.
pub(crate) struct RunOutput {
    pub(crate) run_stats: RunStats,
    pub(crate) events: Vec<TestEvent>,
}

impl RunOutput {
    /// Returns the verdict and time taken for the given test.
    pub(crate) fn finished(&self, name: &str) -> Result<(&TestVerdict, Duration)> {
        self.events
            .iter()
            .find_map(|event| match &event.kind {
                TestEventKind::TestFinished {
                    name: finished,
                    verdict,
                    time_taken,
                } if finished == name => Some((verdict, *time_taken)),
                _ => None,
            })
            .ok_or_else(|| eyre!("test `{name}` did not finish"))
    }

    pub(crate) fn verdict(&self, name: &str) -> Result<&TestVerdict> {
        Ok(self.finished(name)?.0)
    }

    /// Returns the names of tests that were started, in order.
    pub(crate) fn started(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|event| match &event.kind {
                TestEventKind::TestStarted { name } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }
}

pub(crate) fn run<F>(runner: &TestRunner, suite: &TestSuite<F>) -> RunOutput {
    let mut events = Vec::new();
    let run_stats = runner.execute(suite, |event| events.push(event));
    RunOutput { run_stats, events }
}
