// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Events, filtering and reporter output for whole runs.

use crate::fixtures::{SHUTDOWN_TIMEOUT, TestFn, run, runner, workspace_root};
use color_eyre::eyre::{Result, bail, ensure};
use std::{cell::RefCell, rc::Rc, thread, time::Duration};
use threadwatch_runner::{
    config::RunnerConfig,
    reporter::{
        TestReporter,
        events::{TestEventKind, TestVerdict},
    },
    runner::TestRunnerBuilder,
    suite::{ExpectedFailure, TestCase, TestSuite},
    test_filter::{MismatchReason, RunIgnored, TestFilterBuilder},
    worker,
};

pub(crate) const TESTS: &[(&str, TestFn)] = &[
    ("reporting::event_sequence", event_sequence),
    ("reporting::reporter_output", reporter_output),
    ("reporting::callback_error_stops_run", callback_error_stops_run),
    ("reporting::filtered_run", filtered_run),
];

fn event_sequence() -> Result<()> {
    let suite = TestSuite::<()>::with_default_fixture("events")
        .test(TestCase::new("first", |_: &mut ()| Ok(())))
        .test(TestCase::new("skipped", |_: &mut ()| Ok(())).ignore())
        .test(TestCase::new("second", |_: &mut ()| Ok(())));

    let output = run(&runner(), &suite);
    let kinds: Vec<_> = output
        .events
        .iter()
        .map(|event| match &event.kind {
            TestEventKind::RunStarted { suite, test_count } => format!("start {suite} {test_count}"),
            TestEventKind::TestSkipped { name, .. } => format!("skip {name}"),
            TestEventKind::TestStarted { name } => format!("test {name}"),
            TestEventKind::TestFinished { name, .. } => format!("done {name}"),
            TestEventKind::RunFinished { .. } => "finish".to_owned(),
        })
        .collect();
    ensure!(
        kinds
            == [
                "start events 2",
                "test first",
                "done first",
                "skip skipped",
                "test second",
                "done second",
                "finish",
            ],
        "{kinds:?}"
    );

    let elapsed: Vec<_> = output.events.iter().map(|event| event.elapsed).collect();
    ensure!(
        elapsed.windows(2).all(|pair| pair[0] <= pair[1]),
        "elapsed times never go backwards: {elapsed:?}"
    );
    Ok(())
}

fn reporter_output() -> Result<()> {
    if !worker::census_supported() {
        return Ok(());
    }

    let suite = TestSuite::<()>::with_default_fixture("reporting")
        .test(TestCase::new("passes", |_: &mut ()| Ok(())))
        .test(
            TestCase::new("expected", |_: &mut ()| panic!("bad input"))
                .expect_failure(ExpectedFailure::panic_containing("bad input")),
        )
        .test(TestCase::new("worker-panics", |_: &mut ()| {
            thread::Builder::new()
                .name("reporter-worker".to_owned())
                .spawn(|| {
                    thread::sleep(Duration::from_millis(20));
                    panic!("queue closed");
                })?;
            Ok(())
        }));

    let mut reporter = TestReporter::new(Vec::new());
    let run_stats = runner().try_execute(&suite, |event| reporter.report_event(&event))?;
    ensure!(run_stats.has_failures(), "{run_stats:?}");

    let output = String::from_utf8(reporter.into_writer())?;
    for expected in [
        "Starting 3 tests in suite reporting",
        "PASS [",
        "XFAIL [",
        "FAIL [",
        "--- FAIL: worker-panics ---",
        "('reporter-worker') panicked at ",
        ": queue closed",
        "3 tests run: 1 passed (1 failed as expected), 1 failed, 0 skipped",
    ] {
        ensure!(output.contains(expected), "`{expected}` in output:\n{output}");
    }
    ensure!(
        !output.contains("--- XFAIL"),
        "expected failures have no details:\n{output}"
    );
    Ok(())
}

#[derive(Debug)]
struct StopRun;

fn callback_error_stops_run() -> Result<()> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let suite = TestSuite::<()>::with_default_fixture("stops")
        .after_all({
            let log = log.clone();
            move || {
                log.borrow_mut().push("after_all");
                Ok(())
            }
        })
        .test(TestCase::new("first", {
            let log = log.clone();
            move |_: &mut ()| {
                log.borrow_mut().push("first");
                Ok(())
            }
        }))
        .test(TestCase::new("second", {
            let log = log.clone();
            move |_: &mut ()| {
                log.borrow_mut().push("second");
                Ok(())
            }
        }));

    let result = runner().try_execute(&suite, |event| match event.kind {
        TestEventKind::TestFinished { .. } => Err(StopRun),
        _ => Ok(()),
    });
    match result {
        Err(StopRun) => {}
        Ok(run_stats) => bail!("run wasn't stopped: {run_stats:?}"),
    }
    ensure!(
        *log.borrow() == ["first", "after_all"],
        "suite teardown still runs: {:?}",
        log.borrow()
    );
    Ok(())
}

fn filtered_run() -> Result<()> {
    let mut builder = TestFilterBuilder::new(RunIgnored::All, ["pool"]);
    builder.add_skip_pattern("slow");
    let filter = builder.build()?;

    let config = RunnerConfig::default_config(workspace_root());
    let profile = config.profile(RunnerConfig::DEFAULT_PROFILE)?;
    let runner = TestRunnerBuilder::default()
        .set_shutdown_timeout(SHUTDOWN_TIMEOUT)
        .set_filter(filter)
        .build(&profile);

    let suite = TestSuite::<()>::with_default_fixture("filtered")
        .test(TestCase::new("pool_acquire", |_: &mut ()| Ok(())))
        .test(TestCase::new("pool_release", |_: &mut ()| Ok(())).ignore())
        .test(TestCase::new("pool_slow_drain", |_: &mut ()| Ok(())))
        .test(TestCase::new("cache_evict", |_: &mut ()| Ok(())));

    let output = run(&runner, &suite);
    ensure!(
        output.started() == ["pool_acquire", "pool_release"],
        "{:?}",
        output.started()
    );

    let skipped: Vec<_> = output
        .events
        .iter()
        .filter_map(|event| match &event.kind {
            TestEventKind::TestSkipped { name, reason } => Some((name.as_str(), *reason)),
            _ => None,
        })
        .collect();
    ensure!(
        skipped
            == [
                ("pool_slow_drain", MismatchReason::String),
                ("cache_evict", MismatchReason::String),
            ],
        "{skipped:?}"
    );

    for name in ["pool_acquire", "pool_release"] {
        let verdict = output.verdict(name)?;
        ensure!(matches!(verdict, TestVerdict::Passed), "{name}: {verdict:?}");
    }
    ensure!(output.run_stats.skipped == 2, "{:?}", output.run_stats);
    Ok(())
}
