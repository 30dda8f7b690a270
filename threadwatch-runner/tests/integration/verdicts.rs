// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reconciling synchronous and worker failures into verdicts.

use crate::fixtures::{TestFn, run, runner};
use color_eyre::eyre::{Result, bail, ensure};
use std::{cell::Cell, rc::Rc, thread, time::Duration};
use threadwatch_runner::{
    reporter::events::{FailureCause, TestVerdict},
    suite::{ExpectedFailure, TestCase, TestResult, TestSignature, TestSuite},
    worker,
};

pub(crate) const TESTS: &[(&str, TestFn)] = &[
    ("verdicts::worker_that_exits_passes", worker_that_exits_passes),
    ("verdicts::body_error_is_preserved", body_error_is_preserved),
    ("verdicts::expected_panic", expected_panic),
    ("verdicts::missing_expected_failure", missing_expected_failure),
    ("verdicts::single_worker_panic", single_worker_panic),
    ("verdicts::several_worker_panics", several_worker_panics),
    ("verdicts::worker_panic_while_awaited", worker_panic_while_awaited),
    ("verdicts::body_failure_wins", body_failure_wins),
    ("verdicts::leaked_worker", leaked_worker),
    ("verdicts::unsupported_signature", unsupported_signature),
];

#[derive(Debug, thiserror::Error)]
#[error("pool exhausted")]
struct PoolExhausted;

fn spawn_panicking(name: &str, message: &'static str) -> std::io::Result<()> {
    thread::Builder::new().name(name.to_owned()).spawn(move || {
        // Give the census time to observe this worker.
        thread::sleep(Duration::from_millis(20));
        panic!("{message}");
    })?;
    Ok(())
}

fn worker_that_exits_passes() -> Result<()> {
    let suite = TestSuite::<()>::with_default_fixture("verdicts").test(TestCase::new(
        "exits",
        |_: &mut ()| {
            thread::Builder::new()
                .name("short-lived".to_owned())
                .spawn(|| thread::sleep(Duration::from_millis(50)))?;
            Ok(())
        },
    ));

    let output = run(&runner(), &suite);
    let verdict = output.verdict("exits")?;
    ensure!(
        matches!(verdict, TestVerdict::Passed),
        "unexpected verdict: {verdict:?}"
    );
    ensure!(output.run_stats.is_success(), "{:?}", output.run_stats);
    Ok(())
}

fn body_error_is_preserved() -> Result<()> {
    let suite = TestSuite::<()>::with_default_fixture("verdicts").test(TestCase::new(
        "errors",
        |_: &mut ()| Err(PoolExhausted.into()),
    ));

    let output = run(&runner(), &suite);
    match output.verdict("errors")? {
        TestVerdict::FailedUnexpectedly(FailureCause::BodyError(error)) => {
            ensure!(error.is::<PoolExhausted>(), "error type is kept: {error:?}");
        }
        other => bail!("unexpected verdict: {other:?}"),
    }
    ensure!(output.run_stats.failed == 1, "{:?}", output.run_stats);
    Ok(())
}

fn expected_panic() -> Result<()> {
    let suite = TestSuite::<()>::with_default_fixture("verdicts").test(
        TestCase::new("panics", |_: &mut ()| panic!("index out of range"))
            .expect_failure(ExpectedFailure::panic_containing("out of range")),
    );

    let output = run(&runner(), &suite);
    let verdict = output.verdict("panics")?;
    ensure!(
        matches!(verdict, TestVerdict::FailedExpectedly { .. }),
        "unexpected verdict: {verdict:?}"
    );
    ensure!(output.run_stats.expected_failures == 1);
    ensure!(output.run_stats.is_success());
    Ok(())
}

fn missing_expected_failure() -> Result<()> {
    let suite = TestSuite::<()>::with_default_fixture("verdicts").test(
        TestCase::new("passes", |_: &mut ()| Ok(())).expect_failure(ExpectedFailure::panic()),
    );

    let output = run(&runner(), &suite);
    let verdict = output.verdict("passes")?;
    ensure!(
        matches!(
            verdict,
            TestVerdict::FailedUnexpectedly(FailureCause::MissingExpectedFailure(_))
        ),
        "unexpected verdict: {verdict:?}"
    );
    Ok(())
}

fn single_worker_panic() -> Result<()> {
    if !worker::census_supported() {
        return Ok(());
    }

    let suite = TestSuite::<()>::with_default_fixture("verdicts").test(TestCase::new(
        "worker-panics",
        |_: &mut ()| {
            spawn_panicking("boom-worker", "worker boom")?;
            Ok(())
        },
    ));

    let output = run(&runner(), &suite);
    match output.verdict("worker-panics")? {
        TestVerdict::FailedUnexpectedly(FailureCause::Worker(failure)) => {
            ensure!(failure.message() == "worker boom", "{failure}");
            ensure!(failure.thread_name() == Some("boom-worker"), "{failure}");
            ensure!(failure.location().is_some(), "location is recorded");
            ensure!(failure.backtrace().is_some(), "backtraces are captured by default");
        }
        other => bail!("unexpected verdict: {other:?}"),
    }
    Ok(())
}

fn several_worker_panics() -> Result<()> {
    if !worker::census_supported() {
        return Ok(());
    }

    let body = |_: &mut ()| -> TestResult {
        spawn_panicking("first-worker", "first")?;
        spawn_panicking("second-worker", "second")?;
        Ok(())
    };
    let suite = TestSuite::<()>::with_default_fixture("verdicts")
        .test(TestCase::new("unexpected", body))
        .test(TestCase::new("expected", body).expect_failure(ExpectedFailure::AsyncAggregate));

    let output = run(&runner(), &suite);
    match output.verdict("unexpected")? {
        TestVerdict::FailedUnexpectedly(FailureCause::Aggregate(aggregate)) => {
            let mut messages: Vec<_> = aggregate.failures().iter().map(|f| f.message()).collect();
            messages.sort_unstable();
            ensure!(messages == ["first", "second"], "{messages:?}");

            let rendered = aggregate.to_string();
            ensure!(rendered.starts_with("2 workers panicked:"), "{rendered}");
            ensure!(rendered.contains("'first-worker'"), "{rendered}");
            ensure!(rendered.contains("'second-worker'"), "{rendered}");
        }
        other => bail!("unexpected verdict: {other:?}"),
    }

    let verdict = output.verdict("expected")?;
    ensure!(
        matches!(verdict, TestVerdict::FailedExpectedly { .. }),
        "unexpected verdict: {verdict:?}"
    );
    Ok(())
}

fn worker_panic_while_awaited() -> Result<()> {
    if !worker::census_supported() {
        return Ok(());
    }

    let suite = TestSuite::<()>::with_default_fixture("verdicts").test(
        TestCase::new("late-panic", |_: &mut ()| {
            thread::Builder::new()
                .name("late-worker".to_owned())
                .spawn(|| {
                    // Panic well after the watcher has been disarmed.
                    thread::sleep(Duration::from_millis(200));
                    panic!("late boom");
                })?;
            Ok(())
        })
        .with_shutdown_timeout(Duration::from_millis(500)),
    );

    let output = run(&runner(), &suite);
    let (verdict, time_taken) = output.finished("late-panic")?;
    match verdict {
        TestVerdict::FailedUnexpectedly(FailureCause::Worker(failure)) => {
            ensure!(failure.message() == "late boom", "{failure}");
            ensure!(failure.thread_name() == Some("late-worker"), "{failure}");
        }
        other => bail!("unexpected verdict: {other:?}"),
    }
    ensure!(
        time_taken >= Duration::from_millis(200),
        "waited for the worker: {time_taken:?}"
    );
    Ok(())
}

fn body_failure_wins() -> Result<()> {
    if !worker::census_supported() {
        return Ok(());
    }

    let suite = TestSuite::<()>::with_default_fixture("verdicts").test(TestCase::new(
        "both-fail",
        |_: &mut ()| {
            spawn_panicking("boom-worker", "worker boom")?;
            thread::sleep(Duration::from_millis(50));
            Err(PoolExhausted.into())
        },
    ));

    let output = run(&runner(), &suite);
    let verdict = output.verdict("both-fail")?;
    ensure!(
        matches!(
            verdict,
            TestVerdict::FailedUnexpectedly(FailureCause::BodyError(_))
        ),
        "unexpected verdict: {verdict:?}"
    );
    Ok(())
}

fn leaked_worker() -> Result<()> {
    if !worker::census_supported() {
        return Ok(());
    }

    let timeout = Duration::from_millis(200);
    let suite = TestSuite::<()>::with_default_fixture("verdicts").test(
        TestCase::new("leaks", |_: &mut ()| {
            thread::Builder::new()
                .name("sleepy".to_owned())
                .spawn(|| thread::sleep(Duration::from_secs(1)))?;
            Ok(())
        })
        .with_shutdown_timeout(timeout),
    );

    let output = run(&runner(), &suite);
    let (verdict, time_taken) = output.finished("leaks")?;
    match verdict {
        TestVerdict::FailedWithLeakedWorkers { leaked, other } => {
            ensure!(leaked.timeout() == timeout);
            let names: Vec<_> = leaked.workers().iter().map(|w| w.name.as_deref()).collect();
            ensure!(names == [Some("sleepy")], "{names:?}");
            ensure!(other.is_none(), "no other failure: {other:?}");
        }
        other => bail!("unexpected verdict: {other:?}"),
    }
    ensure!(time_taken >= timeout, "waited for the timeout: {time_taken:?}");
    ensure!(output.run_stats.leaked == 1, "{:?}", output.run_stats);
    ensure!(!output.run_stats.is_success());
    Ok(())
}

fn unsupported_signature() -> Result<()> {
    let ran = Rc::new(Cell::new(false));
    let suite = TestSuite::<()>::with_default_fixture("verdicts").test(
        TestCase::new("takes-params", {
            let ran = ran.clone();
            move |_: &mut ()| {
                ran.set(true);
                Ok(())
            }
        })
        .with_signature(TestSignature::with_params(2)),
    );

    let output = run(&runner(), &suite);
    match output.verdict("takes-params")? {
        TestVerdict::FailedUnexpectedly(FailureCause::UnsupportedSignature(error)) => {
            ensure!(error.params() == 2);
        }
        other => bail!("unexpected verdict: {other:?}"),
    }
    ensure!(!ran.get(), "the body is never invoked");
    Ok(())
}
