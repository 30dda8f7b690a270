// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::reconcile::{TestOutcome, reconcile};
use crate::{
    config::RunnerProfile,
    errors::{DisplayErrorChain, InstantiationError, LeakedWorker, PanicFailure, WorkersStillAlive},
    helpers::{DisplaySeconds, panic_payload_message},
    reporter::events::{FailureCause, RunStats, TestEvent, TestEventKind, TestVerdict},
    suite::{SuiteHook, TestCase, TestError, TestSuite},
    test_filter::{FilterMatch, TestFilter},
    time::{StopwatchStart, stopwatch},
    watch::{FailureLog, WatchSettings, WorkerDiffWatcher, WorkerFailure},
    worker::{self, WorkerId, WorkerSet},
};
use std::{
    convert::Infallible,
    panic::{self, AssertUnwindSafe},
    sync::{Mutex, PoisonError},
    thread,
    time::{Duration, Instant},
};
use tracing::{debug, warn};

/// Runs are serialized: the panic hook used to collect worker failures is process-wide.
static RUN_LOCK: Mutex<()> = Mutex::new(());

/// Test runner options.
#[derive(Debug, Default)]
pub struct TestRunnerBuilder {
    watch_workers: Option<bool>,
    shutdown_timeout: Option<Duration>,
    filter: Option<TestFilter>,
}

impl TestRunnerBuilder {
    /// Sets whether tests run with a watcher armed around them, taking precedence over the profile.
    ///
    /// Without a watcher, a test's verdict only depends on its body: created workers aren't waited
    /// for and their panics aren't collected.
    pub fn set_watch_workers(&mut self, watch_workers: bool) -> &mut Self {
        self.watch_workers = Some(watch_workers);
        self
    }

    /// Sets the shutdown timeout for tests that don't override it, taking precedence over the
    /// profile.
    pub fn set_shutdown_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.shutdown_timeout = Some(timeout);
        self
    }

    /// Sets the filter used to pick the tests to run.
    pub fn set_filter(&mut self, filter: TestFilter) -> &mut Self {
        self.filter = Some(filter);
        self
    }

    /// Creates a new test runner.
    pub fn build(&self, profile: &RunnerProfile<'_>) -> TestRunner {
        TestRunner {
            settings: RunnerSettings {
                watch_workers: self
                    .watch_workers
                    .unwrap_or_else(|| profile.watch_workers()),
                shutdown_timeout: self
                    .shutdown_timeout
                    .unwrap_or_else(|| profile.shutdown_timeout()),
                settle_delay: profile.settle_delay(),
                liveness_poll_interval: profile.liveness_poll_interval(),
                watch: profile.watch_settings(),
                background_threads: profile.background_threads().to_vec(),
            },
            filter: self.filter.clone().unwrap_or_default(),
        }
    }
}

#[derive(Clone, Debug)]
struct RunnerSettings {
    watch_workers: bool,
    shutdown_timeout: Duration,
    settle_delay: Duration,
    liveness_poll_interval: Duration,
    watch: WatchSettings,
    background_threads: Vec<String>,
}

/// Context for running tests.
///
/// Created using [`TestRunnerBuilder::build`].
#[derive(Debug)]
pub struct TestRunner {
    settings: RunnerSettings,
    filter: TestFilter,
}

impl TestRunner {
    /// Executes the tests in the suite, one at a time.
    ///
    /// The callback is called with an event for every step of the run.
    pub fn execute<F, C>(&self, suite: &TestSuite<F>, mut callback: C) -> RunStats
    where
        C: FnMut(TestEvent),
    {
        let result = self.try_execute::<Infallible, _, _>(suite, |event| {
            callback(event);
            Ok(())
        });
        match result {
            Ok(run_stats) => run_stats,
            Err(never) => match never {},
        }
    }

    /// Executes the tests in the suite, one at a time.
    ///
    /// Accepts a callback that is called with an event for every step of the run. If the callback
    /// returns an error, no further tests are run, the suite teardown hook runs, and the error is
    /// returned.
    pub fn try_execute<E, F, C>(&self, suite: &TestSuite<F>, callback: C) -> Result<RunStats, E>
    where
        C: FnMut(TestEvent) -> Result<(), E>,
    {
        let _guard = RUN_LOCK.lock().unwrap_or_else(PoisonError::into_inner);

        let mut ctx = CallbackContext::new(callback);
        let test_count = suite
            .cases()
            .iter()
            .filter(|case| self.filter.filter_match(*case).is_match())
            .count();
        ctx.run_stats.initial_run_count = test_count;

        debug!(
            suite = suite.name(),
            test_count,
            start_time = %ctx.stopwatch.start_time(),
            "starting test run"
        );
        ctx.call(TestEventKind::RunStarted {
            suite: suite.name().to_owned(),
            test_count,
        })?;

        // Suite hooks only run if there's a test to run them around.
        let run_suite_hooks = test_count > 0;
        if run_suite_hooks {
            run_suite_hook(suite.name(), "suite setup", suite.before_all_hook());
        }
        let result = self.run_cases(suite, &mut ctx);
        if run_suite_hooks {
            run_suite_hook(suite.name(), "suite teardown", suite.after_all_hook());
        }
        result?;

        let run_stats = ctx.run_stats;
        ctx.call(TestEventKind::RunFinished {
            run_stats,
            elapsed: ctx.stopwatch.snapshot().duration,
        })?;
        Ok(run_stats)
    }

    fn run_cases<F, E, C>(
        &self,
        suite: &TestSuite<F>,
        ctx: &mut CallbackContext<C, E>,
    ) -> Result<(), E>
    where
        C: FnMut(TestEvent) -> Result<(), E>,
    {
        for case in suite.cases() {
            match self.filter.filter_match(case) {
                FilterMatch::Mismatch { reason } => {
                    ctx.run_stats.skipped += 1;
                    ctx.call(TestEventKind::TestSkipped {
                        name: case.name().to_owned(),
                        reason,
                    })?;
                }
                FilterMatch::Matches => {
                    ctx.call(TestEventKind::TestStarted {
                        name: case.name().to_owned(),
                    })?;

                    let test_stopwatch = stopwatch();
                    let verdict = self.run_test(suite, case);
                    let time_taken = test_stopwatch.snapshot().duration;

                    ctx.run_stats.on_test_finished(&verdict);
                    ctx.call(TestEventKind::TestFinished {
                        name: case.name().to_owned(),
                        verdict,
                        time_taken,
                    })?;
                }
            }
        }

        Ok(())
    }

    /// Runs a single test case along with its per-test hooks.
    fn run_test<F>(&self, suite: &TestSuite<F>, case: &TestCase<F>) -> TestVerdict {
        let mut fixture = match call_guarded(|| suite.instantiate()) {
            Ok(fixture) => fixture,
            Err(error) => {
                // There's no fixture to run hooks against.
                return TestVerdict::FailedUnexpectedly(FailureCause::Instantiation(
                    InstantiationError::new(error),
                ));
            }
        };

        let verdict = self.run_with_fixture(suite, case, &mut fixture);

        if let Some(after_each) = suite.after_each_hook()
            && let Err(error) = call_guarded(|| after_each(&mut fixture))
        {
            warn!(
                test = case.name(),
                "per-test teardown failed: {}",
                DisplayErrorChain::new(&*error)
            );
        }

        verdict
    }

    fn run_with_fixture<F>(
        &self,
        suite: &TestSuite<F>,
        case: &TestCase<F>,
        fixture: &mut F,
    ) -> TestVerdict {
        if let Some(before_each) = suite.before_each_hook()
            && let Err(error) = call_guarded(|| before_each(&mut *fixture))
        {
            return TestVerdict::FailedUnexpectedly(FailureCause::Setup(error));
        }

        if let Err(error) = case.signature().check() {
            return TestVerdict::FailedUnexpectedly(FailureCause::UnsupportedSignature(error));
        }

        if !self.settings.watch_workers {
            return reconcile(
                TestOutcome {
                    body_failure: invoke_body(case, fixture),
                    worker_failures: FailureLog::new(),
                    leaked: None,
                },
                case.expected_failure(),
            );
        }

        let timeout = case
            .shutdown_timeout()
            .unwrap_or(self.settings.shutdown_timeout);

        worker::prune_background();
        let watcher = WorkerDiffWatcher::new(self.settings.watch.census_poll_interval);
        let armed = match watcher.arm(&self.settings.watch) {
            Ok(armed) => armed,
            Err(error) => return TestVerdict::FailedUnexpectedly(FailureCause::Watcher(error)),
        };
        thread::sleep(self.settings.settle_delay);

        let body_failure = invoke_body(case, fixture);

        thread::sleep(self.settings.settle_delay);
        let stopped = match armed.stop() {
            Ok(stopped) => stopped,
            Err(error) => {
                if let Some(body_failure) = &body_failure {
                    warn!(
                        test = case.name(),
                        "test body also failed: {}",
                        DisplayErrorChain::new(body_failure)
                    );
                }
                return TestVerdict::FailedUnexpectedly(FailureCause::Watcher(error));
            }
        };

        debug!(
            test = case.name(),
            created = stopped.created_workers().len(),
            "waiting for created workers to exit"
        );
        let leaked = self.await_workers(stopped.created_workers(), timeout);
        let worker_failures = self.drop_recovered(stopped.finish());
        worker::prune_background();

        reconcile(
            TestOutcome {
                body_failure,
                worker_failures,
                leaked,
            },
            case.expected_failure(),
        )
    }

    /// Waits for every non-exempt created worker to exit.
    ///
    /// All workers share a single deadline. Every worker still alive once it passes is reported.
    fn await_workers(&self, created: &WorkerSet, timeout: Duration) -> Option<WorkersStillAlive> {
        let deadline = Instant::now() + timeout;
        let mut remaining: Vec<WorkerId> = created.iter().copied().collect();

        loop {
            remaining.retain(|&id| !self.is_exempt(id) && worker::is_alive(id));
            if remaining.is_empty() {
                return None;
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(self.settings.liveness_poll_interval.min(deadline - now));
        }

        let leaked: Vec<_> = remaining
            .into_iter()
            .map(|id| LeakedWorker {
                id,
                name: worker::thread_name(id),
            })
            .collect();
        warn!(
            leaked = leaked.len(),
            "workers still alive after {}",
            DisplaySeconds(timeout)
        );
        Some(WorkersStillAlive::new(timeout, leaked))
    }

    /// Drops the failures of workers that are still running: they caught the panic and carried on.
    ///
    /// A worker that panicked may still be unwinding, so failed workers get one liveness poll
    /// interval to exit first.
    fn drop_recovered(&self, mut failures: FailureLog) -> FailureLog {
        let deadline = Instant::now() + self.settings.liveness_poll_interval;
        let mut running: Vec<WorkerId> = failures.iter().map(WorkerFailure::worker).collect();

        loop {
            running.retain(|&id| worker::is_alive(id));
            let now = Instant::now();
            if running.is_empty() || now >= deadline {
                break;
            }
            thread::sleep(self.settings.watch.census_poll_interval.min(deadline - now));
        }

        if !running.is_empty() {
            debug!(
                recovered = running.len(),
                "ignoring panics on workers that are still running"
            );
            failures.retain(|failure| !running.contains(&failure.worker()));
        }
        failures
    }

    fn is_exempt(&self, id: WorkerId) -> bool {
        if worker::is_background(id) {
            return true;
        }
        if self.settings.background_threads.is_empty() {
            return false;
        }
        worker::thread_name(id).is_some_and(|name| {
            self.settings
                .background_threads
                .iter()
                .any(|prefix| name.starts_with(prefix.as_str()))
        })
    }
}

struct CallbackContext<C, E>
where
    C: FnMut(TestEvent) -> Result<(), E>,
{
    callback: C,
    stopwatch: StopwatchStart,
    run_stats: RunStats,
}

impl<C, E> CallbackContext<C, E>
where
    C: FnMut(TestEvent) -> Result<(), E>,
{
    fn new(callback: C) -> Self {
        Self {
            callback,
            stopwatch: stopwatch(),
            run_stats: RunStats::default(),
        }
    }

    fn call(&mut self, kind: TestEventKind) -> Result<(), E> {
        let snapshot = self.stopwatch.snapshot();
        (self.callback)(TestEvent {
            timestamp: snapshot.end_time(),
            elapsed: snapshot.duration,
            kind,
        })
    }
}

fn invoke_body<F>(case: &TestCase<F>, fixture: &mut F) -> Option<FailureCause> {
    match panic::catch_unwind(AssertUnwindSafe(|| case.invoke(&mut *fixture))) {
        Ok(Ok(())) => None,
        Ok(Err(error)) => Some(FailureCause::BodyError(error)),
        Err(payload) => Some(FailureCause::BodyPanic(PanicFailure::new(
            panic_payload_message(&*payload),
        ))),
    }
}

fn run_suite_hook(suite: &str, hook_name: &str, hook: Option<&SuiteHook>) {
    let Some(hook) = hook else {
        return;
    };
    debug!(suite, "running {hook_name}");
    if let Err(error) = call_guarded(hook) {
        warn!(suite, "{hook_name} failed: {}", DisplayErrorChain::new(&*error));
    }
}

/// Calls a hook, turning a panic into an error.
fn call_guarded<T>(f: impl FnOnce() -> Result<T, TestError>) -> Result<T, TestError> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(Box::new(PanicFailure::new(panic_payload_message(&*payload)))),
    }
}
