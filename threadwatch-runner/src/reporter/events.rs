// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Events for the reporter.
//!
//! These types form the interface between the test runner and the test reporter. The root
//! structure for all events is [`TestEvent`].

use crate::{
    errors::{
        AggregateAsyncFailure, InstantiationError, PanicFailure, UnsupportedSignatureError,
        WatcherError, WorkersStillAlive,
    },
    suite::{ExpectedFailure, TestError},
    test_filter::MismatchReason,
    watch::WorkerFailure,
};
use chrono::{DateTime, Local};
use std::{error, fmt, time::Duration};

/// A test event.
///
/// Events are produced by a [`TestRunner`](crate::runner::TestRunner) and consumed by a
/// [`TestReporter`](crate::reporter::TestReporter).
#[derive(Debug)]
pub struct TestEvent {
    /// The time at which the event was generated.
    pub timestamp: DateTime<Local>,

    /// The amount of time elapsed since the start of the test run.
    pub elapsed: Duration,

    /// The kind of test event this is.
    pub kind: TestEventKind,
}

/// The kind of test event this is.
///
/// Forms part of [`TestEvent`].
#[derive(Debug)]
pub enum TestEventKind {
    /// The test run started.
    RunStarted {
        /// The name of the suite.
        suite: String,

        /// The number of tests that will be run.
        test_count: usize,
    },

    /// A test was skipped.
    TestSkipped {
        /// The name of the test.
        name: String,

        /// The reason the test was skipped.
        reason: MismatchReason,
    },

    /// A test started running.
    TestStarted {
        /// The name of the test.
        name: String,
    },

    /// A test finished running.
    TestFinished {
        /// The name of the test.
        name: String,

        /// The verdict for the test.
        verdict: TestVerdict,

        /// The time it took for the test to run, including hooks and waiting for workers.
        time_taken: Duration,
    },

    /// The test run finished.
    RunFinished {
        /// Statistics for the run.
        run_stats: RunStats,

        /// The amount of time it took for the run to complete.
        elapsed: Duration,
    },
}

/// The outcome of a single test case.
#[derive(Debug)]
pub enum TestVerdict {
    /// The test passed, and every worker it created exited in time.
    Passed,

    /// The test failed in the way it declared it would.
    FailedExpectedly {
        /// The failure the test failed with.
        cause: FailureCause,
    },

    /// The test failed.
    FailedUnexpectedly(FailureCause),

    /// Workers created by the test were still alive after the shutdown timeout.
    ///
    /// This takes priority over every other outcome.
    FailedWithLeakedWorkers {
        /// The workers that were still alive.
        leaked: WorkersStillAlive,

        /// Any other failure the test produced.
        other: Option<FailureCause>,
    },
}

impl TestVerdict {
    /// Returns true if the test is considered successful.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Passed | Self::FailedExpectedly { .. })
    }

    /// Returns the failure behind this verdict, if any.
    pub fn cause(&self) -> Option<&FailureCause> {
        match self {
            Self::Passed => None,
            Self::FailedExpectedly { cause } | Self::FailedUnexpectedly(cause) => Some(cause),
            Self::FailedWithLeakedWorkers { other, .. } => other.as_ref(),
        }
    }
}

/// The reason a test case failed.
#[derive(Debug)]
#[non_exhaustive]
pub enum FailureCause {
    /// The test fixture couldn't be created.
    Instantiation(InstantiationError),

    /// The test takes parameters.
    UnsupportedSignature(UnsupportedSignatureError),

    /// The per-test setup hook failed.
    Setup(TestError),

    /// The test body panicked.
    BodyPanic(PanicFailure),

    /// The test body returned an error.
    BodyError(TestError),

    /// Exactly one worker created by the test panicked.
    Worker(WorkerFailure),

    /// Two or more workers created by the test panicked.
    Aggregate(AggregateAsyncFailure),

    /// The test declared an expected failure, but completed without one.
    MissingExpectedFailure(ExpectedFailure),

    /// The workers created by the test couldn't be watched.
    Watcher(WatcherError),
}

impl FailureCause {
    /// Returns true if this failure is the one `expected` describes.
    ///
    /// Failures raised by the runner itself, rather than by the test, never match.
    pub fn matches(&self, expected: &ExpectedFailure) -> bool {
        match self {
            Self::BodyPanic(failure) => expected.matches_panic(failure.message()),
            Self::Worker(failure) => expected.matches_panic(failure.message()),
            Self::BodyError(error) => expected.matches_error(&**error),
            Self::Aggregate(_) => matches!(expected, ExpectedFailure::AsyncAggregate),
            Self::Instantiation(_)
            | Self::UnsupportedSignature(_)
            | Self::Setup(_)
            | Self::MissingExpectedFailure(_)
            | Self::Watcher(_) => false,
        }
    }

    /// Returns true if this failure was raised asynchronously, by a worker created by the test.
    pub fn is_async(&self) -> bool {
        matches!(self, Self::Worker(_) | Self::Aggregate(_))
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instantiation(error) => write!(f, "{error}"),
            Self::UnsupportedSignature(error) => write!(f, "{error}"),
            Self::Setup(_) => write!(f, "per-test setup failed"),
            Self::BodyPanic(failure) => write!(f, "test {failure}"),
            Self::BodyError(error) => write!(f, "{error}"),
            Self::Worker(failure) => write!(f, "{}", failure.display_detail()),
            Self::Aggregate(failure) => write!(f, "{failure}"),
            Self::MissingExpectedFailure(expected) => {
                write!(f, "test was expected to fail with {expected}, but it didn't")
            }
            Self::Watcher(error) => write!(f, "{error}"),
        }
    }
}

impl error::Error for FailureCause {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Instantiation(error) => error.source(),
            Self::Setup(error) => Some(&**error),
            Self::BodyError(error) => error.source(),
            Self::Watcher(error) => error.source(),
            Self::UnsupportedSignature(_)
            | Self::BodyPanic(_)
            | Self::Worker(_)
            | Self::Aggregate(_)
            | Self::MissingExpectedFailure(_) => None,
        }
    }
}

/// Statistics for a test run.
#[derive(Copy, Clone, Default, Debug, Eq, PartialEq)]
pub struct RunStats {
    /// The total number of tests that were expected to be run at the beginning.
    pub initial_run_count: usize,

    /// The total number of tests that were actually run.
    pub final_run_count: usize,

    /// The number of tests that passed. Does not include `expected_failures`.
    pub passed: usize,

    /// The number of tests that failed the way they declared they would.
    pub expected_failures: usize,

    /// The number of tests that failed.
    pub failed: usize,

    /// The number of tests that leaked workers.
    pub leaked: usize,

    /// The number of tests that were skipped.
    pub skipped: usize,
}

impl RunStats {
    /// Returns true if this run is considered a success.
    ///
    /// A run is marked as failed if any of the following are true:
    /// * not every test that was expected to run did
    /// * any tests failed
    /// * any tests leaked workers
    pub fn is_success(&self) -> bool {
        if self.initial_run_count > self.final_run_count {
            return false;
        }
        if self.failed > 0 || self.leaked > 0 {
            return false;
        }
        true
    }

    /// Returns true if any tests failed or leaked workers.
    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.leaked > 0
    }

    pub(crate) fn on_test_finished(&mut self, verdict: &TestVerdict) {
        self.final_run_count += 1;
        match verdict {
            TestVerdict::Passed => self.passed += 1,
            TestVerdict::FailedExpectedly { .. } => self.expected_failures += 1,
            TestVerdict::FailedUnexpectedly(_) => self.failed += 1,
            TestVerdict::FailedWithLeakedWorkers { .. } => self.leaked += 1,
        }
    }
}
