// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turning everything observed while running a test case into a single verdict.

use crate::{
    errors::{AggregateAsyncFailure, WorkersStillAlive},
    reporter::events::{FailureCause, TestVerdict},
    suite::ExpectedFailure,
    watch::FailureLog,
};
use tracing::debug;

/// Everything observed while running the body of a test case.
#[derive(Debug, Default)]
pub(super) struct TestOutcome {
    /// The failure raised synchronously, on the runner's thread.
    pub(super) body_failure: Option<FailureCause>,

    /// Panics raised by workers created by the test.
    pub(super) worker_failures: FailureLog,

    /// Workers still alive after the shutdown timeout.
    pub(super) leaked: Option<WorkersStillAlive>,
}

/// Reconciles a test's outcome with the way it was expected to fail.
///
/// Leaked workers take priority over everything else. Otherwise, a synchronous failure takes
/// precedence over failures raised by workers, and a single worker failure is reported as-is
/// rather than being wrapped.
pub(super) fn reconcile(outcome: TestOutcome, expected: Option<&ExpectedFailure>) -> TestVerdict {
    let TestOutcome {
        body_failure,
        worker_failures,
        leaked,
    } = outcome;

    let async_failure = match worker_failures.into_single() {
        Ok(failure) => Some(FailureCause::Worker(failure)),
        Err(log) if log.is_empty() => None,
        Err(log) => Some(FailureCause::Aggregate(AggregateAsyncFailure::new(log))),
    };

    let cause = match (body_failure, async_failure) {
        (Some(body_failure), Some(async_failure)) => {
            debug!(
                suppressed = %async_failure,
                "test body failed, not reporting worker failures"
            );
            Some(body_failure)
        }
        (Some(failure), None) | (None, Some(failure)) => Some(failure),
        (None, None) => None,
    };

    if let Some(leaked) = leaked {
        return TestVerdict::FailedWithLeakedWorkers {
            leaked,
            other: cause,
        };
    }

    match (cause, expected) {
        (Some(cause), Some(expected)) if cause.matches(expected) => {
            TestVerdict::FailedExpectedly { cause }
        }
        (Some(cause), _) => TestVerdict::FailedUnexpectedly(cause),
        (None, Some(expected)) => {
            TestVerdict::FailedUnexpectedly(FailureCause::MissingExpectedFailure(expected.clone()))
        }
        (None, None) => TestVerdict::Passed,
    }
}
