// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the test runner.
//!
//! The census observes every thread in this process, so these tests use libtest-mimic and are
//! forced onto a single test thread. With libtest's default harness, the threads running other
//! tests would be seen as workers created by the test under observation.

use libtest_mimic::Arguments;
use std::process::ExitCode;

mod fixtures;
mod reporting;
mod verdicts;

fn main() -> ExitCode {
    let mut args = Arguments::from_args();
    args.test_threads = Some(1);

    fixtures::init_tracing();

    let tests = [verdicts::TESTS, hooks::TESTS, workers::TESTS, reporting::TESTS]
        .into_iter()
        .flatten()
        .map(|&(name, test)| fixtures::trial(name, test))
        .collect();

    libtest_mimic::run(&args, tests).exit_code()
}
