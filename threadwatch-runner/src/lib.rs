// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for running a test case while watching the threads it spawns.
//!
//! For each test case, the runner takes a census of the live threads in the process, runs the
//! test body, and then waits (up to a grace period) for every thread that appeared during the
//! test to exit. Panics that brought a thread down are collected and reconciled with the test
//! body's own result into a single [`TestVerdict`](reporter::events::TestVerdict). Panics on
//! threads that are still running once the wait is over were caught, and are ignored.
//!
//! The basic flow is:
//!
//! 1. Build a [`TestSuite`](suite::TestSuite) out of [`TestCase`](suite::TestCase)s.
//! 2. Load a [`RunnerProfile`](config::RunnerProfile) from [`RunnerConfig`](config::RunnerConfig).
//! 3. Build a [`TestRunner`](runner::TestRunner) with a
//!    [`TestRunnerBuilder`](runner::TestRunnerBuilder) and call
//!    [`execute`](runner::TestRunner::execute), passing in a callback (for example, a
//!    [`TestReporter`](reporter::TestReporter)) that receives one event per state transition.
//!
//! Test cases are always executed one at a time: the panic hook used to collect worker failures
//! is process-wide.

pub mod config;
pub mod errors;
mod helpers;
pub mod reporter;
pub mod runner;
pub mod suite;
pub mod test_filter;
mod time;
pub mod watch;
pub mod worker;
