// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Watching the workers a test creates.
//!
//! The pieces, leaves first:
//!
//! * [`WorkerCensus`] keeps a baseline of known workers and reports the new ones in later
//!   snapshots.
//! * [`FailureCollector`] records the first panic of each worker, fed by a panic hook that is
//!   installed for as long as a watcher is armed.
//! * [`WorkerDiffWatcher`] polls the census on a dedicated thread and accumulates every worker
//!   created while it runs.

mod census;
mod collector;
mod watcher;

pub use census::*;
pub use collector::*;
pub use watcher::*;
