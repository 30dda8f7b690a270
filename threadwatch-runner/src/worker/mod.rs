// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identities of the threads ("workers") running in this process.
//!
//! A worker is identified by its OS thread ID. IDs are stable for a thread's lifetime, but the OS
//! may reuse them once a thread has exited. Reuse is not corrected for.

use std::{
    collections::BTreeSet,
    fmt,
    sync::{Mutex, PoisonError},
};

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        #[path = "linux.rs"]
        mod os;
    } else {
        #[path = "fallback.rs"]
        mod os;
    }
}

/// The identity of a worker thread.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct WorkerId(u64);

impl WorkerId {
    /// Returns the ID of the calling thread.
    pub fn current() -> Self {
        os::current_worker()
    }

    /// Creates a worker ID out of a raw OS thread ID.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw OS thread ID.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A set of workers known to exist at some point in time.
pub type WorkerSet = BTreeSet<WorkerId>;

/// Returns the workers that are alive in this process right now.
pub fn live_workers() -> WorkerSet {
    os::live_workers()
}

/// Returns true if the given worker has not exited yet.
pub fn is_alive(id: WorkerId) -> bool {
    os::is_alive(id)
}

/// Returns the name the OS knows the worker by, if any.
///
/// On Linux, names are truncated to 15 bytes.
pub fn thread_name(id: WorkerId) -> Option<String> {
    os::thread_name(id)
}

/// Returns true if this platform can enumerate the threads of the process.
///
/// If this is false, every census is empty apart from the calling thread, and no workers are
/// ever reported as created by a test.
pub fn census_supported() -> bool {
    os::CENSUS_SUPPORTED
}

static BACKGROUND_WORKERS: Mutex<WorkerSet> = Mutex::new(BTreeSet::new());

/// Marks the calling thread as a background worker.
///
/// Background workers are not expected to exit by the end of a test, so the runner does not wait
/// for them and never reports them as leaked. A panic on a background worker is still collected
/// if the worker has exited by the end of the test.
///
/// The marking lasts until the worker exits and [`prune_background`] runs.
pub fn mark_background() {
    mark_background_worker(WorkerId::current());
}

/// Marks the given worker as a background worker. See [`mark_background`].
pub fn mark_background_worker(id: WorkerId) {
    BACKGROUND_WORKERS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(id);
}

/// Returns true if the worker was marked as a background worker.
pub fn is_background(id: WorkerId) -> bool {
    BACKGROUND_WORKERS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .contains(&id)
}

/// Forgets background markings for workers that have exited.
///
/// Thread IDs can be reused once a thread exits, so a marking must not outlive its worker.
pub fn prune_background() {
    BACKGROUND_WORKERS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .retain(|&id| is_alive(id));
}
