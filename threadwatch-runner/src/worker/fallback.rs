// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Platforms without a way to enumerate the threads of a process.
//!
//! Worker IDs are handed out per thread on first use, and the census only ever contains the
//! calling thread.

use super::{WorkerId, WorkerSet};
use std::sync::atomic::{AtomicU64, Ordering};

pub(super) const CENSUS_SUPPORTED: bool = false;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT_ID: WorkerId = WorkerId::from_raw(NEXT_ID.fetch_add(1, Ordering::Relaxed));
}

pub(super) fn current_worker() -> WorkerId {
    CURRENT_ID.with(|id| *id)
}

pub(super) fn live_workers() -> WorkerSet {
    [current_worker()].into_iter().collect()
}

pub(super) fn is_alive(id: WorkerId) -> bool {
    id == current_worker()
}

pub(super) fn thread_name(id: WorkerId) -> Option<String> {
    if id == current_worker() {
        std::thread::current().name().map(str::to_owned)
    } else {
        None
    }
}
