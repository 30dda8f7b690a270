// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::worker::{self, WorkerId, WorkerSet};

/// Bookkeeping for the set of workers known to exist.
///
/// A census starts out with a baseline snapshot. Each call to [`diff`](Self::diff) returns the
/// workers that aren't part of the baseline yet, and folds them into it: a worker is reported at
/// most once.
#[derive(Clone, Debug)]
pub struct WorkerCensus {
    baseline: WorkerSet,
}

impl WorkerCensus {
    /// Creates a new census, using the workers alive right now as the baseline.
    pub fn new() -> Self {
        Self::with_baseline(Self::snapshot())
    }

    /// Creates a new census with the given baseline.
    pub fn with_baseline(baseline: WorkerSet) -> Self {
        Self { baseline }
    }

    /// Returns the workers alive in this process right now.
    pub fn snapshot() -> WorkerSet {
        worker::live_workers()
    }

    /// Returns the workers in `current` that aren't in the baseline, and adds them to it.
    pub fn diff(&mut self, current: &WorkerSet) -> WorkerSet {
        let new: WorkerSet = current.difference(&self.baseline).copied().collect();
        self.baseline.extend(new.iter().copied());
        new
    }

    /// Adds a worker to the baseline without reporting it.
    pub fn exclude(&mut self, id: WorkerId) {
        self.baseline.insert(id);
    }

    /// Returns the workers known so far.
    pub fn baseline(&self) -> &WorkerSet {
        &self.baseline
    }
}

impl Default for WorkerCensus {
    fn default() -> Self {
        Self::new()
    }
}
