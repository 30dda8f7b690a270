// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    helpers::{DisplayWorker, panic_payload_message},
    worker::{WorkerId, WorkerSet},
};
use debug_ignore::DebugIgnore;
use indexmap::{IndexMap, map::Entry};
use std::{
    backtrace::{Backtrace, BacktraceStatus},
    fmt,
    panic::{self, PanicHookInfo},
    sync::{Arc, Mutex, PoisonError},
};
use tracing::debug;

/// A panic raised on a worker thread.
#[derive(Clone, Debug)]
pub struct WorkerFailure {
    worker: WorkerId,
    thread_name: Option<String>,
    message: String,
    location: Option<String>,
    backtrace: Option<Arc<Backtrace>>,
}

impl WorkerFailure {
    /// Creates a new failure for a worker.
    pub fn new(worker: WorkerId, thread_name: Option<String>, message: impl Into<String>) -> Self {
        Self {
            worker,
            thread_name,
            message: message.into(),
            location: None,
            backtrace: None,
        }
    }

    pub(crate) fn from_panic(
        worker: WorkerId,
        info: &PanicHookInfo<'_>,
        capture_backtrace: bool,
    ) -> Self {
        Self {
            worker,
            thread_name: std::thread::current().name().map(str::to_owned),
            message: panic_payload_message(info.payload()),
            location: info.location().map(|location| location.to_string()),
            backtrace: capture_backtrace.then(|| Arc::new(Backtrace::force_capture())),
        }
    }

    /// The worker that panicked.
    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    /// The name of the worker thread, if it had one.
    pub fn thread_name(&self) -> Option<&str> {
        self.thread_name.as_deref()
    }

    /// The panic message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The source location of the panic, as `file:line:column`.
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// The backtrace captured when the panic was raised, if backtrace capture was enabled.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        self.backtrace.as_deref()
    }

    /// Returns a displayer that also includes the backtrace.
    pub fn display_detail(&self) -> WorkerFailureDetail<'_> {
        WorkerFailureDetail { failure: self }
    }

    fn display_worker(&self) -> DisplayWorker<'_> {
        DisplayWorker {
            id: self.worker,
            name: self.thread_name.as_deref(),
        }
    }
}

impl fmt::Display for WorkerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} panicked", self.display_worker())?;
        if let Some(location) = &self.location {
            write!(f, " at {location}")?;
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for WorkerFailure {}

/// Displays a [`WorkerFailure`] along with its backtrace.
///
/// Returned by [`WorkerFailure::display_detail`].
pub struct WorkerFailureDetail<'a> {
    failure: &'a WorkerFailure,
}

impl fmt::Display for WorkerFailureDetail<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.failure)?;
        match &self.failure.backtrace {
            Some(backtrace) if backtrace.status() == BacktraceStatus::Captured => {
                write!(f, "stack backtrace:\n{backtrace}")
            }
            _ => write!(f, "(no backtrace captured)"),
        }
    }
}

/// Worker failures keyed by worker, in the order they were recorded.
///
/// Each worker has at most one entry: the first failure recorded for it.
#[derive(Clone, Debug, Default)]
pub struct FailureLog {
    failures: IndexMap<WorkerId, WorkerFailure>,
}

impl FailureLog {
    /// Creates a new, empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a failure, returning false if the worker already has one.
    pub fn insert(&mut self, failure: WorkerFailure) -> bool {
        match self.failures.entry(failure.worker) {
            Entry::Vacant(entry) => {
                entry.insert(failure);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    /// Returns the failure recorded for the given worker.
    pub fn get(&self, worker: WorkerId) -> Option<&WorkerFailure> {
        self.failures.get(&worker)
    }

    /// Returns the number of workers that failed.
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Returns true if no failures were recorded.
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Iterates over failures in the order they were recorded.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &WorkerFailure> + '_ {
        self.failures.values()
    }

    /// Returns the workers that failed.
    pub fn workers(&self) -> WorkerSet {
        self.failures.keys().copied().collect()
    }

    /// Keeps only the failures for which the predicate returns true, preserving their order.
    pub fn retain(&mut self, mut keep: impl FnMut(&WorkerFailure) -> bool) {
        self.failures.retain(|_, failure| keep(failure));
    }

    /// Returns the only failure in the log, or the log itself if it has zero or several.
    pub(crate) fn into_single(mut self) -> Result<WorkerFailure, Self> {
        if self.failures.len() == 1 {
            let (_, failure) = self.failures.pop().expect("checked len == 1");
            Ok(failure)
        } else {
            Err(self)
        }
    }
}

impl IntoIterator for FailureLog {
    type Item = WorkerFailure;
    type IntoIter = indexmap::map::IntoValues<WorkerId, WorkerFailure>;

    fn into_iter(self) -> Self::IntoIter {
        self.failures.into_values()
    }
}

impl FromIterator<WorkerFailure> for FailureLog {
    fn from_iter<T: IntoIterator<Item = WorkerFailure>>(iter: T) -> Self {
        let mut log = Self::new();
        for failure in iter {
            log.insert(failure);
        }
        log
    }
}

/// Records worker failures as they happen.
///
/// Written to by arbitrary threads through the panic hook, and read once watching is over.
#[derive(Debug, Default)]
pub struct FailureCollector {
    excluded: Mutex<WorkerSet>,
    log: Mutex<FailureLog>,
}

impl FailureCollector {
    /// Creates a new collector that ignores failures on the given workers.
    pub fn new(excluded: impl IntoIterator<Item = WorkerId>) -> Self {
        Self {
            excluded: Mutex::new(excluded.into_iter().collect()),
            log: Mutex::new(FailureLog::new()),
        }
    }

    /// Ignores failures on this worker from now on.
    pub fn exclude(&self, worker: WorkerId) {
        self.excluded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(worker);
    }

    /// Returns true if failures on this worker are ignored.
    pub fn is_excluded(&self, worker: WorkerId) -> bool {
        self.excluded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&worker)
    }

    /// Records a failure.
    ///
    /// Returns false if the worker is excluded or already has a failure recorded.
    pub fn record(&self, failure: WorkerFailure) -> bool {
        if self.is_excluded(failure.worker) {
            return false;
        }
        // The hook must not panic, so poisoning is ignored here and elsewhere.
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(failure)
    }

    /// Returns a copy of the failures recorded so far.
    pub fn snapshot(&self) -> FailureLog {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Options for the panic hook installed while watching.
#[derive(Copy, Clone, Debug)]
pub(crate) struct PanicHookOptions {
    pub(crate) capture_backtraces: bool,
    pub(crate) forward_panics: bool,
}

type PanicHook = dyn Fn(&PanicHookInfo<'_>) + Sync + Send + 'static;

/// Routes panics to a [`FailureCollector`] for as long as it is alive.
///
/// The previously installed hook is put back on drop.
#[derive(Debug)]
pub(crate) struct PanicHookGuard {
    previous: Option<DebugIgnore<Arc<PanicHook>>>,
}

impl PanicHookGuard {
    pub(crate) fn install(collector: Arc<FailureCollector>, options: PanicHookOptions) -> Self {
        let previous: Arc<PanicHook> = Arc::from(panic::take_hook());
        let forward_to = previous.clone();

        panic::set_hook(Box::new(move |info| {
            let worker = WorkerId::current();
            if collector.is_excluded(worker) {
                // Panics on excluded workers are handled elsewhere.
                forward_to(info);
                return;
            }

            let failure = WorkerFailure::from_panic(worker, info, options.capture_backtraces);
            if collector.record(failure) {
                debug!(%worker, "recorded worker panic");
            }
            if options.forward_panics {
                forward_to(info);
            }
        }));

        Self {
            previous: Some(DebugIgnore(previous)),
        }
    }
}

impl Drop for PanicHookGuard {
    fn drop(&mut self) {
        // The hook can't be changed from a panicking thread.
        if std::thread::panicking() {
            return;
        }
        if let Some(DebugIgnore(previous)) = self.previous.take() {
            drop(panic::take_hook());
            panic::set_hook(Box::new(move |info| previous(info)));
        }
    }
}
