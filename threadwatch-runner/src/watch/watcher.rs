// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    FailureCollector, FailureLog, WorkerCensus,
    collector::{PanicHookGuard, PanicHookOptions},
};
use crate::{
    errors::WatcherError,
    worker::{self, WorkerId, WorkerSet},
};
use std::{
    sync::{
        Arc, Once,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};
use tracing::{debug, trace, warn};

/// Settings used to arm a [`WorkerDiffWatcher`].
#[derive(Copy, Clone, Debug)]
pub struct WatchSettings {
    /// How long the census loop sleeps between polls.
    pub census_poll_interval: Duration,

    /// Whether to capture a backtrace for each worker panic.
    pub capture_backtraces: bool,

    /// Whether to also pass worker panics to the previously installed panic hook.
    pub forward_panics: bool,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            census_poll_interval: Duration::from_millis(1),
            capture_backtraces: true,
            forward_panics: true,
        }
    }
}

/// Accumulates the workers that appear while it runs.
///
/// The baseline census is taken on construction. [`run`](Self::run) then polls the census until
/// cancelled, and every worker observed that wasn't part of the baseline ends up in
/// [`created_workers`](Self::created_workers).
///
/// Most callers want [`arm`](Self::arm), which runs the loop on a dedicated thread and collects
/// worker panics while doing so.
#[derive(Debug)]
pub struct WorkerDiffWatcher {
    census: WorkerCensus,
    created: WorkerSet,
    poll_interval: Duration,
}

impl WorkerDiffWatcher {
    /// Creates a new watcher, taking a baseline census.
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            census: WorkerCensus::new(),
            created: WorkerSet::new(),
            poll_interval,
        }
    }

    /// Polls the census until `cancel` is set.
    ///
    /// The calling thread is never reported as created. One last poll is made after cancellation
    /// is observed.
    pub fn run(&mut self, cancel: &AtomicBool) {
        self.census.exclude(WorkerId::current());

        loop {
            let cancelled = cancel.load(Ordering::Acquire);
            let new = self.census.diff(&WorkerCensus::snapshot());
            if !new.is_empty() {
                trace!(?new, "observed new workers");
                self.created.extend(new);
            }
            if cancelled {
                break;
            }
            thread::sleep(self.poll_interval);
        }
    }

    /// Returns the workers first observed by [`run`](Self::run).
    pub fn created_workers(&self) -> &WorkerSet {
        &self.created
    }

    /// Starts the census loop on a new thread, and starts collecting worker panics.
    ///
    /// Panics on the calling thread and on the census thread are not collected.
    pub fn arm(mut self, settings: &WatchSettings) -> Result<ArmedWatcher, WatcherError> {
        warn_if_census_unsupported();

        let collector = Arc::new(FailureCollector::new([WorkerId::current()]));
        let hook = PanicHookGuard::install(
            collector.clone(),
            PanicHookOptions {
                capture_backtraces: settings.capture_backtraces,
                forward_panics: settings.forward_panics,
            },
        );
        self.poll_interval = settings.census_poll_interval;

        let cancel = Arc::new(AtomicBool::new(false));
        let handle = {
            let collector = collector.clone();
            let cancel = cancel.clone();
            thread::Builder::new()
                .name("threadwatch-census".to_owned())
                .spawn(move || {
                    collector.exclude(WorkerId::current());
                    self.run(&cancel);
                    self
                })
                .map_err(WatcherError::Spawn)?
        };
        debug!("watcher armed");

        Ok(ArmedWatcher {
            cancel,
            handle,
            collector,
            hook,
        })
    }
}

/// A watcher whose census loop is running.
///
/// Returned by [`WorkerDiffWatcher::arm`].
#[derive(Debug)]
pub struct ArmedWatcher {
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<WorkerDiffWatcher>,
    collector: Arc<FailureCollector>,
    hook: PanicHookGuard,
}

impl ArmedWatcher {
    /// Signals the census loop to stop, and waits for it to exit.
    ///
    /// Worker panics keep being collected until [`StoppedWatcher::finish`] is called.
    pub fn stop(self) -> Result<StoppedWatcher, WatcherError> {
        self.cancel.store(true, Ordering::Release);
        let watcher = self.handle.join().map_err(|_| WatcherError::Panicked)?;
        debug!(created = watcher.created.len(), "watcher disarmed");

        Ok(StoppedWatcher {
            created: watcher.created,
            collector: self.collector,
            hook: self.hook,
        })
    }
}

/// A watcher whose census loop has exited.
///
/// Returned by [`ArmedWatcher::stop`].
#[derive(Debug)]
pub struct StoppedWatcher {
    created: WorkerSet,
    collector: Arc<FailureCollector>,
    hook: PanicHookGuard,
}

impl StoppedWatcher {
    /// Returns the workers created while the census loop was running.
    pub fn created_workers(&self) -> &WorkerSet {
        &self.created
    }

    /// Returns the worker failures collected so far.
    pub fn collected_failures(&self) -> FailureLog {
        self.collector.snapshot()
    }

    /// Stops collecting worker panics, restoring the previous panic hook, and returns the
    /// failures collected.
    pub fn finish(self) -> FailureLog {
        // Once the hook has been replaced, no further records can happen.
        drop(self.hook);
        self.collector.snapshot()
    }
}

fn warn_if_census_unsupported() {
    static WARN_ONCE: Once = Once::new();
    if !worker::census_supported() {
        WARN_ONCE.call_once(|| {
            warn!("this platform can't enumerate threads: created workers won't be detected");
        });
    }
}
