// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by threadwatch-runner.

use crate::{
    helpers::{DisplaySeconds, DisplayWorker, plural},
    suite::TestError,
    watch::FailureLog,
    worker::WorkerId,
};
use camino::Utf8PathBuf;
use config::ConfigError;
use std::{error, fmt, time::Duration};
use swrite::{SWrite, swrite};
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse threadwatch config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of [`ConfigParseError`] that occurred.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<ConfigError>),

    /// The default profile sets a value that must be non-zero to zero.
    #[error("`{key}` in profile `{profile}` must be non-zero")]
    ZeroDuration {
        /// The profile the key was set in.
        profile: String,

        /// The key that was set to zero.
        key: &'static str,
    },
}

/// An error which indicates that a profile was requested but not known to threadwatch.
#[derive(Clone, Debug, Error)]
#[error("profile `{profile}` not found (known profiles: {})", .all_profiles.join(", "))]
pub struct ProfileNotFound {
    profile: String,
    all_profiles: Vec<String>,
}

impl ProfileNotFound {
    pub(crate) fn new(
        profile: impl Into<String>,
        all_profiles: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut all_profiles: Vec<_> = all_profiles.into_iter().map(|s| s.into()).collect();
        all_profiles.sort_unstable();
        Self {
            profile: profile.into(),
            all_profiles,
        }
    }
}

/// An error that occurred while building a test filter.
#[derive(Clone, Debug, Error)]
#[error("error building test filter")]
pub struct TestFilterBuildError {
    #[from]
    error: aho_corasick::BuildError,
}

/// The test fixture could not be created.
#[derive(Debug, Error)]
#[error("failed to instantiate the test fixture")]
pub struct InstantiationError {
    #[source]
    source: TestError,
}

impl InstantiationError {
    pub(crate) fn new(source: TestError) -> Self {
        Self { source }
    }

    /// Returns the error returned by the fixture factory.
    pub fn inner(&self) -> &(dyn error::Error + Send + Sync + 'static) {
        &*self.source
    }
}

/// A test case declares parameters, but test cases are always invoked without arguments.
#[derive(Clone, Debug, Error)]
#[error(
    "test declares {params} {}, but no parameters on test methods are supported",
    if *.params == 1 { "parameter" } else { "parameters" },
)]
pub struct UnsupportedSignatureError {
    params: usize,
}

impl UnsupportedSignatureError {
    pub(crate) fn new(params: usize) -> Self {
        Self { params }
    }

    /// Returns the number of parameters the test declared.
    pub fn params(&self) -> usize {
        self.params
    }
}

/// A panic caught on the runner's own thread, raised by a test body or hook.
#[derive(Clone, Debug, Error)]
#[error("panicked: {message}")]
pub struct PanicFailure {
    message: String,
}

impl PanicFailure {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The panic message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A worker created by a test that was still alive once its shutdown timeout elapsed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LeakedWorker {
    /// The worker's ID.
    pub id: WorkerId,

    /// The worker's thread name, if known.
    pub name: Option<String>,
}

impl fmt::Display for LeakedWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        DisplayWorker {
            id: self.id,
            name: self.name.as_deref(),
        }
        .fmt(f)
    }
}

/// Workers created by a test were still alive after the shutdown timeout.
#[derive(Clone, Debug, Error)]
pub struct WorkersStillAlive {
    timeout: Duration,
    workers: Vec<LeakedWorker>,
}

impl WorkersStillAlive {
    pub(crate) fn new(timeout: Duration, workers: Vec<LeakedWorker>) -> Self {
        Self { timeout, workers }
    }

    /// The shutdown timeout that elapsed.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The workers that were still alive.
    pub fn workers(&self) -> &[LeakedWorker] {
        &self.workers
    }
}

impl fmt::Display for WorkersStillAlive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.workers.len();
        write!(
            f,
            "{count} {} {} still alive after shutdown timeout of {}: ",
            plural::workers_str(count),
            plural::is_are(count),
            DisplaySeconds(self.timeout),
        )?;
        for (idx, worker) in self.workers.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{worker}")?;
        }
        Ok(())
    }
}

/// Two or more workers created by a test panicked.
///
/// The display output includes every failure with its backtrace.
#[derive(Clone, Debug)]
pub struct AggregateAsyncFailure {
    failures: FailureLog,
}

impl AggregateAsyncFailure {
    pub(crate) fn new(failures: FailureLog) -> Self {
        Self { failures }
    }

    /// The individual failures, in the order they were recorded.
    pub fn failures(&self) -> &FailureLog {
        &self.failures
    }
}

impl fmt::Display for AggregateAsyncFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        swrite!(
            out,
            "{} {} panicked:",
            self.failures.len(),
            plural::workers_str(self.failures.len())
        );
        for failure in self.failures.iter() {
            swrite!(out, "\n\n{}", failure.display_detail());
        }
        f.write_str(&out)
    }
}

impl error::Error for AggregateAsyncFailure {}

/// An error that occurred while watching the workers of a test.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WatcherError {
    /// The census thread couldn't be spawned.
    #[error("failed to spawn the census thread")]
    Spawn(#[source] std::io::Error),

    /// The census thread panicked.
    #[error("the census thread panicked")]
    Panicked,
}

/// An error that occurs while writing an event.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WriteEventError {
    /// An error occurred while writing the event to the provided output.
    #[error("error writing to output")]
    Io(#[source] std::io::Error),
}

/// Displays an error and its chain of sources.
pub struct DisplayErrorChain<E> {
    error: E,
}

impl<E: error::Error> DisplayErrorChain<E> {
    /// Creates a new displayer for the given error.
    pub fn new(error: E) -> Self {
        Self { error }
    }
}

impl<E> fmt::Display for DisplayErrorChain<E>
where
    E: error::Error,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        let Some(mut cause) = self.error.source() else {
            return Ok(());
        };

        write!(f, "\n  caused by:")?;
        loop {
            let mut lines = String::new();
            swrite!(lines, "{cause}");
            let mut lines = lines.lines();
            if let Some(first) = lines.next() {
                write!(f, "\n  - {first}")?;
            }
            for line in lines {
                write!(f, "\n    {line}")?;
            }

            match cause.source() {
                Some(next) => cause = next,
                None => break,
            }
        }

        Ok(())
    }
}
