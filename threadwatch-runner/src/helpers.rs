// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! General support code for threadwatch-runner.

use std::{any::Any, fmt, time::Duration};

/// Utilities for pluralizing various words based on count or plurality.
pub(crate) mod plural {
    /// Returns "test" if `count` is 1, otherwise "tests".
    pub(crate) fn tests_str(count: usize) -> &'static str {
        if count == 1 { "test" } else { "tests" }
    }

    /// Returns "worker" if `count` is 1, otherwise "workers".
    pub(crate) fn workers_str(count: usize) -> &'static str {
        if count == 1 { "worker" } else { "workers" }
    }

    /// Returns "is" if `count` is 1, otherwise "are".
    pub(crate) fn is_are(count: usize) -> &'static str {
        if count == 1 { "is" } else { "are" }
    }
}

/// Extracts the message out of a panic payload.
///
/// `panic!` with a literal produces a `&'static str`, and with format arguments a `String`.
/// Anything else came from `panic_any`.
pub(crate) fn panic_payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "Box<dyn Any>".to_owned()
    }
}

/// Displays a duration in seconds with millisecond precision.
pub(crate) struct DisplaySeconds(pub(crate) Duration);

impl fmt::Display for DisplaySeconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.0.as_secs_f64())
    }
}

/// Displays a worker ID along with its thread name, if known.
pub(crate) struct DisplayWorker<'a> {
    pub(crate) id: crate::worker::WorkerId,
    pub(crate) name: Option<&'a str>,
}

impl fmt::Display for DisplayWorker<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name {
            Some(name) => write!(f, "worker {} ('{}')", self.id, name),
            None => write!(f, "worker {}", self.id),
        }
    }
}
