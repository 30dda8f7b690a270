// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Filtering tests based on user-specified parameters.
//!
//! The main structure in this module is [`TestFilter`], which is created by a
//! [`TestFilterBuilder`].

use crate::{errors::TestFilterBuildError, suite::TestCase};
use aho_corasick::AhoCorasick;
use std::fmt;

/// Whether to run ignored tests.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum RunIgnored {
    /// Only run tests that aren't ignored.
    ///
    /// This is the default.
    #[default]
    Default,

    /// Only run tests that are ignored.
    Only,

    /// Run both ignored and non-ignored tests.
    All,
}

impl fmt::Display for RunIgnored {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunIgnored::Default => write!(f, "default"),
            RunIgnored::Only => write!(f, "only"),
            RunIgnored::All => write!(f, "all"),
        }
    }
}

/// Builds a [`TestFilter`].
#[derive(Clone, Debug, Default)]
pub struct TestFilterBuilder {
    run_ignored: RunIgnored,
    patterns: Vec<String>,
    skip_patterns: Vec<String>,
}

impl TestFilterBuilder {
    /// Creates a new builder from the given substring patterns.
    ///
    /// An empty list of patterns matches all tests.
    pub fn new(
        run_ignored: RunIgnored,
        patterns: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            run_ignored,
            patterns: patterns.into_iter().map(Into::into).collect(),
            skip_patterns: Vec::new(),
        }
    }

    /// Adds a substring pattern to the set of patterns.
    pub fn add_pattern(&mut self, pattern: impl Into<String>) -> &mut Self {
        self.patterns.push(pattern.into());
        self
    }

    /// Adds a skip pattern: tests whose names contain it never match.
    pub fn add_skip_pattern(&mut self, pattern: impl Into<String>) -> &mut Self {
        self.skip_patterns.push(pattern.into());
        self
    }

    /// Builds the filter.
    pub fn build(&self) -> Result<TestFilter, TestFilterBuildError> {
        Ok(TestFilter {
            run_ignored: self.run_ignored,
            name_match: NameMatch::new(&self.patterns)?,
            skip_match: NameMatch::new(&self.skip_patterns)?,
        })
    }
}

/// A filter for tests.
#[derive(Clone, Debug)]
pub struct TestFilter {
    run_ignored: RunIgnored,
    name_match: NameMatch,
    skip_match: NameMatch,
}

#[derive(Clone, Debug)]
enum NameMatch {
    Empty,
    MatchSet(Box<AhoCorasick>),
}

impl NameMatch {
    fn new(patterns: &[String]) -> Result<Self, TestFilterBuildError> {
        if patterns.is_empty() {
            Ok(Self::Empty)
        } else {
            Ok(Self::MatchSet(Box::new(AhoCorasick::new(patterns)?)))
        }
    }
}

impl TestFilter {
    /// Creates a new `TestFilter` that matches any test by name.
    pub fn any(run_ignored: RunIgnored) -> Self {
        Self {
            run_ignored,
            name_match: NameMatch::Empty,
            skip_match: NameMatch::Empty,
        }
    }

    /// Returns the run-ignored setting for this filter.
    pub fn run_ignored(&self) -> RunIgnored {
        self.run_ignored
    }

    /// Returns an enum describing whether the test case matches this filter.
    pub fn filter_match<F>(&self, case: &TestCase<F>) -> FilterMatch {
        self.filter_name_match(case.name(), case.is_ignored())
    }

    /// Returns an enum describing whether a test with this name matches this filter.
    pub fn filter_name_match(&self, test_name: &str, ignored: bool) -> FilterMatch {
        match (self.run_ignored, ignored) {
            (RunIgnored::Only, false) | (RunIgnored::Default, true) => {
                return FilterMatch::Mismatch {
                    reason: MismatchReason::Ignored,
                };
            }
            _ => {}
        }

        let string_match = match &self.name_match {
            NameMatch::Empty => true,
            NameMatch::MatchSet(set) => set.is_match(test_name),
        };
        let skipped = match &self.skip_match {
            NameMatch::Empty => false,
            NameMatch::MatchSet(set) => set.is_match(test_name),
        };
        if string_match && !skipped {
            FilterMatch::Matches
        } else {
            FilterMatch::Mismatch {
                reason: MismatchReason::String,
            }
        }
    }
}

impl Default for TestFilter {
    fn default() -> Self {
        Self::any(RunIgnored::Default)
    }
}

/// An enum describing whether a test matches a filter.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FilterMatch {
    /// This test matches this filter.
    Matches,

    /// This test does not match this filter.
    ///
    /// The `MismatchReason` inside describes the reason this filter isn't matched.
    Mismatch {
        /// The reason the test doesn't match.
        reason: MismatchReason,
    },
}

impl FilterMatch {
    /// Returns true if the filter matches.
    pub fn is_match(&self) -> bool {
        matches!(self, FilterMatch::Matches)
    }
}

/// The reason for why a test doesn't match a filter.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum MismatchReason {
    /// This test does not match the run-ignored option in the filter.
    Ignored,

    /// This test does not match the provided string filters.
    String,
}

impl fmt::Display for MismatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MismatchReason::Ignored => write!(f, "does not match the run-ignored option"),
            MismatchReason::String => write!(f, "does not match the provided string filters"),
        }
    }
}
