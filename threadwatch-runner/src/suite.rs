// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test suites and the test cases within them.
//!
//! A [`TestSuite`] is built explicitly, as a table of [`TestCase`]s along with the hooks that run
//! around them. Each test case runs against a fresh fixture of type `F`, created by the suite's
//! factory.

use crate::errors::UnsupportedSignatureError;
use debug_ignore::DebugIgnore;
use std::{any, error, fmt, time::Duration};

/// The error type returned by test bodies and hooks.
pub type TestError = Box<dyn error::Error + Send + Sync>;

/// The result of running a test body or hook.
pub type TestResult = Result<(), TestError>;

pub(crate) type Factory<F> = dyn Fn() -> Result<F, TestError>;
pub(crate) type SuiteHook = dyn Fn() -> TestResult;
pub(crate) type FixtureHook<F> = dyn Fn(&mut F) -> TestResult;

/// A named, ordered collection of test cases sharing a fixture type.
pub struct TestSuite<F> {
    name: String,
    factory: Box<Factory<F>>,
    before_all: Option<Box<SuiteHook>>,
    after_all: Option<Box<SuiteHook>>,
    before_each: Option<Box<FixtureHook<F>>>,
    after_each: Option<Box<FixtureHook<F>>>,
    cases: Vec<TestCase<F>>,
}

impl<F> TestSuite<F> {
    /// Creates a new, empty suite.
    ///
    /// `factory` is called once per test case to create its fixture. If it fails, the test case
    /// fails with an [`InstantiationError`](crate::errors::InstantiationError).
    pub fn new(
        name: impl Into<String>,
        factory: impl Fn() -> Result<F, TestError> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            factory: Box::new(factory),
            before_all: None,
            after_all: None,
            before_each: None,
            after_each: None,
            cases: Vec::new(),
        }
    }

    /// Creates a new, empty suite whose fixtures are created with [`Default`].
    pub fn with_default_fixture(name: impl Into<String>) -> Self
    where
        F: Default,
    {
        Self::new(name, || Ok(F::default()))
    }

    /// Sets a hook to run once, before the first test case.
    pub fn before_all(mut self, hook: impl Fn() -> TestResult + 'static) -> Self {
        self.before_all = Some(Box::new(hook));
        self
    }

    /// Sets a hook to run once, after the last test case.
    pub fn after_all(mut self, hook: impl Fn() -> TestResult + 'static) -> Self {
        self.after_all = Some(Box::new(hook));
        self
    }

    /// Sets a hook to run against the fixture before every test body.
    pub fn before_each(mut self, hook: impl Fn(&mut F) -> TestResult + 'static) -> Self {
        self.before_each = Some(Box::new(hook));
        self
    }

    /// Sets a hook to run against the fixture after every test body, whether or not it passed.
    pub fn after_each(mut self, hook: impl Fn(&mut F) -> TestResult + 'static) -> Self {
        self.after_each = Some(Box::new(hook));
        self
    }

    /// Adds a test case to the end of the suite.
    pub fn test(mut self, case: TestCase<F>) -> Self {
        self.cases.push(case);
        self
    }

    /// Adds a test case to the end of the suite.
    pub fn add_test(&mut self, case: TestCase<F>) -> &mut Self {
        self.cases.push(case);
        self
    }

    /// Sorts test cases by name. Otherwise, test cases run in the order they were added.
    pub fn sort_by_name(&mut self) -> &mut Self {
        self.cases.sort_by(|a, b| a.name.cmp(&b.name));
        self
    }

    /// Returns the name of the suite.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the test cases in the order they will run.
    pub fn cases(&self) -> &[TestCase<F>] {
        &self.cases
    }

    pub(crate) fn instantiate(&self) -> Result<F, TestError> {
        (self.factory)()
    }

    pub(crate) fn before_all_hook(&self) -> Option<&SuiteHook> {
        self.before_all.as_deref()
    }

    pub(crate) fn after_all_hook(&self) -> Option<&SuiteHook> {
        self.after_all.as_deref()
    }

    pub(crate) fn before_each_hook(&self) -> Option<&FixtureHook<F>> {
        self.before_each.as_deref()
    }

    pub(crate) fn after_each_hook(&self) -> Option<&FixtureHook<F>> {
        self.after_each.as_deref()
    }
}

impl<F> fmt::Debug for TestSuite<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestSuite")
            .field("name", &self.name)
            .field("before_all", &self.before_all.is_some())
            .field("after_all", &self.after_all.is_some())
            .field("before_each", &self.before_each.is_some())
            .field("after_each", &self.after_each.is_some())
            .field("cases", &self.cases)
            .finish()
    }
}

/// A single test case within a [`TestSuite`].
pub struct TestCase<F> {
    name: String,
    body: Box<FixtureHook<F>>,
    expected_failure: Option<ExpectedFailure>,
    shutdown_timeout: Option<Duration>,
    ignored: bool,
    signature: TestSignature,
}

impl<F> TestCase<F> {
    /// Creates a new test case.
    pub fn new(name: impl Into<String>, body: impl Fn(&mut F) -> TestResult + 'static) -> Self {
        Self {
            name: name.into(),
            body: Box::new(body),
            expected_failure: None,
            shutdown_timeout: None,
            ignored: false,
            signature: TestSignature::NO_PARAMS,
        }
    }

    /// Declares that this test is expected to fail in the given way.
    pub fn expect_failure(mut self, expected: ExpectedFailure) -> Self {
        self.expected_failure = Some(expected);
        self
    }

    /// Overrides how long to wait for the workers this test creates to exit.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = Some(timeout);
        self
    }

    /// Marks this test as ignored. Ignored tests are skipped unless the filter asks for them.
    pub fn ignore(mut self) -> Self {
        self.ignored = true;
        self
    }

    /// Records the signature discovery found for this test.
    pub fn with_signature(mut self, signature: TestSignature) -> Self {
        self.signature = signature;
        self
    }

    /// Returns the name of the test.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the failure this test is expected to fail with, if any.
    pub fn expected_failure(&self) -> Option<&ExpectedFailure> {
        self.expected_failure.as_ref()
    }

    /// Returns the shutdown timeout override for this test, if any.
    pub fn shutdown_timeout(&self) -> Option<Duration> {
        self.shutdown_timeout
    }

    /// Returns true if this test is marked as ignored.
    pub fn is_ignored(&self) -> bool {
        self.ignored
    }

    /// Returns the signature of this test.
    pub fn signature(&self) -> TestSignature {
        self.signature
    }

    pub(crate) fn invoke(&self, fixture: &mut F) -> TestResult {
        (self.body)(fixture)
    }
}

impl<F> fmt::Debug for TestCase<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name)
            .field("expected_failure", &self.expected_failure)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("ignored", &self.ignored)
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

/// The signature of a test method, as seen during discovery.
///
/// Test bodies are always invoked without arguments.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct TestSignature {
    params: usize,
}

impl TestSignature {
    /// A test that takes no parameters.
    pub const NO_PARAMS: Self = Self { params: 0 };

    /// A test that takes `params` parameters.
    pub fn with_params(params: usize) -> Self {
        Self { params }
    }

    /// The number of parameters the test takes.
    pub fn params(self) -> usize {
        self.params
    }

    /// Returns an error if the test can't be invoked.
    pub fn check(self) -> Result<(), UnsupportedSignatureError> {
        match self.params {
            0 => Ok(()),
            params => Err(UnsupportedSignatureError::new(params)),
        }
    }
}

/// The way a test is expected to fail.
#[derive(Clone, Debug)]
pub enum ExpectedFailure {
    /// The test body panics, or exactly one worker created by the test panics.
    Panic {
        /// If set, the panic message must contain this string.
        message_contains: Option<String>,
    },

    /// The test body returns an error of a particular type.
    ///
    /// Created with [`ExpectedFailure::error`].
    Error {
        /// The name of the expected error type.
        type_name: &'static str,

        /// Returns true if the error is of the expected type.
        matches: DebugIgnore<fn(&(dyn error::Error + 'static)) -> bool>,
    },

    /// Two or more workers created by the test panic.
    AsyncAggregate,
}

impl ExpectedFailure {
    /// Expects a panic with any message.
    pub fn panic() -> Self {
        Self::Panic {
            message_contains: None,
        }
    }

    /// Expects a panic whose message contains `message`.
    pub fn panic_containing(message: impl Into<String>) -> Self {
        Self::Panic {
            message_contains: Some(message.into()),
        }
    }

    /// Expects the test body to return an error of type `E`.
    pub fn error<E: error::Error + 'static>() -> Self {
        Self::Error {
            type_name: any::type_name::<E>(),
            matches: DebugIgnore(error_is::<E>),
        }
    }

    pub(crate) fn matches_panic(&self, message: &str) -> bool {
        match self {
            Self::Panic { message_contains } => message_contains
                .as_deref()
                .is_none_or(|expected| message.contains(expected)),
            Self::Error { .. } | Self::AsyncAggregate => false,
        }
    }

    pub(crate) fn matches_error(&self, error: &(dyn error::Error + 'static)) -> bool {
        match self {
            Self::Error { matches, .. } => (matches.0)(error),
            Self::Panic { .. } | Self::AsyncAggregate => false,
        }
    }
}

impl fmt::Display for ExpectedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Panic {
                message_contains: None,
            } => write!(f, "a panic"),
            Self::Panic {
                message_contains: Some(message),
            } => write!(f, "a panic containing `{message}`"),
            Self::Error { type_name, .. } => write!(f, "an error of type `{type_name}`"),
            Self::AsyncAggregate => write!(f, "panics on two or more workers"),
        }
    }
}

fn error_is<E: error::Error + 'static>(error: &(dyn error::Error + 'static)) -> bool {
    error.is::<E>()
}
