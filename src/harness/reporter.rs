//! Narrow test-reporting capability
//!
//! Wait helpers never depend on a test framework. They take a
//! [`TestReporter`], which exposes only what they need: the test name,
//! logging, and the two ways of failing.

use crate::diagnostics::FailureSummary;
use crate::rollout::RolloutError;
use crate::wait::WaitError;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info};

/// What a wait helper may do to the running test
pub trait TestReporter: Send + Sync {
    fn name(&self) -> &str;

    fn logf(&self, args: fmt::Arguments<'_>);

    /// Mark the test failed and keep running
    fn fail(&self);

    /// Mark the test failed and stop it
    fn fail_now(&self) -> !;
}

/// Reporter for `#[tokio::test]` functions
///
/// Logs through `tracing`; `fail_now` panics, which is how a Rust test fails.
#[derive(Debug)]
pub struct TracingReporter {
    name: String,
    failed: AtomicBool,
}

impl TracingReporter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failed: AtomicBool::new(false),
        }
    }

    /// Whether `fail` or `fail_now` was called
    pub fn failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }
}

impl TestReporter for TracingReporter {
    fn name(&self) -> &str {
        &self.name
    }

    fn logf(&self, args: fmt::Arguments<'_>) {
        info!(test = %self.name, "{}", args);
    }

    fn fail(&self) {
        self.failed.store(true, Ordering::SeqCst);
        error!(test = %self.name, "test marked as failed");
    }

    fn fail_now(&self) -> ! {
        self.failed.store(true, Ordering::SeqCst);
        panic!("test {} failed", self.name);
    }
}

/// Errors that can be rendered for a failing test
pub trait Failure: fmt::Display {
    fn summary(&self) -> String;
}

impl Failure for WaitError {
    fn summary(&self) -> String {
        FailureSummary::for_wait(self).to_string()
    }
}

impl Failure for RolloutError {
    fn summary(&self) -> String {
        FailureSummary::for_rollout(self).to_string()
    }
}

/// Turn a failed wait into a failed test
pub trait RequireExt<T> {
    /// Return the value, or log the failure summary and stop the test
    fn require(self, t: &dyn TestReporter) -> T;

    /// Return the value, or log the failure summary, mark the test failed
    /// and continue
    fn check(self, t: &dyn TestReporter) -> Option<T>;
}

impl<T, E: Failure> RequireExt<T> for Result<T, E> {
    fn require(self, t: &dyn TestReporter) -> T {
        match self {
            Ok(value) => value,
            Err(e) => {
                t.logf(format_args!("{}", e.summary()));
                t.fail_now()
            }
        }
    }

    fn check(self, t: &dyn TestReporter) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(e) => {
                t.logf(format_args!("{}", e.summary()));
                t.fail();
                None
            }
        }
    }
}
