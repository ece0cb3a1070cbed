//! Failure summaries for test output
//!
//! Renders a failed wait or rollout as one block: what failed, what was
//! already done, the last observed state, recent events, and the `kubectl`
//! commands to dig further.

use crate::resource::{ResourceKind, ResourceRef};
use crate::rollout::{RolloutError, StageReport};
use crate::wait::{WaitError, WaitReport};
use std::fmt;

const LINE_WIDTH: usize = 80;
const HEAVY_LINE: &str = "━";
const LIGHT_LINE: &str = "─";
const MAX_MESSAGE_LEN: usize = 60;

/// Everything known about a failed wait or rollout
#[derive(Debug)]
pub struct FailureSummary<'a> {
    /// `stage N (label)` for rollouts
    stage: Option<(usize, &'a str)>,
    completed: &'a [StageReport],
    error: &'a WaitError,
}

impl<'a> FailureSummary<'a> {
    pub fn for_wait(error: &'a WaitError) -> Self {
        Self {
            stage: None,
            completed: &[],
            error,
        }
    }

    pub fn for_rollout(error: &'a RolloutError) -> Self {
        Self {
            stage: Some((error.index, error.label.as_str())),
            completed: &error.completed,
            error: &error.source,
        }
    }

    fn resource(&self) -> Option<&ResourceRef> {
        match self.error {
            WaitError::TimedOut(report) | WaitError::PermanentFailure(report) => {
                Some(&report.resource)
            }
            WaitError::Transient { resource, .. } => Some(resource),
            WaitError::Configuration(_) => None,
        }
    }

    fn heavy_line() -> String {
        HEAVY_LINE.repeat(LINE_WIDTH)
    }

    fn section_header(title: &str) -> String {
        let title_with_spaces = format!(" {} ", title);
        let remaining = LINE_WIDTH.saturating_sub(title_with_spaces.len() + 3);
        format!(
            "{}{}{}",
            LIGHT_LINE.repeat(3),
            title_with_spaces,
            LIGHT_LINE.repeat(remaining)
        )
    }

    fn headline(&self) -> &'static str {
        match self.error {
            WaitError::TimedOut(_) if self.error.is_cancelled() => "WAIT CANCELLED",
            WaitError::TimedOut(_) => "WAIT TIMED OUT",
            WaitError::PermanentFailure(_) => "RESOURCE FAILED",
            WaitError::Transient { .. } => "RESOURCE UNOBSERVABLE",
            WaitError::Configuration(_) => "INVALID WAIT CONFIGURATION",
        }
    }

    fn write_report(f: &mut fmt::Formatter<'_>, report: &WaitReport) -> fmt::Result {
        writeln!(f, "  Condition:  {}", report.condition)?;
        if let Some(reason) = &report.reason {
            writeln!(f, "  Reason:     {}", reason)?;
        }
        if let Some(cause) = &report.cause {
            writeln!(f, "  Cause:      {}", cause)?;
        }
        writeln!(f, "  Last state: {}", report.last_state_description())?;
        writeln!(
            f,
            "  Elapsed:    {:?} of {:?}",
            report.elapsed, report.timeout
        )?;

        if !report.events.is_empty() {
            writeln!(f)?;
            writeln!(
                f,
                "{}",
                Self::section_header(&format!("Events ({})", report.events.len()))
            )?;
            writeln!(f)?;
            for event in &report.events {
                let ts = event.timestamp.as_deref().unwrap_or("??:??:??");
                writeln!(
                    f,
                    "  • {}  {:16}  {}",
                    ts,
                    event.reason,
                    truncate(&event.message, MAX_MESSAGE_LEN)
                )?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for FailureSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "{}", Self::heavy_line())?;
        writeln!(f, "  {}", self.headline())?;
        writeln!(f, "{}", Self::heavy_line())?;
        writeln!(f)?;

        if let Some((index, label)) = self.stage {
            writeln!(f, "  Stage:      {} ({})", index, label)?;
        }
        if let Some(resource) = self.resource() {
            writeln!(f, "  Resource:   {}", resource)?;
        }

        match self.error {
            WaitError::TimedOut(report) | WaitError::PermanentFailure(report) => {
                Self::write_report(f, report)?;
            }
            WaitError::Transient {
                source,
                timeout,
                elapsed,
                ..
            } => {
                writeln!(f, "  Error:      {}", source)?;
                writeln!(f, "  Elapsed:    {:?}", elapsed)?;
                writeln!(f, "  Timeout:    {:?}", timeout)?;
            }
            WaitError::Configuration(e) => writeln!(f, "  Error:      {}", e)?,
        }

        if !self.completed.is_empty() {
            writeln!(f)?;
            writeln!(f, "{}", Self::section_header("Completed stages"))?;
            writeln!(f)?;
            for stage in self.completed {
                writeln!(
                    f,
                    "  ✓ {:24}  {:?}  {}",
                    stage.label, stage.elapsed, stage.resource
                )?;
            }
        }

        if let Some(resource) = self.resource() {
            if resource.kind != ResourceKind::ExternalJob {
                writeln!(f)?;
                writeln!(f, "{}", Self::section_header("Debug"))?;
                writeln!(f)?;
                writeln!(
                    f,
                    "  kubectl -n {} describe {} {}",
                    resource.namespace, resource.kind, resource.name
                )?;
                writeln!(
                    f,
                    "  kubectl -n {} get events --field-selector involvedObject.name={}",
                    resource.namespace, resource.name
                )?;
            }
        }

        writeln!(f)?;
        writeln!(f, "{}", Self::heavy_line())?;
        Ok(())
    }
}

fn truncate(message: &str, max: usize) -> String {
    match message.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &message[..idx]),
        None => message.to_string(),
    }
}
