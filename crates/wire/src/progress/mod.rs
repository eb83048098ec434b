// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Progress state machines for long-running knowledge jobs.
//!
//! Status moves `idle -> running -> {completed | error}` and never leaves a
//! terminal state except through [`ProgressMachine::reset`]. Every accepted
//! frame is appended to an ordered log for timeline display.

pub mod builder;
pub mod driver;
pub mod index;
pub mod scrape;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::stream::StreamFrame;

pub use builder::{BuilderProgress, StageState, StageStatus, BUILDER_STAGES};
pub use driver::{drive_job, JobObserver, UNEXPECTED_END};
pub use index::IndexProgress;
pub use scrape::ScrapeProgress;

/// Message used when an `error` frame carries no usable text.
pub const GENERIC_JOB_ERROR: &str = "The job failed without an error message.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

/// One timeline entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub timestamp: String,
    pub payload: Value,
}

/// Effect of applying one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Keepalive, or the machine is already terminal.
    Ignored,
    Updated,
    Completed,
    Failed(String),
}

/// How a frame kind affects status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindEffect {
    Keepalive,
    Running,
    Completed,
    Error,
    /// Logged, no status change.
    Unrecognized,
}

/// Classify a frame kind.
pub fn classify(kind: &str) -> KindEffect {
    match kind {
        "ping" => KindEffect::Keepalive,
        "started" | "visiting" | "link_found" | "embedding_started" | "embedding_completed"
        | "warning" | "skipped" | "job_created" | "info" | "url_found" | "processing"
        | "page_processed" | "reused" => KindEffect::Running,
        "completed" => KindEffect::Completed,
        "error" => KindEffect::Error,
        _ => KindEffect::Unrecognized,
    }
}

/// Job-specific counters folded from frames.
pub trait Progress: Default {
    /// Payload fields searched, in order, for an `error` frame's message.
    const ERROR_FIELDS: &'static [&'static str] = &["message", "detail", "error"];

    /// Message used when none of [`Self::ERROR_FIELDS`] carries text.
    const GENERIC_ERROR: &'static str = GENERIC_JOB_ERROR;

    /// How a frame kind affects status for this job.
    fn effect(kind: &str) -> KindEffect {
        classify(kind)
    }

    /// Update counters from a start/progress frame. Absent fields keep their
    /// previous values.
    fn on_running(&mut self, frame: &StreamFrame);

    /// Apply the terminal success frame.
    fn on_completed(&mut self, frame: &StreamFrame);

    /// Apply the terminal error frame.
    fn on_error(&mut self, _frame: &StreamFrame) {}
}

/// Status, counters, and timeline for one job stream.
#[derive(Debug, Clone, Default)]
pub struct ProgressMachine<P> {
    status: JobStatus,
    progress: P,
    log: Vec<LogEntry>,
    error: Option<String>,
}

impl<P> ProgressMachine<P> {
    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn progress(&self) -> &P {
        &self.progress
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

impl<P: Progress> ProgressMachine<P> {
    pub fn new() -> Self {
        Self { status: JobStatus::Idle, progress: P::default(), log: Vec::new(), error: None }
    }

    pub fn apply(&mut self, frame: &StreamFrame) -> Transition {
        let kind = frame.kind();
        if self.is_terminal() {
            debug!(kind, status = self.status.as_str(), "ignoring job event after terminal state");
            return Transition::Ignored;
        }
        match P::effect(kind) {
            KindEffect::Keepalive => Transition::Ignored,
            KindEffect::Running => {
                self.record(frame);
                self.progress.on_running(frame);
                self.status = JobStatus::Running;
                Transition::Updated
            }
            KindEffect::Completed => {
                self.record(frame);
                self.progress.on_completed(frame);
                self.status = JobStatus::Completed;
                Transition::Completed
            }
            KindEffect::Error => {
                self.record(frame);
                self.progress.on_error(frame);
                let message = P::ERROR_FIELDS
                    .iter()
                    .find_map(|key| frame.str_field(key))
                    .unwrap_or(P::GENERIC_ERROR)
                    .to_owned();
                self.status = JobStatus::Error;
                self.error = Some(message.clone());
                Transition::Failed(message)
            }
            KindEffect::Unrecognized => {
                debug!(kind, "unrecognized job event");
                self.record(frame);
                Transition::Updated
            }
        }
    }

    /// Move to `error` without a frame, e.g. when the stream ends early.
    pub fn fail(&mut self, message: &str) -> Transition {
        if self.is_terminal() {
            return Transition::Ignored;
        }
        self.status = JobStatus::Error;
        self.error = Some(message.to_owned());
        Transition::Failed(message.to_owned())
    }

    /// Return to `idle` and clear counters and the timeline.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn record(&mut self, frame: &StreamFrame) {
        let kind = frame.kind().to_owned();
        let message = frame.str_field("message").map(str::to_owned).unwrap_or_else(|| kind.clone());
        self.log.push(LogEntry {
            kind,
            message,
            url: frame.str_field("url").map(str::to_owned),
            timestamp: frame.timestamp.clone(),
            payload: frame.payload.clone(),
        });
    }
}

#[cfg(test)]
#[path = "progress_tests.rs"]
mod tests;
