//! Workers: the units that do actual work for a stage.
//!
//! A worker receives an [`InvocationRequest`] (the task plus a context bundle of
//! recent summaries) and produces exactly one [`WorkerResult`]. Workers are
//! looked up by name in a [`WorkerRegistry`] and always called through the
//! [`WorkerInvoker`], which enforces the per-invocation timeout and turns every
//! [`InvocationError`] into a failed result.

mod claude;
mod invoker;
pub mod parse;
mod registry;
pub mod roles;

pub use claude::{ClaudeWorker, ClaudeWorkerConfig};
pub use invoker::{DEFAULT_WORKER_TIMEOUT_SECS, WorkerInvoker};
pub use registry::WorkerRegistry;
pub use roles::Role;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::InvocationError;

/// The unit of work a session was started for. Never mutated after creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub description: String,
    #[serde(default)]
    pub file_hints: Vec<PathBuf>,
}

impl Task {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            file_hints: Vec::new(),
        }
    }

    pub fn with_file_hints(mut self, hints: impl IntoIterator<Item = PathBuf>) -> Self {
        self.file_hints = hints.into_iter().collect();
        self
    }

    /// Copy of this task with stage instructions appended to the description.
    pub fn with_instructions(&self, instructions: Option<&str>) -> Self {
        match instructions {
            Some(extra) if !extra.trim().is_empty() => Self {
                description: format!("{}\n\n{}", self.description, extra.trim()),
                file_hints: self.file_hints.clone(),
            },
            _ => self.clone(),
        }
    }
}

/// Snapshot handed to every worker of a stage.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContextBundle {
    pub task: Task,
    /// Task hints followed by files changed in recent results, deduplicated.
    pub file_hints: Vec<PathBuf>,
    /// Oldest first, newest last.
    pub recent_summaries: Vec<WorkerResult>,
}

/// What a worker is asked to do.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRequest {
    pub worker_name: String,
    pub task: Task,
    pub context: ContextBundle,
}

/// Coarse classification of why an invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    NonZeroExit,
    Malformed,
    Io,
    UnknownWorker,
    Reported,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// Outcome of one worker invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerResult {
    pub worker: String,
    pub summary: String,
    #[serde(default)]
    pub files_changed: BTreeSet<PathBuf>,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub blocked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
    #[serde(default)]
    pub raw_output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<InvocationFailure>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl WorkerResult {
    pub fn new(worker: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            worker: worker.into(),
            summary: summary.into(),
            files_changed: BTreeSet::new(),
            issues: Vec::new(),
            blocked: false,
            block_reason: None,
            raw_output: String::new(),
            failure: None,
            duration_ms: 0,
        }
    }

    /// Build the failed result recorded for an invocation error.
    pub fn failed(worker: impl Into<String>, error: &InvocationError, duration: Duration) -> Self {
        let worker = worker.into();
        let raw_output = match error {
            InvocationError::NonZeroExit { stderr, .. } => stderr.clone(),
            _ => String::new(),
        };
        Self {
            summary: format!("{} failed: {}", worker, error),
            raw_output,
            failure: Some(InvocationFailure {
                kind: error.kind(),
                message: error.to_string(),
            }),
            duration_ms: duration.as_millis() as u64,
            ..Self::new(worker, String::new())
        }
    }

    pub fn with_files<I, P>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.files_changed.extend(files.into_iter().map(Into::into));
        self
    }

    pub fn with_issues<I, S>(mut self, issues: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.issues.extend(issues.into_iter().map(Into::into));
        self
    }

    pub fn with_raw_output(mut self, raw: impl Into<String>) -> Self {
        self.raw_output = raw.into();
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = duration.as_millis() as u64;
        self
    }

    pub fn blocked_by(mut self, reason: impl Into<String>) -> Self {
        self.blocked = true;
        self.block_reason = Some(reason.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// A named unit that performs work for a stage.
///
/// Implementations must not enforce their own deadline; the invoker owns the
/// timeout and drops the returned future when it expires.
#[async_trait]
pub trait Worker: Send + Sync {
    fn name(&self) -> &str;

    async fn invoke(&self, request: &InvocationRequest) -> Result<WorkerResult, InvocationError>;
}
