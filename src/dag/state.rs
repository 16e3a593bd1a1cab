//! Execution state for stages and whole runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::PipelineError;
use crate::worker::WorkerResult;

/// Status of a stage run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Blocked,
}

impl StageStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Blocked)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Whether this status halts every downstream stage.
    pub fn halts_dependents(&self) -> bool {
        matches!(self, Self::Failed | Self::Blocked)
    }

    /// Legal forward transitions: Pending → Running → terminal.
    pub fn can_transition_to(&self, next: StageStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Succeeded | Self::Failed | Self::Blocked)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime record of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRun {
    stage: String,
    #[serde(default)]
    status: StageStatus,
    /// In worker declaration order.
    #[serde(default)]
    results: Vec<WorkerResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ended_at: Option<DateTime<Utc>>,
    /// Why the stage failed or blocked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl StageRun {
    pub fn pending(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            status: StageStatus::Pending,
            results: Vec::new(),
            started_at: None,
            ended_at: None,
            reason: None,
        }
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    pub fn status(&self) -> StageStatus {
        self.status
    }

    pub fn results(&self) -> &[WorkerResult] {
        &self.results
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    fn transition(&mut self, next: StageStatus) -> Result<(), PipelineError> {
        if !self.status.can_transition_to(next) {
            return Err(PipelineError::InvalidTransition {
                stage: self.stage.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub(crate) fn mark_running(&mut self, at: DateTime<Utc>) -> Result<(), PipelineError> {
        self.transition(StageStatus::Running)?;
        self.started_at = Some(at);
        Ok(())
    }

    pub(crate) fn finish(
        &mut self,
        status: StageStatus,
        results: Vec<WorkerResult>,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), PipelineError> {
        self.transition(status)?;
        self.results = results;
        self.reason = reason;
        self.ended_at = Some(at);
        Ok(())
    }

    /// Crash recovery: drop a half-finished attempt. Terminal runs are untouched.
    pub(crate) fn reset_to_pending(&mut self) -> bool {
        if self.status != StageStatus::Running {
            return false;
        }
        *self = Self::pending(std::mem::take(&mut self.stage));
        true
    }

    /// Internal consistency of a loaded record.
    pub(crate) fn check_consistent(&self) -> Result<(), String> {
        match self.status {
            StageStatus::Pending if self.started_at.is_some() || !self.results.is_empty() => Err(
                format!("stage '{}' is pending but carries run data", self.stage),
            ),
            StageStatus::Running if self.started_at.is_none() => {
                Err(format!("stage '{}' is running without a start time", self.stage))
            }
            s if s.is_terminal() && (self.started_at.is_none() || self.ended_at.is_none()) => Err(
                format!("stage '{}' is {} without timestamps", self.stage, s),
            ),
            _ => Ok(()),
        }
    }
}

/// Overall status of a session, derived from its stage runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Stages remain to run.
    InProgress,
    /// Every stage succeeded.
    Completed,
    /// A gate blocked the pipeline and nothing failed.
    Blocked,
    /// At least one stage failed.
    Failed,
}

impl RunStatus {
    pub fn from_statuses<I: IntoIterator<Item = StageStatus>>(statuses: I) -> Self {
        let mut any_blocked = false;
        let mut all_succeeded = true;
        for status in statuses {
            match status {
                StageStatus::Failed => return Self::Failed,
                StageStatus::Blocked => any_blocked = true,
                StageStatus::Succeeded => {}
                StageStatus::Pending | StageStatus::Running => all_succeeded = false,
            }
        }
        if any_blocked {
            Self::Blocked
        } else if all_succeeded {
            Self::Completed
        } else {
            Self::InProgress
        }
    }

    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Blocked => "blocked",
            Self::Failed => "failed",
        })
    }
}
