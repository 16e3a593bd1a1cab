//! Quality gates applied to a settled stage.
//!
//! A gate inspects the successful results of a stage. Any result flagged
//! `blocked` by a worker the gate listens to, or failing the gate predicate,
//! blocks the stage. Dependents of a blocked stage never run.

use serde::{Deserialize, Serialize};

use crate::dag::StageStatus;
use crate::worker::WorkerResult;

/// Gate predicate attached to a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Gate {
    /// Blocks only on results the worker itself flagged as blocked.
    Blocking,
    /// Like `Blocking`, but only the named workers' flags count. Other
    /// workers in the stage never block it.
    BlockedBy { workers: Vec<String> },
    /// Also blocks when an issue starts with one of the given severities
    /// (case-insensitive, e.g. `critical` matches `"Critical: SQL injection"`).
    Severity { block_on: Vec<String> },
    /// Also blocks when a single result reports more than `limit` issues.
    MaxIssues { limit: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Pass,
    Block(String),
}

impl GateDecision {
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

impl Gate {
    /// Severity gate blocking on critical and high findings.
    pub fn critical() -> Self {
        Self::Severity {
            block_on: vec!["critical".to_string(), "high".to_string()],
        }
    }

    /// Evaluate the gate against one successful result.
    pub fn check(&self, result: &WorkerResult) -> GateDecision {
        if let Self::BlockedBy { workers } = self
            && !workers.iter().any(|w| *w == result.worker)
        {
            return GateDecision::Pass;
        }

        if result.blocked {
            let reason = result
                .block_reason
                .clone()
                .unwrap_or_else(|| format!("{} reported a blocker", result.worker));
            return GateDecision::Block(reason);
        }

        match self {
            Self::Blocking | Self::BlockedBy { .. } => GateDecision::Pass,
            Self::Severity { block_on } => {
                let hit = result.issues.iter().find(|issue| {
                    let lowered = issue.trim_start().to_lowercase();
                    block_on
                        .iter()
                        .any(|sev| lowered.starts_with(&sev.to_lowercase()))
                });
                match hit {
                    Some(issue) => GateDecision::Block(format!("{}: {}", result.worker, issue)),
                    None => GateDecision::Pass,
                }
            }
            Self::MaxIssues { limit } => {
                if result.issues.len() > *limit {
                    GateDecision::Block(format!(
                        "{} reported {} issues (limit {})",
                        result.worker,
                        result.issues.len(),
                        limit
                    ))
                } else {
                    GateDecision::Pass
                }
            }
        }
    }
}

/// Decide the terminal status of a stage from its results.
///
/// Every worker failed ⇒ `Failed`. Otherwise a gated stage is `Blocked` when
/// any successful result does not pass the gate. Ungated stages succeed
/// regardless of blocked flags. Returns the status and an optional reason.
pub fn settle_stage(gate: Option<&Gate>, results: &[WorkerResult]) -> (StageStatus, Option<String>) {
    if results.is_empty() || results.iter().all(|r| !r.is_success()) {
        let reason = results
            .iter()
            .filter_map(|r| r.failure.as_ref().map(|f| f.message.clone()))
            .collect::<Vec<_>>()
            .join("; ");
        return (
            StageStatus::Failed,
            Some(if reason.is_empty() {
                "no worker produced a result".to_string()
            } else {
                reason
            }),
        );
    }

    let Some(gate) = gate else {
        return (StageStatus::Succeeded, None);
    };

    let reasons: Vec<String> = results
        .iter()
        .filter(|r| r.is_success())
        .filter_map(|r| match gate.check(r) {
            GateDecision::Pass => None,
            GateDecision::Block(reason) => Some(reason),
        })
        .collect();

    if reasons.is_empty() {
        (StageStatus::Succeeded, None)
    } else {
        (StageStatus::Blocked, Some(reasons.join("; ")))
    }
}
