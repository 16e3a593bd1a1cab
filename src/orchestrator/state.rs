//! Durable session state and its persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use super::storage::Storage;
use crate::compaction::{SummaryStore, merge_file_hints};
use crate::dag::{RunStatus, StageGraph, StageRun, StageSpec, StageStatus, halted};
use crate::errors::{PersistenceError, PipelineError, StorageError};
use crate::worker::{ContextBundle, Task};

/// New session id: `YYYYmmdd_HHMMSS_` plus 8 hex chars.
pub fn new_session_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}", Utc::now().format("%Y%m%d_%H%M%S"), &suffix[..8])
}

/// Stage counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageCounts {
    pub pending: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub blocked: usize,
}

impl StageCounts {
    pub fn total(&self) -> usize {
        self.pending + self.running + self.succeeded + self.failed + self.blocked
    }
}

/// Everything needed to resume a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    session_id: String,
    task: Task,
    stage_graph: StageGraph,
    stage_runs: BTreeMap<String, StageRun>,
    summaries: SummaryStore,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SessionState {
    /// Fresh session with every stage Pending.
    pub fn new(session_id: impl Into<String>, task: Task, graph: StageGraph, summary_window: usize) -> Self {
        let now = Utc::now();
        let stage_runs = graph
            .names()
            .map(|name| (name.to_string(), StageRun::pending(name)))
            .collect();
        Self {
            session_id: session_id.into(),
            task,
            stage_graph: graph,
            stage_runs,
            summaries: SummaryStore::new(summary_window),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn stage_graph(&self) -> &StageGraph {
        &self.stage_graph
    }

    pub fn stage_runs(&self) -> &BTreeMap<String, StageRun> {
        &self.stage_runs
    }

    pub fn stage_run(&self, name: &str) -> Option<&StageRun> {
        self.stage_runs.get(name)
    }

    /// Stage runs in declaration order.
    pub fn ordered_runs(&self) -> impl Iterator<Item = &StageRun> {
        self.stage_graph
            .names()
            .filter_map(|name| self.stage_runs.get(name))
    }

    pub fn summaries(&self) -> &SummaryStore {
        &self.summaries
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn run_status(&self) -> RunStatus {
        RunStatus::from_statuses(self.stage_runs.values().map(StageRun::status))
    }

    pub fn counts(&self) -> StageCounts {
        let mut counts = StageCounts::default();
        for run in self.stage_runs.values() {
            match run.status() {
                StageStatus::Pending => counts.pending += 1,
                StageStatus::Running => counts.running += 1,
                StageStatus::Succeeded => counts.succeeded += 1,
                StageStatus::Failed => counts.failed += 1,
                StageStatus::Blocked => counts.blocked += 1,
            }
        }
        counts
    }

    /// `(stage, reason)` for every Failed or Blocked stage, in declaration order.
    pub fn blockers(&self) -> Vec<(&str, &str)> {
        self.ordered_runs()
            .filter(|run| run.status().halts_dependents())
            .map(|run| (run.stage(), run.reason().unwrap_or("")))
            .collect()
    }

    /// Pending stages that can no longer run.
    pub fn halted_stages(&self) -> Vec<String> {
        halted(&self.stage_graph, &self.stage_runs)
    }

    /// Context bundle for the workers of `spec`.
    pub fn context_for(&self, spec: &StageSpec, recent: usize) -> ContextBundle {
        let recent_summaries = self.summaries.recent(recent);
        ContextBundle {
            task: self.task.with_instructions(spec.instructions.as_deref()),
            file_hints: merge_file_hints(&self.task.file_hints, &recent_summaries),
            recent_summaries,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now().max(self.updated_at);
    }

    /// Mark a Pending stage Running and return a copy of the new record.
    pub(crate) fn mark_running(&mut self, stage: &str, at: DateTime<Utc>) -> Result<StageRun, PipelineError> {
        let run = self
            .stage_runs
            .get_mut(stage)
            .ok_or_else(|| PipelineError::UnknownStage(stage.to_string()))?;
        run.mark_running(at)?;
        let copy = run.clone();
        self.touch();
        Ok(copy)
    }

    /// Replace a Running stage with its settled record and append its
    /// results to the summary store.
    pub(crate) fn record_settled(&mut self, settled: StageRun) -> Result<(), PipelineError> {
        let current = self
            .stage_runs
            .get_mut(settled.stage())
            .ok_or_else(|| PipelineError::UnknownStage(settled.stage().to_string()))?;
        if current.status() != StageStatus::Running || !settled.status().is_terminal() {
            return Err(PipelineError::InvalidTransition {
                stage: settled.stage().to_string(),
                from: current.status(),
                to: settled.status(),
            });
        }
        for result in settled.results() {
            self.summaries.append(result.clone());
        }
        *current = settled;
        self.touch();
        Ok(())
    }

    /// Reset every Running stage to Pending. Returns the names reset.
    pub(crate) fn reset_interrupted(&mut self) -> Vec<String> {
        let mut reset = Vec::new();
        for (name, run) in self.stage_runs.iter_mut() {
            if run.reset_to_pending() {
                reset.push(name.clone());
            }
        }
        if !reset.is_empty() {
            self.touch();
        }
        reset
    }

    /// Structural checks applied to every loaded snapshot.
    pub fn validate(&self) -> Result<(), String> {
        if self.stage_runs.len() != self.stage_graph.len()
            || !self.stage_graph.names().all(|n| self.stage_runs.contains_key(n))
        {
            return Err("stage runs do not match the stage graph".to_string());
        }
        for (name, run) in &self.stage_runs {
            if run.stage() != name {
                return Err(format!("stage run '{}' is stored under '{}'", run.stage(), name));
            }
            run.check_consistent()?;
        }
        if !self.summaries.is_within_window() {
            return Err(format!(
                "summary store holds {} entries, window is {}",
                self.summaries.len(),
                self.summaries.window()
            ));
        }
        Ok(())
    }
}

/// Loads and saves [`SessionState`] snapshots keyed by session id.
#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<dyn Storage>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub fn save(&self, session: &SessionState) -> Result<(), PersistenceError> {
        let bytes = serde_json::to_vec_pretty(session).map_err(|source| PersistenceError::Serialize {
            session_id: session.session_id.clone(),
            source,
        })?;
        self.storage.put(&session.session_id, &bytes)?;
        Ok(())
    }

    pub fn load(&self, session_id: &str) -> Result<SessionState, PersistenceError> {
        let not_found = || PersistenceError::SessionNotFound {
            session_id: session_id.to_string(),
        };
        let bytes = match self.storage.get(session_id) {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound(_)) | Err(StorageError::InvalidKey(_)) => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };

        let corrupt = |reason: String| PersistenceError::CorruptState {
            session_id: session_id.to_string(),
            reason,
        };
        let session: SessionState =
            serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;
        if session.session_id != session_id {
            return Err(corrupt(format!(
                "snapshot belongs to session {}",
                session.session_id
            )));
        }
        session.validate().map_err(corrupt)?;
        Ok(session)
    }

    pub fn exists(&self, session_id: &str) -> Result<bool, PersistenceError> {
        match self.storage.exists(session_id) {
            Ok(found) => Ok(found),
            Err(StorageError::InvalidKey(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn ids(&self) -> Result<Vec<String>, PersistenceError> {
        Ok(self.storage.keys()?)
    }

    /// Every loadable session, newest first. Corrupt snapshots are skipped.
    pub fn list(&self) -> Result<Vec<SessionState>, PersistenceError> {
        let mut sessions = Vec::new();
        for id in self.ids()? {
            match self.load(&id) {
                Ok(session) => sessions.push(session),
                Err(PersistenceError::CorruptState { session_id, reason }) => {
                    warn!(session_id = %session_id, reason = %reason, "Skipping corrupt session snapshot");
                }
                Err(e) => return Err(e),
            }
        }
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    /// Most recently updated session, if any.
    pub fn latest(&self) -> Result<Option<SessionState>, PersistenceError> {
        Ok(self
            .list()?
            .into_iter()
            .max_by_key(|s| s.updated_at))
    }
}
