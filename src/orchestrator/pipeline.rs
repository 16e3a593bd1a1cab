//! Pipeline orchestrator: drives a session's stage graph to completion.

use chrono::Utc;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::state::{SessionState, SessionStore, new_session_id};
use crate::compaction::{DEFAULT_RECENT_CONTEXT, DEFAULT_SUMMARY_WINDOW};
use crate::dag::{DagBuilder, RunStatus, StageExecutor, StageRun, StageSpec, StageStatus, runnable};
use crate::errors::{PersistenceError, PipelineError};
use crate::worker::Task;

/// Orchestrator tuning.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Results retained in each session's summary store.
    pub summary_window: usize,
    /// Results handed to each worker as context.
    pub recent_context: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            summary_window: DEFAULT_SUMMARY_WINDOW,
            recent_context: DEFAULT_RECENT_CONTEXT,
        }
    }
}

impl PipelineConfig {
    pub fn with_summary_window(mut self, window: usize) -> Self {
        self.summary_window = window;
        self
    }

    pub fn with_recent_context(mut self, recent: usize) -> Self {
        self.recent_context = recent;
        self
    }
}

/// Progress notifications emitted while a session runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    SessionStarted {
        session_id: String,
        stages: Vec<String>,
    },
    StageStarted {
        session_id: String,
        stage: String,
        workers: Vec<String>,
    },
    StageSettled {
        session_id: String,
        stage: String,
        status: StageStatus,
        reason: Option<String>,
    },
    StagesHalted {
        session_id: String,
        stages: Vec<String>,
    },
    Interrupted {
        session_id: String,
        reset: Vec<String>,
    },
    RunFinished {
        session_id: String,
        status: RunStatus,
    },
}

enum Step {
    Settled(Result<StageRun, PipelineError>),
    Cancelled,
}

/// Owns persistence and execution for pipeline sessions.
pub struct PipelineOrchestrator {
    store: SessionStore,
    executor: StageExecutor,
    config: PipelineConfig,
    event_tx: Option<mpsc::Sender<PipelineEvent>>,
    cancel: CancellationToken,
}

impl PipelineOrchestrator {
    pub fn new(store: SessionStore, executor: StageExecutor) -> Self {
        Self {
            store,
            executor,
            config: PipelineConfig::default(),
            event_tx: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set an event channel for progress updates.
    pub fn with_event_channel(mut self, tx: mpsc::Sender<PipelineEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    async fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }

    /// Validate the stage graph, create a session with every stage Pending and
    /// persist it.
    pub async fn start(&self, task: Task, stages: Vec<StageSpec>) -> Result<SessionState, PipelineError> {
        let graph = DagBuilder::new(stages).build()?;
        let session = SessionState::new(new_session_id(), task, graph, self.config.summary_window);
        self.store.save(&session)?;

        info!(
            session_id = %session.session_id(),
            stages = session.stage_graph().len(),
            "Session started"
        );
        self.emit(PipelineEvent::SessionStarted {
            session_id: session.session_id().to_string(),
            stages: session.stage_graph().names().map(String::from).collect(),
        })
        .await;

        Ok(session)
    }

    pub fn load(&self, session_id: &str) -> Result<SessionState, PersistenceError> {
        self.store.load(session_id)
    }

    /// Run every runnable stage until nothing is runnable and nothing is in
    /// flight. Returns the resulting run status.
    ///
    /// A stage launches as soon as its dependencies are Succeeded and
    /// persisted, even while unrelated stages are still running. Calling this
    /// on a finished or halted session changes nothing.
    pub async fn advance(&self, session: &mut SessionState) -> Result<RunStatus, PipelineError> {
        let session_id = session.session_id().to_string();
        let mut in_flight = FuturesUnordered::new();

        loop {
            if !self.cancel.is_cancelled() {
                for name in runnable(session.stage_graph(), session.stage_runs()) {
                    let spec = session
                        .stage_graph()
                        .get(&name)
                        .cloned()
                        .ok_or_else(|| PipelineError::UnknownStage(name.clone()))?;
                    let context = session.context_for(&spec, self.config.recent_context);
                    let run = session.mark_running(&name, Utc::now())?;
                    if let Err(e) = self.store.save(session) {
                        return Err(self.abort(session, e.into()));
                    }

                    info!(session_id = %session_id, stage = %name, workers = ?spec.workers, "Stage started");
                    self.emit(PipelineEvent::StageStarted {
                        session_id: session_id.clone(),
                        stage: name.clone(),
                        workers: spec.workers.clone(),
                    })
                    .await;

                    let executor = self.executor.clone();
                    in_flight.push(async move { executor.execute_stage(&spec, run, context).await });
                }
            }

            if in_flight.is_empty() {
                break;
            }

            let step = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Step::Cancelled,
                Some(settled) = in_flight.next() => Step::Settled(settled),
            };

            match step {
                Step::Settled(Ok(run)) => {
                    let stage = run.stage().to_string();
                    let status = run.status();
                    let reason = run.reason().map(String::from);
                    if let Err(e) = session.record_settled(run) {
                        drop(in_flight);
                        return Err(self.abort(session, e));
                    }
                    if let Err(e) = self.store.save(session) {
                        drop(in_flight);
                        return Err(self.abort(session, e.into()));
                    }

                    match status {
                        StageStatus::Succeeded => {
                            info!(session_id = %session_id, stage = %stage, "Stage succeeded")
                        }
                        _ => warn!(
                            session_id = %session_id,
                            stage = %stage,
                            status = %status,
                            reason = reason.as_deref().unwrap_or(""),
                            "Stage did not succeed"
                        ),
                    }
                    self.emit(PipelineEvent::StageSettled {
                        session_id: session_id.clone(),
                        stage,
                        status,
                        reason,
                    })
                    .await;
                }
                Step::Settled(Err(e)) => {
                    drop(in_flight);
                    return Err(self.abort(session, e));
                }
                Step::Cancelled => {
                    // Dropping the futures kills every child process.
                    drop(in_flight);
                    let reset = session.reset_interrupted();
                    self.store.save(session)?;
                    warn!(session_id = %session_id, stages = ?reset, "Run cancelled");
                    self.emit(PipelineEvent::Interrupted {
                        session_id: session_id.clone(),
                        reset,
                    })
                    .await;
                    return Ok(session.run_status());
                }
            }
        }

        let halted = session.halted_stages();
        if !halted.is_empty() {
            debug!(session_id = %session_id, stages = ?halted, "Stages halted behind failed or blocked dependencies");
            self.emit(PipelineEvent::StagesHalted {
                session_id: session_id.clone(),
                stages: halted,
            })
            .await;
        }

        let status = session.run_status();
        info!(session_id = %session_id, status = %status, "Run finished");
        self.emit(PipelineEvent::RunFinished {
            session_id,
            status,
        })
        .await;
        Ok(status)
    }

    /// Reset in-flight stages after an internal error so the snapshot stays
    /// resumable, then hand the error back.
    fn abort(&self, session: &mut SessionState, err: PipelineError) -> PipelineError {
        let reset = session.reset_interrupted();
        if !reset.is_empty() {
            if let Err(save_err) = self.store.save(session) {
                warn!(session_id = %session.session_id(), error = %save_err, "Failed to persist reset stages");
            }
        }
        err
    }

    /// Load a session, reset stages interrupted by a crash, persist, and advance.
    pub async fn resume(&self, session_id: &str) -> Result<SessionState, PipelineError> {
        let mut session = self.store.load(session_id)?;
        let reset = session.reset_interrupted();
        if !reset.is_empty() {
            info!(session_id = %session_id, stages = ?reset, "Reset interrupted stages");
            self.store.save(&session)?;
        }
        self.advance(&mut session).await?;
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gates::Gate;
    use crate::orchestrator::storage::MemoryStorage;
    use crate::worker::{
        InvocationRequest, Worker, WorkerInvoker, WorkerRegistry, WorkerResult,
    };
    use crate::errors::InvocationError;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    struct Echo {
        name: &'static str,
        delay: Duration,
        blocked: bool,
    }

    #[async_trait]
    impl Worker for Echo {
        fn name(&self) -> &str {
            self.name
        }

        async fn invoke(&self, request: &InvocationRequest) -> Result<WorkerResult, InvocationError> {
            tokio::time::sleep(self.delay).await;
            let result = WorkerResult::new(self.name, format!("did: {}", request.task.description));
            Ok(if self.blocked { result.blocked_by("found a problem") } else { result })
        }
    }

    fn orchestrator(workers: Vec<Echo>) -> PipelineOrchestrator {
        let mut registry = WorkerRegistry::new();
        for w in workers {
            registry.register(Arc::new(w));
        }
        let store = SessionStore::new(Arc::new(MemoryStorage::new()));
        PipelineOrchestrator::new(store, StageExecutor::new(WorkerInvoker::new(registry)))
    }

    fn echo(name: &'static str) -> Echo {
        Echo {
            name,
            delay: Duration::ZERO,
            blocked: false,
        }
    }

    #[tokio::test]
    async fn test_start_rejects_cycle() {
        let orch = orchestrator(vec![]);
        let err = orch
            .start(
                Task::new("x"),
                vec![
                    StageSpec::new("a", ["coder"]).depends_on(["b"]),
                    StageSpec::new("b", ["coder"]).depends_on(["a"]),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::CyclicGraph { .. }));
        assert!(orch.store().ids().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_linear_pipeline_completes() {
        let orch = orchestrator(vec![echo("coder"), echo("tester")]);
        let mut session = orch
            .start(
                Task::new("build it"),
                vec![
                    StageSpec::new("code", ["coder"]),
                    StageSpec::new("test", ["tester"]).depends_on(["code"]),
                ],
            )
            .await
            .unwrap();

        let status = orch.advance(&mut session).await.unwrap();
        assert_eq!(status, RunStatus::Completed);
        assert_eq!(session.summaries().len(), 2);

        let tester_ctx = &session.stage_run("test").unwrap().results()[0];
        assert_eq!(tester_ctx.summary, "did: build it");
        assert_eq!(orch.load(session.session_id()).unwrap(), session);
    }

    #[tokio::test]
    async fn test_gate_blocks_and_advance_is_idempotent() {
        let orch = orchestrator(vec![
            Echo {
                name: "security",
                delay: Duration::ZERO,
                blocked: true,
            },
            echo("tester"),
        ]);
        let mut session = orch
            .start(
                Task::new("x"),
                vec![
                    StageSpec::new("review", ["security"]).with_gate(Gate::Blocking),
                    StageSpec::new("test", ["tester"]).depends_on(["review"]),
                ],
            )
            .await
            .unwrap();

        assert_eq!(orch.advance(&mut session).await.unwrap(), RunStatus::Blocked);
        let snapshot = session.clone();
        assert_eq!(orch.advance(&mut session).await.unwrap(), RunStatus::Blocked);
        assert_eq!(session, snapshot);
        assert_eq!(
            session.stage_run("test").unwrap().status(),
            StageStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_events_emitted_in_order() {
        let (tx, mut rx) = mpsc::channel(32);
        let orch = orchestrator(vec![echo("coder")]).with_event_channel(tx);
        let mut session = orch
            .start(Task::new("x"), vec![StageSpec::new("code", ["coder"])])
            .await
            .unwrap();
        orch.advance(&mut session).await.unwrap();
        drop(orch);

        let mut kinds = Vec::new();
        while let Some(event) = rx.recv().await {
            kinds.push(match event {
                PipelineEvent::SessionStarted { .. } => "session_started",
                PipelineEvent::StageStarted { .. } => "stage_started",
                PipelineEvent::StageSettled { .. } => "stage_settled",
                PipelineEvent::StagesHalted { .. } => "stages_halted",
                PipelineEvent::Interrupted { .. } => "interrupted",
                PipelineEvent::RunFinished { .. } => "run_finished",
            });
        }
        assert_eq!(
            kinds,
            vec!["session_started", "stage_started", "stage_settled", "run_finished"]
        );
    }

    #[tokio::test]
    async fn test_cancel_resets_in_flight_stages() {
        let orch = orchestrator(vec![Echo {
            name: "coder",
            delay: Duration::from_secs(30),
            blocked: false,
        }]);
        let token = orch.cancellation_token();
        let mut session = orch
            .start(Task::new("x"), vec![StageSpec::new("code", ["coder"])])
            .await
            .unwrap();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });
        let status = orch.advance(&mut session).await.unwrap();

        assert_eq!(status, RunStatus::InProgress);
        let run = session.stage_run("code").unwrap();
        assert_eq!(run.status(), StageStatus::Pending);
        assert!(run.started_at().is_none());
        assert_eq!(orch.load(session.session_id()).unwrap(), session);
    }

    #[tokio::test]
    async fn test_resume_unknown_session() {
        let orch = orchestrator(vec![]);
        let err = orch.resume("missing").await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Persistence(PersistenceError::SessionNotFound { .. })
        ));
    }
}
