//! Typed error hierarchy for the swarm orchestrator.
//!
//! Four enums cover the failure domains:
//! - `PipelineError` — stage graph validation and orchestration failures
//! - `InvocationError` — a single worker invocation failing
//! - `PersistenceError` — loading or saving a session snapshot
//! - `StorageError` — the key-value backend underneath persistence
//!
//! Only `PipelineError` and `PersistenceError` ever reach a caller of the
//! orchestrator. `InvocationError` is absorbed into a failed `WorkerResult`.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::dag::StageStatus;
use crate::worker::FailureKind;

/// Errors from building or driving a pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Cycle detected in stage dependencies. Involved stages: {stages:?}")]
    CyclicGraph { stages: Vec<String> },

    #[error("Unknown dependency '{dependency}' in stage '{stage}': no stage with that name exists")]
    UnknownDependency { stage: String, dependency: String },

    #[error("Duplicate stage name: {0}")]
    DuplicateStage(String),

    #[error("Stage '{0}' declares no workers")]
    EmptyStage(String),

    #[error("Stage '{stage}' lists worker '{worker}' more than once")]
    DuplicateWorker { stage: String, worker: String },

    #[error("Stage '{0}' is not part of this session")]
    UnknownStage(String),

    #[error("Stage '{stage}' cannot move from {from} to {to}")]
    InvalidTransition {
        stage: String,
        from: StageStatus,
        to: StageStatus,
    },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Errors from a single worker invocation.
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("Worker '{worker}' timed out after {timeout:?}")]
    Timeout { worker: String, timeout: Duration },

    #[error("Worker process exited with non-zero code {exit_code}")]
    NonZeroExit { exit_code: i32, stderr: String },

    #[error("Malformed worker output: {0}")]
    Malformed(String),

    #[error("Failed to spawn worker process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Worker I/O failed: {0}")]
    Io(#[source] std::io::Error),

    #[error("Unknown worker: {0}")]
    UnknownWorker(String),

    #[error("Worker reported an error: {0}")]
    Reported(String),
}

impl InvocationError {
    /// Coarse classification stored alongside a failed result.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::NonZeroExit { .. } => FailureKind::NonZeroExit,
            Self::Malformed(_) => FailureKind::Malformed,
            Self::Spawn(_) | Self::Io(_) => FailureKind::Io,
            Self::UnknownWorker(_) => FailureKind::UnknownWorker,
            Self::Reported(_) => FailureKind::Reported,
        }
    }
}

/// Errors from session snapshot persistence.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Session {session_id} not found")]
    SessionNotFound { session_id: String },

    #[error("Session {session_id} snapshot is corrupt: {reason}")]
    CorruptState { session_id: String, reason: String },

    #[error("Failed to serialize session {session_id}: {source}")]
    Serialize {
        session_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors from a key-value storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Key '{0}' not found")]
    NotFound(String),

    #[error("Invalid storage key '{0}'")]
    InvalidKey(String),

    #[error("Storage I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}
