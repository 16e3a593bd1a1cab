use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

use super::{ContextBundle, InvocationRequest, WorkerRegistry, WorkerResult};
use crate::errors::InvocationError;

/// Default per-invocation timeout in seconds.
pub const DEFAULT_WORKER_TIMEOUT_SECS: u64 = 300;

/// Calls workers by name under a mandatory timeout.
///
/// Never returns an error: every [`InvocationError`] becomes a failed
/// [`WorkerResult`]. On expiry the worker's future is dropped, which kills any
/// child process it spawned with `kill_on_drop`.
#[derive(Debug)]
pub struct WorkerInvoker {
    registry: WorkerRegistry,
    default_timeout: Duration,
    timeouts: HashMap<String, Duration>,
}

impl WorkerInvoker {
    pub fn new(registry: WorkerRegistry) -> Self {
        Self {
            registry,
            default_timeout: Duration::from_secs(DEFAULT_WORKER_TIMEOUT_SECS),
            timeouts: HashMap::new(),
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Override the timeout for a single worker.
    pub fn with_worker_timeout(mut self, worker: impl Into<String>, timeout: Duration) -> Self {
        self.timeouts.insert(worker.into(), timeout);
        self
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    pub fn timeout_for(&self, worker: &str) -> Duration {
        self.timeouts
            .get(worker)
            .copied()
            .unwrap_or(self.default_timeout)
    }

    /// Invoke `worker_name` with the task carried by `context`.
    pub async fn invoke(&self, worker_name: &str, context: ContextBundle) -> WorkerResult {
        let started = Instant::now();
        let request = InvocationRequest {
            worker_name: worker_name.to_string(),
            task: context.task.clone(),
            context,
        };

        match self.try_invoke(&request).await {
            Ok(mut result) => {
                if result.worker != worker_name {
                    result.worker = worker_name.to_string();
                }
                if result.duration_ms == 0 {
                    result.duration_ms = started.elapsed().as_millis() as u64;
                }
                debug!(
                    worker = worker_name,
                    duration_ms = result.duration_ms,
                    blocked = result.blocked,
                    "Worker finished"
                );
                result
            }
            Err(err) => {
                warn!(worker = worker_name, error = %err, "Worker invocation failed");
                WorkerResult::failed(worker_name, &err, started.elapsed())
            }
        }
    }

    async fn try_invoke(&self, request: &InvocationRequest) -> Result<WorkerResult, InvocationError> {
        let worker = self
            .registry
            .get(&request.worker_name)
            .ok_or_else(|| InvocationError::UnknownWorker(request.worker_name.clone()))?;

        let limit = self.timeout_for(&request.worker_name);
        match timeout(limit, worker.invoke(request)).await {
            Ok(result) => result,
            Err(_) => Err(InvocationError::Timeout {
                worker: request.worker_name.clone(),
                timeout: limit,
            }),
        }
    }
}
