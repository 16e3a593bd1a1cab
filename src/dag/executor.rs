//! Stage executor: fans a stage out to its workers and settles it.

use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use tracing::debug;

use super::stage::StageSpec;
use super::state::StageRun;
use crate::errors::PipelineError;
use crate::gates::settle_stage;
use crate::worker::{ContextBundle, WorkerInvoker};

/// Runs stages through a shared [`WorkerInvoker`]. Cheap to clone.
#[derive(Clone)]
pub struct StageExecutor {
    invoker: Arc<WorkerInvoker>,
}

impl StageExecutor {
    pub fn new(invoker: WorkerInvoker) -> Self {
        Self {
            invoker: Arc::new(invoker),
        }
    }

    pub fn invoker(&self) -> &WorkerInvoker {
        &self.invoker
    }

    /// Execute every worker of `spec` and settle `run`, which must be Running.
    ///
    /// Workers of a parallel stage are invoked concurrently, each against its
    /// own clone of `context`. The run leaves Running only after every
    /// invocation returned or timed out, and results keep worker order.
    pub async fn execute_stage(
        &self,
        spec: &StageSpec,
        mut run: StageRun,
        context: ContextBundle,
    ) -> Result<StageRun, PipelineError> {
        debug!(stage = %spec.name, workers = ?spec.workers, "Executing stage");

        let invocations = spec.workers.iter().map(|worker| {
            let context = context.clone();
            async move { self.invoker.invoke(worker, context).await }
        });
        let results = join_all(invocations).await;

        let (status, reason) = settle_stage(spec.gate.as_ref(), &results);
        run.finish(status, results, reason, Utc::now())?;
        Ok(run)
    }
}
