//! Pipeline execution: `swarm run`, `swarm plan` and `swarm resume`.

use anyhow::{Result, bail};
use console::style;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use swarm::config::{PipelineOptions, SwarmConfig};
use swarm::dag::{RunStatus, StageExecutor, StageStatus, compute_waves};
use swarm::orchestrator::{FileStorage, PipelineEvent, PipelineOrchestrator, SessionState, SessionStore};
use swarm::planner::plan_feature;
use swarm::worker::{Task, WorkerInvoker};

use super::session::print_session;

pub(crate) fn session_store(config: &SwarmConfig, project_dir: &Path) -> SessionStore {
    SessionStore::new(Arc::new(FileStorage::new(config.state_dir(project_dir))))
}

fn build_invoker(config: &SwarmConfig, project_dir: &Path) -> WorkerInvoker {
    config.build_invoker(config.build_registry(project_dir))
}

/// Orchestrator wired to the project's state directory, an event printer and
/// Ctrl-C.
fn build_orchestrator(
    config: &SwarmConfig,
    project_dir: &Path,
) -> (PipelineOrchestrator, JoinHandle<()>) {
    let (event_tx, mut event_rx) = mpsc::channel::<PipelineEvent>(100);
    let display = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            print_event(&event);
        }
    });

    let executor = StageExecutor::new(build_invoker(config, project_dir));
    let orchestrator = PipelineOrchestrator::new(session_store(config, project_dir), executor)
        .with_config(config.pipeline_config())
        .with_event_channel(event_tx);

    let token = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!(
                "\n{} Interrupt received, stopping in-flight stages...",
                style("!").yellow()
            );
            token.cancel();
        }
    });

    (orchestrator, display)
}

fn print_event(event: &PipelineEvent) {
    match event {
        PipelineEvent::SessionStarted { session_id, stages } => {
            println!(
                "{} Session {} ({} stages)",
                style("●").cyan(),
                style(session_id).bold(),
                stages.len()
            );
        }
        PipelineEvent::StageStarted { stage, workers, .. } => {
            println!("{} {} [{}]", style("▶").cyan(), stage, workers.join(", "));
        }
        PipelineEvent::StageSettled {
            stage,
            status,
            reason,
            ..
        } => {
            let marker = match status {
                StageStatus::Succeeded => style("✓").green(),
                StageStatus::Blocked => style("⛔").red(),
                _ => style("✗").red(),
            };
            match reason {
                Some(reason) => println!("{} {} {}: {}", marker, stage, status, reason),
                None => println!("{} {} {}", marker, stage, status),
            }
        }
        PipelineEvent::StagesHalted { stages, .. } => {
            println!(
                "{} Not run: {}",
                style("○").dim(),
                style(stages.join(", ")).dim()
            );
        }
        PipelineEvent::Interrupted { reset, .. } => {
            if !reset.is_empty() {
                println!(
                    "{} Reset to pending: {}",
                    style("!").yellow(),
                    reset.join(", ")
                );
            }
        }
        PipelineEvent::RunFinished { .. } => {}
    }
}

/// Close the event channel and wait for the printer, then report the outcome.
async fn finish(
    orchestrator: PipelineOrchestrator,
    display: JoinHandle<()>,
    session: &SessionState,
) -> Result<()> {
    drop(orchestrator);
    let _ = display.await;

    println!();
    print_session(session);

    match session.run_status() {
        RunStatus::Completed => Ok(()),
        RunStatus::InProgress => {
            println!(
                "Resume with: swarm resume {}",
                style(session.session_id()).bold()
            );
            Ok(())
        }
        RunStatus::Blocked => bail!("Session {} is blocked", session.session_id()),
        RunStatus::Failed => bail!("Session {} failed", session.session_id()),
    }
}

/// What `swarm run` executes.
pub enum RunMode {
    Pipeline(PipelineOptions),
    /// A single named agent, bypassing the pipeline.
    Single(String),
}

pub async fn cmd_run(
    project_dir: &Path,
    task: &str,
    context: Vec<PathBuf>,
    mode: RunMode,
) -> Result<()> {
    let config = SwarmConfig::load(project_dir);
    let stages = match mode {
        RunMode::Pipeline(options) => config.stages(options),
        RunMode::Single(agent) => vec![config.single_agent_stage(&agent)?],
    };
    if stages.is_empty() {
        bail!("Every pipeline stage is disabled or skipped; nothing to run");
    }

    let (orchestrator, display) = build_orchestrator(&config, project_dir);

    println!();
    println!("{} {}", style("Task:").bold().cyan(), task);
    let mut session = orchestrator
        .start(Task::new(task).with_file_hints(context), stages)
        .await?;
    for (i, wave) in compute_waves(session.stage_graph()).iter().enumerate() {
        println!("  {} {}", style(format!("wave {}:", i + 1)).dim(), wave.join(", "));
    }

    orchestrator.advance(&mut session).await?;
    finish(orchestrator, display, &session).await
}

pub async fn cmd_plan(project_dir: &Path, feature: &str, execute: bool) -> Result<()> {
    let config = SwarmConfig::load(project_dir);

    println!();
    println!("{} {}", style("Planning feature:").bold().cyan(), feature);
    let plan = plan_feature(&build_invoker(&config, project_dir), feature).await;
    if !plan.from_architect {
        println!(
            "{} Architect produced no usable plan, using the default breakdown",
            style("!").yellow()
        );
    }

    println!();
    println!("{:<12} {:<10} {:<45} Depends on", "Stage", "Agent", "Task");
    for stage in &plan.stages {
        let text = stage.instructions.as_deref().unwrap_or("");
        let text = if text.chars().count() > 42 {
            format!("{}...", text.chars().take(42).collect::<String>())
        } else {
            text.to_string()
        };
        let deps = if stage.depends_on.is_empty() {
            "-".to_string()
        } else {
            stage.depends_on.join(", ")
        };
        println!(
            "{:<12} {:<10} {:<45} {}",
            stage.name,
            stage.workers.join(","),
            text,
            deps
        );
    }
    println!();

    let (orchestrator, display) = build_orchestrator(&config, project_dir);
    let mut session = orchestrator.start(Task::new(feature), plan.stages).await?;

    if !execute {
        drop(orchestrator);
        let _ = display.await;
        println!(
            "Execute with: swarm resume {}",
            style(session.session_id()).bold()
        );
        return Ok(());
    }

    orchestrator.advance(&mut session).await?;
    finish(orchestrator, display, &session).await
}

pub async fn cmd_resume(project_dir: &Path, session_id: &str) -> Result<()> {
    let config = SwarmConfig::load(project_dir);
    let (orchestrator, display) = build_orchestrator(&config, project_dir);

    println!();
    println!("{} {}", style("Resuming").bold().cyan(), session_id);
    let session = orchestrator.resume(session_id).await?;
    finish(orchestrator, display, &session).await
}
