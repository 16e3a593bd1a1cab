//! Session inspection: `swarm status`, `swarm sessions`, `swarm summaries`.

use anyhow::Result;
use console::style;
use std::path::Path;

use swarm::compaction::summary_line;
use swarm::config::SwarmConfig;
use swarm::dag::{RunStatus, StageStatus};
use swarm::orchestrator::{SessionState, SessionStore};

use super::run::session_store;

fn truncate(text: &str, max: usize) -> String {
    let first = text.lines().next().unwrap_or("");
    if first.chars().count() > max {
        format!("{}...", first.chars().take(max.saturating_sub(3)).collect::<String>())
    } else {
        first.to_string()
    }
}

fn styled_run_status(status: RunStatus) -> console::StyledObject<String> {
    let text = status.to_string();
    match status {
        RunStatus::Completed => style(text).green(),
        RunStatus::InProgress => style(text).yellow(),
        RunStatus::Blocked | RunStatus::Failed => style(text).red(),
    }
}

fn styled_stage_status(status: StageStatus) -> console::StyledObject<&'static str> {
    let text = status.as_str();
    match status {
        StageStatus::Succeeded => style(text).green(),
        StageStatus::Running => style(text).yellow(),
        StageStatus::Pending => style(text).dim(),
        StageStatus::Failed | StageStatus::Blocked => style(text).red(),
    }
}

pub(crate) fn print_session(session: &SessionState) {
    let counts = session.counts();
    println!("{}", style("Session").bold().cyan());
    println!("───────");
    println!("ID:      {}", session.session_id());
    println!("Task:    {}", truncate(&session.task().description, 70));
    println!("Status:  {}", styled_run_status(session.run_status()));
    println!(
        "Stages:  {} succeeded, {} running, {} pending, {} failed, {} blocked",
        counts.succeeded, counts.running, counts.pending, counts.failed, counts.blocked
    );
    println!(
        "Updated: {}",
        session.updated_at().format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!();

    for run in session.ordered_runs() {
        let duration = match (run.started_at(), run.ended_at()) {
            (Some(start), Some(end)) => format!("{:.1}s", (end - start).num_milliseconds() as f64 / 1000.0),
            _ => String::new(),
        };
        println!(
            "  {:<16} {:<10} {}",
            run.stage(),
            styled_stage_status(run.status()),
            style(duration).dim()
        );
        for result in run.results() {
            println!("      {}", summary_line(result));
        }
    }

    let blockers = session.blockers();
    if !blockers.is_empty() {
        println!();
        for (stage, reason) in blockers {
            println!("{} {}: {}", style("⛔").red(), stage, reason);
        }
    }
    println!();
}

fn find_session(store: &SessionStore, session_id: Option<&str>) -> Result<Option<SessionState>> {
    match session_id {
        Some(id) => Ok(Some(store.load(id)?)),
        None => Ok(store.latest()?),
    }
}

pub fn cmd_status(project_dir: &Path, session_id: Option<&str>) -> Result<()> {
    let config = SwarmConfig::load(project_dir);
    let store = session_store(&config, project_dir);

    println!();
    match find_session(&store, session_id)? {
        Some(session) => print_session(&session),
        None => println!("No sessions found. Start one with 'swarm run \"<task>\"'."),
    }
    Ok(())
}

pub fn cmd_sessions(project_dir: &Path) -> Result<()> {
    let config = SwarmConfig::load(project_dir);
    let sessions = session_store(&config, project_dir).list()?;

    println!();
    if sessions.is_empty() {
        println!("No sessions found.");
        println!();
        return Ok(());
    }

    println!("{:<25} {:<12} {:<8} {:<20} Task", "ID", "Status", "Stages", "Created");
    for session in &sessions {
        let counts = session.counts();
        println!(
            "{:<25} {:<12} {:<8} {:<20} {}",
            session.session_id(),
            styled_run_status(session.run_status()),
            format!("{}/{}", counts.succeeded, counts.total()),
            session.created_at().format("%Y-%m-%d %H:%M:%S"),
            truncate(&session.task().description, 50)
        );
    }
    println!();
    Ok(())
}

pub fn cmd_summaries(project_dir: &Path, session_id: Option<&str>) -> Result<()> {
    let config = SwarmConfig::load(project_dir);
    let store = session_store(&config, project_dir);

    println!();
    let Some(session) = find_session(&store, session_id)? else {
        println!("No sessions found.");
        println!();
        return Ok(());
    };

    let summaries = session.summaries();
    println!(
        "{} {} ({} of {} kept)",
        style("Summaries for").bold().cyan(),
        session.session_id(),
        summaries.len(),
        summaries.window()
    );
    println!();
    if summaries.is_empty() {
        println!("No worker results recorded yet.");
    }
    for result in summaries.iter() {
        println!("{}", summary_line(result));
    }
    println!();
    Ok(())
}
