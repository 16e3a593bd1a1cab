use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use swarm::logging::{self, LogFormat};
use swarm::worker::Role;

mod cmd;

#[derive(Parser)]
#[command(name = "swarm")]
#[command(version, about = "Run coding tasks through a pipeline of specialized Claude agents")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Format of diagnostic logs written to stderr
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default .swarm.yaml and create the workspace
    Init {
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },
    /// Run a task through the pipeline
    Run {
        task: String,
        /// Files to hand to every worker as context
        #[arg(short, long = "context")]
        context: Vec<PathBuf>,
        /// Run only this agent (a built-in role or a custom agent)
        #[arg(short, long)]
        agent: Option<String>,
        /// Run the coder alone, without review or tests
        #[arg(long)]
        no_pipeline: bool,
        #[arg(long)]
        skip_security: bool,
        #[arg(long)]
        skip_review: bool,
        #[arg(long)]
        skip_tests: bool,
    },
    /// Plan a feature with the architect agent
    Plan {
        feature: String,
        /// Execute the plan immediately
        #[arg(short, long)]
        execute: bool,
    },
    /// Continue an interrupted session
    Resume { session_id: String },
    /// Show a session (defaults to the most recent)
    Status { session_id: Option<String> },
    /// List sessions, newest first
    Sessions,
    /// Show the compact summaries recorded for a session
    Summaries {
        #[arg(short, long)]
        session: Option<String>,
    },
    /// List available agents
    Agents,
    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_format);

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match cli.command {
        Commands::Init { force } => cmd::cmd_init(&project_dir, force)?,
        Commands::Run {
            task,
            context,
            agent,
            no_pipeline,
            skip_security,
            skip_review,
            skip_tests,
        } => {
            let mode = match agent {
                Some(agent) => cmd::RunMode::Single(agent),
                None if no_pipeline => cmd::RunMode::Single(Role::Coder.name().to_string()),
                None => cmd::RunMode::Pipeline(swarm::config::PipelineOptions {
                    skip_security,
                    skip_review,
                    skip_tests,
                }),
            };
            cmd::cmd_run(&project_dir, &task, context, mode).await?;
        }
        Commands::Plan { feature, execute } => cmd::cmd_plan(&project_dir, &feature, execute).await?,
        Commands::Resume { session_id } => cmd::cmd_resume(&project_dir, &session_id).await?,
        Commands::Status { session_id } => cmd::cmd_status(&project_dir, session_id.as_deref())?,
        Commands::Sessions => cmd::cmd_sessions(&project_dir)?,
        Commands::Summaries { session } => cmd::cmd_summaries(&project_dir, session.as_deref())?,
        Commands::Agents => cmd::cmd_agents(&project_dir)?,
        Commands::Config => cmd::cmd_config(&project_dir)?,
    }

    Ok(())
}
