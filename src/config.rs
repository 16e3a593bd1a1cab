//! `.swarm.yaml` project configuration.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::compaction::{DEFAULT_RECENT_CONTEXT, DEFAULT_SUMMARY_WINDOW};
use crate::dag::StageSpec;
use crate::gates::Gate;
use crate::orchestrator::PipelineConfig;
use crate::worker::{
    ClaudeWorker, ClaudeWorkerConfig, DEFAULT_WORKER_TIMEOUT_SECS, Role, WorkerInvoker,
    WorkerRegistry,
};

pub const CONFIG_FILE: &str = ".swarm.yaml";
pub const CLAUDE_CMD_ENV: &str = "SWARM_CLAUDE_CMD";

/// Orchestrator knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSettings {
    pub summary_window: usize,
    pub recent_context: usize,
    pub worker_timeout_secs: u64,
    /// Run security and code review as one parallel stage.
    pub parallel_reviews: bool,
    /// Halt the pipeline when the security worker reports a blocker.
    pub require_security_pass: bool,
    pub require_tests: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            summary_window: DEFAULT_SUMMARY_WINDOW,
            recent_context: DEFAULT_RECENT_CONTEXT,
            worker_timeout_secs: DEFAULT_WORKER_TIMEOUT_SECS,
            parallel_reviews: true,
            require_security_pass: true,
            require_tests: true,
        }
    }
}

/// Per-role overrides. Unset fields keep the role's defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentOverride {
    pub enabled: bool,
    pub max_turns: Option<u32>,
    pub allowed_tools: Vec<String>,
    pub system_prompt_override: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl Default for AgentOverride {
    fn default() -> Self {
        Self {
            enabled: true,
            max_turns: None,
            allowed_tools: Vec::new(),
            system_prompt_override: None,
            timeout_secs: None,
        }
    }
}

/// A project-specific worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomAgent {
    pub system_prompt: String,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub max_turns: Option<u32>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Which default-pipeline workers to leave out for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    pub skip_security: bool,
    pub skip_review: bool,
    pub skip_tests: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    pub workspace_dir: PathBuf,
    pub claude_cmd: String,
    pub orchestrator: OrchestratorSettings,
    pub agents: BTreeMap<String, AgentOverride>,
    pub custom_agents: BTreeMap<String, CustomAgent>,
    /// Explicit stage list replacing the default pipeline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<Vec<StageSpec>>,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            workspace_dir: PathBuf::from(".swarm"),
            claude_cmd: "claude".to_string(),
            orchestrator: OrchestratorSettings::default(),
            agents: BTreeMap::new(),
            custom_agents: BTreeMap::new(),
            pipeline: None,
        }
    }
}

impl SwarmConfig {
    /// Load `.swarm.yaml` from `project_root`.
    ///
    /// A missing file yields defaults; an unreadable or invalid one is
    /// reported and also yields defaults. `SWARM_CLAUDE_CMD` overrides
    /// `claude_cmd` either way.
    pub fn load(project_root: &Path) -> Self {
        let path = project_root.join(CONFIG_FILE);
        let mut config = if path.exists() {
            match Self::from_file(&path) {
                Ok(config) => {
                    debug!(path = %path.display(), "Loaded configuration");
                    config
                }
                Err(e) => {
                    let error = format!("{:#}", e);
                    warn!(path = %path.display(), error = %error, "Could not load configuration, using defaults");
                    Self::default()
                }
            }
        } else {
            Self::default()
        };

        if let Ok(cmd) = std::env::var(CLAUDE_CMD_ENV) {
            if !cmd.trim().is_empty() {
                config.claude_cmd = cmd;
            }
        }
        config
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).context("Failed to parse configuration YAML")
    }

    pub fn workspace(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.workspace_dir)
    }

    /// Directory holding session snapshots.
    pub fn state_dir(&self, project_root: &Path) -> PathBuf {
        self.workspace(project_root).join("state")
    }

    pub fn agent_enabled(&self, name: &str) -> bool {
        self.agents.get(name).is_none_or(|a| a.enabled)
    }

    pub fn timeout_for(&self, name: &str) -> Duration {
        let secs = self
            .agents
            .get(name)
            .and_then(|a| a.timeout_secs)
            .or_else(|| self.custom_agents.get(name).and_then(|c| c.timeout_secs))
            .unwrap_or(self.orchestrator.worker_timeout_secs);
        Duration::from_secs(secs)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::default()
            .with_summary_window(self.orchestrator.summary_window)
            .with_recent_context(self.orchestrator.recent_context)
    }

    /// Claude-backed workers for every enabled role plus the custom agents.
    pub fn build_registry(&self, project_root: &Path) -> WorkerRegistry {
        let process = ClaudeWorkerConfig {
            claude_cmd: self.claude_cmd.clone(),
            project_root: project_root.to_path_buf(),
            workspace: self.workspace(project_root),
        };

        let mut registry = WorkerRegistry::new();
        for role in Role::ALL {
            let overrides = self.agents.get(role.name()).cloned().unwrap_or_default();
            if !overrides.enabled {
                continue;
            }
            let mut worker = ClaudeWorker::for_role(role, process.clone());
            if let Some(prompt) = overrides.system_prompt_override {
                worker = worker.with_system_prompt(prompt);
            }
            if !overrides.allowed_tools.is_empty() {
                worker = worker.with_allowed_tools(overrides.allowed_tools);
            }
            if let Some(turns) = overrides.max_turns {
                worker = worker.with_max_turns(turns);
            }
            registry.register(Arc::new(worker));
        }

        for (name, custom) in &self.custom_agents {
            if !self.agent_enabled(name) {
                continue;
            }
            let mut worker = ClaudeWorker::custom(name, &custom.system_prompt, process.clone());
            if !custom.allowed_tools.is_empty() {
                worker = worker.with_allowed_tools(custom.allowed_tools.clone());
            }
            if let Some(turns) = custom.max_turns {
                worker = worker.with_max_turns(turns);
            }
            registry.register(Arc::new(worker));
        }

        registry
    }

    /// Invoker over `registry` with the configured timeouts.
    pub fn build_invoker(&self, registry: WorkerRegistry) -> WorkerInvoker {
        let names: Vec<String> = registry.names().map(String::from).collect();
        let mut invoker = WorkerInvoker::new(registry)
            .with_default_timeout(Duration::from_secs(self.orchestrator.worker_timeout_secs));
        for name in names {
            let timeout = self.timeout_for(&name);
            invoker = invoker.with_worker_timeout(name, timeout);
        }
        invoker
    }

    /// The configured stage list, or the default pipeline.
    pub fn stages(&self, options: PipelineOptions) -> Vec<StageSpec> {
        match &self.pipeline {
            Some(stages) => stages.clone(),
            None => self.default_pipeline(options),
        }
    }

    /// One-stage graph running only `agent`, a built-in role or a custom agent.
    pub fn single_agent_stage(&self, agent: &str) -> Result<StageSpec> {
        let known = Role::ALL.iter().any(|r| r.name() == agent)
            || self.custom_agents.contains_key(agent);
        if !known {
            bail!("Unknown agent '{}'. Run `swarm agents` to list them", agent);
        }
        if !self.agent_enabled(agent) {
            bail!("Agent '{}' is disabled in {}", agent, CONFIG_FILE);
        }
        Ok(StageSpec::new(agent, [agent]))
    }

    /// `code` → `review` (security + reviewer) → `test`.
    ///
    /// Skipped or disabled workers are removed and empty stages are dropped.
    /// Only the security worker's blocked flag halts the pipeline. With
    /// sequential reviews each reviewer gets its own stage on the same
    /// upstream, so the reviewer still runs when security blocks.
    pub fn default_pipeline(&self, options: PipelineOptions) -> Vec<StageSpec> {
        const REVIEW_INSTRUCTIONS: &str = "Review the changes made for this task.";
        let settings = &self.orchestrator;
        let enabled = |role: Role| self.agent_enabled(role.name());
        let security_gate = || Gate::BlockedBy {
            workers: vec![Role::Security.name().to_string()],
        };

        let mut stages: Vec<StageSpec> = Vec::new();
        let mut upstream: Vec<String> = Vec::new();

        if enabled(Role::Coder) {
            stages.push(StageSpec::new("code", [Role::Coder.name()]).with_gate(Gate::Blocking));
            upstream = vec!["code".to_string()];
        }

        let mut reviewers = Vec::new();
        if !options.skip_security && enabled(Role::Security) {
            reviewers.push(Role::Security);
        }
        if !options.skip_review && enabled(Role::Reviewer) {
            reviewers.push(Role::Reviewer);
        }
        let gated = settings.require_security_pass && reviewers.contains(&Role::Security);

        if settings.parallel_reviews && !reviewers.is_empty() {
            let mut stage = StageSpec::new("review", reviewers.iter().map(|r| r.name()))
                .with_instructions(REVIEW_INSTRUCTIONS)
                .depends_on(upstream.clone());
            if gated {
                stage = stage.with_gate(security_gate());
            }
            stages.push(stage);
            upstream = vec!["review".to_string()];
        } else if !reviewers.is_empty() {
            let mut names = Vec::new();
            for role in reviewers {
                let mut stage = StageSpec::new(role.name(), [role.name()])
                    .with_instructions(REVIEW_INSTRUCTIONS)
                    .depends_on(upstream.clone());
                if gated && role == Role::Security {
                    stage = stage.with_gate(security_gate());
                }
                names.push(stage.name.clone());
                stages.push(stage);
            }
            upstream = names;
        }

        if settings.require_tests && !options.skip_tests && enabled(Role::Tester) {
            stages.push(
                StageSpec::new("test", [Role::Tester.name()])
                    .with_instructions("Write and run tests for the changes made for this task.")
                    .depends_on(upstream),
            );
        }
        stages
    }
}

const DEFAULT_CONFIG_YAML: &str = r#"# swarm configuration

workspace_dir: .swarm
claude_cmd: claude        # SWARM_CLAUDE_CMD overrides this

orchestrator:
  summary_window: 20      # results kept per session
  recent_context: 5       # results handed to each worker
  worker_timeout_secs: 300
  parallel_reviews: true  # security and code review in one parallel stage
  require_security_pass: true  # only a security blocker halts the pipeline
  require_tests: true

# Per-role overrides: enabled, max_turns, allowed_tools,
# system_prompt_override, timeout_secs
agents:
  coder:
    enabled: true
  reviewer:
    enabled: true
  security:
    enabled: true
  tester:
    enabled: true

# custom_agents:
#   aws_specialist:
#     system_prompt: "You are an AWS infrastructure specialist..."
#     allowed_tools: ["Read", "Bash"]

# Explicit pipeline replacing the default code -> review -> test:
# pipeline:
#   - name: code
#     workers: [coder]
#     gate: { type: blocking }
#   - name: review
#     workers: [security, reviewer]
#     depends_on: [code]
#     gate: { type: severity, block_on: [critical, high] }
"#;

/// Write a default `.swarm.yaml`, create the workspace directories and add the
/// workspace to an existing `.gitignore`.
pub fn init_config(project_root: &Path, force: bool) -> Result<PathBuf> {
    let path = project_root.join(CONFIG_FILE);
    if path.exists() && !force {
        bail!(
            "Configuration already exists at {} (use --force to overwrite)",
            path.display()
        );
    }
    std::fs::write(&path, DEFAULT_CONFIG_YAML)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    let config = SwarmConfig::from_yaml(DEFAULT_CONFIG_YAML)?;
    let workspace = config.workspace(project_root);
    for sub in ["state", "tasks", "summaries"] {
        let dir = workspace.join(sub);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let gitignore = project_root.join(".gitignore");
    if gitignore.exists() {
        let content = std::fs::read_to_string(&gitignore).context("Failed to read .gitignore")?;
        let entry = format!("{}/", config.workspace_dir.display());
        if !content.lines().any(|l| l.trim() == entry) {
            let mut updated = content;
            if !updated.is_empty() && !updated.ends_with('\n') {
                updated.push('\n');
            }
            updated.push_str(&format!("\n# swarm workspace\n{}\n", entry));
            std::fs::write(&gitignore, updated).context("Failed to update .gitignore")?;
        }
    }

    Ok(path)
}
