//! Worker backed by a fresh Claude CLI process per invocation.

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::parse::parse_worker_output;
use super::roles::Role;
use super::{InvocationRequest, Worker, WorkerResult};
use crate::compaction::summary_line;
use crate::errors::InvocationError;

/// Process-level settings shared by every Claude worker.
#[derive(Debug, Clone)]
pub struct ClaudeWorkerConfig {
    /// Program plus optional leading arguments, split on whitespace.
    pub claude_cmd: String,
    pub project_root: PathBuf,
    /// Receives `tasks/` prompts and `summaries/` results.
    pub workspace: PathBuf,
}

/// One named worker: a role prompt, a tool allowlist and a turn budget.
#[derive(Debug, Clone)]
pub struct ClaudeWorker {
    name: String,
    system_prompt: String,
    output_format: String,
    allowed_tools: Vec<String>,
    max_turns: u32,
    config: ClaudeWorkerConfig,
}

impl ClaudeWorker {
    pub fn for_role(role: Role, config: ClaudeWorkerConfig) -> Self {
        Self {
            name: role.name().to_string(),
            system_prompt: role.system_prompt().to_string(),
            output_format: role.output_format().to_string(),
            allowed_tools: role.allowed_tools(),
            max_turns: role.max_turns(),
            config,
        }
    }

    /// A worker with a user-defined prompt, using the generic output format.
    pub fn custom(
        name: impl Into<String>,
        system_prompt: impl Into<String>,
        config: ClaudeWorkerConfig,
    ) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            output_format: Role::Coder.output_format().to_string(),
            allowed_tools: Role::Coder.allowed_tools(),
            max_turns: Role::Coder.max_turns(),
            config,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_allowed_tools(mut self, tools: Vec<String>) -> Self {
        self.allowed_tools = tools;
        self
    }

    pub fn with_max_turns(mut self, turns: u32) -> Self {
        self.max_turns = turns;
        self
    }

    pub fn max_turns(&self) -> u32 {
        self.max_turns
    }

    pub fn allowed_tools(&self) -> &[String] {
        &self.allowed_tools
    }

    /// Full prompt written to the process stdin.
    pub fn build_prompt(&self, request: &InvocationRequest) -> String {
        let mut prompt = format!("# Task\n\n{}\n", request.task.description);

        if !request.context.file_hints.is_empty() {
            prompt.push_str("\n# Relevant Files\n\n");
            for path in &request.context.file_hints {
                prompt.push_str(&format!("- `{}`\n", path.display()));
            }
        }

        if !request.context.recent_summaries.is_empty() {
            prompt.push_str("\n# Recent Work\n\n");
            for result in &request.context.recent_summaries {
                prompt.push_str(&format!("- {}\n", summary_line(result)));
            }
        }

        prompt.push_str(&format!("\n# Output Requirements\n\n{}\n", self.output_format));
        prompt
    }

    fn invocation_id(prompt: &str) -> String {
        let digest = Sha256::digest(prompt.as_bytes());
        let hash: String = digest.iter().take(3).map(|b| format!("{:02x}", b)).collect();
        format!("{}_{}", Utc::now().format("%Y%m%d_%H%M%S"), hash)
    }

    fn command(&self) -> Result<Command, InvocationError> {
        let mut parts = self.config.claude_cmd.split_whitespace();
        let program = parts.next().ok_or_else(|| {
            InvocationError::Spawn(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "claude command is empty",
            ))
        })?;

        let mut cmd = Command::new(program);
        cmd.args(parts)
            .arg("--print")
            .arg("--output-format")
            .arg("json")
            .arg("--max-turns")
            .arg(self.max_turns.to_string())
            .arg("--allowedTools")
            .arg(self.allowed_tools.join(","))
            .arg("--system-prompt")
            .arg(&self.system_prompt)
            .current_dir(&self.config.project_root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(cmd)
    }

    async fn write_artifact(&self, dir: &str, file: String, contents: &str) {
        let path = self.config.workspace.join(dir).join(file);
        if let Err(e) = write_file(&path, contents).await {
            warn!(worker = %self.name, path = %path.display(), error = %e, "Failed to write worker artifact");
        }
    }
}

async fn write_file(path: &Path, contents: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, contents).await
}

#[async_trait]
impl Worker for ClaudeWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, request: &InvocationRequest) -> Result<WorkerResult, InvocationError> {
        let started = Instant::now();
        let prompt = self.build_prompt(request);
        let id = Self::invocation_id(&prompt);

        self.write_artifact("tasks", format!("{}_{}.md", self.name, id), &prompt)
            .await;

        debug!(worker = %self.name, id = %id, prompt_chars = prompt.len(), "Spawning Claude process");

        let mut child = self.command()?.spawn().map_err(InvocationError::Spawn)?;

        // Feed stdin while stdout and stderr drain, so neither side can stall
        // on a full pipe.
        let stdin = child.stdin.take();
        let feed = async {
            if let Some(mut stdin) = stdin {
                stdin.write_all(prompt.as_bytes()).await?;
                stdin.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output.map_err(InvocationError::Io)?;
        match fed {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                debug!(worker = %self.name, "Claude process closed stdin before reading the whole prompt");
            }
            Err(e) => return Err(InvocationError::Io(e)),
        }
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();

        if !output.status.success() {
            return Err(InvocationError::NonZeroExit {
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let parsed = parse_worker_output(&stdout)?;

        let mut result = WorkerResult::new(&self.name, parsed.summary)
            .with_files(parsed.files_changed)
            .with_issues(parsed.issues)
            .with_raw_output(parsed.body)
            .with_duration(started.elapsed());
        if parsed.blocked {
            result = result.blocked_by(
                parsed
                    .block_reason
                    .unwrap_or_else(|| format!("{} blocked without a reason", self.name)),
            );
        }

        match serde_json::to_string_pretty(&result) {
            Ok(json) => {
                self.write_artifact("summaries", format!("{}_{}.json", self.name, id), &json)
                    .await
            }
            Err(e) => warn!(worker = %self.name, error = %e, "Failed to serialize worker summary"),
        }

        Ok(result)
    }
}
