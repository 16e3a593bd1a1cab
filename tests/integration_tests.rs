//! Integration tests for the swarm CLI.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn swarm() -> Command {
    let mut cmd = cargo_bin_cmd!("swarm");
    cmd.env_remove("SWARM_CLAUDE_CMD").env_remove("RUST_LOG");
    cmd
}

fn create_temp_project() -> TempDir {
    TempDir::new().unwrap()
}

/// Write an executable stand-in for the Claude CLI that ignores its prompt
/// and prints `envelope`.
fn fake_claude(dir: &Path, envelope: &str) -> PathBuf {
    let path = dir.join("fake-claude.sh");
    fs::write(
        &path,
        format!("#!/bin/sh\ncat > /dev/null\ncat <<'EOF'\n{}\nEOF\n", envelope),
    )
    .unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
    }
    path
}

const CLEAN_RESULT: &str = r#"{"result": "Done.\n```json\n{\"summary\": \"all good\", \"files_changed\": [\"src/lib.rs\"], \"issues\": []}\n```", "is_error": false}"#;

const BLOCKED_RESULT: &str = r#"{"result": "```json\n{\"summary\": \"found a hole\", \"issues\": [{\"severity\": \"critical\", \"description\": \"SQL injection\"}], \"blocked\": true, \"block_reason\": \"SQL injection in login\"}\n```", "is_error": false}"#;

mod cli_basics {
    use super::*;

    #[test]
    fn test_help() {
        swarm()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("resume"));
    }

    #[test]
    fn test_version() {
        swarm().arg("--version").assert().success();
    }

    #[test]
    fn test_init_creates_structure() {
        let dir = create_temp_project();
        fs::write(dir.path().join(".gitignore"), "target/\n").unwrap();

        swarm()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains(".swarm.yaml"));

        assert!(dir.path().join(".swarm.yaml").exists());
        assert!(dir.path().join(".swarm/state").is_dir());
        assert!(dir.path().join(".swarm/tasks").is_dir());
        assert!(dir.path().join(".swarm/summaries").is_dir());
        let gitignore = fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert!(gitignore.contains(".swarm/"));
    }

    #[test]
    fn test_init_twice_requires_force() {
        let dir = create_temp_project();
        swarm().current_dir(dir.path()).arg("init").assert().success();
        swarm()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .failure()
            .stderr(predicate::str::contains("already exists"));
        swarm()
            .current_dir(dir.path())
            .args(["init", "--force"])
            .assert()
            .success();
    }

    #[test]
    fn test_agents_lists_roles() {
        let dir = create_temp_project();
        swarm()
            .arg("--project-dir")
            .arg(dir.path())
            .arg("agents")
            .assert()
            .success()
            .stdout(predicate::str::contains("architect"))
            .stdout(predicate::str::contains("security"))
            .stdout(predicate::str::contains("debugger"));
    }

    #[test]
    fn test_config_shows_defaults() {
        let dir = create_temp_project();
        swarm()
            .current_dir(dir.path())
            .arg("config")
            .assert()
            .success()
            .stdout(predicate::str::contains("not found, using defaults"))
            .stdout(predicate::str::contains("summary_window: 20"));
    }
}

mod sessions {
    use super::*;

    #[test]
    fn test_no_sessions() {
        let dir = create_temp_project();
        swarm()
            .current_dir(dir.path())
            .arg("sessions")
            .assert()
            .success()
            .stdout(predicate::str::contains("No sessions found"));
        swarm()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("No sessions found"));
    }

    #[test]
    fn test_status_unknown_session_fails() {
        let dir = create_temp_project();
        swarm()
            .current_dir(dir.path())
            .args(["status", "20240101_000000_deadbeef"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not found"));
    }

    #[test]
    fn test_resume_unknown_session_fails() {
        let dir = create_temp_project();
        swarm()
            .current_dir(dir.path())
            .args(["resume", "nope"])
            .assert()
            .failure();
    }
}

#[cfg(unix)]
mod pipeline_runs {
    use super::*;

    #[test]
    fn test_run_completes_with_clean_workers() {
        let dir = create_temp_project();
        let claude = fake_claude(dir.path(), CLEAN_RESULT);

        swarm()
            .current_dir(dir.path())
            .env("SWARM_CLAUDE_CMD", &claude)
            .args(["run", "Add a health endpoint", "-c", "src/lib.rs"])
            .assert()
            .success()
            .stdout(predicate::str::contains("completed"))
            .stdout(predicate::str::contains("[CODER] ✓"));

        let states: Vec<_> = fs::read_dir(dir.path().join(".swarm/state"))
            .unwrap()
            .collect();
        assert_eq!(states.len(), 1);
        assert!(fs::read_dir(dir.path().join(".swarm/tasks")).unwrap().count() >= 4);

        swarm()
            .current_dir(dir.path())
            .arg("sessions")
            .assert()
            .success()
            .stdout(predicate::str::contains("3/3"))
            .stdout(predicate::str::contains("Add a health endpoint"));

        swarm()
            .current_dir(dir.path())
            .arg("summaries")
            .assert()
            .success()
            .stdout(predicate::str::contains("[SECURITY] ✓"))
            .stdout(predicate::str::contains("[TESTER] ✓"));
    }

    #[test]
    fn test_run_skips_stages() {
        let dir = create_temp_project();
        let claude = fake_claude(dir.path(), CLEAN_RESULT);

        swarm()
            .current_dir(dir.path())
            .env("SWARM_CLAUDE_CMD", &claude)
            .args(["run", "tiny fix", "--skip-security", "--skip-review", "--skip-tests"])
            .assert()
            .success()
            .stdout(predicate::str::contains("1 succeeded"));
    }

    #[test]
    fn test_run_single_agent() {
        let dir = create_temp_project();
        let claude = fake_claude(dir.path(), CLEAN_RESULT);

        swarm()
            .current_dir(dir.path())
            .env("SWARM_CLAUDE_CMD", &claude)
            .args(["run", "Fix the login bug", "--agent", "debugger"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[DEBUGGER] ✓"))
            .stdout(predicate::str::contains("1 succeeded"))
            .stdout(predicate::str::contains("[CODER]").not());

        swarm()
            .current_dir(dir.path())
            .arg("sessions")
            .assert()
            .success()
            .stdout(predicate::str::contains("1/1"));
    }

    #[test]
    fn test_run_without_pipeline_uses_coder() {
        let dir = create_temp_project();
        let claude = fake_claude(dir.path(), CLEAN_RESULT);

        swarm()
            .current_dir(dir.path())
            .env("SWARM_CLAUDE_CMD", &claude)
            .args(["run", "tiny fix", "--no-pipeline"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[CODER] ✓"))
            .stdout(predicate::str::contains("1 succeeded"));
    }

    #[test]
    fn test_run_unknown_agent_fails() {
        let dir = create_temp_project();

        swarm()
            .current_dir(dir.path())
            .args(["run", "anything", "-a", "wizard"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown agent 'wizard'"));

        assert!(!dir.path().join(".swarm/state").exists());
    }

    #[test]
    fn test_blocked_run_exits_nonzero() {
        let dir = create_temp_project();
        let claude = fake_claude(dir.path(), BLOCKED_RESULT);

        swarm()
            .current_dir(dir.path())
            .env("SWARM_CLAUDE_CMD", &claude)
            .args(["run", "Add login"])
            .assert()
            .failure()
            .stdout(predicate::str::contains("SQL injection in login"))
            .stderr(predicate::str::contains("blocked"));

        swarm()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("blocked"));
    }

    #[test]
    fn test_plan_without_execute_creates_pending_session() {
        let dir = create_temp_project();
        let plan = r#"{"result": "```json\n{\"summary\": \"two steps\", \"tasks\": [{\"id\": \"build\", \"agent\": \"coder\", \"task\": \"Build it\", \"depends_on\": []}, {\"id\": \"check\", \"agent\": \"tester\", \"task\": \"Test it\", \"depends_on\": [\"build\"]}]}\n```", "is_error": false}"#;
        let claude = fake_claude(dir.path(), plan);

        swarm()
            .current_dir(dir.path())
            .env("SWARM_CLAUDE_CMD", &claude)
            .args(["plan", "A feature"])
            .assert()
            .success()
            .stdout(predicate::str::contains("build"))
            .stdout(predicate::str::contains("swarm resume"));

        swarm()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("2 pending"));
    }
}
