//! Built-in worker roles.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const READ_ONLY: &[&str] = &["Read", "Glob", "Grep"];
const FULL: &[&str] = &["Read", "Write", "Edit", "Bash", "Glob", "Grep"];

/// A specialized role a Claude-backed worker can play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Architect,
    Coder,
    Reviewer,
    Security,
    Tester,
    Docs,
    Refactor,
    Debugger,
}

impl Role {
    pub const ALL: [Role; 8] = [
        Role::Architect,
        Role::Coder,
        Role::Reviewer,
        Role::Security,
        Role::Tester,
        Role::Docs,
        Role::Refactor,
        Role::Debugger,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Architect => "architect",
            Self::Coder => "coder",
            Self::Reviewer => "reviewer",
            Self::Security => "security",
            Self::Tester => "tester",
            Self::Docs => "docs",
            Self::Refactor => "refactor",
            Self::Debugger => "debugger",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Architect => "Plans features and breaks them into tasks",
            Self::Coder => "Writes production code",
            Self::Reviewer => "Reviews changes for bugs and maintainability",
            Self::Security => "Audits changes for vulnerabilities; can block",
            Self::Tester => "Writes and runs tests",
            Self::Docs => "Updates documentation",
            Self::Refactor => "Restructures code without changing behavior",
            Self::Debugger => "Diagnoses and fixes failures",
        }
    }

    pub fn allowed_tools(&self) -> Vec<String> {
        let tools: &[&str] = match self {
            Self::Architect | Self::Reviewer => READ_ONLY,
            Self::Security => &["Read", "Glob", "Grep", "Bash"],
            Self::Docs => &["Read", "Write", "Edit", "Glob"],
            Self::Debugger => &["Read", "Bash", "Glob", "Grep", "Edit"],
            Self::Coder | Self::Tester | Self::Refactor => FULL,
        };
        tools.iter().map(|t| t.to_string()).collect()
    }

    pub fn max_turns(&self) -> u32 {
        match self {
            Self::Coder | Self::Tester | Self::Refactor => 15,
            Self::Debugger => 20,
            _ => 10,
        }
    }

    /// Whether this role may flag its result as blocked.
    pub fn can_block(&self) -> bool {
        matches!(self, Self::Security | Self::Reviewer)
    }

    pub fn system_prompt(&self) -> &'static str {
        match self {
            Self::Architect => {
                "You are the ARCHITECT in a multi-agent development system. \
                 Read the existing code, design the solution and break it into \
                 tasks that one agent each can complete, ordered by dependency. \
                 Do not write code."
            }
            Self::Coder => {
                "You are the CODE WRITER in a multi-agent development system. \
                 Implement the task following the project's existing patterns. \
                 Do not review, test or document; other agents do that."
            }
            Self::Reviewer => {
                "You are the CODE REVIEWER in a multi-agent development system. \
                 Find bugs, unhandled edge cases and maintainability problems in \
                 the recent changes. Prefix each issue with its severity: \
                 critical, warning or info. Do not modify files."
            }
            Self::Security => {
                "You are the SECURITY AUDITOR in a multi-agent development system. \
                 Look for injection, broken auth, data exposure, weak crypto and \
                 hardcoded secrets. Prefix each finding with critical, high, \
                 medium or low. Block the change on any exploitable finding."
            }
            Self::Tester => {
                "You are the TEST ENGINEER in a multi-agent development system. \
                 Write tests for the recent changes using the project's test \
                 framework, cover edge cases and run them."
            }
            Self::Docs => {
                "You are the DOCUMENTATION writer in a multi-agent development \
                 system. Update docs and comments for the recent changes, matching \
                 the existing style."
            }
            Self::Refactor => {
                "You are the REFACTORING agent in a multi-agent development system. \
                 Improve structure and naming without changing behavior, and keep \
                 the tests passing."
            }
            Self::Debugger => {
                "You are the DEBUGGER in a multi-agent development system. \
                 Reproduce the problem, find the root cause and apply a targeted fix."
            }
        }
    }

    /// Closing instructions describing the JSON block the role must print.
    pub fn output_format(&self) -> &'static str {
        match self {
            Self::Architect => {
                r#"Finish with this exact block:

```json
{
  "summary": "High-level implementation approach",
  "tasks": [
    {"id": "task_0", "agent": "coder", "task": "Implement X in file Y", "depends_on": []},
    {"id": "task_1", "agent": "tester", "task": "Write tests for X", "depends_on": ["task_0"]}
  ]
}
```"#
            }
            Self::Reviewer | Self::Security => {
                r#"Finish with this exact block:

```json
{
  "summary": "Overall assessment",
  "issues": [
    {"severity": "critical", "file": "path/file.rs", "line": 42, "description": "What is wrong"}
  ],
  "blocked": false,
  "block_reason": null
}
```"#
            }
            _ => {
                r#"Finish with this exact block:

```json
{
  "summary": "What was done",
  "files_changed": ["path/to/file"],
  "files_created": ["path/to/new_file"],
  "issues": []
}
```"#
            }
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|role| role.name() == lowered)
            .ok_or_else(|| format!("unknown role '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip_by_name() {
        for role in Role::ALL {
            assert_eq!(role.name().parse::<Role>().unwrap(), role);
        }
        assert_eq!("Security".parse::<Role>().unwrap(), Role::Security);
        assert!("janitor".parse::<Role>().is_err());
    }

    #[test]
    fn test_read_only_roles_cannot_write() {
        for role in [Role::Architect, Role::Reviewer, Role::Security] {
            let tools = role.allowed_tools();
            assert!(!tools.iter().any(|t| t == "Write" || t == "Edit"), "{role}");
        }
        assert!(Role::Coder.allowed_tools().contains(&"Write".to_string()));
    }

    #[test]
    fn test_turn_budgets() {
        assert_eq!(Role::Coder.max_turns(), 15);
        assert_eq!(Role::Debugger.max_turns(), 20);
        assert_eq!(Role::Reviewer.max_turns(), 10);
    }

    #[test]
    fn test_architect_format_mentions_tasks() {
        assert!(Role::Architect.output_format().contains("\"tasks\""));
        assert!(Role::Security.can_block());
        assert!(!Role::Coder.can_block());
    }
}
