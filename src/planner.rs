//! Turn a feature request into a stage list using the architect worker.
//!
//! The architect is asked for a block of the form:
//!
//! ```json
//! {
//!   "tasks": [
//!     {"id": "task_0", "agent": "coder", "task": "Implement X", "depends_on": []},
//!     {"id": "task_1", "agent": "tester", "task": "Test X", "depends_on": ["task_0"]}
//!   ]
//! }
//! ```
//!
//! Each task becomes one stage. Output that cannot be turned into a valid
//! graph falls back to coder followed by parallel security, review and tests.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{info, warn};

use crate::dag::{DagBuilder, StageSpec};
use crate::gates::Gate;
use crate::util::extract_json_object;
use crate::worker::parse::json_block;
use crate::worker::{ContextBundle, Role, Task, WorkerInvoker, WorkerResult};

#[derive(Debug, Deserialize)]
struct RawPlan {
    tasks: Vec<RawPlanTask>,
}

#[derive(Debug, Deserialize)]
struct RawPlanTask {
    #[serde(default)]
    id: String,
    #[serde(default)]
    agent: String,
    #[serde(default)]
    task: String,
    #[serde(default)]
    depends_on: Vec<String>,
}

/// Stages for a feature, plus where they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub stages: Vec<StageSpec>,
    /// False when the fallback graph was used.
    pub from_architect: bool,
    /// The architect's summary of the approach, if it produced one.
    pub architecture: String,
}

/// Prompt handed to the architect.
pub fn planning_prompt(feature: &str) -> String {
    format!(
        "Plan the implementation for:\n\n{}\n\n\
         Break this down into discrete tasks for the coder, reviewer, security and tester agents.",
        feature
    )
}

/// Parse architect output into stages.
///
/// Agents for which `is_known` returns false are assigned to the coder.
/// Dependencies on unknown task ids are dropped. Returns `None` when no task
/// list is found or the tasks do not form a valid graph.
pub fn parse_plan(output: &str, is_known: impl Fn(&str) -> bool) -> Option<Vec<StageSpec>> {
    let value = find_task_list(output)?;
    let raw: RawPlan = serde_json::from_value(value).ok()?;
    if raw.tasks.is_empty() {
        return None;
    }

    let ids: Vec<String> = raw
        .tasks
        .iter()
        .enumerate()
        .map(|(i, t)| {
            let id = t.id.trim();
            if id.is_empty() {
                format!("task_{}", i)
            } else {
                id.to_string()
            }
        })
        .collect();
    let id_set: HashSet<&str> = ids.iter().map(String::as_str).collect();

    let mut stages = Vec::with_capacity(raw.tasks.len());
    for (task, id) in raw.tasks.iter().zip(&ids) {
        let agent = task.agent.trim();
        let worker = if is_known(agent) {
            agent
        } else {
            warn!(task = %id, agent = %agent, "Unknown agent in plan, assigning to coder");
            Role::Coder.name()
        };

        let mut deps = Vec::new();
        for dep in &task.depends_on {
            if id_set.contains(dep.as_str()) && dep != id {
                deps.push(dep.clone());
            } else {
                warn!(task = %id, dependency = %dep, "Dropping unknown plan dependency");
            }
        }

        let mut stage = StageSpec::new(id.clone(), [worker]).depends_on(deps);
        if !task.task.trim().is_empty() {
            stage = stage.with_instructions(task.task.trim());
        }
        if Role::Security.name() == worker {
            stage = stage.with_gate(Gate::Blocking);
        }
        stages.push(stage);
    }

    match DagBuilder::new(stages.clone()).build() {
        Ok(_) => Some(stages),
        Err(e) => {
            warn!(error = %e, "Architect plan is not a valid stage graph");
            None
        }
    }
}

fn find_task_list(output: &str) -> Option<Value> {
    let has_tasks = |v: &Value| v.get("tasks").is_some_and(Value::is_array);
    if let Some(value) = json_block(output).filter(has_tasks) {
        return Some(value);
    }
    let object = extract_json_object(output)?;
    serde_json::from_str::<Value>(object)
        .ok()
        .filter(has_tasks)
}

/// Coder first, then security, review and tests in parallel.
pub fn fallback_plan() -> Vec<StageSpec> {
    vec![
        StageSpec::new("code", [Role::Coder.name()]).with_instructions("Implement the feature."),
        StageSpec::new("security", [Role::Security.name()])
            .depends_on(["code"])
            .with_gate(Gate::Blocking)
            .with_instructions("Security review of the implementation."),
        StageSpec::new("review", [Role::Reviewer.name()])
            .depends_on(["code"])
            .with_instructions("Code review of the implementation."),
        StageSpec::new("test", [Role::Tester.name()])
            .depends_on(["code"])
            .with_instructions("Write tests for the implementation."),
    ]
}

fn plan_from_result(result: &WorkerResult, is_known: impl Fn(&str) -> bool + Copy) -> Plan {
    if !result.is_success() {
        warn!(summary = %result.summary, "Architect failed, using fallback plan");
        return Plan {
            stages: fallback_plan(),
            from_architect: false,
            architecture: String::new(),
        };
    }

    let parsed = parse_plan(&result.raw_output, is_known).or_else(|| parse_plan(&result.summary, is_known));
    match parsed {
        Some(stages) => Plan {
            stages,
            from_architect: true,
            architecture: result.summary.clone(),
        },
        None => {
            warn!("No usable task list in architect output, using fallback plan");
            Plan {
                stages: fallback_plan(),
                from_architect: false,
                architecture: result.summary.clone(),
            }
        }
    }
}

/// Ask the architect worker to plan `feature`.
pub async fn plan_feature(invoker: &WorkerInvoker, feature: &str) -> Plan {
    info!(feature = %feature, "Planning feature");
    let context = ContextBundle {
        task: Task::new(planning_prompt(feature)),
        ..Default::default()
    };
    let result = invoker.invoke(Role::Architect.name(), context).await;
    let registry = invoker.registry();
    plan_from_result(&result, |name| registry.contains(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::InvocationError;
    use crate::worker::{InvocationRequest, Worker, WorkerRegistry};
    use async_trait::async_trait;
    use std::sync::Arc;

    fn known(name: &str) -> bool {
        matches!(name, "coder" | "tester" | "security" | "reviewer")
    }

    const PLAN: &str = r#"Approach below.

```json
{
  "summary": "Add a login endpoint",
  "tasks": [
    {"id": "task_0", "agent": "coder", "task": "Implement login", "depends_on": []},
    {"id": "task_1", "agent": "security", "task": "Audit login", "depends_on": ["task_0"]},
    {"id": "task_2", "agent": "tester", "task": "Test login", "depends_on": ["task_0", "ghost"]}
  ]
}
```
"#;

    #[test]
    fn test_parse_plan_builds_stages() {
        let stages = parse_plan(PLAN, known).unwrap();
        assert_eq!(stages.len(), 3);
        assert_eq!(stages[0].name, "task_0");
        assert_eq!(stages[0].workers, vec!["coder"]);
        assert_eq!(stages[0].instructions.as_deref(), Some("Implement login"));
        assert_eq!(stages[1].gate, Some(Gate::Blocking));
        assert_eq!(stages[2].depends_on, vec!["task_0"]);
    }

    #[test]
    fn test_unknown_agent_becomes_coder() {
        let output = r#"{"tasks": [{"id": "a", "agent": "wizard", "task": "magic"}]}"#;
        let stages = parse_plan(output, known).unwrap();
        assert_eq!(stages[0].workers, vec!["coder"]);
    }

    #[test]
    fn test_missing_ids_are_generated() {
        let output = r#"{"tasks": [{"agent": "coder", "task": "one"}, {"agent": "tester", "task": "two"}]}"#;
        let stages = parse_plan(output, known).unwrap();
        assert_eq!(stages[0].name, "task_0");
        assert_eq!(stages[1].name, "task_1");
    }

    #[test]
    fn test_cyclic_or_missing_plan_is_rejected() {
        let cyclic = r#"{"tasks": [
            {"id": "a", "agent": "coder", "depends_on": ["b"]},
            {"id": "b", "agent": "coder", "depends_on": ["a"]}
        ]}"#;
        assert!(parse_plan(cyclic, known).is_none());
        assert!(parse_plan("no plan here", known).is_none());
        assert!(parse_plan(r#"{"tasks": []}"#, known).is_none());
    }

    #[test]
    fn test_fallback_plan_is_valid() {
        let stages = fallback_plan();
        let graph = DagBuilder::new(stages).build().unwrap();
        assert_eq!(graph.root_stages().len(), 1);
        assert_eq!(graph.dependents(graph.index_of("code").unwrap()).len(), 3);
    }

    struct Architect(Result<&'static str, &'static str>);

    #[async_trait]
    impl Worker for Architect {
        fn name(&self) -> &str {
            "architect"
        }

        async fn invoke(&self, request: &InvocationRequest) -> Result<WorkerResult, InvocationError> {
            assert!(request.task.description.contains("Plan the implementation"));
            match self.0 {
                Ok(raw) => Ok(WorkerResult::new("architect", "Add a login endpoint").with_raw_output(raw)),
                Err(msg) => Err(InvocationError::Reported(msg.to_string())),
            }
        }
    }

    fn invoker(architect: Architect) -> WorkerInvoker {
        let mut registry = WorkerRegistry::new();
        registry.register(Arc::new(architect));
        WorkerInvoker::new(registry)
    }

    #[tokio::test]
    async fn test_plan_feature_uses_architect_output() {
        let plan = plan_feature(&invoker(Architect(Ok(PLAN))), "login").await;
        assert!(plan.from_architect);
        assert_eq!(plan.architecture, "Add a login endpoint");
        // Only the architect is registered, so every task lands on the coder.
        assert!(plan.stages.iter().all(|s| s.workers == vec!["coder"]));
    }

    #[tokio::test]
    async fn test_plan_feature_falls_back_on_failure() {
        let plan = plan_feature(&invoker(Architect(Err("boom"))), "login").await;
        assert!(!plan.from_architect);
        assert_eq!(plan.stages, fallback_plan());
    }
}
