use serde::{Deserialize, Serialize};

use crate::gates::Gate;

/// Declaration of one stage in the pipeline.
///
/// More than one worker means the workers run concurrently against the same
/// context snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSpec {
    pub name: String,
    pub workers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate: Option<Gate>,
    /// Appended to the task description for this stage's workers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl StageSpec {
    pub fn new<I, S>(name: impl Into<String>, workers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            workers: workers.into_iter().map(Into::into).collect(),
            depends_on: Vec::new(),
            gate: None,
            instructions: None,
        }
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn with_gate(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn is_parallel(&self) -> bool {
        self.workers.len() > 1
    }

    pub fn is_gated(&self) -> bool {
        self.gate.is_some()
    }
}
