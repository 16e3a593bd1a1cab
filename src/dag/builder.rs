//! DAG builder for constructing stage graphs.
//!
//! The builder takes stage declarations with their dependencies, validates them
//! and produces a [`StageGraph`] used for scheduling and persisted with every
//! session.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::stage::StageSpec;
use crate::errors::PipelineError;

/// Index into the stage list.
pub type StageIndex = usize;

/// A validated directed acyclic graph of stages, in declaration order.
///
/// Serializes as the plain stage list; deserializing re-runs validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<StageSpec>", into = "Vec<StageSpec>")]
pub struct StageGraph {
    stages: Vec<StageSpec>,
    /// Map from stage name to index
    index_map: HashMap<String, StageIndex>,
    /// index -> stages that depend on it
    forward_edges: Vec<Vec<StageIndex>>,
    /// index -> stages it depends on
    reverse_edges: Vec<Vec<StageIndex>>,
}

impl StageGraph {
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    pub fn get(&self, name: &str) -> Option<&StageSpec> {
        self.index_map.get(name).and_then(|&i| self.stages.get(i))
    }

    pub fn index_of(&self, name: &str) -> Option<StageIndex> {
        self.index_map.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_map.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(|s| s.name.as_str())
    }

    /// Stages that depend on the given stage.
    pub fn dependents(&self, index: StageIndex) -> &[StageIndex] {
        self.forward_edges.get(index).map_or(&[], |v| v.as_slice())
    }

    /// Stages the given stage depends on.
    pub fn dependencies(&self, index: StageIndex) -> &[StageIndex] {
        self.reverse_edges.get(index).map_or(&[], |v| v.as_slice())
    }

    /// Every stage reachable downstream of `name`, in declaration order.
    pub fn transitive_dependents(&self, name: &str) -> Vec<String> {
        let Some(start) = self.index_of(name) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        let mut stack = vec![start];
        while let Some(idx) = stack.pop() {
            for &dep in self.dependents(idx) {
                if seen.insert(dep) {
                    stack.push(dep);
                }
            }
        }
        let mut found: Vec<StageIndex> = seen.into_iter().collect();
        found.sort_unstable();
        found
            .into_iter()
            .map(|i| self.stages[i].name.clone())
            .collect()
    }

    /// Stages with no dependencies.
    pub fn root_stages(&self) -> Vec<StageIndex> {
        self.reverse_edges
            .iter()
            .enumerate()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(i, _)| i)
            .collect()
    }

    /// Check if all dependencies of a stage are in `completed`.
    pub fn dependencies_satisfied(&self, index: StageIndex, completed: &HashSet<StageIndex>) -> bool {
        self.dependencies(index)
            .iter()
            .all(|dep| completed.contains(dep))
    }
}

impl TryFrom<Vec<StageSpec>> for StageGraph {
    type Error = PipelineError;

    fn try_from(stages: Vec<StageSpec>) -> Result<Self, Self::Error> {
        DagBuilder::new(stages).build()
    }
}

impl From<StageGraph> for Vec<StageSpec> {
    fn from(graph: StageGraph) -> Self {
        graph.stages
    }
}

/// Builder for constructing stage graphs.
pub struct DagBuilder {
    stages: Vec<StageSpec>,
}

impl DagBuilder {
    pub fn new(stages: Vec<StageSpec>) -> Self {
        Self { stages }
    }

    /// Build the stage graph.
    ///
    /// This validates the graph structure:
    /// - Stage names are unique and every stage names at least one worker
    /// - No worker appears twice in the same stage
    /// - All dependencies reference existing stages
    /// - No cycles are allowed
    pub fn build(self) -> Result<StageGraph, PipelineError> {
        let mut index_map = HashMap::new();
        for (i, stage) in self.stages.iter().enumerate() {
            if index_map.contains_key(&stage.name) {
                return Err(PipelineError::DuplicateStage(stage.name.clone()));
            }
            if stage.workers.is_empty() {
                return Err(PipelineError::EmptyStage(stage.name.clone()));
            }
            let mut seen = HashSet::new();
            for worker in &stage.workers {
                if !seen.insert(worker.as_str()) {
                    return Err(PipelineError::DuplicateWorker {
                        stage: stage.name.clone(),
                        worker: worker.clone(),
                    });
                }
            }
            index_map.insert(stage.name.clone(), i);
        }

        let mut forward_edges: Vec<Vec<StageIndex>> = vec![Vec::new(); self.stages.len()];
        let mut reverse_edges: Vec<Vec<StageIndex>> = vec![Vec::new(); self.stages.len()];

        for (to_idx, stage) in self.stages.iter().enumerate() {
            for dep in &stage.depends_on {
                let from_idx = *index_map.get(dep).ok_or_else(|| PipelineError::UnknownDependency {
                    stage: stage.name.clone(),
                    dependency: dep.clone(),
                })?;

                if reverse_edges[to_idx].contains(&from_idx) {
                    continue;
                }
                // from must complete before to
                forward_edges[from_idx].push(to_idx);
                reverse_edges[to_idx].push(from_idx);
            }
        }

        let graph = StageGraph {
            stages: self.stages,
            index_map,
            forward_edges,
            reverse_edges,
        };

        Self::validate_no_cycles(&graph)?;

        Ok(graph)
    }

    /// Validate that the graph has no cycles using Kahn's algorithm.
    fn validate_no_cycles(graph: &StageGraph) -> Result<(), PipelineError> {
        let mut in_degree: Vec<usize> = graph.reverse_edges.iter().map(|deps| deps.len()).collect();

        let mut queue: Vec<StageIndex> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, deg)| *deg == 0)
            .map(|(i, _)| i)
            .collect();

        let mut processed = 0;

        while let Some(node) = queue.pop() {
            processed += 1;

            for &dependent in graph.dependents(node) {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    queue.push(dependent);
                }
            }
        }

        if processed != graph.len() {
            let stages: Vec<String> = in_degree
                .iter()
                .enumerate()
                .filter(|&(_, deg)| *deg > 0)
                .map(|(i, _)| graph.stages[i].name.clone())
                .collect();

            return Err(PipelineError::CyclicGraph { stages });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(name: &str, deps: Vec<&str>) -> StageSpec {
        StageSpec::new(name, [format!("{}-worker", name)]).depends_on(deps)
    }

    #[test]
    fn test_build_diamond() {
        let graph = DagBuilder::new(vec![
            stage("a", vec![]),
            stage("b", vec!["a"]),
            stage("c", vec!["a"]),
            stage("d", vec!["b", "c"]),
        ])
        .build()
        .unwrap();

        assert_eq!(graph.len(), 4);
        assert_eq!(graph.root_stages(), vec![0]);
        assert_eq!(graph.dependencies(3), &[1, 2]);
        assert_eq!(graph.transitive_dependents("a"), vec!["b", "c", "d"]);
        assert!(graph.transitive_dependents("d").is_empty());
    }

    #[test]
    fn test_cycle_detection() {
        let result = DagBuilder::new(vec![
            stage("a", vec!["c"]),
            stage("b", vec!["a"]),
            stage("c", vec!["b"]),
        ])
        .build();

        match result {
            Err(PipelineError::CyclicGraph { stages }) => {
                assert_eq!(stages, vec!["a", "b", "c"]);
            }
            other => panic!("Expected CyclicGraph, got {:?}", other),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let result = DagBuilder::new(vec![stage("a", vec!["a"])]).build();
        assert!(matches!(result, Err(PipelineError::CyclicGraph { .. })));
    }

    #[test]
    fn test_missing_dependency() {
        let result = DagBuilder::new(vec![stage("a", vec!["nonexistent"])]).build();
        match result {
            Err(PipelineError::UnknownDependency { stage, dependency }) => {
                assert_eq!(stage, "a");
                assert_eq!(dependency, "nonexistent");
            }
            other => panic!("Expected UnknownDependency, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_stage_and_worker() {
        let result = DagBuilder::new(vec![stage("a", vec![]), stage("a", vec![])]).build();
        assert!(matches!(result, Err(PipelineError::DuplicateStage(name)) if name == "a"));

        let result = DagBuilder::new(vec![StageSpec::new("r", ["x", "x"])]).build();
        assert!(matches!(result, Err(PipelineError::DuplicateWorker { .. })));
    }

    #[test]
    fn test_empty_stage_rejected() {
        let result = DagBuilder::new(vec![StageSpec::new("a", Vec::<String>::new())]).build();
        assert!(matches!(result, Err(PipelineError::EmptyStage(name)) if name == "a"));
    }

    #[test]
    fn test_empty_graph() {
        let graph = DagBuilder::new(vec![]).build().unwrap();
        assert!(graph.is_empty());
    }

    #[test]
    fn test_repeated_dependency_collapses() {
        let graph = DagBuilder::new(vec![stage("a", vec![]), stage("b", vec!["a", "a"])])
            .build()
            .unwrap();
        assert_eq!(graph.dependencies(1), &[0]);
    }

    #[test]
    fn test_serde_revalidates() {
        let graph = DagBuilder::new(vec![stage("a", vec![]), stage("b", vec!["a"])])
            .build()
            .unwrap();
        let json = serde_json::to_string(&graph).unwrap();
        let back: StageGraph = serde_json::from_str(&json).unwrap();
        assert_eq!(back, graph);

        let cyclic = r#"[{"name":"a","workers":["w"],"depends_on":["a"]}]"#;
        let err = serde_json::from_str::<StageGraph>(cyclic).unwrap_err();
        assert!(err.to_string().contains("Cycle"));
    }
}
