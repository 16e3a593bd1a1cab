//! Pure scheduling decisions over a stage graph and its runs.

use std::collections::{BTreeMap, HashSet};

use super::builder::{StageGraph, StageIndex};
use super::state::{StageRun, StageStatus};

fn status_of(runs: &BTreeMap<String, StageRun>, name: &str) -> StageStatus {
    runs.get(name).map_or(StageStatus::Pending, StageRun::status)
}

/// Stages that are Pending and whose dependencies all Succeeded, in
/// declaration order.
pub fn runnable(graph: &StageGraph, runs: &BTreeMap<String, StageRun>) -> Vec<String> {
    graph
        .stages()
        .iter()
        .enumerate()
        .filter(|(_, spec)| status_of(runs, &spec.name) == StageStatus::Pending)
        .filter(|(i, _)| {
            graph
                .dependencies(*i)
                .iter()
                .all(|&dep| status_of(runs, &graph.stages()[dep].name).is_success())
        })
        .map(|(_, spec)| spec.name.clone())
        .collect()
}

/// Pending stages that can never run because an upstream stage failed or
/// blocked, in declaration order.
pub fn halted(graph: &StageGraph, runs: &BTreeMap<String, StageRun>) -> Vec<String> {
    let mut stopped: HashSet<String> = HashSet::new();
    for spec in graph.stages() {
        if status_of(runs, &spec.name).halts_dependents() {
            stopped.extend(graph.transitive_dependents(&spec.name));
        }
    }
    graph
        .names()
        .filter(|name| stopped.contains(*name) && status_of(runs, name) == StageStatus::Pending)
        .map(String::from)
        .collect()
}

/// Group stages into waves that could run in parallel once every earlier wave
/// completed. Used for plan previews.
pub fn compute_waves(graph: &StageGraph) -> Vec<Vec<String>> {
    let mut waves = Vec::new();
    let mut completed: HashSet<StageIndex> = HashSet::new();

    loop {
        let ready: Vec<StageIndex> = (0..graph.len())
            .filter(|i| !completed.contains(i) && graph.dependencies_satisfied(*i, &completed))
            .collect();

        if ready.is_empty() {
            break;
        }

        completed.extend(ready.iter().copied());
        waves.push(
            ready
                .into_iter()
                .map(|i| graph.stages()[i].name.clone())
                .collect(),
        );
    }

    waves
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::{DagBuilder, StageSpec};
    use chrono::Utc;

    fn graph(specs: Vec<(&str, Vec<&str>)>) -> StageGraph {
        DagBuilder::new(
            specs
                .into_iter()
                .map(|(name, deps)| StageSpec::new(name, ["w"]).depends_on(deps))
                .collect(),
        )
        .build()
        .unwrap()
    }

    fn runs_for(graph: &StageGraph) -> BTreeMap<String, StageRun> {
        graph
            .names()
            .map(|n| (n.to_string(), StageRun::pending(n)))
            .collect()
    }

    fn settle(runs: &mut BTreeMap<String, StageRun>, name: &str, status: StageStatus) {
        let run = runs.get_mut(name).unwrap();
        run.mark_running(Utc::now()).unwrap();
        run.finish(status, vec![], None, Utc::now()).unwrap();
    }

    #[test]
    fn test_wave_computation_diamond() {
        let g = graph(vec![
            ("a", vec![]),
            ("b", vec!["a"]),
            ("c", vec!["a"]),
            ("d", vec!["b", "c"]),
        ]);
        let waves = compute_waves(&g);
        assert_eq!(waves, vec![vec!["a"], vec!["b", "c"], vec!["d"]]);
    }

    #[test]
    fn test_wave_computation_multiple_roots() {
        let g = graph(vec![("x", vec![]), ("y", vec![]), ("z", vec!["x", "y"])]);
        assert_eq!(compute_waves(&g), vec![vec!["x", "y"], vec!["z"]]);
    }

    #[test]
    fn test_runnable_follows_dependencies() {
        let g = graph(vec![
            ("a", vec![]),
            ("b", vec!["a"]),
            ("c", vec!["a"]),
            ("d", vec!["b", "c"]),
        ]);
        let mut runs = runs_for(&g);
        assert_eq!(runnable(&g, &runs), vec!["a"]);

        settle(&mut runs, "a", StageStatus::Succeeded);
        assert_eq!(runnable(&g, &runs), vec!["b", "c"]);

        settle(&mut runs, "b", StageStatus::Succeeded);
        assert_eq!(runnable(&g, &runs), vec!["c"]);

        settle(&mut runs, "c", StageStatus::Succeeded);
        assert_eq!(runnable(&g, &runs), vec!["d"]);
    }

    #[test]
    fn test_running_stage_not_runnable() {
        let g = graph(vec![("a", vec![])]);
        let mut runs = runs_for(&g);
        runs.get_mut("a").unwrap().mark_running(Utc::now()).unwrap();
        assert!(runnable(&g, &runs).is_empty());
    }

    #[test]
    fn test_blocked_stage_halts_dependents() {
        let g = graph(vec![
            ("code", vec![]),
            ("review", vec!["code"]),
            ("test", vec!["review"]),
            ("docs", vec![]),
        ]);
        let mut runs = runs_for(&g);
        settle(&mut runs, "code", StageStatus::Blocked);

        assert_eq!(runnable(&g, &runs), vec!["docs"]);
        assert_eq!(halted(&g, &runs), vec!["review", "test"]);
    }
}
