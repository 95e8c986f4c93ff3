//! Petgraph-backed acyclicity check and reachability used at registration
//! time, supplementing `Workflow::validate`'s own plain-DFS cycle detector
//! (SPEC_FULL §11.2). `waypoint-types` carries zero infrastructure
//! dependencies by design, so the `petgraph`-based pass lives here, in the
//! crate that already depends on it, and the registry runs both: the
//! structural check catches everything `validate()` is specified to catch,
//! this one is the "optional registration-time check" SPEC_FULL §9/§11.3
//! describes for pre-verifying that every step resolves.

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use waypoint_types::workflow::Workflow;

/// A cycle found in the `on_success`/`on_failure`/`parallel` transition
/// graph, naming the step ids involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleDetected(pub Vec<String>);

/// Build the transition graph and run `petgraph::algo::toposort`. Returns
/// the cycle (as step ids) if one exists.
pub fn check_acyclic(workflow: &Workflow) -> Result<(), CycleDetected> {
    let mut graph = DiGraph::<&str, ()>::new();
    let mut nodes = HashMap::new();
    for step in &workflow.steps {
        let idx = graph.add_node(step.id.as_str());
        nodes.insert(step.id.as_str(), idx);
    }
    for step in &workflow.steps {
        let from = nodes[step.id.as_str()];
        let mut targets = Vec::new();
        if let Some(s) = &step.on_success {
            targets.push(s.as_str());
        }
        if let Some(f) = &step.on_failure {
            targets.push(f.as_str());
        }
        for sib in &step.parallel {
            targets.push(sib.as_str());
        }
        for target in targets {
            if let Some(&to) = nodes.get(target) {
                graph.add_edge(from, to, ());
            }
        }
    }

    toposort(&graph, None).map(|_| ()).map_err(|cycle| {
        // petgraph reports one node on the cycle; walk `reachable_from` on
        // that node intersected with what points back to it to name the
        // whole loop for the error message.
        let offending = graph[cycle.node_id()];
        let involved = workflow
            .reachable_from(offending)
            .into_iter()
            .filter(|id| workflow.reachable_from(id).contains(&offending.to_string()))
            .collect();
        CycleDetected(involved)
    })
}

/// Every `(service, action)` pair used by a step reachable from the
/// workflow's entry point, deduplicated. Used by a registry that wants to
/// pre-verify against a dispatcher's known action set before accepting a
/// registration (SPEC_FULL §9).
pub fn reachable_actions(workflow: &Workflow) -> Vec<(String, String)> {
    let Some(entry) = workflow.entry_step_id() else {
        return Vec::new();
    };
    let mut seen = Vec::new();
    for step_id in workflow.reachable_from(entry) {
        if let Some(step) = workflow.step(&step_id) {
            let pair = (step.service.clone(), step.action.clone());
            if !seen.contains(&pair) {
                seen.push(pair);
            }
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;
    use waypoint_types::workflow::{ErrorPolicy, InputSpec, RetryConfig, Step};

    fn step(id: &str, on_success: Option<&str>, service: &str, action: &str) -> Step {
        Step {
            id: id.to_string(),
            name: id.to_string(),
            service: service.to_string(),
            action: action.to_string(),
            input: InputSpec::default(),
            conditions: vec![],
            on_success: on_success.map(str::to_string),
            on_failure: None,
            parallel: vec![],
            retry: RetryConfig::default(),
            timeout: None,
            cache: None,
        }
    }

    fn workflow(steps: Vec<Step>) -> Workflow {
        Workflow {
            id: "wf".to_string(),
            name: "wf".to_string(),
            version: semver::Version::new(1, 0, 0),
            steps,
            triggers: vec![],
            error_policy: ErrorPolicy::default(),
            timeout: None,
            metadata: Map::new(),
        }
    }

    #[test]
    fn acyclic_chain_passes() {
        let wf = workflow(vec![
            step("a", Some("b"), "svc", "one"),
            step("b", None, "svc", "two"),
        ]);
        assert!(check_acyclic(&wf).is_ok());
    }

    #[test]
    fn self_loop_detected() {
        let wf = workflow(vec![step("a", Some("a"), "svc", "one")]);
        let err = check_acyclic(&wf).unwrap_err();
        assert!(err.0.contains(&"a".to_string()));
    }

    #[test]
    fn reachable_actions_dedupes_and_follows_entry() {
        let wf = workflow(vec![
            step("a", Some("b"), "svc", "one"),
            step("b", None, "svc", "one"),
        ]);
        let actions = reachable_actions(&wf);
        assert_eq!(actions, vec![("svc".to_string(), "one".to_string())]);
    }
}
