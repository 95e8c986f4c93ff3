//! Workflow Registry (§4.11): a concurrent name -> `Workflow` map, seeded at
//! construction with the built-in templates.
//!
//! Re-registering under an id already present overwrites the prior
//! definition; this is logged, not rejected -- the engine has no notion of
//! "workflow versions in flight" to protect -- there is no durable
//! cross-restart state.

use dashmap::DashMap;
use tracing::warn;
use waypoint_types::workflow::{ValidationIssue, Workflow};

use crate::workflow::dag;

pub struct WorkflowRegistry {
    workflows: DashMap<String, Workflow>,
}

impl WorkflowRegistry {
    /// An empty registry, with no built-in templates seeded.
    pub fn empty() -> Self {
        Self {
            workflows: DashMap::new(),
        }
    }

    /// A registry seeded with every built-in template.
    pub fn with_builtin_templates() -> Self {
        let registry = Self::empty();
        for workflow in crate::templates::built_in_templates() {
            if !registry.register(workflow).is_empty() {
                unreachable!("built-in templates must always validate cleanly");
            }
        }
        registry
    }

    /// Validate and register `workflow`. Returns the validation issues found
    /// (and leaves the registry unchanged) if any exist; an empty vec means
    /// the registration succeeded.
    pub fn register(&self, workflow: Workflow) -> Vec<ValidationIssue> {
        let issues = workflow.validate();
        if !issues.is_empty() {
            return issues;
        }

        if let Err(cycle) = dag::check_acyclic(&workflow) {
            warn!(
                workflow_id = %workflow.id,
                cycle = ?cycle.0,
                "petgraph supplement disagrees with structural validate() -- refusing registration",
            );
            return vec![ValidationIssue::Cyclic(cycle.0)];
        }

        if self.workflows.contains_key(&workflow.id) {
            warn!(workflow_id = %workflow.id, "overwriting an already-registered workflow");
        }

        self.workflows.insert(workflow.id.clone(), workflow);
        Vec::new()
    }

    pub fn get(&self, id: &str) -> Option<Workflow> {
        self.workflows.get(id).map(|entry| entry.value().clone())
    }

    pub fn list(&self) -> Vec<Workflow> {
        self.workflows.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn remove(&self, id: &str) -> Option<Workflow> {
        self.workflows.remove(id).map(|(_, workflow)| workflow)
    }
}

impl Default for WorkflowRegistry {
    fn default() -> Self {
        Self::with_builtin_templates()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use waypoint_types::workflow::{ErrorPolicy, InputSpec, RetryConfig, Step};

    fn step(id: &str) -> Step {
        Step {
            id: id.to_string(),
            name: id.to_string(),
            service: "svc".to_string(),
            action: "act".to_string(),
            input: InputSpec::default(),
            conditions: vec![],
            on_success: None,
            on_failure: None,
            parallel: vec![],
            retry: RetryConfig::default(),
            timeout: None,
            cache: None,
        }
    }

    fn workflow(id: &str) -> Workflow {
        Workflow {
            id: id.to_string(),
            name: id.to_string(),
            version: semver::Version::new(1, 0, 0),
            steps: vec![step("a")],
            triggers: vec![],
            error_policy: ErrorPolicy::default(),
            timeout: None,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn register_then_get_round_trips() {
        let registry = WorkflowRegistry::empty();
        assert!(registry.register(workflow("wf-a")).is_empty());
        assert!(registry.get("wf-a").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn invalid_workflow_is_rejected_and_not_stored() {
        let registry = WorkflowRegistry::empty();
        let mut wf = workflow("wf-empty");
        wf.steps.clear();
        let issues = registry.register(wf);
        assert!(!issues.is_empty());
        assert!(registry.get("wf-empty").is_none());
    }

    #[test]
    fn re_registering_overwrites_without_erroring() {
        let registry = WorkflowRegistry::empty();
        registry.register(workflow("wf-a"));
        let mut updated = workflow("wf-a");
        updated.name = "renamed".to_string();
        assert!(registry.register(updated).is_empty());
        assert_eq!(registry.get("wf-a").unwrap().name, "renamed");
    }

    #[test]
    fn builtin_templates_are_seeded_and_valid() {
        let registry = WorkflowRegistry::with_builtin_templates();
        assert!(!registry.list().is_empty());
        for workflow in registry.list() {
            assert!(workflow.validate().is_empty());
        }
    }
}
