//! Execution context: the per-run bag of inputs, step results, and
//! variables that flows through one workflow execution.
//!
//! Created by the façade at start, written to only by the interpreter and
//! the step executor, and removed from the execution registry once the
//! terminal state is recorded (see `crate::workflow::execution_registry`).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;
use waypoint_types::workflow::StepResult;

/// Well-known identity fields injected unconditionally into every step's
/// input when present (§3, highest precedence).
#[derive(Debug, Clone, Default)]
pub struct Identity {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub organization_id: Option<String>,
}

/// The mutable state of one workflow execution.
///
/// Step results are recorded in insertion order (a `Vec`, mirrored by a
/// `step_id -> index` map for O(1) lookup) so readers never observe partial
/// updates and later steps see exactly the results written before them --
/// within a single chain this is just "step i's result is visible to step
/// i+1", the happens-before guarantee of a single driver task (§5).
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub workflow_id: String,
    pub execution_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub identity: Identity,
    pub input: Value,
    pub variables: HashMap<String, Value>,
    pub metadata: HashMap<String, Value>,
    results: Vec<StepResult>,
    result_index: HashMap<String, usize>,
}

impl ExecutionContext {
    pub fn new(
        workflow_id: impl Into<String>,
        input: Value,
        identity: Identity,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            execution_id: Uuid::now_v7(),
            started_at: now,
            identity,
            input,
            variables: HashMap::new(),
            metadata: HashMap::new(),
            results: Vec::new(),
            result_index: HashMap::new(),
        }
    }

    /// Record a step's terminal result. Overwrites the prior entry for the
    /// same step id in place, preserving its original position -- a
    /// parallel group's head and its siblings each write only their own
    /// key, so entries never collide (§5).
    pub fn record_result(&mut self, result: StepResult) {
        if let Some(&idx) = self.result_index.get(&result.step_id) {
            self.results[idx] = result;
        } else {
            self.result_index
                .insert(result.step_id.clone(), self.results.len());
            self.results.push(result);
        }
    }

    /// Look up a previously recorded step result by id.
    pub fn result(&self, step_id: &str) -> Option<&StepResult> {
        self.result_index.get(step_id).map(|&idx| &self.results[idx])
    }

    /// All results recorded so far, in the order they completed.
    pub fn results_in_order(&self) -> &[StepResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<StepResult> {
        self.results
    }
}
