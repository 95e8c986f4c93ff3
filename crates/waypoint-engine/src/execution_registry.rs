//! Execution Registry: a live map of in-flight executions, queried by
//! `Facade::execution_status`. Entries are appended when a run starts and
//! removed once it reaches a terminal state -- there is no persistence
//! across restarts.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;
use waypoint_types::workflow::StepResult;

/// A point-in-time view of a still-running execution.
#[derive(Debug, Clone)]
pub struct ExecutionSnapshot {
    pub workflow_id: String,
    pub started_at: DateTime<Utc>,
    pub step_results: Vec<StepResult>,
}

/// A handle an in-flight execution can use to publish progress as it runs,
/// so `ExecutionStatus` queries observe partial results rather than nothing
/// at all until completion.
pub struct ExecutionHandle<'a> {
    registry: &'a ExecutionRegistry,
    execution_id: Uuid,
}

impl ExecutionHandle<'_> {
    pub fn publish(&self, step_results: Vec<StepResult>) {
        if let Some(mut entry) = self.registry.live.get_mut(&self.execution_id) {
            entry.step_results = step_results;
        }
    }
}

impl Drop for ExecutionHandle<'_> {
    fn drop(&mut self) {
        self.registry.live.remove(&self.execution_id);
    }
}

#[derive(Default)]
pub struct ExecutionRegistry {
    live: DashMap<Uuid, ExecutionSnapshot>,
}

impl ExecutionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new in-flight execution and return a handle that removes
    /// it from the registry when dropped (on success, failure, or panic
    /// unwind alike).
    pub fn start(&self, execution_id: Uuid, workflow_id: &str, started_at: DateTime<Utc>) -> ExecutionHandle<'_> {
        self.live.insert(
            execution_id,
            ExecutionSnapshot {
                workflow_id: workflow_id.to_string(),
                started_at,
                step_results: Vec::new(),
            },
        );
        ExecutionHandle {
            registry: self,
            execution_id,
        }
    }

    pub fn status(&self, execution_id: Uuid) -> Option<ExecutionSnapshot> {
        self.live.get(&execution_id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}
