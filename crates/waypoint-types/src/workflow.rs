//! Workflow domain types.
//!
//! Defines the canonical intermediate representation for workflows: a
//! `Workflow` is an immutable, registered, versioned, acyclic graph of
//! `Step`s. This crate only models data -- it has no opinion on how a
//! workflow is executed, cached, or dispatched; see `waypoint-engine` for
//! that.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// The canonical workflow definition.
///
/// Immutable after registration; re-registering under the same `id` replaces
/// the prior definition (the registry logs an overwrite warning, see
/// `waypoint_engine::workflow::registry`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique id within the registry. Also usable as the "template name".
    pub id: String,
    /// Human-readable workflow name.
    pub name: String,
    /// Semantic version, e.g. "1.0.0".
    pub version: semver::Version,
    /// Ordered list of steps forming the workflow graph. The first entry is
    /// the entry point.
    pub steps: Vec<Step>,
    /// Optional triggers that gate or schedule execution.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<Trigger>,
    /// What to do when a step fails and declares no `on_failure` transition.
    #[serde(default)]
    pub error_policy: ErrorPolicy,
    /// Workflow-level timeout; `None` defers to the façade default.
    #[serde(default, with = "duration_secs_opt", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    /// Free-form metadata, untouched by the engine.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl Workflow {
    /// The entry-point step id, or `None` if the workflow has no steps.
    pub fn entry_step_id(&self) -> Option<&str> {
        self.steps.first().map(|s| s.id.as_str())
    }

    /// Look up a step by id.
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// All step ids reachable from `start`, following `on_success`,
    /// `on_failure`, and `parallel` edges transitively. `start` itself is
    /// included if it exists in the workflow.
    pub fn reachable_from(&self, start: &str) -> Vec<String> {
        let mut seen = Vec::new();
        let mut stack = vec![start.to_string()];
        while let Some(id) = stack.pop() {
            if seen.contains(&id) {
                continue;
            }
            let Some(step) = self.step(&id) else {
                continue;
            };
            seen.push(id.clone());
            if let Some(s) = &step.on_success {
                stack.push(s.clone());
            }
            if let Some(f) = &step.on_failure {
                stack.push(f.clone());
            }
            for sib in &step.parallel {
                stack.push(sib.clone());
            }
        }
        seen
    }

    /// Declared flag trigger key, if any. Only the first flag trigger is
    /// honored -- multiple flag triggers on one workflow are not meaningful.
    pub fn flag_trigger(&self) -> Option<&str> {
        self.triggers.iter().find_map(|t| match t {
            Trigger::Flag { key } => Some(key.as_str()),
            _ => None,
        })
    }
}

/// What the default error action is when a failed step has no `on_failure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Stop the workflow; terminal status becomes `failed`.
    #[default]
    Stop,
    /// Treat the failure as if the step had been skipped and continue via
    /// `on_success`.
    Skip,
}

/// A workflow trigger. Only `Manual` and `Flag` carry runtime meaning for the
/// engine; the others describe how a host schedules execution and are opaque
/// to the engine itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// Explicit `ExecuteWorkflow` call; always present implicitly.
    Manual,
    /// The workflow only runs when the named feature flag evaluates true.
    Flag { key: String },
    /// Host-scheduled; opaque to the engine.
    Cron { expression: String },
    /// Host-delivered; opaque to the engine.
    Webhook { path: String },
    /// Host-delivered; opaque to the engine.
    Event { topic: String },
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// A single declarative step in the workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// User-defined step id, unique within a workflow.
    pub id: String,
    /// Human-readable step name.
    pub name: String,
    /// The downstream service to invoke.
    pub service: String,
    /// The action on that service to invoke.
    pub action: String,
    /// How to build this step's input.
    #[serde(default)]
    pub input: InputSpec,
    /// Guard conditions, evaluated left-to-right with no operator precedence.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    /// Step id to follow on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_success: Option<String>,
    /// Step id to follow on failure. If absent, the workflow's error policy
    /// decides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_failure: Option<String>,
    /// Sibling step ids to run concurrently with this one. Non-empty makes
    /// this step the head of a parallel group.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parallel: Vec<String>,
    /// Retry policy for this step.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Per-step timeout; `None` means only the workflow-level timeout binds.
    #[serde(default, with = "duration_secs_opt", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    /// Cache policy for this step's result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheSpec>,
}

/// How a step's effective input is built.
///
/// Precedence on key collision: `static` < `from_context` < `from_step` <
/// well-known context fields (`userId`/`sessionId`/`organizationId`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputSpec {
    /// Static key/value pairs, present regardless of context.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub r#static: HashMap<String, Value>,
    /// Pull a single named top-level value from the workflow's input object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_context: Option<String>,
    /// Copy the referenced step's output verbatim (shallow-merged).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_step: Option<String>,
}

/// A single guard condition with the connector joining it to the *next*
/// condition in the list (the connector on the last condition is unused).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    /// Dotted field path, e.g. `step.gather-news.isAbandoned`.
    pub field: String,
    pub operator: Operator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default)]
    pub connector: Connector,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    GreaterThan,
    LessThan,
    Exists,
    NotExists,
    In,
    NotIn,
}

/// Logical connector joining a condition's result with the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connector {
    #[default]
    And,
    Or,
}

/// Retry policy for a step's dispatch calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, inclusive of the first. Must be >= 1.
    #[serde(default = "RetryConfig::default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry.
    #[serde(default = "RetryConfig::default_initial_delay", with = "duration_secs")]
    pub initial_delay: Duration,
    /// Geometric backoff multiplier applied per subsequent attempt.
    #[serde(default = "RetryConfig::default_multiplier")]
    pub multiplier: f64,
    /// Error codes eligible for retry. An empty set means no error is
    /// retryable (every failure is terminal on first attempt).
    #[serde(default)]
    pub retryable_errors: Vec<String>,
}

impl RetryConfig {
    fn default_max_attempts() -> u32 {
        1
    }
    fn default_initial_delay() -> Duration {
        Duration::from_millis(0)
    }
    fn default_multiplier() -> f64 {
        1.0
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: Self::default_max_attempts(),
            initial_delay: Self::default_initial_delay(),
            multiplier: Self::default_multiplier(),
            retryable_errors: Vec::new(),
        }
    }
}

/// Cache policy for a step's result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSpec {
    /// Prefix used in the cache key:
    /// `"<key_prefix>:<stepId>:<userIdOrAnonymous>:<workflowId>"`.
    pub key_prefix: String,
    /// Time-to-live passed to the cache backend. Must be positive.
    #[serde(with = "duration_secs")]
    pub ttl: Duration,
}

// ---------------------------------------------------------------------------
// duration (de)serialization helpers -- workflows are authored in seconds
// ---------------------------------------------------------------------------

mod duration_secs {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}

mod duration_secs_opt {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs = Option::<f64>::deserialize(d)?;
        Ok(secs.map(|s| Duration::from_secs_f64(s.max(0.0))))
    }
}

// ---------------------------------------------------------------------------
// Execution-time types
// ---------------------------------------------------------------------------

/// Status of a single step within an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
    Cancelled,
}

/// Terminal (or in-flight) status of a whole workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
}

/// A code/message/details error record attached to a step or workflow
/// result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorRecord {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// The well-known error code for a workflow skipped by feature-flag gating.
pub const WORKFLOW_SKIPPED: &str = "WORKFLOW_SKIPPED";

/// The outcome of executing a single step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub attempts: u32,
    pub cached: bool,
}

/// The outcome of executing a whole workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub workflow_id: String,
    pub execution_id: uuid::Uuid,
    pub status: WorkflowStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    pub step_results: Vec<StepResult>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A single problem found while validating a `Workflow`. Registration
/// collects every issue rather than failing on the first.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationIssue {
    #[error("workflow has no steps")]
    EmptyWorkflow,
    #[error("duplicate step id '{0}'")]
    DuplicateStepId(String),
    #[error("step '{step}' references unknown step id '{target}' via {via}")]
    UnknownTarget {
        step: String,
        target: String,
        via: &'static str,
    },
    #[error("step '{0}' has retry.max_attempts == 0, must be >= 1")]
    InvalidMaxAttempts(String),
    #[error("step '{0}' has a negative retry.multiplier or initial_delay")]
    InvalidBackoff(String),
    #[error("step '{0}' has cache enabled with a non-positive ttl")]
    InvalidCacheTtl(String),
    #[error("step '{step}' lists '{sibling}' in both parallel and a transition target")]
    ParallelTransitionOverlap { step: String, sibling: String },
    #[error("workflow graph is cyclic, involving step(s): {0:?}")]
    Cyclic(Vec<String>),
}

impl Workflow {
    /// Validate every invariant from the data model, returning every
    /// violation found rather than stopping at the first.
    pub fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if self.steps.is_empty() {
            issues.push(ValidationIssue::EmptyWorkflow);
            return issues;
        }

        let mut seen_ids = std::collections::HashSet::new();
        for step in &self.steps {
            if !seen_ids.insert(step.id.clone()) {
                issues.push(ValidationIssue::DuplicateStepId(step.id.clone()));
            }
        }

        let known: std::collections::HashSet<&str> =
            self.steps.iter().map(|s| s.id.as_str()).collect();

        for step in &self.steps {
            if let Some(target) = &step.on_success {
                if !known.contains(target.as_str()) {
                    issues.push(ValidationIssue::UnknownTarget {
                        step: step.id.clone(),
                        target: target.clone(),
                        via: "on_success",
                    });
                }
            }
            if let Some(target) = &step.on_failure {
                if !known.contains(target.as_str()) {
                    issues.push(ValidationIssue::UnknownTarget {
                        step: step.id.clone(),
                        target: target.clone(),
                        via: "on_failure",
                    });
                }
            }
            for sib in &step.parallel {
                if !known.contains(sib.as_str()) {
                    issues.push(ValidationIssue::UnknownTarget {
                        step: step.id.clone(),
                        target: sib.clone(),
                        via: "parallel",
                    });
                }
                if step.on_success.as_deref() == Some(sib.as_str())
                    || step.on_failure.as_deref() == Some(sib.as_str())
                {
                    issues.push(ValidationIssue::ParallelTransitionOverlap {
                        step: step.id.clone(),
                        sibling: sib.clone(),
                    });
                }
            }

            if step.retry.max_attempts == 0 {
                issues.push(ValidationIssue::InvalidMaxAttempts(step.id.clone()));
            }
            if step.retry.multiplier < 0.0 {
                issues.push(ValidationIssue::InvalidBackoff(step.id.clone()));
            }
            if let Some(cache) = &step.cache {
                if cache.ttl.is_zero() {
                    issues.push(ValidationIssue::InvalidCacheTtl(step.id.clone()));
                }
            }
        }

        if let Some(cycle) = self.find_cycle() {
            issues.push(ValidationIssue::Cyclic(cycle));
        }

        issues
    }

    /// Detect a cycle in the `on_success`/`on_failure`/`parallel` transition
    /// graph via depth-first search. Returns the steps on a discovered cycle,
    /// if any.
    fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        let mut marks: HashMap<&str, Mark> = HashMap::new();
        let mut stack: Vec<&str> = Vec::new();

        fn visit<'a>(
            wf: &'a Workflow,
            id: &'a str,
            marks: &mut HashMap<&'a str, Mark>,
            stack: &mut Vec<&'a str>,
        ) -> Option<Vec<String>> {
            match marks.get(id) {
                Some(Mark::Done) => return None,
                Some(Mark::Visiting) => {
                    let start = stack.iter().position(|s| *s == id).unwrap_or(0);
                    return Some(stack[start..].iter().map(|s| s.to_string()).collect());
                }
                None => {}
            }
            marks.insert(id, Mark::Visiting);
            stack.push(id);

            if let Some(step) = wf.step(id) {
                let mut targets: Vec<&str> = Vec::new();
                if let Some(s) = &step.on_success {
                    targets.push(s.as_str());
                }
                if let Some(f) = &step.on_failure {
                    targets.push(f.as_str());
                }
                for sib in &step.parallel {
                    targets.push(sib.as_str());
                }
                for t in targets {
                    if let Some(cycle) = visit(wf, t, marks, stack) {
                        return Some(cycle);
                    }
                }
            }

            stack.pop();
            marks.insert(id, Mark::Done);
            None
        }

        for step in &self.steps {
            if !marks.contains_key(step.id.as_str()) {
                if let Some(cycle) = visit(self, step.id.as_str(), &mut marks, &mut stack) {
                    return Some(cycle);
                }
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
