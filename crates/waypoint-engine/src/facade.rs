//! Orchestrator Façade (§4.12): the single entry point a host interacts
//! with -- workflow execution (flag-gated, timeout-bound), ad-hoc `Chain`/
//! `Parallel` composition that bypasses the workflow model entirely,
//! execution status polling, and workflow registration.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::info;
use uuid::Uuid;
use waypoint_types::workflow::{
    ErrorRecord, ValidationIssue, Workflow, WorkflowResult, WorkflowStatus, WORKFLOW_SKIPPED,
};

use crate::cache::Cache;
use crate::clock::Clock;
use crate::dispatcher::{DispatchError, ServiceDispatcher};
use crate::execution_registry::{ExecutionRegistry, ExecutionSnapshot};
use crate::flags::{FlagContext, FlagEvaluator};
use crate::registry::WorkflowRegistry;
use crate::workflow::context::{ExecutionContext, Identity};
use crate::workflow::interpreter;

const DEFAULT_WORKFLOW_TIMEOUT: Duration = Duration::from_secs(30);
const AD_HOC_TASK_DEADLINE: Duration = Duration::from_secs(30);

/// Options recognized by `execute_workflow`.
#[derive(Clone, Default)]
pub struct ExecuteOptions {
    pub timeout: Option<Duration>,
    pub dry_run: bool,
    /// Opaque hint passed through to `ExecutionContext::metadata`; the
    /// engine never interprets it.
    pub priority: Option<String>,
    /// Register and return immediately; completion is observed via
    /// `Facade::execution_status`.
    pub async_mode: bool,
    pub feature_flag_context: FlagContext,
    pub identity: Identity,
}

/// The result of `execute_workflow`: either the finished run, or -- under
/// `options.async_mode` -- an acknowledgement that it was registered and is
/// now running in the background.
pub enum ExecuteOutcome {
    Completed(WorkflowResult),
    Started { execution_id: Uuid },
}

#[derive(Debug, thiserror::Error)]
pub enum FacadeError {
    #[error("workflow '{0}' is not registered")]
    UnknownWorkflow(String),
    #[error("workflow failed validation: {0:?}")]
    InvalidWorkflow(Vec<ValidationIssue>),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// One step of an ad-hoc `Chain` call.
pub struct ChainStep {
    pub service: String,
    pub action: String,
    /// Transforms the previous step's output into this step's input. The
    /// first step receives the chain's initial input untransformed.
    pub map: Option<Box<dyn Fn(Value) -> Value + Send + Sync>>,
}

/// One task of an ad-hoc `Parallel` call.
pub struct Task {
    pub service: String,
    pub action: String,
    pub input: Value,
}

pub struct Facade<C, D, K, F> {
    registry: WorkflowRegistry,
    executions: ExecutionRegistry,
    clock: Arc<C>,
    dispatcher: Arc<D>,
    cache: Option<Arc<K>>,
    flags: Arc<F>,
}

impl<C, D, K, F> Facade<C, D, K, F>
where
    C: Clock + 'static,
    D: ServiceDispatcher + 'static,
    K: Cache + 'static,
    F: FlagEvaluator + 'static,
{
    pub fn new(clock: Arc<C>, dispatcher: Arc<D>, cache: Option<Arc<K>>, flags: Arc<F>) -> Self {
        Self {
            registry: WorkflowRegistry::with_builtin_templates(),
            executions: ExecutionRegistry::new(),
            clock,
            dispatcher,
            cache,
            flags,
        }
    }

    /// Validate and register a workflow definition, replacing any prior
    /// definition under the same id.
    pub fn register(&self, workflow: Workflow) -> Result<(), FacadeError> {
        let issues = self.registry.register(workflow);
        if issues.is_empty() {
            Ok(())
        } else {
            Err(FacadeError::InvalidWorkflow(issues))
        }
    }

    pub fn list_workflows(&self) -> Vec<Workflow> {
        self.registry.list()
    }

    pub fn execution_status(&self, execution_id: Uuid) -> Option<ExecutionSnapshot> {
        self.executions.status(execution_id)
    }

    /// Run a registered workflow (or built-in template) by id.
    pub async fn execute_workflow(
        self: &Arc<Self>,
        id_or_template: &str,
        input: Value,
        options: ExecuteOptions,
    ) -> Result<ExecuteOutcome, FacadeError> {
        let workflow = self
            .registry
            .get(id_or_template)
            .ok_or_else(|| FacadeError::UnknownWorkflow(id_or_template.to_string()))?;

        let now = self.clock.now();

        if let Some(flag_key) = workflow.flag_trigger() {
            if !self.flags.enabled(flag_key, &options.feature_flag_context).await {
                info!(workflow_id = %workflow.id, flag = flag_key, "workflow gated off, skipping");
                return Ok(ExecuteOutcome::Completed(WorkflowResult {
                    workflow_id: workflow.id.clone(),
                    execution_id: Uuid::now_v7(),
                    status: WorkflowStatus::Cancelled,
                    output: None,
                    step_results: vec![],
                    started_at: now,
                    completed_at: Some(now),
                    error: Some(ErrorRecord::new(
                        WORKFLOW_SKIPPED,
                        format!("feature flag '{flag_key}' is disabled"),
                    )),
                }));
            }
        }

        let timeout = options
            .timeout
            .or(workflow.timeout)
            .unwrap_or(DEFAULT_WORKFLOW_TIMEOUT);

        let mut ctx = ExecutionContext::new(&workflow.id, input, options.identity.clone(), now);
        if let Some(priority) = &options.priority {
            ctx.metadata
                .insert("priority".to_string(), Value::String(priority.clone()));
        }
        let execution_id = ctx.execution_id;

        if options.async_mode {
            let this = Arc::clone(self);
            let dry_run = options.dry_run;
            tokio::spawn(async move {
                let mut ctx = ctx;
                let handle = this.executions.start(execution_id, &workflow.id, ctx.started_at);
                let result = interpreter::run(
                    &workflow,
                    &mut ctx,
                    this.clock.as_ref(),
                    this.dispatcher.as_ref(),
                    this.cache.as_deref(),
                    timeout,
                    dry_run,
                )
                .await;
                handle.publish(result.step_results.clone());
                drop(handle);
                info!(workflow_id = %result.workflow_id, status = ?result.status, "background execution finished");
            });
            return Ok(ExecuteOutcome::Started { execution_id });
        }

        let handle = self.executions.start(execution_id, &workflow.id, ctx.started_at);
        let result = interpreter::run(
            &workflow,
            &mut ctx,
            self.clock.as_ref(),
            self.dispatcher.as_ref(),
            self.cache.as_deref(),
            timeout,
            options.dry_run,
        )
        .await;
        drop(handle);

        Ok(ExecuteOutcome::Completed(result))
    }

    /// Ad-hoc sequential composition, bypassing the workflow model entirely:
    /// each step's output becomes the next step's input, optionally
    /// transformed. No conditions, retries, or caching.
    pub async fn chain(&self, steps: Vec<ChainStep>, initial_input: Value) -> Result<Value, DispatchError> {
        let mut current = initial_input;
        for step in steps {
            let input = match &step.map {
                Some(map) => map(current),
                None => current,
            };
            current = self
                .dispatcher
                .invoke(&step.service, &step.action, input, AD_HOC_TASK_DEADLINE)
                .await?;
        }
        Ok(current)
    }

    /// Ad-hoc concurrent fan-out, bypassing the workflow model. Every task
    /// runs concurrently; results preserve input order; every task is
    /// awaited to completion before the first error (if any) is returned.
    pub async fn parallel(&self, tasks: Vec<Task>) -> Result<Vec<Value>, DispatchError> {
        let dispatcher = self.dispatcher.as_ref();
        let futures = tasks.into_iter().map(|task| async move {
            dispatcher
                .invoke(&task.service, &task.action, task.input, AD_HOC_TASK_DEADLINE)
                .await
        });
        let results = futures_util::future::join_all(futures).await;

        let mut outputs = Vec::with_capacity(results.len());
        for result in results {
            outputs.push(result?);
        }
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCache, FakeClock, FakeDispatcher, FakeFlagEvaluator};
    use serde_json::json;

    fn facade() -> Arc<Facade<FakeClock, FakeDispatcher, FakeCache, FakeFlagEvaluator>> {
        Arc::new(Facade::new(
            Arc::new(FakeClock::new()),
            Arc::new(FakeDispatcher::new()),
            None,
            Arc::new(FakeFlagEvaluator::always(true)),
        ))
    }

    #[tokio::test]
    async fn unregistered_workflow_is_an_error() {
        let f = facade();
        let result = f
            .execute_workflow("does-not-exist", Value::Null, ExecuteOptions::default())
            .await;
        assert!(matches!(result, Err(FacadeError::UnknownWorkflow(_))));
    }

    #[tokio::test]
    async fn executes_a_builtin_template() {
        let f = facade();
        f.dispatcher.push_success(json!({"intent": "buy shoes"}));
        f.dispatcher.push_success(json!({"items": []}));
        f.dispatcher.push_success(json!({"ranked": []}));

        let outcome = f
            .execute_workflow("shopping-assistant", Value::Null, ExecuteOptions::default())
            .await
            .unwrap();

        match outcome {
            ExecuteOutcome::Completed(result) => {
                assert_eq!(result.status, WorkflowStatus::Completed);
            }
            ExecuteOutcome::Started { .. } => panic!("expected a synchronous completion"),
        }
    }

    #[tokio::test]
    async fn flag_gated_workflow_is_skipped_without_dispatch() {
        let f = Arc::new(Facade::new(
            Arc::new(FakeClock::new()),
            Arc::new(FakeDispatcher::new()),
            None::<Arc<FakeCache>>,
            Arc::new(FakeFlagEvaluator::always(false)),
        ));

        let outcome = f
            .execute_workflow("fraud-check", json!({"transaction": {}}), ExecuteOptions::default())
            .await
            .unwrap();

        match outcome {
            ExecuteOutcome::Completed(result) => {
                assert_eq!(result.status, WorkflowStatus::Cancelled);
                assert_eq!(result.error.unwrap().code, WORKFLOW_SKIPPED);
            }
            ExecuteOutcome::Started { .. } => panic!("gated workflow should complete synchronously"),
        }
        assert_eq!(f.dispatcher.call_count(), 0);
    }

    #[tokio::test]
    async fn chain_threads_output_into_the_next_steps_input() {
        let f = facade();
        f.dispatcher.push_success(json!({"value": 1}));
        f.dispatcher.push_success(json!({"value": 2}));

        let result = f
            .chain(
                vec![
                    ChainStep {
                        service: "svc".to_string(),
                        action: "one".to_string(),
                        map: None,
                    },
                    ChainStep {
                        service: "svc".to_string(),
                        action: "two".to_string(),
                        map: Some(Box::new(|v| json!({"previous": v}))),
                    },
                ],
                Value::Null,
            )
            .await
            .unwrap();

        assert_eq!(result, json!({"value": 2}));
    }

    #[tokio::test]
    async fn parallel_preserves_input_order() {
        let f = facade();
        f.dispatcher.push_success(json!(1));
        f.dispatcher.push_success(json!(2));

        let results = f
            .parallel(vec![
                Task {
                    service: "svc".to_string(),
                    action: "a".to_string(),
                    input: Value::Null,
                },
                Task {
                    service: "svc".to_string(),
                    action: "b".to_string(),
                    input: Value::Null,
                },
            ])
            .await
            .unwrap();

        assert_eq!(results, vec![json!(1), json!(2)]);
    }

    #[tokio::test]
    async fn execution_status_is_visible_while_running_and_gone_after() {
        let f = facade();
        f.dispatcher.push_success(json!({"intent": "x"}));
        f.dispatcher.push_success(json!({"items": []}));
        f.dispatcher.push_success(json!({"ranked": []}));

        let outcome = f
            .execute_workflow("shopping-assistant", Value::Null, ExecuteOptions::default())
            .await
            .unwrap();

        let execution_id = match outcome {
            ExecuteOutcome::Completed(result) => result.execution_id,
            ExecuteOutcome::Started { execution_id } => execution_id,
        };
        assert!(f.execution_status(execution_id).is_none());
    }
}
