//! Workflow Interpreter (§4.10): walks the step graph via `on_success`/
//! `on_failure` transitions, delegating each step (or parallel group) to the
//! Step Executor / Parallel Group Executor, and races the whole run against
//! the workflow-level timeout.

use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;
use waypoint_types::workflow::{
    ErrorPolicy, ErrorRecord, StepStatus, Workflow, WorkflowResult, WorkflowStatus,
};

use crate::cache::Cache;
use crate::clock::Clock;
use crate::dispatcher::ServiceDispatcher;

use super::context::ExecutionContext;
use super::{parallel, step_runner};

/// Run `workflow` to completion (or until `workflow_timeout` fires),
/// mutating `ctx` with every step result along the taken path.
///
/// `workflow_timeout` is the effective timeout already resolved by the
/// façade (`options.timeout ?? workflow.timeout ?? 30s`); this function does
/// not know about that precedence, only the final duration.
pub async fn run<C, D, K>(
    workflow: &Workflow,
    ctx: &mut ExecutionContext,
    clock: &C,
    dispatcher: &D,
    cache: Option<&K>,
    workflow_timeout: Duration,
    dry_run: bool,
) -> WorkflowResult
where
    C: Clock,
    D: ServiceDispatcher,
    K: Cache,
{
    let in_flight: Mutex<Option<(String, chrono::DateTime<chrono::Utc>)>> = Mutex::new(None);

    let drive = async {
        let mut current = workflow.entry_step_id().map(str::to_string);
        let mut final_output: Option<Value> = None;
        let mut terminal_error: Option<ErrorRecord> = None;
        let mut unhandled_failure = false;

        while let Some(step_id) = current.take() {
            let Some(step) = workflow.step(&step_id) else {
                break;
            };

            let step_started = clock.now();
            *in_flight.lock().unwrap() = Some((step_id.clone(), step_started));

            let elapsed = clock
                .now()
                .signed_duration_since(ctx.started_at)
                .to_std()
                .unwrap_or(Duration::ZERO);
            let remaining_budget = workflow_timeout.saturating_sub(elapsed);

            let (terminal, outcome_error) = if !step.parallel.is_empty() {
                let group = parallel::execute(
                    workflow,
                    step,
                    ctx,
                    clock,
                    dispatcher,
                    cache,
                    remaining_budget,
                    dry_run,
                )
                .await;

                for member in group.members.into_iter() {
                    if member.step_id != step.id {
                        ctx.record_result(member);
                    }
                }
                let error = group.merged.error.clone();
                ctx.record_result(group.merged.clone());
                (group.merged, error)
            } else {
                let result = step_runner::execute(
                    step,
                    ctx,
                    clock,
                    dispatcher,
                    cache,
                    remaining_budget,
                    dry_run,
                )
                .await;
                let error = result.error.clone();
                ctx.record_result(result.clone());
                (result, error)
            };

            *in_flight.lock().unwrap() = None;

            current = match terminal.status {
                StepStatus::Completed => {
                    final_output = terminal.output.clone();
                    step.on_success.clone()
                }
                StepStatus::Skipped => step.on_success.clone(),
                StepStatus::Failed => {
                    if let Some(target) = &step.on_failure {
                        Some(target.clone())
                    } else if workflow.error_policy == ErrorPolicy::Skip {
                        step.on_success.clone()
                    } else {
                        unhandled_failure = true;
                        terminal_error = outcome_error;
                        None
                    }
                }
                StepStatus::Pending | StepStatus::Running | StepStatus::Cancelled => None,
            };

            if unhandled_failure {
                break;
            }
        }

        (final_output, terminal_error, unhandled_failure)
    };

    match tokio::time::timeout(workflow_timeout, drive).await {
        Ok((final_output, terminal_error, unhandled_failure)) => {
            let status = if unhandled_failure {
                WorkflowStatus::Failed
            } else {
                WorkflowStatus::Completed
            };
            WorkflowResult {
                workflow_id: workflow.id.clone(),
                execution_id: ctx.execution_id,
                status,
                output: final_output,
                step_results: ctx.results_in_order().to_vec(),
                started_at: ctx.started_at,
                completed_at: Some(clock.now()),
                error: terminal_error,
            }
        }
        Err(_) => {
            if let Some((step_id, started)) = in_flight.lock().unwrap().take() {
                let now = clock.now();
                ctx.record_result(step_runner::cancelled(&step_id, started, now));
            }
            WorkflowResult {
                workflow_id: workflow.id.clone(),
                execution_id: ctx.execution_id,
                status: WorkflowStatus::TimedOut,
                output: None,
                step_results: ctx.results_in_order().to_vec(),
                started_at: ctx.started_at,
                completed_at: Some(clock.now()),
                error: Some(ErrorRecord::new(
                    "WORKFLOW_TIMEOUT",
                    "workflow-level timeout fired before the run completed",
                )),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCache, FakeClock, FakeDispatcher};
    use crate::workflow::context::Identity;
    use serde_json::json;
    use std::collections::HashMap;
    use waypoint_types::workflow::{Condition, Connector, InputSpec, Operator, RetryConfig, Step};

    fn step(id: &str, on_success: Option<&str>) -> Step {
        Step {
            id: id.to_string(),
            name: id.to_string(),
            service: "svc".to_string(),
            action: "act".to_string(),
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

    fn workflow(id: &str, steps: Vec<Step>) -> Workflow {
        Workflow {
            id: id.to_string(),
            name: id.to_string(),
            version: semver::Version::new(1, 0, 0),
            steps,
            triggers: vec![],
            error_policy: ErrorPolicy::default(),
            timeout: None,
            metadata: HashMap::new(),
        }
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("wf", Value::Null, Identity::default(), chrono::Utc::now())
    }

    #[tokio::test]
    async fn linear_chain_all_succeed() {
        let wf = workflow(
            "wf",
            vec![step("a", Some("b")), step("b", Some("c")), step("c", None)],
        );
        let clock = FakeClock::new();
        let dispatcher = FakeDispatcher::new();
        dispatcher.push_success(json!({"k": "a"}));
        dispatcher.push_success(json!({"k": "b"}));
        dispatcher.push_success(json!({"k": "c"}));
        let cache: Option<&FakeCache> = None;
        let mut c = ctx();

        let result = run(&wf, &mut c, &clock, &dispatcher, cache, Duration::from_secs(30), false).await;

        assert_eq!(result.status, WorkflowStatus::Completed);
        assert_eq!(result.output, Some(json!({"k": "c"})));
        let ids: Vec<&str> = result.step_results.iter().map(|r| r.step_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(result.step_results.iter().all(|r| r.status == StepStatus::Completed));
    }

    #[tokio::test]
    async fn conditional_skip_keeps_prior_final_output() {
        let mut b = step("b", Some("c"));
        b.conditions = vec![Condition {
            field: "step.a.isAbandoned".to_string(),
            operator: Operator::Equals,
            value: Some(json!(true)),
            connector: Connector::And,
        }];
        let wf = workflow("wf", vec![step("a", Some("b")), b, step("c", None)]);
        let clock = FakeClock::new();
        let dispatcher = FakeDispatcher::new();
        dispatcher.push_success(json!({"isAbandoned": false}));
        let cache: Option<&FakeCache> = None;
        let mut c = ctx();

        let result = run(&wf, &mut c, &clock, &dispatcher, cache, Duration::from_secs(30), false).await;

        assert_eq!(result.status, WorkflowStatus::Completed);
        assert_eq!(result.output, Some(json!({"isAbandoned": false})));
        assert_eq!(dispatcher.call_count(), 1);
        let b_result = result.step_results.iter().find(|r| r.step_id == "b").unwrap();
        assert_eq!(b_result.status, StepStatus::Skipped);
    }

    #[tokio::test]
    async fn unhandled_failure_stops_the_workflow() {
        let wf = workflow("wf", vec![step("a", Some("b")), step("b", None)]);
        let clock = FakeClock::new();
        let dispatcher = FakeDispatcher::new();
        dispatcher.push_failure(crate::dispatcher::DispatchError::validation("BAD", "no"));
        let cache: Option<&FakeCache> = None;
        let mut c = ctx();

        let result = run(&wf, &mut c, &clock, &dispatcher, cache, Duration::from_secs(30), false).await;

        assert_eq!(result.status, WorkflowStatus::Failed);
        assert_eq!(result.step_results.len(), 1);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn skip_error_policy_masks_failure_and_continues() {
        let mut wf = workflow("wf", vec![step("a", Some("b")), step("b", None)]);
        wf.error_policy = ErrorPolicy::Skip;
        let clock = FakeClock::new();
        let dispatcher = FakeDispatcher::new();
        dispatcher.push_failure(crate::dispatcher::DispatchError::validation("BAD", "no"));
        dispatcher.push_success(json!({"k": "b"}));
        let cache: Option<&FakeCache> = None;
        let mut c = ctx();

        let result = run(&wf, &mut c, &clock, &dispatcher, cache, Duration::from_secs(30), false).await;

        assert_eq!(result.status, WorkflowStatus::Completed);
        assert_eq!(result.output, Some(json!({"k": "b"})));
    }

    #[tokio::test(start_paused = true)]
    async fn workflow_timeout_dominates_a_slow_step() {
        let wf = workflow("wf", vec![step("slow", None)]);
        let clock = FakeClock::new();
        let dispatcher = FakeDispatcher::new();
        dispatcher.push_success_after(Duration::from_millis(200), json!({}));
        let cache: Option<&FakeCache> = None;
        let mut c = ctx();

        let result = run(
            &wf,
            &mut c,
            &clock,
            &dispatcher,
            cache,
            Duration::from_millis(50),
            false,
        )
        .await;

        assert_eq!(result.status, WorkflowStatus::TimedOut);
        assert_eq!(result.step_results.len(), 1);
        assert_eq!(result.step_results[0].status, StepStatus::Cancelled);
    }
}
