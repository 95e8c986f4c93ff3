//! Parallel Group Executor (§4.9): runs a step plus its declared `parallel`
//! siblings concurrently and merges their results at the head's id.
//!
//! The source this engine was extracted from re-executes the head step a
//! second time inside its own parallel set, duplicating its result.
//! SPEC_FULL §9 removes that duplication: the head runs exactly once here,
//! and the merge treats it as the first element of the head-then-siblings
//! order.

use std::time::Duration;

use futures_util::future::join_all;
use serde_json::Value;
use waypoint_types::workflow::{Step, StepResult, StepStatus, Workflow};

use crate::cache::Cache;
use crate::clock::Clock;
use crate::dispatcher::ServiceDispatcher;

use super::context::ExecutionContext;
use super::step_runner;

/// The result of one parallel group: the merged `StepResult` to record at
/// the head's id, and every member's own result (head first, then
/// siblings in declared order) to record under their own ids.
pub struct GroupOutcome {
    pub merged: StepResult,
    pub members: Vec<StepResult>,
}

/// Run `head` and the steps named in `head.parallel` concurrently.
///
/// Every member resolves its input and evaluates its own cache/dispatch
/// against a read-only snapshot of `ctx` taken before the group starts --
/// siblings never observe each other's output (§4.9: "Siblings have no
/// conditions evaluated independently -- they inherit the head's guard by
/// construction of the workflow").
pub async fn execute<C, D, K>(
    workflow: &Workflow,
    head: &Step,
    ctx: &ExecutionContext,
    clock: &C,
    dispatcher: &D,
    cache: Option<&K>,
    remaining_workflow_budget: Duration,
    dry_run: bool,
) -> GroupOutcome
where
    C: Clock,
    D: ServiceDispatcher,
    K: Cache,
{
    let mut members: Vec<&Step> = vec![head];
    for sibling_id in &head.parallel {
        if let Some(sibling) = workflow.step(sibling_id) {
            members.push(sibling);
        }
    }

    let tasks = members.iter().map(|step| {
        let mut snapshot = ctx.clone();
        async move {
            step_runner::execute(
                step,
                &mut snapshot,
                clock,
                dispatcher,
                cache,
                remaining_workflow_budget,
                dry_run,
            )
            .await
        }
    });

    let results: Vec<StepResult> = join_all(tasks).await;

    let all_completed = results.iter().all(|r| r.status == StepStatus::Completed);
    let started_at = results.first().map(|r| r.started_at).unwrap_or_else(|| clock.now());
    let completed_at = results.iter().filter_map(|r| r.completed_at).max();

    let merged = StepResult {
        step_id: head.id.clone(),
        status: if all_completed {
            StepStatus::Completed
        } else {
            StepStatus::Failed
        },
        output: if all_completed {
            Some(Value::Array(
                results.iter().map(|r| r.output.clone().unwrap_or(Value::Null)).collect(),
            ))
        } else {
            None
        },
        error: if all_completed {
            None
        } else {
            results.iter().find_map(|r| r.error.clone())
        },
        started_at,
        completed_at: completed_at.or(Some(started_at)),
        attempts: results.iter().map(|r| r.attempts).sum(),
        cached: results.iter().all(|r| r.cached),
    };

    GroupOutcome {
        merged,
        members: results,
    }
}
