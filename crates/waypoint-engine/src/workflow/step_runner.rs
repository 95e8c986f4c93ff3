//! Step executor: runs one step end-to-end (§4.8) -- cache lookup, input
//! build, dispatch-with-deadline, retries, cache store, result record.
//!
//! Exactly one terminal `StepResult` per invocation. Cache writes happen
//! only on success; failures are never cached.

use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use waypoint_types::workflow::{CacheSpec, ErrorRecord, Step, StepResult, StepStatus};

use crate::cache::{cache_key, Cache};
use crate::clock::Clock;
use crate::dispatcher::ServiceDispatcher;

use super::context::ExecutionContext;
use super::expression;
use super::resolver;
use super::retry;

/// Execute `step` against `ctx`. `remaining_workflow_budget` is what's left
/// of the workflow-level deadline; the effective per-step deadline is the
/// smaller of that and the step's own timeout.
///
/// `dry_run` walks the same condition-evaluation and skip paths as a real
/// run but never touches the cache or the dispatcher -- a reached step
/// returns a synthetic `completed` with a null output and zero attempts.
pub async fn execute<C, D, K>(
    step: &Step,
    ctx: &mut ExecutionContext,
    clock: &C,
    dispatcher: &D,
    cache: Option<&K>,
    remaining_workflow_budget: Duration,
    dry_run: bool,
) -> StepResult
where
    C: Clock,
    D: ServiceDispatcher,
    K: Cache,
{
    let started_at = clock.now();

    if !expression::evaluate(&step.conditions, ctx) {
        tracing::debug!(step = %step.id, "condition evaluated false, skipping");
        return StepResult {
            step_id: step.id.clone(),
            status: StepStatus::Skipped,
            output: None,
            error: None,
            started_at,
            completed_at: Some(started_at),
            attempts: 0,
            cached: false,
        };
    }

    if dry_run {
        tracing::debug!(step = %step.id, "dry run, skipping dispatch");
        return StepResult {
            step_id: step.id.clone(),
            status: StepStatus::Completed,
            output: Some(Value::Null),
            error: None,
            started_at,
            completed_at: Some(clock.now()),
            attempts: 0,
            cached: false,
        };
    }

    let key = step
        .cache
        .as_ref()
        .map(|spec| cache_key(&spec.key_prefix, &step.id, ctx.identity.user_id.as_deref(), &ctx.workflow_id));

    if let (Some(cache), Some(key)) = (cache, key.as_deref()) {
        match cache.get(key).await {
            Ok(Some(value)) => {
                tracing::debug!(step = %step.id, %key, "cache hit");
                return StepResult {
                    step_id: step.id.clone(),
                    status: StepStatus::Completed,
                    output: Some(value),
                    error: None,
                    started_at,
                    completed_at: Some(clock.now()),
                    attempts: 0,
                    cached: true,
                };
            }
            Ok(None) => tracing::debug!(step = %step.id, %key, "cache miss"),
            Err(err) => tracing::debug!(step = %step.id, %key, error = %err, "cache get failed, treating as miss"),
        }
    }

    let input = resolver::resolve(&step.input, ctx);
    let deadline = effective_deadline(step.timeout, remaining_workflow_budget);

    let outcome = retry::drive(&step.retry, clock, |attempt| {
        tracing::debug!(step = %step.id, attempt, max = step.retry.max_attempts, "dispatching");
        dispatcher.invoke(&step.service, &step.action, input.clone(), deadline)
    })
    .await;

    match outcome.result {
        Ok(output) => {
            if let (Some(cache), Some(spec), Some(key)) = (cache, &step.cache, key.as_deref()) {
                store_best_effort(cache, key, output.clone(), spec).await;
            }
            StepResult {
                step_id: step.id.clone(),
                status: StepStatus::Completed,
                output: Some(output),
                error: None,
                started_at,
                completed_at: Some(clock.now()),
                attempts: outcome.attempts,
                cached: false,
            }
        }
        Err(error) => {
            tracing::debug!(step = %step.id, code = %error.code, attempts = outcome.attempts, "step failed");
            StepResult {
                step_id: step.id.clone(),
                status: StepStatus::Failed,
                output: None,
                error: Some(error.to_error_record()),
                started_at,
                completed_at: Some(clock.now()),
                attempts: outcome.attempts,
                cached: false,
            }
        }
    }
}

async fn store_best_effort<K: Cache>(cache: &K, key: &str, value: Value, spec: &CacheSpec) {
    if let Err(err) = cache.put(key, value, spec.ttl).await {
        tracing::warn!(%key, error = %err, "cache put failed after successful step, continuing");
    }
}

fn effective_deadline(step_timeout: Option<Duration>, remaining_workflow_budget: Duration) -> Duration {
    match step_timeout {
        Some(t) => t.min(remaining_workflow_budget),
        None => remaining_workflow_budget,
    }
}

/// Build a synthetic cancellation result for a step that was in-flight when
/// the workflow-level timeout fired.
pub fn cancelled(step_id: &str, started_at: chrono::DateTime<Utc>, now: chrono::DateTime<Utc>) -> StepResult {
    StepResult {
        step_id: step_id.to_string(),
        status: StepStatus::Cancelled,
        output: None,
        error: Some(ErrorRecord::new("WORKFLOW_TIMEOUT", "workflow timeout fired while this step was in flight")),
        started_at,
        completed_at: Some(now),
        attempts: 0,
        cached: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCache, FakeClock, FakeDispatcher};
    use crate::workflow::context::Identity;
    use serde_json::json;
    use waypoint_types::workflow::{Condition, Connector, InputSpec, Operator, RetryConfig};

    fn base_step() -> Step {
        Step {
            id: "a".to_string(),
            name: "A".to_string(),
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

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("wf", Value::Null, Identity::default(), Utc::now())
    }

    #[tokio::test]
    async fn condition_false_skips_without_dispatch() {
        let mut step = base_step();
        step.conditions = vec![Condition {
            field: "input.x".to_string(),
            operator: Operator::Exists,
            value: None,
            connector: Connector::And,
        }];
        let clock = FakeClock::new();
        let dispatcher = FakeDispatcher::new();
        let cache: Option<&FakeCache> = None;
        let mut c = ctx();

        let result = execute(&step, &mut c, &clock, &dispatcher, cache, Duration::from_secs(30), false).await;
        assert_eq!(result.status, StepStatus::Skipped);
        assert_eq!(result.attempts, 0);
        assert_eq!(dispatcher.call_count(), 0);
    }

    #[tokio::test]
    async fn cache_hit_returns_completed_with_zero_attempts() {
        let step = {
            let mut s = base_step();
            s.cache = Some(CacheSpec {
                key_prefix: "p".to_string(),
                ttl: Duration::from_secs(60),
            });
            s
        };
        let clock = FakeClock::new();
        let dispatcher = FakeDispatcher::new();
        let cache = FakeCache::new();
        cache.seed("p:a:anonymous:wf", json!({"hit": true}));
        let mut c = ctx();

        let result = execute(&step, &mut c, &clock, &dispatcher, Some(&cache), Duration::from_secs(30), false).await;
        assert_eq!(result.status, StepStatus::Completed);
        assert!(result.cached);
        assert_eq!(result.attempts, 0);
        assert_eq!(dispatcher.call_count(), 0);
    }

    #[tokio::test]
    async fn successful_dispatch_populates_cache() {
        let step = {
            let mut s = base_step();
            s.cache = Some(CacheSpec {
                key_prefix: "p".to_string(),
                ttl: Duration::from_secs(60),
            });
            s
        };
        let clock = FakeClock::new();
        let dispatcher = FakeDispatcher::new();
        dispatcher.push_success(json!({"k": "a"}));
        let cache = FakeCache::new();
        let mut c = ctx();

        let result = execute(&step, &mut c, &clock, &dispatcher, Some(&cache), Duration::from_secs(30), false).await;
        assert_eq!(result.status, StepStatus::Completed);
        assert!(!result.cached);
        assert_eq!(cache.get("p:a:anonymous:wf").await.unwrap(), Some(json!({"k": "a"})));
    }

    #[tokio::test]
    async fn dry_run_produces_synthetic_completed_without_dispatch() {
        let step = base_step();
        let clock = FakeClock::new();
        let dispatcher = FakeDispatcher::new();
        let cache: Option<&FakeCache> = None;
        let mut c = ctx();

        let result = execute(&step, &mut c, &clock, &dispatcher, cache, Duration::from_secs(30), true).await;
        assert_eq!(result.status, StepStatus::Completed);
        assert_eq!(result.output, Some(Value::Null));
        assert_eq!(dispatcher.call_count(), 0);
    }

    #[tokio::test]
    async fn failure_is_never_cached() {
        let step = {
            let mut s = base_step();
            s.cache = Some(CacheSpec {
                key_prefix: "p".to_string(),
                ttl: Duration::from_secs(60),
            });
            s
        };
        let clock = FakeClock::new();
        let dispatcher = FakeDispatcher::new();
        dispatcher.push_failure(crate::dispatcher::DispatchError::validation("BAD", "no"));
        let cache = FakeCache::new();
        let mut c = ctx();

        let result = execute(&step, &mut c, &clock, &dispatcher, Some(&cache), Duration::from_secs(30), false).await;
        assert_eq!(result.status, StepStatus::Failed);
        assert!(cache.get("p:a:anonymous:wf").await.unwrap().is_none());
    }
}
