//! Built-in workflow templates, as Rust values rather than
//! YAML -- the host-facing YAML surface in `waypoint_types::definition` is
//! for hand-authored workflows, not for these.
//!
//! Every template targets placeholder `(service, action)` pairs; a host
//! application wires real dispatchers behind those names.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::json;
use waypoint_types::workflow::{
    CacheSpec, Condition, Connector, ErrorPolicy, InputSpec, Operator, RetryConfig, Step, Trigger,
    Workflow,
};

/// Every built-in template, in a stable order.
pub fn built_in_templates() -> Vec<Workflow> {
    vec![
        shopping_assistant(),
        cart_recovery(),
        personalized_feed(),
        fraud_check(),
    ]
}

/// A linear chain: gather the user's intent, search a catalog, then build a
/// recommendation -- no branching, no parallelism.
fn shopping_assistant() -> Workflow {
    Workflow {
        id: "shopping-assistant".to_string(),
        name: "Shopping Assistant".to_string(),
        version: semver::Version::new(1, 0, 0),
        steps: vec![
            Step {
                id: "gather-intent".to_string(),
                name: "Gather shopping intent".to_string(),
                service: "nlu".to_string(),
                action: "extractIntent".to_string(),
                input: InputSpec {
                    from_context: Some("message".to_string()),
                    ..Default::default()
                },
                conditions: vec![],
                on_success: Some("search-catalog".to_string()),
                on_failure: None,
                parallel: vec![],
                retry: RetryConfig::default(),
                timeout: Some(Duration::from_secs(5)),
                cache: None,
            },
            Step {
                id: "search-catalog".to_string(),
                name: "Search product catalog".to_string(),
                service: "catalog".to_string(),
                action: "search".to_string(),
                input: InputSpec {
                    from_step: Some("gather-intent".to_string()),
                    ..Default::default()
                },
                conditions: vec![],
                on_success: Some("build-recommendation".to_string()),
                on_failure: None,
                parallel: vec![],
                retry: RetryConfig {
                    max_attempts: 2,
                    initial_delay: Duration::from_millis(200),
                    multiplier: 2.0,
                    retryable_errors: vec!["CATALOG_TIMEOUT".to_string()],
                },
                timeout: Some(Duration::from_secs(10)),
                cache: Some(CacheSpec {
                    key_prefix: "catalog-search".to_string(),
                    ttl: Duration::from_secs(60),
                }),
            },
            Step {
                id: "build-recommendation".to_string(),
                name: "Build recommendation".to_string(),
                service: "recommendation".to_string(),
                action: "rank".to_string(),
                input: InputSpec {
                    from_step: Some("search-catalog".to_string()),
                    ..Default::default()
                },
                conditions: vec![],
                on_success: None,
                on_failure: None,
                parallel: vec![],
                retry: RetryConfig::default(),
                timeout: Some(Duration::from_secs(5)),
                cache: None,
            },
        ],
        triggers: vec![Trigger::Manual],
        error_policy: ErrorPolicy::Stop,
        timeout: Some(Duration::from_secs(30)),
        metadata: HashMap::new(),
    }
}

/// A conditional guard plus a fallback branch: check whether a cart was
/// abandoned, and either send a recovery nudge or exit quietly.
fn cart_recovery() -> Workflow {
    Workflow {
        id: "cart-recovery".to_string(),
        name: "Cart Recovery".to_string(),
        version: semver::Version::new(1, 0, 0),
        steps: vec![
            Step {
                id: "check-cart".to_string(),
                name: "Check cart status".to_string(),
                service: "commerce".to_string(),
                action: "getCartStatus".to_string(),
                input: InputSpec {
                    from_context: Some("cartId".to_string()),
                    ..Default::default()
                },
                conditions: vec![],
                on_success: Some("send-nudge".to_string()),
                on_failure: None,
                parallel: vec![],
                retry: RetryConfig::default(),
                timeout: Some(Duration::from_secs(5)),
                cache: None,
            },
            Step {
                id: "send-nudge".to_string(),
                name: "Send recovery nudge".to_string(),
                service: "notifications".to_string(),
                action: "sendCartReminder".to_string(),
                input: InputSpec {
                    from_step: Some("check-cart".to_string()),
                    ..Default::default()
                },
                conditions: vec![Condition {
                    field: "step.check-cart.isAbandoned".to_string(),
                    operator: Operator::Equals,
                    value: Some(json!(true)),
                    connector: Connector::And,
                }],
                on_success: Some("log-outcome".to_string()),
                on_failure: Some("log-outcome".to_string()),
                parallel: vec![],
                retry: RetryConfig {
                    max_attempts: 3,
                    initial_delay: Duration::from_millis(500),
                    multiplier: 2.0,
                    retryable_errors: vec!["NOTIFICATION_TRANSIENT".to_string()],
                },
                timeout: Some(Duration::from_secs(10)),
                cache: None,
            },
            Step {
                id: "log-outcome".to_string(),
                name: "Log recovery outcome".to_string(),
                service: "analytics".to_string(),
                action: "recordEvent".to_string(),
                input: InputSpec {
                    from_step: Some("check-cart".to_string()),
                    ..Default::default()
                },
                conditions: vec![],
                on_success: None,
                on_failure: None,
                parallel: vec![],
                retry: RetryConfig::default(),
                timeout: Some(Duration::from_secs(5)),
                cache: None,
            },
        ],
        triggers: vec![Trigger::Cron {
            expression: "0 */2 * * *".to_string(),
        }],
        error_policy: ErrorPolicy::Skip,
        timeout: Some(Duration::from_secs(30)),
        metadata: HashMap::new(),
    }
}

/// Parallel fan-out: fetch two independent feed sources concurrently and
/// merge them downstream into a single ranked feed.
fn personalized_feed() -> Workflow {
    Workflow {
        id: "personalized-feed".to_string(),
        name: "Personalized Feed".to_string(),
        version: semver::Version::new(1, 0, 0),
        steps: vec![
            Step {
                id: "fetch-trending".to_string(),
                name: "Fetch trending items".to_string(),
                service: "feed".to_string(),
                action: "fetchTrending".to_string(),
                input: InputSpec::default(),
                conditions: vec![],
                on_success: Some("merge-feed".to_string()),
                on_failure: None,
                parallel: vec!["fetch-followed".to_string()],
                retry: RetryConfig::default(),
                timeout: Some(Duration::from_secs(5)),
                cache: Some(CacheSpec {
                    key_prefix: "feed-trending".to_string(),
                    ttl: Duration::from_secs(30),
                }),
            },
            Step {
                id: "fetch-followed".to_string(),
                name: "Fetch items from followed accounts".to_string(),
                service: "feed".to_string(),
                action: "fetchFollowed".to_string(),
                input: InputSpec {
                    from_context: Some("userId".to_string()),
                    ..Default::default()
                },
                conditions: vec![],
                on_success: None,
                on_failure: None,
                parallel: vec![],
                retry: RetryConfig::default(),
                timeout: Some(Duration::from_secs(5)),
                cache: None,
            },
            Step {
                id: "merge-feed".to_string(),
                name: "Merge and rank feed".to_string(),
                service: "recommendation".to_string(),
                action: "mergeFeeds".to_string(),
                input: InputSpec {
                    from_step: Some("fetch-trending".to_string()),
                    ..Default::default()
                },
                conditions: vec![],
                on_success: None,
                on_failure: None,
                parallel: vec![],
                retry: RetryConfig::default(),
                timeout: Some(Duration::from_secs(5)),
                cache: None,
            },
        ],
        triggers: vec![Trigger::Manual],
        error_policy: ErrorPolicy::Stop,
        timeout: Some(Duration::from_secs(15)),
        metadata: HashMap::new(),
    }
}

/// A single retrying step, flag-gated: only runs when the `fraud-check`
/// feature flag is enabled, retries transient scoring failures.
fn fraud_check() -> Workflow {
    Workflow {
        id: "fraud-check".to_string(),
        name: "Fraud Check".to_string(),
        version: semver::Version::new(1, 0, 0),
        steps: vec![Step {
            id: "score-transaction".to_string(),
            name: "Score transaction risk".to_string(),
            service: "risk".to_string(),
            action: "scoreTransaction".to_string(),
            input: InputSpec {
                from_context: Some("transaction".to_string()),
                ..Default::default()
            },
            conditions: vec![],
            on_success: None,
            on_failure: None,
            parallel: vec![],
            retry: RetryConfig {
                max_attempts: 4,
                initial_delay: Duration::from_millis(100),
                multiplier: 3.0,
                retryable_errors: vec!["RISK_ENGINE_TRANSIENT".to_string()],
            },
            timeout: Some(Duration::from_secs(3)),
            cache: None,
        }],
        triggers: vec![Trigger::Flag {
            key: "fraud-check".to_string(),
        }],
        error_policy: ErrorPolicy::Stop,
        timeout: Some(Duration::from_secs(10)),
        metadata: HashMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_template_validates_cleanly() {
        for workflow in built_in_templates() {
            let issues = workflow.validate();
            assert!(issues.is_empty(), "{}: {issues:?}", workflow.id);
        }
    }

    #[test]
    fn personalized_feed_has_a_parallel_group() {
        let wf = personalized_feed();
        let head = wf.step("fetch-trending").unwrap();
        assert_eq!(head.parallel, vec!["fetch-followed".to_string()]);
    }

    #[test]
    fn fraud_check_is_flag_gated() {
        let wf = fraud_check();
        assert_eq!(wf.flag_trigger(), Some("fraud-check"));
    }

    #[test]
    fn template_ids_are_unique() {
        let ids: Vec<&str> = built_in_templates().iter().map(|w| w.id.as_str()).collect();
        let mut deduped = ids.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(ids.len(), deduped.len());
    }
}
