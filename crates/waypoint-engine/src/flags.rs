//! Feature-flag gating consulted once per execution, before the first step.
//!
//! Only consulted when the workflow declares a `Trigger::Flag` (see
//! `waypoint_types::workflow::Workflow::flag_trigger`); workflows without one
//! skip this call entirely.

use std::collections::HashMap;
use std::future::Future;

use serde_json::Value;

/// The context passed to `FlagEvaluator::enabled`, built from the façade's
/// `featureFlagContext` option merged with the execution's well-known
/// identity fields.
pub type FlagContext = HashMap<String, Value>;

/// Returns a boolean for a flag key given an evaluation context.
pub trait FlagEvaluator: Send + Sync {
    fn enabled(&self, key: &str, context: &FlagContext) -> impl Future<Output = bool> + Send;
}
