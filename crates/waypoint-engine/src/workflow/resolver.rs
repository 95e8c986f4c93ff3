//! Input resolver: builds a step's effective input from static values, the
//! workflow's input, prior step outputs, and well-known identity fields
//! (§4.6). Total -- a `from_step` reference to a step that never completed
//! contributes nothing rather than raising an error.

use serde_json::{Map, Value};
use waypoint_types::workflow::InputSpec;

use super::context::ExecutionContext;

/// Resolve `spec` into the effective input object for one step, given the
/// current execution context.
///
/// Precedence on key collision: `static` < `from_context` < `from_step` <
/// well-known (`userId`/`sessionId`/`organizationId`).
pub fn resolve(spec: &InputSpec, ctx: &ExecutionContext) -> Value {
    let mut input = Map::new();

    for (k, v) in &spec.r#static {
        input.insert(k.clone(), v.clone());
    }

    if let Some(key) = &spec.from_context {
        if let Some(value) = ctx.input.as_object().and_then(|o| o.get(key)) {
            input.insert(key.clone(), value.clone());
        }
    }

    if let Some(step_id) = &spec.from_step {
        if let Some(output) = ctx.result(step_id).and_then(|r| r.output.as_ref()) {
            merge_shallow(&mut input, output);
        }
    }

    if let Some(user_id) = &ctx.identity.user_id {
        input.insert("userId".to_string(), Value::String(user_id.clone()));
    }
    if let Some(session_id) = &ctx.identity.session_id {
        input.insert("sessionId".to_string(), Value::String(session_id.clone()));
    }
    if let Some(org_id) = &ctx.identity.organization_id {
        input.insert(
            "organizationId".to_string(),
            Value::String(org_id.clone()),
        );
    }

    Value::Object(input)
}

/// Copy `source`'s top-level keys into `target`, overwriting on collision.
/// Non-object `source` values contribute nothing (there is nothing to
/// shallow-merge from a scalar or array).
fn merge_shallow(target: &mut Map<String, Value>, source: &Value) {
    if let Some(obj) = source.as_object() {
        for (k, v) in obj {
            target.insert(k.clone(), v.clone());
        }
    }
}
