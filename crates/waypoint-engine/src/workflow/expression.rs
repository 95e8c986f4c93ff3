//! Condition evaluator: dotted-path field reads plus fixed comparison
//! operators, composed strictly left-to-right with no operator precedence
//! (§4.5). Deliberately not a general expression language -- see the
//! "Non-goals" in the purpose section this engine was built against.

use serde_json::Value;
use waypoint_types::workflow::{Condition, Connector, Operator};

use super::context::ExecutionContext;

/// `field` prefixes recognized by the resolver. Anything else resolves to
/// undefined.
const PREFIX_INPUT: &str = "input";
const PREFIX_STEP: &str = "step";
const PREFIX_VARIABLES: &str = "variables";

/// Evaluate a condition list against an execution context. An empty list is
/// vacuously true.
pub fn evaluate(conditions: &[Condition], ctx: &ExecutionContext) -> bool {
    let Some(first) = conditions.first() else {
        return true;
    };

    let mut acc = evaluate_one(first, ctx);
    for window in conditions.windows(2) {
        let (prev, next) = (&window[0], &window[1]);
        let next_val = evaluate_one(next, ctx);
        acc = match prev.connector {
            Connector::And => acc && next_val,
            Connector::Or => acc || next_val,
        };
    }
    acc
}

fn evaluate_one(condition: &Condition, ctx: &ExecutionContext) -> bool {
    let field = resolve_field(&condition.field, ctx);
    apply_operator(condition.operator, field.as_ref(), condition.value.as_ref())
}

/// Read a dotted path from the execution context. The first segment selects
/// the root (`input`, `step`, or `variables`); for `step`, the second
/// segment selects the step id and the remainder navigates its output.
/// A missing segment anywhere along the path yields `None` (undefined).
fn resolve_field(path: &str, ctx: &ExecutionContext) -> Option<Value> {
    let mut segments = path.split('.');
    let root = segments.next()?;

    let mut current: Value = match root {
        PREFIX_INPUT => ctx.input.clone(),
        PREFIX_VARIABLES => Value::Object(ctx.variables.clone().into_iter().collect()),
        PREFIX_STEP => {
            let step_id = segments.next()?;
            ctx.result(step_id).and_then(|r| r.output.clone())?
        }
        _ => return None,
    };

    for segment in segments {
        match current {
            Value::Object(ref map) => current = map.get(segment)?.clone(),
            _ => return None,
        }
    }
    Some(current)
}

fn apply_operator(operator: Operator, field: Option<&Value>, rhs: Option<&Value>) -> bool {
    match operator {
        Operator::Equals => match field {
            Some(f) => rhs.is_some_and(|r| values_equal(f, r)),
            None => false,
        },
        Operator::NotEquals => match field {
            Some(f) => !rhs.is_some_and(|r| values_equal(f, r)),
            None => true,
        },
        Operator::Exists => field.is_some(),
        Operator::NotExists => field.is_none(),
        Operator::Contains => match (field, rhs) {
            (Some(f), Some(r)) => to_text(f).contains(&to_text(r)),
            _ => false,
        },
        Operator::NotContains => match (field, rhs) {
            (Some(f), Some(r)) => !to_text(f).contains(&to_text(r)),
            _ => false,
        },
        Operator::GreaterThan => match (field.and_then(to_number), rhs.and_then(to_number)) {
            (Some(f), Some(r)) => f > r,
            _ => false,
        },
        Operator::LessThan => match (field.and_then(to_number), rhs.and_then(to_number)) {
            (Some(f), Some(r)) => f < r,
            _ => false,
        },
        Operator::In => match (field, rhs.and_then(|v| v.as_array())) {
            (Some(f), Some(arr)) => arr.iter().any(|item| values_equal(f, item)),
            _ => false,
        },
        Operator::NotIn => match (field, rhs.and_then(|v| v.as_array())) {
            (Some(f), Some(arr)) => !arr.iter().any(|item| values_equal(f, item)),
            _ => false,
        },
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    a == b
}

fn to_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn to_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::context::Identity;
    use chrono::Utc;
    use serde_json::json;
    use waypoint_types::workflow::{StepResult, StepStatus};

    fn ctx_with(input: Value) -> ExecutionContext {
        ExecutionContext::new("wf", input, Identity::default(), Utc::now())
    }

    fn cond(field: &str, operator: Operator, value: Option<Value>, connector: Connector) -> Condition {
        Condition {
            field: field.to_string(),
            operator,
            value,
            connector,
        }
    }

    #[test]
    fn empty_conditions_are_vacuously_true() {
        assert!(evaluate(&[], &ctx_with(Value::Null)));
    }

    #[test]
    fn equals_reads_input_path() {
        let ctx = ctx_with(json!({"isAbandoned": true}));
        let conds = vec![cond(
            "input.isAbandoned",
            Operator::Equals,
            Some(json!(true)),
            Connector::And,
        )];
        assert!(evaluate(&conds, &ctx));
    }

    #[test]
    fn reads_prior_step_output() {
        let mut ctx = ctx_with(Value::Null);
        ctx.record_result(StepResult {
            step_id: "a".into(),
            status: StepStatus::Completed,
            output: Some(json!({"isAbandoned": false})),
            error: None,
            started_at: Utc::now(),
            completed_at: Some(Utc::now()),
            attempts: 1,
            cached: false,
        });
        let conds = vec![cond(
            "step.a.isAbandoned",
            Operator::Equals,
            Some(json!(true)),
            Connector::And,
        )];
        assert!(!evaluate(&conds, &ctx));
    }

    #[test]
    fn undefined_field_is_false_for_equals_and_true_for_not_equals() {
        let ctx = ctx_with(json!({}));
        let eq = vec![cond("input.missing", Operator::Equals, Some(json!(1)), Connector::And)];
        let neq = vec![cond(
            "input.missing",
            Operator::NotEquals,
            Some(json!(1)),
            Connector::And,
        )];
        assert!(!evaluate(&eq, &ctx));
        assert!(evaluate(&neq, &ctx));
    }

    #[test]
    fn unknown_prefix_resolves_undefined() {
        let ctx = ctx_with(json!({"x": 1}));
        let conds = vec![cond("weird.x", Operator::Exists, None, Connector::And)];
        assert!(!evaluate(&conds, &ctx));
    }

    #[test]
    fn left_to_right_composition_no_precedence() {
        // a=true, b=false, c=false, joined "Or" then "And". Operator
        // precedence (AND binds tighter) would group this as
        // `a OR (b AND c)` = true OR (false AND false) = true. Strict
        // left-to-right instead computes `(a OR b) AND c` = true AND false
        // = false -- the two readings disagree, so this pins down which
        // one the evaluator actually implements.
        let ctx = ctx_with(json!({"a": true, "b": false, "c": false}));
        let conds = vec![
            cond("input.a", Operator::Equals, Some(json!(true)), Connector::Or),
            cond("input.b", Operator::Equals, Some(json!(true)), Connector::And),
            cond("input.c", Operator::Equals, Some(json!(true)), Connector::And),
        ];
        assert!(!evaluate(&conds, &ctx));
    }

    #[test]
    fn in_requires_array_rhs() {
        let ctx = ctx_with(json!({"tier": "gold"}));
        let conds = vec![cond(
            "input.tier",
            Operator::In,
            Some(json!(["gold", "platinum"])),
            Connector::And,
        )];
        assert!(evaluate(&conds, &ctx));
    }

    #[test]
    fn contains_coerces_to_string() {
        let ctx = ctx_with(json!({"n": 12345}));
        let conds = vec![cond(
            "input.n",
            Operator::Contains,
            Some(json!("234")),
            Connector::And,
        )];
        assert!(evaluate(&conds, &ctx));
    }

    #[test]
    fn greater_than_coerces_to_number() {
        let ctx = ctx_with(json!({"age": "21"}));
        let conds = vec![cond(
            "input.age",
            Operator::GreaterThan,
            Some(json!(18)),
            Connector::And,
        )];
        assert!(evaluate(&conds, &ctx));
    }
}
