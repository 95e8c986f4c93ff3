//! The dispatch boundary between the engine and concrete downstream services.
//!
//! The engine never references a concrete service (personalization, fraud
//! detection, pricing, ...); it only knows a `(service, action)` string pair
//! and an opaque `serde_json::Value` input/output. A host wires real
//! handlers into an implementation of `ServiceDispatcher`; the engine's own
//! test fakes (`crate::testing::FakeDispatcher`) stand in during tests.

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

/// The kind of failure a dispatch attempt produced (§7 of the design).
///
/// Distinct from the step/workflow-level `StepStatus`/`WorkflowStatus` --
/// this is what the retry controller and the interpreter inspect to decide
/// whether to retry, skip, or stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed workflow, unknown service/action, bad input shape. Fatal,
    /// never retried.
    Validation,
    /// Throttling, connection reset, a 5xx the handler marked retryable.
    /// Retryable only if the step's retry spec whitelists the error code.
    Transient,
    /// The per-step or per-workflow deadline elapsed. Non-retryable unless
    /// the step's retryable set explicitly names the timeout code.
    Timeout,
    /// Workflow-level timeout or external cancellation fired mid-dispatch.
    /// Non-retryable.
    Cancelled,
    /// Surfaced only at the façade boundary when a flag gate denies the
    /// workflow; never produced by a dispatch call itself.
    Gated,
    /// An assertion violated inside the engine. Fatal, surfaced distinctly
    /// from a downstream failure.
    Internal,
}

/// A dispatch failure: a kind (for retry eligibility), a stable code (for
/// the retry whitelist and the result's `ErrorRecord.code`), a message, and
/// optional structured details.
#[derive(Debug, Clone, Error)]
#[error("{code}: {message}")]
pub struct DispatchError {
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
    pub details: Option<Value>,
}

impl DispatchError {
    pub fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn validation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, code, message)
    }

    pub fn transient(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, code, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, "TIMEOUT", message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, "CANCELLED", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, "INTERNAL", message)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn to_error_record(&self) -> waypoint_types::workflow::ErrorRecord {
        let mut record = waypoint_types::workflow::ErrorRecord::new(&self.code, &self.message);
        if let Some(details) = &self.details {
            record = record.with_details(details.clone());
        }
        record
    }
}

/// Resolves `(service, action)` pairs to callable handlers and invokes them
/// with an input and a deadline bound to the minimum of the remaining
/// workflow budget and the step's own timeout.
pub trait ServiceDispatcher: Send + Sync {
    /// Invoke `service.action(input)`. `deadline` is the remaining time
    /// budget for this call; implementations should race their own I/O
    /// against it and return `DispatchError::timeout` on expiry rather than
    /// hang past it.
    fn invoke(
        &self,
        service: &str,
        action: &str,
        input: Value,
        deadline: Duration,
    ) -> impl Future<Output = Result<Value, DispatchError>> + Send;
}
