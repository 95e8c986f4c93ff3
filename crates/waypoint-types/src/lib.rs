//! Shared domain types for the Waypoint workflow orchestration engine.
//!
//! This crate contains only the workflow intermediate representation and its
//! execution-time result types (`Workflow`, `Step`, `StepResult`,
//! `WorkflowResult`, ...). Zero infrastructure dependencies -- only serde,
//! serde_json, chrono, uuid, semver, thiserror -- so a dispatcher
//! implementation or a persistence layer can depend on it without pulling in
//! the executor or an async runtime.

pub mod definition;
pub mod workflow;
