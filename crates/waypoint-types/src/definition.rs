//! YAML (de)serialization and filesystem discovery for hand-authored
//! workflows.
//!
//! The built-in templates (`waypoint_engine::templates`) are Rust values,
//! not YAML -- this module exists for a *host* that wants to load its own
//! workflow definitions from disk instead of registering them as code (see
//! SPEC_FULL §10.3). It is a thin wrapper around `Workflow`'s own
//! `Serialize`/`Deserialize` impls plus the structural `validate()` already
//! defined on it; this module adds nothing to the data model, only the I/O
//! and the parse-then-validate convenience.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::workflow::{ValidationIssue, Workflow};

/// Failure while loading, parsing, or validating a workflow definition from
/// YAML.
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml_ng::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("workflow '{workflow}' failed validation: {issues:?}")]
    Invalid {
        workflow: String,
        issues: Vec<ValidationIssue>,
    },
}

/// Parse a YAML string into a `Workflow`, rejecting it if `validate()`
/// reports any issue.
pub fn parse_workflow_yaml(yaml: &str) -> Result<Workflow, DefinitionError> {
    let workflow: Workflow = serde_yaml_ng::from_str(yaml)?;
    validate_workflow(&workflow)?;
    Ok(workflow)
}

/// Run `Workflow::validate` and turn a non-empty issue list into an error.
pub fn validate_workflow(workflow: &Workflow) -> Result<(), DefinitionError> {
    let issues = workflow.validate();
    if issues.is_empty() {
        Ok(())
    } else {
        Err(DefinitionError::Invalid {
            workflow: workflow.id.clone(),
            issues,
        })
    }
}

/// Serialize a `Workflow` back to YAML.
pub fn serialize_workflow_yaml(workflow: &Workflow) -> Result<String, DefinitionError> {
    Ok(serde_yaml_ng::to_string(workflow)?)
}

/// Load and validate a workflow definition from a YAML file.
pub fn load_workflow_file(path: &Path) -> Result<Workflow, DefinitionError> {
    let content = std::fs::read_to_string(path)?;
    parse_workflow_yaml(&content)
}

/// Serialize and write a workflow definition to a YAML file, creating parent
/// directories as needed.
pub fn save_workflow_file(path: &Path, workflow: &Workflow) -> Result<(), DefinitionError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let yaml = serialize_workflow_yaml(workflow)?;
    std::fs::write(path, yaml)?;
    Ok(())
}

/// Discover and parse every `.yaml`/`.yml` file under `base_dir`, recursing
/// into subdirectories. Files that fail to parse or validate are skipped
/// (logged), not returned as an error -- a directory may legitimately
/// contain non-workflow YAML.
pub fn discover_workflows(base_dir: &Path) -> Result<Vec<(PathBuf, Workflow)>, DefinitionError> {
    let mut results = Vec::new();
    if !base_dir.exists() {
        return Ok(results);
    }
    discover_recursive(base_dir, &mut results)?;
    Ok(results)
}

fn discover_recursive(
    dir: &Path,
    results: &mut Vec<(PathBuf, Workflow)>,
) -> Result<(), DefinitionError> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            discover_recursive(&path, results)?;
        } else if matches!(path.extension().and_then(|e| e.to_str()), Some("yaml" | "yml")) {
            match load_workflow_file(&path) {
                Ok(workflow) => results.push((path, workflow)),
                Err(_) => {
                    // Not every YAML file under this directory need be a
                    // workflow; skip rather than fail the whole scan.
                }
            }
        }
    }
    Ok(())
}
