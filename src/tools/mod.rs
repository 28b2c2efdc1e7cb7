//! Tool definitions and parameter validation.
//!
//! A [`Tool`] couples a [`ToolDefinition`] (name, description, JSON Schema for
//! its parameters) with an async action. The [`registry`] module provides the
//! immutable name-to-tool catalogue built once at startup.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub mod registry;

pub use registry::ToolRegistry;

/// Arc-wrapped tool for shared ownership.
pub type ArcTool = Arc<dyn Tool>;

/// Static description of a tool: its unique name and the JSON Schema its
/// parameters must satisfy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the parameter object.
    pub parameters_schema: serde_json::Value,
}

impl ToolDefinition {
    /// Create a new tool definition.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters_schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters_schema,
        }
    }
}

/// Errors a tool action can report.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool failed: {0}")]
    Failed(String),
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
}

/// An executable tool.
///
/// `run` receives the validated parameter object and a cancellation token.
/// The token is the cooperative-interruption surface: long-running tools
/// should check it at safe points; they are never preemptively killed.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The tool's definition (name, description, parameter schema).
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with the given parameters.
    async fn run(
        &self,
        parameters: serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<String, ToolError>;
}

/// Validate a parameter object against a tool's JSON Schema.
///
/// Returns every instance error, prefixed with its instance path. A schema
/// that itself fails to compile skips validation with a warning rather than
/// rejecting the invocation.
pub fn validate_parameters(
    schema: &serde_json::Value,
    parameters: &serde_json::Value,
) -> Result<(), Vec<String>> {
    let validator = match jsonschema::validator_for(schema) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "Invalid JSON Schema in tool definition, skipping validation");
            return Ok(());
        }
    };

    let issues: Vec<String> = validator
        .iter_errors(parameters)
        .map(|e| {
            let path = e.instance_path.to_string();
            if path.is_empty() {
                e.to_string()
            } else {
                format!("{path}: {e}")
            }
        })
        .collect();

    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}
