//! Immutable tool registry.
//!
//! The registry maps tool names to their implementations. It is built once at
//! startup and never mutated afterwards; the parser consults it to validate
//! invocations and the executor to resolve actions.

use std::collections::HashMap;

use tracing::warn;

use super::{ArcTool, ToolDefinition};

/// Read-only name-to-tool catalogue, populated once.
pub struct ToolRegistry {
    tools: HashMap<String, ArcTool>,
}

impl ToolRegistry {
    /// Build a registry from a list of tools.
    ///
    /// Duplicate names are resolved last-registration-wins, with a warning.
    pub fn new(tools: Vec<ArcTool>) -> Self {
        let mut map: HashMap<String, ArcTool> = HashMap::new();
        for tool in tools {
            let name = tool.definition().name;
            if map.insert(name.clone(), tool).is_some() {
                warn!(tool = %name, "duplicate tool registration, keeping the later one");
            }
        }
        Self { tools: map }
    }

    /// Build an empty registry (no tools available).
    pub fn empty() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<&ArcTool> {
        self.tools.get(name)
    }

    /// Whether a tool with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All registered tool names, sorted, for diagnostics.
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Definitions for all registered tools.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tool_names())
            .finish()
    }
}
