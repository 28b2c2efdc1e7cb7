//! Invocation extraction and validation.
//!
//! Runs only over a complete `<function_calls>` body: pulls out every
//! `<invoke>` block, collects its `<parameter>` entries into a raw string
//! map, and validates each invocation independently against the tool
//! registry. A malformed invocation yields a [`ValidationFailure`] item and
//! never blocks its siblings.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ParsedItem;
use crate::tools::{validate_parameters, ToolRegistry};

static INVOKE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<invoke\s+name="([^"]*)"\s*>(.*?)</invoke>"#).expect("invoke regex")
});

static PARAMETER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<parameter\s+name="([^"]*)"\s*>(.*?)</parameter>"#).expect("parameter regex")
});

/// A validated tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Registered tool name.
    pub tool: String,
    /// The validated, typed parameter object.
    pub parameters: serde_json::Value,
    /// The original raw string values as they appeared on the wire.
    pub raw_parameters: HashMap<String, String>,
}

/// Why an invocation was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    UnknownTool,
    InvalidParameters,
}

/// A rejected invocation, with enough structure for a sink to render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationFailure {
    pub kind: ValidationErrorKind,
    /// The tool name the invocation asked for.
    pub tool: String,
    /// Human-readable issues (schema paths and messages).
    pub issues: Vec<String>,
    /// For unknown tools: what the registry actually offers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub known_tools: Vec<String>,
}

/// Extract and validate every invocation in a complete `function_calls` body.
pub(super) fn extract_invocations(body: &str, registry: &ToolRegistry) -> Vec<ParsedItem> {
    INVOKE_RE
        .captures_iter(body)
        .map(|cap| {
            let tool = cap[1].to_string();
            let parameters = collect_raw_parameters(&cap[2]);
            validate_invocation(tool, parameters, registry)
        })
        .collect()
}

/// Ordered `(name, raw value)` entries from one invoke body.
fn collect_raw_parameters(body: &str) -> Vec<(String, String)> {
    PARAMETER_RE
        .captures_iter(body)
        .map(|cap| (cap[1].to_string(), cap[2].to_string()))
        .collect()
}

fn validate_invocation(
    tool: String,
    raw_entries: Vec<(String, String)>,
    registry: &ToolRegistry,
) -> ParsedItem {
    let Some(registered) = registry.get(&tool) else {
        debug!(tool = %tool, "invocation of unknown tool");
        return ParsedItem::ValidationError(ValidationFailure {
            kind: ValidationErrorKind::UnknownTool,
            issues: vec![format!("no tool named \"{tool}\" is registered")],
            known_tools: registry.tool_names(),
            tool,
        });
    };

    // Duplicate parameter names: the last occurrence wins.
    let mut object = serde_json::Map::new();
    let mut raw_parameters = HashMap::new();
    for (name, raw) in raw_entries {
        object.insert(name.clone(), decode_parameter_value(&raw));
        raw_parameters.insert(name, raw);
    }
    let parameters = serde_json::Value::Object(object);

    match validate_parameters(&registered.definition().parameters_schema, &parameters) {
        Ok(()) => ParsedItem::FunctionCall(FunctionCall {
            tool,
            parameters,
            raw_parameters,
        }),
        Err(issues) => {
            debug!(tool = %tool, issues = issues.len(), "invocation failed schema validation");
            ParsedItem::ValidationError(ValidationFailure {
                kind: ValidationErrorKind::InvalidParameters,
                tool,
                issues,
                known_tools: Vec::new(),
            })
        }
    }
}

/// Two-step fallback: attempt a JSON decode of the raw value, else keep the
/// literal string. Explicitly not heuristic type inference.
fn decode_parameter_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::tools::{ArcTool, Tool, ToolDefinition, ToolError};

    struct SchemaTool {
        name: &'static str,
        schema: serde_json::Value,
    }

    #[async_trait]
    impl Tool for SchemaTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new(self.name, "test tool", self.schema.clone())
        }

        async fn run(
            &self,
            _parameters: serde_json::Value,
            _cancel: &CancellationToken,
        ) -> Result<String, ToolError> {
            Ok(String::new())
        }
    }

    fn schema_tool(name: &'static str, schema: serde_json::Value) -> ArcTool {
        Arc::new(SchemaTool { name, schema })
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::new(vec![
            schema_tool(
                "eval",
                json!({
                    "type": "object",
                    "properties": { "code": { "type": "string" } },
                    "required": ["code"]
                }),
            ),
            schema_tool(
                "add",
                json!({
                    "type": "object",
                    "properties": {
                        "a": { "type": "number" },
                        "b": { "type": "number" }
                    },
                    "required": ["a", "b"]
                }),
            ),
        ])
    }

    fn invoke(tool: &str, params: &[(&str, &str)]) -> String {
        let mut s = format!("<invoke name=\"{tool}\">");
        for (name, value) in params {
            s.push_str(&format!(
                "<parameter name=\"{name}\">{value}</parameter>"
            ));
        }
        s.push_str("</invoke>");
        s
    }

    #[test]
    fn unknown_tool_yields_validation_error_with_registry_listing() {
        let registry = registry();
        let items = extract_invocations(&invoke("bash", &[("cmd", "ls")]), &registry);
        assert_eq!(items.len(), 1);
        match &items[0] {
            ParsedItem::ValidationError(failure) => {
                assert_eq!(failure.kind, ValidationErrorKind::UnknownTool);
                assert_eq!(failure.tool, "bash");
                assert_eq!(failure.known_tools, vec!["add", "eval"]);
            }
            other => panic!("expected ValidationError, got {other:?}"),
        }
    }

    #[test]
    fn numeric_string_decodes_to_number() {
        let registry = registry();
        let items = extract_invocations(&invoke("add", &[("a", "42"), ("b", "0.5")]), &registry);
        match &items[0] {
            ParsedItem::FunctionCall(call) => {
                assert_eq!(call.parameters, json!({"a": 42, "b": 0.5}));
                assert_eq!(call.raw_parameters["a"], "42");
            }
            other => panic!("expected FunctionCall, got {other:?}"),
        }
    }

    #[test]
    fn invalid_json_falls_back_to_literal_string() {
        let registry = registry();
        let items = extract_invocations(&invoke("eval", &[("code", "hello")]), &registry);
        match &items[0] {
            ParsedItem::FunctionCall(call) => {
                assert_eq!(call.parameters, json!({"code": "hello"}));
            }
            other => panic!("expected FunctionCall, got {other:?}"),
        }
    }

    #[test]
    fn schema_mismatch_yields_invalid_parameters() {
        let registry = registry();
        // `a` decodes to a string, violating the number schema.
        let items = extract_invocations(&invoke("add", &[("a", "oops"), ("b", "2")]), &registry);
        match &items[0] {
            ParsedItem::ValidationError(failure) => {
                assert_eq!(failure.kind, ValidationErrorKind::InvalidParameters);
                assert_eq!(failure.tool, "add");
                assert!(!failure.issues.is_empty());
            }
            other => panic!("expected ValidationError, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_parameter_last_wins() {
        let registry = registry();
        let items = extract_invocations(
            &invoke("eval", &[("code", "first"), ("code", "second")]),
            &registry,
        );
        match &items[0] {
            ParsedItem::FunctionCall(call) => {
                assert_eq!(call.parameters, json!({"code": "second"}));
                assert_eq!(call.raw_parameters["code"], "second");
            }
            other => panic!("expected FunctionCall, got {other:?}"),
        }
    }

    #[test]
    fn malformed_invocation_does_not_block_siblings() {
        let registry = registry();
        let body = format!(
            "{}{}{}",
            invoke("bash", &[("cmd", "rm -rf /")]),
            invoke("eval", &[("code", "2+2")]),
            invoke("add", &[("a", "nope"), ("b", "2")]),
        );
        let items = extract_invocations(&body, &registry);
        assert_eq!(items.len(), 3);
        assert!(matches!(items[0], ParsedItem::ValidationError(_)));
        assert!(matches!(items[1], ParsedItem::FunctionCall(_)));
        assert!(matches!(items[2], ParsedItem::ValidationError(_)));
    }

    #[test]
    fn invocation_without_parameters_is_valid_for_open_schema() {
        let registry = ToolRegistry::new(vec![schema_tool("ping", json!({"type": "object"}))]);
        let items = extract_invocations("<invoke name=\"ping\"></invoke>", &registry);
        match &items[0] {
            ParsedItem::FunctionCall(call) => {
                assert_eq!(call.parameters, json!({}));
                assert!(call.raw_parameters.is_empty());
            }
            other => panic!("expected FunctionCall, got {other:?}"),
        }
    }

    #[test]
    fn multiline_parameter_values_are_preserved() {
        let registry = registry();
        let body = "<invoke name=\"eval\"><parameter name=\"code\">line one\nline two</parameter></invoke>";
        let items = extract_invocations(body, &registry);
        match &items[0] {
            ParsedItem::FunctionCall(call) => {
                assert_eq!(call.parameters, json!({"code": "line one\nline two"}));
            }
            other => panic!("expected FunctionCall, got {other:?}"),
        }
    }

    #[test]
    fn json_structured_values_decode() {
        let registry = ToolRegistry::new(vec![schema_tool(
            "batch",
            json!({
                "type": "object",
                "properties": {
                    "items": { "type": "array" },
                    "flag": { "type": "boolean" }
                }
            }),
        )]);
        let items = extract_invocations(
            &invoke("batch", &[("items", "[1, 2, 3]"), ("flag", "true")]),
            &registry,
        );
        match &items[0] {
            ParsedItem::FunctionCall(call) => {
                assert_eq!(call.parameters, json!({"items": [1, 2, 3], "flag": true}));
            }
            other => panic!("expected FunctionCall, got {other:?}"),
        }
    }

    #[test]
    fn empty_body_produces_no_items() {
        let registry = registry();
        assert!(extract_invocations("", &registry).is_empty());
        assert!(extract_invocations("  \n ", &registry).is_empty());
    }

    #[test]
    fn unclosed_invoke_block_is_ignored() {
        let registry = registry();
        let body = format!(
            "{}<invoke name=\"eval\"><parameter name=\"code\">dangling",
            invoke("eval", &[("code", "ok")])
        );
        let items = extract_invocations(&body, &registry);
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], ParsedItem::FunctionCall(_)));
    }
}
