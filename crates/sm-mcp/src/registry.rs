//! Tool Registry
//!
//! Static catalog mapping each namespaced tool name onto the backend and
//! operation that serve it. Built once before any transport accepts a
//! connection, then shared read-only (no locks) behind an `Arc`.

use serde::Serialize;
use serde_json::{json, Map, Value};
use sm_core::{BackendKind, GatewayError};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Declared type of a tool parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Boolean,
    Object,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
        }
    }
}

/// One entry of a tool's parameter schema
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub param_type: ParamType,
    pub required: bool,
    pub description: String,
    /// Shown in the listed schema; applied by the connector, not the dispatcher
    pub default: Option<Value>,
}

impl ParamSpec {
    pub fn required(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            required: true,
            description: description.to_string(),
            default: None,
        }
    }

    pub fn optional(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    fn schema(&self) -> Value {
        let mut schema = json!({
            "type": self.param_type.as_str(),
            "description": self.description,
        });
        if let (Some(default), Some(obj)) = (&self.default, schema.as_object_mut()) {
            obj.insert("default".into(), default.clone());
        }
        schema
    }
}

/// MCP behaviour hints advertised with a tool
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolAnnotations {
    pub title: String,
    #[serde(rename = "readOnlyHint")]
    pub read_only: bool,
    #[serde(rename = "destructiveHint")]
    pub destructive: bool,
    #[serde(rename = "idempotentHint")]
    pub idempotent: bool,
    #[serde(rename = "openWorldHint")]
    pub open_world: bool,
}

impl ToolAnnotations {
    /// Read-only, idempotent lookup against an external service
    pub fn lookup(title: &str) -> Self {
        Self {
            title: title.to_string(),
            read_only: true,
            destructive: false,
            idempotent: true,
            open_world: true,
        }
    }

    /// State-changing call against an external service
    pub fn action(title: &str) -> Self {
        Self {
            title: title.to_string(),
            read_only: false,
            destructive: false,
            idempotent: false,
            open_world: true,
        }
    }

    pub fn idempotent(mut self) -> Self {
        self.idempotent = true;
        self
    }

    pub fn closed_world(mut self) -> Self {
        self.open_world = false;
        self
    }
}

/// A tool as advertised to clients and resolved by the dispatcher
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
    pub backend: BackendKind,
    pub operation: String,
    pub annotations: ToolAnnotations,
}

impl ToolDescriptor {
    pub fn new(name: &str, description: &str, backend: BackendKind, operation: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            params: Vec::new(),
            backend,
            operation: operation.to_string(),
            annotations: ToolAnnotations::default(),
        }
    }

    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    pub fn annotations(mut self, annotations: ToolAnnotations) -> Self {
        self.annotations = annotations;
        self
    }

    /// JSON Schema for the tool's arguments
    pub fn input_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .params
            .iter()
            .map(|p| (p.name.clone(), p.schema()))
            .collect();
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Entry of a `tools/list` result
    pub fn to_mcp(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema(),
            "annotations": self.annotations,
        })
    }
}

/// Registration-ordered tool catalog with name lookup
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool; names must be unique.
    pub fn register(&mut self, descriptor: ToolDescriptor) -> Result<(), GatewayError> {
        if self.index.contains_key(&descriptor.name) {
            return Err(GatewayError::DuplicateToolName(descriptor.name));
        }
        debug!(tool = %descriptor.name, backend = %descriptor.backend, "Registered tool");
        self.index.insert(descriptor.name.clone(), self.tools.len());
        self.tools.push(descriptor);
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<&ToolDescriptor, GatewayError> {
        self.index
            .get(name)
            .map(|&i| &self.tools[i])
            .ok_or_else(|| GatewayError::NotFound(name.to_string()))
    }

    /// All tools in registration order
    pub fn list(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    /// Tools grouped by owning backend, registration order within a group
    pub fn by_backend(&self) -> BTreeMap<BackendKind, Vec<&ToolDescriptor>> {
        let mut groups: BTreeMap<BackendKind, Vec<&ToolDescriptor>> = BTreeMap::new();
        for tool in &self.tools {
            groups.entry(tool.backend).or_default().push(tool);
        }
        groups
    }

    /// The `tools` array of a `tools/list` result
    pub fn to_mcp_list(&self) -> Vec<Value> {
        self.tools.iter().map(ToolDescriptor::to_mcp).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(name: &str) -> ToolDescriptor {
        ToolDescriptor::new(name, "test tool", BackendKind::SourceHost, "list_repos")
    }

    #[test]
    fn test_resolve_registered_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(tool("github_list_repos")).unwrap();

        let descriptor = registry.resolve("github_list_repos").unwrap();
        assert_eq!(descriptor.backend, BackendKind::SourceHost);
        assert_eq!(descriptor.operation, "list_repos");
    }

    #[test]
    fn test_unknown_name_is_not_found() {
        let registry = ToolRegistry::new();
        assert!(matches!(
            registry.resolve("slack_post"),
            Err(GatewayError::NotFound(name)) if name == "slack_post"
        ));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = ToolRegistry::new();
        registry.register(tool("github_list_repos")).unwrap();
        let err = registry.register(tool("github_list_repos")).unwrap_err();
        assert!(matches!(err, GatewayError::DuplicateToolName(name) if name == "github_list_repos"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_list_keeps_registration_order() {
        let mut registry = ToolRegistry::new();
        for name in ["c_tool", "a_tool", "b_tool"] {
            registry.register(tool(name)).unwrap();
        }
        assert_eq!(registry.names(), vec!["c_tool", "a_tool", "b_tool"]);
    }

    #[test]
    fn test_input_schema_marks_required_params() {
        let descriptor = tool("github_get_file")
            .param(ParamSpec::required("owner", ParamType::String, "Repository owner"))
            .param(
                ParamSpec::optional("limit", ParamType::Integer, "Max results")
                    .with_default(json!(30)),
            );
        let schema = descriptor.input_schema();
        assert_eq!(schema["required"], json!(["owner"]));
        assert_eq!(schema["properties"]["limit"]["type"], "integer");
        assert_eq!(schema["properties"]["limit"]["default"], 30);
    }

    #[test]
    fn test_annotations_use_mcp_hint_names() {
        let descriptor = tool("github_list_repos")
            .annotations(ToolAnnotations::lookup("List GitHub Repositories"));
        let listed = descriptor.to_mcp();
        assert_eq!(listed["annotations"]["readOnlyHint"], true);
        assert_eq!(listed["annotations"]["openWorldHint"], true);
        assert_eq!(listed["annotations"]["title"], "List GitHub Repositories");
    }
}
