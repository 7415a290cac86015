//! Built-in tool catalog
//!
//! Tool names are namespaced by service (`asana_`, `github_`, ...). Every
//! operation named here has a matching arm in the owning connector.

use crate::registry::{ParamSpec, ParamType, ToolAnnotations, ToolDescriptor, ToolRegistry};
use serde_json::json;
use sm_core::{BackendKind, GatewayError};

use ParamType::{Boolean, Integer, Object, String as Text};

/// Registry holding every tool the gateway serves.
pub fn builtin_registry() -> Result<ToolRegistry, GatewayError> {
    let mut registry = ToolRegistry::new();
    for descriptor in builtin_tools() {
        registry.register(descriptor)?;
    }
    Ok(registry)
}

fn builtin_tools() -> Vec<ToolDescriptor> {
    let mut tools = Vec::new();
    tools.extend(warehouse_tools());
    tools.extend(task_tracker_tools());
    tools.extend(automation_tools());
    tools.extend(source_host_tools());
    tools.extend(voice_tools());
    tools.extend(shared_memory_tools());
    tools.push(
        ToolDescriptor::new(
            "gateway_status",
            "Get the status of the gateway: configured services, tool catalog and uptime.",
            BackendKind::Gateway,
            "status",
        )
        .annotations(ToolAnnotations::lookup("Gateway Status").closed_world()),
    );
    tools
}

fn warehouse_tools() -> Vec<ToolDescriptor> {
    vec![ToolDescriptor::new(
        "snowflake_query",
        "Execute a SQL query against Snowflake and return the rows as JSON.",
        BackendKind::Warehouse,
        "query",
    )
    .param(ParamSpec::required(
        "sql",
        Text,
        "SQL query to execute against Snowflake",
    ))
    .param(ParamSpec::optional(
        "database",
        Text,
        "Database to use (defaults to the configured database)",
    ))
    .annotations(ToolAnnotations::action("Execute Snowflake Query").closed_world())]
}

fn task_tracker_tools() -> Vec<ToolDescriptor> {
    let limit = |default: i64| {
        ParamSpec::optional("limit", Integer, "Maximum results to return (1-100)")
            .with_default(json!(default))
    };

    vec![
        ToolDescriptor::new(
            "asana_get_tasks",
            "Get tasks from Asana for a user or project.",
            BackendKind::TaskTracker,
            "get_tasks",
        )
        .param(
            ParamSpec::optional("assignee", Text, "User to get tasks for ('me' or user GID)")
                .with_default(json!("me")),
        )
        .param(ParamSpec::optional(
            "project",
            Text,
            "Project GID to filter tasks",
        ))
        .param(
            ParamSpec::optional("completed", Boolean, "Include completed tasks")
                .with_default(json!(false)),
        )
        .param(limit(50))
        .annotations(ToolAnnotations::lookup("Get Asana Tasks")),
        ToolDescriptor::new(
            "asana_create_task",
            "Create a new task in Asana.",
            BackendKind::TaskTracker,
            "create_task",
        )
        .param(ParamSpec::required("name", Text, "Task name/title"))
        .param(ParamSpec::optional("notes", Text, "Task description/notes"))
        .param(ParamSpec::optional(
            "due_on",
            Text,
            "Due date in YYYY-MM-DD format",
        ))
        .param(ParamSpec::optional(
            "project",
            Text,
            "Project GID to add task to",
        ))
        .param(
            ParamSpec::optional("assignee", Text, "User to assign task to")
                .with_default(json!("me")),
        )
        .annotations(ToolAnnotations::action("Create Asana Task")),
        ToolDescriptor::new(
            "asana_search_tasks",
            "Search for tasks in the Asana workspace.",
            BackendKind::TaskTracker,
            "search_tasks",
        )
        .param(ParamSpec::required(
            "text",
            Text,
            "Search text to find in task names/descriptions",
        ))
        .param(ParamSpec::optional(
            "completed",
            Boolean,
            "Filter by completion status",
        ))
        .param(limit(25))
        .annotations(ToolAnnotations::lookup("Search Asana Tasks")),
        ToolDescriptor::new(
            "asana_complete_task",
            "Mark an Asana task as complete.",
            BackendKind::TaskTracker,
            "complete_task",
        )
        .param(ParamSpec::required("task_id", Text, "Task GID to mark complete"))
        .annotations(ToolAnnotations::action("Complete Asana Task").idempotent()),
        ToolDescriptor::new(
            "asana_get_projects",
            "List projects in the Asana workspace.",
            BackendKind::TaskTracker,
            "get_projects",
        )
        .param(
            ParamSpec::optional("archived", Boolean, "Include archived projects")
                .with_default(json!(false)),
        )
        .param(limit(50))
        .annotations(ToolAnnotations::lookup("List Asana Projects")),
    ]
}

fn automation_tools() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::new(
            "make_list_scenarios",
            "List automation scenarios in Make.com.",
            BackendKind::Automation,
            "list_scenarios",
        )
        .param(
            ParamSpec::optional("limit", Integer, "Maximum scenarios to return (1-100)")
                .with_default(json!(50)),
        )
        .annotations(ToolAnnotations::lookup("List Make.com Scenarios")),
        ToolDescriptor::new(
            "make_run_scenario",
            "Execute a Make.com scenario, optionally with input data.",
            BackendKind::Automation,
            "run_scenario",
        )
        .param(ParamSpec::required("scenario_id", Integer, "Scenario ID to run"))
        .param(ParamSpec::optional(
            "data",
            Object,
            "Optional input data for the scenario",
        ))
        .annotations(ToolAnnotations::action("Run Make.com Scenario")),
        ToolDescriptor::new(
            "make_get_scenario",
            "Get details of a specific Make.com scenario.",
            BackendKind::Automation,
            "get_scenario",
        )
        .param(ParamSpec::required(
            "scenario_id",
            Integer,
            "Scenario ID to retrieve",
        ))
        .annotations(ToolAnnotations::lookup("Get Make.com Scenario")),
    ]
}

fn source_host_tools() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::new(
            "github_list_repos",
            "List GitHub repositories for the authenticated user.",
            BackendKind::SourceHost,
            "list_repos",
        )
        .param(
            ParamSpec::optional("type", Text, "Type: all, owner, public, private, member")
                .with_default(json!("owner")),
        )
        .param(
            ParamSpec::optional("limit", Integer, "Maximum repositories to return (1-100)")
                .with_default(json!(30)),
        )
        .annotations(ToolAnnotations::lookup("List GitHub Repositories")),
        ToolDescriptor::new(
            "github_get_file",
            "Get the contents of a file from a GitHub repository.",
            BackendKind::SourceHost,
            "get_file",
        )
        .param(ParamSpec::required("owner", Text, "Repository owner"))
        .param(ParamSpec::required("repo", Text, "Repository name"))
        .param(ParamSpec::required("path", Text, "File path in repository"))
        .annotations(ToolAnnotations::lookup("Get GitHub File")),
    ]
}

fn voice_tools() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::new(
            "elevenlabs_list_agents",
            "List all conversational AI agents in ElevenLabs.",
            BackendKind::Voice,
            "list_agents",
        )
        .annotations(ToolAnnotations::lookup("List ElevenLabs Agents")),
        ToolDescriptor::new(
            "elevenlabs_get_agent",
            "Get details of a specific ElevenLabs agent.",
            BackendKind::Voice,
            "get_agent",
        )
        .param(ParamSpec::required("agent_id", Text, "Agent ID to retrieve"))
        .annotations(ToolAnnotations::lookup("Get ElevenLabs Agent")),
    ]
}

fn shared_memory_tools() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::new(
            "hivemind_write",
            "Write an entry to the Hive Mind shared memory so other AI instances can see it.",
            BackendKind::SharedMemory,
            "write",
        )
        .param(ParamSpec::required(
            "source",
            Text,
            "Source identifier (e.g. 'JOHN_CLAUDE', 'ABBI', 'GATEWAY')",
        ))
        .param(ParamSpec::required(
            "category",
            Text,
            "Category: CONTEXT, DECISION, ACTION_ITEM, PREFERENCE, MILESTONE",
        ))
        .param(ParamSpec::required(
            "summary",
            Text,
            "Clear summary of the memory entry (max 2000 characters)",
        ))
        .param(
            ParamSpec::optional("workstream", Text, "Workstream or project name")
                .with_default(json!("GENERAL")),
        )
        .param(
            ParamSpec::optional("priority", Text, "Priority: HIGH, MEDIUM, LOW")
                .with_default(json!("MEDIUM")),
        )
        .annotations(ToolAnnotations::action("Write to Hive Mind").closed_world()),
        ToolDescriptor::new(
            "hivemind_read",
            "Read recent active entries from the Hive Mind shared memory.",
            BackendKind::SharedMemory,
            "read",
        )
        .param(
            ParamSpec::optional("limit", Integer, "Maximum entries to return (1-50)")
                .with_default(json!(10)),
        )
        .param(ParamSpec::optional("source", Text, "Filter by source"))
        .param(ParamSpec::optional("category", Text, "Filter by category"))
        .annotations(ToolAnnotations::lookup("Read from Hive Mind").closed_world()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_is_complete_and_unique() {
        let registry = builtin_registry().unwrap();
        assert_eq!(registry.len(), 16);

        let groups = registry.by_backend();
        assert_eq!(groups[&BackendKind::TaskTracker].len(), 5);
        assert_eq!(groups[&BackendKind::Automation].len(), 3);
        assert_eq!(groups[&BackendKind::Gateway].len(), 1);
    }

    #[test]
    fn test_every_tool_is_namespaced_by_service() {
        let registry = builtin_registry().unwrap();
        for tool in registry.list() {
            let prefix = format!("{}_", tool.backend.service());
            assert!(
                tool.name.starts_with(&prefix),
                "{} should start with {prefix}",
                tool.name
            );
        }
    }

    #[test]
    fn test_run_scenario_schema() {
        let registry = builtin_registry().unwrap();
        let tool = registry.resolve("make_run_scenario").unwrap();
        let schema = tool.input_schema();
        assert_eq!(schema["required"], json!(["scenario_id"]));
        assert_eq!(schema["properties"]["data"]["type"], "object");
        assert!(!tool.annotations.read_only);
    }
}
