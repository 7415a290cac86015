//! Asana task tracker connector

use crate::args::{self, Arguments};
use crate::connector::BackendConnector;
use crate::error::BackendError;
use crate::http::{ApiClient, Auth};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use sm_core::{BackendKind, TaskTrackerCredentials};

const TASK_FIELDS: &str = "name,due_on,completed,notes,projects.name";
const SEARCH_FIELDS: &str = "name,due_on,completed,notes,assignee.name,projects.name";
const PROJECT_FIELDS: &str = "name,owner.name,due_on,current_status";
const MAX_TASK_NAME_CHARS: usize = 500;

pub struct TaskTrackerConnector {
    client: ApiClient,
    workspace_id: String,
}

impl TaskTrackerConnector {
    pub fn new(credentials: TaskTrackerCredentials) -> Result<Self, BackendError> {
        let client = ApiClient::new(
            "asana",
            &credentials.base_url,
            Auth::Bearer(credentials.access_token.expose()),
            &[],
        )?;
        Ok(Self {
            client,
            workspace_id: credentials.workspace_id,
        })
    }

    async fn get_tasks(&self, args: &Arguments) -> Result<Value, BackendError> {
        let query = self.tasks_query(args)?;
        unwrap_data(self.client.get(&["tasks"], &query).await?)
    }

    fn tasks_query(&self, args: &Arguments) -> Result<Vec<(&'static str, String)>, BackendError> {
        let limit = args::bounded_int(args, "limit", 50, 1, 100)?;
        let mut query = vec![
            ("limit", limit.to_string()),
            ("opt_fields", TASK_FIELDS.to_string()),
        ];

        // Asana accepts either a project filter or an assignee+workspace pair
        match args::opt_str(args, "project")?.filter(|p| !p.is_empty()) {
            Some(project) => query.push(("project", project.to_string())),
            None => {
                let assignee = args::opt_str(args, "assignee")?
                    .filter(|a| !a.is_empty())
                    .unwrap_or("me");
                query.push(("assignee", assignee.to_string()));
                query.push(("workspace", self.workspace_id.clone()));
            }
        }
        // open tasks only unless completed ones are asked for
        if !args::opt_bool(args, "completed")?.unwrap_or(false) {
            query.push(("completed_since", "now".to_string()));
        }
        Ok(query)
    }

    async fn create_task(&self, args: &Arguments) -> Result<Value, BackendError> {
        let name = args::req_str(args, "name")?;
        args::check_len("name", name, MAX_TASK_NAME_CHARS)?;

        let mut data = Map::new();
        data.insert("name".into(), json!(name));
        data.insert("workspace".into(), json!(self.workspace_id));
        let assignee = args::opt_str(args, "assignee")?
            .filter(|a| !a.is_empty())
            .unwrap_or("me");
        data.insert("assignee".into(), json!(assignee));
        for key in ["notes", "due_on"] {
            if let Some(value) = args::opt_str(args, key)?.filter(|v| !v.is_empty()) {
                data.insert(key.into(), json!(value));
            }
        }
        if let Some(project) = args::opt_str(args, "project")?.filter(|p| !p.is_empty()) {
            data.insert("projects".into(), json!([project]));
        }

        let body = json!({ "data": data });
        unwrap_data(self.client.post(&["tasks"], Some(&body)).await?)
    }

    async fn search_tasks(&self, args: &Arguments) -> Result<Value, BackendError> {
        let text = args::req_str(args, "text")?;
        let limit = args::bounded_int(args, "limit", 25, 1, 100)?;
        let mut query = vec![
            ("text", text.to_string()),
            ("limit", limit.to_string()),
            ("opt_fields", SEARCH_FIELDS.to_string()),
        ];
        if let Some(completed) = args::opt_bool(args, "completed")? {
            query.push(("completed", completed.to_string()));
        }

        let segments = ["workspaces", self.workspace_id.as_str(), "tasks", "search"];
        unwrap_data(self.client.get(&segments, &query).await?)
    }

    async fn complete_task(&self, args: &Arguments) -> Result<Value, BackendError> {
        let task_id = args::req_str(args, "task_id")?;
        let body = json!({ "data": { "completed": true } });
        unwrap_data(self.client.put(&["tasks", task_id], &body).await?)
    }

    async fn get_projects(&self, args: &Arguments) -> Result<Value, BackendError> {
        let limit = args::bounded_int(args, "limit", 50, 1, 100)?;
        let archived = args::opt_bool(args, "archived")?.unwrap_or(false);
        let query = [
            ("workspace", self.workspace_id.clone()),
            ("archived", archived.to_string()),
            ("limit", limit.to_string()),
            ("opt_fields", PROJECT_FIELDS.to_string()),
        ];
        unwrap_data(self.client.get(&["projects"], &query).await?)
    }
}

#[async_trait]
impl BackendConnector for TaskTrackerConnector {
    fn kind(&self) -> BackendKind {
        BackendKind::TaskTracker
    }

    async fn invoke(&self, operation: &str, args: &Arguments) -> Result<Value, BackendError> {
        match operation {
            "get_tasks" => self.get_tasks(args).await,
            "create_task" => self.create_task(args).await,
            "search_tasks" => self.search_tasks(args).await,
            "complete_task" => self.complete_task(args).await,
            "get_projects" => self.get_projects(args).await,
            other => Err(BackendError::unsupported(other)),
        }
    }
}

/// Asana wraps every payload in `{"data": ...}`
fn unwrap_data(response: Value) -> Result<Value, BackendError> {
    match response {
        Value::Object(mut map) => map
            .remove("data")
            .ok_or_else(|| BackendError::malformed("asana: response has no 'data' field")),
        _ => Err(BackendError::malformed("asana: response is not an object")),
    }
}
