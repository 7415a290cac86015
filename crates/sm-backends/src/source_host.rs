//! GitHub source host connector

use crate::args::{self, Arguments};
use crate::connector::BackendConnector;
use crate::error::BackendError;
use crate::http::{ApiClient, Auth};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use sm_core::{BackendKind, SourceHostCredentials};

const API_VERSION: &str = "2022-11-28";
const REPO_TYPES: [&str; 5] = ["all", "owner", "public", "private", "member"];

pub struct SourceHostConnector {
    client: ApiClient,
}

impl SourceHostConnector {
    pub fn new(credentials: SourceHostCredentials) -> Result<Self, BackendError> {
        let client = ApiClient::new(
            "github",
            &credentials.base_url,
            Auth::Bearer(credentials.token.expose()),
            &[
                ("accept", "application/vnd.github+json"),
                ("x-github-api-version", API_VERSION),
            ],
        )?;
        Ok(Self { client })
    }

    async fn list_repos(&self, args: &Arguments) -> Result<Value, BackendError> {
        let repo_type = args::opt_str(args, "type")?
            .filter(|t| !t.is_empty())
            .unwrap_or("owner");
        if !REPO_TYPES.contains(&repo_type) {
            return Err(BackendError::invalid_argument(format!(
                "'type' must be one of {}",
                REPO_TYPES.join(", ")
            )));
        }
        let limit = args::bounded_int(args, "limit", 30, 1, 100)?;
        let query = [
            ("type", repo_type.to_string()),
            ("per_page", limit.to_string()),
            ("sort", "updated".to_string()),
        ];

        let response = self.client.get(&["user", "repos"], &query).await?;
        let repos = response
            .as_array()
            .ok_or_else(|| BackendError::malformed("github: repository list is not an array"))?
            .iter()
            .map(summarize_repo)
            .collect::<Vec<_>>();
        Ok(json!({ "repos": repos }))
    }

    async fn get_file(&self, args: &Arguments) -> Result<Value, BackendError> {
        let owner = args::req_str(args, "owner")?;
        let repo = args::req_str(args, "repo")?;
        let path = args::req_str(args, "path")?;

        let mut segments = vec!["repos", owner, repo, "contents"];
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
        let response = self.client.get(&segments, &[]).await?;
        decode_contents(response)
    }
}

#[async_trait]
impl BackendConnector for SourceHostConnector {
    fn kind(&self) -> BackendKind {
        BackendKind::SourceHost
    }

    async fn invoke(&self, operation: &str, args: &Arguments) -> Result<Value, BackendError> {
        match operation {
            "list_repos" => self.list_repos(args).await,
            "get_file" => self.get_file(args).await,
            other => Err(BackendError::unsupported(other)),
        }
    }
}

fn summarize_repo(repo: &Value) -> Value {
    json!({
        "name": repo.get("name"),
        "full_name": repo.get("full_name"),
        "description": repo.get("description"),
        "private": repo.get("private"),
        "url": repo.get("html_url"),
        "updated_at": repo.get("updated_at"),
    })
}

/// Replace the base64 `content` of a file response with `decoded_content`.
///
/// Directory listings (arrays) pass through untouched. Binary files that are
/// not UTF-8 keep their base64 form.
fn decode_contents(response: Value) -> Result<Value, BackendError> {
    let mut file = match response {
        Value::Object(file) => file,
        other => return Ok(other),
    };
    let is_base64 = file.get("encoding").and_then(Value::as_str) == Some("base64");
    let compact = match file.get("content") {
        Some(Value::String(encoded)) if is_base64 => {
            Some(encoded.chars().filter(|c| !c.is_whitespace()).collect::<String>())
        }
        _ => None,
    };
    let Some(compact) = compact else {
        return Ok(Value::Object(file));
    };

    let bytes = STANDARD
        .decode(compact)
        .map_err(|e| BackendError::malformed(format!("github: bad base64 content: {e}")))?;
    if let Ok(text) = String::from_utf8(bytes) {
        file.remove("content");
        file.insert("decoded_content".into(), Value::String(text));
    }
    Ok(Value::Object(file))
}
