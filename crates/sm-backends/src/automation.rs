//! Make.com automation connector

use crate::args::{self, Arguments};
use crate::connector::BackendConnector;
use crate::error::BackendError;
use crate::http::{ApiClient, Auth};
use async_trait::async_trait;
use serde_json::{json, Value};
use sm_core::{AutomationCredentials, BackendKind};

pub struct AutomationConnector {
    client: ApiClient,
    team_id: String,
}

impl AutomationConnector {
    pub fn new(credentials: AutomationCredentials) -> Result<Self, BackendError> {
        let client = ApiClient::new(
            "make",
            &credentials.base_url,
            Auth::Token(credentials.api_key.expose()),
            &[],
        )?;
        Ok(Self {
            client,
            team_id: credentials.team_id,
        })
    }

    async fn list_scenarios(&self, args: &Arguments) -> Result<Value, BackendError> {
        let limit = args::bounded_int(args, "limit", 50, 1, 100)?;
        let query = [
            ("teamId", self.team_id.clone()),
            ("pg[limit]", limit.to_string()),
        ];
        self.client.get(&["scenarios"], &query).await
    }

    async fn run_scenario(&self, args: &Arguments) -> Result<Value, BackendError> {
        let id = scenario_id(args)?;
        let body = args::opt_object(args, "data")?.map(|data| json!({ "data": data }));
        self.client
            .post(&["scenarios", id.as_str(), "run"], body.as_ref())
            .await
    }

    async fn get_scenario(&self, args: &Arguments) -> Result<Value, BackendError> {
        let id = scenario_id(args)?;
        self.client.get(&["scenarios", id.as_str()], &[]).await
    }
}

#[async_trait]
impl BackendConnector for AutomationConnector {
    fn kind(&self) -> BackendKind {
        BackendKind::Automation
    }

    async fn invoke(&self, operation: &str, args: &Arguments) -> Result<Value, BackendError> {
        match operation {
            "list_scenarios" => self.list_scenarios(args).await,
            "run_scenario" => self.run_scenario(args).await,
            "get_scenario" => self.get_scenario(args).await,
            other => Err(BackendError::unsupported(other)),
        }
    }
}

fn scenario_id(args: &Arguments) -> Result<String, BackendError> {
    let id = args::req_int(args, "scenario_id")?;
    if id <= 0 {
        return Err(BackendError::invalid_argument(
            "'scenario_id' must be a positive integer",
        ));
    }
    Ok(id.to_string())
}
