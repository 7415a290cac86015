//! ElevenLabs conversational agents connector

use crate::args::{self, Arguments};
use crate::connector::BackendConnector;
use crate::error::BackendError;
use crate::http::{ApiClient, Auth};
use async_trait::async_trait;
use serde_json::Value;
use sm_core::{BackendKind, VoiceCredentials};

pub struct VoiceConnector {
    client: ApiClient,
}

impl VoiceConnector {
    pub fn new(credentials: VoiceCredentials) -> Result<Self, BackendError> {
        let client = ApiClient::new(
            "elevenlabs",
            &credentials.base_url,
            Auth::Header("xi-api-key", credentials.api_key.expose()),
            &[],
        )?;
        Ok(Self { client })
    }
}

#[async_trait]
impl BackendConnector for VoiceConnector {
    fn kind(&self) -> BackendKind {
        BackendKind::Voice
    }

    async fn invoke(&self, operation: &str, args: &Arguments) -> Result<Value, BackendError> {
        match operation {
            "list_agents" => self.client.get(&["convai", "agents"], &[]).await,
            "get_agent" => {
                let agent_id = args::req_str(args, "agent_id")?;
                self.client.get(&["convai", "agents", agent_id], &[]).await
            }
            other => Err(BackendError::unsupported(other)),
        }
    }
}
