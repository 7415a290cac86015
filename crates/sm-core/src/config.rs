//! Gateway configuration
//!
//! Settings come from an optional TOML file overlaid by environment variables.
//! Keys are flat and match the environment names (`SNOWFLAKE_ACCOUNT` is the
//! `snowflake_account` key in the file). The loaded [`GatewayConfig`] is
//! immutable; connectors receive their credential struct by value at startup.
//!
//! A backend whose required settings are absent (or empty) is not an error:
//! it is recorded as disabled and the rest of the gateway starts normally.

use crate::error::{GatewayError, Result};
use crate::types::BackendKind;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;
const DEFAULT_PUSH_QUEUE_CAPACITY: usize = 64;
const DEFAULT_KEEPALIVE_SECS: u64 = 30;
const DEFAULT_HIVEMIND_TABLE: &str = "SOVEREIGN_MIND.RAW.SHARED_MEMORY";

const ASANA_BASE_URL: &str = "https://app.asana.com/api/1.0";
const MAKE_BASE_URL: &str = "https://us1.make.com/api/v2";
const GITHUB_BASE_URL: &str = "https://api.github.com";
const ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io/v1";

/// A credential value that never shows up in logs or `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Flat settings as they appear in the environment / config file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawSettings {
    snowflake_account: Option<String>,
    snowflake_user: Option<String>,
    snowflake_token: Option<String>,
    snowflake_warehouse: Option<String>,
    snowflake_database: Option<String>,
    snowflake_role: Option<String>,
    snowflake_base_url: Option<String>,
    snowflake_timeout_secs: Option<u64>,

    asana_access_token: Option<String>,
    asana_workspace_id: Option<String>,
    asana_base_url: Option<String>,
    asana_timeout_secs: Option<u64>,

    make_api_key: Option<String>,
    make_organization_id: Option<String>,
    make_team_id: Option<String>,
    make_base_url: Option<String>,
    make_timeout_secs: Option<u64>,

    github_token: Option<String>,
    github_base_url: Option<String>,
    github_timeout_secs: Option<u64>,

    elevenlabs_api_key: Option<String>,
    elevenlabs_base_url: Option<String>,
    elevenlabs_timeout_secs: Option<u64>,

    hivemind_table: Option<String>,
    hivemind_timeout_secs: Option<u64>,

    host: Option<String>,
    port: Option<u16>,
    gateway_call_timeout_secs: Option<u64>,
    gateway_idle_timeout_secs: Option<u64>,
    gateway_push_queue_capacity: Option<usize>,
    gateway_keepalive_secs: Option<u64>,
}

/// Trimmed, non-empty value or nothing
fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn base_url(value: &Option<String>, default: &str) -> String {
    present(value)
        .unwrap_or_else(|| default.to_string())
        .trim_end_matches('/')
        .to_string()
}

/// Snowflake SQL API credentials
#[derive(Debug, Clone)]
pub struct WarehouseCredentials {
    pub account: String,
    pub user: Option<String>,
    pub token: Secret,
    pub warehouse: Option<String>,
    pub database: Option<String>,
    pub role: Option<String>,
    /// Defaults to `https://<account>.snowflakecomputing.com`
    pub base_url: String,
}

/// Asana credentials
#[derive(Debug, Clone)]
pub struct TaskTrackerCredentials {
    pub access_token: Secret,
    pub workspace_id: String,
    pub base_url: String,
}

/// Make.com credentials
#[derive(Debug, Clone)]
pub struct AutomationCredentials {
    pub api_key: Secret,
    pub team_id: String,
    pub organization_id: Option<String>,
    pub base_url: String,
}

/// GitHub credentials
#[derive(Debug, Clone)]
pub struct SourceHostCredentials {
    pub token: Secret,
    pub base_url: String,
}

/// ElevenLabs credentials
#[derive(Debug, Clone)]
pub struct VoiceCredentials {
    pub api_key: Secret,
    pub base_url: String,
}

/// Hive Mind storage location inside the warehouse
#[derive(Debug, Clone)]
pub struct SharedMemorySettings {
    pub table: String,
}

/// Listener and session settings
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Sessions with no pending calls are closed after this long without activity
    pub idle_timeout: Duration,
    /// Maximum frames buffered for one push session before it is dropped
    pub push_queue_capacity: usize,
    /// Interval between keep-alive comments on idle push streams
    pub keep_alive: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            push_queue_capacity: DEFAULT_PUSH_QUEUE_CAPACITY,
            keep_alive: Duration::from_secs(DEFAULT_KEEPALIVE_SECS),
        }
    }
}

impl ServerSettings {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Per-backend invocation deadlines
#[derive(Debug, Clone)]
pub struct TimeoutSettings {
    pub default: Duration,
    pub overrides: BTreeMap<BackendKind, Duration>,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            default: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
            overrides: BTreeMap::new(),
        }
    }
}

impl TimeoutSettings {
    /// Uniform deadline for every backend
    pub fn uniform(default: Duration) -> Self {
        Self {
            default,
            overrides: BTreeMap::new(),
        }
    }

    pub fn with_override(mut self, kind: BackendKind, timeout: Duration) -> Self {
        self.overrides.insert(kind, timeout);
        self
    }

    pub fn for_backend(&self, kind: BackendKind) -> Duration {
        self.overrides.get(&kind).copied().unwrap_or(self.default)
    }
}

/// Immutable gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub server: ServerSettings,
    pub timeouts: TimeoutSettings,
    pub warehouse: Option<WarehouseCredentials>,
    pub task_tracker: Option<TaskTrackerCredentials>,
    pub automation: Option<AutomationCredentials>,
    pub source_host: Option<SourceHostCredentials>,
    pub voice: Option<VoiceCredentials>,
    pub shared_memory: SharedMemorySettings,
    /// Settings that are absent for each disabled backend
    missing: BTreeMap<BackendKind, Vec<&'static str>>,
}

impl Default for SharedMemorySettings {
    fn default() -> Self {
        Self {
            table: DEFAULT_HIVEMIND_TABLE.to_string(),
        }
    }
}

impl GatewayConfig {
    /// Load from an optional TOML file plus the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            if !path.exists() {
                return Err(GatewayError::config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
            info!(path = %path.display(), "Loading gateway config file");
        }
        let settings = builder.add_source(Environment::default()).build()?;
        Self::from_raw(settings.try_deserialize()?)
    }

    /// Build from an explicit variable map instead of the process environment.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        let settings = Config::builder()
            .add_source(Environment::default().source(Some(vars)))
            .build()?;
        Self::from_raw(settings.try_deserialize()?)
    }

    fn from_raw(raw: RawSettings) -> Result<Self> {
        let mut missing: BTreeMap<BackendKind, Vec<&'static str>> = BTreeMap::new();

        let warehouse = match (present(&raw.snowflake_account), present(&raw.snowflake_token)) {
            (Some(account), Some(token)) => Some(WarehouseCredentials {
                base_url: base_url(
                    &raw.snowflake_base_url,
                    &format!("https://{account}.snowflakecomputing.com"),
                ),
                account,
                user: present(&raw.snowflake_user),
                token: Secret::new(token),
                warehouse: present(&raw.snowflake_warehouse),
                database: present(&raw.snowflake_database),
                role: present(&raw.snowflake_role),
            }),
            (account, token) => {
                let mut absent = Vec::new();
                if account.is_none() {
                    absent.push("SNOWFLAKE_ACCOUNT");
                }
                if token.is_none() {
                    absent.push("SNOWFLAKE_TOKEN");
                }
                missing.insert(BackendKind::Warehouse, absent.clone());
                missing.insert(BackendKind::SharedMemory, absent);
                None
            }
        };

        let task_tracker = match (
            present(&raw.asana_access_token),
            present(&raw.asana_workspace_id),
        ) {
            (Some(token), Some(workspace_id)) => Some(TaskTrackerCredentials {
                access_token: Secret::new(token),
                workspace_id,
                base_url: base_url(&raw.asana_base_url, ASANA_BASE_URL),
            }),
            (token, workspace) => {
                let mut absent = Vec::new();
                if token.is_none() {
                    absent.push("ASANA_ACCESS_TOKEN");
                }
                if workspace.is_none() {
                    absent.push("ASANA_WORKSPACE_ID");
                }
                missing.insert(BackendKind::TaskTracker, absent);
                None
            }
        };

        let automation = match (present(&raw.make_api_key), present(&raw.make_team_id)) {
            (Some(key), Some(team_id)) => Some(AutomationCredentials {
                api_key: Secret::new(key),
                team_id,
                organization_id: present(&raw.make_organization_id),
                base_url: base_url(&raw.make_base_url, MAKE_BASE_URL),
            }),
            (key, team) => {
                let mut absent = Vec::new();
                if key.is_none() {
                    absent.push("MAKE_API_KEY");
                }
                if team.is_none() {
                    absent.push("MAKE_TEAM_ID");
                }
                missing.insert(BackendKind::Automation, absent);
                None
            }
        };

        let source_host = match present(&raw.github_token) {
            Some(token) => Some(SourceHostCredentials {
                token: Secret::new(token),
                base_url: base_url(&raw.github_base_url, GITHUB_BASE_URL),
            }),
            None => {
                missing.insert(BackendKind::SourceHost, vec!["GITHUB_TOKEN"]);
                None
            }
        };

        let voice = match present(&raw.elevenlabs_api_key) {
            Some(key) => Some(VoiceCredentials {
                api_key: Secret::new(key),
                base_url: base_url(&raw.elevenlabs_base_url, ELEVENLABS_BASE_URL),
            }),
            None => {
                missing.insert(BackendKind::Voice, vec!["ELEVENLABS_API_KEY"]);
                None
            }
        };

        let mut timeouts = TimeoutSettings::uniform(Duration::from_secs(
            raw.gateway_call_timeout_secs
                .unwrap_or(DEFAULT_CALL_TIMEOUT_SECS),
        ));
        for (kind, secs) in [
            (BackendKind::Warehouse, raw.snowflake_timeout_secs),
            (BackendKind::TaskTracker, raw.asana_timeout_secs),
            (BackendKind::Automation, raw.make_timeout_secs),
            (BackendKind::SourceHost, raw.github_timeout_secs),
            (BackendKind::Voice, raw.elevenlabs_timeout_secs),
            (BackendKind::SharedMemory, raw.hivemind_timeout_secs),
        ] {
            if let Some(secs) = secs {
                timeouts.overrides.insert(kind, Duration::from_secs(secs));
            }
        }

        let server = ServerSettings {
            host: present(&raw.host).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: raw.port.unwrap_or(DEFAULT_PORT),
            idle_timeout: Duration::from_secs(
                raw.gateway_idle_timeout_secs
                    .unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS),
            ),
            push_queue_capacity: raw
                .gateway_push_queue_capacity
                .unwrap_or(DEFAULT_PUSH_QUEUE_CAPACITY),
            keep_alive: Duration::from_secs(
                raw.gateway_keepalive_secs.unwrap_or(DEFAULT_KEEPALIVE_SECS),
            ),
        };

        let config = Self {
            server,
            timeouts,
            warehouse,
            task_tracker,
            automation,
            source_host,
            voice,
            shared_memory: SharedMemorySettings {
                table: present(&raw.hivemind_table)
                    .unwrap_or_else(|| DEFAULT_HIVEMIND_TABLE.to_string()),
            },
            missing,
        };
        config.validate()?;

        for (kind, absent) in &config.missing {
            warn!(backend = %kind, missing = ?absent, "Backend disabled: required settings absent");
        }
        debug!(
            configured = ?BackendKind::ALL
                .iter()
                .filter(|k| config.is_configured(**k))
                .collect::<Vec<_>>(),
            "Gateway configuration loaded"
        );
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.server.push_queue_capacity == 0 {
            return Err(GatewayError::config(
                "GATEWAY_PUSH_QUEUE_CAPACITY must be at least 1",
            ));
        }
        if self.server.idle_timeout.is_zero() {
            return Err(GatewayError::config(
                "GATEWAY_IDLE_TIMEOUT_SECS must be at least 1",
            ));
        }
        if self.server.keep_alive.is_zero() {
            return Err(GatewayError::config(
                "GATEWAY_KEEPALIVE_SECS must be at least 1",
            ));
        }
        if self.timeouts.default.is_zero() || self.timeouts.overrides.values().any(|t| t.is_zero())
        {
            return Err(GatewayError::config("call timeouts must be at least 1 second"));
        }
        Ok(())
    }

    /// Whether every setting the backend requires is present.
    pub fn is_configured(&self, kind: BackendKind) -> bool {
        !self.missing.contains_key(&kind)
    }

    /// Names of the settings a disabled backend is missing.
    pub fn missing_settings(&self, kind: BackendKind) -> &[&'static str] {
        self.missing.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_environment_disables_every_backend() {
        let config = GatewayConfig::from_vars(HashMap::new()).unwrap();

        for kind in BackendKind::ALL {
            if kind == BackendKind::Gateway {
                assert!(config.is_configured(kind));
            } else {
                assert!(!config.is_configured(kind), "{kind} should be disabled");
            }
        }
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.push_queue_capacity, 64);
        assert_eq!(config.server.idle_timeout, Duration::from_secs(300));
        assert_eq!(config.server.keep_alive, Duration::from_secs(30));
        assert_eq!(config.timeouts.default, Duration::from_secs(30));
        assert_eq!(
            config.missing_settings(BackendKind::Warehouse),
            &["SNOWFLAKE_ACCOUNT", "SNOWFLAKE_TOKEN"]
        );
    }

    #[test]
    fn test_credentials_enable_backends() {
        let config = GatewayConfig::from_vars(vars(&[
            ("SNOWFLAKE_ACCOUNT", "xy12345.east-us-2.azure"),
            ("SNOWFLAKE_TOKEN", "pat"),
            ("ASANA_ACCESS_TOKEN", "asana"),
            ("ASANA_WORKSPACE_ID", "42"),
            ("GITHUB_TOKEN", "ghp"),
        ]))
        .unwrap();

        assert!(config.is_configured(BackendKind::Warehouse));
        assert!(config.is_configured(BackendKind::SharedMemory));
        assert!(config.is_configured(BackendKind::TaskTracker));
        assert!(config.is_configured(BackendKind::SourceHost));
        assert!(!config.is_configured(BackendKind::Automation));
        assert!(!config.is_configured(BackendKind::Voice));

        let warehouse = config.warehouse.as_ref().unwrap();
        assert_eq!(
            warehouse.base_url,
            "https://xy12345.east-us-2.azure.snowflakecomputing.com"
        );
        assert_eq!(config.task_tracker.as_ref().unwrap().workspace_id, "42");
    }

    #[test]
    fn test_blank_values_count_as_absent() {
        let config = GatewayConfig::from_vars(vars(&[("GITHUB_TOKEN", "   ")])).unwrap();
        assert!(!config.is_configured(BackendKind::SourceHost));
    }

    #[test]
    fn test_timeout_overrides_and_server_settings() {
        let config = GatewayConfig::from_vars(vars(&[
            ("GATEWAY_CALL_TIMEOUT_SECS", "10"),
            ("ASANA_TIMEOUT_SECS", "3"),
            ("GATEWAY_PUSH_QUEUE_CAPACITY", "8"),
            ("GATEWAY_KEEPALIVE_SECS", "15"),
            ("PORT", "9100"),
        ]))
        .unwrap();

        assert_eq!(
            config.timeouts.for_backend(BackendKind::TaskTracker),
            Duration::from_secs(3)
        );
        assert_eq!(
            config.timeouts.for_backend(BackendKind::Voice),
            Duration::from_secs(10)
        );
        assert_eq!(config.server.push_queue_capacity, 8);
        assert_eq!(config.server.keep_alive, Duration::from_secs(15));
        assert_eq!(config.server.bind_addr(), "0.0.0.0:9100");
    }

    #[test]
    fn test_zero_queue_capacity_is_rejected() {
        let err = GatewayConfig::from_vars(vars(&[("GATEWAY_PUSH_QUEUE_CAPACITY", "0")]))
            .unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
    }

    #[test]
    fn test_secret_is_redacted_in_debug() {
        let creds = SourceHostCredentials {
            token: Secret::new("ghp_very_secret"),
            base_url: GITHUB_BASE_URL.to_string(),
        };
        let printed = format!("{creds:?}");
        assert!(!printed.contains("ghp_very_secret"));
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "elevenlabs_api_key = \"xi\"").unwrap();
        writeln!(file, "hivemind_table = \"DB.SCHEMA.MEMORY\"").unwrap();

        let config = GatewayConfig::load(Some(file.path())).unwrap();
        assert!(config.is_configured(BackendKind::Voice));
        assert_eq!(config.shared_memory.table, "DB.SCHEMA.MEMORY");
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let err = GatewayConfig::load(Some(Path::new("/nonexistent/sm-gateway.toml")))
            .unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
    }
}
