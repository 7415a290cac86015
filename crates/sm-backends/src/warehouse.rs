//! Snowflake warehouse connector (SQL API v2)
//!
//! Statements are submitted to `/api/v2/statements`. Long-running statements
//! come back as `202` with a handle and are polled until they finish; the
//! dispatcher's deadline bounds the polling. Multi-partition result sets are
//! fetched partition by partition and flattened into one row list.

use crate::args::{self, Arguments};
use crate::connector::BackendConnector;
use crate::error::BackendError;
use crate::http::{ApiClient, Auth};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use sm_core::{BackendKind, WarehouseCredentials};
use std::time::Duration;
use tracing::debug;

const MAX_SQL_CHARS: usize = 50_000;
const STATEMENT_TIMEOUT_SECS: u64 = 60;
const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct WarehouseConnector {
    client: ApiClient,
    credentials: WarehouseCredentials,
}

impl WarehouseConnector {
    pub fn new(credentials: WarehouseCredentials) -> Result<Self, BackendError> {
        let client = ApiClient::new(
            "snowflake",
            &credentials.base_url,
            Auth::Bearer(credentials.token.expose()),
            &[(
                "x-snowflake-authorization-token-type",
                "PROGRAMMATIC_ACCESS_TOKEN",
            )],
        )?;
        Ok(Self {
            client,
            credentials,
        })
    }

    /// Execute one statement with positional `?` bindings.
    ///
    /// Returns `{success, row_count, columns, data}` with rows keyed by column.
    pub async fn execute(
        &self,
        sql: &str,
        bindings: &[Value],
        database: Option<&str>,
    ) -> Result<Value, BackendError> {
        let mut body = Map::new();
        body.insert("statement".into(), json!(sql));
        body.insert("timeout".into(), json!(STATEMENT_TIMEOUT_SECS));
        let database = database.or(self.credentials.database.as_deref());
        for (key, value) in [
            ("database", database),
            ("warehouse", self.credentials.warehouse.as_deref()),
            ("role", self.credentials.role.as_deref()),
        ] {
            if let Some(value) = value {
                body.insert(key.into(), json!(value));
            }
        }
        if !bindings.is_empty() {
            body.insert("bindings".into(), Value::Object(encode_bindings(bindings)));
        }

        let mut response = self
            .client
            .post(&["api", "v2", "statements"], Some(&Value::Object(body)))
            .await?;

        while is_pending(&response) {
            let handle = statement_handle(&response)?;
            debug!(handle = %handle, "Statement still running, polling");
            tokio::time::sleep(POLL_INTERVAL).await;
            response = self
                .client
                .get(&["api", "v2", "statements", handle.as_str()], &[])
                .await?;
        }

        let columns = column_names(&response)?;
        let mut rows = row_arrays(&response)?;

        let partitions = response
            .pointer("/resultSetMetaData/partitionInfo")
            .and_then(Value::as_array)
            .map_or(1, Vec::len);
        if partitions > 1 {
            let handle = statement_handle(&response)?;
            for partition in 1..partitions {
                let page = self
                    .client
                    .get(
                        &["api", "v2", "statements", handle.as_str()],
                        &[("partition", partition.to_string())],
                    )
                    .await?;
                rows.extend(row_arrays(&page)?);
            }
        }

        let data: Vec<Value> = rows
            .into_iter()
            .map(|row| {
                let cells = match row {
                    Value::Array(cells) => cells,
                    other => vec![other],
                };
                let record: Map<String, Value> = columns
                    .iter()
                    .cloned()
                    .zip(cells.into_iter().chain(std::iter::repeat(Value::Null)))
                    .collect();
                Value::Object(record)
            })
            .collect();

        Ok(json!({
            "success": true,
            "row_count": data.len(),
            "columns": columns,
            "data": data,
        }))
    }

    async fn query(&self, args: &Arguments) -> Result<Value, BackendError> {
        let sql = args::req_str(args, "sql")?;
        args::check_len("sql", sql, MAX_SQL_CHARS)?;
        let database = args::opt_str(args, "database")?.filter(|d| !d.is_empty());
        self.execute(sql, &[], database).await
    }
}

#[async_trait]
impl BackendConnector for WarehouseConnector {
    fn kind(&self) -> BackendKind {
        BackendKind::Warehouse
    }

    async fn invoke(&self, operation: &str, args: &Arguments) -> Result<Value, BackendError> {
        match operation {
            "query" => self.query(args).await,
            other => Err(BackendError::unsupported(other)),
        }
    }
}

/// SQL API binding map: `{"1": {"type": "TEXT", "value": "..."}, ...}`
fn encode_bindings(values: &[Value]) -> Map<String, Value> {
    values
        .iter()
        .enumerate()
        .map(|(i, value)| {
            let (ty, text) = match value {
                Value::Null => ("TEXT", Value::Null),
                Value::Bool(b) => ("BOOLEAN", json!(b.to_string())),
                Value::Number(n) if n.is_i64() || n.is_u64() => ("FIXED", json!(n.to_string())),
                Value::Number(n) => ("REAL", json!(n.to_string())),
                Value::String(s) => ("TEXT", json!(s)),
                other => ("TEXT", json!(other.to_string())),
            };
            ((i + 1).to_string(), json!({"type": ty, "value": text}))
        })
        .collect()
}

fn is_pending(response: &Value) -> bool {
    response.get("resultSetMetaData").is_none() && response.get("statementStatusUrl").is_some()
}

fn statement_handle(response: &Value) -> Result<String, BackendError> {
    response
        .get("statementHandle")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| BackendError::malformed("snowflake: response has no statementHandle"))
}

fn column_names(response: &Value) -> Result<Vec<String>, BackendError> {
    let row_type = response
        .pointer("/resultSetMetaData/rowType")
        .and_then(Value::as_array)
        .ok_or_else(|| BackendError::malformed("snowflake: response has no resultSetMetaData"))?;
    Ok(row_type
        .iter()
        .map(|column| {
            column
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        })
        .collect())
}

fn row_arrays(response: &Value) -> Result<Vec<Value>, BackendError> {
    match response.get("data") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(rows)) => Ok(rows.clone()),
        Some(_) => Err(BackendError::malformed("snowflake: 'data' is not an array")),
    }
}
