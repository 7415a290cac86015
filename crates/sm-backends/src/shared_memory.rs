//! Hive Mind shared memory
//!
//! A table in the warehouse where AI instances leave context for each other.
//! All user-supplied values travel as bind parameters; only the configured
//! table name is spliced into the statement, and it is validated up front.

use crate::args::{self, Arguments};
use crate::connector::BackendConnector;
use crate::error::BackendError;
use crate::warehouse::WarehouseConnector;
use async_trait::async_trait;
use serde_json::{json, Value};
use sm_core::BackendKind;
use std::sync::Arc;

const MAX_SUMMARY_CHARS: usize = 2_000;

pub struct SharedMemoryConnector {
    warehouse: Arc<WarehouseConnector>,
    table: String,
}

impl SharedMemoryConnector {
    pub fn new(warehouse: Arc<WarehouseConnector>, table: &str) -> Result<Self, BackendError> {
        let valid = !table.is_empty()
            && table
                .split('.')
                .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        if !valid {
            return Err(BackendError::not_configured(format!(
                "hivemind: invalid table name '{table}'"
            )));
        }
        Ok(Self {
            warehouse,
            table: table.to_string(),
        })
    }

    async fn write(&self, args: &Arguments) -> Result<Value, BackendError> {
        let source = args::req_str(args, "source")?;
        let category = args::req_str(args, "category")?;
        let summary = args::req_str(args, "summary")?;
        args::check_len("summary", summary, MAX_SUMMARY_CHARS)?;
        let workstream = args::opt_str(args, "workstream")?
            .filter(|w| !w.is_empty())
            .unwrap_or("GENERAL");
        let priority = args::opt_str(args, "priority")?
            .filter(|p| !p.is_empty())
            .unwrap_or("MEDIUM");

        let sql = write_statement(&self.table);
        self.warehouse
            .execute(
                &sql,
                &[
                    json!(source),
                    json!(category),
                    json!(workstream),
                    json!(summary),
                    json!(priority),
                ],
                None,
            )
            .await?;

        Ok(json!({
            "success": true,
            "message": format!("Memory entry written from {source}"),
            "category": category,
            "workstream": workstream,
        }))
    }

    async fn read(&self, args: &Arguments) -> Result<Value, BackendError> {
        let limit = args::bounded_int(args, "limit", 10, 1, 50)?;
        let source = args::opt_str(args, "source")?.filter(|s| !s.is_empty());
        let category = args::opt_str(args, "category")?.filter(|c| !c.is_empty());

        let (sql, bindings) = read_statement(&self.table, source, category, limit);
        self.warehouse.execute(&sql, &bindings, None).await
    }
}

#[async_trait]
impl BackendConnector for SharedMemoryConnector {
    fn kind(&self) -> BackendKind {
        BackendKind::SharedMemory
    }

    async fn invoke(&self, operation: &str, args: &Arguments) -> Result<Value, BackendError> {
        match operation {
            "write" => self.write(args).await,
            "read" => self.read(args).await,
            other => Err(BackendError::unsupported(other)),
        }
    }
}

fn write_statement(table: &str) -> String {
    format!(
        "INSERT INTO {table} (SOURCE, CATEGORY, WORKSTREAM, SUMMARY, PRIORITY, STATUS) \
         VALUES (?, ?, ?, ?, ?, 'ACTIVE')"
    )
}

fn read_statement(
    table: &str,
    source: Option<&str>,
    category: Option<&str>,
    limit: i64,
) -> (String, Vec<Value>) {
    let mut filters = vec!["STATUS = 'ACTIVE'".to_string()];
    let mut bindings = Vec::new();
    if let Some(source) = source {
        filters.push("SOURCE = ?".into());
        bindings.push(json!(source));
    }
    if let Some(category) = category {
        filters.push("CATEGORY = ?".into());
        bindings.push(json!(category));
    }
    let sql = format!(
        "SELECT SOURCE, CATEGORY, WORKSTREAM, SUMMARY, PRIORITY, CREATED_AT FROM {table} \
         WHERE {} ORDER BY CREATED_AT DESC LIMIT {limit}",
        filters.join(" AND ")
    );
    (sql, bindings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_statement_binds_filters() {
        let (sql, bindings) =
            read_statement("SM.RAW.SHARED_MEMORY", Some("ABBI"), Some("DECISION"), 5);
        assert!(sql.contains("WHERE STATUS = 'ACTIVE' AND SOURCE = ? AND CATEGORY = ?"));
        assert!(sql.ends_with("LIMIT 5"));
        assert_eq!(bindings, vec![json!("ABBI"), json!("DECISION")]);
    }

    #[test]
    fn test_values_never_reach_the_statement_text() {
        let sql = write_statement("SM.RAW.SHARED_MEMORY");
        assert!(sql.contains("VALUES (?, ?, ?, ?, ?, 'ACTIVE')"));
        let (sql, _) = read_statement("T", Some("x' OR '1'='1"), None, 10);
        assert!(!sql.contains("OR '1'='1"));
    }
}
