use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use courier_core::directory::EmployeeId;
use courier_core::inbound::{EventFields, InboundEvent, UNKNOWN};
use courier_core::records::{RecordKind, ResultRecord, SqlQueryResult};
use courier_db::EmployeeDirectory;
use tracing::{debug, warn};

use crate::agents::{event_fields, Agent};
use crate::error::AgentError;
use crate::llm::QueryResolver;

/// Answers HR questions through the resolver, grounded on directory context when
/// the employee can be identified.
pub struct SqlAgent {
    resolver: Arc<dyn QueryResolver>,
    directory: Arc<dyn EmployeeDirectory>,
}

impl SqlAgent {
    pub fn new(resolver: Arc<dyn QueryResolver>, directory: Arc<dyn EmployeeDirectory>) -> Self {
        Self { resolver, directory }
    }

    /// Directory context for the event's employee. Lookup failures degrade to `None`.
    async fn employee_context(&self, fields: EventFields<'_>, message_id: &str) -> Option<String> {
        let id = fields
            .text("employee_id")
            .and_then(|text| EmployeeId::find_in(&text))
            .or_else(|| fields.text("query").and_then(|query| EmployeeId::find_in(&query)))?;

        match self.directory.employee_context(&id).await {
            Ok(Some(context)) => Some(context.describe()),
            Ok(None) => {
                debug!(
                    event_name = "agent.sql.context_missing",
                    correlation_id = %message_id,
                    employee_id = %id.0,
                    "employee not in directory"
                );
                None
            }
            Err(error) => {
                warn!(
                    event_name = "agent.sql.context_failed",
                    correlation_id = %message_id,
                    employee_id = %id.0,
                    error = %error,
                    "directory lookup failed, continuing without context"
                );
                None
            }
        }
    }
}

#[async_trait]
impl Agent for SqlAgent {
    fn name(&self) -> &'static str {
        "sql"
    }

    fn kind(&self) -> RecordKind {
        RecordKind::SqlQuery
    }

    async fn build_record(&self, event: &InboundEvent) -> Result<ResultRecord, AgentError> {
        let fields = event_fields(event)?;
        let received_at = Utc::now();
        let message_id = fields.text_or("message_id", UNKNOWN);

        let answer = match fields.text("query") {
            Some(query) => {
                let context = self.employee_context(fields, &message_id).await;
                match self.resolver.resolve(&query, context.as_deref()).await {
                    Ok(answer) => Some(answer),
                    Err(error) => {
                        warn!(
                            event_name = "agent.sql.resolver_failed",
                            correlation_id = %message_id,
                            error = %format!("{error:#}"),
                            "resolver failed, publishing error status"
                        );
                        None
                    }
                }
            }
            None => None,
        };

        let mut record = SqlQueryResult::from_event(fields, answer, received_at);
        if record.employee_id.is_none() {
            record.employee_id = record
                .sql_result
                .as_deref()
                .and_then(|answer| parse_context_lines(answer).remove("employee_id"))
                .and_then(|value| EmployeeId::find_in(&value))
                .map(|id| id.0);
        }
        Ok(record.into())
    }
}

/// Best-effort `Key: value` extraction from free text. Keys are lowercased with
/// spaces folded to underscores; lines without a colon or with an empty side are
/// skipped, and the first occurrence of a key wins.
pub fn parse_context_lines(text: &str) -> BTreeMap<String, String> {
    let mut mapping = BTreeMap::new();
    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().trim_start_matches(['-', '*']).trim();
        let value = value.trim();
        if key.is_empty() || value.is_empty() {
            continue;
        }
        let key = key.to_lowercase().split_whitespace().collect::<Vec<_>>().join("_");
        mapping.entry(key).or_insert_with(|| value.to_string());
    }
    mapping
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use anyhow::anyhow;
    use async_trait::async_trait;
    use courier_core::directory::{EmployeeId, EmployeeProfile};
    use courier_core::inbound::EventBatch;
    use courier_core::records::{ResultRecord, SqlQueryResult, SqlStatus};
    use courier_db::{EmployeeDirectory, InMemoryEmployeeDirectory};
    use serde_json::{json, Value};

    use super::{parse_context_lines, SqlAgent};
    use crate::agents::Agent;
    use crate::llm::QueryResolver;

    #[derive(Default)]
    struct ScriptedResolver {
        answer: Option<String>,
        seen_context: Mutex<Option<String>>,
    }

    #[async_trait]
    impl QueryResolver for ScriptedResolver {
        async fn resolve(&self, _query: &str, context: Option<&str>) -> anyhow::Result<String> {
            if let Ok(mut seen) = self.seen_context.lock() {
                *seen = context.map(str::to_string);
            }
            self.answer.clone().ok_or_else(|| anyhow!("resolver offline"))
        }
    }

    async fn directory() -> Arc<InMemoryEmployeeDirectory> {
        let directory = InMemoryEmployeeDirectory::default();
        directory
            .save_employee(EmployeeProfile {
                employee_id: EmployeeId("E001".to_string()),
                first_name: "Ada".to_string(),
                last_name: "Park".to_string(),
                job_title: Some("Staff Engineer".to_string()),
                department: Some("Engineering".to_string()),
                email: Some("ada@example.test".to_string()),
                hire_date: None,
                manager_id: None,
                manager_name: None,
                country: Some("DE".to_string()),
                region: Some("EMEA".to_string()),
                employee_type: None,
            })
            .await
            .expect("seed employee");
        Arc::new(directory)
    }

    async fn run(resolver: Arc<ScriptedResolver>, value: Value) -> SqlQueryResult {
        let agent = SqlAgent::new(resolver, directory().await);
        let batch = EventBatch::from_values([value]);
        match agent.build_record(&batch.0[0]).await.expect("record builds") {
            ResultRecord::SqlQuery(record) => record,
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[tokio::test]
    async fn answer_is_published_with_success_status_and_directory_context() {
        let resolver = Arc::new(ScriptedResolver {
            answer: Some("Ada works in Engineering.".to_string()),
            ..ScriptedResolver::default()
        });

        let record = run(
            Arc::clone(&resolver),
            json!({
                "query": "Which department is emp001 in?",
                "message_id": "m-1",
                "timestamp": 1700000000000_i64,
            }),
        )
        .await;

        assert_eq!(record.status, SqlStatus::Success);
        assert_eq!(record.sql_result.as_deref(), Some("Ada works in Engineering."));
        assert_eq!(record.timestamp, "1700000000000");
        assert_eq!(record.source, "unknown");
        let context = resolver.seen_context.lock().expect("lock").clone().expect("context sent");
        assert!(context.contains("Ada Park"));
    }

    #[tokio::test]
    async fn resolver_failure_publishes_error_status() {
        let record = run(
            Arc::new(ScriptedResolver::default()),
            json!({ "query": "PTO balance?", "employee_id": "E001", "source": "portal" }),
        )
        .await;

        assert_eq!(record.status, SqlStatus::Error);
        assert_eq!(record.sql_result, None);
        assert_eq!(record.source, "portal");
        assert!(record.timestamp.ends_with('Z'));
    }

    #[tokio::test]
    async fn unknown_employee_still_reaches_resolver_without_context() {
        let resolver =
            Arc::new(ScriptedResolver { answer: Some("No record.".to_string()), ..Default::default() });

        let record = run(Arc::clone(&resolver), json!({ "query": "Who manages E404?" })).await;

        assert_eq!(record.status, SqlStatus::Success);
        assert_eq!(*resolver.seen_context.lock().expect("lock"), None);
    }

    #[tokio::test]
    async fn employee_id_falls_back_to_answer_context() {
        let resolver = Arc::new(ScriptedResolver {
            answer: Some("Employee ID: E001\nDepartment: Engineering".to_string()),
            ..ScriptedResolver::default()
        });

        let record = run(resolver, json!({ "query": "who leads engineering?" })).await;

        assert_eq!(record.employee_id.as_deref(), Some("E001"));
    }

    #[test]
    fn context_lines_are_parsed_leniently() {
        let parsed = parse_context_lines(
            "Employee ID: E002\n- Manager Name: Ada Park\nno colon here\nEmpty:\nEmployee ID: E999",
        );

        assert_eq!(parsed.get("employee_id").map(String::as_str), Some("E002"));
        assert_eq!(parsed.get("manager_name").map(String::as_str), Some("Ada Park"));
        assert_eq!(parsed.len(), 2);
    }
}
