use std::sync::Arc;

use anyhow::Result;
use courier_bus::{PublishReceipt, PublisherContext};
use courier_core::config::AppConfig;
use courier_core::errors::{FailureClass, InterfaceError, RetryHint};
use courier_core::inbound::{EventBatch, InboundEvent, UNKNOWN};
use courier_db::EmployeeDirectory;
use serde::Serialize;
use tracing::{info, warn};

use crate::agents::{Agent, AgentRegistry};
use crate::error::AgentError;
use crate::llm::ChatResolver;
use crate::meeting::MeetingAgent;
use crate::retriever::JsonKnowledgeBase;
use crate::scheduler::WebhookScheduler;
use crate::search::SearchAgent;
use crate::sql::SqlAgent;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Published,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EventOutcome {
    pub message_id: String,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<PublishReceipt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_class: Option<FailureClass>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_hint: Option<RetryHint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InvocationBody {
    pub agent: String,
    pub published: usize,
    pub failed: usize,
    pub outcomes: Vec<EventOutcome>,
}

/// What the trigger sees: `200` when every event was published, `400` when every
/// failure was caused by the input, `500` otherwise.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InvocationResponse {
    pub status_code: u16,
    pub body: InvocationBody,
}

/// Routes event batches to agents and publishes what they produce through the
/// shared publisher context.
pub struct AgentRuntime {
    context: Arc<PublisherContext>,
    agents: AgentRegistry,
}

impl AgentRuntime {
    pub fn new(context: Arc<PublisherContext>, agents: AgentRegistry) -> Self {
        Self { context, agents }
    }

    /// Wires the three agents against their configured collaborators.
    pub async fn from_config(
        config: &AppConfig,
        context: Arc<PublisherContext>,
        directory: Arc<dyn EmployeeDirectory>,
    ) -> Result<Self> {
        let resolver = Arc::new(ChatResolver::from_config(&config.resolver)?);
        let knowledge = Arc::new(JsonKnowledgeBase::from_config(&config.retriever).await?);
        let scheduler = Arc::new(WebhookScheduler::from_config(&config.scheduler)?);

        let mut agents = AgentRegistry::default();
        agents.register(SearchAgent::new(knowledge, config.retriever.limit));
        agents.register(SqlAgent::new(resolver, directory));
        agents.register(MeetingAgent::new(scheduler));
        Ok(Self::new(context, agents))
    }

    pub fn agent_names(&self) -> Vec<&str> {
        self.agents.names()
    }

    pub fn context(&self) -> &Arc<PublisherContext> {
        &self.context
    }

    /// Processes the batch in order. Only an unknown agent fails the call itself;
    /// per-event failures are reported in the response body.
    pub async fn invoke(
        &self,
        agent_name: &str,
        batch: &EventBatch,
    ) -> Result<InvocationResponse, AgentError> {
        let agent =
            self.agents.get(agent_name).ok_or_else(|| AgentError::UnknownAgent(agent_name.to_string()))?;

        let mut outcomes = Vec::with_capacity(batch.len());
        for event in batch.iter() {
            outcomes.push(self.handle_event(agent.as_ref(), event).await);
        }

        let published =
            outcomes.iter().filter(|outcome| outcome.status == OutcomeStatus::Published).count();
        let failed = outcomes.len() - published;
        let status_code = if batch.is_empty() {
            400
        } else {
            status_for(&outcomes)
        };

        info!(
            event_name = "agent.invocation.completed",
            agent = agent.name(),
            events = batch.len(),
            published,
            failed,
            status_code,
            "agent invocation finished"
        );

        Ok(InvocationResponse {
            status_code,
            body: InvocationBody { agent: agent.name().to_string(), published, failed, outcomes },
        })
    }

    async fn handle_event(&self, agent: &dyn Agent, event: &InboundEvent) -> EventOutcome {
        let message_id = event
            .fields()
            .map(|fields| fields.text_or("message_id", UNKNOWN))
            .unwrap_or_else(|| UNKNOWN.to_string());

        let result = match agent.build_record(event).await {
            Ok(record) => self.context.publisher().publish(&record).await.map_err(AgentError::from),
            Err(error) => Err(error),
        };

        match result {
            Ok(receipt) => EventOutcome {
                message_id,
                status: OutcomeStatus::Published,
                receipt: Some(receipt),
                error_class: None,
                retry_hint: None,
                error: None,
            },
            Err(error) => {
                let class = error.class();
                if !matches!(error, AgentError::Publish(_)) {
                    warn!(
                        event_name = "agent.event.failed",
                        correlation_id = %message_id,
                        agent = agent.name(),
                        failure_class = class.as_str(),
                        error = %error,
                        "event not published"
                    );
                }
                EventOutcome {
                    message_id,
                    status: OutcomeStatus::Failed,
                    receipt: None,
                    error_class: Some(class),
                    retry_hint: Some(class.retry_hint()),
                    error: Some(error.to_string()),
                }
            }
        }
    }
}

fn status_for(outcomes: &[EventOutcome]) -> u16 {
    let failures: Vec<FailureClass> =
        outcomes.iter().filter_map(|outcome| outcome.error_class).collect();
    if failures.is_empty() {
        return 200;
    }
    let caller_errors = failures
        .iter()
        .all(|class| InterfaceError::from_class(*class, "", "").status_code() == 400);
    if caller_errors {
        400
    } else {
        500
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use courier_bus::{
        InMemoryChannel, InMemorySchemaRegistry, MemoryBehavior, MemoryChannelOptions,
        PublisherContext,
    };
    use courier_core::config::TopicConfig;
    use courier_core::errors::{FailureClass, RetryHint};
    use courier_core::inbound::EventBatch;
    use courier_core::records::RecordKind;
    use courier_db::InMemoryEmployeeDirectory;
    use serde_json::json;

    use super::{AgentRuntime, OutcomeStatus};
    use crate::agents::AgentRegistry;
    use crate::error::AgentError;
    use crate::llm::QueryResolver;
    use crate::meeting::MeetingAgent;
    use crate::retriever::{KnowledgeDocument, KnowledgeRetriever};
    use crate::scheduler::{MeetingScheduler, ScheduleOutcome};
    use crate::search::SearchAgent;
    use crate::sql::SqlAgent;

    struct Echo;

    #[async_trait]
    impl QueryResolver for Echo {
        async fn resolve(&self, query: &str, _context: Option<&str>) -> anyhow::Result<String> {
            Ok(format!("answer to {query}"))
        }
    }

    struct Unreachable;

    #[async_trait]
    impl MeetingScheduler for Unreachable {
        async fn schedule(
            &self,
            _meeting: &courier_core::records::MeetingInfo,
        ) -> ScheduleOutcome {
            ScheduleOutcome::failed("calendar offline")
        }
    }

    struct VectorStoreDown;

    #[async_trait]
    impl KnowledgeRetriever for VectorStoreDown {
        async fn nearest(
            &self,
            _embedding: &[f32],
            _limit: usize,
        ) -> anyhow::Result<Vec<KnowledgeDocument>> {
            Err(anyhow::anyhow!("vector store timed out"))
        }
    }

    fn runtime(topics: TopicConfig, behavior: MemoryBehavior) -> (AgentRuntime, Arc<InMemoryChannel>) {
        let channel = Arc::new(InMemoryChannel::new(MemoryChannelOptions {
            behavior,
            ..MemoryChannelOptions::default()
        }));
        let context = PublisherContext::from_parts(
            Arc::new(InMemorySchemaRegistry::new()),
            channel.clone(),
            topics,
            Duration::from_secs(2),
        );

        let mut agents = AgentRegistry::default();
        agents.register(SearchAgent::new(Arc::new(VectorStoreDown), 3));
        agents.register(SqlAgent::new(Arc::new(Echo), Arc::new(InMemoryEmployeeDirectory::default())));
        agents.register(MeetingAgent::new(Arc::new(Unreachable)));
        (AgentRuntime::new(Arc::new(context), agents), channel)
    }

    fn all_topics() -> TopicConfig {
        TopicConfig {
            search_result: Some("search-results".to_string()),
            sql_result: Some("sql-results".to_string()),
            meeting_result: Some("meeting-results".to_string()),
        }
    }

    #[tokio::test]
    async fn published_batch_returns_ok_with_receipts() {
        let (runtime, channel) = runtime(all_topics(), MemoryBehavior::Accept);
        let batch = EventBatch::from_values([
            json!({ "query": "PTO?", "message_id": "m-1" }),
            json!({ "query": "Manager?", "message_id": "m-2" }),
        ]);

        let response = runtime.invoke("sql", &batch).await.expect("known agent");

        assert_eq!(response.status_code, 200);
        assert_eq!(response.body.published, 2);
        let ids: Vec<&str> =
            response.body.outcomes.iter().map(|outcome| outcome.message_id.as_str()).collect();
        assert_eq!(ids, vec!["m-1", "m-2"]);
        assert_eq!(channel.messages("sql-results").len(), 2);

        let encoder =
            runtime.context().publisher().encoder_for(RecordKind::SqlQuery).await.expect("schema");
        let decoded = encoder.decode(&channel.messages("sql-results")[0].payload).expect("decodes");
        assert_eq!(decoded["sql_result"], json!("answer to PTO?"));
        assert_eq!(decoded["employee_id"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn sql_event_with_employee_id_keeps_it() {
        let (runtime, channel) = runtime(all_topics(), MemoryBehavior::Accept);
        let batch = EventBatch::from_values([
            json!({ "query": "PTO?", "message_id": "m-4", "employee_id": "E001" }),
        ]);

        let response = runtime.invoke("sql", &batch).await.expect("known agent");

        assert_eq!(response.status_code, 200);
        let encoder =
            runtime.context().publisher().encoder_for(RecordKind::SqlQuery).await.expect("schema");
        let decoded = encoder.decode(&channel.messages("sql-results")[0].payload).expect("decodes");
        assert_eq!(decoded["employee_id"], json!("E001"));
    }

    #[tokio::test]
    async fn search_publishes_null_summary_when_retrieval_fails() {
        let (runtime, channel) = runtime(all_topics(), MemoryBehavior::Accept);
        let batch = EventBatch::from_values([json!({
            "query": "PTO?",
            "message_id": "m-5",
            "employee_id": "E002",
            "query_embedding": [0.1, 0.2],
        })]);

        let response = runtime.invoke("search", &batch).await.expect("known agent");

        assert_eq!(response.status_code, 200);
        assert_eq!(channel.sends(), 1);
        let encoder = runtime
            .context()
            .publisher()
            .encoder_for(RecordKind::SearchContext)
            .await
            .expect("schema");
        let decoded =
            encoder.decode(&channel.messages("search-results")[0].payload).expect("decodes");
        assert_eq!(decoded["search_result_summary"], serde_json::Value::Null);
        assert_eq!(decoded["message_id"], json!("m-5"));
    }

    #[tokio::test]
    async fn malformed_events_yield_bad_request_without_sends() {
        let (runtime, channel) = runtime(all_topics(), MemoryBehavior::Accept);
        let batch = EventBatch::from_values([json!("not an object"), json!({ "title": "sync" })]);

        let response = runtime.invoke("meeting", &batch).await.expect("known agent");

        assert_eq!(response.status_code, 400);
        assert_eq!(response.body.failed, 2);
        assert_eq!(response.body.outcomes[0].error_class, Some(FailureClass::InvalidEvent));
        assert_eq!(response.body.outcomes[1].error_class, Some(FailureClass::Encoding));
        assert_eq!(response.body.outcomes[1].retry_hint, Some(RetryHint::Never));
        assert_eq!(channel.sends(), 0);
    }

    #[tokio::test]
    async fn delivery_failures_yield_server_error() {
        let (runtime, channel) =
            runtime(all_topics(), MemoryBehavior::RejectAll("broker down".to_string()));
        let batch = EventBatch::from_values([json!({ "query": "PTO?", "message_id": "m-3" })]);

        let response = runtime.invoke("sql", &batch).await.expect("known agent");

        assert_eq!(response.status_code, 500);
        let outcome = &response.body.outcomes[0];
        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert_eq!(outcome.error_class, Some(FailureClass::DeliveryFailed));
        assert_eq!(outcome.retry_hint, Some(RetryHint::AfterBackoff));
        assert_eq!(channel.sends(), 1);
    }

    #[tokio::test]
    async fn unconfigured_topic_is_a_configuration_failure() {
        let (runtime, channel) = runtime(TopicConfig::default(), MemoryBehavior::Accept);
        let batch = EventBatch::from_values([json!({ "query": "PTO?" })]);

        let response = runtime.invoke("sql", &batch).await.expect("known agent");

        assert_eq!(response.status_code, 500);
        assert_eq!(response.body.outcomes[0].error_class, Some(FailureClass::Configuration));
        assert_eq!(response.body.outcomes[0].message_id, "unknown");
        assert_eq!(channel.sends(), 0);
    }

    #[tokio::test]
    async fn empty_batch_and_unknown_agent_are_rejected() {
        let (runtime, _channel) = runtime(all_topics(), MemoryBehavior::Accept);

        let empty = runtime.invoke("sql", &EventBatch::default()).await.expect("known agent");
        assert_eq!(empty.status_code, 400);

        let error = runtime.invoke("calendar", &EventBatch::default()).await.expect_err("unknown");
        assert!(matches!(error, AgentError::UnknownAgent(ref name) if name == "calendar"));
    }
}
