use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use courier_core::inbound::{InboundEvent, UNKNOWN};
use courier_core::records::{RecordKind, ResultRecord, SearchContextResult};
use tracing::{debug, warn};

use crate::agents::{event_fields, Agent};
use crate::error::AgentError;
use crate::retriever::{build_summary, KnowledgeRetriever};

pub struct SearchAgent {
    retriever: Arc<dyn KnowledgeRetriever>,
    limit: usize,
}

impl SearchAgent {
    pub fn new(retriever: Arc<dyn KnowledgeRetriever>, limit: usize) -> Self {
        Self { retriever, limit: limit.max(1) }
    }
}

#[async_trait]
impl Agent for SearchAgent {
    fn name(&self) -> &'static str {
        "search"
    }

    fn kind(&self) -> RecordKind {
        RecordKind::SearchContext
    }

    async fn build_record(&self, event: &InboundEvent) -> Result<ResultRecord, AgentError> {
        let fields = event_fields(event)?;
        let embedding = fields.float_vector("query_embedding").ok_or_else(|| {
            AgentError::InvalidEvent("query_embedding must be a non-empty list of numbers".to_string())
        })?;

        let correlation_id = fields.text_or("message_id", UNKNOWN);
        // Retrieval only enriches the record; an outage publishes a null summary.
        let summary = match self.retriever.nearest(&embedding, self.limit).await {
            Ok(documents) => {
                debug!(
                    event_name = "agent.search.retrieved",
                    correlation_id = %correlation_id,
                    documents = documents.len(),
                    "policy documents retrieved"
                );
                build_summary(&documents)
            }
            Err(error) => {
                warn!(
                    event_name = "agent.search.retrieval_failed",
                    correlation_id = %correlation_id,
                    error = %format!("{error:#}"),
                    "knowledge retrieval failed, publishing without a summary"
                );
                None
            }
        };
        Ok(SearchContextResult::from_event(fields, summary, Utc::now().timestamp_millis()).into())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::anyhow;
    use async_trait::async_trait;
    use courier_core::inbound::EventBatch;
    use courier_core::records::ResultRecord;
    use serde_json::json;

    use super::SearchAgent;
    use crate::agents::Agent;
    use crate::error::AgentError;
    use crate::retriever::{JsonKnowledgeBase, KnowledgeDocument, KnowledgeRetriever};

    struct Offline;

    #[async_trait]
    impl KnowledgeRetriever for Offline {
        async fn nearest(
            &self,
            _embedding: &[f32],
            _limit: usize,
        ) -> anyhow::Result<Vec<KnowledgeDocument>> {
            Err(anyhow!("connection refused"))
        }
    }

    fn knowledge_base() -> Arc<JsonKnowledgeBase> {
        Arc::new(JsonKnowledgeBase::new(vec![KnowledgeDocument {
            policy_id: "HR-PTO-001".to_string(),
            title: "Paid time off".to_string(),
            region: None,
            category: Some("Leave".to_string()),
            last_updated: None,
            content: "25 days per year.".to_string(),
            embedding: vec![1.0, 0.0],
        }]))
    }

    #[tokio::test]
    async fn builds_search_record_with_policy_summary() {
        let agent = SearchAgent::new(knowledge_base(), 1);
        let batch = EventBatch::from_values([json!({
            "query": "How much PTO?",
            "message_id": "m-7",
            "employee_id": "E001",
            "timestamp": 1700000000000_i64,
            "query_embedding": [0.9, 0.1],
        })]);

        let record = agent.build_record(&batch.0[0]).await.expect("record builds");

        let ResultRecord::SearchContext(record) = record else {
            panic!("search agent must build search records");
        };
        assert_eq!(record.message_id, "m-7");
        assert_eq!(record.user_email, "unknown");
        assert_eq!(record.timestamp, 1700000000000);
        let summary = record.search_result_summary.expect("summary present");
        assert!(summary.starts_with("Policy ID: HR-PTO-001\nTitle: Paid time off"));
    }

    #[tokio::test]
    async fn missing_embedding_is_rejected() {
        let agent = SearchAgent::new(knowledge_base(), 1);
        let batch = EventBatch::from_values([json!({ "query": "PTO?", "query_embedding": "oops" })]);

        let error = agent.build_record(&batch.0[0]).await.expect_err("embedding required");

        assert!(matches!(error, AgentError::InvalidEvent(_)));
    }

    #[tokio::test]
    async fn empty_knowledge_base_yields_null_summary() {
        let agent = SearchAgent::new(Arc::new(JsonKnowledgeBase::default()), 3);
        let batch = EventBatch::from_values([json!({ "query_embedding": [0.2, 0.4] })]);

        let record = agent.build_record(&batch.0[0]).await.expect("record builds");

        assert_eq!(record.project().get("search_result_summary"), Some(&serde_json::Value::Null));
    }

    #[tokio::test]
    async fn retriever_outage_publishes_without_summary() {
        let agent = SearchAgent::new(Arc::new(Offline), 1);
        let batch = EventBatch::from_values([json!({
            "query": "PTO?",
            "message_id": "m-8",
            "query_embedding": [0.2],
        })]);

        let record = agent.build_record(&batch.0[0]).await.expect("outage degrades");

        let ResultRecord::SearchContext(record) = record else {
            panic!("search agent must build search records");
        };
        assert_eq!(record.message_id, "m-8");
        assert_eq!(record.search_result_summary, None);
    }
}
