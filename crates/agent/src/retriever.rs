//! Policy document retrieval for the search agent.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use courier_core::config::RetrieverConfig;
use serde::{Deserialize, Serialize};
use tracing::info;

const DOCUMENT_SEPARATOR: &str = "\n-----\n";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    pub policy_id: String,
    pub title: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub last_updated: Option<String>,
    pub content: String,
    pub embedding: Vec<f32>,
}

impl KnowledgeDocument {
    fn summary(&self) -> String {
        format!(
            "Policy ID: {}\nTitle: {}\nRegion: {}\nCategory: {}\nLast Updated: {}\n\n{}",
            self.policy_id,
            self.title,
            self.region.as_deref().unwrap_or("N/A"),
            self.category.as_deref().unwrap_or("N/A"),
            self.last_updated.as_deref().unwrap_or("N/A"),
            self.content
        )
    }
}

#[async_trait]
pub trait KnowledgeRetriever: Send + Sync {
    /// Up to `limit` documents, most similar first.
    async fn nearest(&self, embedding: &[f32], limit: usize) -> Result<Vec<KnowledgeDocument>>;
}

/// Per-document summaries joined by a separator line; `None` when nothing matched.
pub fn build_summary(documents: &[KnowledgeDocument]) -> Option<String> {
    if documents.is_empty() {
        return None;
    }
    let summaries: Vec<String> = documents.iter().map(KnowledgeDocument::summary).collect();
    Some(summaries.join(DOCUMENT_SEPARATOR))
}

/// In-process knowledge base ranked by cosine similarity.
#[derive(Clone, Debug, Default)]
pub struct JsonKnowledgeBase {
    documents: Vec<KnowledgeDocument>,
}

impl JsonKnowledgeBase {
    pub fn new(documents: Vec<KnowledgeDocument>) -> Self {
        Self { documents }
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read knowledge base `{}`", path.display()))?;
        let documents: Vec<KnowledgeDocument> = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse knowledge base `{}`", path.display()))?;
        info!(
            event_name = "agent.retriever.loaded",
            correlation_id = "bootstrap",
            path = %path.display(),
            documents = documents.len(),
            "knowledge base loaded"
        );
        Ok(Self { documents })
    }

    /// An unset path yields an empty knowledge base.
    pub async fn from_config(config: &RetrieverConfig) -> Result<Self> {
        match &config.knowledge_path {
            Some(path) => Self::load(path).await,
            None => Ok(Self::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl KnowledgeRetriever for JsonKnowledgeBase {
    async fn nearest(&self, embedding: &[f32], limit: usize) -> Result<Vec<KnowledgeDocument>> {
        let mut scored: Vec<(f32, &KnowledgeDocument)> = self
            .documents
            .iter()
            .filter_map(|document| {
                cosine_similarity(embedding, &document.embedding).map(|score| (score, document))
            })
            .collect();
        scored.sort_by(|left, right| right.0.total_cmp(&left.0));

        Ok(scored.into_iter().take(limit).map(|(_, document)| document.clone()).collect())
    }
}

/// `None` when the dimensions differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a > 0.0 && mag_b > 0.0 {
        Some(dot / (mag_a * mag_b))
    } else {
        Some(0.0)
    }
}
