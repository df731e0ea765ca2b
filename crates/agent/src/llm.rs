//! Black-box natural-language query resolution.

use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use courier_core::config::ResolverConfig;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

const SYSTEM_PROMPT: &str = "You answer HR questions about employees and company policy. \
Use the employee context when it is provided. Answer in plain text and say so when the \
information is not available.";

#[async_trait]
pub trait QueryResolver: Send + Sync {
    /// Returns unstructured answer text for `query`, optionally grounded on `context`.
    async fn resolve(&self, query: &str, context: Option<&str>) -> Result<String>;
}

/// Resolver backed by an Ollama-compatible `/api/chat` endpoint.
pub struct ChatResolver {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

impl ChatResolver {
    pub fn from_config(config: &ResolverConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build resolver http client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl QueryResolver for ChatResolver {
    async fn resolve(&self, query: &str, context: Option<&str>) -> Result<String> {
        let start = Instant::now();
        let content = match context {
            Some(context) => format!("Employee context:\n{context}\n\nQuestion: {query}"),
            None => format!("Question: {query}"),
        };
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system".to_string(), content: SYSTEM_PROMPT.to_string() },
                ChatMessage { role: "user".to_string(), content },
            ],
            stream: false,
        };

        let mut builder = self.client.post(format!("{}/api/chat", self.base_url)).json(&request);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key.expose_secret());
        }
        let response = builder.send().await.context("resolver request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("resolver returned {status}: {body}"));
        }

        let result: ChatResponse =
            response.json().await.context("failed to parse resolver response")?;
        debug!(
            event_name = "agent.resolver.completed",
            model = %self.model,
            response_len = result.message.content.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "resolver answered"
        );
        Ok(result.message.content)
    }
}
