//! Schema registry clients and the per-subject schema cache.
//!
//! Schemas are bundled with the crate and registered against a Confluent
//! compatible registry under the `{topic}-value` subject. The registry assigns
//! the id written into every framed datum; compatibility is enforced remotely.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use apache_avro::Schema;
use async_trait::async_trait;
use courier_core::config::RegistryConfig;
use courier_core::records::RecordKind;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::error::RegistryError;

pub const SEARCH_AGENT_RESPONSE_SCHEMA: &str =
    include_str!("../schemas/search_agent_response.avsc");
pub const SQL_RESULT_SCHEMA: &str = include_str!("../schemas/sql_result.avsc");
pub const MEETING_RESULT_SCHEMA: &str = include_str!("../schemas/meeting_result.avsc");

const SCHEMA_REGISTRY_CONTENT_TYPE: &str = "application/vnd.schemaregistry.v1+json";

pub fn bundled_schema(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::SearchContext => SEARCH_AGENT_RESPONSE_SCHEMA,
        RecordKind::SqlQuery => SQL_RESULT_SCHEMA,
        RecordKind::MeetingSchedule => MEETING_RESULT_SCHEMA,
    }
}

pub fn subject_for(topic: &str) -> String {
    format!("{topic}-value")
}

/// A parsed schema together with the id the registry assigned to it.
#[derive(Clone, Debug)]
pub struct CompiledSchema {
    pub id: u32,
    pub subject: String,
    pub schema: Schema,
}

#[async_trait]
pub trait SchemaRegistry: Send + Sync {
    /// Registers `schema_text` under `subject`, returning the registry's id.
    /// Registering an identical schema again yields the existing id.
    async fn register(&self, subject: &str, schema_text: &str) -> Result<u32, RegistryError>;

    async fn ping(&self) -> Result<(), RegistryError> {
        Ok(())
    }

    fn name(&self) -> &'static str;
}

pub struct HttpSchemaRegistry {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    api_secret: SecretString,
}

#[derive(Deserialize)]
struct RegisterResponse {
    id: u32,
}

impl HttpSchemaRegistry {
    pub fn new(
        base_url: impl Into<String>,
        api_key: SecretString,
        api_secret: SecretString,
        timeout: Duration,
    ) -> Result<Self, RegistryError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = reqwest::Client::builder().timeout(timeout).build().map_err(|error| {
            RegistryError::Unavailable { subject: String::new(), reason: error.to_string() }
        })?;

        Ok(Self { client, base_url, api_key, api_secret })
    }

    pub fn from_config(config: &RegistryConfig) -> Result<Self, RegistryError> {
        Self::new(
            config.url.clone(),
            config.api_key.clone(),
            config.api_secret.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.basic_auth(self.api_key.expose_secret(), Some(self.api_secret.expose_secret()))
    }
}

#[async_trait]
impl SchemaRegistry for HttpSchemaRegistry {
    async fn register(&self, subject: &str, schema_text: &str) -> Result<u32, RegistryError> {
        let url = format!("{}/subjects/{subject}/versions", self.base_url);
        let unavailable = |reason: String| RegistryError::Unavailable {
            subject: subject.to_string(),
            reason,
        };

        let response = self
            .authorized(self.client.post(&url))
            .header(reqwest::header::CONTENT_TYPE, SCHEMA_REGISTRY_CONTENT_TYPE)
            .json(&json!({ "schema": schema_text }))
            .send()
            .await
            .map_err(|error| unavailable(error.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let body: RegisterResponse = response
                .json()
                .await
                .map_err(|error| unavailable(format!("malformed registry response: {error}")))?;
            return Ok(body.id);
        }

        let detail = response.text().await.unwrap_or_default();
        match status {
            StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                Err(RegistryError::Incompatible {
                    subject: subject.to_string(),
                    reason: format!("{status}: {detail}"),
                })
            }
            _ => Err(unavailable(format!("{status}: {detail}"))),
        }
    }

    async fn ping(&self) -> Result<(), RegistryError> {
        let url = format!("{}/subjects", self.base_url);
        let response = self.authorized(self.client.get(&url)).send().await.map_err(|error| {
            RegistryError::Unavailable { subject: String::new(), reason: error.to_string() }
        })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(RegistryError::Unavailable {
                subject: String::new(),
                reason: format!("registry answered {}", response.status()),
            })
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Process-local registry for development and tests. Assigns ids in
/// registration order and performs no compatibility checking.
#[derive(Default)]
pub struct InMemorySchemaRegistry {
    subjects: Mutex<HashMap<String, Vec<(u32, String)>>>,
    next_id: AtomicU32,
    registrations: AtomicUsize,
}

impl InMemorySchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of register calls received, including repeats.
    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SchemaRegistry for InMemorySchemaRegistry {
    async fn register(&self, subject: &str, schema_text: &str) -> Result<u32, RegistryError> {
        self.registrations.fetch_add(1, Ordering::Relaxed);
        let mut subjects = self.subjects.lock().unwrap_or_else(PoisonError::into_inner);
        let versions = subjects.entry(subject.to_string()).or_default();

        if let Some((id, _)) = versions.iter().find(|(_, text)| text == schema_text) {
            return Ok(*id);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        versions.push((id, schema_text.to_string()));
        Ok(id)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Resolves each subject at most once per process and hands out the cached
/// compiled schema afterwards. Failed resolutions are not cached.
pub struct SchemaResolver {
    registry: Arc<dyn SchemaRegistry>,
    cache: tokio::sync::Mutex<HashMap<String, Arc<CompiledSchema>>>,
}

impl SchemaResolver {
    pub fn new(registry: Arc<dyn SchemaRegistry>) -> Self {
        Self { registry, cache: tokio::sync::Mutex::new(HashMap::new()) }
    }

    pub fn registry(&self) -> &Arc<dyn SchemaRegistry> {
        &self.registry
    }

    pub async fn resolve(
        &self,
        subject: &str,
        schema_text: &str,
    ) -> Result<Arc<CompiledSchema>, RegistryError> {
        let mut cache = self.cache.lock().await;
        if let Some(compiled) = cache.get(subject) {
            return Ok(Arc::clone(compiled));
        }

        let schema = Schema::parse_str(schema_text).map_err(|error| {
            RegistryError::InvalidSchema { subject: subject.to_string(), reason: error.to_string() }
        })?;

        debug!(
            event_name = "bus.registry.register",
            registry = self.registry.name(),
            subject,
            "registering schema"
        );
        let id = self.registry.register(subject, schema_text).await?;
        info!(
            event_name = "bus.registry.resolved",
            registry = self.registry.name(),
            subject,
            schema_id = id,
            "schema resolved"
        );

        let compiled = Arc::new(CompiledSchema { id, subject: subject.to_string(), schema });
        cache.insert(subject.to_string(), Arc::clone(&compiled));
        Ok(compiled)
    }

    pub async fn resolve_for_topic(
        &self,
        kind: RecordKind,
        topic: &str,
    ) -> Result<Arc<CompiledSchema>, RegistryError> {
        self.resolve(&subject_for(topic), bundled_schema(kind)).await
    }

    pub async fn cached_subjects(&self) -> Vec<String> {
        let mut subjects: Vec<String> = self.cache.lock().await.keys().cloned().collect();
        subjects.sort();
        subjects
    }
}
