use std::sync::Arc;

use courier_bus::{bundled_schema, subject_for, InMemorySchemaRegistry, SchemaResolver};
use courier_core::config::AppConfig;
use courier_core::records::RecordKind;
use serde::Serialize;

use crate::commands::{async_runtime, exit, load_config, CommandFailure, CommandResult};

#[derive(Debug, Serialize)]
struct SchemaEntry {
    record_kind: &'static str,
    topic: Option<String>,
    subject: Option<String>,
    schema_name: String,
    fields: usize,
    valid: bool,
    details: Option<String>,
}

/// Lists the bundled schemas and the subjects they register under, parsing each
/// one through an in-process registry. No network calls are made.
pub fn run() -> CommandResult {
    CommandResult::from_outcome("schemas", list())
}

fn list() -> Result<String, CommandFailure> {
    let config = load_config()?;
    let runtime = async_runtime()?;

    let resolver = SchemaResolver::new(Arc::new(InMemorySchemaRegistry::new()));
    let entries: Vec<SchemaEntry> = runtime.block_on(async {
        let mut entries = Vec::new();
        for kind in RecordKind::ALL {
            entries.push(inspect(&resolver, &config, kind).await);
        }
        entries
    });

    let invalid: Vec<&str> =
        entries.iter().filter(|entry| !entry.valid).map(|entry| entry.record_kind).collect();
    if !invalid.is_empty() {
        return Err(CommandFailure::new(
            "schema_invalid",
            format!("bundled schemas failed to parse: {}", invalid.join(", ")),
            exit::SCHEMA,
        ));
    }

    serde_json::to_string(&entries)
        .map_err(|error| CommandFailure::new("serialization", error.to_string(), 1))
}

async fn inspect(resolver: &SchemaResolver, config: &AppConfig, kind: RecordKind) -> SchemaEntry {
    let text = bundled_schema(kind);
    let document: serde_json::Value = serde_json::from_str(text).unwrap_or_default();
    let schema_name = document["name"].as_str().unwrap_or("<unnamed>").to_string();
    let fields = document["fields"].as_array().map(Vec::len).unwrap_or(0);

    let topic = config.topics.for_kind(kind).map(str::to_string);
    let probe_subject = subject_for(topic.as_deref().unwrap_or(kind.as_str()));
    let (valid, details) = match resolver.resolve(&probe_subject, text).await {
        Ok(_) => (true, None),
        Err(error) => (false, Some(error.to_string())),
    };

    SchemaEntry {
        record_kind: kind.as_str(),
        subject: topic.as_deref().map(subject_for),
        topic,
        schema_name,
        fields,
        valid,
        details,
    }
}
