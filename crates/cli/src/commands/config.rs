use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use courier_core::config::{AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

struct Row {
    key_path: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for row in rows(&config) {
        let source = field_source(
            row.key_path,
            row.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(row.key_path, &row.value, source));
    }
    lines.join("\n")
}

fn rows(config: &AppConfig) -> Vec<Row> {
    vec![
        row("registry.mode", &["COURIER_REGISTRY_MODE"], format!("{:?}", config.registry.mode)),
        row(
            "registry.url",
            &["COURIER_REGISTRY_URL", "SCHEMA_REGISTRY_ENDPOINT"],
            or_unset(&config.registry.url),
        ),
        row(
            "registry.api_key",
            &["COURIER_REGISTRY_API_KEY", "SCHEMA_REGISTRY_API_KEY"],
            redact_credential(&config.registry.api_key),
        ),
        row(
            "registry.api_secret",
            &["COURIER_REGISTRY_API_SECRET", "SCHEMA_REGISTRY_API_SECRET"],
            redact_secret(&config.registry.api_secret),
        ),
        row("bus.transport", &["COURIER_BUS_TRANSPORT"], format!("{:?}", config.bus.transport)),
        row(
            "bus.bootstrap_servers",
            &["COURIER_BUS_BOOTSTRAP_SERVERS", "BOOTSTRAP_ENDPOINT"],
            or_unset(&config.bus.bootstrap_servers),
        ),
        row(
            "bus.api_key",
            &["COURIER_BUS_API_KEY", "KAFKA_API_KEY"],
            redact_credential(&config.bus.api_key),
        ),
        row(
            "bus.api_secret",
            &["COURIER_BUS_API_SECRET", "KAFKA_API_SECRET"],
            redact_secret(&config.bus.api_secret),
        ),
        row(
            "bus.flush_timeout_ms",
            &["COURIER_BUS_FLUSH_TIMEOUT_MS"],
            config.bus.flush_timeout_ms.to_string(),
        ),
        row(
            "topics.search_result",
            &["COURIER_TOPICS_SEARCH_RESULT", "search_agent_result_topic"],
            optional(&config.topics.search_result),
        ),
        row("topics.sql_result", &["COURIER_TOPICS_SQL_RESULT"], optional(&config.topics.sql_result)),
        row(
            "topics.meeting_result",
            &["COURIER_TOPICS_MEETING_RESULT"],
            optional(&config.topics.meeting_result),
        ),
        row("database.url", &["COURIER_DATABASE_URL"], config.database.url.clone()),
        row("resolver.base_url", &["COURIER_RESOLVER_BASE_URL"], config.resolver.base_url.clone()),
        row("resolver.model", &["COURIER_RESOLVER_MODEL"], config.resolver.model.clone()),
        row(
            "resolver.api_key",
            &["COURIER_RESOLVER_API_KEY"],
            config.resolver.api_key.as_ref().map(redact_secret).unwrap_or_else(|| "<unset>".into()),
        ),
        row(
            "retriever.knowledge_path",
            &["COURIER_RETRIEVER_KNOWLEDGE_PATH"],
            config
                .retriever
                .knowledge_path
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "<unset>".to_string()),
        ),
        row(
            "scheduler.webhook_url",
            &["COURIER_SCHEDULER_WEBHOOK_URL"],
            optional(&config.scheduler.webhook_url),
        ),
        row(
            "server.bind_address",
            &["COURIER_SERVER_BIND_ADDRESS"],
            config.server.bind_address.clone(),
        ),
        row("server.port", &["COURIER_SERVER_PORT"], config.server.port.to_string()),
        row(
            "logging.level",
            &["COURIER_LOGGING_LEVEL", "COURIER_LOG_LEVEL"],
            config.logging.level.clone(),
        ),
        row(
            "logging.format",
            &["COURIER_LOGGING_FORMAT", "COURIER_LOG_FORMAT"],
            format!("{:?}", config.logging.format),
        ),
    ]
}

fn row(key_path: &'static str, env_keys: &'static [&'static str], value: String) -> Row {
    Row { key_path, env_keys, value }
}

fn optional(value: &Option<String>) -> String {
    value.clone().unwrap_or_else(|| "<unset>".to_string())
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("courier.toml"), PathBuf::from("config/courier.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn or_unset(value: &str) -> String {
    if value.trim().is_empty() {
        "<unset>".to_string()
    } else {
        value.to_string()
    }
}

/// API keys keep a short prefix so operators can tell credentials apart.
fn redact_credential(secret: &SecretString) -> String {
    let trimmed = secret.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }
    let prefix: String = trimmed.chars().take(4).collect();
    if trimmed.chars().count() > 8 {
        format!("{prefix}***")
    } else {
        "<redacted>".to_string()
    }
}

fn redact_secret(secret: &SecretString) -> String {
    if secret.expose_secret().trim().is_empty() {
        "<empty>".to_string()
    } else {
        "<redacted>".to_string()
    }
}
