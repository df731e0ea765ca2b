use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::records::RecordKind;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub registry: RegistryConfig,
    pub bus: BusConfig,
    pub topics: TopicConfig,
    pub database: DatabaseConfig,
    pub resolver: ResolverConfig,
    pub retriever: RetrieverConfig,
    pub scheduler: SchedulerConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct RegistryConfig {
    pub mode: RegistryMode,
    pub url: String,
    pub api_key: SecretString,
    pub api_secret: SecretString,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct BusConfig {
    pub transport: BusTransport,
    pub bootstrap_servers: String,
    pub api_key: SecretString,
    pub api_secret: SecretString,
    pub queue_capacity: usize,
    pub flush_timeout_ms: u64,
    pub message_timeout_ms: u64,
    pub memory_partitions: u32,
}

/// Topic names per producer. Every producer resolves its topic here; an unset
/// topic is reported when that producer publishes, not at load time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TopicConfig {
    pub search_result: Option<String>,
    pub sql_result: Option<String>,
    pub meeting_result: Option<String>,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ResolverConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct RetrieverConfig {
    pub knowledge_path: Option<PathBuf>,
    pub limit: usize,
}

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryMode {
    Http,
    Memory,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusTransport {
    Kafka,
    Memory,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub registry_mode: Option<RegistryMode>,
    pub registry_url: Option<String>,
    pub registry_api_key: Option<String>,
    pub registry_api_secret: Option<String>,
    pub bus_transport: Option<BusTransport>,
    pub bus_bootstrap_servers: Option<String>,
    pub bus_api_key: Option<String>,
    pub bus_api_secret: Option<String>,
    pub bus_flush_timeout_ms: Option<u64>,
    pub search_result_topic: Option<String>,
    pub sql_result_topic: Option<String>,
    pub meeting_result_topic: Option<String>,
    pub database_url: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            registry: RegistryConfig {
                mode: RegistryMode::Http,
                url: String::new(),
                api_key: String::new().into(),
                api_secret: String::new().into(),
                timeout_secs: 10,
            },
            bus: BusConfig {
                transport: BusTransport::Kafka,
                bootstrap_servers: String::new(),
                api_key: String::new().into(),
                api_secret: String::new().into(),
                queue_capacity: 10_000,
                flush_timeout_ms: 10_000,
                message_timeout_ms: 30_000,
                memory_partitions: 6,
            },
            topics: TopicConfig::default(),
            database: DatabaseConfig {
                url: "sqlite://courier.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            resolver: ResolverConfig {
                base_url: "http://localhost:11434".to_string(),
                model: "llama3.1".to_string(),
                api_key: None,
                timeout_secs: 60,
            },
            retriever: RetrieverConfig { knowledge_path: None, limit: 1 },
            scheduler: SchedulerConfig { webhook_url: None, timeout_secs: 15 },
            server: ServerConfig { bind_address: "127.0.0.1".to_string(), port: 8080 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for RegistryMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError::Validation(format!(
                "unsupported registry mode `{other}` (expected http|memory)"
            ))),
        }
    }
}

impl std::str::FromStr for BusTransport {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "kafka" => Ok(Self::Kafka),
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError::Validation(format!(
                "unsupported bus transport `{other}` (expected kafka|memory)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl TopicConfig {
    pub fn for_kind(&self, kind: RecordKind) -> Option<&str> {
        let topic = match kind {
            RecordKind::SearchContext => self.search_result.as_deref(),
            RecordKind::SqlQuery => self.sql_result.as_deref(),
            RecordKind::MeetingSchedule => self.meeting_result.as_deref(),
        };
        topic.map(str::trim).filter(|topic| !topic.is_empty())
    }

    /// Another record kind configured with the same topic as `kind`. Schemas are
    /// registered per topic subject, so two kinds cannot share one.
    pub fn shared_with(&self, kind: RecordKind) -> Option<RecordKind> {
        let topic = self.for_kind(kind)?;
        RecordKind::ALL
            .into_iter()
            .find(|other| *other != kind && self.for_kind(*other) == Some(topic))
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("courier.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(registry) = patch.registry {
            if let Some(mode) = registry.mode {
                self.registry.mode = mode;
            }
            if let Some(url) = registry.url {
                self.registry.url = url;
            }
            if let Some(api_key) = registry.api_key {
                self.registry.api_key = secret_value(api_key);
            }
            if let Some(api_secret) = registry.api_secret {
                self.registry.api_secret = secret_value(api_secret);
            }
            if let Some(timeout_secs) = registry.timeout_secs {
                self.registry.timeout_secs = timeout_secs;
            }
        }

        if let Some(bus) = patch.bus {
            if let Some(transport) = bus.transport {
                self.bus.transport = transport;
            }
            if let Some(bootstrap_servers) = bus.bootstrap_servers {
                self.bus.bootstrap_servers = bootstrap_servers;
            }
            if let Some(api_key) = bus.api_key {
                self.bus.api_key = secret_value(api_key);
            }
            if let Some(api_secret) = bus.api_secret {
                self.bus.api_secret = secret_value(api_secret);
            }
            if let Some(queue_capacity) = bus.queue_capacity {
                self.bus.queue_capacity = queue_capacity;
            }
            if let Some(flush_timeout_ms) = bus.flush_timeout_ms {
                self.bus.flush_timeout_ms = flush_timeout_ms;
            }
            if let Some(message_timeout_ms) = bus.message_timeout_ms {
                self.bus.message_timeout_ms = message_timeout_ms;
            }
            if let Some(memory_partitions) = bus.memory_partitions {
                self.bus.memory_partitions = memory_partitions;
            }
        }

        if let Some(topics) = patch.topics {
            if let Some(search_result) = topics.search_result {
                self.topics.search_result = Some(search_result);
            }
            if let Some(sql_result) = topics.sql_result {
                self.topics.sql_result = Some(sql_result);
            }
            if let Some(meeting_result) = topics.meeting_result {
                self.topics.meeting_result = Some(meeting_result);
            }
        }

        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(resolver) = patch.resolver {
            if let Some(base_url) = resolver.base_url {
                self.resolver.base_url = base_url;
            }
            if let Some(model) = resolver.model {
                self.resolver.model = model;
            }
            if let Some(api_key) = resolver.api_key {
                self.resolver.api_key = Some(secret_value(api_key));
            }
            if let Some(timeout_secs) = resolver.timeout_secs {
                self.resolver.timeout_secs = timeout_secs;
            }
        }

        if let Some(retriever) = patch.retriever {
            if let Some(knowledge_path) = retriever.knowledge_path {
                self.retriever.knowledge_path = Some(knowledge_path);
            }
            if let Some(limit) = retriever.limit {
                self.retriever.limit = limit;
            }
        }

        if let Some(scheduler) = patch.scheduler {
            if let Some(webhook_url) = scheduler.webhook_url {
                self.scheduler.webhook_url = Some(webhook_url);
            }
            if let Some(timeout_secs) = scheduler.timeout_secs {
                self.scheduler.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("COURIER_REGISTRY_MODE") {
            self.registry.mode = value.parse()?;
        }
        // SCHEMA_REGISTRY_* are the names the deployed agents already export.
        if let Some(value) =
            read_env("COURIER_REGISTRY_URL").or_else(|| read_env("SCHEMA_REGISTRY_ENDPOINT"))
        {
            self.registry.url = value;
        }
        if let Some(value) =
            read_env("COURIER_REGISTRY_API_KEY").or_else(|| read_env("SCHEMA_REGISTRY_API_KEY"))
        {
            self.registry.api_key = secret_value(value);
        }
        if let Some(value) = read_env("COURIER_REGISTRY_API_SECRET")
            .or_else(|| read_env("SCHEMA_REGISTRY_API_SECRET"))
        {
            self.registry.api_secret = secret_value(value);
        }
        if let Some(value) = read_env("COURIER_REGISTRY_TIMEOUT_SECS") {
            self.registry.timeout_secs = parse_u64("COURIER_REGISTRY_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("COURIER_BUS_TRANSPORT") {
            self.bus.transport = value.parse()?;
        }
        if let Some(value) =
            read_env("COURIER_BUS_BOOTSTRAP_SERVERS").or_else(|| read_env("BOOTSTRAP_ENDPOINT"))
        {
            self.bus.bootstrap_servers = value;
        }
        if let Some(value) = read_env("COURIER_BUS_API_KEY").or_else(|| read_env("KAFKA_API_KEY"))
        {
            self.bus.api_key = secret_value(value);
        }
        if let Some(value) =
            read_env("COURIER_BUS_API_SECRET").or_else(|| read_env("KAFKA_API_SECRET"))
        {
            self.bus.api_secret = secret_value(value);
        }
        if let Some(value) = read_env("COURIER_BUS_QUEUE_CAPACITY") {
            self.bus.queue_capacity = parse_usize("COURIER_BUS_QUEUE_CAPACITY", &value)?;
        }
        if let Some(value) = read_env("COURIER_BUS_FLUSH_TIMEOUT_MS") {
            self.bus.flush_timeout_ms = parse_u64("COURIER_BUS_FLUSH_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = read_env("COURIER_BUS_MESSAGE_TIMEOUT_MS") {
            self.bus.message_timeout_ms = parse_u64("COURIER_BUS_MESSAGE_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = read_env("COURIER_BUS_MEMORY_PARTITIONS") {
            self.bus.memory_partitions = parse_u32("COURIER_BUS_MEMORY_PARTITIONS", &value)?;
        }

        if let Some(value) = read_env("COURIER_TOPICS_SEARCH_RESULT")
            .or_else(|| read_env("search_agent_result_topic"))
        {
            self.topics.search_result = Some(value);
        }
        if let Some(value) = read_env("COURIER_TOPICS_SQL_RESULT") {
            self.topics.sql_result = Some(value);
        }
        if let Some(value) = read_env("COURIER_TOPICS_MEETING_RESULT") {
            self.topics.meeting_result = Some(value);
        }

        if let Some(value) = read_env("COURIER_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("COURIER_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("COURIER_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("COURIER_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("COURIER_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("COURIER_RESOLVER_BASE_URL") {
            self.resolver.base_url = value;
        }
        if let Some(value) = read_env("COURIER_RESOLVER_MODEL") {
            self.resolver.model = value;
        }
        if let Some(value) = read_env("COURIER_RESOLVER_API_KEY") {
            self.resolver.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("COURIER_RESOLVER_TIMEOUT_SECS") {
            self.resolver.timeout_secs = parse_u64("COURIER_RESOLVER_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("COURIER_RETRIEVER_KNOWLEDGE_PATH") {
            self.retriever.knowledge_path = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("COURIER_RETRIEVER_LIMIT") {
            self.retriever.limit = parse_usize("COURIER_RETRIEVER_LIMIT", &value)?;
        }

        if let Some(value) = read_env("COURIER_SCHEDULER_WEBHOOK_URL") {
            self.scheduler.webhook_url = Some(value);
        }
        if let Some(value) = read_env("COURIER_SCHEDULER_TIMEOUT_SECS") {
            self.scheduler.timeout_secs = parse_u64("COURIER_SCHEDULER_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("COURIER_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("COURIER_SERVER_PORT") {
            self.server.port = parse_u16("COURIER_SERVER_PORT", &value)?;
        }

        let log_level =
            read_env("COURIER_LOGGING_LEVEL").or_else(|| read_env("COURIER_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("COURIER_LOGGING_FORMAT").or_else(|| read_env("COURIER_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(mode) = overrides.registry_mode {
            self.registry.mode = mode;
        }
        if let Some(url) = overrides.registry_url {
            self.registry.url = url;
        }
        if let Some(api_key) = overrides.registry_api_key {
            self.registry.api_key = secret_value(api_key);
        }
        if let Some(api_secret) = overrides.registry_api_secret {
            self.registry.api_secret = secret_value(api_secret);
        }

        if let Some(transport) = overrides.bus_transport {
            self.bus.transport = transport;
        }
        if let Some(bootstrap_servers) = overrides.bus_bootstrap_servers {
            self.bus.bootstrap_servers = bootstrap_servers;
        }
        if let Some(api_key) = overrides.bus_api_key {
            self.bus.api_key = secret_value(api_key);
        }
        if let Some(api_secret) = overrides.bus_api_secret {
            self.bus.api_secret = secret_value(api_secret);
        }
        if let Some(flush_timeout_ms) = overrides.bus_flush_timeout_ms {
            self.bus.flush_timeout_ms = flush_timeout_ms;
        }

        if let Some(topic) = overrides.search_result_topic {
            self.topics.search_result = Some(topic);
        }
        if let Some(topic) = overrides.sql_result_topic {
            self.topics.sql_result = Some(topic);
        }
        if let Some(topic) = overrides.meeting_result_topic {
            self.topics.meeting_result = Some(topic);
        }

        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_registry(&self.registry)?;
        validate_bus(&self.bus)?;
        validate_topics(&self.topics)?;
        validate_database(&self.database)?;
        validate_resolver(&self.resolver)?;
        validate_scheduler(&self.scheduler)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("courier.toml"), PathBuf::from("config/courier.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_registry(registry: &RegistryConfig) -> Result<(), ConfigError> {
    if registry.timeout_secs == 0 || registry.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "registry.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if registry.mode == RegistryMode::Memory {
        return Ok(());
    }

    let url = registry.url.trim();
    if url.is_empty() {
        return Err(ConfigError::Validation(
            "registry.url is required when registry.mode is `http`".to_string(),
        ));
    }
    if !url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "registry.url must start with https:// (credentials are sent with every request)"
                .to_string(),
        ));
    }
    if registry.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "registry.api_key is required when registry.mode is `http`".to_string(),
        ));
    }
    if registry.api_secret.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "registry.api_secret is required when registry.mode is `http`".to_string(),
        ));
    }

    Ok(())
}

fn validate_bus(bus: &BusConfig) -> Result<(), ConfigError> {
    if bus.queue_capacity == 0 {
        return Err(ConfigError::Validation(
            "bus.queue_capacity must be greater than zero".to_string(),
        ));
    }
    if bus.flush_timeout_ms == 0 || bus.flush_timeout_ms > 300_000 {
        return Err(ConfigError::Validation(
            "bus.flush_timeout_ms must be in range 1..=300000".to_string(),
        ));
    }
    if bus.message_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "bus.message_timeout_ms must be greater than zero".to_string(),
        ));
    }

    match bus.transport {
        BusTransport::Memory => {
            if bus.memory_partitions == 0 {
                return Err(ConfigError::Validation(
                    "bus.memory_partitions must be greater than zero".to_string(),
                ));
            }
        }
        BusTransport::Kafka => {
            if bus.bootstrap_servers.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "bus.bootstrap_servers is required when bus.transport is `kafka`".to_string(),
                ));
            }
            if bus.api_key.expose_secret().trim().is_empty()
                || bus.api_secret.expose_secret().trim().is_empty()
            {
                return Err(ConfigError::Validation(
                    "bus.api_key and bus.api_secret are required for SASL_SSL/PLAIN".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_topics(topics: &TopicConfig) -> Result<(), ConfigError> {
    for kind in RecordKind::ALL {
        if let Some(other) = topics.shared_with(kind) {
            return Err(ConfigError::Validation(format!(
                "topics for {} and {} results must differ, both are `{}`",
                kind.as_str(),
                other.as_str(),
                topics.for_kind(kind).unwrap_or_default(),
            )));
        }
    }
    Ok(())
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_resolver(resolver: &ResolverConfig) -> Result<(), ConfigError> {
    if resolver.timeout_secs == 0 || resolver.timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "resolver.timeout_secs must be in range 1..=600".to_string(),
        ));
    }
    let base_url = resolver.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "resolver.base_url must start with http:// or https://".to_string(),
        ));
    }
    if resolver.model.trim().is_empty() {
        return Err(ConfigError::Validation("resolver.model must not be empty".to_string()));
    }
    Ok(())
}

fn validate_scheduler(scheduler: &SchedulerConfig) -> Result<(), ConfigError> {
    if let Some(url) = &scheduler.webhook_url {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "scheduler.webhook_url must start with http:// or https://".to_string(),
            ));
        }
    }
    if scheduler.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "scheduler.timeout_secs must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    registry: Option<RegistryPatch>,
    bus: Option<BusPatch>,
    topics: Option<TopicsPatch>,
    database: Option<DatabasePatch>,
    resolver: Option<ResolverPatch>,
    retriever: Option<RetrieverPatch>,
    scheduler: Option<SchedulerPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct RegistryPatch {
    mode: Option<RegistryMode>,
    url: Option<String>,
    api_key: Option<String>,
    api_secret: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct BusPatch {
    transport: Option<BusTransport>,
    bootstrap_servers: Option<String>,
    api_key: Option<String>,
    api_secret: Option<String>,
    queue_capacity: Option<usize>,
    flush_timeout_ms: Option<u64>,
    message_timeout_ms: Option<u64>,
    memory_partitions: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct TopicsPatch {
    search_result: Option<String>,
    sql_result: Option<String>,
    meeting_result: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ResolverPatch {
    base_url: Option<String>,
    model: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RetrieverPatch {
    knowledge_path: Option<PathBuf>,
    limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct SchedulerPatch {
    webhook_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{
        AppConfig, BusTransport, ConfigError, ConfigOverrides, LoadOptions, LogFormat,
        RegistryMode, TopicConfig,
    };
    use crate::records::RecordKind;

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const REGISTRY_VARS: &[&str] = &[
        "COURIER_REGISTRY_URL",
        "COURIER_REGISTRY_API_KEY",
        "COURIER_REGISTRY_API_SECRET",
        "COURIER_BUS_BOOTSTRAP_SERVERS",
        "COURIER_BUS_API_KEY",
        "COURIER_BUS_API_SECRET",
    ];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn set_valid_credentials() {
        env::set_var("COURIER_REGISTRY_URL", "https://registry.example.test");
        env::set_var("COURIER_REGISTRY_API_KEY", "sr-key");
        env::set_var("COURIER_REGISTRY_API_SECRET", "sr-secret-value");
        env::set_var("COURIER_BUS_BOOTSTRAP_SERVERS", "broker-1.example.test:9092");
        env::set_var("COURIER_BUS_API_KEY", "bus-key");
        env::set_var("COURIER_BUS_API_SECRET", "bus-secret-value");
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_REGISTRY_KEY", "key-from-env");
        env::set_var("TEST_REGISTRY_SECRET", "secret-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("courier.toml");
            fs::write(
                &path,
                r#"
[registry]
url = "https://registry.example.test"
api_key = "${TEST_REGISTRY_KEY}"
api_secret = "${TEST_REGISTRY_SECRET}"

[bus]
transport = "memory"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.registry.api_key.expose_secret() == "key-from-env",
                "registry key should be loaded from environment",
            )?;
            ensure(
                config.registry.api_secret.expose_secret() == "secret-from-env",
                "registry secret should be loaded from environment",
            )?;
            ensure(config.bus.transport == BusTransport::Memory, "bus transport from file")?;
            Ok(())
        })();

        clear_vars(&["TEST_REGISTRY_KEY", "TEST_REGISTRY_SECRET"]);
        result
    }

    #[test]
    fn legacy_agent_env_names_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SCHEMA_REGISTRY_ENDPOINT", "https://legacy-registry.example.test");
        env::set_var("SCHEMA_REGISTRY_API_KEY", "legacy-key");
        env::set_var("SCHEMA_REGISTRY_API_SECRET", "legacy-secret");
        env::set_var("BOOTSTRAP_ENDPOINT", "legacy-broker:9092");
        env::set_var("KAFKA_API_KEY", "legacy-bus-key");
        env::set_var("KAFKA_API_SECRET", "legacy-bus-secret");
        env::set_var("search_agent_result_topic", "search_results");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.registry.url == "https://legacy-registry.example.test",
                "registry url should come from SCHEMA_REGISTRY_ENDPOINT",
            )?;
            ensure(
                config.bus.bootstrap_servers == "legacy-broker:9092",
                "bootstrap servers should come from BOOTSTRAP_ENDPOINT",
            )?;
            ensure(
                config.topics.for_kind(RecordKind::SearchContext) == Some("search_results"),
                "search topic should come from search_agent_result_topic",
            )?;
            Ok(())
        })();

        clear_vars(&[
            "SCHEMA_REGISTRY_ENDPOINT",
            "SCHEMA_REGISTRY_API_KEY",
            "SCHEMA_REGISTRY_API_SECRET",
            "BOOTSTRAP_ENDPOINT",
            "KAFKA_API_KEY",
            "KAFKA_API_SECRET",
            "search_agent_result_topic",
        ]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_valid_credentials();
        env::set_var("COURIER_TOPICS_SQL_RESULT", "sql_result_from_env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("courier.toml");
            fs::write(
                &path,
                r#"
[topics]
sql_result = "sql_result_from_file"
meeting_result = "meeting_from_file"

[database]
url = "sqlite://from-file.db"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.topics.for_kind(RecordKind::SqlQuery) == Some("sql_result_from_env"),
                "env topic should win over file",
            )?;
            ensure(
                config.topics.for_kind(RecordKind::MeetingSchedule) == Some("meeting_from_file"),
                "file topic should win over default",
            )?;
            ensure(
                config.topics.for_kind(RecordKind::SearchContext).is_none(),
                "unset topic should stay unresolved",
            )?;
            Ok(())
        })();

        clear_vars(REGISTRY_VARS);
        clear_vars(&["COURIER_TOPICS_SQL_RESULT"]);
        result
    }

    #[test]
    fn http_registry_requires_https_url() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_valid_credentials();
        env::set_var("COURIER_REGISTRY_URL", "http://registry.example.test");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("registry.url")
            );
            ensure(has_message, "validation failure should mention registry.url")
        })();

        clear_vars(REGISTRY_VARS);
        result
    }

    #[test]
    fn kafka_transport_requires_sasl_credentials() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_valid_credentials();
        env::remove_var("COURIER_BUS_API_SECRET");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("bus.api_secret")
            );
            ensure(has_message, "validation failure should mention bus.api_secret")
        })();

        clear_vars(REGISTRY_VARS);
        result
    }

    #[test]
    fn producers_cannot_share_a_topic() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("COURIER_TOPICS_SEARCH_RESULT", "results");
        env::set_var("COURIER_TOPICS_SQL_RESULT", " results ");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions {
                overrides: ConfigOverrides {
                    registry_mode: Some(RegistryMode::Memory),
                    bus_transport: Some(BusTransport::Memory),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            }) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message)
                    if message.contains("search_context") && message.contains("`results`")
            );
            ensure(has_message, "validation failure should name the shared topic")
        })();

        clear_vars(&["COURIER_TOPICS_SEARCH_RESULT", "COURIER_TOPICS_SQL_RESULT"]);
        result
    }

    #[test]
    fn distinct_topics_are_not_shared() {
        let topics = TopicConfig {
            search_result: Some("search-results".to_string()),
            sql_result: Some("sql-results".to_string()),
            meeting_result: None,
        };

        for kind in RecordKind::ALL {
            assert_eq!(topics.shared_with(kind), None);
        }
    }

    #[test]
    fn memory_modes_need_no_credentials() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                registry_mode: Some(RegistryMode::Memory),
                bus_transport: Some(BusTransport::Memory),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.registry.mode == RegistryMode::Memory, "registry mode override")?;
        ensure(config.bus.transport == BusTransport::Memory, "bus transport override")
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_valid_credentials();

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("sr-secret-value"),
                "debug output should not contain registry secret",
            )?;
            ensure(
                !debug.contains("bus-secret-value"),
                "debug output should not contain bus secret",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(REGISTRY_VARS);
        result
    }
}
