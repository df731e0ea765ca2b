pub mod config;
pub mod doctor;
pub mod migrate;
pub mod schemas;
pub mod seed;

use courier_core::config::{AppConfig, LoadOptions};
use serde::Serialize;
use tokio::runtime::Runtime;

/// Exit codes shared by the structured commands.
pub mod exit {
    pub const CONFIG: u8 = 2;
    pub const RUNTIME: u8 = 3;
    pub const DATABASE: u8 = 4;
    pub const SCHEMA: u8 = 5;
    pub const SEED: u8 = 6;
}

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

/// A failed step: machine-readable class, operator message, process exit code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFailure {
    pub class: &'static str,
    pub message: String,
    pub exit_code: u8,
}

impl CommandFailure {
    pub fn new(class: &'static str, message: impl Into<String>, exit_code: u8) -> Self {
        Self { class, message: message.into(), exit_code }
    }
}

#[derive(Debug, Serialize)]
struct CommandOutcome<'a> {
    command: &'a str,
    status: &'static str,
    error_class: Option<&'a str>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload =
            CommandOutcome { command, status: "ok", error_class: None, message: message.into() };
        Self { exit_code: 0, output: serialize_payload(&payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command,
            status: "error",
            error_class: Some(error_class),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(&payload) }
    }

    pub fn from_outcome(command: &str, outcome: Result<String, CommandFailure>) -> Self {
        match outcome {
            Ok(message) => Self::success(command, message),
            Err(failure) => {
                Self::failure(command, failure.class, failure.message, failure.exit_code)
            }
        }
    }
}

pub(crate) fn load_config() -> Result<AppConfig, CommandFailure> {
    AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandFailure::new(
            "config_validation",
            format!("configuration issue: {error}"),
            exit::CONFIG,
        )
    })
}

pub(crate) fn async_runtime() -> Result<Runtime, CommandFailure> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandFailure::new(
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            exit::RUNTIME,
        )
    })
}

fn serialize_payload(payload: &CommandOutcome<'_>) -> String {
    serde_json::to_string(payload).unwrap_or_else(|error| {
        serde_json::json!({
            "command": "unknown",
            "status": "error",
            "error_class": "serialization",
            "message": error.to_string(),
        })
        .to_string()
    })
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::{exit, CommandFailure, CommandResult};

    fn parse(result: &CommandResult) -> Value {
        serde_json::from_str(&result.output).expect("command output is JSON")
    }

    #[test]
    fn success_payload_has_no_error_class() {
        let result = CommandResult::from_outcome("migrate", Ok("done".to_string()));

        assert_eq!(result.exit_code, 0);
        let payload = parse(&result);
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["error_class"], Value::Null);
        assert_eq!(payload["message"], "done");
    }

    #[test]
    fn failure_carries_class_and_exit_code() {
        let failure = CommandFailure::new("seed_file", "missing \"seed\" file", exit::CONFIG);
        let result = CommandResult::from_outcome("seed", Err(failure));

        assert_eq!(result.exit_code, 2);
        let payload = parse(&result);
        assert_eq!(payload["error_class"], "seed_file");
        assert_eq!(payload["message"], "missing \"seed\" file");
    }
}
