use std::time::Duration;

use courier_bus::{HttpSchemaRegistry, PublisherContext, SchemaRegistry};
use courier_core::config::{AppConfig, RegistryMode};
use courier_db::connect_with_settings;
use serde::Serialize;
use tokio::runtime::Runtime;

use crate::commands::{async_runtime, load_config};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn from_result(name: &'static str, result: Result<String, String>) -> Self {
        match result {
            Ok(details) => Self { name, status: CheckStatus::Pass, details },
            Err(details) => Self { name, status: CheckStatus::Fail, details },
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

type Probe = fn(&Runtime, &AppConfig) -> Result<String, String>;

/// Checks that need a loaded config, in report order.
const DEPENDENT_CHECKS: [(&str, Probe); 3] = [
    ("schema_registry", probe_schema_registry),
    ("delivery_channel", probe_delivery_channel),
    ("database_connectivity", probe_database),
];

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            serde_json::json!({
                "overall_status": "fail",
                "summary": "doctor serialization failed",
                "error": error.to_string(),
            })
            .to_string()
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match load_config() {
        Ok(config) => {
            checks.push(DoctorCheck::from_result(
                "config_validation",
                Ok("configuration loaded and validated".to_string()),
            ));
            match async_runtime() {
                Ok(runtime) => checks.extend(DEPENDENT_CHECKS.iter().map(|&(name, probe)| {
                    DoctorCheck::from_result(name, probe(&runtime, &config))
                })),
                Err(failure) => checks.extend(skipped(&format!("skipped: {}", failure.message))),
            }
        }
        Err(failure) => {
            checks.push(DoctorCheck::from_result("config_validation", Err(failure.message)));
            checks.extend(skipped("skipped because configuration did not load"));
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: registry, bus and database are ready".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn skipped(reason: &str) -> Vec<DoctorCheck> {
    DEPENDENT_CHECKS
        .iter()
        .map(|&(name, _)| DoctorCheck {
            name,
            status: CheckStatus::Skipped,
            details: reason.to_string(),
        })
        .collect()
}

fn probe_schema_registry(runtime: &Runtime, config: &AppConfig) -> Result<String, String> {
    if config.registry.mode == RegistryMode::Memory {
        return Ok("in-process registry (registry.mode = memory)".to_string());
    }

    let registry =
        HttpSchemaRegistry::from_config(&config.registry).map_err(|error| error.to_string())?;
    runtime.block_on(registry.ping()).map_err(|error| error.to_string())?;
    Ok(format!("registry reachable at `{}`", config.registry.url))
}

fn probe_delivery_channel(runtime: &Runtime, config: &AppConfig) -> Result<String, String> {
    runtime.block_on(async {
        let context = PublisherContext::connect(config).map_err(|error| error.to_string())?;
        let name = context.channel().name();
        let outstanding = context.shutdown(Duration::from_secs(1)).await;
        if outstanding > 0 {
            return Err(format!("`{name}` channel left {outstanding} message(s) unflushed"));
        }
        Ok(format!("`{name}` channel created"))
    })
}

fn probe_database(runtime: &Runtime, config: &AppConfig) -> Result<String, String> {
    runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;

        let probe = pool.acquire().await.map(drop);
        pool.close().await;
        probe
            .map(|()| format!("connected using `{}`", config.database.url))
            .map_err(|error| format!("database unavailable: {error}"))
    })
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
