use std::time::Duration;

use async_trait::async_trait;
use courier_core::config::SchedulerConfig;
use courier_core::records::MeetingInfo;
use serde::Deserialize;
use tracing::warn;

/// What a scheduling attempt produced. Exactly one side is usually set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScheduleOutcome {
    pub event_link: Option<String>,
    pub error_message: Option<String>,
}

impl ScheduleOutcome {
    pub fn scheduled(event_link: Option<String>) -> Self {
        Self { event_link, error_message: None }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { event_link: None, error_message: Some(message.into()) }
    }
}

/// Calendar mechanics are external; failures come back inside the outcome.
#[async_trait]
pub trait MeetingScheduler: Send + Sync {
    async fn schedule(&self, meeting: &MeetingInfo) -> ScheduleOutcome;
}

pub struct WebhookScheduler {
    client: reqwest::Client,
    webhook_url: Option<String>,
}

#[derive(Deserialize)]
struct WebhookResponse {
    #[serde(default)]
    event_link: Option<String>,
}

impl WebhookScheduler {
    pub fn from_config(config: &SchedulerConfig) -> Result<Self, reqwest::Error> {
        let client =
            reqwest::Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;
        Ok(Self { client, webhook_url: config.webhook_url.clone() })
    }
}

#[async_trait]
impl MeetingScheduler for WebhookScheduler {
    async fn schedule(&self, meeting: &MeetingInfo) -> ScheduleOutcome {
        let Some(url) = &self.webhook_url else {
            return ScheduleOutcome::failed("meeting scheduler is not configured");
        };

        let response = match self.client.post(url).json(meeting).send().await {
            Ok(response) => response,
            Err(error) => {
                warn!(event_name = "agent.scheduler.unreachable", error = %error, "scheduler call failed");
                return ScheduleOutcome::failed(format!("scheduler unreachable: {error}"));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return ScheduleOutcome::failed(format!("scheduler returned {status}: {body}"));
        }

        match response.json::<WebhookResponse>().await {
            Ok(body) => ScheduleOutcome::scheduled(body.event_link),
            Err(error) => ScheduleOutcome::failed(format!("unreadable scheduler response: {error}")),
        }
    }
}
