use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use courier_core::inbound::{InboundEvent, UNKNOWN};
use courier_core::records::{MeetingInfo, MeetingScheduleResult, RecordKind, ResultRecord};
use tracing::info;

use crate::agents::{event_fields, Agent};
use crate::error::AgentError;
use crate::scheduler::{MeetingScheduler, ScheduleOutcome};

pub struct MeetingAgent {
    scheduler: Arc<dyn MeetingScheduler>,
}

impl MeetingAgent {
    pub fn new(scheduler: Arc<dyn MeetingScheduler>) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl Agent for MeetingAgent {
    fn name(&self) -> &'static str {
        "meeting"
    }

    fn kind(&self) -> RecordKind {
        RecordKind::MeetingSchedule
    }

    async fn build_record(&self, event: &InboundEvent) -> Result<ResultRecord, AgentError> {
        let fields = event_fields(event)?;
        let meeting = MeetingInfo::from_event(fields);

        // Incomplete requests never reach the calendar.
        let outcome = if meeting.start.is_none() || meeting.end.is_none() {
            ScheduleOutcome::failed("meeting start and end are required")
        } else {
            self.scheduler.schedule(&meeting).await
        };
        info!(
            event_name = "agent.meeting.scheduled",
            correlation_id = %fields.text_or("message_id", UNKNOWN),
            scheduled = outcome.error_message.is_none(),
            "scheduling attempt finished"
        );

        let record = MeetingScheduleResult::from_event(
            fields,
            meeting,
            outcome.event_link,
            outcome.error_message,
            Utc::now().timestamp_millis(),
        );
        Ok(record.into())
    }
}
