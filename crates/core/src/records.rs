//! Result records published by the agents.
//!
//! A record is built once per inbound event, projected to a structured value
//! keyed by schema field names, and dropped. Fields that may be absent upstream
//! stay `Option` so the schema, not the constructor, decides whether absence is
//! acceptable.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::inbound::{EventFields, UNKNOWN};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    SearchContext,
    SqlQuery,
    MeetingSchedule,
}

impl RecordKind {
    pub const ALL: [RecordKind; 3] =
        [RecordKind::SearchContext, RecordKind::SqlQuery, RecordKind::MeetingSchedule];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SearchContext => "search_context",
            Self::SqlQuery => "sql_query",
            Self::MeetingSchedule => "meeting_schedule",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchContextResult {
    pub message_id: String,
    pub employee_id: Option<String>,
    pub timestamp: i64,
    pub query: Option<String>,
    pub user_email: String,
    pub message: Option<String>,
    pub session_id: Option<String>,
    pub search_result_summary: Option<String>,
}

impl SearchContextResult {
    /// Prefers the event's own epoch-millis timestamp and falls back to `now_millis`.
    pub fn from_event(
        fields: EventFields<'_>,
        search_result_summary: Option<String>,
        now_millis: i64,
    ) -> Self {
        Self {
            message_id: fields.text_or("message_id", UNKNOWN),
            employee_id: fields.text("employee_id"),
            timestamp: fields.epoch_millis("timestamp").unwrap_or(now_millis),
            query: fields.text("query"),
            user_email: fields.text_or("user_email", UNKNOWN),
            message: fields.text("message"),
            session_id: fields.text("session_id"),
            search_result_summary: search_result_summary.filter(|summary| !summary.is_empty()),
        }
    }

    pub fn project(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("message_id".into(), Value::from(self.message_id.clone()));
        fields.insert("employee_id".into(), optional(&self.employee_id));
        fields.insert("timestamp".into(), Value::from(self.timestamp));
        fields.insert("query".into(), optional(&self.query));
        fields.insert("user_email".into(), Value::from(self.user_email.clone()));
        fields.insert("message".into(), optional(&self.message));
        fields.insert("session_id".into(), optional(&self.session_id));
        fields.insert("search_result_summary".into(), optional(&self.search_result_summary));
        fields
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlStatus {
    Success,
    Error,
}

impl SqlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlQueryResult {
    pub message_id: String,
    pub employee_id: Option<String>,
    pub timestamp: String,
    pub query: Option<String>,
    pub status: SqlStatus,
    pub sql_result: Option<String>,
    pub source: String,
    pub session_id: Option<String>,
}

impl SqlQueryResult {
    /// `answer` is the resolver's text; `None` or blank marks the query as failed.
    pub fn from_event(
        fields: EventFields<'_>,
        answer: Option<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        let answer = answer.filter(|text| !text.trim().is_empty());
        let status = if answer.is_some() { SqlStatus::Success } else { SqlStatus::Error };

        Self {
            message_id: fields.text_or("message_id", UNKNOWN),
            employee_id: fields.text("employee_id"),
            timestamp: fields
                .text("timestamp")
                .unwrap_or_else(|| received_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
            query: fields.text("query"),
            status,
            sql_result: answer,
            source: fields.text_or("source", UNKNOWN),
            session_id: fields.text("session_id"),
        }
    }

    pub fn project(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("message_id".into(), Value::from(self.message_id.clone()));
        fields.insert("employee_id".into(), optional(&self.employee_id));
        fields.insert("timestamp".into(), Value::from(self.timestamp.clone()));
        fields.insert("query".into(), optional(&self.query));
        fields.insert("status".into(), Value::from(self.status.as_str()));
        fields.insert("sql_result".into(), optional(&self.sql_result));
        fields.insert("source".into(), Value::from(self.source.clone()));
        fields.insert("session_id".into(), optional(&self.session_id));
        fields
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingInfo {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub attendees: Vec<String>,
}

impl MeetingInfo {
    pub fn from_event(fields: EventFields<'_>) -> Self {
        Self {
            title: fields.text("title"),
            description: fields.text("description"),
            location: fields.text("location"),
            start: fields.text("start"),
            end: fields.text("end"),
            attendees: fields.string_list("attendees"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingScheduleResult {
    pub meeting: MeetingInfo,
    pub event_link: Option<String>,
    pub success: bool,
    pub error_message: Option<String>,
    pub message_id: String,
    pub user_email: Option<String>,
    pub session_id: Option<String>,
    pub employee_id: Option<String>,
    pub message: Option<String>,
    pub timestamp: i64,
}

impl MeetingScheduleResult {
    /// `success` is derived from the absence of an error message.
    pub fn from_event(
        fields: EventFields<'_>,
        meeting: MeetingInfo,
        event_link: Option<String>,
        error_message: Option<String>,
        now_millis: i64,
    ) -> Self {
        Self {
            meeting,
            event_link,
            success: error_message.is_none(),
            error_message,
            message_id: fields.text_or("message_id", UNKNOWN),
            user_email: fields.text("user_email"),
            session_id: fields.text("session_id"),
            employee_id: fields.text("employee_id"),
            message: fields.text("message"),
            timestamp: fields.epoch_millis("timestamp").unwrap_or(now_millis),
        }
    }

    pub fn project(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("title".into(), optional(&self.meeting.title));
        fields.insert("description".into(), optional(&self.meeting.description));
        fields.insert("location".into(), optional(&self.meeting.location));
        fields.insert("start".into(), optional(&self.meeting.start));
        fields.insert("end".into(), optional(&self.meeting.end));
        fields.insert(
            "attendees".into(),
            Value::Array(self.meeting.attendees.iter().cloned().map(Value::from).collect()),
        );
        fields.insert("event_link".into(), optional(&self.event_link));
        fields.insert("success".into(), Value::Bool(self.success));
        fields.insert("error_message".into(), optional(&self.error_message));
        fields.insert("message_id".into(), Value::from(self.message_id.clone()));
        fields.insert("user_email".into(), optional(&self.user_email));
        fields.insert("session_id".into(), optional(&self.session_id));
        fields.insert("employee_id".into(), optional(&self.employee_id));
        fields.insert("message".into(), optional(&self.message));
        fields.insert("timestamp".into(), Value::from(self.timestamp));
        fields
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultRecord {
    SearchContext(SearchContextResult),
    SqlQuery(SqlQueryResult),
    MeetingSchedule(MeetingScheduleResult),
}

impl ResultRecord {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::SearchContext(_) => RecordKind::SearchContext,
            Self::SqlQuery(_) => RecordKind::SqlQuery,
            Self::MeetingSchedule(_) => RecordKind::MeetingSchedule,
        }
    }

    /// Correlation key for tracing; never used as the bus key.
    pub fn message_id(&self) -> &str {
        match self {
            Self::SearchContext(record) => &record.message_id,
            Self::SqlQuery(record) => &record.message_id,
            Self::MeetingSchedule(record) => &record.message_id,
        }
    }

    pub fn project(&self) -> Map<String, Value> {
        match self {
            Self::SearchContext(record) => record.project(),
            Self::SqlQuery(record) => record.project(),
            Self::MeetingSchedule(record) => record.project(),
        }
    }
}

impl From<SearchContextResult> for ResultRecord {
    fn from(record: SearchContextResult) -> Self {
        Self::SearchContext(record)
    }
}

impl From<SqlQueryResult> for ResultRecord {
    fn from(record: SqlQueryResult) -> Self {
        Self::SqlQuery(record)
    }
}

impl From<MeetingScheduleResult> for ResultRecord {
    fn from(record: MeetingScheduleResult) -> Self {
        Self::MeetingSchedule(record)
    }
}

fn optional(value: &Option<String>) -> Value {
    value.clone().map(Value::from).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};

    use super::{
        MeetingInfo, MeetingScheduleResult, RecordKind, ResultRecord, SearchContextResult,
        SqlQueryResult, SqlStatus,
    };
    use crate::inbound::EventBatch;

    #[test]
    fn search_result_defaults_identity_fields_and_keeps_summary_null() {
        let batch = EventBatch::from_values([json!({
            "message_id": "m1",
            "employee_id": "E001",
            "query": "dept?",
            "timestamp": 1700000000000_i64,
        })]);
        let fields = batch.0[0].fields().expect("object payload");

        let record = SearchContextResult::from_event(fields, None, 42);
        let projected = record.project();

        assert_eq!(record.timestamp, 1700000000000);
        assert_eq!(record.user_email, "unknown");
        assert_eq!(projected["search_result_summary"], Value::Null);
        assert_eq!(projected["message"], Value::Null);
    }

    #[test]
    fn search_result_treats_empty_summary_as_absent() {
        let batch = EventBatch::from_values([json!({})]);
        let fields = batch.0[0].fields().expect("object payload");

        let record = SearchContextResult::from_event(fields, Some(String::new()), 42);

        assert_eq!(record.search_result_summary, None);
        assert_eq!(record.message_id, "unknown");
        assert_eq!(record.timestamp, 42);
    }

    #[test]
    fn sql_result_marks_missing_answer_as_error() {
        let batch = EventBatch::from_values([json!({"query": "dept?", "employee_id": "E001"})]);
        let fields = batch.0[0].fields().expect("object payload");
        let received_at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).single().expect("valid time");

        let record = SqlQueryResult::from_event(fields, Some("  ".to_string()), received_at);

        assert_eq!(record.status, SqlStatus::Error);
        assert_eq!(record.sql_result, None);
        assert_eq!(record.source, "unknown");
        assert_eq!(record.timestamp, "2026-01-02T03:04:05.000Z");
        assert_eq!(record.project()["status"], json!("error"));
    }

    #[test]
    fn sql_result_renders_numeric_timestamp_as_text() {
        let batch = EventBatch::from_values([json!({"timestamp": 1700000000000_i64})]);
        let fields = batch.0[0].fields().expect("object payload");

        let record = SqlQueryResult::from_event(fields, Some("Engineering".to_string()), Utc::now());

        assert_eq!(record.status, SqlStatus::Success);
        assert_eq!(record.project()["timestamp"], json!("1700000000000"));
    }

    #[test]
    fn meeting_result_success_follows_error_message() {
        let batch = EventBatch::from_values([json!({
            "title": "Sync",
            "attendees": "a@example.test,b@example.test",
            "message_id": "m-9",
        })]);
        let fields = batch.0[0].fields().expect("object payload");
        let meeting = MeetingInfo::from_event(fields);

        let failed = MeetingScheduleResult::from_event(
            fields,
            meeting.clone(),
            None,
            Some("calendar unavailable".to_string()),
            7,
        );
        let scheduled = MeetingScheduleResult::from_event(
            fields,
            meeting,
            Some("https://calendar.example.test/e/1".to_string()),
            None,
            7,
        );

        assert!(!failed.success);
        assert!(scheduled.success);
        assert_eq!(scheduled.project()["attendees"], json!(["a@example.test", "b@example.test"]));
    }

    #[test]
    fn result_record_exposes_kind_and_correlation_id() {
        let batch = EventBatch::from_values([json!({"message_id": "m-3"})]);
        let fields = batch.0[0].fields().expect("object payload");
        let record: ResultRecord = SearchContextResult::from_event(fields, None, 1).into();

        assert_eq!(record.kind(), RecordKind::SearchContext);
        assert_eq!(record.message_id(), "m-3");
    }
}
