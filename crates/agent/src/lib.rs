//! Agents that turn inbound query events into published results.
//!
//! Each agent builds one result record per event with help from an external
//! collaborator:
//! - `search` ranks policy documents from a knowledge base (`retriever`)
//! - `sql` asks a query resolver (`llm`), grounded on employee directory context
//! - `meeting` hands the request to a scheduler webhook (`scheduler`)
//!
//! The `AgentRuntime` routes a batch to an agent, publishes each record through
//! the shared `PublisherContext`, and reports per-event outcomes. Collaborator
//! failures degrade into the record where the record has room for them (an
//! error status, a null summary); otherwise the event fails with a class and a
//! retry hint.

pub mod agents;
pub mod error;
pub mod llm;
pub mod meeting;
pub mod retriever;
pub mod runtime;
pub mod scheduler;
pub mod search;
pub mod sql;

pub use agents::{Agent, AgentRegistry};
pub use error::AgentError;
pub use llm::{ChatResolver, QueryResolver};
pub use meeting::MeetingAgent;
pub use retriever::{build_summary, JsonKnowledgeBase, KnowledgeDocument, KnowledgeRetriever};
pub use runtime::{AgentRuntime, EventOutcome, InvocationBody, InvocationResponse, OutcomeStatus};
pub use scheduler::{MeetingScheduler, ScheduleOutcome, WebhookScheduler};
pub use search::SearchAgent;
pub use sql::{parse_context_lines, SqlAgent};
